// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Paged collections of values.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    rc::{Rc, Weak},
};

use crate::{
    util::{last_page_index, U7_MAX},
    ControlSet, Error, Observable, Result, Session, Value,
};

mod params;
pub use self::params::{GreedyParamsValueSet, ParamsValueSet};

mod sends;
pub use self::sends::SendsValueSet;

#[cfg(test)]
mod tests;

pub type ValueSetRef = Rc<dyn ValueSet>;

/// The last selected page per value set identity.
///
/// Shared by all value sets of a session.
#[derive(Debug, Default)]
pub struct PageMemory {
    pages: RefCell<HashMap<String, usize>>,
}

impl PageMemory {
    pub fn remember(&self, id: &str, page: usize) {
        self.pages.borrow_mut().insert(id.to_owned(), page);
    }

    #[must_use]
    pub fn recall(&self, id: &str) -> Option<usize> {
        self.pages.borrow().get(id).copied()
    }
}

/// State shared by all kinds of value sets.
pub struct ValueSetCore {
    name: String,
    id: String,
    page: Observable<usize>,
    last_page: Observable<usize>,
    controlled_by: RefCell<Weak<ControlSet>>,
    page_memory: Rc<PageMemory>,
}

impl fmt::Debug for ValueSetCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSetCore")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("page", &self.page.get())
            .field("last_page", &self.last_page.get())
            .field(
                "controlled_by",
                &self
                    .controlled_by()
                    .map(|control_set| control_set.name().to_owned()),
            )
            .finish_non_exhaustive()
    }
}

impl ValueSetCore {
    /// The name is also used as the stable id.
    #[must_use]
    pub fn new(session: &Session, name: impl Into<String>, last_page: usize) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            page: Observable::new(0),
            last_page: Observable::new(last_page),
            controlled_by: RefCell::new(Weak::new()),
            page_memory: Rc::clone(session.page_memory()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn page(&self) -> &Observable<usize> {
        &self.page
    }

    #[must_use]
    pub fn last_page(&self) -> &Observable<usize> {
        &self.last_page
    }

    #[must_use]
    pub fn page_memory(&self) -> &PageMemory {
        &self.page_memory
    }

    #[must_use]
    pub fn controlled_by(&self) -> Option<Rc<ControlSet>> {
        self.controlled_by.borrow().upgrade()
    }

    pub(crate) fn set_controlled_by(&self, control_set: Weak<ControlSet>) {
        *self.controlled_by.borrow_mut() = control_set;
    }

    /// Clear the back-reference if it points to `control_set`.
    pub(crate) fn clear_controlled_by(&self, control_set: &ControlSet) {
        let mut controlled_by = self.controlled_by.borrow_mut();
        if std::ptr::eq(controlled_by.as_ptr(), control_set) {
            *controlled_by = Weak::new();
        }
    }
}

/// A fixed collection of values, divided into pages.
///
/// The current page is always in the range `0..=last_page`.
pub trait ValueSet {
    fn core(&self) -> &ValueSetCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn id(&self) -> &str {
        self.core().id()
    }

    /// Identity for remembering the selected page.
    ///
    /// Includes the name of the underlying host entity, e.g. a device.
    fn dynamic_id(&self) -> String {
        self.id().to_owned()
    }

    /// The value for the control at `index` on `page`.
    fn value_at(&self, page: usize, index: usize) -> Option<Rc<dyn Value>>;

    /// All values in order.
    fn values(&self) -> Vec<Rc<dyn Value>>;

    /// Reject control sets that do not fit.
    fn check_control_set_width(&self, _width: usize, _control_set: &str) -> Result<()> {
        Ok(())
    }

    /// Invoked when a control set with `width` controls takes over.
    fn on_attached(&self, _width: usize) {}

    /// Invoked after the current page has changed.
    fn on_page_selected(&self, _page: usize) {}

    fn page(&self) -> usize {
        self.core().page.get()
    }

    fn last_page(&self) -> usize {
        self.core().last_page.get()
    }

    fn page_count(&self) -> usize {
        self.last_page() + 1
    }

    /// Select a page.
    ///
    /// Out-of-range pages are clamped.
    fn set_page(&self, page: usize) {
        let last_page = self.last_page();
        let clamped = page.min(last_page);
        if clamped != page {
            log::debug!(
                "Clamping page {page} of value set \"{name}\" to {clamped}",
                name = self.name()
            );
        }
        if !self.core().page.set(clamped) {
            return;
        }
        self.core()
            .page_memory
            .remember(&self.dynamic_id(), clamped);
        self.on_page_selected(clamped);
    }

    fn has_next_page(&self) -> bool {
        self.page() < self.last_page()
    }

    fn has_prev_page(&self) -> bool {
        self.page() > 0
    }

    fn next_page(&self) {
        if self.has_next_page() {
            self.set_page(self.page() + 1);
        }
    }

    fn prev_page(&self) {
        if self.has_prev_page() {
            self.set_page(self.page() - 1);
        }
    }

    /// Update the number of pages.
    ///
    /// The current page is clamped if it is no longer selectable.
    fn set_last_page(&self, last_page: usize) {
        self.core().last_page.set(last_page);
        if self.page() > last_page {
            self.set_page(last_page);
        }
    }

    /// Select the page that has been selected for the current identity before.
    ///
    /// Keeps the current page if the identity is unknown.
    fn recall_page(&self) {
        let Some(page) = self.core().page_memory.recall(&self.dynamic_id()) else {
            return;
        };
        self.set_page(page);
    }
}

/// Values with equal page sizes.
///
/// The page size follows the width of the attached control set. The
/// initial page size only applies until the first control set is attached.
pub struct UniformValueSet {
    core: ValueSetCore,
    values: Vec<Rc<dyn Value>>,
    values_per_page: Cell<usize>,
}

impl fmt::Debug for UniformValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformValueSet")
            .field("core", &self.core)
            .field("values", &self.values.len())
            .field("values_per_page", &self.values_per_page.get())
            .finish()
    }
}

impl UniformValueSet {
    pub fn new(
        session: &Session,
        name: impl Into<String>,
        values_per_page: usize,
        values: Vec<Rc<dyn Value>>,
    ) -> Result<Rc<Self>> {
        let Some(values_per_page) = NonZeroUsize::new(values_per_page) else {
            return Err(Error::InvalidPageSize(values_per_page));
        };
        Ok(Self::with_page_size(session, name, values_per_page, values))
    }

    #[must_use]
    pub fn with_page_size(
        session: &Session,
        name: impl Into<String>,
        values_per_page: NonZeroUsize,
        values: Vec<Rc<dyn Value>>,
    ) -> Rc<Self> {
        let values_per_page = values_per_page.get();
        let last_page = last_page_index(values.len(), values_per_page);
        Rc::new(Self {
            core: ValueSetCore::new(session, name, last_page),
            values,
            values_per_page: Cell::new(values_per_page),
        })
    }

    /// Create `len` values.
    pub fn from_fn(
        session: &Session,
        name: impl Into<String>,
        values_per_page: usize,
        len: usize,
        new_value: impl FnMut(usize) -> Rc<dyn Value>,
    ) -> Result<Rc<Self>> {
        Self::new(
            session,
            name,
            values_per_page,
            (0..len).map(new_value).collect(),
        )
    }

    #[must_use]
    pub fn values_per_page(&self) -> usize {
        self.values_per_page.get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Rc<dyn Value>> {
        self.values.get(index)
    }

    /// The numeric state of all values.
    #[must_use]
    pub fn raw_values(&self) -> Vec<u8> {
        self.values
            .iter()
            .map(|value| value.raw_value().min(U7_MAX))
            .collect()
    }
}

impl ValueSet for UniformValueSet {
    fn core(&self) -> &ValueSetCore {
        &self.core
    }

    fn on_attached(&self, width: usize) {
        debug_assert!(width > 0);
        if self.values_per_page.replace(width) == width {
            return;
        }
        log::debug!(
            "Paging value set \"{name}\" by {width} value(s)",
            name = self.name()
        );
        self.set_last_page(last_page_index(self.values.len(), width));
    }

    fn value_at(&self, page: usize, index: usize) -> Option<Rc<dyn Value>> {
        let values_per_page = self.values_per_page.get();
        if index >= values_per_page {
            return None;
        }
        self.values
            .get(page * values_per_page + index)
            .map(Rc::clone)
    }

    fn values(&self) -> Vec<Rc<dyn Value>> {
        self.values.clone()
    }
}
