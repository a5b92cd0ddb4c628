// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use super::Control;
use crate::{Error, Observable, Result, Session, Subscription, ValueSetRef};

/// Snapshot of the state of a [`ControlSet`] for remote consumers.
#[cfg(feature = "observables")]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlSetStatus {
    /// Name of the attached value set.
    pub value_set: Option<String>,
    pub page: usize,
    pub last_page: usize,
}

/// A fixed group of controls, e.g. a row of 8 encoders.
///
/// At most one [`ValueSet`](crate::ValueSet) is attached to a control set
/// and each value set is attached to at most one control set. The controls
/// are bound to the values of the current page in order.
pub struct ControlSet {
    name: String,
    controls: Vec<Rc<Control>>,
    value_set: Observable<Option<ValueSetRef>>,
    value_set_subscriptions: RefCell<Vec<Subscription>>,
    has_next_value_page: Observable<bool>,
    has_prev_value_page: Observable<bool>,
    muted: Cell<bool>,
    self_weak: Weak<Self>,
    #[cfg(feature = "observables")]
    status: discro::Publisher<ControlSetStatus>,
}

impl fmt::Debug for ControlSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSet")
            .field("name", &self.name)
            .field("controls", &self.controls.len())
            .field(
                "value_set",
                &self
                    .value_set
                    .with(|value_set| value_set.as_ref().map(|value_set| value_set.name().to_owned())),
            )
            .field("muted", &self.muted.get())
            .finish_non_exhaustive()
    }
}

impl ControlSet {
    /// Create a new control set with a unique name.
    pub fn new(
        session: &Rc<Session>,
        name: impl Into<String>,
        controls: Vec<Rc<Control>>,
    ) -> Result<Rc<Self>> {
        let name = name.into();
        if controls.is_empty() {
            return Err(Error::EmptyControlSet(name));
        }
        let control_set = Rc::new_cyclic(|self_weak| Self {
            name,
            controls,
            value_set: Observable::new(None),
            value_set_subscriptions: RefCell::new(Vec::new()),
            has_next_value_page: Observable::new(false),
            has_prev_value_page: Observable::new(false),
            muted: Cell::new(false),
            self_weak: Weak::clone(self_weak),
            #[cfg(feature = "observables")]
            status: discro::Publisher::new(ControlSetStatus::default()),
        });
        session.register_control_set(&control_set)?;
        log::debug!(
            "Created control set \"{name}\" with {width} control(s)",
            name = control_set.name,
            width = control_set.width()
        );
        Ok(control_set)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of controls.
    #[must_use]
    pub fn width(&self) -> usize {
        self.controls.len()
    }

    #[must_use]
    pub fn controls(&self) -> &[Rc<Control>] {
        &self.controls
    }

    #[must_use]
    pub fn value_set(&self) -> Option<ValueSetRef> {
        self.value_set.get()
    }

    /// Notifies subscribers after the value set has been replaced.
    ///
    /// Use [`ControlSet::set_value_set()`] for writing.
    #[must_use]
    pub fn value_set_observable(&self) -> &Observable<Option<ValueSetRef>> {
        &self.value_set
    }

    /// Replace the attached value set.
    ///
    /// A value set that is controlled by another control set is
    /// detached from that control set first. Fails if the value set
    /// requires a different number of controls.
    pub fn set_value_set(&self, value_set: Option<ValueSetRef>) -> Result<()> {
        let unchanged = self.value_set.with(|current| match (current, &value_set) {
            (Some(current), Some(value_set)) => Rc::ptr_eq(current, value_set),
            (None, None) => true,
            _ => false,
        });
        if unchanged {
            return Ok(());
        }
        if let Some(value_set) = &value_set {
            value_set.check_control_set_width(self.width(), &self.name)?;
        }
        self.detach_value_set();
        if let Some(value_set) = &value_set {
            if let Some(other) = value_set.core().controlled_by() {
                debug_assert!(!std::ptr::eq(Rc::as_ptr(&other), self));
                other.reset(None);
            }
            value_set.core().set_controlled_by(Weak::clone(&self.self_weak));
            value_set.on_attached(self.width());
            self.subscribe_value_set(value_set);
            log::info!(
                "Attaching value set \"{value_set}\" to control set \"{control_set}\"",
                value_set = value_set.name(),
                control_set = self.name
            );
        }
        // Subscribers must only see the new value set after all
        // controls have been bound to it
        self.bind(value_set.as_ref());
        self.value_set.replace(value_set);
        self.update_page_state();
        Ok(())
    }

    fn subscribe_value_set(&self, value_set: &ValueSetRef) {
        let core = value_set.core();
        let weak = Weak::clone(&self.self_weak);
        let on_page = core.page().subscribe(move |_| {
            if let Some(control_set) = weak.upgrade() {
                control_set.rebind();
            }
        });
        let weak = Weak::clone(&self.self_weak);
        let on_last_page = core.last_page().subscribe(move |_| {
            if let Some(control_set) = weak.upgrade() {
                control_set.update_page_state();
            }
        });
        *self.value_set_subscriptions.borrow_mut() = vec![on_page, on_last_page];
    }

    /// Detach the current value set from all controls.
    fn detach_value_set(&self) {
        self.value_set_subscriptions.borrow_mut().clear();
        let Some(value_set) = self.value_set.get() else {
            return;
        };
        for control in &self.controls {
            control.detach_value();
        }
        value_set.core().clear_controlled_by(self);
        log::info!(
            "Detached value set \"{value_set}\" from control set \"{control_set}\"",
            value_set = value_set.name(),
            control_set = self.name
        );
    }

    /// Bind the controls to the values on the current page.
    fn rebind(&self) {
        let value_set = self.value_set.get();
        self.bind(value_set.as_ref());
        self.update_page_state();
    }

    fn bind(&self, value_set: Option<&ValueSetRef>) {
        match value_set {
            Some(value_set) => {
                let page = value_set.page();
                for (index, control) in self.controls.iter().enumerate() {
                    match value_set.value_at(page, index) {
                        Some(value) => control.attach_value(value),
                        None => control.detach_value(),
                    }
                }
            }
            None => {
                for control in &self.controls {
                    control.detach_value();
                }
            }
        }
    }

    fn update_page_state(&self) {
        let value_set = self.value_set.get();
        self.has_next_value_page.set(
            value_set
                .as_ref()
                .is_some_and(|value_set| value_set.has_next_page()),
        );
        self.has_prev_value_page.set(
            value_set
                .as_ref()
                .is_some_and(|value_set| value_set.has_prev_page()),
        );
        #[cfg(feature = "observables")]
        {
            let status = value_set.map_or_else(ControlSetStatus::default, |value_set| {
                ControlSetStatus {
                    value_set: Some(value_set.name().to_owned()),
                    page: value_set.page(),
                    last_page: value_set.last_page(),
                }
            });
            self.status.modify(|current| {
                if *current == status {
                    return false;
                }
                *current = status;
                true
            });
        }
    }

    /// Detach the value set.
    ///
    /// If a value set was attached and `reset_value` is given then this
    /// value is sent to all controls, e.g. to turn off the LEDs.
    pub fn reset(&self, reset_value: Option<u8>) {
        let had_value_set = self.value_set.with(Option::is_some);
        if !had_value_set {
            return;
        }
        self.detach_value_set();
        self.value_set.replace(None);
        self.update_page_state();
        let Some(reset_value) = reset_value else {
            return;
        };
        for control in &self.controls {
            control.sync_to_midi(Some(reset_value));
        }
    }

    /// The page of the attached value set.
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.value_set
            .with(|value_set| value_set.as_ref().map_or(0, |value_set| value_set.page()))
    }

    pub fn next_value_page(&self) {
        if let Some(value_set) = self.value_set.get() {
            value_set.next_page();
        }
    }

    pub fn prev_value_page(&self) {
        if let Some(value_set) = self.value_set.get() {
            value_set.prev_page();
        }
    }

    /// Select a page, clamped to the valid range.
    pub fn set_value_page(&self, page: usize) {
        if let Some(value_set) = self.value_set.get() {
            value_set.set_page(page);
        }
    }

    #[must_use]
    pub fn has_next_value_page(&self) -> &Observable<bool> {
        &self.has_next_value_page
    }

    #[must_use]
    pub fn has_prev_value_page(&self) -> &Observable<bool> {
        &self.has_prev_value_page
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
        for control in &self.controls {
            control.set_muted(muted);
        }
    }

    /// Send the current state of all controls again.
    pub fn resync(&self) {
        for control in &self.controls {
            control.resync();
        }
    }

    /// Receive status updates on another thread.
    #[cfg(feature = "observables")]
    #[must_use]
    pub fn subscribe_status(&self) -> discro::Subscriber<ControlSetStatus> {
        self.status.subscribe()
    }
}
