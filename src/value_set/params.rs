// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    fmt,
    rc::{Rc, Weak},
};

use super::{ValueSet, ValueSetCore};
use crate::{
    host::CursorDevice, util::last_page_index, Error, Observable, Result, Session,
    StandardRangedConfig, StandardRangedValue, Value,
};

fn last_page_from_names(page_names: &[String]) -> usize {
    page_names.len().saturating_sub(1)
}

fn host_page(page: i32) -> usize {
    usize::try_from(page).unwrap_or(0)
}

fn to_host_page(page: usize) -> i32 {
    i32::try_from(page).unwrap_or(i32::MAX)
}

/// Lock state of a value set that follows the cursor device.
///
/// Locking to a page implies locking to the device. Unlocking the
/// device also unlocks the page.
struct DeviceTracking {
    device: Rc<dyn CursorDevice>,
    lock_to_device: Observable<bool>,
    lock_to_page: Observable<Option<usize>>,
}

impl DeviceTracking {
    fn new(device: Rc<dyn CursorDevice>) -> Self {
        let lock_to_device = Observable::new(device.is_pinned().get());
        Self {
            device,
            lock_to_device,
            lock_to_page: Observable::new(None),
        }
    }

    fn device_name(&self) -> String {
        self.device.name().get()
    }

    fn set_lock_to_device(&self, lock: bool) {
        if !lock {
            self.lock_to_page.set(None);
        }
        self.lock_to_device.set(lock);
        self.device.is_pinned().set(lock);
    }

    fn set_lock_to_page(&self, page: Option<usize>) {
        if page.is_some() {
            self.set_lock_to_device(true);
        }
        self.lock_to_page.set(page);
    }

    /// Observe the host and forward changes to the value set.
    fn observe(&self, value_set: Weak<dyn DeviceValueSet>) {
        let weak = Weak::clone(&value_set);
        self.device
            .page_names()
            .add_value_observer(Box::new(move |page_names| {
                if let Some(value_set) = weak.upgrade() {
                    value_set.on_page_names_changed(page_names);
                }
            }));
        let weak = Weak::clone(&value_set);
        self.device
            .selected_page()
            .add_value_observer(Box::new(move |page| {
                if let Some(value_set) = weak.upgrade() {
                    value_set.on_host_page_selected(host_page(page));
                }
            }));
        let weak = Weak::clone(&value_set);
        self.device
            .name()
            .add_value_observer(Box::new(move |name| {
                if let Some(value_set) = weak.upgrade() {
                    log::debug!("Device changed: \"{name}\"");
                    value_set.on_device_changed();
                }
            }));
        let weak = value_set;
        self.device
            .is_pinned()
            .add_value_observer(Box::new(move |pinned| {
                if let Some(value_set) = weak.upgrade() {
                    value_set.on_pinned_changed(pinned);
                }
            }));
    }
}

/// Host notifications of the cursor device.
trait DeviceValueSet {
    fn on_page_names_changed(&self, page_names: &[String]);

    fn on_host_page_selected(&self, page: usize);

    fn on_device_changed(&self);

    fn on_pinned_changed(&self, pinned: bool);
}

macro_rules! impl_device_locking {
    ($type:ty) => {
        impl $type {
            #[must_use]
            pub fn device(&self) -> &Rc<dyn CursorDevice> {
                &self.tracking.device
            }

            /// Stay on the current device, even if another device is selected.
            pub fn set_lock_to_device(&self, lock: bool) {
                self.tracking.set_lock_to_device(lock);
            }

            #[must_use]
            pub fn lock_to_device(&self) -> &Observable<bool> {
                &self.tracking.lock_to_device
            }

            /// Stay on the current page, even if another page is selected.
            pub fn set_lock_to_page(&self, lock: bool) {
                let page = lock.then(|| self.page());
                self.tracking.set_lock_to_page(page);
            }

            #[must_use]
            pub fn lock_to_page(&self) -> &Observable<Option<usize>> {
                &self.tracking.lock_to_page
            }
        }
    };
}

/// The parameters of the selected remote control page of a device.
///
/// Selecting a page selects the corresponding page on the host.
pub struct ParamsValueSet {
    core: ValueSetCore,
    tracking: DeviceTracking,
    values: Vec<Rc<StandardRangedValue>>,
}

impl fmt::Debug for ParamsValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamsValueSet")
            .field("core", &self.core)
            .field("device", &self.tracking.device_name())
            .field("values", &self.values.len())
            .finish()
    }
}

impl ParamsValueSet {
    #[must_use]
    pub fn new(
        session: &Session,
        name: impl Into<String>,
        device: Rc<dyn CursorDevice>,
        config: StandardRangedConfig,
    ) -> Rc<Self> {
        let name = name.into();
        let values = (0..device.parameter_count())
            .map(|index| {
                StandardRangedValue::new(
                    format!("{name} {}", index + 1),
                    device.parameter(index),
                    config,
                )
            })
            .collect();
        let last_page = last_page_from_names(&device.page_names().get());
        let page = host_page(device.selected_page().get()).min(last_page);
        let value_set = Rc::new(Self {
            core: ValueSetCore::new(session, name, last_page),
            tracking: DeviceTracking::new(device),
            values,
        });
        value_set.core.page().set(page);
        let weak = Rc::downgrade(&value_set) as Weak<dyn DeviceValueSet>;
        value_set.tracking.observe(weak);
        value_set
    }
}

impl_device_locking!(ParamsValueSet);

impl DeviceValueSet for ParamsValueSet {
    fn on_page_names_changed(&self, page_names: &[String]) {
        self.set_last_page(last_page_from_names(page_names));
    }

    fn on_host_page_selected(&self, page: usize) {
        if let Some(locked_page) = self.tracking.lock_to_page.get() {
            if locked_page != page {
                log::debug!("Restoring locked page {locked_page}");
                self.tracking
                    .device
                    .selected_page()
                    .set(to_host_page(locked_page));
            }
            return;
        }
        self.set_page(page);
    }

    fn on_device_changed(&self) {
        self.recall_page();
    }

    fn on_pinned_changed(&self, pinned: bool) {
        if !pinned {
            self.tracking.lock_to_page.set(None);
        }
        self.tracking.lock_to_device.set(pinned);
    }
}

impl ValueSet for ParamsValueSet {
    fn core(&self) -> &ValueSetCore {
        &self.core
    }

    fn dynamic_id(&self) -> String {
        format!("{}:{}", self.id(), self.tracking.device_name())
    }

    /// The values always refer to the selected page on the host.
    fn value_at(&self, _page: usize, index: usize) -> Option<Rc<dyn Value>> {
        self.values
            .get(index)
            .map(|value| Rc::clone(value) as Rc<dyn Value>)
    }

    fn values(&self) -> Vec<Rc<dyn Value>> {
        self.values
            .iter()
            .map(|value| Rc::clone(value) as Rc<dyn Value>)
            .collect()
    }

    fn check_control_set_width(&self, width: usize, control_set: &str) -> Result<()> {
        if width != self.values.len() {
            return Err(Error::IncompatibleControlSetWidth {
                value_set: self.name().to_owned(),
                control_set: control_set.to_owned(),
                required: self.values.len(),
                actual: width,
            });
        }
        Ok(())
    }

    fn on_page_selected(&self, page: usize) {
        // Move the lock before the host reports the new page
        if self.tracking.lock_to_page.get().is_some() {
            self.tracking.lock_to_page.set(Some(page));
        }
        let selected_page = self.tracking.device.selected_page();
        if host_page(selected_page.get()) != page {
            selected_page.set(to_host_page(page));
        }
    }
}

/// Multiple remote control pages of a device side by side.
///
/// Each page of the value set spans `pages_per_view` consecutive
/// remote control pages, e.g. 2 pages with 8 parameters for a
/// control set of 16 encoders. Follows the selected page on the host
/// without selecting pages on the host.
pub struct GreedyParamsValueSet {
    core: ValueSetCore,
    tracking: DeviceTracking,
    parameter_count: usize,
    pages_per_view: usize,
    values: Vec<Rc<StandardRangedValue>>,
}

impl fmt::Debug for GreedyParamsValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GreedyParamsValueSet")
            .field("core", &self.core)
            .field("device", &self.tracking.device_name())
            .field("parameter_count", &self.parameter_count)
            .field("pages_per_view", &self.pages_per_view)
            .field("values", &self.values.len())
            .finish()
    }
}

impl GreedyParamsValueSet {
    /// Create values for up to `max_pages` remote control pages.
    pub fn new(
        session: &Session,
        name: impl Into<String>,
        device: Rc<dyn CursorDevice>,
        max_pages: usize,
        pages_per_view: usize,
        config: StandardRangedConfig,
    ) -> Result<Rc<Self>> {
        if pages_per_view == 0 {
            return Err(Error::InvalidPageSize(pages_per_view));
        }
        let name = name.into();
        let parameter_count = device.parameter_count();
        let values = (0..max_pages)
            .flat_map(|page| (0..parameter_count).map(move |index| (page, index)))
            .map(|(page, index)| {
                StandardRangedValue::new(
                    format!("{name} {}.{}", page + 1, index + 1),
                    device.page_parameter(page, index),
                    config,
                )
            })
            .collect();
        let value_set = Rc::new(Self {
            core: ValueSetCore::new(session, name, 0),
            tracking: DeviceTracking::new(device),
            parameter_count,
            pages_per_view,
            values,
        });
        let page_names = value_set.tracking.device.page_names().get();
        value_set
            .core
            .last_page()
            .set(value_set.last_page_for(page_names.len()));
        let host_page = host_page(value_set.tracking.device.selected_page().get());
        value_set.set_page(host_page / pages_per_view);
        let weak = Rc::downgrade(&value_set) as Weak<dyn DeviceValueSet>;
        value_set.tracking.observe(weak);
        Ok(value_set)
    }

    fn max_pages(&self) -> usize {
        if self.parameter_count == 0 {
            return 0;
        }
        self.values.len() / self.parameter_count
    }

    fn last_page_for(&self, num_device_pages: usize) -> usize {
        last_page_index(
            num_device_pages.min(self.max_pages()),
            self.pages_per_view,
        )
    }

    #[must_use]
    pub const fn pages_per_view(&self) -> usize {
        self.pages_per_view
    }
}

impl_device_locking!(GreedyParamsValueSet);

impl DeviceValueSet for GreedyParamsValueSet {
    fn on_page_names_changed(&self, page_names: &[String]) {
        self.set_last_page(self.last_page_for(page_names.len()));
    }

    fn on_host_page_selected(&self, page: usize) {
        if self.tracking.lock_to_page.get().is_some() {
            return;
        }
        self.set_page(page / self.pages_per_view);
    }

    fn on_device_changed(&self) {
        self.recall_page();
    }

    fn on_pinned_changed(&self, pinned: bool) {
        if !pinned {
            self.tracking.lock_to_page.set(None);
        }
        self.tracking.lock_to_device.set(pinned);
    }
}

impl ValueSet for GreedyParamsValueSet {
    fn core(&self) -> &ValueSetCore {
        &self.core
    }

    fn dynamic_id(&self) -> String {
        format!("{}:{}", self.id(), self.tracking.device_name())
    }

    fn value_at(&self, page: usize, index: usize) -> Option<Rc<dyn Value>> {
        if self.parameter_count == 0 || index >= self.parameter_count * self.pages_per_view {
            return None;
        }
        let device_page = page * self.pages_per_view + index / self.parameter_count;
        self.values
            .get(device_page * self.parameter_count + index % self.parameter_count)
            .map(|value| Rc::clone(value) as Rc<dyn Value>)
    }

    fn values(&self) -> Vec<Rc<dyn Value>> {
        self.values
            .iter()
            .map(|value| Rc::clone(value) as Rc<dyn Value>)
            .collect()
    }

    fn check_control_set_width(&self, width: usize, control_set: &str) -> Result<()> {
        let required = self.parameter_count * self.pages_per_view;
        if width != required {
            return Err(Error::IncompatibleControlSetWidth {
                value_set: self.name().to_owned(),
                control_set: control_set.to_owned(),
                required,
                actual: width,
            });
        }
        Ok(())
    }

    fn on_page_selected(&self, page: usize) {
        if self.tracking.lock_to_page.get().is_some() {
            self.tracking.lock_to_page.set(Some(page));
        }
    }
}
