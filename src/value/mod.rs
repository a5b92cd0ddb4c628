// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Logical parameters that could be attached to controls.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use crate::{util::clamp_u7, Control, Observable, TimeStamp};

mod knockout;
pub use self::knockout::{
    KnockoutClick, KnockoutClickHandler, KnockoutSyncedConfig, KnockoutSyncedValue,
};

mod ranged;
pub use self::ranged::{StandardRangedConfig, StandardRangedValue};

mod toggled;
pub use self::toggled::{ToggledTransportValue, ToggledValue};


/// Maps a boolean state to the 7-bit feedback value, e.g. an LED color.
pub type VelocityFn = Rc<dyn Fn(bool) -> u8>;

#[must_use]
pub fn default_velocity(on: bool) -> u8 {
    if on {
        127
    } else {
        0
    }
}

/// An absolute value received from a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteInput {
    pub value: u8,
    pub ts: TimeStamp,
    /// The control does not receive feedback and might be out of sync.
    pub unidirectional: bool,
}

/// A signed increment received from an endless encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeInput {
    pub delta: i32,
    pub ts: TimeStamp,
}

/// Press or release of a click note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickInput {
    pub pressed: bool,
    pub ts: TimeStamp,
}

/// State shared by all kinds of values.
///
/// Keeps the numeric state in the range `0..=127` and the back-reference
/// to the control that is currently attached.
pub struct ValueCore {
    name: String,
    value: Observable<u8>,
    control: RefCell<Weak<Control>>,
}

impl fmt::Debug for ValueCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCore")
            .field("name", &self.name)
            .field("value", &self.value.get())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ValueCore {
    #[must_use]
    pub fn new(name: impl Into<String>, value: u8) -> Self {
        Self {
            name: name.into(),
            value: Observable::new(value),
            control: RefCell::new(Weak::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> u8 {
        self.value.get()
    }

    #[must_use]
    pub fn observable(&self) -> &Observable<u8> {
        &self.value
    }

    /// Update the state and send it to the attached control.
    ///
    /// Returns `true` if the value has changed.
    pub fn set_value(&self, value: u8) -> bool {
        let changed = self.value.set(value.min(127));
        if changed {
            self.sync();
        }
        changed
    }

    /// Send the current state to the attached control.
    pub fn sync(&self) {
        if let Some(control) = self.control() {
            control.sync_to_midi(None);
        }
    }

    #[must_use]
    pub fn control(&self) -> Option<Rc<Control>> {
        self.control.borrow().upgrade()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.control.borrow().strong_count() > 0
    }

    pub(crate) fn set_control(&self, control: Weak<Control>) {
        *self.control.borrow_mut() = control;
    }

    /// Clear the back-reference if it points to `control`.
    pub(crate) fn clear_control(&self, control: &Control) {
        let mut attached = self.control.borrow_mut();
        if std::ptr::eq(attached.as_ptr(), control) {
            *attached = Weak::new();
        }
    }
}

/// A logical parameter.
///
/// Receives input from the attached [`Control`] and provides its state
/// as feedback.
pub trait Value {
    fn core(&self) -> &ValueCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    /// The current state in the range `0..=127`.
    fn value(&self) -> u8 {
        self.core().value()
    }

    fn on_absolute_value(&self, input: AbsoluteInput);

    /// Applies the increment to the current state by default.
    fn on_relative_value(&self, input: RelativeInput) {
        let RelativeInput { delta, ts } = input;
        self.on_absolute_value(AbsoluteInput {
            value: clamp_u7(i32::from(self.value()) + delta),
            ts,
            unidirectional: false,
        });
    }

    fn on_click(&self, input: ClickInput) {
        log::debug!(
            "Ignoring click {input:?} on value \"{name}\"",
            name = self.name()
        );
    }

    /// The state that is captured by snapshots.
    fn raw_value(&self) -> u8 {
        self.value()
    }

    /// Restore a captured state.
    fn set_raw_value(&self, value: u8) {
        self.on_absolute_value(AbsoluteInput {
            value,
            ts: TimeStamp::default(),
            unidirectional: false,
        });
    }
}

/// Plain value without any host binding.
#[derive(Debug)]
pub struct BaseValue {
    core: ValueCore,
}

impl BaseValue {
    #[must_use]
    pub fn new(name: impl Into<String>, value: u8) -> Rc<Self> {
        Rc::new(Self {
            core: ValueCore::new(name, value),
        })
    }

    #[must_use]
    pub fn observable(&self) -> &Observable<u8> {
        self.core.observable()
    }
}

impl Value for BaseValue {
    fn core(&self) -> &ValueCore {
        &self.core
    }

    fn on_absolute_value(&self, input: AbsoluteInput) {
        self.core.set_value(input.value);
    }
}
