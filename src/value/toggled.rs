// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, rc::Rc};

use super::{default_velocity, AbsoluteInput, ClickInput, Value, ValueCore, VelocityFn};
use crate::{host::BoolCell, Error, Result, Session, TransportProperty};

/// Mirrors a boolean host property, e.g. the mute state of a track.
///
/// Pressing the control toggles the property.
pub struct ToggledValue {
    core: ValueCore,
    cell: Rc<dyn BoolCell>,
    velocity: VelocityFn,
}

impl fmt::Debug for ToggledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToggledValue")
            .field("core", &self.core)
            .field("on", &self.cell.get())
            .finish_non_exhaustive()
    }
}

impl ToggledValue {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        cell: Rc<dyn BoolCell>,
        velocity: Option<VelocityFn>,
    ) -> Rc<Self> {
        let velocity = velocity.unwrap_or_else(|| Rc::new(default_velocity) as VelocityFn);
        let value = Rc::new(Self {
            core: ValueCore::new(name, velocity(cell.get())),
            cell: Rc::clone(&cell),
            velocity,
        });
        let weak = Rc::downgrade(&value);
        cell.add_value_observer(Box::new(move |on| {
            let Some(value) = weak.upgrade() else {
                return;
            };
            value.core.set_value((value.velocity)(on));
        }));
        value
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.cell.get()
    }

    pub fn toggle(&self) {
        self.cell.toggle();
    }
}

impl Value for ToggledValue {
    fn core(&self) -> &ValueCore {
        &self.core
    }

    /// Buttons that send a non-zero value when pressed.
    fn on_absolute_value(&self, input: AbsoluteInput) {
        if input.value > 0 {
            self.toggle();
        }
    }

    fn on_click(&self, input: ClickInput) {
        if input.pressed {
            self.toggle();
        }
    }

    fn set_raw_value(&self, value: u8) {
        self.cell.set(value > 0);
    }
}

/// Mirrors a boolean property of the global transport.
///
/// Only a single instance exists per property and session.
pub struct ToggledTransportValue {
    property: TransportProperty,
    toggled: Rc<ToggledValue>,
}

impl fmt::Debug for ToggledTransportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToggledTransportValue")
            .field("property", &self.property)
            .field("toggled", &self.toggled)
            .finish()
    }
}

impl ToggledTransportValue {
    /// The shared instance for `property`.
    ///
    /// The velocity function is only used when the instance is created.
    /// Fails if the host does not provide a transport.
    pub fn get_or_create(
        session: &Session,
        property: TransportProperty,
        velocity: Option<VelocityFn>,
    ) -> Result<Rc<Self>> {
        if let Some(existing) = session.transport_values().borrow().get(&property) {
            return Ok(Rc::clone(existing));
        }
        let transport = session
            .host()
            .transport()
            .ok_or(Error::Unsupported("transport"))?;
        let toggled = ToggledValue::new(
            property.to_string(),
            transport.property(property),
            velocity,
        );
        let value = Rc::new(Self { property, toggled });
        log::debug!("Created transport value {property}");
        session
            .transport_values()
            .borrow_mut()
            .insert(property, Rc::clone(&value));
        Ok(value)
    }

    #[must_use]
    pub const fn property(&self) -> TransportProperty {
        self.property
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.toggled.is_on()
    }

    pub fn toggle(&self) {
        self.toggled.toggle();
    }
}

impl Value for ToggledTransportValue {
    fn core(&self) -> &ValueCore {
        self.toggled.core()
    }

    fn on_absolute_value(&self, input: AbsoluteInput) {
        self.toggled.on_absolute_value(input);
    }

    fn on_click(&self, input: ClickInput) {
        self.toggled.on_click(input);
    }

    fn set_raw_value(&self, value: u8) {
        self.toggled.set_raw_value(value);
    }
}
