// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{cell::Cell, fmt, rc::Rc};

use super::{AbsoluteInput, RelativeInput, Value, ValueCore};
use crate::{host::RangedCell, util::clamp_u7};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StandardRangedConfig {
    /// Ignore input from unidirectional controls until they
    /// pick up the current value of the parameter.
    pub take_over: bool,
}

/// Mirrors a continuous host parameter, e.g. a track volume.
///
/// With take-over enabled a control that does not receive feedback
/// must first reach the current parameter value before it gets any
/// effect. The control picks up the parameter if it either sends the
/// exact value or if the parameter value lies between the previous and
/// the current value that have been received, i.e. when the control
/// has been moved across the parameter value.
pub struct StandardRangedValue {
    core: ValueCore,
    cell: Rc<dyn RangedCell>,
    take_over: bool,
    engaged: Cell<bool>,
    last_received: Cell<Option<u8>>,
    last_written: Cell<Option<u8>>,
}

impl fmt::Debug for StandardRangedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardRangedValue")
            .field("core", &self.core)
            .field("take_over", &self.take_over)
            .field("engaged", &self.engaged.get())
            .finish_non_exhaustive()
    }
}

impl StandardRangedValue {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        cell: Rc<dyn RangedCell>,
        config: StandardRangedConfig,
    ) -> Rc<Self> {
        let StandardRangedConfig { take_over } = config;
        let value = Rc::new(Self {
            core: ValueCore::new(name, cell.get()),
            cell: Rc::clone(&cell),
            take_over,
            engaged: Cell::new(false),
            last_received: Cell::new(None),
            last_written: Cell::new(None),
        });
        let weak = Rc::downgrade(&value);
        cell.add_value_observer(Box::new(move |parameter_value| {
            let Some(value) = weak.upgrade() else {
                return;
            };
            value.on_parameter_changed(parameter_value);
        }));
        value
    }

    /// The control has picked up the parameter value.
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged.get()
    }

    fn on_parameter_changed(&self, parameter_value: u8) {
        if self.last_written.take() != Some(parameter_value) {
            // Changed by someone else
            self.engaged.set(false);
        }
        self.core.set_value(parameter_value);
    }

    fn write(&self, value: u8) {
        self.last_written.set(Some(value));
        self.cell.set(value);
    }

    fn picks_up(&self, received: u8) -> bool {
        let parameter_value = self.cell.get();
        if received == parameter_value {
            return true;
        }
        let Some(last_received) = self.last_received.get() else {
            return false;
        };
        let (min, max) = if last_received <= received {
            (last_received, received)
        } else {
            (received, last_received)
        };
        (min..=max).contains(&parameter_value)
    }
}

impl Value for StandardRangedValue {
    fn core(&self) -> &ValueCore {
        &self.core
    }

    fn on_absolute_value(&self, input: AbsoluteInput) {
        let AbsoluteInput {
            value,
            unidirectional,
            ..
        } = input;
        if !self.take_over || !unidirectional {
            self.write(value);
            return;
        }
        if !self.engaged.get() {
            let picks_up = self.picks_up(value);
            self.last_received.set(Some(value));
            if !picks_up {
                log::trace!(
                    "Value \"{name}\" waiting for take-over: received {value}, parameter is {parameter_value}",
                    name = self.core.name(),
                    parameter_value = self.cell.get()
                );
                return;
            }
            self.engaged.set(true);
        }
        self.last_received.set(Some(value));
        self.write(value);
    }

    fn on_relative_value(&self, input: RelativeInput) {
        self.write(clamp_u7(i32::from(self.cell.get()) + input.delta));
    }

    fn set_raw_value(&self, value: u8) {
        self.write(value);
    }
}
