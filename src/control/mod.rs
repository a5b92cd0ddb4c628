// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Physical controls and groups of controls.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    midi::{validate_cc, validate_note},
    util::{rescale_u7, U7_MAX},
    value::{AbsoluteInput, ClickInput, RelativeInput},
    Channel, Error, MidiEvent, MidiFlushDispatcher, PortIndex, RelativeMode, Result, Session,
    TimeStamp, Value,
};

mod set;
pub use self::set::ControlSet;
#[cfg(feature = "observables")]
pub use self::set::ControlSetStatus;


/// Note or CC number of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueAddress {
    Note(u8),
    Cc(u8),
}

/// Configuration of a single [`Control`].
///
/// Exactly one of `value_note` and `value_cc` may be set. Controls without
/// a value address must have a `click_note`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlConfig {
    pub name: String,

    /// Defaults to the port of the session.
    pub port: Option<PortIndex>,

    pub channel: Channel,

    pub value_note: Option<u8>,

    pub value_cc: Option<u8>,

    /// A separate note that reports presses and releases.
    pub click_note: Option<u8>,

    /// Defaults to `channel`.
    pub sync_channel: Option<Channel>,

    /// Feedback address, defaults to the value address
    /// or the click note.
    pub sync_note: Option<u8>,

    pub sync_cc: Option<u8>,

    pub relative: RelativeMode,

    pub min_feedback_value: Option<u8>,

    pub max_feedback_value: Option<u8>,

    pub muted: bool,

    /// Never send any feedback.
    pub unidirectional: bool,
}

impl ControlConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_value_note(mut self, note: u8) -> Self {
        self.value_note = Some(note);
        self
    }

    #[must_use]
    pub fn with_value_cc(mut self, cc: u8) -> Self {
        self.value_cc = Some(cc);
        self
    }

    #[must_use]
    pub fn with_click_note(mut self, note: u8) -> Self {
        self.click_note = Some(note);
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    fn invalid(&self, reason: &'static str) -> Error {
        Error::InvalidControlConfig {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn value_address(&self) -> Result<Option<ValueAddress>> {
        match (self.value_note, self.value_cc) {
            (Some(_), Some(_)) => Err(self.invalid("both a value note and a value CC")),
            (Some(note), None) => Ok(Some(ValueAddress::Note(validate_note(note)?))),
            (None, Some(cc)) => Ok(Some(ValueAddress::Cc(validate_cc(cc)?))),
            (None, None) => Ok(None),
        }
    }

    fn sync_address(&self) -> Result<Option<ValueAddress>> {
        match (self.sync_note, self.sync_cc) {
            (Some(_), Some(_)) => Err(self.invalid("both a sync note and a sync CC")),
            (Some(note), None) => Ok(Some(ValueAddress::Note(validate_note(note)?))),
            (None, Some(cc)) => Ok(Some(ValueAddress::Cc(validate_cc(cc)?))),
            (None, None) => Ok(None),
        }
    }

    fn feedback_range(&self) -> Result<Option<(u8, u8)>> {
        if self.min_feedback_value.is_none() && self.max_feedback_value.is_none() {
            return Ok(None);
        }
        let min = self.min_feedback_value.unwrap_or(0);
        let max = self.max_feedback_value.unwrap_or(U7_MAX);
        if max > U7_MAX {
            return Err(Error::InvalidU7(max));
        }
        if min > max {
            return Err(self.invalid("minimum feedback value exceeds maximum"));
        }
        Ok(Some((min, max)))
    }
}

/// A physical button, encoder, or fader.
///
/// At most one [`Value`] is attached to a control and each value is
/// attached to at most one control.
pub struct Control {
    name: String,
    channel: Channel,
    value_address: Option<ValueAddress>,
    click_note: Option<u8>,
    sync_channel: Channel,
    sync_address: Option<ValueAddress>,
    relative: RelativeMode,
    feedback_range: Option<(u8, u8)>,
    loop_avoidance: bool,
    unidirectional: bool,
    muted: Cell<bool>,
    last_received: Cell<Option<u8>>,
    flush_dispatcher: Option<Rc<MidiFlushDispatcher>>,
    value: RefCell<Option<Rc<dyn Value>>>,
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("value_address", &self.value_address)
            .field("click_note", &self.click_note)
            .field("sync_channel", &self.sync_channel)
            .field("sync_address", &self.sync_address)
            .field("muted", &self.muted.get())
            .field(
                "value",
                &self.value.borrow().as_ref().map(|value| value.name().to_owned()),
            )
            .finish_non_exhaustive()
    }
}

impl Control {
    pub fn new(session: &Rc<Session>, config: ControlConfig) -> Result<Rc<Self>> {
        let value_address = config.value_address()?;
        let click_note = config.click_note.map(validate_note).transpose()?;
        if value_address.is_none() && click_note.is_none() {
            return Err(config.invalid("neither a value address nor a click note"));
        }
        if config.relative.is_relative() && value_address.is_none() {
            return Err(config.invalid("relative mode without a value address"));
        }
        let feedback_range = config.feedback_range()?;
        let sync_address = config
            .sync_address()?
            .or(value_address)
            .or(click_note.map(ValueAddress::Note));
        let sync_channel = config.sync_channel.unwrap_or(config.channel);
        let loop_avoidance = !config.relative.is_relative()
            && feedback_range.is_none()
            && sync_channel == config.channel
            && sync_address == value_address;
        let port = config.port.unwrap_or(session.config().default_port);
        let flush_dispatcher = if config.unidirectional {
            None
        } else {
            Some(session.midi_flush_dispatcher(port)?)
        };
        let event_dispatcher = session.midi_event_dispatcher(port)?;
        let ControlConfig {
            name,
            channel,
            relative,
            muted,
            unidirectional,
            ..
        } = config;
        let control = Rc::new(Self {
            name,
            channel,
            value_address,
            click_note,
            sync_channel,
            sync_address,
            relative,
            feedback_range,
            loop_avoidance,
            unidirectional,
            muted: Cell::new(muted),
            last_received: Cell::new(None),
            flush_dispatcher,
            value: RefCell::new(None),
        });
        match value_address {
            Some(ValueAddress::Note(note)) => {
                let weak = Rc::downgrade(&control);
                event_dispatcher.on_note(
                    note,
                    move |event| {
                        if let Some(control) = weak.upgrade() {
                            let value = if event.is_note_off() { 0 } else { event.value };
                            control.on_value_received(value, event.ts);
                        }
                    },
                    Some(channel),
                )?;
            }
            Some(ValueAddress::Cc(cc)) => {
                let weak = Rc::downgrade(&control);
                event_dispatcher.on_cc(
                    cc,
                    move |event| {
                        if let Some(control) = weak.upgrade() {
                            control.on_value_received(event.value, event.ts);
                        }
                    },
                    Some(channel),
                )?;
            }
            None => (),
        }
        if let Some(click_note) = click_note {
            let weak = Rc::downgrade(&control);
            event_dispatcher.on_note_pressed(
                click_note,
                move |event: &MidiEvent| {
                    if let Some(control) = weak.upgrade() {
                        control.on_click_received(true, event.ts);
                    }
                },
                Some(channel),
            )?;
            let weak: Weak<Self> = Rc::downgrade(&control);
            event_dispatcher.on_note_released(
                click_note,
                move |event: &MidiEvent| {
                    if let Some(control) = weak.upgrade() {
                        control.on_click_received(false, event.ts);
                    }
                },
                Some(channel),
            )?;
        }
        log::debug!("Created control {control:?}");
        Ok(control)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    #[must_use]
    pub const fn value_address(&self) -> Option<ValueAddress> {
        self.value_address
    }

    #[must_use]
    pub const fn is_unidirectional(&self) -> bool {
        self.unidirectional
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    /// Suppress all feedback while muted.
    ///
    /// Unmuting sends the current state.
    pub fn set_muted(&self, muted: bool) {
        if self.muted.replace(muted) == muted {
            return;
        }
        if !muted {
            self.resync();
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<Rc<dyn Value>> {
        self.value.borrow().clone()
    }

    /// Pair this control with a value and send its state.
    ///
    /// The value is detached from any other control and the
    /// value of this control is replaced.
    pub fn attach_value(self: &Rc<Self>, value: Rc<dyn Value>) {
        let current = self.value();
        if current
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, &value))
        {
            self.sync_to_midi(None);
            return;
        }
        if let Some(previous) = value.core().control() {
            // The value is attached to another control
            debug_assert!(!Rc::ptr_eq(&previous, self));
            previous.detach_value();
        }
        self.detach_value();
        value.core().set_control(Rc::downgrade(self));
        *self.value.borrow_mut() = Some(Rc::clone(&value));
        log::trace!(
            "Attached value \"{value}\" to control \"{control}\"",
            value = value.name(),
            control = self.name
        );
        self.sync_to_midi(None);
    }

    /// Release the value, if any.
    pub fn detach_value(&self) {
        self.last_received.set(None);
        let value = self.value.borrow_mut().take();
        let Some(value) = value else {
            return;
        };
        value.core().clear_control(self);
    }

    fn rescale(&self, value: u8) -> u8 {
        match self.feedback_range {
            Some((min, max)) => rescale_u7(value, min, max),
            None => value,
        }
    }

    /// Send the state of the attached value, or an explicit value.
    ///
    /// Nothing is sent if the control is muted, unidirectional, or
    /// if there is nothing to send. Absolute controls do not echo the
    /// value that has been received last, even if the attached value
    /// reports it later. Explicit values are always sent.
    pub fn sync_to_midi(&self, value_override: Option<u8>) {
        if self.muted.get() {
            return;
        }
        let Some(flush_dispatcher) = &self.flush_dispatcher else {
            return;
        };
        let Some(sync_address) = self.sync_address else {
            return;
        };
        let value = match value_override {
            Some(value) => value,
            None => {
                let Some(value) = self.value() else {
                    return;
                };
                value.value()
            }
        };
        let value = self.rescale(value.min(U7_MAX));
        if self.loop_avoidance && value_override.is_none() {
            if self.last_received.get() == Some(value) {
                log::trace!(
                    "Suppressing echo of {value} on control \"{name}\"",
                    name = self.name
                );
                return;
            }
            // The device no longer shows the received value
            self.last_received.set(None);
        }
        // Addresses and values have been validated eagerly
        let result = match sync_address {
            ValueAddress::Note(note) => {
                flush_dispatcher.enqueue_note_on(self.sync_channel, note, value)
            }
            ValueAddress::Cc(cc) => flush_dispatcher.enqueue_cc(self.sync_channel, cc, value),
        };
        if let Err(err) = result {
            log::warn!("Failed to send feedback of control \"{}\": {err}", self.name);
        }
    }

    /// Forward a received value to the attached value.
    ///
    /// Relative controls forward a signed delta.
    pub fn on_value_received(&self, value: u8, ts: TimeStamp) {
        let Some(attached) = self.value() else {
            log::debug!(
                "Control \"{name}\" received {value} without an attached value",
                name = self.name
            );
            return;
        };
        if let Some(delta) = self.relative.delta(value) {
            attached.on_relative_value(RelativeInput { delta, ts });
            return;
        }
        self.last_received.set(Some(value));
        attached.on_absolute_value(AbsoluteInput {
            value,
            ts,
            unidirectional: self.unidirectional,
        });
    }

    /// Send the state of the attached value unconditionally.
    pub fn resync(&self) {
        self.last_received.set(None);
        self.sync_to_midi(None);
    }

    fn on_click_received(&self, pressed: bool, ts: TimeStamp) {
        let Some(attached) = self.value() else {
            return;
        };
        attached.on_click(ClickInput { pressed, ts });
    }
}
