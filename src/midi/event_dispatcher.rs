// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use super::{
    message_type, note_input_mask, Channel, MidiEvent, NumberRange,
    MIDI_STATUS_CC, MIDI_STATUS_CHANNEL_PRESSURE, MIDI_STATUS_NOTE_OFF, MIDI_STATUS_NOTE_ON,
    MIDI_STATUS_PITCH_BEND, MIDI_STATUS_POLY_AFTERTOUCH,
};
use crate::{Error, Host, MidiIn, NoteInput, PortIndex, Result};

pub type MidiHandler = Rc<dyn Fn(&MidiEvent)>;

pub type SysexHandler = Rc<dyn Fn(&[u8])>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
enum HandlerKind {
    Note,
    NotePressed,
    NoteReleased,
    Cc,
}

impl HandlerKind {
    /// Handlers of the same class share a single registration sequence.
    const fn class(self) -> Self {
        match self {
            Self::Cc => Self::Cc,
            Self::Note | Self::NotePressed | Self::NoteReleased => Self::Note,
        }
    }
}

const CC_KINDS: &[HandlerKind] = &[HandlerKind::Cc];
const PRESS_KINDS: &[HandlerKind] = &[HandlerKind::Note, HandlerKind::NotePressed];
const RELEASE_KINDS: &[HandlerKind] = &[HandlerKind::Note, HandlerKind::NoteReleased];

#[derive(Default)]
struct HandlerTable {
    handlers: HashMap<(HandlerKind, u8), Vec<(HandlerKind, MidiHandler)>>,
}

impl HandlerTable {
    fn add(&mut self, kind: HandlerKind, number: u8, handler: MidiHandler) {
        self.handlers
            .entry((kind.class(), number))
            .or_default()
            .push((kind, handler));
    }

    /// All `kinds` must belong to the same class.
    fn collect_into(&self, kinds: &[HandlerKind], number: u8, collected: &mut Vec<MidiHandler>) {
        let Some(class) = kinds.first().map(|kind| kind.class()) else {
            return;
        };
        let Some(handlers) = self.handlers.get(&(class, number)) else {
            return;
        };
        collected.extend(
            handlers
                .iter()
                .filter(|(kind, _)| kinds.contains(kind))
                .map(|(_, handler)| Rc::clone(handler)),
        );
    }
}

struct Handlers {
    any_channel: HandlerTable,
    per_channel: Vec<HandlerTable>,
    /// Bit `n` is set if any handler for channel `n` exists.
    specific_channels: u16,
    sysex: Vec<SysexHandler>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            any_channel: HandlerTable::default(),
            per_channel: (0..Channel::COUNT)
                .map(|_| HandlerTable::default())
                .collect(),
            specific_channels: 0,
            sysex: Vec::new(),
        }
    }
}

impl Handlers {
    const fn has_specific_channel(&self, channel: Channel) -> bool {
        self.specific_channels & (1 << channel.value()) != 0
    }

    fn add(&mut self, kind: HandlerKind, number: u8, handler: MidiHandler, channel: Option<Channel>) {
        match channel {
            None => self.any_channel.add(kind, number, handler),
            Some(channel) => {
                self.specific_channels |= 1 << channel.value();
                self.per_channel[channel.index()].add(kind, number, handler);
            }
        }
    }

    fn resolve(&self, kinds: &[HandlerKind], channel: Channel, number: u8) -> Vec<MidiHandler> {
        let mut resolved = Vec::new();
        self.any_channel.collect_into(kinds, number, &mut resolved);
        if self.has_specific_channel(channel) {
            self.per_channel[channel.index()].collect_into(kinds, number, &mut resolved);
        }
        resolved
    }
}

/// Routes the raw input of a single MIDI port to registered handlers.
///
/// Created and owned by the [`Session`](crate::Session), one instance per
/// input port. Handlers are registered for single note/CC numbers or ranges
/// of numbers, either for any channel or for a specific channel. Handlers
/// registered for the same key are invoked in registration order, handlers
/// for any channel before those for a specific channel. Note handlers share
/// a single registration order with press and release handlers.
pub struct MidiEventDispatcher {
    port: PortIndex,
    host: Rc<dyn Host>,
    midi_in: Rc<dyn MidiIn>,
    loose_note_off: Cell<bool>,
    handlers: RefCell<Handlers>,
}

impl fmt::Debug for MidiEventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiEventDispatcher")
            .field("port", &self.port)
            .field("loose_note_off", &self.loose_note_off.get())
            .field(
                "specific_channels",
                &format_args!("{:016b}", self.handlers.borrow().specific_channels),
            )
            .finish_non_exhaustive()
    }
}

impl MidiEventDispatcher {
    /// Create a dispatcher and connect it to the callbacks of the input port.
    pub(crate) fn bind(
        port: PortIndex,
        host: Rc<dyn Host>,
        midi_in: Rc<dyn MidiIn>,
        loose_note_off: bool,
    ) -> Rc<Self> {
        let dispatcher = Rc::new(Self {
            port,
            host,
            midi_in: Rc::clone(&midi_in),
            loose_note_off: Cell::new(loose_note_off),
            handlers: RefCell::new(Handlers::default()),
        });
        let weak = Rc::downgrade(&dispatcher);
        midi_in.set_midi_callback(Box::new(move |status, data1, data2| {
            if let Some(dispatcher) = Weak::upgrade(&weak) {
                dispatcher.handle_midi(status, data1, data2);
            }
        }));
        let weak = Rc::downgrade(&dispatcher);
        midi_in.set_sysex_callback(Box::new(move |data| {
            if let Some(dispatcher) = Weak::upgrade(&weak) {
                dispatcher.handle_sysex(data);
            }
        }));
        log::debug!("Bound MIDI event dispatcher to input port {port}");
        dispatcher
    }

    #[must_use]
    pub const fn port(&self) -> PortIndex {
        self.port
    }

    /// Treat Note-On with velocity 0 like Note-Off.
    ///
    /// Enabled by default.
    pub fn set_loose_note_off(&self, loose_note_off: bool) {
        self.loose_note_off.set(loose_note_off);
    }

    #[must_use]
    pub fn is_loose_note_off(&self) -> bool {
        self.loose_note_off.get()
    }

    fn register(
        &self,
        kind: HandlerKind,
        numbers: NumberRange,
        handler: MidiHandler,
        channel: Option<Channel>,
    ) -> Result<()> {
        let numbers = match kind {
            HandlerKind::Cc => numbers.validate(Error::InvalidCc)?,
            HandlerKind::Note | HandlerKind::NotePressed | HandlerKind::NoteReleased => {
                numbers.validate(Error::InvalidNote)?
            }
        };
        let mut handlers = self.handlers.borrow_mut();
        for number in numbers {
            handlers.add(kind, number, Rc::clone(&handler), channel);
        }
        Ok(())
    }

    /// Invoked for all note messages, i.e. both presses and releases.
    pub fn on_note(
        &self,
        notes: impl Into<NumberRange>,
        handler: impl Fn(&MidiEvent) + 'static,
        channel: Option<Channel>,
    ) -> Result<()> {
        self.register(HandlerKind::Note, notes.into(), Rc::new(handler), channel)
    }

    pub fn on_note_pressed(
        &self,
        notes: impl Into<NumberRange>,
        handler: impl Fn(&MidiEvent) + 'static,
        channel: Option<Channel>,
    ) -> Result<()> {
        self.register(
            HandlerKind::NotePressed,
            notes.into(),
            Rc::new(handler),
            channel,
        )
    }

    pub fn on_note_released(
        &self,
        notes: impl Into<NumberRange>,
        handler: impl Fn(&MidiEvent) + 'static,
        channel: Option<Channel>,
    ) -> Result<()> {
        self.register(
            HandlerKind::NoteReleased,
            notes.into(),
            Rc::new(handler),
            channel,
        )
    }

    pub fn on_cc(
        &self,
        ccs: impl Into<NumberRange>,
        handler: impl Fn(&MidiEvent) + 'static,
        channel: Option<Channel>,
    ) -> Result<()> {
        self.register(HandlerKind::Cc, ccs.into(), Rc::new(handler), channel)
    }

    pub fn on_sysex(&self, handler: impl Fn(&[u8]) + 'static) {
        self.handlers.borrow_mut().sysex.push(Rc::new(handler));
    }

    /// Expose the port as a note source to the host, e.g. for playing instruments.
    ///
    /// Restricted to a single channel or all channels. If `consume_events` is set
    /// then matching messages are swallowed by the host and no longer reach the
    /// registered handlers.
    pub fn create_note_input(
        &self,
        name: &str,
        channel: Option<Channel>,
        consume_events: bool,
    ) -> Rc<dyn NoteInput> {
        let masks = [
            MIDI_STATUS_NOTE_ON,
            MIDI_STATUS_NOTE_OFF,
            MIDI_STATUS_POLY_AFTERTOUCH,
            MIDI_STATUS_CHANNEL_PRESSURE,
            MIDI_STATUS_PITCH_BEND,
        ]
        .into_iter()
        .map(|message_type| note_input_mask(message_type, channel))
        .collect::<Vec<_>>();
        log::info!(
            "Creating note input \"{name}\" on port {port}: {masks:?}",
            port = self.port
        );
        let note_input = self.midi_in.create_note_input(name, &masks);
        note_input.set_should_consume_events(consume_events);
        note_input
    }

    /// Dispatch a short MIDI message to all matching handlers.
    ///
    /// Messages without handlers are silently ignored.
    pub fn handle_midi(&self, status: u8, data1: u8, data2: u8) {
        let kinds = match message_type(status) {
            MIDI_STATUS_CC => CC_KINDS,
            MIDI_STATUS_NOTE_ON if data2 > 0 => PRESS_KINDS,
            MIDI_STATUS_NOTE_ON => {
                if self.loose_note_off.get() {
                    RELEASE_KINDS
                } else {
                    PRESS_KINDS
                }
            }
            MIDI_STATUS_NOTE_OFF => RELEASE_KINDS,
            _ => {
                log::trace!(
                    "Ignoring MIDI input on port {port}: {status:02x} {data1:02x} {data2:02x}",
                    port = self.port
                );
                return;
            }
        };
        let event = MidiEvent {
            ts: self.host.now(),
            status,
            channel: Channel::from_status(status),
            number: data1,
            value: data2,
        };
        log::trace!("Dispatching MIDI input on port {port}: {event:?}", port = self.port);
        // Handlers might register other handlers while being invoked
        let handlers = self
            .handlers
            .borrow()
            .resolve(kinds, event.channel, event.number);
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn handle_sysex(&self, data: &[u8]) {
        log::trace!("Dispatching SysEx input on port {port}: {data:02x?}", port = self.port);
        let handlers = self.handlers.borrow().sysex.clone();
        for handler in handlers {
            handler(data);
        }
    }
}

