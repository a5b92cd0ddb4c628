// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

use super::{validate_cc, validate_note, validate_u7, Channel, MidiMessage};
use crate::{Error, Host, MidiOut, PortIndex, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FeedbackKind {
    NoteOn,
    Cc,
}

/// Coalescing key: only the most recent value per key is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FeedbackKey {
    kind: FeedbackKind,
    channel: Channel,
    number: u8,
}

impl FeedbackKey {
    const fn into_message(self, value: u8) -> MidiMessage {
        let Self {
            kind,
            channel,
            number,
        } = self;
        match kind {
            FeedbackKind::NoteOn => MidiMessage::NoteOn {
                channel,
                note: number,
                velocity: value,
            },
            FeedbackKind::Cc => MidiMessage::ControlChange {
                channel,
                cc: number,
                value,
            },
        }
    }
}

/// Queues controller feedback for a single output port until the next flush.
///
/// Multiple writes for the same channel and note/CC number between two
/// flushes are coalesced. Only the last value is sent.
pub struct MidiFlushDispatcher {
    port: PortIndex,
    host: Rc<dyn Host>,
    midi_out: Rc<dyn MidiOut>,
    queue: RefCell<BTreeMap<FeedbackKey, u8>>,
}

impl fmt::Debug for MidiFlushDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiFlushDispatcher")
            .field("port", &self.port)
            .field("pending", &self.queue.borrow().len())
            .finish_non_exhaustive()
    }
}

impl MidiFlushDispatcher {
    pub(crate) fn new(port: PortIndex, host: Rc<dyn Host>, midi_out: Rc<dyn MidiOut>) -> Rc<Self> {
        log::debug!("Created MIDI flush dispatcher for output port {port}");
        Rc::new(Self {
            port,
            host,
            midi_out,
            queue: RefCell::new(BTreeMap::new()),
        })
    }

    #[must_use]
    pub const fn port(&self) -> PortIndex {
        self.port
    }

    fn enqueue(&self, key: FeedbackKey, value: u8) {
        self.queue.borrow_mut().insert(key, value);
    }

    pub fn enqueue_note_on(&self, channel: Channel, note: u8, velocity: u8) -> Result<()> {
        let key = FeedbackKey {
            kind: FeedbackKind::NoteOn,
            channel,
            number: validate_note(note)?,
        };
        self.enqueue(key, validate_u7(velocity)?);
        Ok(())
    }

    pub fn enqueue_cc(&self, channel: Channel, cc: u8, value: u8) -> Result<()> {
        let key = FeedbackKey {
            kind: FeedbackKind::Cc,
            channel,
            number: validate_cc(cc)?,
        };
        self.enqueue(key, validate_u7(value)?);
        Ok(())
    }

    fn send(&self, message: &MidiMessage) {
        log::trace!("Sending MIDI output on port {port}: {message:?}", port = self.port);
        match message {
            MidiMessage::SysEx(data) => self.midi_out.send_sysex(data),
            short => {
                if let Some([status, data1, data2]) = short.encode() {
                    self.midi_out.send_midi(status, data1, data2);
                }
            }
        }
    }

    /// Send a Note-On immediately, bypassing the queue.
    pub fn immediate_note_on(&self, channel: Channel, note: u8, velocity: u8) -> Result<()> {
        self.send(&MidiMessage::NoteOn {
            channel,
            note: validate_note(note)?,
            velocity: validate_u7(velocity)?,
        });
        Ok(())
    }

    pub fn immediate_note_off(&self, channel: Channel, note: u8) -> Result<()> {
        self.send(&MidiMessage::NoteOff {
            channel,
            note: validate_note(note)?,
            velocity: 0,
        });
        Ok(())
    }

    pub fn immediate_cc(&self, channel: Channel, cc: u8, value: u8) -> Result<()> {
        self.send(&MidiMessage::ControlChange {
            channel,
            cc: validate_cc(cc)?,
            value: validate_u7(value)?,
        });
        Ok(())
    }

    pub fn immediate_sysex(&self, data: &[u8]) {
        self.send(&MidiMessage::SysEx(data.to_vec()));
    }

    /// Send a Note-Off after a delay, e.g. for flashing an LED once.
    pub fn schedule_note_off(self: &Rc<Self>, channel: Channel, note: u8, delay: Duration) -> Result<()> {
        let note = validate_note(note)?;
        let weak: Weak<Self> = Rc::downgrade(self);
        self.host.schedule_task(
            delay,
            Box::new(move || {
                let Some(dispatcher) = weak.upgrade() else {
                    return;
                };
                dispatcher.send(&MidiMessage::NoteOff {
                    channel,
                    note,
                    velocity: 0,
                });
            }),
        );
        Ok(())
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Send all queued messages.
    ///
    /// Returns the number of messages that have been sent.
    pub fn drain(&self) -> usize {
        let queue = std::mem::take(&mut *self.queue.borrow_mut());
        let count = queue.len();
        for (key, value) in queue {
            self.send(&key.into_message(value));
        }
        count
    }
}

type FirstFlushHandler = Box<dyn FnOnce()>;

type FlushListener = Rc<dyn Fn()>;

/// Hooks around the periodic flush.
///
/// Handlers registered with [`FlushCoordinator::on_first_flush()`] run once,
/// before anything is sent on the very first flush. Afterwards no more
/// handlers are accepted. Flush listeners run after every flush.
pub struct FlushCoordinator {
    first_flush_handlers: RefCell<Option<Vec<FirstFlushHandler>>>,
    listeners: RefCell<Vec<FlushListener>>,
}

impl Default for FlushCoordinator {
    fn default() -> Self {
        Self {
            first_flush_handlers: RefCell::new(Some(Vec::new())),
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl fmt::Debug for FlushCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushCoordinator")
            .field("has_flushed", &self.has_flushed())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl FlushCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_first_flush(&self, handler: impl FnOnce() + 'static) -> Result<()> {
        let mut handlers = self.first_flush_handlers.borrow_mut();
        let Some(handlers) = handlers.as_mut() else {
            return Err(Error::FirstFlushWindowClosed);
        };
        handlers.push(Box::new(handler));
        Ok(())
    }

    pub fn register_flush_listener(&self, listener: impl Fn() + 'static) {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    #[must_use]
    pub fn has_flushed(&self) -> bool {
        self.first_flush_handlers.borrow().is_none()
    }

    /// Take the pending first-flush handlers exactly once.
    pub(crate) fn take_first_flush_handlers(&self) -> Vec<FirstFlushHandler> {
        self.first_flush_handlers
            .borrow_mut()
            .take()
            .unwrap_or_default()
    }

    pub(crate) fn notify_listeners(&self) {
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener();
        }
    }
}
