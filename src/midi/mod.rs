// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::ops::RangeInclusive;

use enum_as_inner::EnumAsInner;

use crate::{util::U7_MAX, Error, Result, TimeStamp};

mod event_dispatcher;
pub use self::event_dispatcher::{MidiEventDispatcher, MidiHandler, SysexHandler};

mod flush_dispatcher;
pub use self::flush_dispatcher::{FlushCoordinator, MidiFlushDispatcher};

#[cfg(feature = "midir")]
pub mod midir;

#[cfg(test)]
mod tests;

pub const MIDI_STATUS_NOTE_OFF: u8 = 0x80;
pub const MIDI_STATUS_NOTE_ON: u8 = 0x90;
pub const MIDI_STATUS_POLY_AFTERTOUCH: u8 = 0xa0;
pub const MIDI_STATUS_CC: u8 = 0xb0;
pub const MIDI_STATUS_PROGRAM_CHANGE: u8 = 0xc0;
pub const MIDI_STATUS_CHANNEL_PRESSURE: u8 = 0xd0;
pub const MIDI_STATUS_PITCH_BEND: u8 = 0xe0;
pub const MIDI_STATUS_SYSEX: u8 = 0xf0;

const MIDI_STATUS_TYPE_MASK: u8 = 0xf0;
const MIDI_STATUS_CHANNEL_MASK: u8 = 0x0f;

/// MIDI channel in the range `0..=15`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
#[repr(transparent)]
pub struct Channel(u8);

impl Channel {
    pub const COUNT: usize = 16;

    pub fn new(value: u8) -> Result<Self> {
        if usize::from(value) >= Self::COUNT {
            return Err(Error::InvalidChannel(value));
        }
        Ok(Self(value))
    }

    /// Extract the channel from a channel voice status byte.
    #[must_use]
    pub const fn from_status(status: u8) -> Self {
        Self(status & MIDI_STATUS_CHANNEL_MASK)
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Compose a status byte from a message type and this channel.
    #[must_use]
    pub const fn status(self, message_type: u8) -> u8 {
        (message_type & MIDI_STATUS_TYPE_MASK) | self.0
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(from: u8) -> Result<Self> {
        Self::new(from)
    }
}

/// The message type (upper nibble) of a status byte.
#[must_use]
pub const fn message_type(status: u8) -> u8 {
    status & MIDI_STATUS_TYPE_MASK
}

/// A single note/CC number or an inclusive range of numbers.
///
/// Validated when registering handlers, not on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberRange {
    pub min: u8,
    pub max: u8,
}

impl NumberRange {
    #[must_use]
    pub const fn single(number: u8) -> Self {
        Self {
            min: number,
            max: number,
        }
    }

    /// Check the bounds.
    ///
    /// `invalid_number` maps the first out-of-range number to the
    /// appropriate error, e.g. [`Error::InvalidNote`].
    pub fn validate(self, invalid_number: impl FnOnce(u8) -> Error) -> Result<RangeInclusive<u8>> {
        let Self { min, max } = self;
        if min > max {
            return Err(Error::InvalidRange { min, max });
        }
        if max > U7_MAX {
            return Err(invalid_number(if min > U7_MAX { min } else { max }));
        }
        Ok(min..=max)
    }
}

impl From<u8> for NumberRange {
    fn from(from: u8) -> Self {
        Self::single(from)
    }
}

impl From<[u8; 2]> for NumberRange {
    fn from([min, max]: [u8; 2]) -> Self {
        Self { min, max }
    }
}

impl From<RangeInclusive<u8>> for NumberRange {
    fn from(from: RangeInclusive<u8>) -> Self {
        Self {
            min: *from.start(),
            max: *from.end(),
        }
    }
}

pub fn validate_note(note: u8) -> Result<u8> {
    if note > U7_MAX {
        return Err(Error::InvalidNote(note));
    }
    Ok(note)
}

pub fn validate_cc(cc: u8) -> Result<u8> {
    if cc > U7_MAX {
        return Err(Error::InvalidCc(cc));
    }
    Ok(cc)
}

pub fn validate_u7(value: u8) -> Result<u8> {
    if value > U7_MAX {
        return Err(Error::InvalidU7(value));
    }
    Ok(value)
}

/// A decoded MIDI channel voice message as received by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub ts: TimeStamp,
    pub status: u8,
    pub channel: Channel,
    /// Note or CC number
    pub number: u8,
    /// Velocity or CC value
    pub value: u8,
}

impl MidiEvent {
    #[must_use]
    pub const fn message_type(&self) -> u8 {
        message_type(self.status)
    }

    #[must_use]
    pub const fn is_cc(&self) -> bool {
        self.message_type() == MIDI_STATUS_CC
    }

    #[must_use]
    pub const fn is_note_off(&self) -> bool {
        self.message_type() == MIDI_STATUS_NOTE_OFF
    }

    #[must_use]
    pub const fn is_note_on(&self) -> bool {
        self.message_type() == MIDI_STATUS_NOTE_ON
    }

    /// A note message that releases a key.
    ///
    /// Both an explicit Note-Off and a Note-On with velocity 0.
    #[must_use]
    pub const fn is_note_release(&self) -> bool {
        self.is_note_off() || (self.is_note_on() && self.value == 0)
    }
}

/// Complete MIDI message, e.g. as sent to an output port.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum MidiMessage {
    NoteOff {
        channel: Channel,
        note: u8,
        velocity: u8,
    },
    NoteOn {
        channel: Channel,
        note: u8,
        velocity: u8,
    },
    ControlChange {
        channel: Channel,
        cc: u8,
        value: u8,
    },
    SysEx(Vec<u8>),
    Other {
        status: u8,
        data1: u8,
        data2: u8,
    },
}

impl MidiMessage {
    #[must_use]
    pub const fn decode(status: u8, data1: u8, data2: u8) -> Self {
        let channel = Channel::from_status(status);
        match message_type(status) {
            MIDI_STATUS_NOTE_OFF => Self::NoteOff {
                channel,
                note: data1,
                velocity: data2,
            },
            MIDI_STATUS_NOTE_ON => Self::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            },
            MIDI_STATUS_CC => Self::ControlChange {
                channel,
                cc: data1,
                value: data2,
            },
            _ => Self::Other {
                status,
                data1,
                data2,
            },
        }
    }

    /// Encode short messages as status and data bytes.
    ///
    /// Returns `None` for [`MidiMessage::SysEx`].
    #[must_use]
    pub fn encode(&self) -> Option<[u8; 3]> {
        let bytes = match *self {
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => [channel.status(MIDI_STATUS_NOTE_OFF), note, velocity],
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => [channel.status(MIDI_STATUS_NOTE_ON), note, velocity],
            Self::ControlChange { channel, cc, value } => {
                [channel.status(MIDI_STATUS_CC), cc, value]
            }
            Self::Other {
                status,
                data1,
                data2,
            } => [status, data1, data2],
            Self::SysEx(_) => return None,
        };
        Some(bytes)
    }
}

/// Encoding of relative (endless encoder) values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelativeMode {
    /// Absolute values, no encoder.
    #[default]
    Absolute,
    /// Signed delta relative to a zero point, e.g. 64.
    Centered { zero: u8 },
    /// `1..=63` are positive and `64..=127` are negative (two's complement).
    Split,
}

impl RelativeMode {
    #[must_use]
    pub const fn is_relative(self) -> bool {
        !matches!(self, Self::Absolute)
    }

    /// Decode a received value into a signed delta.
    ///
    /// Returns `None` in absolute mode.
    #[must_use]
    pub fn delta(self, value: u8) -> Option<i32> {
        match self {
            Self::Absolute => None,
            Self::Centered { zero } => Some(i32::from(value) - i32::from(zero)),
            Self::Split => Some(split_u7_to_delta(value)),
        }
    }
}

/// Decode a 7-bit two's complement delta.
#[must_use]
pub fn split_u7_to_delta(value: u8) -> i32 {
    let value = i32::from(value & U7_MAX);
    if value < 0x40 {
        value
    } else {
        value - 0x80
    }
}

/// The 6 hex digit message mask of a channel voice message type
/// as used for host note inputs, e.g. `"9?????"` or `"93????"`.
#[must_use]
pub fn note_input_mask(message_type: u8, channel: Option<Channel>) -> String {
    let type_digit = message_type >> 4;
    match channel {
        Some(channel) => format!("{type_digit:X}{:X}????", channel.value()),
        None => format!("{type_digit:X}?????"),
    }
}
