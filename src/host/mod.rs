// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Interfaces of the host environment.
//!
//! The host owns the MIDI ports, the clock, and the application state
//! (transport, tracks, devices) that values are bound to. Everything is
//! single-threaded: all callbacks are invoked on the thread that owns
//! the [`Session`](crate::Session).

use std::{rc::Rc, time::Duration};

use strum::{Display, EnumIter, IntoStaticStr};

use crate::{PortIndex, TimeStamp};

pub mod loopback;

/// Callback for short MIDI messages: status, data1, data2.
pub type MidiCallback = Box<dyn Fn(u8, u8, u8)>;

pub type SysexCallback = Box<dyn Fn(&[u8])>;

/// A deferred task scheduled on the host.
pub type Task = Box<dyn FnOnce()>;

pub trait Host {
    fn midi_in(&self, port: PortIndex) -> Option<Rc<dyn MidiIn>>;

    fn midi_out(&self, port: PortIndex) -> Option<Rc<dyn MidiOut>>;

    /// The current time.
    fn now(&self) -> TimeStamp;

    /// Run a task once after a delay.
    ///
    /// Tasks run on the session thread. The actual delay might be longer
    /// than requested, depending on the host's timer resolution.
    fn schedule_task(&self, delay: Duration, task: Task);

    /// The global transport, if the host provides one.
    fn transport(&self) -> Option<Rc<dyn Transport>> {
        None
    }
}

pub trait MidiIn {
    /// Replace the callback for short messages.
    fn set_midi_callback(&self, callback: MidiCallback);

    fn set_sysex_callback(&self, callback: SysexCallback);

    /// Create a note source for the host from messages matching one of the masks.
    ///
    /// Masks consist of 6 hex digits with `?` as wildcard, e.g. `"9?????"`.
    fn create_note_input(&self, name: &str, masks: &[String]) -> Rc<dyn NoteInput>;
}

pub trait MidiOut {
    fn send_midi(&self, status: u8, data1: u8, data2: u8);

    fn send_sysex(&self, data: &[u8]);
}

pub trait NoteInput {
    /// Prevent matching messages from reaching the MIDI callbacks.
    fn set_should_consume_events(&self, consume: bool);
}

pub type BoolObserver = Box<dyn Fn(bool)>;

pub type U7Observer = Box<dyn Fn(u8)>;

pub type IntegerObserver = Box<dyn Fn(i32)>;

pub type StringObserver = Box<dyn Fn(&str)>;

pub type StringArrayObserver = Box<dyn Fn(&[String])>;

/// Boolean host state, e.g. a mute button.
pub trait BoolCell {
    fn get(&self) -> bool;

    fn set(&self, value: bool);

    fn toggle(&self) {
        self.set(!self.get());
    }

    /// Observers are invoked after the value has changed.
    fn add_value_observer(&self, observer: BoolObserver);
}

/// Continuous host parameter, scaled to `0..=127`.
pub trait RangedCell {
    fn get(&self) -> u8;

    fn set(&self, value: u8);

    /// Add a signed increment, clamped to the valid range.
    fn inc(&self, delta: i32) {
        self.set(crate::util::clamp_u7(i32::from(self.get()) + delta));
    }

    fn add_value_observer(&self, observer: U7Observer);
}

pub trait IntegerCell {
    fn get(&self) -> i32;

    fn set(&self, value: i32);

    fn add_value_observer(&self, observer: IntegerObserver);
}

pub trait StringCell {
    fn get(&self) -> String;

    fn add_value_observer(&self, observer: StringObserver);
}

pub trait StringArrayCell {
    fn get(&self) -> Vec<String>;

    fn add_value_observer(&self, observer: StringArrayObserver);
}

/// Boolean properties of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum TransportProperty {
    Play,
    Record,
    Loop,
    Metronome,
    PunchIn,
    PunchOut,
    Overdub,
    ArrangerAutomationWrite,
}

pub trait Transport {
    fn property(&self, property: TransportProperty) -> Rc<dyn BoolCell>;
}

/// The device that is currently focused by the host.
pub trait CursorDevice {
    fn name(&self) -> Rc<dyn StringCell>;

    /// Pinned devices do not follow the host's selection.
    fn is_pinned(&self) -> Rc<dyn BoolCell>;

    fn page_names(&self) -> Rc<dyn StringArrayCell>;

    /// Index of the selected remote control page.
    fn selected_page(&self) -> Rc<dyn IntegerCell>;

    /// Number of remote control parameters per page.
    fn parameter_count(&self) -> usize;

    /// Parameter on the selected page.
    fn parameter(&self, index: usize) -> Rc<dyn RangedCell>;

    /// Parameter on an arbitrary page, independent of the selection.
    fn page_parameter(&self, page: usize, index: usize) -> Rc<dyn RangedCell>;
}

pub trait Track {
    fn name(&self) -> Rc<dyn StringCell>;

    fn volume(&self) -> Rc<dyn RangedCell>;

    fn pan(&self) -> Rc<dyn RangedCell>;

    fn mute(&self) -> Rc<dyn BoolCell>;

    fn solo(&self) -> Rc<dyn BoolCell>;

    fn arm(&self) -> Rc<dyn BoolCell>;

    /// Send level, `None` if the index is out of range.
    fn send(&self, index: usize) -> Option<Rc<dyn RangedCell>>;
}

/// A window into a longer list of items, e.g. tracks or scenes.
pub trait Scrollable {
    fn item_count(&self) -> Rc<dyn IntegerCell>;

    /// Index of the first visible item.
    fn scroll_position(&self) -> Rc<dyn IntegerCell>;

    /// Number of visible items.
    fn page_size(&self) -> usize;

    fn can_scroll_forwards(&self) -> Rc<dyn BoolCell>;

    fn can_scroll_backwards(&self) -> Rc<dyn BoolCell>;
}

pub trait TrackBank {
    fn scrollable(&self) -> Rc<dyn Scrollable>;

    fn scene_bank(&self) -> Rc<dyn Scrollable>;

    /// Track in the visible window, `None` if out of range.
    fn track(&self, index: usize) -> Option<Rc<dyn Track>>;

    /// Number of sends per track.
    fn send_count(&self) -> usize;
}
