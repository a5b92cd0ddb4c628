// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! In-memory host for tests and demos.
//!
//! MIDI input is injected with [`LoopbackMidiIn::send()`], MIDI output is
//! recorded and could be inspected with [`LoopbackMidiOut::take_sent()`].
//! The clock only advances when asked to.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

use strum::IntoEnumIterator as _;

use super::{
    BoolCell, BoolObserver, CursorDevice, Host, IntegerCell, IntegerObserver, MidiCallback, MidiIn,
    MidiOut, NoteInput, RangedCell, Scrollable, StringArrayCell, StringArrayObserver, StringCell,
    StringObserver, SysexCallback, Task, Track, TrackBank, Transport, TransportProperty,
    U7Observer,
};
use crate::{util::U7_MAX, MidiMessage, PortIndex, TimeStamp};

type Observer<T> = Rc<dyn Fn(&T)>;

/// Host value cell that notifies observers on change.
pub struct MemoryCell<T> {
    value: RefCell<T>,
    observers: RefCell<Vec<Observer<T>>>,
}

impl<T: fmt::Debug> fmt::Debug for MemoryCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCell")
            .field("value", &self.value.borrow())
            .field("observers", &self.observers.borrow().len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> MemoryCell<T> {
    #[must_use]
    pub fn new(value: T) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(value),
            observers: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn value(&self) -> T {
        self.value.borrow().clone()
    }

    /// Update the value and notify all observers if it has changed.
    pub fn set_value(&self, value: T) -> bool {
        {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        let observers = self.observers.borrow().clone();
        for observer in observers {
            observer(&value);
        }
        true
    }

    pub fn observe(&self, observer: impl Fn(&T) + 'static) {
        self.observers.borrow_mut().push(Rc::new(observer));
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }
}

impl BoolCell for MemoryCell<bool> {
    fn get(&self) -> bool {
        self.value()
    }

    fn set(&self, value: bool) {
        self.set_value(value);
    }

    fn add_value_observer(&self, observer: BoolObserver) {
        self.observe(move |value| observer(*value));
    }
}

impl RangedCell for MemoryCell<u8> {
    fn get(&self) -> u8 {
        self.value()
    }

    fn set(&self, value: u8) {
        self.set_value(value.min(U7_MAX));
    }

    fn add_value_observer(&self, observer: U7Observer) {
        self.observe(move |value| observer(*value));
    }
}

impl IntegerCell for MemoryCell<i32> {
    fn get(&self) -> i32 {
        self.value()
    }

    fn set(&self, value: i32) {
        self.set_value(value);
    }

    fn add_value_observer(&self, observer: IntegerObserver) {
        self.observe(move |value| observer(*value));
    }
}

impl StringCell for MemoryCell<String> {
    fn get(&self) -> String {
        self.value()
    }

    fn add_value_observer(&self, observer: StringObserver) {
        self.observe(move |value: &String| observer(value));
    }
}

impl StringArrayCell for MemoryCell<Vec<String>> {
    fn get(&self) -> Vec<String> {
        self.value()
    }

    fn add_value_observer(&self, observer: StringArrayObserver) {
        self.observe(move |value: &Vec<String>| observer(value));
    }
}

fn matches_mask(mask: &str, status: u8, data1: u8, data2: u8) -> bool {
    let hex = format!("{status:02X}{data1:02X}{data2:02X}");
    mask.len() == hex.len()
        && mask
            .chars()
            .zip(hex.chars())
            .all(|(m, h)| m == '?' || m.eq_ignore_ascii_case(&h))
}

#[derive(Debug)]
pub struct LoopbackNoteInput {
    name: String,
    masks: Vec<String>,
    consume_events: Cell<bool>,
    received: RefCell<Vec<[u8; 3]>>,
}

impl LoopbackNoteInput {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn masks(&self) -> &[String] {
        &self.masks
    }

    #[must_use]
    pub fn is_consuming_events(&self) -> bool {
        self.consume_events.get()
    }

    /// Messages that matched one of the masks.
    #[must_use]
    pub fn take_received(&self) -> Vec<[u8; 3]> {
        std::mem::take(&mut *self.received.borrow_mut())
    }

    fn accept(&self, status: u8, data1: u8, data2: u8) -> bool {
        if !self
            .masks
            .iter()
            .any(|mask| matches_mask(mask, status, data1, data2))
        {
            return false;
        }
        self.received.borrow_mut().push([status, data1, data2]);
        true
    }
}

impl NoteInput for LoopbackNoteInput {
    fn set_should_consume_events(&self, consume: bool) {
        self.consume_events.set(consume);
    }
}

#[derive(Default)]
pub struct LoopbackMidiIn {
    midi_callback: RefCell<Option<Rc<dyn Fn(u8, u8, u8)>>>,
    sysex_callback: RefCell<Option<Rc<dyn Fn(&[u8])>>>,
    note_inputs: RefCell<Vec<Rc<LoopbackNoteInput>>>,
}

impl fmt::Debug for LoopbackMidiIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackMidiIn")
            .field("note_inputs", &self.note_inputs.borrow())
            .finish_non_exhaustive()
    }
}

impl LoopbackMidiIn {
    /// Inject a short message as if it was received from the device.
    pub fn send(&self, status: u8, data1: u8, data2: u8) {
        let mut consumed = false;
        for note_input in self.note_inputs.borrow().iter() {
            if note_input.accept(status, data1, data2) && note_input.is_consuming_events() {
                consumed = true;
            }
        }
        if consumed {
            log::trace!("Consumed by note input: {status:02x} {data1:02x} {data2:02x}");
            return;
        }
        let callback = self.midi_callback.borrow().clone();
        if let Some(callback) = callback {
            callback(status, data1, data2);
        }
    }

    pub fn send_message(&self, message: &MidiMessage) {
        match message {
            MidiMessage::SysEx(data) => self.send_sysex(data),
            short => {
                if let Some([status, data1, data2]) = short.encode() {
                    self.send(status, data1, data2);
                }
            }
        }
    }

    pub fn send_sysex(&self, data: &[u8]) {
        let callback = self.sysex_callback.borrow().clone();
        if let Some(callback) = callback {
            callback(data);
        }
    }

    #[must_use]
    pub fn note_inputs(&self) -> Vec<Rc<LoopbackNoteInput>> {
        self.note_inputs.borrow().clone()
    }
}

impl MidiIn for LoopbackMidiIn {
    fn set_midi_callback(&self, callback: MidiCallback) {
        *self.midi_callback.borrow_mut() = Some(Rc::from(callback));
    }

    fn set_sysex_callback(&self, callback: SysexCallback) {
        *self.sysex_callback.borrow_mut() = Some(Rc::from(callback));
    }

    fn create_note_input(&self, name: &str, masks: &[String]) -> Rc<dyn NoteInput> {
        let note_input = Rc::new(LoopbackNoteInput {
            name: name.to_owned(),
            masks: masks.to_vec(),
            consume_events: Cell::new(true),
            received: RefCell::new(Vec::new()),
        });
        self.note_inputs.borrow_mut().push(Rc::clone(&note_input));
        note_input
    }
}

#[derive(Debug, Default)]
pub struct LoopbackMidiOut {
    sent: RefCell<Vec<MidiMessage>>,
}

impl LoopbackMidiOut {
    /// All messages that have been sent since the last invocation.
    #[must_use]
    pub fn take_sent(&self) -> Vec<MidiMessage> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    #[must_use]
    pub fn sent_len(&self) -> usize {
        self.sent.borrow().len()
    }
}

impl MidiOut for LoopbackMidiOut {
    fn send_midi(&self, status: u8, data1: u8, data2: u8) {
        self.sent
            .borrow_mut()
            .push(MidiMessage::decode(status, data1, data2));
    }

    fn send_sysex(&self, data: &[u8]) {
        self.sent.borrow_mut().push(MidiMessage::SysEx(data.to_vec()));
    }
}

#[derive(Debug)]
pub struct LoopbackTransport {
    properties: HashMap<TransportProperty, Rc<MemoryCell<bool>>>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        let properties = TransportProperty::iter()
            .map(|property| (property, MemoryCell::new(false)))
            .collect();
        Self { properties }
    }
}

impl LoopbackTransport {
    #[must_use]
    pub fn cell(&self, property: TransportProperty) -> Rc<MemoryCell<bool>> {
        // All properties are populated on construction
        self.properties
            .get(&property)
            .map_or_else(|| MemoryCell::new(false), Rc::clone)
    }
}

impl Transport for LoopbackTransport {
    fn property(&self, property: TransportProperty) -> Rc<dyn BoolCell> {
        self.cell(property)
    }
}

struct ScheduledTask {
    due: TimeStamp,
    seq: u64,
    task: Task,
}

/// In-memory [`Host`] with a manually advanced clock.
pub struct LoopbackHost {
    inputs: Vec<Rc<LoopbackMidiIn>>,
    outputs: Vec<Rc<LoopbackMidiOut>>,
    transport: Option<Rc<LoopbackTransport>>,
    now: Cell<TimeStamp>,
    next_seq: Cell<u64>,
    tasks: RefCell<Vec<ScheduledTask>>,
}

impl fmt::Debug for LoopbackHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackHost")
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("now", &self.now.get())
            .field("pending_tasks", &self.tasks.borrow().len())
            .finish_non_exhaustive()
    }
}

impl LoopbackHost {
    #[must_use]
    pub fn new(num_inputs: usize, num_outputs: usize) -> Rc<Self> {
        Self::build(num_inputs, num_outputs, Some(Rc::default()))
    }

    /// A host without a global transport.
    #[must_use]
    pub fn without_transport(num_inputs: usize, num_outputs: usize) -> Rc<Self> {
        Self::build(num_inputs, num_outputs, None)
    }

    fn build(
        num_inputs: usize,
        num_outputs: usize,
        transport: Option<Rc<LoopbackTransport>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            inputs: (0..num_inputs).map(|_| Rc::default()).collect(),
            outputs: (0..num_outputs).map(|_| Rc::default()).collect(),
            transport,
            now: Cell::new(TimeStamp::default()),
            next_seq: Cell::new(0),
            tasks: RefCell::new(Vec::new()),
        })
    }

    /// Panics if the port does not exist.
    #[must_use]
    pub fn input(&self, port: usize) -> Rc<LoopbackMidiIn> {
        Rc::clone(&self.inputs[port])
    }

    /// Panics if the port does not exist.
    #[must_use]
    pub fn output(&self, port: usize) -> Rc<LoopbackMidiOut> {
        Rc::clone(&self.outputs[port])
    }

    #[must_use]
    pub fn loopback_transport(&self) -> Option<Rc<LoopbackTransport>> {
        self.transport.clone()
    }

    #[must_use]
    pub fn pending_task_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    fn take_next_due_task(&self, until: TimeStamp) -> Option<ScheduledTask> {
        let mut tasks = self.tasks.borrow_mut();
        let (index, _) = tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due <= until)
            .min_by_key(|(_, task)| (task.due, task.seq))?;
        Some(tasks.swap_remove(index))
    }

    /// Advance the clock and run all tasks that are due in order.
    pub fn advance(&self, duration: Duration) {
        let until = self.now.get().saturating_add(duration);
        while let Some(ScheduledTask { due, task, .. }) = self.take_next_due_task(until) {
            if due > self.now.get() {
                self.now.set(due);
            }
            task();
        }
        self.now.set(until);
    }
}

impl Host for LoopbackHost {
    fn midi_in(&self, port: PortIndex) -> Option<Rc<dyn MidiIn>> {
        self.inputs
            .get(port.value())
            .map(|midi_in| Rc::clone(midi_in) as _)
    }

    fn midi_out(&self, port: PortIndex) -> Option<Rc<dyn MidiOut>> {
        self.outputs
            .get(port.value())
            .map(|midi_out| Rc::clone(midi_out) as _)
    }

    fn now(&self) -> TimeStamp {
        self.now.get()
    }

    fn schedule_task(&self, delay: Duration, task: Task) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let due = self.now.get().saturating_add(delay);
        self.tasks.borrow_mut().push(ScheduledTask { due, seq, task });
    }

    fn transport(&self) -> Option<Rc<dyn Transport>> {
        self.transport
            .as_ref()
            .map(|transport| Rc::clone(transport) as _)
    }
}

/// Cursor device with a fixed number of remote control pages.
///
/// The parameters of the selected page are mirrored into a separate set
/// of cells that keep their identity when the selected page changes.
#[derive(Debug)]
pub struct LoopbackCursorDevice {
    name: Rc<MemoryCell<String>>,
    is_pinned: Rc<MemoryCell<bool>>,
    page_names: Rc<MemoryCell<Vec<String>>>,
    selected_page: Rc<MemoryCell<i32>>,
    pages: Vec<Vec<Rc<MemoryCell<u8>>>>,
    selected_parameters: Vec<Rc<MemoryCell<u8>>>,
}

impl LoopbackCursorDevice {
    #[must_use]
    pub fn new(name: &str, page_names: &[&str], parameter_count: usize) -> Rc<Self> {
        let pages = page_names
            .iter()
            .map(|_| (0..parameter_count).map(|_| MemoryCell::new(0)).collect())
            .collect::<Vec<Vec<_>>>();
        let selected_parameters = (0..parameter_count)
            .map(|_| MemoryCell::new(0))
            .collect::<Vec<_>>();
        let device = Rc::new(Self {
            name: MemoryCell::new(name.to_owned()),
            is_pinned: MemoryCell::new(false),
            page_names: MemoryCell::new(page_names.iter().map(|&name| name.to_owned()).collect()),
            selected_page: MemoryCell::new(0),
            pages,
            selected_parameters,
        });
        device.connect_selected_parameters();
        device
    }

    fn connect_selected_parameters(self: &Rc<Self>) {
        for (index, selected) in self.selected_parameters.iter().enumerate() {
            let weak = Rc::downgrade(self);
            selected.observe(move |value| {
                let Some(device) = weak.upgrade() else {
                    return;
                };
                if let Some(cell) = device.selected_page_parameter(index) {
                    cell.set_value(*value);
                }
            });
        }
        for (page, parameters) in self.pages.iter().enumerate() {
            for (index, cell) in parameters.iter().enumerate() {
                let weak = Rc::downgrade(self);
                cell.observe(move |value| {
                    let Some(device) = weak.upgrade() else {
                        return;
                    };
                    if device.selected_page_index() == Some(page) {
                        device.selected_parameters[index].set_value(*value);
                    }
                });
            }
        }
        let weak: Weak<Self> = Rc::downgrade(self);
        self.selected_page.observe(move |_| {
            let Some(device) = weak.upgrade() else {
                return;
            };
            for (index, selected) in device.selected_parameters.iter().enumerate() {
                let value = device
                    .selected_page_parameter(index)
                    .map_or(0, |cell| cell.value());
                selected.set_value(value);
            }
        });
    }

    fn selected_page_index(&self) -> Option<usize> {
        usize::try_from(self.selected_page.value())
            .ok()
            .filter(|page| *page < self.pages.len())
    }

    fn selected_page_parameter(&self, index: usize) -> Option<&Rc<MemoryCell<u8>>> {
        self.pages.get(self.selected_page_index()?)?.get(index)
    }

    #[must_use]
    pub fn name_cell(&self) -> &Rc<MemoryCell<String>> {
        &self.name
    }

    #[must_use]
    pub fn is_pinned_cell(&self) -> &Rc<MemoryCell<bool>> {
        &self.is_pinned
    }

    #[must_use]
    pub fn page_names_cell(&self) -> &Rc<MemoryCell<Vec<String>>> {
        &self.page_names
    }

    #[must_use]
    pub fn selected_page_cell(&self) -> &Rc<MemoryCell<i32>> {
        &self.selected_page
    }

    /// Panics if out of range.
    #[must_use]
    pub fn page_parameter_cell(&self, page: usize, index: usize) -> Rc<MemoryCell<u8>> {
        Rc::clone(&self.pages[page][index])
    }
}

impl CursorDevice for LoopbackCursorDevice {
    fn name(&self) -> Rc<dyn StringCell> {
        Rc::clone(&self.name) as _
    }

    fn is_pinned(&self) -> Rc<dyn BoolCell> {
        Rc::clone(&self.is_pinned) as _
    }

    fn page_names(&self) -> Rc<dyn StringArrayCell> {
        Rc::clone(&self.page_names) as _
    }

    fn selected_page(&self) -> Rc<dyn IntegerCell> {
        Rc::clone(&self.selected_page) as _
    }

    fn parameter_count(&self) -> usize {
        self.selected_parameters.len()
    }

    fn parameter(&self, index: usize) -> Rc<dyn RangedCell> {
        self.selected_parameters
            .get(index)
            .map_or_else(|| MemoryCell::new(0), Rc::clone) as _
    }

    fn page_parameter(&self, page: usize, index: usize) -> Rc<dyn RangedCell> {
        self.pages
            .get(page)
            .and_then(|parameters| parameters.get(index))
            .map_or_else(|| MemoryCell::new(0), Rc::clone) as _
    }
}

#[derive(Debug)]
pub struct LoopbackTrack {
    pub name: Rc<MemoryCell<String>>,
    pub volume: Rc<MemoryCell<u8>>,
    pub pan: Rc<MemoryCell<u8>>,
    pub mute: Rc<MemoryCell<bool>>,
    pub solo: Rc<MemoryCell<bool>>,
    pub arm: Rc<MemoryCell<bool>>,
    pub sends: Vec<Rc<MemoryCell<u8>>>,
}

impl LoopbackTrack {
    #[must_use]
    pub fn new(name: &str, send_count: usize) -> Rc<Self> {
        Rc::new(Self {
            name: MemoryCell::new(name.to_owned()),
            volume: MemoryCell::new(0),
            pan: MemoryCell::new(64),
            mute: MemoryCell::new(false),
            solo: MemoryCell::new(false),
            arm: MemoryCell::new(false),
            sends: (0..send_count).map(|_| MemoryCell::new(0)).collect(),
        })
    }
}

impl Track for LoopbackTrack {
    fn name(&self) -> Rc<dyn StringCell> {
        Rc::clone(&self.name) as _
    }

    fn volume(&self) -> Rc<dyn RangedCell> {
        Rc::clone(&self.volume) as _
    }

    fn pan(&self) -> Rc<dyn RangedCell> {
        Rc::clone(&self.pan) as _
    }

    fn mute(&self) -> Rc<dyn BoolCell> {
        Rc::clone(&self.mute) as _
    }

    fn solo(&self) -> Rc<dyn BoolCell> {
        Rc::clone(&self.solo) as _
    }

    fn arm(&self) -> Rc<dyn BoolCell> {
        Rc::clone(&self.arm) as _
    }

    fn send(&self, index: usize) -> Option<Rc<dyn RangedCell>> {
        self.sends.get(index).map(|send| Rc::clone(send) as _)
    }
}

/// Scrollable bank that keeps the can-scroll flags up to date.
#[derive(Debug)]
pub struct LoopbackScrollable {
    item_count: Rc<MemoryCell<i32>>,
    scroll_position: Rc<MemoryCell<i32>>,
    page_size: usize,
    can_scroll_forwards: Rc<MemoryCell<bool>>,
    can_scroll_backwards: Rc<MemoryCell<bool>>,
}

impl LoopbackScrollable {
    #[must_use]
    pub fn new(page_size: usize, item_count: usize) -> Rc<Self> {
        let scrollable = Rc::new(Self {
            item_count: MemoryCell::new(i32::try_from(item_count).unwrap_or(i32::MAX)),
            scroll_position: MemoryCell::new(0),
            page_size,
            can_scroll_forwards: MemoryCell::new(false),
            can_scroll_backwards: MemoryCell::new(false),
        });
        for cell in [&scrollable.item_count, &scrollable.scroll_position] {
            let weak = Rc::downgrade(&scrollable);
            cell.observe(move |_| {
                if let Some(scrollable) = weak.upgrade() {
                    scrollable.update_flags();
                }
            });
        }
        scrollable.update_flags();
        scrollable
    }

    fn update_flags(&self) {
        let item_count = i64::from(self.item_count.value());
        let position = i64::from(self.scroll_position.value());
        let page_size = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        self.can_scroll_forwards
            .set_value(position.saturating_add(page_size) < item_count);
        self.can_scroll_backwards.set_value(position > 0);
    }

    #[must_use]
    pub fn item_count_cell(&self) -> &Rc<MemoryCell<i32>> {
        &self.item_count
    }

    #[must_use]
    pub fn scroll_position_cell(&self) -> &Rc<MemoryCell<i32>> {
        &self.scroll_position
    }
}

impl Scrollable for LoopbackScrollable {
    fn item_count(&self) -> Rc<dyn IntegerCell> {
        Rc::clone(&self.item_count) as _
    }

    fn scroll_position(&self) -> Rc<dyn IntegerCell> {
        Rc::clone(&self.scroll_position) as _
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn can_scroll_forwards(&self) -> Rc<dyn BoolCell> {
        Rc::clone(&self.can_scroll_forwards) as _
    }

    fn can_scroll_backwards(&self) -> Rc<dyn BoolCell> {
        Rc::clone(&self.can_scroll_backwards) as _
    }
}

#[derive(Debug)]
pub struct LoopbackTrackBank {
    scrollable: Rc<LoopbackScrollable>,
    scene_bank: Rc<LoopbackScrollable>,
    tracks: Vec<Rc<LoopbackTrack>>,
    send_count: usize,
}

impl LoopbackTrackBank {
    #[must_use]
    pub fn new(num_tracks: usize, num_scenes: usize, send_count: usize) -> Rc<Self> {
        Rc::new(Self {
            scrollable: LoopbackScrollable::new(num_tracks, num_tracks),
            scene_bank: LoopbackScrollable::new(num_scenes, num_scenes),
            tracks: (0..num_tracks)
                .map(|index| LoopbackTrack::new(&format!("Track {}", index + 1), send_count))
                .collect(),
            send_count,
        })
    }

    #[must_use]
    pub fn loopback_scrollable(&self) -> &Rc<LoopbackScrollable> {
        &self.scrollable
    }

    #[must_use]
    pub fn loopback_scene_bank(&self) -> &Rc<LoopbackScrollable> {
        &self.scene_bank
    }

    /// Panics if out of range.
    #[must_use]
    pub fn loopback_track(&self, index: usize) -> Rc<LoopbackTrack> {
        Rc::clone(&self.tracks[index])
    }
}

impl TrackBank for LoopbackTrackBank {
    fn scrollable(&self) -> Rc<dyn Scrollable> {
        Rc::clone(&self.scrollable) as _
    }

    fn scene_bank(&self) -> Rc<dyn Scrollable> {
        Rc::clone(&self.scene_bank) as _
    }

    fn track(&self, index: usize) -> Option<Rc<dyn Track>> {
        self.tracks.get(index).map(|track| Rc::clone(track) as _)
    }

    fn send_count(&self) -> usize {
        self.send_count
    }
}
