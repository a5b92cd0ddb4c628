// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::{
    host::{Host, MidiCallback, MidiIn, MidiOut, NoteInput, SysexCallback, Task},
    PortIndex, TimeStamp,
};

#[derive(Default)]
pub(super) struct DriverMidiIn {
    midi_callback: RefCell<Option<MidiCallback>>,
    sysex_callback: RefCell<Option<SysexCallback>>,
}

impl DriverMidiIn {
    pub(super) fn receive_midi(&self, status: u8, data1: u8, data2: u8) {
        let callback = self.midi_callback.borrow();
        let Some(callback) = callback.as_ref() else {
            log::debug!("Dropping MIDI input {status:02x} {data1:02x} {data2:02x}");
            return;
        };
        callback(status, data1, data2);
    }

    pub(super) fn receive_sysex(&self, data: &[u8]) {
        let callback = self.sysex_callback.borrow();
        let Some(callback) = callback.as_ref() else {
            log::debug!("Dropping SysEx input {data:02x?}");
            return;
        };
        callback(data);
    }
}

impl MidiIn for DriverMidiIn {
    fn set_midi_callback(&self, callback: MidiCallback) {
        *self.midi_callback.borrow_mut() = Some(callback);
    }

    fn set_sysex_callback(&self, callback: SysexCallback) {
        *self.sysex_callback.borrow_mut() = Some(callback);
    }

    fn create_note_input(&self, name: &str, masks: &[String]) -> Rc<dyn NoteInput> {
        log::debug!("Note input \"{name}\" with masks {masks:?} is not forwarded to any host");
        Rc::new(DriverNoteInput {
            name: name.to_owned(),
        })
    }
}

/// Without a host there is no one who could consume the events.
struct DriverNoteInput {
    name: String,
}

impl NoteInput for DriverNoteInput {
    fn set_should_consume_events(&self, consume: bool) {
        log::debug!(
            "Ignoring consumption {consume} of note input \"{name}\"",
            name = self.name
        );
    }
}

struct ScheduledTask {
    due: Instant,
    seq: u64,
    task: Task,
}

/// Host of a standalone driver without any DAW.
pub(super) struct DriverHost {
    started: Instant,
    inputs: Vec<Rc<DriverMidiIn>>,
    outputs: Vec<Rc<dyn MidiOut>>,
    next_task_seq: Cell<u64>,
    tasks: RefCell<Vec<ScheduledTask>>,
}

impl fmt::Debug for DriverHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHost")
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("tasks", &self.tasks.borrow().len())
            .finish_non_exhaustive()
    }
}

impl DriverHost {
    pub(super) fn new(num_inputs: usize, outputs: Vec<Rc<dyn MidiOut>>) -> Self {
        Self {
            started: Instant::now(),
            inputs: (0..num_inputs).map(|_| Default::default()).collect(),
            outputs,
            next_task_seq: Cell::new(0),
            tasks: RefCell::new(Vec::new()),
        }
    }

    pub(super) fn input(&self, port: PortIndex) -> Option<&Rc<DriverMidiIn>> {
        self.inputs.get(port.value())
    }

    /// Run all tasks that are due, in order of their due time.
    pub(super) fn run_due_tasks(&self, now: Instant) -> usize {
        let mut due_tasks = {
            let mut tasks = self.tasks.borrow_mut();
            let (due, pending): (Vec<_>, Vec<_>) = tasks.drain(..).partition(|task| task.due <= now);
            *tasks = pending;
            due
        };
        due_tasks.sort_by_key(|task: &ScheduledTask| (task.due, task.seq));
        let count = due_tasks.len();
        // Tasks might schedule new tasks
        for ScheduledTask { task, .. } in due_tasks {
            task();
        }
        count
    }
}

impl Host for DriverHost {
    fn midi_in(&self, port: PortIndex) -> Option<Rc<dyn MidiIn>> {
        self.inputs
            .get(port.value())
            .map(|input| Rc::clone(input) as _)
    }

    fn midi_out(&self, port: PortIndex) -> Option<Rc<dyn MidiOut>> {
        self.outputs.get(port.value()).map(Rc::clone)
    }

    #[allow(clippy::cast_possible_truncation)] // ~584k years
    fn now(&self) -> TimeStamp {
        TimeStamp::from_micros(self.started.elapsed().as_micros() as u64)
    }

    fn schedule_task(&self, delay: Duration, task: Task) {
        let seq = self.next_task_seq.get();
        self.next_task_seq.set(seq + 1);
        self.tasks.borrow_mut().push(ScheduledTask {
            due: Instant::now() + delay,
            seq,
            task,
        });
    }
}
