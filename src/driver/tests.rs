// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::sync::{Arc, Mutex};

use super::*;
use crate::{Control, ControlConfig, ControlSet, UniformValueSet, Value, ValueSet as _};

#[derive(Clone, Default)]
struct RecordingOutput {
    sent: Arc<Mutex<Vec<[u8; 3]>>>,
}

impl MidiOut for RecordingOutput {
    fn send_midi(&self, status: u8, data1: u8, data2: u8) {
        self.sent.lock().unwrap().push([status, data1, data2]);
    }

    fn send_sysex(&self, _data: &[u8]) {}
}

#[test]
fn forwards_input_and_flushes_on_exit() {
    let output = RecordingOutput::default();
    let sent = Arc::clone(&output.sent);
    let (driver_thread, driver_input) = DriverThread::spawn(
        DriverConfig::default(),
        vec![Box::new(output)],
        |session| {
            let dispatcher = session.midi_event_dispatcher(PortIndex::new(0))?;
            let flush_dispatcher = session.midi_flush_dispatcher(PortIndex::new(0))?;
            dispatcher.on_cc(
                7,
                move |event| {
                    flush_dispatcher
                        .enqueue_note_on(event.channel, 60, event.value)
                        .unwrap();
                },
                None,
            )?;
            Ok(())
        },
    );
    driver_input
        .send_midi(PortIndex::new(0), &[0xb2, 7, 100])
        .unwrap();
    drop(driver_input);
    driver_thread.join().unwrap();
    assert_eq!(vec![[0x92, 60, 100]], *sent.lock().unwrap());
}

#[test]
fn controls_receive_input_on_driver_thread() {
    let received = Arc::new(Mutex::new(None));
    let (driver_thread, driver_input) = DriverThread::spawn(
        DriverConfig::default(),
        vec![Box::new(RecordingOutput::default())],
        {
            let received = Arc::clone(&received);
            move |session| {
                let control = Control::new(session, ControlConfig::new("Fader").with_value_cc(1))?;
                let control_set = ControlSet::new(session, "Faders", vec![control])?;
                let value = crate::BaseValue::new("Level", 0);
                let subscription = value.observable().subscribe(move |value| {
                    *received.lock().unwrap() = Some(*value);
                });
                let value_set = UniformValueSet::new(
                    session,
                    "Levels",
                    1,
                    vec![Rc::clone(&value) as Rc<dyn Value>],
                )?;
                control_set.set_value_set(Some(Rc::clone(&value_set) as _))?;
                assert_eq!(0, value_set.page());
                Ok((control_set, value_set, subscription))
            }
        },
    );
    driver_input
        .send_midi(PortIndex::new(0), &[0xb0, 1, 42])
        .unwrap();
    // Ignored: no control on channel 2
    driver_input
        .send_midi(PortIndex::new(0), &[0xb1, 1, 43])
        .unwrap();
    drop(driver_input);
    driver_thread.join().unwrap();
    assert_eq!(Some(42), *received.lock().unwrap());
}

#[test]
fn abort_running_driver() {
    let (driver_thread, driver_input) =
        DriverThread::spawn(DriverConfig::default(), Vec::new(), |_| Ok(()));
    assert!(driver_input.send_midi(PortIndex::new(0), &[0x90, 1, 1]).is_ok());
    driver_thread.abort_and_join().unwrap();
    assert!(driver_input
        .send_midi(PortIndex::new(0), &[0x90, 1, 1])
        .is_err());
}

#[test]
fn failed_setup_disconnects_inputs() {
    let (driver_thread, driver_input) = DriverThread::spawn(
        DriverConfig::default(),
        Vec::new(),
        |_| -> anyhow::Result<()> { anyhow::bail!("no controller") },
    );
    driver_thread.join().unwrap();
    assert!(driver_input
        .send_midi(PortIndex::new(0), &[0x90, 1, 1])
        .is_err());
}

#[test]
fn empty_input_is_ignored() {
    let (driver_thread, driver_input) =
        DriverThread::spawn(DriverConfig::default(), Vec::new(), |_| Ok(()));
    assert!(driver_input.send_midi(PortIndex::new(0), &[]).is_ok());
    drop(driver_input);
    driver_thread.join().unwrap();
}
