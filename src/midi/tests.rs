// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{cell::RefCell, rc::Rc, time::Duration};

use super::*;
use crate::{host::loopback::LoopbackHost, PortIndex, Session, SessionConfig};

type Log = Rc<RefCell<Vec<String>>>;

fn new_session() -> (Rc<LoopbackHost>, Rc<Session>) {
    let host = LoopbackHost::new(1, 1);
    let session = Session::new(Rc::clone(&host) as _, SessionConfig::default());
    (host, session)
}

fn logger(log: &Log, label: &'static str) -> impl Fn(&MidiEvent) + 'static {
    let log = Rc::clone(log);
    move |event: &MidiEvent| {
        log.borrow_mut().push(format!(
            "{label} {channel} {number} {value}",
            channel = event.channel,
            number = event.number,
            value = event.value
        ));
    }
}

fn ch(channel: u8) -> Channel {
    Channel::new(channel).unwrap()
}

#[test]
fn channel_bounds() {
    assert!(Channel::new(15).is_ok());
    assert!(matches!(Channel::new(16), Err(Error::InvalidChannel(16))));
    assert_eq!(ch(3), Channel::from_status(0x93));
    assert_eq!(0xb3, ch(3).status(MIDI_STATUS_CC));
}

#[test]
fn number_range_validation() {
    assert_eq!(
        10..=12,
        NumberRange::from([10, 12])
            .validate(Error::InvalidNote)
            .unwrap()
    );
    assert!(matches!(
        NumberRange::from([12, 10]).validate(Error::InvalidNote),
        Err(Error::InvalidRange { min: 12, max: 10 })
    ));
    assert!(matches!(
        NumberRange::from(120..=130).validate(Error::InvalidCc),
        Err(Error::InvalidCc(130))
    ));
    assert!(matches!(
        NumberRange::single(128).validate(Error::InvalidNote),
        Err(Error::InvalidNote(128))
    ));
}

#[test]
fn decode_and_encode_messages() {
    assert_eq!(
        MidiMessage::NoteOn {
            channel: ch(2),
            note: 60,
            velocity: 100
        },
        MidiMessage::decode(0x92, 60, 100)
    );
    assert_eq!(
        Some([0xbf, 7, 127]),
        MidiMessage::ControlChange {
            channel: ch(15),
            cc: 7,
            value: 127
        }
        .encode()
    );
    assert!(MidiMessage::decode(0xe0, 0, 64).is_other());
    assert!(MidiMessage::SysEx(vec![0xf0, 0xf7]).encode().is_none());
}

#[test]
fn relative_modes() {
    assert_eq!(None, RelativeMode::Absolute.delta(65));
    assert_eq!(Some(1), RelativeMode::Centered { zero: 64 }.delta(65));
    assert_eq!(Some(-2), RelativeMode::Centered { zero: 64 }.delta(62));
    assert_eq!(Some(3), RelativeMode::Split.delta(3));
    assert_eq!(Some(-1), RelativeMode::Split.delta(127));
    assert_eq!(-64, split_u7_to_delta(64));
}

#[test]
fn note_input_masks() {
    assert_eq!("9?????", note_input_mask(MIDI_STATUS_NOTE_ON, None));
    assert_eq!("E3????", note_input_mask(MIDI_STATUS_PITCH_BEND, Some(ch(3))));
}

#[test]
fn channel_specific_and_any_channel_handlers() {
    let (host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    let log = Log::default();
    dispatcher
        .on_cc(7, logger(&log, "channel 14"), Some(ch(14)))
        .unwrap();
    dispatcher.on_cc(7, logger(&log, "any"), None).unwrap();

    let input = host.input(0);
    input.send(ch(14).status(MIDI_STATUS_CC), 7, 100);
    input.send(ch(3).status(MIDI_STATUS_CC), 7, 50);
    // Different CC number
    input.send(ch(14).status(MIDI_STATUS_CC), 8, 1);

    // Handlers for any channel come first
    assert_eq!(
        vec!["any 14 7 100", "channel 14 14 7 100", "any 3 7 50"],
        *log.borrow()
    );
}

#[test]
fn handlers_are_invoked_in_registration_order() {
    let (host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    let log = Log::default();
    for label in ["first", "second", "third"] {
        dispatcher
            .on_note_pressed(36, logger(&log, label), None)
            .unwrap();
    }
    host.input(0).send(MIDI_STATUS_NOTE_ON, 36, 1);
    assert_eq!(
        vec!["first 0 36 1", "second 0 36 1", "third 0 36 1"],
        *log.borrow()
    );
}

#[test]
fn registration_order_spans_note_handler_kinds() {
    let (host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    let log = Log::default();
    dispatcher
        .on_note_pressed(36, logger(&log, "pressed"), None)
        .unwrap();
    dispatcher.on_note(36, logger(&log, "note"), None).unwrap();
    dispatcher
        .on_note_released(36, logger(&log, "released"), None)
        .unwrap();

    let input = host.input(0);
    input.send(MIDI_STATUS_NOTE_ON, 36, 1);
    input.send(MIDI_STATUS_NOTE_OFF, 36, 0);
    assert_eq!(
        vec![
            "pressed 0 36 1",
            "note 0 36 1",
            "note 0 36 0",
            "released 0 36 0"
        ],
        *log.borrow()
    );
}

#[test]
fn ranges_register_all_numbers() {
    let (host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    let log = Log::default();
    dispatcher
        .on_note([36, 39], logger(&log, "pad"), None)
        .unwrap();
    let input = host.input(0);
    for note in 35..=40 {
        input.send(MIDI_STATUS_NOTE_ON, note, 127);
    }
    assert_eq!(
        vec!["pad 0 36 127", "pad 0 37 127", "pad 0 38 127", "pad 0 39 127"],
        *log.borrow()
    );
}

#[test]
fn invalid_registrations_are_rejected() {
    let (_host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    assert!(matches!(
        dispatcher.on_cc(128, |_| {}, None),
        Err(Error::InvalidCc(128))
    ));
    assert!(matches!(
        dispatcher.on_note([10, 5], |_| {}, None),
        Err(Error::InvalidRange { .. })
    ));
}

#[test]
fn loose_note_off() {
    let (host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    assert!(dispatcher.is_loose_note_off());
    let log = Log::default();
    dispatcher
        .on_note_pressed(60, logger(&log, "pressed"), None)
        .unwrap();
    dispatcher
        .on_note_released(60, logger(&log, "released"), None)
        .unwrap();
    let input = host.input(0);

    input.send(MIDI_STATUS_NOTE_ON, 60, 0);
    input.send(MIDI_STATUS_NOTE_OFF, 60, 64);
    assert_eq!(vec!["released 0 60 0", "released 0 60 64"], *log.borrow());
    log.borrow_mut().clear();

    // Strict mode: only explicit Note-Off releases
    dispatcher.set_loose_note_off(false);
    input.send(MIDI_STATUS_NOTE_ON, 60, 0);
    input.send(MIDI_STATUS_NOTE_OFF, 60, 0);
    assert_eq!(vec!["pressed 0 60 0", "released 0 60 0"], *log.borrow());
}

#[test]
fn other_messages_are_ignored() {
    let (host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    let log = Log::default();
    dispatcher.on_note(0..=127, logger(&log, "note"), None).unwrap();
    dispatcher.on_cc(0..=127, logger(&log, "cc"), None).unwrap();
    let input = host.input(0);
    input.send(MIDI_STATUS_PITCH_BEND, 0, 64);
    input.send(MIDI_STATUS_PROGRAM_CHANGE, 1, 0);
    input.send(MIDI_STATUS_POLY_AFTERTOUCH, 60, 10);
    assert!(log.borrow().is_empty());
}

#[test]
fn sysex_handlers() {
    let (host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    let received = Rc::new(RefCell::new(Vec::new()));
    dispatcher.on_sysex({
        let received = Rc::clone(&received);
        move |data| received.borrow_mut().push(data.to_vec())
    });
    host.input(0).send_sysex(&[0xf0, 0x7e, 0x01, 0xf7]);
    assert_eq!(vec![vec![0xf0, 0x7e, 0x01, 0xf7]], *received.borrow());
}

#[test]
fn consumed_note_input_bypasses_handlers() {
    let (host, session) = new_session();
    let dispatcher = session.midi_event_dispatcher(PortIndex::new(0)).unwrap();
    let log = Log::default();
    dispatcher.on_note(60, logger(&log, "note"), None).unwrap();
    dispatcher.on_cc(1, logger(&log, "cc"), None).unwrap();
    let note_input = dispatcher.create_note_input("Keys", Some(ch(0)), true);
    let input = host.input(0);
    input.send(MIDI_STATUS_NOTE_ON, 60, 100);
    input.send(MIDI_STATUS_CC, 1, 2);
    // Notes on another channel are not matched
    input.send(ch(1).status(MIDI_STATUS_NOTE_ON), 60, 100);
    assert_eq!(vec!["cc 0 1 2", "note 1 60 100"], *log.borrow());
    log.borrow_mut().clear();

    note_input.set_should_consume_events(false);
    input.send(MIDI_STATUS_NOTE_ON, 60, 100);
    assert_eq!(vec!["note 0 60 100"], *log.borrow());
    assert_eq!(5, host.input(0).note_inputs()[0].masks().len());
}

#[test]
fn feedback_is_coalesced_until_flush() {
    let (host, session) = new_session();
    let dispatcher = session.midi_flush_dispatcher(PortIndex::new(0)).unwrap();
    dispatcher.enqueue_cc(ch(0), 7, 10).unwrap();
    dispatcher.enqueue_cc(ch(0), 7, 20).unwrap();
    dispatcher.enqueue_note_on(ch(1), 60, 127).unwrap();
    dispatcher.enqueue_cc(ch(1), 7, 30).unwrap();
    assert_eq!(3, dispatcher.pending_len());
    assert_eq!(0, host.output(0).sent_len());

    session.flush();
    assert_eq!(0, dispatcher.pending_len());
    let sent = host.output(0).take_sent();
    assert_eq!(3, sent.len());
    assert!(sent.contains(&MidiMessage::ControlChange {
        channel: ch(0),
        cc: 7,
        value: 20
    }));
    assert!(sent.contains(&MidiMessage::NoteOn {
        channel: ch(1),
        note: 60,
        velocity: 127
    }));

    session.flush();
    assert!(host.output(0).take_sent().is_empty());
}

#[test]
fn invalid_feedback_is_rejected() {
    let (_host, session) = new_session();
    let dispatcher = session.midi_flush_dispatcher(PortIndex::new(0)).unwrap();
    assert!(matches!(
        dispatcher.enqueue_cc(ch(0), 128, 0),
        Err(Error::InvalidCc(128))
    ));
    assert!(matches!(
        dispatcher.enqueue_note_on(ch(0), 1, 200),
        Err(Error::InvalidU7(200))
    ));
    assert_eq!(0, dispatcher.pending_len());
}

#[test]
fn immediate_and_scheduled_messages() {
    let (host, session) = new_session();
    let dispatcher = session.midi_flush_dispatcher(PortIndex::new(0)).unwrap();
    dispatcher.immediate_note_on(ch(0), 36, 127).unwrap();
    dispatcher
        .schedule_note_off(ch(0), 36, Duration::from_millis(100))
        .unwrap();
    assert_eq!(
        vec![MidiMessage::NoteOn {
            channel: ch(0),
            note: 36,
            velocity: 127
        }],
        host.output(0).take_sent()
    );
    host.advance(Duration::from_millis(99));
    assert!(host.output(0).take_sent().is_empty());
    host.advance(Duration::from_millis(1));
    assert_eq!(
        vec![MidiMessage::NoteOff {
            channel: ch(0),
            note: 36,
            velocity: 0
        }],
        host.output(0).take_sent()
    );
}
