// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use float_cmp::assert_approx_eq;

use super::*;
use crate::{
    host::loopback::LoopbackHost,
    midi::MIDI_STATUS_CC,
    value::ClickInput,
    Control, ControlConfig, SessionConfig, TimeStamp,
};

struct Fixture {
    host: Rc<LoopbackHost>,
    session: Rc<Session>,
    faders: Rc<ControlSet>,
    target_values: Vec<Rc<BaseValue>>,
    target: Observable<Option<ValueSetRef>>,
}

impl Fixture {
    fn new() -> Self {
        let host = LoopbackHost::new(1, 1);
        let session = Session::new(Rc::clone(&host) as _, SessionConfig::default());
        let controls = (0..4)
            .map(|cc| {
                Control::new(
                    &session,
                    ControlConfig::new(format!("Fader {}", cc + 1)).with_value_cc(cc),
                )
                .unwrap()
            })
            .collect();
        let faders = ControlSet::new(&session, "Faders", controls).unwrap();
        let target_values = vec![BaseValue::new("Cutoff", 0), BaseValue::new("Resonance", 0)];
        let target_set = UniformValueSet::new(
            &session,
            "Filter",
            2,
            target_values
                .iter()
                .map(|value| Rc::clone(value) as Rc<dyn Value>)
                .collect(),
        )
        .unwrap();
        Self {
            host,
            session,
            faders,
            target_values,
            target: Observable::new(Some(target_set as ValueSetRef)),
        }
    }

    fn morpher(&self, config: MorpherConfig) -> Rc<Morpher> {
        Morpher::new(&self.session, "Morph", config).unwrap()
    }

    fn set_target_values(&self, raw_values: [u8; 2]) {
        for (value, raw_value) in self.target_values.iter().zip(raw_values) {
            value.set_raw_value(raw_value);
        }
    }

    fn target_values(&self) -> Vec<u8> {
        self.target_values.iter().map(|value| value.value()).collect()
    }

    fn move_fader(&self, slot: u8, weight: u8) {
        self.host.input(0).send(MIDI_STATUS_CC, slot, weight);
    }
}

fn press(value: &Rc<dyn Value>) {
    value.on_click(ClickInput {
        pressed: true,
        ts: TimeStamp::default(),
    });
}

#[test]
fn normalization() {
    assert_approx_eq!(f64, 1.0, normalization_factor(127, 127.0));
    assert_approx_eq!(f64, 0.5, normalization_factor(127, 254.0));
    assert_approx_eq!(
        f64,
        0.5 * 64.0 / 127.0,
        normalization_factor(64, 128.0),
        epsilon = 1e-12
    );
    assert_approx_eq!(f64, 0.0, normalization_factor(0, 127.0));
}

#[test]
fn blending() {
    let reference = [0, 100, 64];
    assert_eq!(
        Some(vec![127, 0, 64]),
        blend_snapshots(&reference, &[(127, Some([127, 0, 64].as_slice()))])
    );
    // Two snapshots with equal full weights
    assert_eq!(
        Some(vec![50, 75, 64]),
        blend_snapshots(
            &reference,
            &[(127, Some([100, 100, 64].as_slice())), (127, Some([0, 50, 64].as_slice()))]
        )
    );
    // Empty slots dilute the other snapshots
    assert_eq!(
        Some(vec![64, 50, 64]),
        blend_snapshots(&reference, &[(127, Some([127, 0, 64].as_slice())), (127, None)])
    );
    assert_eq!(
        Some(reference.to_vec()),
        blend_snapshots(&reference, &[(127, None)])
    );
    assert_eq!(
        None,
        blend_snapshots(&reference, &[(0, Some([127, 127, 127].as_slice()))])
    );
    assert_eq!(None, blend_snapshots(&reference, &[]));
}

#[test]
fn snapshot_store_is_keyed_by_target() {
    let store = SnapshotStore::default();
    assert!(!store.has_snapshot("a", 0));
    store.save("a", 0, vec![1, 2]);
    store.save("b", 0, vec![3]);
    assert_eq!(Some(vec![1, 2]), store.load("a", 0));
    assert_eq!(Some(vec![3]), store.load("b", 0));
    assert_eq!(None, store.load("a", 1));
    assert_eq!(None, store.reference("a"));
    store.set_reference("a", Some(0));
    assert_eq!(Some(0), store.reference("a"));
    assert_eq!(None, store.reference("b"));
}

#[test]
fn invalid_configs_are_rejected() {
    let fixture = Fixture::new();
    assert!(matches!(
        Morpher::new(
            &fixture.session,
            "Morph",
            MorpherConfig {
                num_slots: 9,
                ..Default::default()
            }
        ),
        Err(Error::TooManySnapshotSlots {
            requested: 9,
            max: MAX_SNAPSHOT_SLOTS
        })
    ));
    assert!(matches!(
        Morpher::new(
            &fixture.session,
            "Morph",
            MorpherConfig {
                max_parameters: 129,
                ..Default::default()
            }
        ),
        Err(Error::TooManyMorphParameters { requested: 129, .. })
    ));
    assert!(matches!(
        Morpher::new(
            &fixture.session,
            "Morph",
            MorpherConfig {
                num_slots: 0,
                ..Default::default()
            }
        ),
        Err(Error::InvalidPageSize(0))
    ));
}

#[test]
fn morph_between_snapshots() {
    let fixture = Fixture::new();
    let morpher = fixture.morpher(MorpherConfig {
        num_slots: 4,
        ..Default::default()
    });
    morpher.activate(&fixture.faders, &fixture.target).unwrap();
    assert!(morpher.is_active());

    fixture.set_target_values([10, 20]);
    morpher.save_snapshot(0);
    fixture.set_target_values([110, 120]);
    morpher.save_snapshot(1);

    morpher.load_snapshot(0);
    assert_eq!(Some(0), morpher.reference_slot().get());
    assert_eq!(vec![10, 20], fixture.target_values());

    fixture.move_fader(1, 127);
    assert_eq!(vec![110, 120], fixture.target_values());

    // The reference slot itself contributes to the total weight
    fixture.move_fader(0, 127);
    assert_eq!(vec![60, 70], fixture.target_values());

    // All weights zero restores the reference
    fixture.move_fader(0, 0);
    fixture.move_fader(1, 0);
    assert_eq!(vec![10, 20], fixture.target_values());

    // Empty slots only contribute their weight
    fixture.move_fader(3, 127);
    assert_eq!(vec![10, 20], fixture.target_values());
    fixture.move_fader(1, 127);
    assert_eq!(vec![60, 70], fixture.target_values());
}

#[test]
fn slot_buttons_load_and_save() {
    let fixture = Fixture::new();
    let shift = Observable::new(false);
    let morpher = fixture.morpher(MorpherConfig {
        num_slots: 4,
        shift: Some(shift.clone()),
        ..Default::default()
    });
    morpher.activate(&fixture.faders, &fixture.target).unwrap();
    let slot_buttons = morpher.slot_buttons();
    let slot = |index| slot_buttons.value_at(0, index).unwrap();

    fixture.set_target_values([1, 2]);
    shift.set(true);
    press(&slot(2));
    assert!(fixture.session.snapshot_store().has_snapshot("Filter", 2));
    assert_eq!(None, morpher.reference_slot().get());

    shift.set(false);
    fixture.set_target_values([50, 50]);
    // Nothing saved
    press(&slot(3));
    assert_eq!(None, morpher.reference_slot().get());

    press(&slot(2));
    assert_eq!(Some(2), morpher.reference_slot().get());
    assert_eq!(vec![1, 2], fixture.target_values());
    assert_eq!(127, slot(2).value());
    assert_eq!(0, slot(3).value());
    assert_eq!(Some(2), fixture.session.snapshot_store().reference("Filter"));
}

#[test]
fn deactivate_returns_displaced_value_set() {
    let fixture = Fixture::new();
    let previous = UniformValueSet::new(
        &fixture.session,
        "Levels",
        4,
        (0..4)
            .map(|index| BaseValue::new(format!("Level {index}"), 0) as Rc<dyn Value>)
            .collect(),
    )
    .unwrap();
    fixture
        .faders
        .set_value_set(Some(Rc::clone(&previous) as _))
        .unwrap();
    let morpher = fixture.morpher(MorpherConfig {
        num_slots: 4,
        ..Default::default()
    });
    morpher.activate(&fixture.faders, &fixture.target).unwrap();
    assert!(fixture
        .faders
        .value_set()
        .is_some_and(|value_set| Rc::ptr_eq(&value_set, &morpher.weights())));
    assert!(morpher.target().is_some());

    let displaced = morpher.deactivate().unwrap();
    assert!(Rc::ptr_eq(&displaced, &(previous as ValueSetRef)));
    assert!(fixture.faders.value_set().is_none());
    assert!(!morpher.is_active());
    assert!(morpher.target().is_none());
    assert!(morpher.deactivate().is_none());
}

#[test]
fn follows_target_changes() {
    let fixture = Fixture::new();
    let morpher = fixture.morpher(MorpherConfig {
        num_slots: 4,
        ..Default::default()
    });
    fixture.set_target_values([30, 40]);
    morpher.activate(&fixture.faders, &fixture.target).unwrap();
    morpher.save_snapshot(0);
    morpher.load_snapshot(0);
    assert_eq!(Some(0), morpher.reference_slot().get());

    let other = UniformValueSet::new(
        &fixture.session,
        "Other",
        1,
        vec![BaseValue::new("Other", 0) as Rc<dyn Value>],
    )
    .unwrap();
    fixture.target.replace(Some(other as ValueSetRef));
    assert_eq!("Other", morpher.target().unwrap().name());
    assert_eq!(None, morpher.reference_slot().get());

    // The reference of the previous target is remembered
    let filter = fixture
        .session
        .snapshot_store()
        .reference("Filter")
        .unwrap();
    assert_eq!(0, filter);
}

#[test]
fn oversized_targets_are_rejected() {
    let fixture = Fixture::new();
    let morpher = fixture.morpher(MorpherConfig {
        num_slots: 4,
        max_parameters: 1,
        ..Default::default()
    });
    assert!(matches!(
        morpher.activate(&fixture.faders, &fixture.target),
        Err(Error::TooManyMorphParameters {
            requested: 2,
            max: 1
        })
    ));
    assert!(!morpher.is_active());
    assert!(fixture.faders.value_set().is_none());
}
