// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use super::*;
use crate::{
    host::loopback::{LoopbackCursorDevice, LoopbackHost, LoopbackTrackBank},
    BaseValue, Control, ControlConfig, SessionConfig, StandardRangedConfig,
};

fn new_session() -> Rc<Session> {
    Session::new(LoopbackHost::new(1, 1), SessionConfig::default())
}

fn base_values(count: usize) -> Vec<Rc<dyn Value>> {
    (0..count)
        .map(|index| BaseValue::new(format!("Value {}", index + 1), 0) as Rc<dyn Value>)
        .collect()
}

fn synth() -> Rc<LoopbackCursorDevice> {
    LoopbackCursorDevice::new("Synth", &["Osc", "Filter", "Amp"], 2)
}

fn encoders(session: &Rc<Session>, count: u8) -> Rc<ControlSet> {
    let controls = (0..count)
        .map(|index| {
            Control::new(
                session,
                ControlConfig::new(format!("Encoder {}", index + 1)).with_value_cc(index),
            )
            .unwrap()
        })
        .collect();
    ControlSet::new(session, "Encoders", controls).unwrap()
}

fn same_value(lhs: &Option<Rc<dyn Value>>, rhs: &Rc<dyn Value>) -> bool {
    lhs.as_ref().is_some_and(|lhs| Rc::ptr_eq(lhs, rhs))
}

#[test]
fn uniform_pages_are_clamped() {
    let session = new_session();
    let values = base_values(10);
    let value_set = UniformValueSet::new(&session, "Values", 4, values.clone()).unwrap();
    assert_eq!(2, value_set.last_page());
    assert_eq!(3, value_set.page_count());
    assert!(!value_set.has_prev_page());

    value_set.set_page(5);
    assert_eq!(2, value_set.page());
    assert!(!value_set.has_next_page());
    value_set.next_page();
    assert_eq!(2, value_set.page());

    assert!(same_value(&value_set.value_at(2, 1), &values[9]));
    assert!(value_set.value_at(2, 2).is_none());
    // Index beyond the page size
    assert!(value_set.value_at(0, 4).is_none());

    value_set.prev_page();
    value_set.prev_page();
    value_set.prev_page();
    assert_eq!(0, value_set.page());
}

#[test]
fn empty_uniform_value_set_has_a_single_page() {
    let session = new_session();
    let value_set = UniformValueSet::new(&session, "Nothing", 8, Vec::new()).unwrap();
    assert!(value_set.is_empty());
    assert_eq!(0, value_set.last_page());
    assert!(value_set.value_at(0, 0).is_none());
    assert!(matches!(
        UniformValueSet::new(&session, "Invalid", 0, base_values(1)),
        Err(Error::InvalidPageSize(0))
    ));
}

#[test]
fn uniform_raw_values() {
    let session = new_session();
    let value_set = UniformValueSet::from_fn(&session, "Levels", 2, 3, |index| {
        BaseValue::new(format!("Level {index}"), u8::try_from(index * 50).unwrap()) as _
    })
    .unwrap();
    assert_eq!(3, value_set.len());
    assert_eq!(vec![0, 50, 100], value_set.raw_values());
}

#[test]
fn params_follow_selected_host_page() {
    let session = new_session();
    let device = synth();
    device.page_parameter_cell(1, 0).set_value(99);
    let params = ParamsValueSet::new(
        &session,
        "Params",
        Rc::clone(&device) as _,
        StandardRangedConfig::default(),
    );
    assert_eq!(2, params.last_page());
    assert_eq!(0, params.page());
    assert_eq!("Params:Synth", params.dynamic_id());

    device.selected_page_cell().set_value(1);
    assert_eq!(1, params.page());
    // The values always refer to the selected page
    let first = params.value_at(0, 0).unwrap();
    assert_eq!(99, first.value());

    params.set_page(2);
    assert_eq!(2, device.selected_page_cell().value());
    assert_eq!(0, first.value());

    first.set_raw_value(7);
    assert_eq!(7, device.page_parameter_cell(2, 0).value());

    // Pages disappear
    device
        .page_names_cell()
        .set_value(vec!["Osc".to_owned(), "Filter".to_owned()]);
    assert_eq!(1, params.last_page());
    assert_eq!(1, params.page());
}

#[test]
fn params_require_matching_width() {
    let session = new_session();
    let params = ParamsValueSet::new(
        &session,
        "Params",
        synth(),
        StandardRangedConfig::default(),
    );
    let control_set = encoders(&session, 3);
    assert!(matches!(
        control_set.set_value_set(Some(Rc::clone(&params) as _)),
        Err(Error::IncompatibleControlSetWidth {
            required: 2,
            actual: 3,
            ..
        })
    ));
    assert!(control_set.value_set().is_none());
}

#[test]
fn page_is_remembered_per_device() {
    let session = new_session();
    let device = synth();
    let params = ParamsValueSet::new(
        &session,
        "Params",
        Rc::clone(&device) as _,
        StandardRangedConfig::default(),
    );
    params.set_page(2);
    assert_eq!(Some(2), session.page_memory().recall("Params:Synth"));

    // Unknown devices keep the current page
    device.name_cell().set_value("Drums".to_owned());
    assert_eq!(2, params.page());

    device.selected_page_cell().set_value(0);
    assert_eq!(0, params.page());
    assert_eq!(Some(0), session.page_memory().recall("Params:Drums"));

    device.name_cell().set_value("Synth".to_owned());
    assert_eq!(2, params.page());
    assert_eq!(2, device.selected_page_cell().value());
}

#[test]
fn params_lock_to_page() {
    let session = new_session();
    let device = synth();
    let params = ParamsValueSet::new(
        &session,
        "Params",
        Rc::clone(&device) as _,
        StandardRangedConfig::default(),
    );
    params.set_page(1);
    params.set_lock_to_page(true);
    assert_eq!(Some(1), params.lock_to_page().get());
    assert!(params.lock_to_device().get());
    assert!(device.is_pinned_cell().value());

    // The host is forced back onto the locked page
    device.selected_page_cell().set_value(2);
    assert_eq!(1, device.selected_page_cell().value());
    assert_eq!(1, params.page());

    // Paging moves the lock
    params.next_page();
    assert_eq!(Some(2), params.lock_to_page().get());
    assert_eq!(2, device.selected_page_cell().value());

    // Unpinning on the host releases both locks
    device.is_pinned_cell().set_value(false);
    assert_eq!(None, params.lock_to_page().get());
    assert!(!params.lock_to_device().get());

    params.set_lock_to_page(true);
    params.set_lock_to_device(false);
    assert_eq!(None, params.lock_to_page().get());
    assert!(!device.is_pinned_cell().value());
}

#[test]
fn greedy_params_span_multiple_pages() {
    let session = new_session();
    let device = LoopbackCursorDevice::new("Synth", &["A", "B", "C", "D"], 2);
    let greedy = GreedyParamsValueSet::new(
        &session,
        "Greedy",
        Rc::clone(&device) as _,
        8,
        2,
        StandardRangedConfig::default(),
    )
    .unwrap();
    assert_eq!(2, greedy.pages_per_view());
    assert_eq!(1, greedy.last_page());

    device.page_parameter_cell(1, 0).set_value(11);
    device.page_parameter_cell(3, 1).set_value(31);
    assert_eq!(11, greedy.value_at(0, 2).unwrap().value());
    assert_eq!(31, greedy.value_at(1, 3).unwrap().value());
    assert!(greedy.value_at(0, 4).is_none());

    // Follows the host without selecting pages on the host
    device.selected_page_cell().set_value(3);
    assert_eq!(1, greedy.page());
    greedy.prev_page();
    assert_eq!(3, device.selected_page_cell().value());

    device
        .page_names_cell()
        .set_value(vec!["A".to_owned(), "B".to_owned()]);
    assert_eq!(0, greedy.last_page());
    assert_eq!(0, greedy.page());

    assert!(matches!(
        encoders(&session, 2).set_value_set(Some(Rc::clone(&greedy) as _)),
        Err(Error::IncompatibleControlSetWidth { required: 4, .. })
    ));
    assert!(matches!(
        GreedyParamsValueSet::new(
            &session,
            "Invalid",
            device,
            8,
            0,
            StandardRangedConfig::default()
        ),
        Err(Error::InvalidPageSize(0))
    ));
}

#[test]
fn greedy_params_are_limited_by_max_pages() {
    let session = new_session();
    let device = LoopbackCursorDevice::new("Synth", &["A", "B", "C", "D", "E"], 1);
    let greedy = GreedyParamsValueSet::new(
        &session,
        "Greedy",
        device,
        2,
        1,
        StandardRangedConfig::default(),
    )
    .unwrap();
    assert_eq!(1, greedy.last_page());
    assert_eq!(2, greedy.values().len());
}

#[test]
fn sends_are_paged_by_send() {
    let session = new_session();
    let bank = LoopbackTrackBank::new(2, 1, 3);
    bank.loopback_track(0).sends[1].set_value(42);
    let sends = SendsValueSet::new(
        &session,
        "Sends",
        &*bank,
        3,
        StandardRangedConfig::default(),
    );
    assert_eq!(3, sends.send_count());
    assert_eq!(2, sends.last_page());
    assert_eq!(6, sends.values().len());

    sends.next_page();
    assert_eq!(1, sends.selected_send());
    assert_eq!(42, sends.value_at(1, 0).unwrap().value());
    // Missing track
    assert!(sends.value_at(1, 2).is_none());

    sends.value_at(1, 1).unwrap().set_raw_value(5);
    assert_eq!(5, bank.loopback_track(1).sends[1].value());

    sends.set_send_count(1);
    assert_eq!(0, sends.last_page());
    assert_eq!(0, sends.selected_send());
}
