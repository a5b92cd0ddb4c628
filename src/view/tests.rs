// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::rc::Rc;

use super::*;
use crate::{
    host::{
        loopback::{LoopbackHost, LoopbackScrollable, LoopbackTrackBank},
        BoolCell as _, RangedCell as _,
    },
    ClickInput, Error, Session, SessionConfig, StandardRangedConfig, TimeStamp, ValueSet as _,
};

fn new_session() -> Rc<Session> {
    Session::new(LoopbackHost::new(1, 1), SessionConfig::default())
}

#[test]
fn scrollable_view_mirrors_host() {
    let scrollable = LoopbackScrollable::new(4, 10);
    let view = ScrollableView::new(Rc::clone(&scrollable) as _);
    assert_eq!(4, view.page_size());
    assert_eq!(0, view.page().get());
    assert_eq!(2, view.last_page().get());
    assert!(view.has_next_page().get());
    assert!(!view.has_prev_page().get());

    scrollable.scroll_position_cell().set_value(5);
    assert_eq!(5, view.scroll_position().get());
    assert_eq!(1, view.page().get());
    assert!(view.has_prev_page().get());

    scrollable.item_count_cell().set_value(3);
    assert_eq!(0, view.last_page().get());
    assert!(!view.has_next_page().get());
}

#[test]
fn scroll_pages() {
    let scrollable = LoopbackScrollable::new(4, 10);
    let view = ScrollableView::new(Rc::clone(&scrollable) as _);

    view.scroll_page_forwards();
    assert_eq!(4, scrollable.scroll_position_cell().value());
    view.scroll_page_forwards();
    assert_eq!(8, scrollable.scroll_position_cell().value());
    assert!(!view.has_next_page().get());
    view.scroll_page_forwards();
    assert_eq!(8, scrollable.scroll_position_cell().value());

    view.scroll_page_backwards();
    assert_eq!(4, scrollable.scroll_position_cell().value());

    // Unaligned positions snap back to the start of their page
    scrollable.scroll_position_cell().set_value(6);
    view.scroll_page_backwards();
    assert_eq!(4, scrollable.scroll_position_cell().value());

    view.scroll_to_page(99);
    assert_eq!(8, scrollable.scroll_position_cell().value());
    view.page().set(0);
    assert_eq!(0, scrollable.scroll_position_cell().value());
    view.scroll_page_backwards();
    assert_eq!(0, scrollable.scroll_position_cell().value());
}

#[test]
fn track_window_value_sets() {
    let session = new_session();
    let bank = LoopbackTrackBank::new(4, 2, 3);
    let window = TrackWindow::new(&session, Rc::clone(&bank) as _, 4);
    assert!(window.track(3).is_some());
    assert!(window.track(4).is_none());

    let volumes = window
        .volume_value_set("Volume", StandardRangedConfig::default())
        .unwrap();
    assert_eq!(4, volumes.len());
    assert_eq!(0, volumes.last_page());
    volumes.value(2).unwrap().set_raw_value(100);
    assert_eq!(100, bank.loopback_track(2).volume.get());

    let mutes = window.mute_value_set("Mute").unwrap();
    mutes.value(1).unwrap().on_click(ClickInput {
        pressed: true,
        ts: TimeStamp::default(),
    });
    assert!(bank.loopback_track(1).mute.get());
    assert_eq!(127, mutes.value(1).unwrap().value());

    let sends = window.sends_value_set("Sends", StandardRangedConfig::default());
    assert_eq!(3, sends.send_count());
    assert_eq!(2, sends.last_page());
}

#[test]
fn track_window_with_missing_tracks() {
    let session = new_session();
    let bank = LoopbackTrackBank::new(2, 2, 0);
    let window = TrackWindow::new(&session, bank as _, 4);
    let pans = window
        .pan_value_set("Pan", StandardRangedConfig::default())
        .unwrap();
    assert_eq!(4, pans.len());
    assert_eq!(64, pans.value(0).unwrap().value());
    assert_eq!(0, pans.value(3).unwrap().value());
}

#[test]
fn matrix_cells_follow_rotation() {
    let session = new_session();
    let bank = LoopbackTrackBank::new(4, 4, 0);
    let matrix = MatrixWindow::new(&session, bank.as_ref(), 4, 4);
    assert_eq!(Some(MatrixCell { track: 2, scene: 1 }), matrix.cell(1, 2));
    assert!(matrix.cell(4, 0).is_none());
    assert!(Rc::ptr_eq(matrix.row_view(), matrix.scene_view()));

    matrix.set_rotated(true).unwrap();
    assert_eq!(Some(MatrixCell { track: 1, scene: 2 }), matrix.cell(1, 2));
    assert!(Rc::ptr_eq(matrix.row_view(), matrix.track_view()));

    matrix.toggle_rotated().unwrap();
    assert!(!matrix.rotated().get());
}

#[test]
fn non_square_matrix_cannot_be_rotated() {
    let session = new_session();
    let bank = LoopbackTrackBank::new(8, 4, 0);
    let matrix = MatrixWindow::new(&session, bank.as_ref(), 4, 8);
    assert!(matches!(
        matrix.set_rotated(true),
        Err(Error::NonSquareMatrix {
            rows: 4,
            columns: 8
        })
    ));
    assert!(!matrix.rotated().get());
    // Unrotating is always possible
    assert!(matrix.set_rotated(false).is_ok());
}

#[test]
fn matrix_value_set_is_row_major() {
    let session = new_session();
    let bank = LoopbackTrackBank::new(3, 2, 0);
    let matrix = MatrixWindow::new(&session, bank.as_ref(), 2, 3);
    let cells = matrix
        .value_set("Clips", |cell| {
            crate::BaseValue::new(format!("{}/{}", cell.track, cell.scene), 0) as _
        })
        .unwrap();
    assert_eq!(6, cells.len());
    assert_eq!("2/0", cells.value(2).unwrap().name());
    assert_eq!("0/1", cells.value(3).unwrap().name());
    assert!(cells.value_at(0, 5).is_some());
}
