// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, rc::Rc};

use super::ScrollableView;
use crate::{
    host::{Track, TrackBank},
    BaseValue, Error, Observable, Result, SendsValueSet, Session, StandardRangedConfig, StandardRangedValue,
    ToggledValue, UniformValueSet, Value,
};

/// A window of adjacent tracks.
pub struct TrackWindow {
    session: Rc<Session>,
    bank: Rc<dyn TrackBank>,
    num_tracks: usize,
    view: Rc<ScrollableView>,
}

impl fmt::Debug for TrackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackWindow")
            .field("num_tracks", &self.num_tracks)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl TrackWindow {
    #[must_use]
    pub fn new(session: &Rc<Session>, bank: Rc<dyn TrackBank>, num_tracks: usize) -> Self {
        let view = ScrollableView::new(bank.scrollable());
        Self {
            session: Rc::clone(session),
            bank,
            num_tracks,
            view,
        }
    }

    #[must_use]
    pub const fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    #[must_use]
    pub fn view(&self) -> &Rc<ScrollableView> {
        &self.view
    }

    /// The track at a position within the window.
    #[must_use]
    pub fn track(&self, index: usize) -> Option<Rc<dyn Track>> {
        if index >= self.num_tracks {
            return None;
        }
        self.bank.track(index)
    }

    /// One value per track, all on a single page.
    ///
    /// Tracks that are missing in the bank get a plain placeholder value.
    pub fn value_set(
        &self,
        name: impl Into<String>,
        mut new_value: impl FnMut(usize, &dyn Track) -> Rc<dyn Value>,
    ) -> Result<Rc<UniformValueSet>> {
        let name = name.into();
        let values = (0..self.num_tracks)
            .map(|index| match self.track(index) {
                Some(track) => new_value(index, track.as_ref()),
                None => {
                    log::debug!("No track {index} in window \"{name}\"");
                    BaseValue::new(format!("{name} {}", index + 1), 0) as _
                }
            })
            .collect();
        UniformValueSet::new(&self.session, name, self.num_tracks, values)
    }

    pub fn volume_value_set(
        &self,
        name: impl Into<String>,
        config: StandardRangedConfig,
    ) -> Result<Rc<UniformValueSet>> {
        let name = name.into();
        let prefix = name.clone();
        self.value_set(name, |index, track| {
            StandardRangedValue::new(format!("{prefix} {}", index + 1), track.volume(), config) as _
        })
    }

    pub fn pan_value_set(
        &self,
        name: impl Into<String>,
        config: StandardRangedConfig,
    ) -> Result<Rc<UniformValueSet>> {
        let name = name.into();
        let prefix = name.clone();
        self.value_set(name, |index, track| {
            StandardRangedValue::new(format!("{prefix} {}", index + 1), track.pan(), config) as _
        })
    }

    pub fn mute_value_set(&self, name: impl Into<String>) -> Result<Rc<UniformValueSet>> {
        let name = name.into();
        let prefix = name.clone();
        self.value_set(name, |index, track| {
            ToggledValue::new(format!("{prefix} {}", index + 1), track.mute(), None) as _
        })
    }

    pub fn solo_value_set(&self, name: impl Into<String>) -> Result<Rc<UniformValueSet>> {
        let name = name.into();
        let prefix = name.clone();
        self.value_set(name, |index, track| {
            ToggledValue::new(format!("{prefix} {}", index + 1), track.solo(), None) as _
        })
    }

    pub fn arm_value_set(&self, name: impl Into<String>) -> Result<Rc<UniformValueSet>> {
        let name = name.into();
        let prefix = name.clone();
        self.value_set(name, |index, track| {
            ToggledValue::new(format!("{prefix} {}", index + 1), track.arm(), None) as _
        })
    }

    #[must_use]
    pub fn sends_value_set(
        &self,
        name: impl Into<String>,
        config: StandardRangedConfig,
    ) -> Rc<SendsValueSet> {
        SendsValueSet::new(
            &self.session,
            name,
            self.bank.as_ref(),
            self.num_tracks,
            config,
        )
    }
}

/// Position of a cell in the track/scene grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixCell {
    pub track: usize,
    pub scene: usize,
}

/// A 2-dimensional window over tracks and scenes, e.g. a grid of pads
/// for launching clips.
///
/// By default rows are scenes and columns are tracks. Square matrices
/// can be rotated to swap both axes.
pub struct MatrixWindow {
    session: Rc<Session>,
    rows: usize,
    columns: usize,
    rotated: Observable<bool>,
    track_view: Rc<ScrollableView>,
    scene_view: Rc<ScrollableView>,
}

impl fmt::Debug for MatrixWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixWindow")
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .field("rotated", &self.rotated.get())
            .finish_non_exhaustive()
    }
}

impl MatrixWindow {
    #[must_use]
    pub fn new(session: &Rc<Session>, bank: &dyn TrackBank, rows: usize, columns: usize) -> Self {
        Self {
            session: Rc::clone(session),
            rows,
            columns,
            rotated: Observable::new(false),
            track_view: ScrollableView::new(bank.scrollable()),
            scene_view: ScrollableView::new(bank.scene_bank()),
        }
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    #[must_use]
    pub fn is_square(&self) -> bool {
        self.rows == self.columns
    }

    #[must_use]
    pub fn rotated(&self) -> &Observable<bool> {
        &self.rotated
    }

    /// Swap the axes, i.e. rows become tracks and columns become scenes.
    pub fn set_rotated(&self, rotated: bool) -> Result<()> {
        if rotated && !self.is_square() {
            return Err(Error::NonSquareMatrix {
                rows: self.rows,
                columns: self.columns,
            });
        }
        if self.rotated.set(rotated) {
            log::debug!("Matrix rotated: {rotated}");
        }
        Ok(())
    }

    pub fn toggle_rotated(&self) -> Result<()> {
        self.set_rotated(!self.rotated.get())
    }

    #[must_use]
    pub fn track_view(&self) -> &Rc<ScrollableView> {
        &self.track_view
    }

    #[must_use]
    pub fn scene_view(&self) -> &Rc<ScrollableView> {
        &self.scene_view
    }

    /// Scrolls the rows.
    #[must_use]
    pub fn row_view(&self) -> &Rc<ScrollableView> {
        if self.rotated.get() {
            &self.track_view
        } else {
            &self.scene_view
        }
    }

    /// Scrolls the columns.
    #[must_use]
    pub fn column_view(&self) -> &Rc<ScrollableView> {
        if self.rotated.get() {
            &self.scene_view
        } else {
            &self.track_view
        }
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<MatrixCell> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        let cell = if self.rotated.get() {
            MatrixCell {
                track: row,
                scene: column,
            }
        } else {
            MatrixCell {
                track: column,
                scene: row,
            }
        };
        Some(cell)
    }

    /// One value per cell in row-major order, all on a single page.
    ///
    /// The cells are resolved with the current rotation.
    pub fn value_set(
        &self,
        name: impl Into<String>,
        mut new_value: impl FnMut(MatrixCell) -> Rc<dyn Value>,
    ) -> Result<Rc<UniformValueSet>> {
        let mut values = Vec::with_capacity(self.rows * self.columns);
        for row in 0..self.rows {
            for column in 0..self.columns {
                if let Some(cell) = self.cell(row, column) {
                    values.push(new_value(cell));
                }
            }
        }
        UniformValueSet::new(&self.session, name, self.rows * self.columns, values)
    }
}
