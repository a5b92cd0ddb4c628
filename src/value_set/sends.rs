// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, rc::Rc};

use super::{ValueSet, ValueSetCore};
use crate::{
    host::TrackBank, util::last_page_index, Session, StandardRangedConfig, StandardRangedValue,
    Value,
};

/// Send levels of the tracks in a bank.
///
/// Each page contains a single send of all tracks, i.e. the page
/// selects the send.
pub struct SendsValueSet {
    core: ValueSetCore,
    num_tracks: usize,
    values: Vec<Option<Rc<StandardRangedValue>>>,
}

impl fmt::Debug for SendsValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendsValueSet")
            .field("core", &self.core)
            .field("num_tracks", &self.num_tracks)
            .finish_non_exhaustive()
    }
}

impl SendsValueSet {
    #[must_use]
    pub fn new(
        session: &Session,
        name: impl Into<String>,
        bank: &dyn TrackBank,
        num_tracks: usize,
        config: StandardRangedConfig,
    ) -> Rc<Self> {
        let name = name.into();
        let send_count = bank.send_count();
        let mut values = Vec::with_capacity(send_count * num_tracks);
        for send in 0..send_count {
            for index in 0..num_tracks {
                let value = bank
                    .track(index)
                    .and_then(|track| track.send(send))
                    .map(|cell| {
                        StandardRangedValue::new(
                            format!("{name} {}/{}", index + 1, send + 1),
                            cell,
                            config,
                        )
                    });
                values.push(value);
            }
        }
        Rc::new(Self {
            core: ValueSetCore::new(session, name, send_count.saturating_sub(1)),
            num_tracks,
            values,
        })
    }

    #[must_use]
    pub fn send_count(&self) -> usize {
        if self.num_tracks == 0 {
            return 0;
        }
        self.values.len() / self.num_tracks
    }

    /// The send that is currently selected.
    #[must_use]
    pub fn selected_send(&self) -> usize {
        self.page()
    }

    /// Limit the selectable sends, e.g. after effect tracks
    /// have been removed.
    pub fn set_send_count(&self, send_count: usize) {
        let send_count = send_count.min(self.send_count());
        self.set_last_page(last_page_index(send_count.max(1), 1));
    }
}

impl ValueSet for SendsValueSet {
    fn core(&self) -> &ValueSetCore {
        &self.core
    }

    fn value_at(&self, page: usize, index: usize) -> Option<Rc<dyn Value>> {
        if index >= self.num_tracks {
            return None;
        }
        self.values
            .get(page * self.num_tracks + index)?
            .as_ref()
            .map(|value| Rc::clone(value) as Rc<dyn Value>)
    }

    fn values(&self) -> Vec<Rc<dyn Value>> {
        self.values
            .iter()
            .flatten()
            .map(|value| Rc::clone(value) as Rc<dyn Value>)
            .collect()
    }
}
