// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Observable windows onto host banks.

use std::{fmt, rc::Rc};

use crate::{host::Scrollable, util::last_page_index, Computed, Observable};

mod window;
pub use self::window::{MatrixCell, MatrixWindow, TrackWindow};

#[cfg(test)]
mod tests;

fn count_from_host(count: i32) -> usize {
    usize::try_from(count).unwrap_or(0)
}

fn count_to_host(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Page-wise scrolling through a host bank.
///
/// The scroll position and the item count of the bank are mirrored
/// into observables. Writing [`ScrollableView::page()`] scrolls the bank.
pub struct ScrollableView {
    scrollable: Rc<dyn Scrollable>,
    page_size: usize,
    scroll_position: Observable<usize>,
    item_count: Observable<usize>,
    page: Computed<usize>,
    last_page: Computed<usize>,
    has_next_page: Computed<bool>,
    has_prev_page: Computed<bool>,
}

impl fmt::Debug for ScrollableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollableView")
            .field("page_size", &self.page_size)
            .field("scroll_position", &self.scroll_position.get())
            .field("item_count", &self.item_count.get())
            .field("page", &self.page.get())
            .field("last_page", &self.last_page.get())
            .finish_non_exhaustive()
    }
}

impl ScrollableView {
    #[must_use]
    pub fn new(scrollable: Rc<dyn Scrollable>) -> Rc<Self> {
        let page_size = scrollable.page_size().max(1);
        let scroll_position = Observable::new(count_from_host(scrollable.scroll_position().get()));
        let item_count = Observable::new(count_from_host(scrollable.item_count().get()));
        {
            let scroll_position = scroll_position.clone();
            scrollable
                .scroll_position()
                .add_value_observer(Box::new(move |position| {
                    scroll_position.set(count_from_host(position));
                }));
        }
        {
            let item_count = item_count.clone();
            scrollable
                .item_count()
                .add_value_observer(Box::new(move |count| {
                    item_count.set(count_from_host(count));
                }));
        }
        let page = {
            let position = scroll_position.clone();
            let host_position = scrollable.scroll_position();
            Computed::new(move || position.get() / page_size)
                .writable(move |page: usize| {
                    host_position.set(count_to_host(page.saturating_mul(page_size)));
                })
                .depends_on(&scroll_position)
        };
        let last_page = {
            let item_count = item_count.clone();
            Computed::new(move || last_page_index(item_count.get(), page_size))
        }
        .depends_on(&item_count);
        let has_next_page = {
            let position = scroll_position.clone();
            let item_count = item_count.clone();
            Computed::new(move || position.get().saturating_add(page_size) < item_count.get())
        }
        .depends_on(&scroll_position)
        .depends_on(&item_count);
        let has_prev_page = {
            let position = scroll_position.clone();
            Computed::new(move || position.get() > 0)
        }
        .depends_on(&scroll_position);
        Rc::new(Self {
            scrollable,
            page_size,
            scroll_position,
            item_count,
            page,
            last_page,
            has_next_page,
            has_prev_page,
        })
    }

    #[must_use]
    pub fn scrollable(&self) -> &Rc<dyn Scrollable> {
        &self.scrollable
    }

    /// Number of items that are visible at once.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn scroll_position(&self) -> &Observable<usize> {
        &self.scroll_position
    }

    #[must_use]
    pub fn item_count(&self) -> &Observable<usize> {
        &self.item_count
    }

    /// The page that starts at or before the scroll position.
    #[must_use]
    pub fn page(&self) -> &Computed<usize> {
        &self.page
    }

    #[must_use]
    pub fn last_page(&self) -> &Computed<usize> {
        &self.last_page
    }

    #[must_use]
    pub fn has_next_page(&self) -> &Computed<bool> {
        &self.has_next_page
    }

    #[must_use]
    pub fn has_prev_page(&self) -> &Computed<bool> {
        &self.has_prev_page
    }

    /// Scroll to the first item of a page.
    ///
    /// Out-of-range pages are clamped.
    pub fn scroll_to_page(&self, page: usize) {
        let page = page.min(self.last_page.get());
        self.page.set(page);
    }

    pub fn scroll_page_forwards(&self) {
        if !self.has_next_page.get() {
            return;
        }
        self.scroll_to_page(self.page.get() + 1);
    }

    pub fn scroll_page_backwards(&self) {
        let position = self.scroll_position.get();
        if position == 0 {
            return;
        }
        // Aligns an unaligned position to the start of its page
        let page = self.page.get();
        if position % self.page_size == 0 {
            self.scroll_to_page(page.saturating_sub(1));
        } else {
            self.scroll_to_page(page);
        }
    }
}
