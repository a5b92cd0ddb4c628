// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{cell::RefCell, fmt, rc::Rc};

use super::Observable;

/// Extends a shared cell with a single level of undo.
///
/// [`Restorable::capture()`] remembers the current value that could later
/// be written back with [`Restorable::restore()`], e.g. to temporarily
/// switch a mode while a button is held down.
pub struct Restorable<T> {
    cell: Observable<T>,
    captured: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for Restorable<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            captured: Rc::clone(&self.captured),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Restorable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Restorable")
            .field("cell", &self.cell)
            .field("captured", &self.captured.borrow())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Restorable<T> {
    #[must_use]
    pub fn extend(cell: Observable<T>) -> Self {
        Self {
            cell,
            captured: Rc::new(RefCell::new(None)),
        }
    }

    #[must_use]
    pub fn cell(&self) -> &Observable<T> {
        &self.cell
    }

    /// Remember the current value, replacing any previous capture.
    pub fn capture(&self) {
        *self.captured.borrow_mut() = Some(self.cell.get());
    }

    /// Write a new value after capturing the current value.
    pub fn set(&self, value: T) -> bool {
        self.capture();
        self.cell.set(value)
    }

    /// Write back the captured value.
    ///
    /// Returns `false` if nothing has been captured.
    pub fn restore(&self) -> bool {
        let captured = self.captured.borrow_mut().take();
        let Some(value) = captured else {
            return false;
        };
        self.cell.set(value);
        true
    }

    /// Drop the captured value without restoring it.
    pub fn discard(&self) {
        self.captured.borrow_mut().take();
    }

    #[must_use]
    pub fn is_captured(&self) -> bool {
        self.captured.borrow().is_some()
    }
}
