// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Numeric helpers for the 7-bit value domain and page arithmetic.

/// Largest value of the 7-bit MIDI data domain.
pub const U7_MAX: u8 = 0x7f;

/// Limit an arbitrary integer to the 7-bit range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_u7(value: i32) -> u8 {
    value.clamp(0, i32::from(U7_MAX)) as u8
}

/// Round and limit a floating-point number to the 7-bit range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn round_to_u7(value: f64) -> u8 {
    value.round().clamp(0.0, f64::from(U7_MAX)) as u8
}

/// Map a value from `0..=127` onto `min..=max`.
#[must_use]
pub fn rescale_u7(value: u8, min: u8, max: u8) -> u8 {
    debug_assert!(min <= max);
    let span = f64::from(max) - f64::from(min);
    round_to_u7(f64::from(min) + f64::from(value.min(U7_MAX)) * span / f64::from(U7_MAX))
}

/// Number of pages needed for `len` items.
///
/// Always at least 1, even if there are no items.
#[must_use]
pub const fn page_count(len: usize, page_size: usize) -> usize {
    debug_assert!(page_size > 0);
    if len == 0 {
        1
    } else {
        len.div_ceil(page_size)
    }
}

/// Index of the last page for `len` items.
#[must_use]
pub const fn last_page_index(len: usize, page_size: usize) -> usize {
    page_count(len, page_size) - 1
}

/// Index of the last page from a host-provided page count.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn last_page_from_count(count: i32) -> usize {
    if count <= 1 {
        0
    } else {
        count as usize - 1
    }
}
