// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::borrow::Cow;

use thiserror::Error;

use crate::PortIndex;

/// Wiring errors.
///
/// All variants indicate a bug in the composing controller script,
/// i.e. invalid arguments that are rejected eagerly during setup.
/// They are never caused by the MIDI traffic at runtime.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid MIDI note number {0}")]
    InvalidNote(u8),

    #[error("invalid MIDI CC number {0}")]
    InvalidCc(u8),

    #[error("invalid MIDI channel {0}")]
    InvalidChannel(u8),

    #[error("invalid 7-bit value {0}")]
    InvalidU7(u8),

    #[error("invalid number range [{min}, {max}]")]
    InvalidRange { min: u8, max: u8 },

    #[error("no MIDI {direction} port {port}")]
    UnknownPort {
        direction: &'static str,
        port: PortIndex,
    },

    #[error("invalid configuration of control \"{name}\": {reason}")]
    InvalidControlConfig {
        name: String,
        reason: Cow<'static, str>,
    },

    #[error("control set \"{0}\" already exists")]
    DuplicateControlSetName(String),

    #[error("control set \"{0}\" has no controls")]
    EmptyControlSet(String),

    #[error(
        "value set \"{value_set}\" requires {required} controls, but control set \
         \"{control_set}\" has {actual}"
    )]
    IncompatibleControlSetWidth {
        value_set: String,
        control_set: String,
        required: usize,
        actual: usize,
    },

    #[error("invalid page size {0}")]
    InvalidPageSize(usize),

    #[error("the first flush already happened")]
    FirstFlushWindowClosed,

    #[error("too many snapshot slots: {requested} (max. {max})")]
    TooManySnapshotSlots { requested: usize, max: usize },

    #[error("too many morph parameters: {requested} (max. {max})")]
    TooManyMorphParameters { requested: usize, max: usize },

    #[error("a {rows}x{columns} matrix cannot be rotated")]
    NonSquareMatrix { rows: usize, columns: usize },

    #[error("the host does not provide {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
