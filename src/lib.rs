// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Reactive control-binding framework for MIDI controller scripts.
//!
//! A fixed hardware surface ([`Control`]s grouped into [`ControlSet`]s) is
//! dynamically re-bound to logical parameter groups ([`Value`]s grouped into
//! [`ValueSet`]s) at runtime. Incoming MIDI is routed through a per-port
//! [`MidiEventDispatcher`], outgoing feedback is coalesced per output cycle by
//! a [`MidiFlushDispatcher`].
//!
//! The host environment (DAW scripting API, standalone MIDI driver, or the
//! in-memory [`host::loopback`] implementation) is injected through the
//! [`Host`] trait. All state lives in a single-threaded [`Session`].

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::pedantic)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(rustdoc::broken_intra_doc_links)]
// Repetitions of module/type names occur frequently when using many
// modules for keeping the size of the source files handy. Often
// types have the same name as their parent module.
#![allow(clippy::module_name_repetitions)]
// Repeating the type name in `..Default::default()` expressions
// is not needed since the context is obvious.
#![allow(clippy::default_trait_access)]

use std::{fmt, time::Duration};

mod error;
pub use self::error::{Error, Result};

pub mod util;

pub mod observable;
pub use self::observable::{Computed, Observable, Restorable, Subscription};

pub mod midi;
pub use self::midi::{
    Channel, FlushCoordinator, MidiEvent, MidiEventDispatcher, MidiFlushDispatcher, MidiMessage,
    NumberRange, RelativeMode,
};

pub mod host;
pub use self::host::{Host, MidiIn, MidiOut, NoteInput, TransportProperty};

pub mod session;
pub use self::session::{ScriptDescriptor, Session, SessionConfig};

pub mod control;
pub use self::control::{Control, ControlConfig, ControlSet, ValueAddress};

pub mod value;
pub use self::value::{
    AbsoluteInput, BaseValue, ClickInput, KnockoutClick, KnockoutSyncedConfig,
    KnockoutSyncedValue, RelativeInput, StandardRangedConfig, StandardRangedValue,
    ToggledTransportValue, ToggledValue, Value, ValueCore, VelocityFn,
};

pub mod value_set;
pub use self::value_set::{
    GreedyParamsValueSet, PageMemory, ParamsValueSet, SendsValueSet, UniformValueSet, ValueSet,
    ValueSetCore, ValueSetRef,
};

pub mod morpher;
pub use self::morpher::{Morpher, MorpherConfig, SnapshotStore};

pub mod view;
pub use self::view::{MatrixCell, MatrixWindow, ScrollableView, TrackWindow};

#[cfg(feature = "driver-thread")]
pub mod driver;
#[cfg(feature = "driver-thread")]
pub use self::driver::{DriverConfig, DriverInput, DriverThread};

/// Index of a MIDI input or output port, as numbered by the host.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[repr(transparent)]
pub struct PortIndex(usize);

impl PortIndex {
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }
}

/// Monotonic time stamp with microsecond precision.
///
/// The origin is defined by the host, e.g. the start of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TimeStamp(u64);

impl TimeStamp {
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    #[must_use]
    pub const fn to_micros(self) -> u64 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // ~584k years
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_micros() as u64))
    }

    /// Elapsed time since an earlier time stamp.
    ///
    /// Returns [`Duration::ZERO`] if `earlier` is actually later.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(micros) = self;
        write!(f, "{}.{:06}", micros / 1_000_000, micros % 1_000_000)
    }
}
