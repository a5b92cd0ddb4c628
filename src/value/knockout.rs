// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    cell::Cell,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

use super::{default_velocity, AbsoluteInput, ClickInput, Value, ValueCore, VelocityFn};
use crate::{Observable, Restorable, Session, Subscription, TimeStamp};

/// Passed to the click handler of a [`KnockoutSyncedValue`].
#[derive(Debug, Clone)]
pub struct KnockoutClick<T> {
    pub own_value: T,
    pub reference: Observable<T>,
    /// The second press within the double click window.
    pub is_double_click: bool,
}

pub type KnockoutClickHandler<T> = Rc<dyn Fn(KnockoutClick<T>)>;

pub struct KnockoutSyncedConfig<T> {
    /// Replaces selecting the own value when pressed.
    pub on_click: Option<KnockoutClickHandler<T>>,

    /// Rewrite the reference cell even if it already contains
    /// the own value, i.e. notify all subscribers again.
    pub force_rewrite: bool,

    /// Restore the previous reference value when released after
    /// a long click.
    pub restore_after_long_click: bool,

    pub velocity: Option<VelocityFn>,
}

impl<T> Default for KnockoutSyncedConfig<T> {
    fn default() -> Self {
        Self {
            on_click: None,
            force_rewrite: false,
            restore_after_long_click: false,
            velocity: None,
        }
    }
}

impl<T> Clone for KnockoutSyncedConfig<T> {
    fn clone(&self) -> Self {
        Self {
            on_click: self.on_click.clone(),
            force_rewrite: self.force_rewrite,
            restore_after_long_click: self.restore_after_long_click,
            velocity: self.velocity.clone(),
        }
    }
}

impl<T> fmt::Debug for KnockoutSyncedConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnockoutSyncedConfig")
            .field("on_click", &self.on_click.is_some())
            .field("force_rewrite", &self.force_rewrite)
            .field("restore_after_long_click", &self.restore_after_long_click)
            .field("velocity", &self.velocity.is_some())
            .finish()
    }
}

/// One of multiple mutually exclusive choices, e.g. a mode button.
///
/// All buttons share a reference cell. A button is lit if the reference
/// contains its own value and selects its own value when pressed.
pub struct KnockoutSyncedValue<T> {
    core: ValueCore,
    own_value: T,
    reference: Restorable<T>,
    on_click: Option<KnockoutClickHandler<T>>,
    force_rewrite: bool,
    restore_after_long_click: bool,
    velocity: VelocityFn,
    double_click_window: Duration,
    long_click_threshold: Duration,
    last_press: Cell<Option<TimeStamp>>,
    pressed_since: Cell<Option<TimeStamp>>,
    _reference_subscription: Subscription,
}

impl<T: fmt::Debug> fmt::Debug for KnockoutSyncedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnockoutSyncedValue")
            .field("core", &self.core)
            .field("own_value", &self.own_value)
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + 'static> KnockoutSyncedValue<T> {
    #[must_use]
    pub fn new(
        session: &Session,
        name: impl Into<String>,
        own_value: T,
        reference: Observable<T>,
        config: KnockoutSyncedConfig<T>,
    ) -> Rc<Self> {
        let KnockoutSyncedConfig {
            on_click,
            force_rewrite,
            restore_after_long_click,
            velocity,
        } = config;
        let velocity = velocity.unwrap_or_else(|| Rc::new(default_velocity) as VelocityFn);
        let initial_value = velocity(reference.with(|reference| *reference == own_value));
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = Weak::clone(weak);
            let reference_subscription = reference.subscribe(move |_| {
                if let Some(value) = weak.upgrade() {
                    value.update();
                }
            });
            Self {
                core: ValueCore::new(name, initial_value),
                own_value,
                reference: Restorable::extend(reference),
                on_click,
                force_rewrite,
                restore_after_long_click,
                velocity,
                double_click_window: session.config().double_click_window,
                long_click_threshold: session.config().long_click_threshold,
                last_press: Cell::new(None),
                pressed_since: Cell::new(None),
                _reference_subscription: reference_subscription,
            }
        })
    }

    #[must_use]
    pub fn own_value(&self) -> &T {
        &self.own_value
    }

    #[must_use]
    pub fn reference(&self) -> &Observable<T> {
        self.reference.cell()
    }

    /// The reference cell contains the own value.
    #[must_use]
    pub fn is_selected(&self) -> bool {
        self.reference
            .cell()
            .with(|reference| *reference == self.own_value)
    }

    fn update(&self) {
        self.core.set_value((self.velocity)(self.is_selected()));
    }

    /// Write the own value into the reference cell.
    pub fn select(&self) {
        let reference = self.reference.cell();
        if reference.set(self.own_value.clone()) {
            return;
        }
        if self.force_rewrite {
            reference.replace(self.own_value.clone());
        }
    }

    fn on_press(&self, ts: TimeStamp) {
        let is_double_click = self.last_press.get().is_some_and(|last_press| {
            ts.saturating_duration_since(last_press) <= self.double_click_window
        });
        // A third press starts a new double click
        self.last_press
            .set(if is_double_click { None } else { Some(ts) });
        if self.restore_after_long_click {
            self.reference.capture();
            self.pressed_since.set(Some(ts));
        }
        if let Some(on_click) = &self.on_click {
            on_click(KnockoutClick {
                own_value: self.own_value.clone(),
                reference: self.reference.cell().clone(),
                is_double_click,
            });
            return;
        }
        self.select();
    }

    fn on_release(&self, ts: TimeStamp) {
        let Some(pressed_since) = self.pressed_since.take() else {
            return;
        };
        if ts.saturating_duration_since(pressed_since) > self.long_click_threshold {
            log::debug!(
                "Restoring reference of \"{name}\" after long click",
                name = self.core.name()
            );
            self.reference.restore();
        } else {
            self.reference.discard();
        }
    }
}

impl<T: Clone + PartialEq + 'static> Value for KnockoutSyncedValue<T> {
    fn core(&self) -> &ValueCore {
        &self.core
    }

    /// Buttons that send a non-zero value when pressed and zero when released.
    fn on_absolute_value(&self, input: AbsoluteInput) {
        self.on_click(ClickInput {
            pressed: input.value > 0,
            ts: input.ts,
        });
    }

    fn on_click(&self, input: ClickInput) {
        let ClickInput { pressed, ts } = input;
        if pressed {
            self.on_press(ts);
        } else {
            self.on_release(ts);
        }
    }

    fn set_raw_value(&self, value: u8) {
        if value > 0 {
            self.select();
        }
    }
}
