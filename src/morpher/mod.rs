// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Blending between snapshots of parameter values.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    rc::{Rc, Weak},
};

use crate::{
    util::{round_to_u7, U7_MAX},
    BaseValue, ControlSet, Error, KnockoutClick, KnockoutSyncedConfig, KnockoutSyncedValue,
    Observable, Result, Session, Subscription, UniformValueSet, Value, ValueSet, ValueSetRef,
};

pub const MAX_SNAPSHOT_SLOTS: usize = 8;

pub const MAX_MORPH_PARAMETERS: usize = 128;

#[derive(Debug, Default)]
struct SnapshotBank {
    slots: HashMap<usize, Vec<u8>>,
    reference: Option<usize>,
}

/// Snapshots of all morph targets, keyed by the identity of the target.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    banks: RefCell<HashMap<String, SnapshotBank>>,
}

impl SnapshotStore {
    pub fn save(&self, target_id: &str, slot: usize, values: Vec<u8>) {
        self.banks
            .borrow_mut()
            .entry(target_id.to_owned())
            .or_default()
            .slots
            .insert(slot, values);
    }

    #[must_use]
    pub fn load(&self, target_id: &str, slot: usize) -> Option<Vec<u8>> {
        self.banks
            .borrow()
            .get(target_id)
            .and_then(|bank| bank.slots.get(&slot))
            .cloned()
    }

    #[must_use]
    pub fn has_snapshot(&self, target_id: &str, slot: usize) -> bool {
        self.banks
            .borrow()
            .get(target_id)
            .is_some_and(|bank| bank.slots.contains_key(&slot))
    }

    #[must_use]
    pub fn reference(&self, target_id: &str) -> Option<usize> {
        self.banks
            .borrow()
            .get(target_id)
            .and_then(|bank| bank.reference)
    }

    pub fn set_reference(&self, target_id: &str, slot: Option<usize>) {
        self.banks
            .borrow_mut()
            .entry(target_id.to_owned())
            .or_default()
            .reference = slot;
    }
}

#[derive(Debug, Clone)]
pub struct MorpherConfig {
    pub num_slots: usize,

    /// Limits the number of values of the target.
    pub max_parameters: usize,

    /// Pressing a slot button while shift is held saves a snapshot
    /// instead of loading it.
    pub shift: Option<Observable<bool>>,
}

impl Default for MorpherConfig {
    fn default() -> Self {
        Self {
            num_slots: MAX_SNAPSHOT_SLOTS,
            max_parameters: MAX_MORPH_PARAMETERS,
            shift: None,
        }
    }
}

/// Contribution of a single snapshot to the blend.
#[must_use]
pub fn normalization_factor(weight: u8, total_weight: f64) -> f64 {
    debug_assert!(total_weight > 0.0);
    let weight = f64::from(weight);
    (weight / total_weight) * (weight / f64::from(U7_MAX))
}

/// Blend the weighted snapshots with the reference snapshot.
///
/// `snapshots` contains pairs of weight and values, one per slot. Empty
/// slots count towards the total weight without contributing any values.
/// Returns `None` if the total weight is zero.
#[must_use]
pub fn blend_snapshots(reference: &[u8], snapshots: &[(u8, Option<&[u8]>)]) -> Option<Vec<u8>> {
    let total_weight = snapshots
        .iter()
        .map(|(weight, _)| f64::from(*weight))
        .sum::<f64>();
    if total_weight <= 0.0 {
        return None;
    }
    let mut diff = vec![0.0; reference.len()];
    for (weight, values) in snapshots {
        let Some(values) = values else {
            continue;
        };
        if *weight == 0 {
            continue;
        }
        let factor = normalization_factor(*weight, total_weight);
        for (index, (value, reference_value)) in values.iter().zip(reference).enumerate() {
            diff[index] += (f64::from(*value) - f64::from(*reference_value)) * factor;
        }
    }
    Some(
        reference
            .iter()
            .zip(diff)
            .map(|(reference_value, diff)| round_to_u7(f64::from(*reference_value) + diff))
            .collect(),
    )
}

/// Morphs the values of a target value set between snapshots.
///
/// While active the morpher occupies a control set with its weight faders.
/// Slot buttons load a snapshot as the reference or save the current
/// values of the target into a slot.
pub struct Morpher {
    name: String,
    num_slots: usize,
    max_parameters: usize,
    shift: Option<Observable<bool>>,
    snapshot_store: Rc<SnapshotStore>,
    weight_values: Vec<Rc<BaseValue>>,
    weights: Rc<UniformValueSet>,
    slot_buttons: Rc<UniformValueSet>,
    reference_slot: Observable<Option<usize>>,
    target: RefCell<Option<ValueSetRef>>,
    target_subscription: RefCell<Option<Subscription>>,
    control_set: RefCell<Option<Rc<ControlSet>>>,
    displaced: RefCell<Option<ValueSetRef>>,
    blend_applied: Cell<bool>,
    _weight_subscriptions: Vec<Subscription>,
}

impl fmt::Debug for Morpher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Morpher")
            .field("name", &self.name)
            .field("num_slots", &self.num_slots)
            .field("reference_slot", &self.reference_slot.get())
            .field(
                "target",
                &self
                    .target
                    .borrow()
                    .as_ref()
                    .map(|target| target.dynamic_id()),
            )
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Morpher {
    pub fn new(session: &Rc<Session>, name: impl Into<String>, config: MorpherConfig) -> Result<Rc<Self>> {
        let MorpherConfig {
            num_slots,
            max_parameters,
            shift,
        } = config;
        if num_slots > MAX_SNAPSHOT_SLOTS {
            return Err(Error::TooManySnapshotSlots {
                requested: num_slots,
                max: MAX_SNAPSHOT_SLOTS,
            });
        }
        if max_parameters > MAX_MORPH_PARAMETERS {
            return Err(Error::TooManyMorphParameters {
                requested: max_parameters,
                max: MAX_MORPH_PARAMETERS,
            });
        }
        let Some(page_size) = NonZeroUsize::new(num_slots) else {
            return Err(Error::InvalidPageSize(num_slots));
        };
        let name = name.into();
        let reference_slot = Observable::new(None);
        let weight_values = (0..num_slots)
            .map(|slot| BaseValue::new(format!("{name} weight {}", slot + 1), 0))
            .collect::<Vec<_>>();
        let weights = UniformValueSet::with_page_size(
            session,
            format!("{name} weights"),
            page_size,
            weight_values
                .iter()
                .map(|value| Rc::clone(value) as Rc<dyn Value>)
                .collect(),
        );
        let morpher = Rc::new_cyclic(|weak: &Weak<Self>| {
            let slot_buttons = (0..num_slots)
                .map(|slot| {
                    let weak = Weak::clone(weak);
                    let on_click = Rc::new(move |_: KnockoutClick<Option<usize>>| {
                        if let Some(morpher) = weak.upgrade() {
                            morpher.on_slot_pressed(slot);
                        }
                    });
                    KnockoutSyncedValue::new(
                        session,
                        format!("{name} slot {}", slot + 1),
                        Some(slot),
                        reference_slot.clone(),
                        KnockoutSyncedConfig {
                            on_click: Some(on_click),
                            ..Default::default()
                        },
                    ) as Rc<dyn Value>
                })
                .collect();
            let slot_buttons = UniformValueSet::with_page_size(
                session,
                format!("{name} slots"),
                page_size,
                slot_buttons,
            );
            let weight_subscriptions = weight_values
                .iter()
                .map(|value| {
                    let weak = Weak::clone(weak);
                    value.observable().subscribe(move |_| {
                        if let Some(morpher) = weak.upgrade() {
                            morpher.blend();
                        }
                    })
                })
                .collect();
            Self {
                name,
                num_slots,
                max_parameters,
                shift,
                snapshot_store: Rc::clone(session.snapshot_store()),
                weight_values,
                weights,
                slot_buttons,
                reference_slot,
                target: RefCell::new(None),
                target_subscription: RefCell::new(None),
                control_set: RefCell::new(None),
                displaced: RefCell::new(None),
                blend_applied: Cell::new(false),
                _weight_subscriptions: weight_subscriptions,
            }
        });
        Ok(morpher)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The weight faders, one per slot.
    #[must_use]
    pub fn weights(&self) -> ValueSetRef {
        Rc::clone(&self.weights) as _
    }

    /// Lit if the slot is the reference.
    #[must_use]
    pub fn slot_buttons(&self) -> ValueSetRef {
        Rc::clone(&self.slot_buttons) as _
    }

    #[must_use]
    pub fn reference_slot(&self) -> &Observable<Option<usize>> {
        &self.reference_slot
    }

    #[must_use]
    pub fn target(&self) -> Option<ValueSetRef> {
        self.target.borrow().clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.control_set.borrow().is_some()
    }

    /// Take over a control set for the weight faders and follow a target.
    ///
    /// The value set that has been attached to the control set before
    /// is returned by [`Morpher::deactivate()`].
    pub fn activate(
        self: &Rc<Self>,
        control_set: &Rc<ControlSet>,
        target: &Observable<Option<ValueSetRef>>,
    ) -> Result<()> {
        if self.is_active() {
            self.deactivate();
        }
        self.set_target(target.get())?;
        let displaced = control_set.value_set();
        control_set.set_value_set(Some(self.weights()))?;
        *self.displaced.borrow_mut() = displaced;
        *self.control_set.borrow_mut() = Some(Rc::clone(control_set));
        let weak = Rc::downgrade(self);
        let subscription = target.subscribe(move |target| {
            let Some(morpher) = weak.upgrade() else {
                return;
            };
            if let Err(err) = morpher.set_target(target.clone()) {
                log::warn!("Morpher \"{name}\" has no target: {err}", name = morpher.name);
            }
        });
        *self.target_subscription.borrow_mut() = Some(subscription);
        log::info!("Activated morpher \"{name}\"", name = self.name);
        Ok(())
    }

    /// Release the control set.
    ///
    /// Returns the value set that has been displaced on activation for
    /// restoring it.
    pub fn deactivate(&self) -> Option<ValueSetRef> {
        self.target_subscription.borrow_mut().take();
        let control_set = self.control_set.borrow_mut().take()?;
        let weights = self.weights();
        if control_set
            .value_set()
            .is_some_and(|value_set| Rc::ptr_eq(&value_set, &weights))
        {
            control_set.reset(None);
        }
        *self.target.borrow_mut() = None;
        log::info!("Deactivated morpher \"{name}\"", name = self.name);
        self.displaced.borrow_mut().take()
    }

    fn set_target(&self, target: Option<ValueSetRef>) -> Result<()> {
        if let Some(target) = &target {
            let requested = target.values().len();
            if requested > self.max_parameters {
                *self.target.borrow_mut() = None;
                self.reference_slot.set(None);
                return Err(Error::TooManyMorphParameters {
                    requested,
                    max: self.max_parameters,
                });
            }
        }
        let reference = target
            .as_ref()
            .and_then(|target| self.snapshot_store.reference(&target.dynamic_id()));
        *self.target.borrow_mut() = target;
        self.blend_applied.set(false);
        self.reference_slot.set(reference);
        Ok(())
    }

    fn on_slot_pressed(&self, slot: usize) {
        let shift = self.shift.as_ref().is_some_and(Observable::get);
        if shift {
            self.save_snapshot(slot);
        } else {
            self.load_snapshot(slot);
        }
    }

    /// Capture the current values of the target.
    pub fn save_snapshot(&self, slot: usize) {
        let Some(target) = self.target() else {
            log::debug!("Morpher \"{name}\" has no target", name = self.name);
            return;
        };
        let values = target
            .values()
            .iter()
            .map(|value| value.raw_value())
            .collect::<Vec<_>>();
        log::debug!(
            "Saving snapshot {slot} of \"{target}\": {values:?}",
            target = target.dynamic_id()
        );
        self.snapshot_store
            .save(&target.dynamic_id(), slot, values);
    }

    /// Select a snapshot as the reference and write its values into the target.
    pub fn load_snapshot(&self, slot: usize) {
        let Some(target) = self.target() else {
            log::debug!("Morpher \"{name}\" has no target", name = self.name);
            return;
        };
        let target_id = target.dynamic_id();
        let Some(values) = self.snapshot_store.load(&target_id, slot) else {
            log::debug!("No snapshot {slot} for \"{target_id}\"");
            return;
        };
        self.snapshot_store.set_reference(&target_id, Some(slot));
        self.reference_slot.set(Some(slot));
        write_raw_values(target.as_ref(), &values);
        self.blend_applied.set(false);
        self.blend();
    }

    /// Recompute the blended values and write them into the target.
    pub fn blend(&self) {
        let Some(target) = self.target() else {
            return;
        };
        let Some(reference_slot) = self.reference_slot.get() else {
            return;
        };
        let target_id = target.dynamic_id();
        let Some(reference) = self.snapshot_store.load(&target_id, reference_slot) else {
            return;
        };
        let snapshots = self
            .weight_values
            .iter()
            .enumerate()
            .filter_map(|(slot, weight)| {
                let weight = weight.value();
                if weight == 0 {
                    return None;
                }
                Some((weight, self.snapshot_store.load(&target_id, slot)))
            })
            .collect::<Vec<_>>();
        let snapshots = snapshots
            .iter()
            .map(|(weight, values)| (*weight, values.as_deref()))
            .collect::<Vec<_>>();
        match blend_snapshots(&reference, &snapshots) {
            Some(blended) => {
                write_raw_values(target.as_ref(), &blended);
                self.blend_applied.set(true);
            }
            None => {
                if self.blend_applied.take() {
                    write_raw_values(target.as_ref(), &reference);
                }
            }
        }
    }
}

fn write_raw_values(target: &dyn ValueSet, raw_values: &[u8]) {
    for (value, raw_value) in target.values().iter().zip(raw_values) {
        value.set_raw_value(*raw_value);
    }
}

#[cfg(test)]
mod tests;
