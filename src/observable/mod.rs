// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

//! Minimal single-threaded reactive cells.
//!
//! Writing an [`Observable`] notifies all subscribers synchronously,
//! before the write returns. Subscribers are invoked in subscription
//! order. A [`Subscription`] ends when it is disposed or dropped.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

mod computed;
pub use self::computed::Computed;

mod restorable;
pub use self::restorable::Restorable;


type SubscriptionId = u64;

type Callback<T> = Rc<dyn Fn(&T)>;

trait Unsubscribe {
    fn unsubscribe(&self, id: SubscriptionId);
}

struct Inner<T> {
    value: RefCell<T>,
    next_id: Cell<SubscriptionId>,
    subscribers: RefCell<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Inner<T> {
    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscribers
            .borrow()
            .iter()
            .any(|(subscribed_id, _)| *subscribed_id == id)
    }
}

impl<T> Unsubscribe for Inner<T> {
    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .borrow_mut()
            .retain(|(subscribed_id, _)| *subscribed_id != id);
    }
}

/// Read/write reactive cell.
///
/// Cloning an observable creates another handle to the same cell.
pub struct Observable<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.inner.value.borrow())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

impl<T: Default + Clone + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + 'static> Observable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(value),
                next_id: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Read the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without cloning it.
    ///
    /// The closure must not write this observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value and notify all subscribers unconditionally.
    pub fn replace(&self, value: T) -> T {
        let old_value = self.inner.value.replace(value);
        self.notify();
        old_value
    }

    /// Notify all subscribers about the current value.
    ///
    /// Useful after the value has been rewritten with an equal value
    /// that should nevertheless be propagated.
    pub fn notify(&self) {
        let value = self.get();
        // Subscribers might (un-)subscribe while being notified
        let callbacks = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(id, callback)| (*id, Rc::clone(callback)))
            .collect::<Vec<_>>();
        for (id, callback) in callbacks {
            if !self.inner.is_subscribed(id) {
                // Disposed by a preceding subscriber
                continue;
            }
            callback(&value);
        }
    }

    /// Subscribe to changes.
    ///
    /// The callback is not invoked for the current value.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(callback)));
        let source = Rc::downgrade(&self.inner) as Weak<dyn Unsubscribe>;
        Subscription {
            source: Some(source),
            id,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Check if both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Write a new value.
    ///
    /// Subscribers are only notified if the value actually changed.
    /// Returns `true` if the value has changed.
    pub fn set(&self, value: T) -> bool {
        if *self.inner.value.borrow() == value {
            return false;
        }
        self.replace(value);
        true
    }
}

impl Observable<bool> {
    /// Invert a boolean cell.
    pub fn toggle(&self) {
        let value = self.get();
        self.set(!value);
    }
}

/// Handle of a subscription.
///
/// Unsubscribes when disposed or dropped. Use [`Subscription::persist()`]
/// for subscriptions that should live as long as the observed cell.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    source: Option<Weak<dyn Unsubscribe>>,
    id: SubscriptionId,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Check if the subscription is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.source
            .as_ref()
            .is_some_and(|source| source.strong_count() > 0)
    }

    /// Unsubscribe explicitly.
    pub fn dispose(mut self) {
        self.unsubscribe();
    }

    /// Keep the subscription alive until the observed cell is dropped.
    pub fn persist(mut self) {
        self.source = None;
    }

    fn unsubscribe(&mut self) {
        let Some(source) = self.source.take().and_then(|source| source.upgrade()) else {
            return;
        };
        source.unsubscribe(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
