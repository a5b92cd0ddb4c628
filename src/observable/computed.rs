// SPDX-FileCopyrightText: The lep authors
// SPDX-License-Identifier: MPL-2.0

use std::{cell::RefCell, fmt, rc::Rc};

use super::{Observable, Subscription};

struct Inner<T> {
    cell: Observable<T>,
    read: Box<dyn Fn() -> T>,
    write: RefCell<Option<Rc<dyn Fn(T)>>>,
    dependencies: RefCell<Vec<Subscription>>,
}

impl<T: Clone + PartialEq + 'static> Inner<T> {
    fn recompute(&self) {
        let value = (self.read)();
        self.cell.set(value);
    }
}

/// Derived reactive value.
///
/// The value is recomputed whenever one of the explicitly declared
/// dependencies changes and subscribers are notified if the result
/// differs from the cached value. An optional writer turns the cell
/// into a read/write cell that usually writes through to one of
/// its dependencies.
pub struct Computed<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.inner.cell.get())
            .field("dependencies", &self.inner.dependencies.borrow().len())
            .field("writable", &self.inner.write.borrow().is_some())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    #[must_use]
    pub fn new(read: impl Fn() -> T + 'static) -> Self {
        let cell = Observable::new(read());
        Self {
            inner: Rc::new(Inner {
                cell,
                read: Box::new(read),
                write: RefCell::new(None),
                dependencies: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Make the cell writable.
    #[must_use]
    pub fn writable(self, write: impl Fn(T) + 'static) -> Self {
        *self.inner.write.borrow_mut() = Some(Rc::new(write));
        self
    }

    /// Recompute when `dependency` changes.
    #[must_use]
    pub fn depends_on<D: Clone + 'static>(self, dependency: &Observable<D>) -> Self {
        let inner = Rc::downgrade(&self.inner);
        let subscription = dependency.subscribe(move |_| {
            if let Some(inner) = inner.upgrade() {
                inner.recompute();
            }
        });
        self.inner.dependencies.borrow_mut().push(subscription);
        self
    }

    /// Recompute when another computed value changes.
    #[must_use]
    pub fn depends_on_computed<D: Clone + PartialEq + 'static>(self, dependency: &Computed<D>) -> Self {
        self.depends_on(dependency.observable())
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.inner.cell.get()
    }

    /// Write through the writer.
    ///
    /// Read-only cells ignore the write.
    pub fn set(&self, value: T) {
        let write = self.inner.write.borrow().clone();
        let Some(write) = write else {
            log::debug!("Ignoring write of read-only computed value");
            return;
        };
        write(value);
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.inner.write.borrow().is_some()
    }

    /// Force recomputation, e.g. after an undeclared input has changed.
    pub fn recompute(&self) {
        self.inner.recompute();
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.cell.subscribe(callback)
    }

    /// The cached value as a read-only observable.
    ///
    /// Writing the returned cell directly bypasses the writer and
    /// is overwritten with the next recomputation.
    #[must_use]
    pub fn observable(&self) -> &Observable<T> {
        &self.inner.cell
    }
}
