//! State observers and their cancellation handles
//!
//! A store keeps an explicit, ordered list of observer callbacks and calls
//! every one of them synchronously after each state change. Registering an
//! observer returns a [`Subscription`]; cancelling or dropping it removes the
//! observer.
//!
//! # Example
//!
//! ```ignore
//! let subscription = store.subscribe(|state: &Counter| {
//!     println!("count is now {}", state.count);
//! });
//!
//! store.send(CounterAction::Increment);
//!
//! // Stop observing
//! subscription.cancel();
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Handle to a registered observer.
///
/// The observer stays registered until the handle is cancelled or dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        self.release_now();
    }

    /// Whether this handle still holds a registration.
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

type Observer<T> = Rc<dyn Fn(&T)>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Observer<T>)>,
}

/// Ordered list of observers of a value of type `T`.
pub(crate) struct ObserverList<T> {
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T: 'static> ObserverList<T> {
    pub(crate) fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register an observer at the end of the list.
    pub(crate) fn insert(&self, observer: Observer<T>) -> Subscription {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, observer));
            id
        };

        let registry: Weak<RefCell<Registry<T>>> = Rc::downgrade(&self.registry);
        Subscription::new(move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let removed = {
                let mut registry = registry.borrow_mut();
                let index = registry
                    .entries
                    .iter()
                    .position(|(entry_id, _)| *entry_id == id);
                index.map(|index| registry.entries.remove(index))
            };
            // Dropped outside the borrow: the observer may own other subscriptions.
            drop(removed);
        })
    }

    /// Call every observer registered when notification starts, in
    /// registration order. Observers removed by an earlier observer in the
    /// same round are skipped.
    pub(crate) fn notify(&self, value: &T) {
        let observers: Vec<(u64, Observer<T>)> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|(id, observer)| (*id, Rc::clone(observer)))
            .collect();
        for (id, observer) in observers {
            if self.is_registered(id) {
                observer(value);
            }
        }
    }

    fn is_registered(&self, id: u64) -> bool {
        self.registry
            .borrow()
            .entries
            .iter()
            .any(|(entry_id, _)| *entry_id == id)
    }

    /// Drop every observer.
    pub(crate) fn clear(&self) -> usize {
        let entries = std::mem::take(&mut self.registry.borrow_mut().entries);
        entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }
}
