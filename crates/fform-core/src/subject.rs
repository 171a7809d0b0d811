#![forbid(unsafe_code)]

//! Multi-subscriber synchronous push channels.
//!
//! A [`Subject<T>`] delivers each value passed to [`Subject::next`] to every
//! observer registered at that moment, in registration order, before `next`
//! returns.
//!
//! # Design
//!
//! `Subject<T>` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Observers are stored as `Weak` callbacks; the strong half lives in the
//! [`Subscription`] guard returned by [`Subject::subscribe`]. Dead entries are
//! cleaned lazily during delivery.
//!
//! # Invariants
//!
//! 1. Observers are notified in registration order.
//! 2. Delivery iterates a snapshot taken when `next` starts: observers added
//!    during delivery do not see the in-flight value, and observers dropped
//!    during delivery still receive it.
//! 3. No buffering: an observer never sees values sent before it subscribed.
//! 4. Dropping a [`Subscription`] stops delivery from the next `next` call on.
//! 5. Subscribers never keep a subject alive.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = dyn Fn(&T);

struct SubjectInner<T> {
    observers: RefCell<Vec<Weak<Callback<T>>>>,
    /// Number of values delivered so far.
    sent: Cell<u64>,
}

/// A synchronous, multi-subscriber push channel.
///
/// Cloning yields another handle to the **same** channel.
pub struct Subject<T> {
    inner: Rc<SubjectInner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("observers", &self.observer_count())
            .field("sent", &self.inner.sent.get())
            .finish()
    }
}

impl<T> Subject<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SubjectInner {
                observers: RefCell::new(Vec::new()),
                sent: Cell::new(0),
            }),
        }
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Total values pushed through this subject.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.inner.sent.get()
    }

    /// Deliver `value` to every current observer.
    pub fn next(&self, value: T) {
        let snapshot: Vec<Rc<Callback<T>>> = {
            let mut observers = self.inner.observers.borrow_mut();
            observers.retain(|w| w.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        self.inner.sent.set(self.inner.sent.get() + 1);
        tracing::trace!(
            message = "subject.deliver",
            observers = snapshot.len(),
            sent = self.inner.sent.get()
        );
        for callback in &snapshot {
            callback(&value);
        }
    }
}

impl<T: 'static> Subject<T> {
    /// Register `callback`; it stays registered until the returned guard is
    /// dropped.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        self.inner.observers.borrow_mut().push(Rc::downgrade(&strong));
        Subscription {
            guard: Some(Box::new(strong)),
        }
    }
}

/// RAII guard for a [`Subject`] observer. Dropping it unsubscribes.
#[must_use = "dropping the Subscription unsubscribes immediately"]
pub struct Subscription {
    guard: Option<Box<dyn Any>>,
}

impl Subscription {
    /// Unsubscribe now. Equivalent to dropping the guard.
    pub fn unsubscribe(mut self) {
        self.guard.take();
    }

    /// A guard with nothing attached.
    pub fn empty() -> Self {
        Self { guard: None }
    }

    /// Whether this guard still holds an observer.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
