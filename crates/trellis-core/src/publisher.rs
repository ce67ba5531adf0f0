#![forbid(unsafe_code)]

//! Subscriber collections.
//!
//! Every observer embeds a [`Publisher`] by value and delegates
//! `subscribe`/`unsubscribe`/`notify` to it. Subscribers are held weakly;
//! an observer never keeps a binding alive.
//!
//! # Storage
//!
//! | Subscribers | Layout |
//! |-------------|--------|
//! | 0..=3       | inline (`SmallVec` slots, no allocation) |
//! | 4+          | spilled to the heap |
//!
//! # Invariants
//!
//! 1. A subscriber is present at most once (identity compared on the
//!    allocation, ignoring trait-object metadata).
//! 2. Notification iterates a snapshot: a subscriber added during
//!    notification is not called in that round, and one removed during
//!    notification is still called in that round.
//! 3. Subscribers are called in subscription order.
//! 4. Dead weak entries are pruned lazily during notification.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::flags::LifecycleFlags;
use crate::index_map::IndexMap;
use crate::value::Value;

/// Receives scalar change notifications.
pub trait PropertySubscriber {
    fn handle_change(&self, new_value: &Value, previous_value: &Value, flags: LifecycleFlags);
}

/// Receives batched collection change notifications.
pub trait CollectionSubscriber {
    fn handle_collection_change(&self, index_map: &IndexMap, flags: LifecycleFlags);
}

/// An ordered, weakly-held subscriber set.
pub struct Publisher<S: ?Sized> {
    subscribers: RefCell<SmallVec<[Weak<S>; 3]>>,
}

impl<S: ?Sized> Publisher<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(SmallVec::new()),
        }
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn subscribe(&self, subscriber: Weak<S>) -> bool {
        let mut subs = self.subscribers.borrow_mut();
        if subs.iter().any(|s| Weak::ptr_eq(s, &subscriber)) {
            return false;
        }
        subs.push(subscriber);
        true
    }

    /// Remove a subscriber. Returns `false` if it was not present.
    pub fn unsubscribe(&self, subscriber: &Weak<S>) -> bool {
        let mut subs = self.subscribers.borrow_mut();
        match subs.iter().position(|s| Weak::ptr_eq(s, subscriber)) {
            Some(index) => {
                subs.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, subscriber: &Weak<S>) -> bool {
        self.subscribers
            .borrow()
            .iter()
            .any(|s| Weak::ptr_eq(s, subscriber))
    }

    /// Whether any live subscriber remains.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.subscribers.borrow().iter().any(|s| s.strong_count() > 0)
    }

    /// Number of registered entries (including dead ones not yet pruned).
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Whether the subscribers still fit in the inline slots.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        !self.subscribers.borrow().spilled()
    }

    /// Call `f` for each live subscriber in a snapshot of the current set.
    pub fn notify(&self, mut f: impl FnMut(&S)) {
        let snapshot: SmallVec<[Rc<S>; 3]> = {
            let mut subs = self.subscribers.borrow_mut();
            subs.retain(|s| s.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in &snapshot {
            f(subscriber.as_ref());
        }
    }
}

impl<S: ?Sized> Default for Publisher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for Publisher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("subscriber_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        hits: Cell<u32>,
    }

    impl PropertySubscriber for Counter {
        fn handle_change(&self, _new: &Value, _old: &Value, _flags: LifecycleFlags) {
            self.hits.set(self.hits.get() + 1);
        }
    }

    fn counter() -> Rc<Counter> {
        Rc::new(Counter { hits: Cell::new(0) })
    }

    fn weak(c: &Rc<Counter>) -> Weak<dyn PropertySubscriber> {
        let rc: Rc<dyn PropertySubscriber> = c.clone();
        Rc::downgrade(&rc)
    }

    fn fire(p: &Publisher<dyn PropertySubscriber>) {
        p.notify(|s| s.handle_change(&Value::Undefined, &Value::Undefined, LifecycleFlags::NONE));
    }

    #[test]
    fn subscribe_is_idempotent() {
        let p: Publisher<dyn PropertySubscriber> = Publisher::new();
        let c = counter();
        assert!(p.subscribe(weak(&c)));
        assert!(!p.subscribe(weak(&c)));
        assert_eq!(p.len(), 1);
        fire(&p);
        assert_eq!(c.hits.get(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let p: Publisher<dyn PropertySubscriber> = Publisher::new();
        let c = counter();
        p.subscribe(weak(&c));
        assert!(p.unsubscribe(&weak(&c)));
        assert!(!p.unsubscribe(&weak(&c)));
        fire(&p);
        assert_eq!(c.hits.get(), 0);
    }

    #[test]
    fn spills_past_three() {
        let p: Publisher<dyn PropertySubscriber> = Publisher::new();
        let counters: Vec<_> = (0..5).map(|_| counter()).collect();
        for (i, c) in counters.iter().enumerate() {
            p.subscribe(weak(c));
            assert_eq!(p.is_inline(), i < 3);
        }
        fire(&p);
        assert!(counters.iter().all(|c| c.hits.get() == 1));
    }

    #[test]
    fn dead_subscribers_pruned_on_notify() {
        let p: Publisher<dyn PropertySubscriber> = Publisher::new();
        let c = counter();
        p.subscribe(weak(&c));
        drop(c);
        assert_eq!(p.len(), 1);
        assert!(!p.has_subscribers());
        fire(&p);
        assert_eq!(p.len(), 0);
    }

    struct Mutating {
        publisher: Rc<Publisher<dyn PropertySubscriber>>,
        late: Rc<Counter>,
        victim: Rc<Counter>,
        hits: Cell<u32>,
    }

    impl PropertySubscriber for Mutating {
        fn handle_change(&self, _new: &Value, _old: &Value, _flags: LifecycleFlags) {
            self.hits.set(self.hits.get() + 1);
            self.publisher.subscribe(weak(&self.late));
            self.publisher.unsubscribe(&weak(&self.victim));
        }
    }

    #[test]
    fn snapshot_semantics_during_notify() {
        let publisher: Rc<Publisher<dyn PropertySubscriber>> = Rc::new(Publisher::new());
        let late = counter();
        let victim = counter();
        let mutating = Rc::new(Mutating {
            publisher: Rc::clone(&publisher),
            late: Rc::clone(&late),
            victim: Rc::clone(&victim),
            hits: Cell::new(0),
        });
        let m: Rc<dyn PropertySubscriber> = mutating.clone();
        publisher.subscribe(Rc::downgrade(&m));
        publisher.subscribe(weak(&victim));

        fire(&publisher);
        assert_eq!(mutating.hits.get(), 1);
        assert_eq!(late.hits.get(), 0, "added during notify: not called this round");
        assert_eq!(victim.hits.get(), 1, "removed during notify: still called this round");

        fire(&publisher);
        assert_eq!(late.hits.get(), 1);
        assert_eq!(victim.hits.get(), 1);
    }
}
