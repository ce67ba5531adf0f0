#![forbid(unsafe_code)]

//! Batched observation of arrays, maps and sets.
//!
//! A [`CollectionObserver`] attaches itself as the collection's sink. Each
//! mutating call pings it; the first ping of a turn queues it on the
//! lifecycle flush queue. On flush it takes the accumulated [`IndexMap`]
//! (resetting it to identity), hands it to every subscriber with
//! `IS_COLLECTION_MUTATION`, then lets the length observer report a new
//! `length`/`size`.
//!
//! Observation can be switched off per thread with
//! [`disable_collection_observation`]; observers created while it is off
//! never start index-map tracking and stay silent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{
    CollectionSink, CollectionSubscriber, IndexMap, LifecycleFlags, PropertySubscriber, Publisher, Value,
    WeakArrayRef, WeakMapRef, WeakSetRef,
};

use super::{ObserverKind, PropertyObserver};
use crate::error::Result;
use crate::lifecycle::{Flushable, Lifecycle};

/// Cache key of the collection observer on the collection itself.
pub(crate) const OBSERVER_KEY: &str = "";

thread_local! {
    static ENABLED: Cell<bool> = const { Cell::new(true) };
}

pub fn enable_collection_observation() {
    ENABLED.with(|e| e.set(true));
}

pub fn disable_collection_observation() {
    ENABLED.with(|e| e.set(false));
}

#[must_use]
pub fn collection_observation_enabled() -> bool {
    ENABLED.with(Cell::get)
}

#[derive(Clone)]
enum WeakCollection {
    Array(WeakArrayRef),
    Map(WeakMapRef),
    Set(WeakSetRef),
}

impl WeakCollection {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Array(a) => Some(Self::Array(a.downgrade())),
            Value::Map(m) => Some(Self::Map(m.downgrade())),
            Value::Set(s) => Some(Self::Set(s.downgrade())),
            _ => None,
        }
    }

    fn upgrade(&self) -> Option<Value> {
        match self {
            Self::Array(a) => a.upgrade().map(Value::Array),
            Self::Map(m) => m.upgrade().map(Value::Map),
            Self::Set(s) => s.upgrade().map(Value::Set),
        }
    }

    fn len(&self) -> usize {
        match self.upgrade() {
            Some(Value::Array(a)) => a.len(),
            Some(Value::Map(m)) => m.len(),
            Some(Value::Set(s)) => s.len(),
            _ => 0,
        }
    }

    fn start_tracking(&self, sink: Weak<dyn CollectionSink>) {
        match self.upgrade() {
            Some(Value::Array(a)) => a.start_tracking(sink),
            Some(Value::Map(m)) => m.start_tracking(sink),
            Some(Value::Set(s)) => s.start_tracking(sink),
            _ => {}
        }
    }

    fn take_index_map(&self) -> Option<IndexMap> {
        match self.upgrade()? {
            Value::Array(a) => a.take_index_map(),
            Value::Map(m) => m.take_index_map(),
            Value::Set(s) => s.take_index_map(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CollectionObserver
// ---------------------------------------------------------------------------

pub struct CollectionObserver {
    collection: WeakCollection,
    tracking: bool,
    subscribers: Publisher<dyn CollectionSubscriber>,
    length: RefCell<Option<Rc<CollectionLengthObserver>>>,
    lifecycle: Weak<Lifecycle>,
    self_ref: Weak<Self>,
}

impl CollectionObserver {
    /// An observer for `collection`, or `None` if it is not a collection.
    #[must_use]
    pub fn new(collection: &Value, lifecycle: &Rc<Lifecycle>, enabled: bool) -> Option<Rc<Self>> {
        let weak = WeakCollection::of(collection)?;
        let tracking = enabled && collection_observation_enabled();
        let observer = Rc::new_cyclic(|self_ref| Self {
            collection: weak,
            tracking,
            subscribers: Publisher::new(),
            length: RefCell::new(None),
            lifecycle: Rc::downgrade(lifecycle),
            self_ref: self_ref.clone(),
        });
        if tracking {
            let sink: Weak<dyn CollectionSink> = observer.self_ref.clone();
            observer.collection.start_tracking(sink);
        }
        Some(observer)
    }

    /// The observed collection, if still alive.
    #[must_use]
    pub fn collection(&self) -> Option<Value> {
        self.collection.upgrade()
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn subscribe(&self, subscriber: Weak<dyn CollectionSubscriber>) -> bool {
        self.subscribers.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, subscriber: &Weak<dyn CollectionSubscriber>) -> bool {
        self.subscribers.unsubscribe(subscriber)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// The observer for this collection's `length` (arrays) or `size`.
    pub fn length_observer(&self) -> Rc<dyn PropertyObserver> {
        let observer = Rc::clone(self.length.borrow_mut().get_or_insert_with(|| {
            Rc::new(CollectionLengthObserver {
                collection: self.collection.clone(),
                current: Cell::new(self.collection.len()),
                subscribers: Publisher::new(),
            })
        }));
        observer
    }
}

impl CollectionSink for CollectionObserver {
    fn collection_changed(&self) {
        if let (Some(lifecycle), Some(me)) = (self.lifecycle.upgrade(), self.self_ref.upgrade()) {
            if lifecycle.enqueue_flush(me) {
                tracing::trace!("collection change queued for flush");
            }
        }
    }
}

impl Flushable for CollectionObserver {
    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(index_map) = self.collection.take_index_map() else {
            return Ok(());
        };
        if !index_map.is_identity() {
            tracing::trace!(
                len = index_map.len(),
                deleted = index_map.deleted_items().len(),
                subscribers = self.subscribers.len(),
                "collection changed"
            );
            let flags = flags | LifecycleFlags::IS_COLLECTION_MUTATION;
            self.subscribers
                .notify(|s| s.handle_collection_change(&index_map, flags));
        }
        let length = self.length.borrow().clone();
        if let Some(length) = length {
            length.refresh();
        }
        Ok(())
    }
}

impl fmt::Debug for CollectionObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionObserver")
            .field("tracking", &self.tracking)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CollectionLengthObserver
// ---------------------------------------------------------------------------

/// Observes `length` of an array or `size` of a map or set. Refreshed by the
/// owning [`CollectionObserver`] on flush.
pub struct CollectionLengthObserver {
    collection: WeakCollection,
    current: Cell<usize>,
    subscribers: Publisher<dyn PropertySubscriber>,
}

impl CollectionLengthObserver {
    fn refresh(&self) {
        let new_len = self.collection.len();
        let old_len = self.current.replace(new_len);
        if new_len != old_len {
            let (new_value, old_value) = (Value::from(new_len), Value::from(old_len));
            self.subscribers
                .notify(|s| s.handle_change(&new_value, &old_value, LifecycleFlags::UPDATE_TARGET_INSTANCE));
        }
    }
}

impl PropertyObserver for CollectionLengthObserver {
    fn kind(&self) -> ObserverKind {
        ObserverKind::CollectionLength
    }

    fn get_value(&self) -> Value {
        Value::from(self.collection.len())
    }

    /// Truncates an array; maps and sets ignore writes.
    fn set_value(&self, value: Value, _flags: LifecycleFlags) {
        if let Some(Value::Array(array)) = self.collection.upgrade() {
            let target = value.to_number();
            if target.is_finite() && target >= 0.0 && (target as usize) < array.len() {
                array.splice(target as isize, None, Vec::new());
            }
        }
    }

    fn subscribe(&self, subscriber: Weak<dyn PropertySubscriber>) -> bool {
        self.subscribers.subscribe(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Weak<dyn PropertySubscriber>) -> bool {
        self.subscribers.unsubscribe(subscriber)
    }
}

impl fmt::Debug for CollectionLengthObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionLengthObserver")
            .field("current", &self.current.get())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use trellis_core::{ArrayRef, SetRef, NEW_ITEM};

    #[derive(Default)]
    struct Maps(RefCell<Vec<(IndexMap, LifecycleFlags)>>);

    impl CollectionSubscriber for Maps {
        fn handle_collection_change(&self, index_map: &IndexMap, flags: LifecycleFlags) {
            self.0.borrow_mut().push((index_map.clone(), flags));
        }
    }

    #[derive(Default)]
    struct Lengths(RefCell<Vec<Value>>);

    impl PropertySubscriber for Lengths {
        fn handle_change(&self, new_value: &Value, _: &Value, _: LifecycleFlags) {
            self.0.borrow_mut().push(new_value.clone());
        }
    }

    fn setup() -> (Rc<Scheduler>, Rc<Lifecycle>) {
        let scheduler = Rc::new(Scheduler::manual());
        let lifecycle = Lifecycle::new(Rc::clone(&scheduler));
        (scheduler, lifecycle)
    }

    #[test]
    fn mutations_batch_into_one_flush() {
        let (scheduler, lc) = setup();
        let array = ArrayRef::from_vec(vec![Value::from(1), Value::from(2)]);
        let observer = CollectionObserver::new(&Value::Array(array.clone()), &lc, true).expect("array");
        let maps = Rc::new(Maps::default());
        observer.subscribe(Rc::downgrade(&maps) as Weak<dyn CollectionSubscriber>);
        let lengths = Rc::new(Lengths::default());
        observer
            .length_observer()
            .subscribe(Rc::downgrade(&lengths) as Weak<dyn PropertySubscriber>);

        array.push(3);
        array.shift();
        assert!(maps.0.borrow().is_empty());
        scheduler.drain_microtasks();

        let seen = maps.0.borrow();
        assert_eq!(seen.len(), 1);
        let (map, flags) = &seen[0];
        assert_eq!(map.entries(), &[1, NEW_ITEM]);
        assert_eq!(map.deleted_indices(), &[0]);
        assert!(flags.contains(LifecycleFlags::IS_COLLECTION_MUTATION));
        assert!(lengths.0.borrow().is_empty(), "length unchanged at 2");
    }

    #[test]
    fn size_change_reaches_length_observer() {
        let (scheduler, lc) = setup();
        let set = SetRef::new();
        let observer = CollectionObserver::new(&Value::Set(set.clone()), &lc, true).expect("set");
        let lengths = Rc::new(Lengths::default());
        observer
            .length_observer()
            .subscribe(Rc::downgrade(&lengths) as Weak<dyn PropertySubscriber>);
        set.add("a");
        scheduler.drain_microtasks();
        assert_eq!(*lengths.0.borrow(), vec![Value::from(1)]);
    }

    #[test]
    fn disabled_observation_never_tracks() {
        let (scheduler, lc) = setup();
        disable_collection_observation();
        let array = ArrayRef::new();
        let observer = CollectionObserver::new(&Value::Array(array.clone()), &lc, true).expect("array");
        enable_collection_observation();
        assert!(!observer.is_tracking());
        assert!(!array.is_tracked());
        array.push(1);
        scheduler.drain_microtasks();
        assert_eq!(lc.flush_count(), 0);
    }

    #[test]
    fn non_collections_have_no_observer() {
        let (_, lc) = setup();
        assert!(CollectionObserver::new(&Value::from(1), &lc, true).is_none());
    }
}
