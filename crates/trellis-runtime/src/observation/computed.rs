#![forbid(unsafe_code)]

//! Observation of computed (getter) properties.
//!
//! While it has subscribers, a [`GetterObserver`] runs the getter under a
//! dependency tracker, subscribes to every property and collection the
//! getter read, and re-runs on any of their changes. Subscribers hear about
//! the new result only if it differs from the last one, unless the
//! accessor is marked volatile.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::object::Getter;
use trellis_core::tracking::{self, DependencyCollector};
use trellis_core::{
    CollectionSubscriber, IndexMap, LifecycleFlags, ObjectRef, PropertySubscriber, Publisher, Value,
    WeakObjectRef,
};

use super::{ObserverKind, ObserverLocator, PropertyObserver};
use crate::binding::ObserverSlots;

#[derive(Default)]
struct Recorder {
    properties: RefCell<Vec<(ObjectRef, Rc<str>)>>,
    collections: RefCell<Vec<Value>>,
}

impl DependencyCollector for Recorder {
    fn record_property(&self, object: &ObjectRef, key: &str) {
        self.properties.borrow_mut().push((object.clone(), Rc::from(key)));
    }

    fn record_collection(&self, collection: &Value) {
        self.collections.borrow_mut().push(collection.clone());
    }
}

pub struct GetterObserver {
    object: WeakObjectRef,
    key: Rc<str>,
    getter: Option<Getter>,
    volatile: bool,
    locator: Weak<ObserverLocator>,
    current: RefCell<Value>,
    dependencies: ObserverSlots,
    subscribers: Publisher<dyn PropertySubscriber>,
}

impl GetterObserver {
    #[must_use]
    pub fn new(
        object: &ObjectRef,
        key: &str,
        volatile: bool,
        locator: Weak<ObserverLocator>,
    ) -> Rc<dyn PropertyObserver> {
        let getter = object.accessor(key).and_then(|a| a.getter);
        Rc::new_cyclic(|me: &Weak<Self>| Self {
            object: object.downgrade(),
            key: Rc::from(key),
            getter,
            volatile,
            locator,
            current: RefCell::new(Value::Undefined),
            dependencies: ObserverSlots::new(
                me.clone() as Weak<dyn PropertySubscriber>,
                me.clone() as Weak<dyn CollectionSubscriber>,
            ),
            subscribers: Publisher::new(),
        })
    }

    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    fn read(&self) -> Value {
        match (&self.getter, self.object.upgrade()) {
            (Some(getter), Some(object)) => tracking::untracked(|| getter(&object)),
            _ => Value::Undefined,
        }
    }

    /// Run the getter under a tracker and resubscribe to what it read.
    fn compute(&self) -> Value {
        let (Some(getter), Some(object)) = (&self.getter, self.object.upgrade()) else {
            return Value::Undefined;
        };
        let recorder = Rc::new(Recorder::default());
        let value = tracking::track(Rc::clone(&recorder) as Rc<dyn DependencyCollector>, || getter(&object));
        self.dependencies.begin_cycle();
        if let Some(locator) = self.locator.upgrade() {
            for (dep, key) in recorder.properties.take() {
                if dep.ptr_eq(&object) && key == self.key {
                    continue;
                }
                match locator.get_observer(&Value::Object(dep), &key) {
                    Ok(observer) => self.dependencies.observe_property(observer),
                    Err(error) => tracing::warn!(%error, key = %key, "computed dependency not observed"),
                }
            }
            for collection in recorder.collections.take() {
                if let Some(observer) = locator.get_collection_observer(&collection) {
                    self.dependencies.observe_collection(observer);
                }
            }
        }
        self.dependencies.unobserve_stale();
        value
    }

    fn recompute(&self) {
        let new_value = self.compute();
        let old_value = self.current.replace(new_value.clone());
        if self.volatile || !new_value.strict_eq(&old_value) {
            tracing::trace!(key = %self.key, volatile = self.volatile, "computed property changed");
            self.subscribers
                .notify(|s| s.handle_change(&new_value, &old_value, LifecycleFlags::UPDATE_TARGET_INSTANCE));
        }
    }
}

impl PropertySubscriber for GetterObserver {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {
        self.recompute();
    }
}

impl CollectionSubscriber for GetterObserver {
    fn handle_collection_change(&self, _: &IndexMap, _: LifecycleFlags) {
        self.recompute();
    }
}

impl PropertyObserver for GetterObserver {
    fn kind(&self) -> ObserverKind {
        ObserverKind::Getter
    }

    fn get_value(&self) -> Value {
        if self.subscribers.has_subscribers() {
            self.current.borrow().clone()
        } else {
            self.read()
        }
    }

    fn set_value(&self, value: Value, _flags: LifecycleFlags) {
        if let Some(object) = self.object.upgrade() {
            object.set(&self.key, value);
        }
    }

    fn subscribe(&self, subscriber: Weak<dyn PropertySubscriber>) -> bool {
        if !self.subscribers.has_subscribers() {
            let value = self.compute();
            *self.current.borrow_mut() = value;
        }
        self.subscribers.subscribe(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Weak<dyn PropertySubscriber>) -> bool {
        let removed = self.subscribers.unsubscribe(subscriber);
        if removed && !self.subscribers.has_subscribers() {
            self.dependencies.clear();
        }
        removed
    }
}

impl fmt::Debug for GetterObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterObserver")
            .field("key", &self.key)
            .field("volatile", &self.volatile)
            .field("dependencies", &self.dependencies.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
