#![forbid(unsafe_code)]

//! Observers for plain object properties and primitives.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{LifecycleFlags, ObjectRef, PropertyInterceptor, PropertySubscriber, Publisher, Value, WeakObjectRef};

use super::{ObserverKind, PropertyObserver};
use crate::expression::get_property;

// ---------------------------------------------------------------------------
// SetterObserver
// ---------------------------------------------------------------------------

/// Observes writes to one property by intercepting its setter.
///
/// A lazy observer installs the interceptor on first subscribe; an eager one
/// (binding-context objects) installs it at construction. A custom observer
/// intercepts a static accessor's setter instead of a data slot.
pub struct SetterObserver {
    object: WeakObjectRef,
    key: Rc<str>,
    kind: ObserverKind,
    installed: Cell<bool>,
    subscribers: Publisher<dyn PropertySubscriber>,
    self_ref: Weak<Self>,
}

impl SetterObserver {
    fn build(object: &ObjectRef, key: &str, kind: ObserverKind) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            object: object.downgrade(),
            key: Rc::from(key),
            kind,
            installed: Cell::new(false),
            subscribers: Publisher::new(),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn lazy(object: &ObjectRef, key: &str) -> Rc<dyn PropertyObserver> {
        Self::build(object, key, ObserverKind::Setter)
    }

    #[must_use]
    pub fn eager(object: &ObjectRef, key: &str) -> Rc<dyn PropertyObserver> {
        let observer = Self::build(object, key, ObserverKind::Setter);
        observer.install();
        observer
    }

    #[must_use]
    pub fn custom(object: &ObjectRef, key: &str) -> Rc<dyn PropertyObserver> {
        Self::build(object, key, ObserverKind::CustomSetter)
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed.get()
    }

    fn install(&self) {
        if self.installed.get() {
            return;
        }
        let (Some(object), Some(me)) = (self.object.upgrade(), self.self_ref.upgrade()) else {
            return;
        };
        object.install_interceptor(&self.key, me);
        self.installed.set(true);
    }
}

impl PropertyInterceptor for SetterObserver {
    fn intercept(&self, new_value: &Value, old_value: &Value) {
        if new_value.strict_eq(old_value) {
            return;
        }
        tracing::trace!(key = %self.key, "property changed");
        self.subscribers
            .notify(|s| s.handle_change(new_value, old_value, LifecycleFlags::UPDATE_TARGET_INSTANCE));
    }
}

impl PropertyObserver for SetterObserver {
    fn kind(&self) -> ObserverKind {
        self.kind
    }

    fn get_value(&self) -> Value {
        self.object
            .upgrade()
            .map_or(Value::Undefined, |o| o.get_untracked(&self.key))
    }

    fn set_value(&self, value: Value, _flags: LifecycleFlags) {
        if let Some(object) = self.object.upgrade() {
            object.set(&self.key, value);
        }
    }

    fn subscribe(&self, subscriber: Weak<dyn PropertySubscriber>) -> bool {
        self.install();
        self.subscribers.subscribe(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Weak<dyn PropertySubscriber>) -> bool {
        self.subscribers.unsubscribe(subscriber)
    }
}

impl fmt::Debug for SetterObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetterObserver")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("installed", &self.installed.get())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PropertyAccessor
// ---------------------------------------------------------------------------

/// Non-observing read/write path to an object property.
#[derive(Debug)]
pub struct PropertyAccessor {
    object: WeakObjectRef,
    key: Rc<str>,
}

impl PropertyAccessor {
    #[must_use]
    pub fn new(object: &ObjectRef, key: &str) -> Self {
        Self {
            object: object.downgrade(),
            key: Rc::from(key),
        }
    }
}

impl PropertyObserver for PropertyAccessor {
    fn kind(&self) -> ObserverKind {
        ObserverKind::PropertyAccessor
    }

    fn get_value(&self) -> Value {
        self.object
            .upgrade()
            .map_or(Value::Undefined, |o| o.get_untracked(&self.key))
    }

    fn set_value(&self, value: Value, _flags: LifecycleFlags) {
        if let Some(object) = self.object.upgrade() {
            object.set(&self.key, value);
        }
    }
}

// ---------------------------------------------------------------------------
// PrimitiveObserver
// ---------------------------------------------------------------------------

/// Reads a property of an immutable value. Never notifies.
#[derive(Debug)]
pub struct PrimitiveObserver {
    target: Value,
    key: Rc<str>,
}

impl PrimitiveObserver {
    #[must_use]
    pub fn new(target: Value, key: &str) -> Self {
        Self {
            target,
            key: Rc::from(key),
        }
    }
}

impl PropertyObserver for PrimitiveObserver {
    fn kind(&self) -> ObserverKind {
        ObserverKind::Primitive
    }

    fn get_value(&self) -> Value {
        get_property(&self.target, &self.key)
    }

    fn set_value(&self, _value: Value, _flags: LifecycleFlags) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Log(RefCell<Vec<(Value, Value)>>);

    impl PropertySubscriber for Log {
        fn handle_change(&self, new_value: &Value, previous_value: &Value, _: LifecycleFlags) {
            self.0.borrow_mut().push((new_value.clone(), previous_value.clone()));
        }
    }

    fn weak(log: &Rc<Log>) -> Weak<dyn PropertySubscriber> {
        Rc::downgrade(log) as Weak<dyn PropertySubscriber>
    }

    #[test]
    fn lazy_observer_installs_on_first_subscribe() {
        let obj = ObjectRef::from_pairs([("a", 1)]);
        let observer = SetterObserver::lazy(&obj, "a");
        assert!(!obj.is_intercepted("a"));
        let log = Rc::new(Log::default());
        observer.subscribe(weak(&log));
        assert!(obj.is_intercepted("a"));
        obj.set("a", 2);
        assert_eq!(*log.0.borrow(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn unchanged_write_does_not_notify() {
        let obj = ObjectRef::from_pairs([("a", "x")]);
        let observer = SetterObserver::eager(&obj, "a");
        let log = Rc::new(Log::default());
        observer.subscribe(weak(&log));
        obj.set("a", "x");
        assert!(log.0.borrow().is_empty());
        observer.set_value(Value::from("y"), LifecycleFlags::NONE);
        assert_eq!(log.0.borrow().len(), 1);
        assert_eq!(observer.get_value(), Value::from("y"));
    }

    #[test]
    fn primitive_reads_string_length() {
        let observer = PrimitiveObserver::new(Value::from("abc"), "length");
        assert_eq!(observer.get_value(), Value::from(3));
        assert!(!observer.subscribe(Weak::<Log>::new() as Weak<dyn PropertySubscriber>));
    }
}
