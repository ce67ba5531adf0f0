#![forbid(unsafe_code)]

//! Property observation.
//!
//! [`ObserverLocator::get_observer`] picks one observer per (target, key)
//! and caches it on the target, so repeated lookups return the same
//! instance. The dispatch order is:
//!
//! | Target | Observer |
//! |--------|----------|
//! | binding-context object | eager [`SetterObserver`] |
//! | host node | element observers and accessors ([`element`]) |
//! | array / map / set `length` / `size` | [`CollectionLengthObserver`] |
//! | registered adapter claims it | the adapter's observer |
//! | accessor, non-configurable | [`DirtyCheckProperty`] |
//! | accessor, static with setter | custom [`SetterObserver`] |
//! | accessor, otherwise | [`GetterObserver`] |
//! | plain data property | lazy [`SetterObserver`] |
//! | primitive | [`PrimitiveObserver`] |
//!
//! [`ObserverLocator::get_accessor`] returns the cached observer when one
//! exists and otherwise a non-caching write path.
//!
//! # Failure Modes
//!
//! Only dirty checking can fail: with `throw_on_use` configured the
//! locator returns [`EvalError::DirtyCheckDisallowed`].

pub mod collection;
pub mod computed;
pub mod dirty_check;
pub mod element;
pub mod property;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{ArrayRef, LifecycleFlags, MapRef, Node, ObjectKind, ObjectRef, PropertySubscriber, SetRef, Value};

use crate::error::EvalError;
use crate::lifecycle::Lifecycle;

pub use collection::{
    collection_observation_enabled, disable_collection_observation, enable_collection_observation,
    CollectionLengthObserver, CollectionObserver,
};
pub use computed::GetterObserver;
pub use dirty_check::{DirtyCheckProperty, DirtyChecker};
pub use element::{ElementAccessor, InputObserver};
pub use property::{PrimitiveObserver, PropertyAccessor, SetterObserver};

/// Which strategy an observer implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    Setter,
    CustomSetter,
    Getter,
    DirtyCheck,
    Primitive,
    PropertyAccessor,
    CollectionLength,
    ValueAttribute,
    Checked,
    ClassAttribute,
    StyleAttribute,
    StyleProperty,
    DataAttribute,
    ElementProperty,
    Adapter,
}

/// Read/write access to one property, optionally observable.
pub trait PropertyObserver {
    fn kind(&self) -> ObserverKind;

    fn get_value(&self) -> Value;

    fn set_value(&self, value: Value, flags: LifecycleFlags);

    /// Returns `false` for accessors that cannot notify.
    fn subscribe(&self, _subscriber: Weak<dyn PropertySubscriber>) -> bool {
        false
    }

    fn unsubscribe(&self, _subscriber: &Weak<dyn PropertySubscriber>) -> bool {
        false
    }

    /// Replace the host events that signal a target-side change. Returns
    /// `false` if the observer does not listen to events.
    fn set_update_events(&self, _events: &[Rc<str>]) -> bool {
        false
    }
}

/// Supplies observers for properties the built-in strategies should not
/// handle.
pub trait ObserverAdapter {
    fn observer_for(&self, object: &ObjectRef, key: &str) -> Option<Rc<dyn PropertyObserver>>;
}

/// Cache entry stored on observed targets.
struct ObserverEntry(Rc<dyn PropertyObserver>);

fn cached(entry: Option<Rc<dyn Any>>) -> Option<Rc<dyn PropertyObserver>> {
    entry
        .and_then(|e| e.downcast::<ObserverEntry>().ok())
        .map(|e| Rc::clone(&e.0))
}

fn entry(observer: Rc<dyn PropertyObserver>) -> Rc<dyn Any> {
    Rc::new(ObserverEntry(observer))
}

// ---------------------------------------------------------------------------
// ObserverLocator
// ---------------------------------------------------------------------------

pub struct ObserverLocator {
    lifecycle: Rc<Lifecycle>,
    dirty_checker: Rc<DirtyChecker>,
    collection_observation: bool,
    adapters: RefCell<Vec<Rc<dyn ObserverAdapter>>>,
    self_ref: Weak<Self>,
}

impl ObserverLocator {
    #[must_use]
    pub fn new(
        lifecycle: Rc<Lifecycle>,
        dirty_checker: Rc<DirtyChecker>,
        collection_observation: bool,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            lifecycle,
            dirty_checker,
            collection_observation,
            adapters: RefCell::new(Vec::new()),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Rc<Lifecycle> {
        &self.lifecycle
    }

    #[must_use]
    pub fn dirty_checker(&self) -> &Rc<DirtyChecker> {
        &self.dirty_checker
    }

    pub fn add_adapter(&self, adapter: Rc<dyn ObserverAdapter>) {
        self.adapters.borrow_mut().push(adapter);
    }

    /// The observer for `key` on `target`, created on first request.
    pub fn get_observer(&self, target: &Value, key: &str) -> Result<Rc<dyn PropertyObserver>, EvalError> {
        match target {
            Value::Object(o) => {
                if let Some(existing) = cached(o.cached_observer(key)) {
                    return Ok(existing);
                }
                let created = self.create_object_observer(o, key)?;
                Ok(cached(Some(o.cache_observer(key, entry(Rc::clone(&created))))).unwrap_or(created))
            }
            Value::Node(n) => Ok(self.node_observer(n, key)),
            Value::Array(_) | Value::Map(_) | Value::Set(_) => Ok(self.collection_property_observer(target, key)),
            primitive => Ok(Rc::new(PrimitiveObserver::new(primitive.clone(), key))),
        }
    }

    /// A write path for `key` on `target`. Reuses a cached observer when one
    /// exists.
    pub fn get_accessor(&self, target: &Value, key: &str) -> Result<Rc<dyn PropertyObserver>, EvalError> {
        match target {
            Value::Object(o) => Ok(cached(o.cached_observer(key))
                .unwrap_or_else(|| Rc::new(PropertyAccessor::new(o, key)) as Rc<dyn PropertyObserver>)),
            _ => self.get_observer(target, key),
        }
    }

    fn create_object_observer(&self, object: &ObjectRef, key: &str) -> Result<Rc<dyn PropertyObserver>, EvalError> {
        if object.kind() == ObjectKind::BindingContext {
            return Ok(SetterObserver::eager(object, key));
        }
        let adapters = self.adapters.borrow().clone();
        if let Some(observer) = adapters.iter().find_map(|a| a.observer_for(object, key)) {
            return Ok(observer);
        }
        let Some(accessor) = object.accessor(key) else {
            return Ok(SetterObserver::lazy(object, key));
        };
        if !accessor.configurable {
            return self.dirty_check(object, key);
        }
        if accessor.overrides.is_static {
            return match accessor.setter {
                Some(_) => Ok(SetterObserver::custom(object, key)),
                None => self.dirty_check(object, key),
            };
        }
        Ok(GetterObserver::new(
            object,
            key,
            accessor.overrides.volatile,
            self.self_ref.clone(),
        ))
    }

    fn dirty_check(&self, object: &ObjectRef, key: &str) -> Result<Rc<dyn PropertyObserver>, EvalError> {
        let property: Rc<dyn PropertyObserver> = self.dirty_checker.create_property(object, key)?;
        Ok(property)
    }

    fn node_observer(&self, node: &Node, key: &str) -> Rc<dyn PropertyObserver> {
        if let Some(existing) = cached(node.cached_observer(key)) {
            return existing;
        }
        let created = element::create(node, key, &self.lifecycle);
        cached(Some(node.cache_observer(key, entry(Rc::clone(&created))))).unwrap_or(created)
    }

    fn collection_property_observer(&self, target: &Value, key: &str) -> Rc<dyn PropertyObserver> {
        let is_length = match target {
            Value::Array(_) => key == "length",
            _ => key == "size",
        };
        if is_length {
            if let Some(observer) = self.get_collection_observer(target) {
                return observer.length_observer();
            }
        }
        Rc::new(PrimitiveObserver::new(target.clone(), key))
    }

    /// The batched observer for an array, map or set.
    #[must_use]
    pub fn get_collection_observer(&self, collection: &Value) -> Option<Rc<CollectionObserver>> {
        let existing = match collection {
            Value::Array(a) => a.cached_observer(collection::OBSERVER_KEY),
            Value::Map(m) => m.cached_observer(collection::OBSERVER_KEY),
            Value::Set(s) => s.cached_observer(collection::OBSERVER_KEY),
            _ => return None,
        };
        if let Some(observer) = existing.and_then(|e| e.downcast::<CollectionObserver>().ok()) {
            return Some(observer);
        }
        let created = CollectionObserver::new(collection, &self.lifecycle, self.collection_observation)?;
        let stored = match collection {
            Value::Array(a) => a.cache_observer(collection::OBSERVER_KEY, created.clone()),
            Value::Map(m) => m.cache_observer(collection::OBSERVER_KEY, created.clone()),
            Value::Set(s) => s.cache_observer(collection::OBSERVER_KEY, created.clone()),
            _ => return None,
        };
        stored.downcast::<CollectionObserver>().ok()
    }

    #[must_use]
    pub fn get_array_observer(&self, array: &ArrayRef) -> Option<Rc<CollectionObserver>> {
        self.get_collection_observer(&Value::Array(array.clone()))
    }

    #[must_use]
    pub fn get_map_observer(&self, map: &MapRef) -> Option<Rc<CollectionObserver>> {
        self.get_collection_observer(&Value::Map(map.clone()))
    }

    #[must_use]
    pub fn get_set_observer(&self, set: &SetRef) -> Option<Rc<CollectionObserver>> {
        self.get_collection_observer(&Value::Set(set.clone()))
    }
}

impl fmt::Debug for ObserverLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverLocator")
            .field("collection_observation", &self.collection_observation)
            .field("adapters", &self.adapters.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirtyCheckSettings;
    use crate::scheduler::Scheduler;
    use trellis_core::{Accessor, ArrayRef, ComputedOverrides};

    fn locator() -> Rc<ObserverLocator> {
        let scheduler = Rc::new(Scheduler::manual());
        let lifecycle = Lifecycle::new(Rc::clone(&scheduler));
        let dirty = DirtyChecker::new(scheduler, DirtyCheckSettings::default());
        ObserverLocator::new(lifecycle, dirty, true)
    }

    fn kind_of(loc: &ObserverLocator, target: &Value, key: &str) -> ObserverKind {
        loc.get_observer(target, key).expect("observer").kind()
    }

    #[test]
    fn observer_is_idempotent_per_pair() {
        let loc = locator();
        let obj = Value::Object(ObjectRef::from_pairs([("a", 1)]));
        let first = loc.get_observer(&obj, "a").expect("observer");
        let second = loc.get_observer(&obj, "a").expect("observer");
        assert!(std::ptr::addr_eq(Rc::as_ptr(&first), Rc::as_ptr(&second)));
        let other = loc.get_observer(&obj, "b").expect("observer");
        assert!(!std::ptr::addr_eq(Rc::as_ptr(&first), Rc::as_ptr(&other)));
    }

    #[test]
    fn dispatch_order() {
        let loc = locator();
        let bc = Value::Object(ObjectRef::binding_context());
        assert_eq!(kind_of(&loc, &bc, "x"), ObserverKind::Setter);

        let obj = ObjectRef::new();
        obj.define_accessor("computed", Accessor::getter(|_| Value::from(1)));
        obj.define_accessor(
            "frozen",
            Accessor::getter(|_| Value::from(1)).non_configurable(),
        );
        obj.define_accessor(
            "custom",
            Accessor::new(|o| o.get("raw"), |o, v| o.set("raw", v)).with_overrides(ComputedOverrides {
                is_static: true,
                volatile: false,
            }),
        );
        let obj = Value::Object(obj);
        assert_eq!(kind_of(&loc, &obj, "computed"), ObserverKind::Getter);
        assert_eq!(kind_of(&loc, &obj, "frozen"), ObserverKind::DirtyCheck);
        assert_eq!(kind_of(&loc, &obj, "custom"), ObserverKind::CustomSetter);
        assert_eq!(kind_of(&loc, &obj, "plain"), ObserverKind::Setter);

        let arr = Value::Array(ArrayRef::new());
        assert_eq!(kind_of(&loc, &arr, "length"), ObserverKind::CollectionLength);
        assert_eq!(kind_of(&loc, &Value::from(3), "x"), ObserverKind::Primitive);

        let input = Value::Node(Node::element("input"));
        assert_eq!(kind_of(&loc, &input, "value"), ObserverKind::ValueAttribute);
        assert_eq!(kind_of(&loc, &input, "checked"), ObserverKind::Checked);
        assert_eq!(kind_of(&loc, &input, "class"), ObserverKind::ClassAttribute);
        assert_eq!(kind_of(&loc, &input, "style"), ObserverKind::StyleAttribute);
        assert_eq!(kind_of(&loc, &input, "data-id"), ObserverKind::DataAttribute);
        assert_eq!(kind_of(&loc, &input, "textContent"), ObserverKind::ElementProperty);
    }

    #[test]
    fn adapter_claims_before_accessor_strategies() {
        struct Fixed;
        impl ObserverAdapter for Fixed {
            fn observer_for(&self, _: &ObjectRef, key: &str) -> Option<Rc<dyn PropertyObserver>> {
                (key == "special").then(|| Rc::new(PrimitiveObserver::new(Value::Null, key)) as Rc<dyn PropertyObserver>)
            }
        }
        let loc = locator();
        loc.add_adapter(Rc::new(Fixed));
        let obj = Value::Object(ObjectRef::new());
        assert_eq!(kind_of(&loc, &obj, "special"), ObserverKind::Primitive);
        assert_eq!(kind_of(&loc, &obj, "other"), ObserverKind::Setter);
    }

    #[test]
    fn throw_on_use_surfaces_through_locator() {
        let scheduler = Rc::new(Scheduler::manual());
        let lifecycle = Lifecycle::new(Rc::clone(&scheduler));
        let settings = DirtyCheckSettings {
            throw_on_use: true,
            ..DirtyCheckSettings::default()
        };
        let loc = ObserverLocator::new(lifecycle, DirtyChecker::new(scheduler, settings), true);
        let obj = ObjectRef::new();
        obj.define_accessor("x", Accessor::getter(|_| Value::Null).non_configurable());
        let err = loc.get_observer(&Value::Object(obj), "x").err().map(|e| e.code());
        assert_eq!(err, Some("TRL-209"));
    }

    #[test]
    fn accessor_reuses_cached_observer() {
        let loc = locator();
        let obj = Value::Object(ObjectRef::new());
        assert_eq!(loc.get_accessor(&obj, "a").expect("accessor").kind(), ObserverKind::PropertyAccessor);
        let observer = loc.get_observer(&obj, "a").expect("observer");
        let accessor = loc.get_accessor(&obj, "a").expect("accessor");
        assert!(std::ptr::addr_eq(Rc::as_ptr(&observer), Rc::as_ptr(&accessor)));
    }
}
