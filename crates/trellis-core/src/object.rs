#![forbid(unsafe_code)]

//! Shared property bags.
//!
//! An [`ObjectRef`] is the data model a binding reads from and writes to.
//! Properties are either plain data slots or [`Accessor`] pairs. Two hidden
//! side tables make observation possible without the consumer opting in:
//!
//! - the **interceptor** table: an observer installs a
//!   [`PropertyInterceptor`] for a key, and every [`ObjectRef::set`] on that
//!   key reports `(new, old)` to it;
//! - the **observer cache**: one type-erased observer per key, so the
//!   observer locator hands out the same observer for the same
//!   (object, key) pair.
//!
//! # Invariants
//!
//! 1. Property iteration order is insertion order.
//! 2. No `RefCell` borrow is held while getters, setters or interceptors run,
//!    so they may freely read and write the same object.
//! 3. Every read through [`ObjectRef::get`] is reported to the active
//!    dependency tracker.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::tracking;
use crate::value::Value;

/// Getter closure; receives the owning object.
pub type Getter = Rc<dyn Fn(&ObjectRef) -> Value>;
/// Setter closure; receives the owning object and the new value.
pub type Setter = Rc<dyn Fn(&ObjectRef, Value)>;

/// Hints for how a computed property may be observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputedOverrides {
    /// The getter result changes only through its own setter.
    pub is_static: bool,
    /// Notify on every dependency change, even when the result is unchanged.
    pub volatile: bool,
}

/// A getter/setter property descriptor.
#[derive(Clone)]
pub struct Accessor {
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
    pub configurable: bool,
    pub overrides: ComputedOverrides,
}

impl Accessor {
    /// A configurable getter-only accessor.
    pub fn getter(get: impl Fn(&ObjectRef) -> Value + 'static) -> Self {
        Self {
            getter: Some(Rc::new(get)),
            setter: None,
            configurable: true,
            overrides: ComputedOverrides::default(),
        }
    }

    /// A configurable getter/setter accessor.
    pub fn new(
        get: impl Fn(&ObjectRef) -> Value + 'static,
        set: impl Fn(&ObjectRef, Value) + 'static,
    ) -> Self {
        Self {
            getter: Some(Rc::new(get)),
            setter: Some(Rc::new(set)),
            configurable: true,
            overrides: ComputedOverrides::default(),
        }
    }

    #[must_use]
    pub fn non_configurable(mut self) -> Self {
        self.configurable = false;
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: ComputedOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("get", &self.getter.is_some())
            .field("set", &self.setter.is_some())
            .field("configurable", &self.configurable)
            .field("overrides", &self.overrides)
            .finish()
    }
}

#[derive(Clone)]
enum Property {
    Data(Value),
    Accessor(Accessor),
}

/// Receives writes to one intercepted property.
pub trait PropertyInterceptor {
    fn intercept(&self, new_value: &Value, old_value: &Value);
}

/// What kind of object this is, for observer dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObjectKind {
    #[default]
    Plain,
    /// A synthetic context object (override context, repeat item scope).
    BindingContext,
}

struct ObjectInner {
    kind: ObjectKind,
    class_name: Option<Rc<str>>,
    keys: RefCell<Vec<Rc<str>>>,
    props: RefCell<FxHashMap<Rc<str>, Property>>,
    interceptors: RefCell<FxHashMap<Rc<str>, Rc<dyn PropertyInterceptor>>>,
    observers: RefCell<FxHashMap<Rc<str>, Rc<dyn Any>>>,
}

/// A shared, observable property bag.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectInner>);

/// A non-owning handle to an [`ObjectRef`].
#[derive(Clone)]
pub struct WeakObjectRef(Weak<ObjectInner>);

impl WeakObjectRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObjectRef")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

impl ObjectRef {
    /// Create an empty plain object.
    #[must_use]
    pub fn new() -> Self {
        Self::with_kind(ObjectKind::Plain, None)
    }

    /// Create an empty binding-context object.
    #[must_use]
    pub fn binding_context() -> Self {
        Self::with_kind(ObjectKind::BindingContext, None)
    }

    /// Create an empty object carrying a class name (for `instanceof`).
    #[must_use]
    pub fn with_class(class_name: &str) -> Self {
        Self::with_kind(ObjectKind::Plain, Some(Rc::from(class_name)))
    }

    fn with_kind(kind: ObjectKind, class_name: Option<Rc<str>>) -> Self {
        Self(Rc::new(ObjectInner {
            kind,
            class_name,
            keys: RefCell::new(Vec::new()),
            props: RefCell::new(FxHashMap::default()),
            interceptors: RefCell::new(FxHashMap::default()),
            observers: RefCell::new(FxHashMap::default()),
        }))
    }

    /// Create a plain object from key/value pairs.
    pub fn from_pairs<K: AsRef<str>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let obj = Self::new();
        for (k, v) in pairs {
            obj.insert_raw(k.as_ref(), v.into());
        }
        obj
    }

    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.0.kind
    }

    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        self.0.class_name.as_deref()
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity for the lifetime of the object.
    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Whether the key exists (own property, data or accessor).
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Own keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.0.keys.borrow().clone()
    }

    /// Read a property; missing keys read as `undefined`.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        tracking::record_property(self, key);
        self.get_untracked(key)
    }

    /// Read a property without reporting it to the dependency tracker.
    #[must_use]
    pub fn get_untracked(&self, key: &str) -> Value {
        let prop = self.0.props.borrow().get(key).cloned();
        match prop {
            Some(Property::Data(v)) => v,
            Some(Property::Accessor(acc)) => acc.getter.map_or(Value::Undefined, |g| g(self)),
            None => Value::Undefined,
        }
    }

    /// Write a property, invoking accessor setters and interceptors.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let interceptor = self.0.interceptors.borrow().get(key).cloned();
        let existing = self.0.props.borrow().get(key).cloned();
        match existing {
            Some(Property::Accessor(acc)) => {
                let old = match (&interceptor, &acc.getter) {
                    (Some(_), Some(g)) => g(self),
                    _ => Value::Undefined,
                };
                if let Some(setter) = acc.setter {
                    setter(self, value);
                }
                if let Some(i) = interceptor {
                    let new = self.get_untracked(key);
                    i.intercept(&new, &old);
                }
            }
            Some(Property::Data(old)) => {
                if let Some(Property::Data(slot)) = self.0.props.borrow_mut().get_mut(key) {
                    *slot = value.clone();
                }
                if let Some(i) = interceptor {
                    i.intercept(&value, &old);
                }
            }
            None => {
                self.insert_raw(key, value.clone());
                if let Some(i) = interceptor {
                    i.intercept(&value, &Value::Undefined);
                }
            }
        }
    }

    fn insert_raw(&self, key: &str, value: Value) {
        let key: Rc<str> = Rc::from(key);
        let previous = self
            .0
            .props
            .borrow_mut()
            .insert(Rc::clone(&key), Property::Data(value));
        if previous.is_none() {
            self.0.keys.borrow_mut().push(key);
        }
    }

    /// Remove a property. Interceptors see the transition to `undefined`.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.0.props.borrow_mut().remove(key);
        let Some(prop) = removed else {
            return false;
        };
        self.0.keys.borrow_mut().retain(|k| &**k != key);
        let interceptor = self.0.interceptors.borrow().get(key).cloned();
        if let (Some(i), Property::Data(old)) = (interceptor, prop) {
            i.intercept(&Value::Undefined, &old);
        }
        true
    }

    /// Define (or replace) an accessor property.
    pub fn define_accessor(&self, key: &str, accessor: Accessor) {
        let key: Rc<str> = Rc::from(key);
        let previous = self
            .0
            .props
            .borrow_mut()
            .insert(Rc::clone(&key), Property::Accessor(accessor));
        if previous.is_none() {
            self.0.keys.borrow_mut().push(key);
        }
    }

    /// The accessor descriptor for `key`, if it is an accessor property.
    #[must_use]
    pub fn accessor(&self, key: &str) -> Option<Accessor> {
        match self.0.props.borrow().get(key) {
            Some(Property::Accessor(acc)) => Some(acc.clone()),
            _ => None,
        }
    }

    // -- interception ------------------------------------------------------

    /// Install the interceptor for `key`, replacing any previous one.
    pub fn install_interceptor(&self, key: &str, interceptor: Rc<dyn PropertyInterceptor>) {
        self.0
            .interceptors
            .borrow_mut()
            .insert(Rc::from(key), interceptor);
    }

    pub fn remove_interceptor(&self, key: &str) {
        self.0.interceptors.borrow_mut().remove(key);
    }

    #[must_use]
    pub fn is_intercepted(&self, key: &str) -> bool {
        self.0.interceptors.borrow().contains_key(key)
    }

    // -- observer cache ----------------------------------------------------

    /// Cached observer for `key`, if any.
    #[must_use]
    pub fn cached_observer(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.0.observers.borrow().get(key).cloned()
    }

    /// Cache an observer for `key`. The first cached observer wins; the
    /// winner is returned.
    pub fn cache_observer(&self, key: &str, observer: Rc<dyn Any>) -> Rc<dyn Any> {
        Rc::clone(
            self.0
                .observers
                .borrow_mut()
                .entry(Rc::from(key))
                .or_insert(observer),
        )
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.0.observers.borrow().len()
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for key in self.0.keys.borrow().iter() {
            match self.0.props.borrow().get(key) {
                Some(Property::Data(v)) => {
                    map.entry(&key, v);
                }
                Some(Property::Accessor(_)) => {
                    map.entry(&key, &"[accessor]");
                }
                None => {}
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Recorder(RefCell<Vec<(Value, Value)>>);

    impl PropertyInterceptor for Recorder {
        fn intercept(&self, new_value: &Value, old_value: &Value) {
            self.0.borrow_mut().push((new_value.clone(), old_value.clone()));
        }
    }

    #[test]
    fn get_set_roundtrip() {
        let obj = ObjectRef::from_pairs([("a", 1)]);
        assert_eq!(obj.get("a"), Value::from(1));
        assert_eq!(obj.get("missing"), Value::Undefined);
        obj.set("b", "x");
        assert_eq!(obj.keys().len(), 2);
        assert_eq!(obj.get("b"), Value::str("x"));
    }

    #[test]
    fn keys_keep_insertion_order() {
        let obj = ObjectRef::from_pairs([("z", 1), ("a", 2), ("m", 3)]);
        let keys: Vec<String> = obj.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn interceptor_sees_new_and_old() {
        let obj = ObjectRef::from_pairs([("a", 1)]);
        let rec = Rc::new(Recorder(RefCell::new(Vec::new())));
        obj.install_interceptor("a", rec.clone());
        obj.set("a", 2);
        obj.set("a", 3);
        let log = rec.0.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], (Value::from(2), Value::from(1)));
        assert_eq!(log[1], (Value::from(3), Value::from(2)));
    }

    #[test]
    fn interceptor_on_new_key_reports_undefined_old() {
        let obj = ObjectRef::new();
        let rec = Rc::new(Recorder(RefCell::new(Vec::new())));
        obj.install_interceptor("k", rec.clone());
        obj.set("k", 5);
        assert_eq!(rec.0.borrow()[0], (Value::from(5), Value::Undefined));
    }

    #[test]
    fn accessor_getter_and_setter() {
        let obj = ObjectRef::from_pairs([("_v", 10)]);
        obj.define_accessor(
            "v",
            Accessor::new(|o| o.get("_v"), |o, val| o.set("_v", val)),
        );
        assert_eq!(obj.get("v"), Value::from(10));
        obj.set("v", 11);
        assert_eq!(obj.get("_v"), Value::from(11));
        assert!(obj.accessor("v").is_some());
        assert!(obj.accessor("_v").is_none());
    }

    #[test]
    fn setter_may_reenter_object() {
        let obj = ObjectRef::new();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        obj.define_accessor(
            "x",
            Accessor::new(
                |o| o.get("_x"),
                move |o, v| {
                    c.set(c.get() + 1);
                    o.set("_x", v);
                    o.set("touched", true);
                },
            ),
        );
        obj.set("x", 1);
        assert_eq!(calls.get(), 1);
        assert_eq!(obj.get("touched"), Value::Bool(true));
    }

    #[test]
    fn observer_cache_first_wins() {
        let obj = ObjectRef::new();
        let first: Rc<dyn Any> = Rc::new(1u8);
        let second: Rc<dyn Any> = Rc::new(2u8);
        let won = obj.cache_observer("a", Rc::clone(&first));
        assert!(Rc::ptr_eq(&won, &first));
        let won = obj.cache_observer("a", second);
        assert!(Rc::ptr_eq(&won, &first));
        assert_eq!(obj.observer_count(), 1);
    }

    #[test]
    fn delete_reports_undefined() {
        let obj = ObjectRef::from_pairs([("a", 1)]);
        let rec = Rc::new(Recorder(RefCell::new(Vec::new())));
        obj.install_interceptor("a", rec.clone());
        assert!(obj.delete("a"));
        assert!(!obj.has("a"));
        assert_eq!(rec.0.borrow()[0], (Value::Undefined, Value::from(1)));
        assert!(!obj.delete("a"));
    }

    #[test]
    fn weak_handle_upgrades_while_alive() {
        let obj = ObjectRef::new();
        let weak = obj.downgrade();
        assert!(weak.upgrade().is_some());
        drop(obj);
        assert!(weak.upgrade().is_none());
    }
}
