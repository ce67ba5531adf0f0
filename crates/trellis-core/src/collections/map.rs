#![forbid(unsafe_code)]

//! Observable insertion-ordered map.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{CollectionState, collection_observation};
use crate::tracking;
use crate::value::Value;

pub(super) struct MapInner {
    entries: RefCell<Vec<(Value, Value)>>,
    state: CollectionState,
}

impl MapInner {
    fn items_len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|(k, _)| k.same_value_zero(key))
    }
}

/// A shared, observable map with `SameValueZero` keys.
///
/// Index-map slots follow insertion order. Overwriting an existing key
/// with a different value marks its slot new; deletions record the key.
#[derive(Clone)]
pub struct MapRef(Rc<MapInner>);

/// A non-owning handle to a [`MapRef`].
#[derive(Clone)]
pub struct WeakMapRef(Weak<MapInner>);

impl WeakMapRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<MapRef> {
        self.0.upgrade().map(MapRef)
    }
}

impl MapRef {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(MapInner {
            entries: RefCell::new(Vec::new()),
            state: CollectionState::default(),
        }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let map = Self::new();
        for (k, v) in entries {
            map.set(k, v);
        }
        map
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakMapRef {
        WeakMapRef(Rc::downgrade(&self.0))
    }

    collection_observation!();

    fn read(&self) {
        tracking::record_collection(&Value::Map(self.clone()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read();
        self.0.items_len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, key: &Value) -> Value {
        self.read();
        self.0
            .entries
            .borrow()
            .iter()
            .find(|(k, _)| k.same_value_zero(key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has(&self, key: &Value) -> bool {
        self.read();
        self.0.position(key).is_some()
    }

    /// Snapshot of `(key, value)` pairs in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.read();
        self.0.entries.borrow().clone()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// Insert or overwrite. Writing an identical value is a no-op.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let sink = match self.0.position(&key) {
            Some(index) => {
                let mut entries = self.0.entries.borrow_mut();
                if entries[index].1.strict_eq(&value) {
                    return;
                }
                entries[index].1 = value;
                drop(entries);
                self.0.state.record(|m| m.replace(index, key))
            }
            None => {
                self.0.entries.borrow_mut().push((key, value));
                self.0.state.record(|m| m.push_new(1))
            }
        };
        if let Some(sink) = sink {
            sink.collection_changed();
        }
    }

    /// Remove a key; returns whether it was present.
    pub fn delete(&self, key: &Value) -> bool {
        let Some(index) = self.0.position(key) else {
            return false;
        };
        let (removed_key, _) = self.0.entries.borrow_mut().remove(index);
        if let Some(sink) = self.0.state.record(|m| m.remove(index, removed_key)) {
            sink.collection_changed();
        }
        true
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.0.entries.borrow_mut());
        if removed.is_empty() {
            return;
        }
        let keys = removed.into_iter().map(|(k, _)| k).collect();
        if let Some(sink) = self.0.state.record(|m| m.clear(keys)) {
            sink.collection_changed();
        }
    }
}

impl Default for MapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.entries.borrow().iter().map(|(k, v)| (k, v)))
            .finish()
    }
}
