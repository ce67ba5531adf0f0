#![forbid(unsafe_code)]

//! Observable insertion-ordered set.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{CollectionState, collection_observation};
use crate::tracking;
use crate::value::Value;

pub(super) struct SetInner {
    items: RefCell<Vec<Value>>,
    state: CollectionState,
}

impl SetInner {
    fn items_len(&self) -> usize {
        self.items.borrow().len()
    }

    fn position(&self, value: &Value) -> Option<usize> {
        self.items.borrow().iter().position(|v| v.same_value_zero(value))
    }
}

/// A shared, observable set with `SameValueZero` membership.
#[derive(Clone)]
pub struct SetRef(Rc<SetInner>);

/// A non-owning handle to a [`SetRef`].
#[derive(Clone)]
pub struct WeakSetRef(Weak<SetInner>);

impl WeakSetRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<SetRef> {
        self.0.upgrade().map(SetRef)
    }
}

impl SetRef {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(SetInner {
            items: RefCell::new(Vec::new()),
            state: CollectionState::default(),
        }))
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakSetRef {
        WeakSetRef(Rc::downgrade(&self.0))
    }

    collection_observation!();

    fn read(&self) {
        tracking::record_collection(&Value::Set(self.clone()));
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
    pub fn has(&self, value: &Value) -> bool {
        self.read();
        self.0.position(value).is_some()
    }

    /// Snapshot of the members in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.read();
        self.0.items.borrow().clone()
    }

    /// Add a member; returns `false` if it was already present.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.0.position(&value).is_some() {
            return false;
        }
        self.0.items.borrow_mut().push(value);
        if let Some(sink) = self.0.state.record(|m| m.push_new(1)) {
            sink.collection_changed();
        }
        true
    }

    /// Remove a member; returns whether it was present.
    pub fn delete(&self, value: &Value) -> bool {
        let Some(index) = self.0.position(value) else {
            return false;
        };
        let removed = self.0.items.borrow_mut().remove(index);
        if let Some(sink) = self.0.state.record(|m| m.remove(index, removed)) {
            sink.collection_changed();
        }
        true
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.0.items.borrow_mut());
        if removed.is_empty() {
            return;
        }
        if let Some(sink) = self.0.state.record(|m| m.clear(removed)) {
            sink.collection_changed();
        }
    }
}

impl Default for SetRef {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for SetRef {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let set = Self::new();
        for v in iter {
            set.add(v);
        }
        set
    }
}

impl fmt::Debug for SetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.items.borrow().iter()).finish()
    }
}
