#![forbid(unsafe_code)]

//! Observable array.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use super::sort::{default_compare, sort_tracked};
use super::{CollectionSink, CollectionState, collection_observation};
use crate::tracking;
use crate::value::Value;

pub(super) struct ArrayInner {
    items: RefCell<Vec<Value>>,
    state: CollectionState,
}

impl ArrayInner {
    fn items_len(&self) -> usize {
        self.items.borrow().len()
    }
}

/// A shared, observable list of values.
///
/// The mutators mirror the host-language array methods (`push`, `pop`,
/// `shift`, `unshift`, `splice`, `reverse`, `sort`). Index assignment goes
/// through [`ArrayRef::set`] and is recorded as a one-slot replacement.
#[derive(Clone)]
pub struct ArrayRef(Rc<ArrayInner>);

/// A non-owning handle to an [`ArrayRef`].
#[derive(Clone)]
pub struct WeakArrayRef(Weak<ArrayInner>);

impl WeakArrayRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ArrayRef> {
        self.0.upgrade().map(ArrayRef)
    }
}

impl ArrayRef {
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    #[must_use]
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayInner {
            items: RefCell::new(items),
            state: CollectionState::default(),
        }))
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakArrayRef {
        WeakArrayRef(Rc::downgrade(&self.0))
    }

    collection_observation!();

    fn read(&self) {
        tracking::record_collection(&Value::Array(self.clone()));
    }

    // -- reads ---------------------------------------------------------------

    #[must_use]
    pub fn len(&self) -> usize {
        self.read();
        self.0.items_len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `undefined` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.read();
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Snapshot of the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.read();
        self.0.items.borrow().clone()
    }

    /// First index of a strictly-equal element.
    #[must_use]
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.read();
        self.0.items.borrow().iter().position(|v| v.strict_eq(needle))
    }

    // -- mutators ------------------------------------------------------------

    fn notify(sink: Option<Rc<dyn CollectionSink>>) {
        if let Some(sink) = sink {
            sink.collection_changed();
        }
    }

    /// Append one element; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.extend(std::iter::once(value.into()))
    }

    /// Append elements; returns the new length.
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let (len, count) = {
            let mut items = self.0.items.borrow_mut();
            let before = items.len();
            items.extend(values);
            (items.len(), items.len() - before)
        };
        if count > 0 {
            Self::notify(self.0.state.record(|m| m.push_new(count)));
        }
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        let popped = self.0.items.borrow_mut().pop();
        match popped {
            Some(item) => {
                let index = self.0.items_len();
                Self::notify(self.0.state.record(|m| m.remove(index, item.clone())));
                item
            }
            None => Value::Undefined,
        }
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        let shifted = {
            let mut items = self.0.items.borrow_mut();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        match shifted {
            Some(item) => {
                Self::notify(self.0.state.record(|m| m.remove(0, item.clone())));
                item
            }
            None => Value::Undefined,
        }
    }

    /// Prepend elements (keeping their order); returns the new length.
    pub fn unshift(&self, values: Vec<Value>) -> usize {
        let count = values.len();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.splice(0..0, values);
            items.len()
        };
        if count > 0 {
            Self::notify(self.0.state.record(|m| m.unshift_new(count)));
        }
        len
    }

    /// Remove `delete_count` elements at `start` (negative counts from the
    /// end; `None` removes to the end) and insert `insert` in their place.
    /// Returns the removed elements.
    pub fn splice(&self, start: isize, delete_count: Option<usize>, insert: Vec<Value>) -> Vec<Value> {
        let inserted = insert.len();
        let (start, removed) = {
            let mut items = self.0.items.borrow_mut();
            let len = items.len();
            let start = if start < 0 {
                len.saturating_sub(start.unsigned_abs())
            } else {
                start.unsigned_abs().min(len)
            };
            let end = delete_count.map_or(len, |n| start.saturating_add(n).min(len));
            let removed: Vec<Value> = items.splice(start..end, insert).collect();
            (start, removed)
        };
        if !removed.is_empty() || inserted > 0 {
            let for_map = removed.clone();
            Self::notify(self.0.state.record(|m| m.splice(start, for_map, inserted)));
        }
        removed
    }

    /// Replace the element at `index`; writing past the end appends.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let len = self.0.items_len();
        if index >= len {
            let padding = index - len;
            let mut fill: Vec<Value> = vec![Value::Undefined; padding];
            fill.push(value);
            self.extend(fill);
            return;
        }
        let old = std::mem::replace(&mut self.0.items.borrow_mut()[index], value.clone());
        if !old.strict_eq(&value) {
            Self::notify(self.0.state.record(|m| m.replace(index, old)));
        }
    }

    /// Remove every element.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.0.items.borrow_mut());
        if !removed.is_empty() {
            Self::notify(self.0.state.record(|m| m.clear(removed)));
        }
    }

    pub fn reverse(&self) {
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.reverse();
            items.len()
        };
        if len > 1 {
            Self::notify(self.0.state.record(|m| m.reverse()));
        }
    }

    /// Sort with the default ordering (display strings, `undefined` last).
    pub fn sort(&self) {
        self.sort_by(default_compare);
    }

    /// Sort with a custom comparator.
    pub fn sort_by(&self, compare: impl Fn(&Value, &Value) -> Ordering) {
        if self.0.items_len() < 2 {
            return;
        }
        let mut items = std::mem::take(&mut *self.0.items.borrow_mut());
        let sink = if self.0.state.is_tracked() {
            let mut sink = None;
            let mut indices: Option<Vec<i32>> = None;
            let _ = self.0.state.record(|m| indices = Some(m.entries_mut().clone()));
            if let Some(mut idx) = indices {
                sort_tracked(&mut items, Some(&mut idx), &compare);
                sink = self.0.state.record(|m| *m.entries_mut() = idx);
            }
            sink
        } else {
            sort_tracked(&mut items, None, &compare);
            None
        };
        *self.0.items.borrow_mut() = items;
        Self::notify(sink);
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for ArrayRef {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.items.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_map::NEW_ITEM;
    use std::cell::Cell;

    struct Pings(Cell<u32>);

    impl CollectionSink for Pings {
        fn collection_changed(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn tracked(values: &[i32]) -> (ArrayRef, Rc<Pings>) {
        let arr: ArrayRef = values.iter().map(|&v| Value::from(v)).collect();
        let pings = Rc::new(Pings(Cell::new(0)));
        let sink: Rc<dyn CollectionSink> = pings.clone();
        arr.start_tracking(Rc::downgrade(&sink));
        (arr, pings)
    }

    #[test]
    fn untracked_mutation_has_no_index_map() {
        let arr = ArrayRef::from_vec(vec![Value::from(1)]);
        arr.push(2);
        assert!(arr.peek_index_map().is_none());
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn push_pop_shift_unshift() {
        let (arr, pings) = tracked(&[1, 2, 3]);
        arr.push(4);
        assert_eq!(arr.pop(), Value::from(4));
        assert_eq!(arr.shift(), Value::from(1));
        arr.unshift(vec![Value::from(0)]);
        assert_eq!(pings.0.get(), 4);
        let map = arr.take_index_map().expect("tracked");
        assert_eq!(map.entries(), &[NEW_ITEM, 1, 2]);
        assert_eq!(map.deleted_items(), &[Value::from(1)]);
        assert_eq!(arr.peek_index_map().expect("tracked").entries(), &[0, 1, 2]);
    }

    #[test]
    fn pop_on_empty_does_not_ping() {
        let (arr, pings) = tracked(&[]);
        assert_eq!(arr.pop(), Value::Undefined);
        assert_eq!(arr.shift(), Value::Undefined);
        assert_eq!(pings.0.get(), 0);
    }

    #[test]
    fn splice_negative_start() {
        let (arr, _) = tracked(&[1, 2, 3, 4]);
        let removed = arr.splice(-2, Some(1), vec![Value::from(9), Value::from(8)]);
        assert_eq!(removed, vec![Value::from(3)]);
        assert_eq!(arr.to_vec(), vec![Value::from(1), Value::from(2), Value::from(9), Value::from(8), Value::from(4)]);
        let map = arr.take_index_map().expect("tracked");
        assert_eq!(map.entries(), &[0, 1, NEW_ITEM, NEW_ITEM, 3]);
        assert_eq!(map.deleted_indices(), &[2]);
    }

    #[test]
    fn splice_without_count_removes_tail() {
        let arr = ArrayRef::from_vec(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let removed = arr.splice(1, None, Vec::new());
        assert_eq!(removed.len(), 2);
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn reverse_and_sort_track_permutation() {
        let (arr, _) = tracked(&[3, 1, 2]);
        arr.reverse();
        assert_eq!(arr.peek_index_map().expect("tracked").entries(), &[2, 1, 0]);
        arr.sort();
        assert_eq!(arr.to_vec(), vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(arr.take_index_map().expect("tracked").entries(), &[1, 2, 0]);
    }

    #[test]
    fn set_index_replaces_slot() {
        let (arr, pings) = tracked(&[1, 2]);
        arr.set(1, 5);
        arr.set(1, 5);
        assert_eq!(pings.0.get(), 1);
        let map = arr.take_index_map().expect("tracked");
        assert_eq!(map.entries(), &[0, NEW_ITEM]);
        assert_eq!(map.deleted_items(), &[Value::from(2)]);
    }

    #[test]
    fn set_past_end_pads_with_undefined() {
        let arr = ArrayRef::new();
        arr.set(2, "x");
        assert_eq!(arr.to_vec(), vec![Value::Undefined, Value::Undefined, Value::from("x")]);
    }

    #[test]
    fn clear_records_everything_deleted() {
        let (arr, _) = tracked(&[1, 2]);
        arr.clear();
        let map = arr.take_index_map().expect("tracked");
        assert!(map.is_empty());
        assert_eq!(map.deleted_indices(), &[0, 1]);
    }

    #[test]
    fn stop_tracking_returns_to_fast_path() {
        let (arr, pings) = tracked(&[1]);
        arr.stop_tracking();
        arr.push(2);
        assert_eq!(pings.0.get(), 0);
        assert!(!arr.is_tracked());
    }
}
