#![forbid(unsafe_code)]

//! Positional provenance for collection mutations.
//!
//! An [`IndexMap`] runs parallel to an observed collection. After any
//! sequence of mutations, `entries[i]` is the index the element now at
//! position `i` had when the map was last reset, or [`NEW_ITEM`] if the
//! element was inserted since. Elements that existed at reset time and were
//! removed are listed in `deleted_items` (with their original index in
//! `deleted_indices`).
//!
//! # Invariants
//!
//! For a map reset over a collection of length `n`:
//!
//! 1. The non-negative entries plus `deleted_indices` partition `0..n`.
//! 2. An element inserted and removed within the same batch appears in
//!    neither list.

use crate::value::Value;

/// Sentinel for "inserted since the last reset".
pub const NEW_ITEM: i32 = -2;

/// Provenance of each slot of an observed collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexMap {
    entries: Vec<i32>,
    deleted_items: Vec<Value>,
    deleted_indices: Vec<i32>,
}

impl IndexMap {
    /// The identity map for a collection of `len` elements.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        Self {
            entries: (0..len).map(|i| i32::try_from(i).unwrap_or(i32::MAX)).collect(),
            deleted_items: Vec::new(),
            deleted_indices: Vec::new(),
        }
    }

    /// A map in which every slot is new (wholesale replacement).
    #[must_use]
    pub fn all_new(len: usize) -> Self {
        Self {
            entries: vec![NEW_ITEM; len],
            deleted_items: Vec::new(),
            deleted_indices: Vec::new(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[i32] {
        &self.entries
    }

    #[must_use]
    pub fn deleted_items(&self) -> &[Value] {
        &self.deleted_items
    }

    #[must_use]
    pub fn deleted_indices(&self) -> &[i32] {
        &self.deleted_indices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether no slot moved, appeared or disappeared.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.deleted_indices.is_empty()
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(i, &e)| usize::try_from(e).is_ok_and(|e| e == i))
    }

    // -- bookkeeping used by the collection mutators -------------------------

    pub(crate) fn push_new(&mut self, count: usize) {
        self.entries.extend(std::iter::repeat_n(NEW_ITEM, count));
    }

    pub(crate) fn unshift_new(&mut self, count: usize) {
        self.entries
            .splice(0..0, std::iter::repeat_n(NEW_ITEM, count));
    }

    /// Remove the slot at `index`, recording `item` as deleted if the slot
    /// existed at reset time.
    pub(crate) fn remove(&mut self, index: usize, item: Value) {
        if index >= self.entries.len() {
            return;
        }
        let origin = self.entries.remove(index);
        self.record_deleted(origin, item);
    }

    /// Mark slot `index` as replaced by a new element.
    pub(crate) fn replace(&mut self, index: usize, old_item: Value) {
        if let Some(slot) = self.entries.get_mut(index) {
            let origin = std::mem::replace(slot, NEW_ITEM);
            self.record_deleted(origin, old_item);
        }
    }

    pub(crate) fn splice(&mut self, start: usize, removed: Vec<Value>, inserted: usize) {
        let end = (start + removed.len()).min(self.entries.len());
        let origins: Vec<i32> = self
            .entries
            .splice(start..end, std::iter::repeat_n(NEW_ITEM, inserted))
            .collect();
        for (origin, item) in origins.into_iter().zip(removed) {
            self.record_deleted(origin, item);
        }
    }

    pub(crate) fn reverse(&mut self) {
        self.entries.reverse();
    }

    pub(crate) fn clear(&mut self, items: Vec<Value>) {
        let origins = std::mem::take(&mut self.entries);
        for (origin, item) in origins.into_iter().zip(items) {
            self.record_deleted(origin, item);
        }
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<i32> {
        &mut self.entries
    }

    fn record_deleted(&mut self, origin: i32, item: Value) {
        if origin >= 0 {
            self.deleted_indices.push(origin);
            self.deleted_items.push(item);
        }
    }
}
