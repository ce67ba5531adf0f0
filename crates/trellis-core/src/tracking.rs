#![forbid(unsafe_code)]

//! Explicit dependency recording.
//!
//! A computed property is observed by evaluating its getter while a
//! [`DependencyCollector`] is active. Every [`ObjectRef::get`] and every
//! collection read performed during that pass is reported to the innermost
//! collector, which then subscribes to exactly those dependencies.
//!
//! Collectors nest: an inner tracked pass hides reads from the outer one.
//! [`untracked`] suspends recording entirely.
//!
//! # Invariants
//!
//! 1. Only the innermost collector receives a read.
//! 2. The tracker stack is restored when a guard drops, including on panic.

use std::cell::RefCell;
use std::rc::Rc;

use crate::object::ObjectRef;
use crate::value::Value;

/// Receives reads performed during a tracked evaluation pass.
pub trait DependencyCollector {
    /// A property of `object` named `key` was read.
    fn record_property(&self, object: &ObjectRef, key: &str);
    /// A collection (array, map or set) was read.
    fn record_collection(&self, collection: &Value);
}

thread_local! {
    static TRACKERS: RefCell<Vec<Option<Rc<dyn DependencyCollector>>>> =
        const { RefCell::new(Vec::new()) };
}

/// RAII guard restoring the tracker stack.
struct TrackerGuard;

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        TRACKERS.with(|t| {
            t.borrow_mut().pop();
        });
    }
}

fn push(entry: Option<Rc<dyn DependencyCollector>>) -> TrackerGuard {
    TRACKERS.with(|t| t.borrow_mut().push(entry));
    TrackerGuard
}

/// Run `f` with `collector` receiving every read.
pub fn track<R>(collector: Rc<dyn DependencyCollector>, f: impl FnOnce() -> R) -> R {
    let _guard = push(Some(collector));
    f()
}

/// Run `f` without recording reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = push(None);
    f()
}

/// Whether a collector is currently receiving reads.
#[must_use]
pub fn is_tracking() -> bool {
    TRACKERS.with(|t| matches!(t.borrow().last(), Some(Some(_))))
}

fn current() -> Option<Rc<dyn DependencyCollector>> {
    TRACKERS.with(|t| t.borrow().last().cloned().flatten())
}

/// Report a property read to the active collector.
pub fn record_property(object: &ObjectRef, key: &str) {
    if let Some(collector) = current() {
        // Reads performed by the collector itself are not dependencies.
        untracked(|| collector.record_property(object, key));
    }
}

/// Report a collection read to the active collector.
pub fn record_collection(collection: &Value) {
    if let Some(collector) = current() {
        untracked(|| collector.record_collection(collection));
    }
}
