#![forbid(unsafe_code)]

//! Observable collections.
//!
//! [`ArrayRef`], [`MapRef`] and [`SetRef`] own their mutators. While a
//! collection is observed (a [`CollectionSink`] is attached) every mutator
//! also maintains an [`IndexMap`] and pings the sink once per call; while it
//! is not observed the mutators do no bookkeeping at all. The sink decides
//! when subscribers hear about it (the runtime defers to the next flush).
//!
//! # Invariants
//!
//! 1. The index map is reset to identity when tracking starts and when the
//!    observer takes it.
//! 2. The sink is pinged only for calls that changed the collection.
//! 3. No borrow is held while the sink runs.

mod array;
mod map;
mod set;
mod sort;

pub use array::{ArrayRef, WeakArrayRef};
pub use map::{MapRef, WeakMapRef};
pub use set::{SetRef, WeakSetRef};
pub use sort::default_compare;

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::index_map::IndexMap;

/// Receives "this collection changed" pings from an observed collection.
pub trait CollectionSink {
    fn collection_changed(&self);
}

struct Tracking {
    index_map: IndexMap,
    sink: Weak<dyn CollectionSink>,
}

/// Bookkeeping shared by the three collection kinds.
#[derive(Default)]
struct CollectionState {
    tracking: RefCell<Option<Tracking>>,
    observers: RefCell<FxHashMap<Rc<str>, Rc<dyn Any>>>,
}

impl CollectionState {
    fn start(&self, len: usize, sink: Weak<dyn CollectionSink>) {
        tracing::trace!(len, "collection tracking started");
        *self.tracking.borrow_mut() = Some(Tracking {
            index_map: IndexMap::identity(len),
            sink,
        });
    }

    fn stop(&self) {
        tracing::trace!("collection tracking stopped");
        *self.tracking.borrow_mut() = None;
    }

    fn is_tracked(&self) -> bool {
        self.tracking.borrow().is_some()
    }

    fn take_index_map(&self, len: usize) -> Option<IndexMap> {
        self.tracking
            .borrow_mut()
            .as_mut()
            .map(|t| std::mem::replace(&mut t.index_map, IndexMap::identity(len)))
    }

    fn peek_index_map(&self) -> Option<IndexMap> {
        self.tracking.borrow().as_ref().map(|t| t.index_map.clone())
    }

    /// Run a bookkeeping step if tracked; returns the sink to ping.
    fn record(&self, f: impl FnOnce(&mut IndexMap)) -> Option<Rc<dyn CollectionSink>> {
        let mut tracking = self.tracking.borrow_mut();
        let t = tracking.as_mut()?;
        f(&mut t.index_map);
        t.sink.upgrade()
    }

    fn cached_observer(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.observers.borrow().get(key).cloned()
    }

    fn cache_observer(&self, key: &str, observer: Rc<dyn Any>) -> Rc<dyn Any> {
        Rc::clone(
            self.observers
                .borrow_mut()
                .entry(Rc::from(key))
                .or_insert(observer),
        )
    }
}

/// Generates the observation surface shared by every collection handle.
macro_rules! collection_observation {
    () => {
        /// Attach the observer sink and reset the index map to identity.
        pub fn start_tracking(&self, sink: std::rc::Weak<dyn $crate::collections::CollectionSink>) {
            let len = self.0.items_len();
            self.0.state.start(len, sink);
        }

        /// Detach the observer sink; mutators stop doing bookkeeping.
        pub fn stop_tracking(&self) {
            self.0.state.stop();
        }

        #[must_use]
        pub fn is_tracked(&self) -> bool {
            self.0.state.is_tracked()
        }

        /// Take the accumulated index map, resetting it to identity.
        pub fn take_index_map(&self) -> Option<$crate::index_map::IndexMap> {
            let len = self.0.items_len();
            self.0.state.take_index_map(len)
        }

        /// The accumulated index map without resetting it.
        #[must_use]
        pub fn peek_index_map(&self) -> Option<$crate::index_map::IndexMap> {
            self.0.state.peek_index_map()
        }

        /// Cached observer for `key` (`""` is the collection observer itself).
        #[must_use]
        pub fn cached_observer(&self, key: &str) -> Option<std::rc::Rc<dyn std::any::Any>> {
            self.0.state.cached_observer(key)
        }

        /// Cache an observer for `key`; the first one wins and is returned.
        pub fn cache_observer(
            &self,
            key: &str,
            observer: std::rc::Rc<dyn std::any::Any>,
        ) -> std::rc::Rc<dyn std::any::Any> {
            self.0.state.cache_observer(key, observer)
        }

        #[must_use]
        pub fn ptr_eq(&self, other: &Self) -> bool {
            std::rc::Rc::ptr_eq(&self.0, &other.0)
        }

        /// Stable identity for the lifetime of the collection.
        #[must_use]
        pub fn id(&self) -> usize {
            std::rc::Rc::as_ptr(&self.0) as usize
        }
    };
}

pub(crate) use collection_observation;
