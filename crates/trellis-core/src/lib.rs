#![forbid(unsafe_code)]

//! Core data model for Trellis.
//!
//! This crate holds everything the binding engine observes:
//!
//! - [`Value`]: a cheap-to-clone dynamic value with host-language equality
//!   and operator semantics.
//! - [`ObjectRef`]: shared property bags with per-key interceptors and a
//!   hidden observer cache.
//! - [`ArrayRef`], [`MapRef`], [`SetRef`]: observable collections that
//!   record an [`IndexMap`] while observed.
//! - [`Publisher`]: the subscriber collection embedded in every observer.
//! - [`tracking`]: explicit dependency recording for computed properties.
//! - [`Promise`]: a single-threaded one-shot settle primitive.
//! - [`dom`]: a minimal in-memory host node model.
//!
//! # Architecture
//!
//! Everything is single-threaded: shared state is `Rc<RefCell<..>>`, and
//! no borrow is held while user callbacks run. Observers are stored on the
//! objects they observe (strongly), and observers reference their targets
//! weakly, so an observed object and its observers never form a cycle.
//!
//! # Invariants
//!
//! 1. An object holds at most one observer per property key.
//! 2. Unobserved collections never touch index-map bookkeeping.
//! 3. `Value` equality (`==` on the Rust side) is strict equality.

pub mod collections;
pub mod dom;
pub mod flags;
pub mod index_map;
pub mod object;
pub mod promise;
pub mod publisher;
pub mod tracking;
pub mod value;

pub use collections::{ArrayRef, CollectionSink, MapRef, SetRef, WeakArrayRef, WeakMapRef, WeakSetRef};
pub use dom::{Event, EventListener, Node, NodeType, WeakNode};
pub use flags::{BindingMode, LifecycleFlags, State};
pub use index_map::{IndexMap, NEW_ITEM};
pub use object::{Accessor, ComputedOverrides, ObjectKind, ObjectRef, PropertyInterceptor, WeakObjectRef};
pub use promise::{Promise, Settlement};
pub use publisher::{CollectionSubscriber, PropertySubscriber, Publisher};
pub use value::{FunctionRef, OpaqueRef, Value};
