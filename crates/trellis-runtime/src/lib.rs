#![forbid(unsafe_code)]

//! The Trellis runtime: observation, bindings, lifecycle coordination and
//! the view machinery built on them.
//!
//! # Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`scope`] | binding/override context chains used for name resolution |
//! | [`expression`] | evaluate, assign, connect, bind and unbind over parsed expressions |
//! | [`observation`] | property, collection, element and dirty-checked observers |
//! | [`binding`] | property, interpolation, listener, call, ref and let bindings |
//! | [`resources`] | converters, behaviors, signals and the built-in template controllers |
//! | [`lifecycle`] | batched bind/attach/detach/unbind phases with flush and mount queues |
//! | [`scheduler`] | microtasks and timers over a real or manual clock |
//! | [`task`] | completion handles for async lifecycle work |
//! | [`templating`] | definitions, views, factories and the renderer |
//! | [`element`] | custom element controllers |
//! | [`app`] | bootstrapping a root component into a host node |
//!
//! A [`Container`] owns the shared services (scheduler, lifecycle, observer
//! locator, parser, signaler, renderer) and the named resources.
//!
//! # Concurrency
//!
//! Everything runs on one thread. Deferred work happens only on promise
//! continuations, the flush microtask, and rate-limit timers.

pub mod app;
pub mod binding;
pub mod config;
pub mod container;
pub mod element;
pub mod error;
pub mod expression;
pub mod lifecycle;
pub mod observation;
pub mod resources;
pub mod scheduler;
pub mod scope;
pub mod task;
pub mod templating;

pub use app::{App, AppTarget};
pub use binding::{Bindable, Binding, BindingKind};
pub use config::{CacheSize, DirtyCheckSettings, RuntimeConfig};
pub use container::Container;
pub use element::CustomElement;
pub use error::{Error, EvalError, LifecycleError, Result};
pub use expression::Evaluate;
pub use lifecycle::{Lifecycle, Phase};
pub use observation::{ObserverLocator, PropertyObserver};
pub use resources::{FnConverter, Resource, ValueConverter};
pub use scheduler::Scheduler;
pub use scope::{OverrideContext, Scope};
pub use task::{Task, TaskStatus};
pub use templating::{
    Attachable, ElementDefinition, Instruction, TemplateDefinition, View, ViewFactory,
};
