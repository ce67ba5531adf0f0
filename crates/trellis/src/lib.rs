#![forbid(unsafe_code)]

//! Trellis: reactive data binding and view composition over an in-memory
//! node tree.
//!
//! This crate re-exports the workspace crates under one roof:
//!
//! | Path | Crate | Contents |
//! |------|-------|----------|
//! | [`core`] | `trellis-core` | values, observable objects and collections, nodes, promises, flags |
//! | [`expr`] | `trellis-expr` | binding-expression lexer, parser and parse cache |
//! | [`runtime`] | `trellis-runtime` | observation, bindings, lifecycle, templating, controllers, app |
//!
//! Most programs only need the [`prelude`].
//!
//! # Example
//!
//! ```
//! use trellis::prelude::*;
//! use trellis::runtime::templating::definition::marker;
//!
//! let template = Node::fragment();
//! template.append_child(&marker());
//! let greeting = ElementDefinition::new(
//!     TemplateDefinition::new("greeting", template)
//!         .with_instructions(vec![vec![Instruction::text("Hello ${name}")]]),
//!     || ObjectRef::from_pairs([("name", "Ada")]),
//! );
//!
//! let host = Node::element("main");
//! let app = App::with_container(Container::with_scheduler(
//!     RuntimeConfig::default(),
//!     std::rc::Rc::new(Scheduler::manual()),
//! ));
//! app.app(AppTarget::new(host.clone(), greeting));
//! app.start().unwrap();
//! assert_eq!(host.text_content(), "Hello Ada");
//! ```

pub use trellis_core as core;
pub use trellis_expr as expr;
pub use trellis_runtime as runtime;

pub use trellis_runtime::{App, AppTarget, Error, Result, RuntimeConfig};

/// The types most applications touch.
pub mod prelude {
    pub use trellis_core::{
        ArrayRef, BindingMode, Event, FunctionRef, LifecycleFlags, MapRef, Node, ObjectRef, OpaqueRef,
        Promise, PropertySubscriber, SetRef, Value,
    };
    pub use trellis_expr::{BindingType, ExpressionParser};
    pub use trellis_runtime::{
        App, AppTarget, Attachable, Bindable, Container, CustomElement, ElementDefinition, Error,
        Evaluate, FnConverter, Instruction, OverrideContext, PropertyObserver, Resource, Result,
        RuntimeConfig, Scheduler, Scope, Task, TemplateDefinition, View, ViewFactory,
    };
}
