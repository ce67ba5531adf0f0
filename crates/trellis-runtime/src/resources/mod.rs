#![forbid(unsafe_code)]

//! Named resources looked up while binding: value converters, binding
//! behaviors, custom elements, custom attributes and render strategies.
//!
//! Resources are registered on a [`Container`](crate::container::Container)
//! and resolved through its parent chain. Expressions resolve converters and
//! behaviors by name through the narrower [`ServiceLocator`] view.

pub mod behaviors;
pub mod controllers;
pub mod signals;

use std::fmt;
use std::rc::Rc;

use trellis_core::{LifecycleFlags, Value};

use crate::binding::BehaviorHost;
use crate::error::EvalError;
use crate::scope::Scope;
use crate::templating::{AttributeFactory, ElementDefinition, RenderStrategy};

/// Name-based lookup used by expression evaluation.
pub trait ServiceLocator {
    fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>>;
    fn binding_behavior(&self, name: &str) -> Option<Rc<dyn BindingBehavior>>;
}

/// Transforms values flowing between source and target.
pub trait ValueConverter {
    /// Source to target.
    fn to_view(&self, value: Value, args: &[Value]) -> Value;

    /// Target to source. Identity unless overridden.
    fn from_view(&self, value: Value, _args: &[Value]) -> Value {
        value
    }

    /// Signal names that force bindings using this converter to refresh.
    fn signals(&self) -> &[Rc<str>] {
        &[]
    }
}

/// Reconfigures the binding it is applied to for the binding's lifetime.
pub trait BindingBehavior {
    fn bind(
        &self,
        flags: LifecycleFlags,
        scope: &Scope,
        binding: &dyn BehaviorHost,
        args: &[Value],
    ) -> Result<(), EvalError>;

    fn unbind(&self, flags: LifecycleFlags, scope: &Scope, binding: &dyn BehaviorHost);
}

/// A converter built from plain closures.
pub struct FnConverter {
    to_view: Box<dyn Fn(Value, &[Value]) -> Value>,
    from_view: Option<Box<dyn Fn(Value, &[Value]) -> Value>>,
    signals: Vec<Rc<str>>,
}

impl FnConverter {
    #[must_use]
    pub fn new(to_view: impl Fn(Value, &[Value]) -> Value + 'static) -> Self {
        Self {
            to_view: Box::new(to_view),
            from_view: None,
            signals: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_from_view(mut self, from_view: impl Fn(Value, &[Value]) -> Value + 'static) -> Self {
        self.from_view = Some(Box::new(from_view));
        self
    }

    #[must_use]
    pub fn with_signals<S: AsRef<str>>(mut self, signals: impl IntoIterator<Item = S>) -> Self {
        self.signals = signals.into_iter().map(|s| Rc::from(s.as_ref())).collect();
        self
    }
}

impl ValueConverter for FnConverter {
    fn to_view(&self, value: Value, args: &[Value]) -> Value {
        (self.to_view)(value, args)
    }

    fn from_view(&self, value: Value, args: &[Value]) -> Value {
        match &self.from_view {
            Some(f) => f(value, args),
            None => value,
        }
    }

    fn signals(&self) -> &[Rc<str>] {
        &self.signals
    }
}

impl fmt::Debug for FnConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConverter")
            .field("two_way", &self.from_view.is_some())
            .field("signals", &self.signals)
            .finish()
    }
}

/// Anything that can be registered on a container.
pub enum Resource {
    ValueConverter(Rc<str>, Rc<dyn ValueConverter>),
    BindingBehavior(Rc<str>, Rc<dyn BindingBehavior>),
    Element(Rc<ElementDefinition>),
    Attribute(Rc<str>, Rc<dyn AttributeFactory>),
    RenderStrategy(Rc<str>, Rc<dyn RenderStrategy>),
}

impl Resource {
    pub fn converter(name: &str, converter: impl ValueConverter + 'static) -> Self {
        Self::ValueConverter(Rc::from(name), Rc::new(converter))
    }

    pub fn behavior(name: &str, behavior: impl BindingBehavior + 'static) -> Self {
        Self::BindingBehavior(Rc::from(name), Rc::new(behavior))
    }

    pub fn element(definition: ElementDefinition) -> Self {
        Self::Element(Rc::new(definition))
    }

    pub fn attribute(name: &str, factory: impl AttributeFactory + 'static) -> Self {
        Self::Attribute(Rc::from(name), Rc::new(factory))
    }

    pub fn strategy(name: &str, strategy: impl RenderStrategy + 'static) -> Self {
        Self::RenderStrategy(Rc::from(name), Rc::new(strategy))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ValueConverter(name, _)
            | Self::BindingBehavior(name, _)
            | Self::Attribute(name, _)
            | Self::RenderStrategy(name, _) => name,
            Self::Element(def) => def.name(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::ValueConverter(..) => "ValueConverter",
            Self::BindingBehavior(..) => "BindingBehavior",
            Self::Element(..) => "Element",
            Self::Attribute(..) => "Attribute",
            Self::RenderStrategy(..) => "RenderStrategy",
        };
        f.debug_tuple(kind).field(&self.name()).finish()
    }
}
