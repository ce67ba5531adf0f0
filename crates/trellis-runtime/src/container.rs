#![forbid(unsafe_code)]

//! Service and resource registry.
//!
//! A [`Container`] owns one set of shared [`Services`] (scheduler,
//! lifecycle, observer locator, parser, signaler, renderer) and a table of
//! named resources. Child containers share their parent's services and
//! fall back to the parent for any resource they do not register
//! themselves.
//!
//! A fresh root container already carries the built-in binding behaviors
//! and the `if`/`else`/`repeat`/`with`/`compose` template controllers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use trellis_expr::ExpressionParser;

use crate::config::RuntimeConfig;
use crate::lifecycle::Lifecycle;
use crate::observation::{DirtyChecker, ObserverLocator};
use crate::resources::signals::SignalDispatcher;
use crate::resources::{BindingBehavior, Resource, ServiceLocator, ValueConverter, behaviors, controllers};
use crate::scheduler::Scheduler;
use crate::templating::{AttributeFactory, ElementDefinition, RenderStrategy, Renderer};

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Singletons shared by a container tree.
pub struct Services {
    config: RuntimeConfig,
    scheduler: Rc<Scheduler>,
    lifecycle: Rc<Lifecycle>,
    dirty_checker: Rc<DirtyChecker>,
    observer_locator: Rc<ObserverLocator>,
    parser: ExpressionParser,
    signaler: Rc<SignalDispatcher>,
    renderer: Renderer,
}

impl Services {
    #[must_use]
    pub fn new(config: RuntimeConfig, scheduler: Rc<Scheduler>) -> Self {
        let lifecycle = Lifecycle::new(Rc::clone(&scheduler));
        let dirty_checker = DirtyChecker::new(Rc::clone(&scheduler), config.dirty_check.clone());
        let observer_locator = ObserverLocator::new(
            Rc::clone(&lifecycle),
            Rc::clone(&dirty_checker),
            config.collection_observation,
        );
        let parser = ExpressionParser::with_optional_capacity(config.parse_cache_capacity);
        Self {
            config,
            scheduler,
            lifecycle,
            dirty_checker,
            observer_locator,
            parser,
            signaler: Rc::new(SignalDispatcher::new()),
            renderer: Renderer::new(),
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("parser", &self.parser)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    converters: AHashMap<Rc<str>, Rc<dyn ValueConverter>>,
    behaviors: AHashMap<Rc<str>, Rc<dyn BindingBehavior>>,
    elements: AHashMap<Rc<str>, Rc<ElementDefinition>>,
    attributes: AHashMap<Rc<str>, Rc<dyn AttributeFactory>>,
    strategies: AHashMap<Rc<str>, Rc<dyn RenderStrategy>>,
}

pub struct Container {
    services: Rc<Services>,
    parent: Option<Rc<Container>>,
    registry: RefCell<Registry>,
}

impl Container {
    /// A root container on the system clock.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Rc<Self> {
        Self::with_scheduler(config, Rc::new(Scheduler::system()))
    }

    /// A root container driven by `scheduler` (use a manual clock in tests).
    #[must_use]
    pub fn with_scheduler(config: RuntimeConfig, scheduler: Rc<Scheduler>) -> Rc<Self> {
        let container = Rc::new(Self {
            services: Rc::new(Services::new(config, scheduler)),
            parent: None,
            registry: RefCell::new(Registry::default()),
        });
        for resource in behaviors::defaults().into_iter().chain(controllers::defaults()) {
            container.register(resource);
        }
        container
    }

    /// A child sharing this container's services.
    #[must_use]
    pub fn child(self: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            services: Rc::clone(&self.services),
            parent: Some(Rc::clone(self)),
            registry: RefCell::new(Registry::default()),
        })
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Rc<Container>> {
        self.parent.as_ref()
    }

    /// Register a resource. A later registration under the same name wins.
    pub fn register(&self, resource: Resource) {
        tracing::trace!(name = %resource.name(), "resource registered");
        let mut registry = self.registry.borrow_mut();
        match resource {
            Resource::ValueConverter(name, c) => {
                registry.converters.insert(name, c);
            }
            Resource::BindingBehavior(name, b) => {
                registry.behaviors.insert(name, b);
            }
            Resource::Element(definition) => {
                registry.elements.insert(Rc::clone(definition.name()), definition);
            }
            Resource::Attribute(name, a) => {
                registry.attributes.insert(name, a);
            }
            Resource::RenderStrategy(name, s) => {
                registry.strategies.insert(name, s);
            }
        }
    }

    fn lookup<T: Clone>(&self, pick: impl Fn(&Registry) -> Option<T>) -> Option<T> {
        let mut current = Some(self);
        while let Some(container) = current {
            if let Some(found) = pick(&container.registry.borrow()) {
                return Some(found);
            }
            current = container.parent.as_deref();
        }
        None
    }

    #[must_use]
    pub fn find_element(&self, name: &str) -> Option<Rc<ElementDefinition>> {
        self.lookup(|r| r.elements.get(name).cloned())
    }

    #[must_use]
    pub fn find_attribute(&self, name: &str) -> Option<Rc<dyn AttributeFactory>> {
        self.lookup(|r| r.attributes.get(name).cloned())
    }

    #[must_use]
    pub fn find_strategy(&self, name: &str) -> Option<Rc<dyn RenderStrategy>> {
        self.lookup(|r| r.strategies.get(name).cloned())
    }

    // -- services ----------------------------------------------------------

    #[must_use]
    pub fn services(&self) -> &Rc<Services> {
        &self.services
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.services.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.services.scheduler
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Rc<Lifecycle> {
        &self.services.lifecycle
    }

    #[must_use]
    pub fn dirty_checker(&self) -> &Rc<DirtyChecker> {
        &self.services.dirty_checker
    }

    #[must_use]
    pub fn observer_locator(&self) -> &Rc<ObserverLocator> {
        &self.services.observer_locator
    }

    #[must_use]
    pub fn parser(&self) -> &ExpressionParser {
        &self.services.parser
    }

    #[must_use]
    pub fn signaler(&self) -> &Rc<SignalDispatcher> {
        &self.services.signaler
    }

    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.services.renderer
    }
}

impl ServiceLocator for Container {
    fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>> {
        self.lookup(|r| r.converters.get(name).cloned())
    }

    fn binding_behavior(&self, name: &str) -> Option<Rc<dyn BindingBehavior>> {
        self.lookup(|r| r.behaviors.get(name).cloned())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("Container")
            .field("converters", &registry.converters.len())
            .field("behaviors", &registry.behaviors.len())
            .field("elements", &registry.elements.len())
            .field("attributes", &registry.attributes.len())
            .field("strategies", &registry.strategies.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FnConverter;
    use trellis_core::Value;

    fn root() -> Rc<Container> {
        Container::with_scheduler(RuntimeConfig::default(), Rc::new(Scheduler::manual()))
    }

    #[test]
    fn builtins_are_registered() {
        let c = root();
        for name in ["debounce", "throttle", "oneTime", "twoWay", "updateTrigger", "signal", "self"] {
            assert!(c.binding_behavior(name).is_some(), "{name}");
        }
        for name in ["if", "else", "repeat", "with", "compose"] {
            assert!(c.find_attribute(name).is_some(), "{name}");
        }
    }

    #[test]
    fn child_falls_back_to_parent_and_can_shadow() {
        let parent = root();
        parent.register(Resource::converter("upper", FnConverter::new(|v, _| {
            Value::from(v.to_display_string().to_uppercase())
        })));
        let child = parent.child();
        assert!(child.value_converter("upper").is_some());
        assert!(Rc::ptr_eq(child.lifecycle(), parent.lifecycle()));

        child.register(Resource::converter("upper", FnConverter::new(|v, _| v)));
        let shadowed = child.value_converter("upper").expect("child");
        assert_eq!(shadowed.to_view(Value::from("a"), &[]), Value::from("a"));
        let original = parent.value_converter("upper").expect("parent");
        assert_eq!(original.to_view(Value::from("a"), &[]), Value::from("A"));
        assert!(child.value_converter("missing").is_none());
    }
}
