#![forbid(unsafe_code)]

//! Built-in template controllers.
//!
//! | Name | View model property | Views |
//! |------|---------------------|-------|
//! | `if` | `value` | zero or one, cached per branch |
//! | `else` | - | supplies the alternate branch of the preceding `if` |
//! | `repeat` | `items` | one per item |
//! | `with` | `value` | exactly one, scoped to the value |
//! | `compose` | `subject` | zero or one, swapped on change |
//!
//! Each controller is rendered from a `HydrateTemplateController`
//! instruction, receives its bindable property through the nested
//! instructions and shows its views at the render location that replaced
//! the marker.

pub mod compose;
pub mod if_else;
pub mod repeat;
pub mod with;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use trellis_core::{LifecycleFlags, ObjectRef, State, Value};

pub use compose::Compose;
pub use if_else::{Else, If};
pub use repeat::Repeat;
pub use with::With;

use crate::binding::Bindable;
use crate::container::Container;
use crate::error::{LifecycleError, Result};
use crate::observation::PropertyObserver;
use crate::resources::Resource;
use crate::scope::Scope;
use crate::templating::{
    Attachable, AttributeContext, AttributeController, AttributeFactory, MountTarget, RenderLocation, View,
    ViewFactory,
};

type Create = fn(AttributeContext<'_>) -> Result<Rc<dyn AttributeController>>;

/// Registers a built-in controller under its attribute name.
struct TemplateController {
    create: Create,
}

impl AttributeFactory for TemplateController {
    fn is_template_controller(&self) -> bool {
        true
    }

    fn create(&self, ctx: AttributeContext<'_>) -> Result<Rc<dyn AttributeController>> {
        (self.create)(ctx)
    }
}

/// The controllers every container starts with.
#[must_use]
pub fn defaults() -> Vec<Resource> {
    let controllers: [(&str, Create); 5] = [
        ("if", If::create),
        ("else", Else::create),
        ("repeat", Repeat::create),
        ("with", With::create),
        ("compose", Compose::create),
    ];
    controllers
        .into_iter()
        .map(|(name, create)| Resource::attribute(name, TemplateController { create }))
        .collect()
}

// ---------------------------------------------------------------------------
// ControllerBase
// ---------------------------------------------------------------------------

/// What every template controller holds: where its views go, how to make
/// them, and the scope and state it was bound with.
pub(crate) struct ControllerBase {
    container: Rc<Container>,
    factory: Rc<ViewFactory>,
    location: RenderLocation,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
}

impl ControllerBase {
    pub(crate) fn new(name: &str, ctx: &AttributeContext<'_>) -> Result<Self> {
        let (Some(factory), Some(location)) = (ctx.factory.clone(), ctx.location.clone()) else {
            return Err(LifecycleError::NotATemplate { name: Rc::from(name) }.into());
        };
        Ok(Self {
            container: Rc::clone(ctx.container),
            factory,
            location,
            state: Cell::new(State::NONE),
            scope: RefCell::new(None),
        })
    }

    pub(crate) fn container(&self) -> &Rc<Container> {
        &self.container
    }

    pub(crate) fn factory(&self) -> &Rc<ViewFactory> {
        &self.factory
    }

    pub(crate) fn location(&self) -> &RenderLocation {
        &self.location
    }

    pub(crate) fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.state.get().contains(State::IS_ATTACHED)
    }

    /// Record the scope; `false` if already bound to this exact scope.
    pub(crate) fn enter(&self, scope: &Scope) -> bool {
        if self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope)) && self.is_bound() {
            return false;
        }
        *self.scope.borrow_mut() = Some(scope.clone());
        self.set(State::IS_BOUND, true);
        true
    }

    /// Forget the scope; `false` if not bound.
    pub(crate) fn leave(&self) -> bool {
        if !self.is_bound() {
            return false;
        }
        self.scope.borrow_mut().take();
        self.set(State::IS_BOUND, false);
        true
    }

    pub(crate) fn set_attached(&self, attached: bool) {
        self.set(State::IS_ATTACHED, attached);
    }

    fn set(&self, flag: State, on: bool) {
        let mut state = self.state.get();
        state.set(flag, on);
        self.state.set(state);
    }

    /// The observer of a view-model property the controller reacts to.
    pub(crate) fn observe(&self, view_model: &ObjectRef, key: &str) -> Result<Rc<dyn PropertyObserver>> {
        Ok(self
            .container
            .observer_locator()
            .get_observer(&Value::Object(view_model.clone()), key)?)
    }

    /// Hold `view` at the location, bind it, and attach it if the
    /// controller is attached.
    pub(crate) fn show(&self, view: &Rc<View>, scope: &Scope, flags: LifecycleFlags) -> Result<()> {
        view.hold(MountTarget::Location(self.location.clone()));
        view.bind(flags, scope)?;
        if self.is_attached() {
            view.attach(flags)?;
        }
        Ok(())
    }

    /// Detach and unbind `view`, leaving it to the caller to release.
    pub(crate) fn hide(&self, view: &Rc<View>, flags: LifecycleFlags) -> Result<()> {
        let detached = view.detach(flags);
        let unbound = view.unbind(flags);
        detached.and(unbound)
    }
}

impl fmt::Debug for ControllerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerBase")
            .field("factory", &self.factory.name())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Whether two optional views are the same view.
pub(crate) fn same_view(a: Option<&Rc<View>>, b: Option<&Rc<View>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::scheduler::Scheduler;
    use trellis_core::Node;

    #[test]
    fn controllers_reject_plain_attribute_use() {
        let c = Container::with_scheduler(RuntimeConfig::default(), Rc::new(Scheduler::manual()));
        let factory = c.find_attribute("if").expect("if is registered");
        assert!(factory.is_template_controller());
        let host = Node::element("div");
        let err = factory
            .create(AttributeContext {
                container: &c,
                host: &host,
                factory: None,
                location: None,
                instructions: &[],
            })
            .err()
            .expect("needs a location");
        assert_eq!(err.code(), "TRL-308");
    }
}
