#![forbid(unsafe_code)]

//! Application-defined custom attributes.
//!
//! A [`CustomAttribute`] has no view of its own: it receives bindable
//! properties from the instructions nested under it and reacts through the
//! same view-model hooks a custom element uses (`created`, `binding`,
//! `bound`, `attaching`, `attached`, `detaching`, `detached`, `unbinding`,
//! `unbound`).

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{LifecycleFlags, Node, ObjectRef, State};

use super::{Attachable, AttributeContext, AttributeController, AttributeFactory};
use crate::binding::Bindable;
use crate::container::Container;
use crate::element::Hooks;
use crate::error::Result;
use crate::lifecycle::{LifecycleHooks, Phase};
use crate::scope::Scope;

type AttributeViewModel = Rc<dyn Fn(&Node) -> ObjectRef>;

/// Registers a custom attribute whose view model is built from its host.
#[derive(Clone)]
pub struct CustomAttributeFactory {
    view_model: AttributeViewModel,
}

impl CustomAttributeFactory {
    #[must_use]
    pub fn new(view_model: impl Fn(&Node) -> ObjectRef + 'static) -> Self {
        Self {
            view_model: Rc::new(view_model),
        }
    }
}

impl AttributeFactory for CustomAttributeFactory {
    fn create(&self, ctx: AttributeContext<'_>) -> Result<Rc<dyn AttributeController>> {
        let view_model = (self.view_model)(ctx.host);
        let attribute = CustomAttribute::new(view_model, Rc::clone(ctx.container));
        attribute.hooks.call("created", &[]);
        Ok(attribute)
    }
}

impl fmt::Debug for CustomAttributeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAttributeFactory").finish_non_exhaustive()
    }
}

pub struct CustomAttribute {
    container: Rc<Container>,
    view_model: ObjectRef,
    hooks: Hooks,
    state: Cell<State>,
    self_ref: Weak<CustomAttribute>,
}

impl CustomAttribute {
    fn new(view_model: ObjectRef, container: Rc<Container>) -> Rc<Self> {
        let hooks = Hooks::new(view_model.clone(), Rc::clone(container.lifecycle()));
        Rc::new_cyclic(|self_ref| Self {
            container,
            view_model,
            hooks,
            state: Cell::new(State::NONE),
            self_ref: self_ref.clone(),
        })
    }

    fn me(&self) -> Option<Rc<dyn LifecycleHooks>> {
        self.self_ref.upgrade().map(|me| me as Rc<dyn LifecycleHooks>)
    }

    fn set(&self, flag: State, on: bool) {
        let mut state = self.state.get();
        state.set(flag, on);
        self.state.set(state);
    }
}

impl AttributeController for CustomAttribute {
    fn view_model(&self) -> &ObjectRef {
        &self.view_model
    }

    fn bindable(self: Rc<Self>) -> Rc<dyn Bindable> {
        self
    }

    fn attachable(self: Rc<Self>) -> Rc<dyn Attachable> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Bindable for CustomAttribute {
    fn bind(&self, _flags: LifecycleFlags, _scope: &Scope) -> Result<()> {
        if self.is_bound() {
            return Ok(());
        }
        let lifecycle = self.container.lifecycle();
        self.hooks.call_gated("binding", Phase::Bind);
        if self.hooks.has("bound") {
            if let Some(me) = self.me() {
                lifecycle.enqueue_bound(me);
            }
        }
        self.set(State::IS_BOUND, true);
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.hooks.call_gated("unbinding", Phase::Unbind);
        if self.hooks.has("unbound") {
            if let Some(me) = self.me() {
                self.container.lifecycle().enqueue_unbound(me);
            }
        }
        self.set(State::IS_BOUND, false);
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl Attachable for CustomAttribute {
    fn attach(&self, _flags: LifecycleFlags) -> Result<()> {
        if self.state.get().contains(State::IS_ATTACHED) {
            return Ok(());
        }
        self.hooks.call_gated("attaching", Phase::Attach);
        if self.hooks.has("attached") {
            if let Some(me) = self.me() {
                self.container.lifecycle().enqueue_attached(me);
            }
        }
        self.set(State::IS_ATTACHED, true);
        Ok(())
    }

    fn detach(&self, _flags: LifecycleFlags) -> Result<()> {
        if !self.state.get().contains(State::IS_ATTACHED) {
            return Ok(());
        }
        self.hooks.call_gated("detaching", Phase::Detach);
        if self.hooks.has("detached") {
            if let Some(me) = self.me() {
                self.container.lifecycle().enqueue_detached(me);
            }
        }
        self.set(State::IS_ATTACHED, false);
        Ok(())
    }
}

impl LifecycleHooks for CustomAttribute {
    fn bound(&self, _flags: LifecycleFlags) {
        self.hooks.call("bound", &[]);
    }

    fn attached(&self, _flags: LifecycleFlags) {
        self.hooks.call("attached", &[]);
    }

    fn detached(&self, _flags: LifecycleFlags) {
        self.hooks.call("detached", &[]);
    }

    fn unbound(&self, _flags: LifecycleFlags) {
        self.hooks.call("unbound", &[]);
    }
}

impl fmt::Debug for CustomAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAttribute")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}
