#![forbid(unsafe_code)]

//! `<let full-name.bind="first + ' ' + last">`: a computed local.
//!
//! The value is written to the override context, or to the binding
//! context itself when the `<let>` element carries `to-binding-context`.
//! It is recomputed whenever a dependency changes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{CollectionSubscriber, IndexMap, LifecycleFlags, ObjectRef, PropertySubscriber, State, Value};
use trellis_expr::Expr;

use super::{bind_source, BehaviorHost, BehaviorSlots, Bindable, Binding, BindingKind, Connectable, ObserverSlots};
use crate::container::Container;
use crate::error::Result;
use crate::expression::Evaluate;
use crate::scope::Scope;

pub struct LetBinding {
    container: Rc<Container>,
    source: Rc<Expr>,
    target_property: Rc<str>,
    to_view_model: bool,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
    target: RefCell<Option<ObjectRef>>,
    slots: ObserverSlots,
    behaviors: BehaviorSlots,
}

impl LetBinding {
    #[must_use]
    pub fn new(source: Rc<Expr>, target_property: &str, to_view_model: bool, container: Rc<Container>) -> Rc<Self> {
        Rc::new_cyclic(|self_ref: &Weak<Self>| {
            let property: Weak<dyn PropertySubscriber> = self_ref.clone();
            let collection: Weak<dyn CollectionSubscriber> = self_ref.clone();
            Self {
                container,
                source,
                target_property: Rc::from(target_property),
                to_view_model,
                state: Cell::new(State::NONE),
                scope: RefCell::new(None),
                target: RefCell::new(None),
                slots: ObserverSlots::new(property, collection),
                behaviors: BehaviorSlots::new(),
            }
        })
    }

    fn target_of(&self, scope: &Scope) -> ObjectRef {
        match (self.to_view_model, scope.binding_context()) {
            (true, Value::Object(bc)) => bc.clone(),
            _ => scope.override_context().object().clone(),
        }
    }

    fn update(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        let value = self.source.evaluate(flags, Some(scope), &*self.container)?;
        if let Some(target) = self.target.borrow().as_ref() {
            target.set(&self.target_property, value);
        }
        self.slots.begin_cycle();
        let connected = self.source.connect(flags, Some(scope), self);
        self.slots.unobserve_stale();
        connected?;
        Ok(())
    }

    fn refresh(&self, flags: LifecycleFlags) {
        if !self.is_bound() {
            return;
        }
        let Some(scope) = self.scope.borrow().clone() else {
            return;
        };
        if let Err(error) = self.update(flags, &scope) {
            tracing::warn!(%error, local = %self.target_property, "let binding update failed");
        }
    }
}

impl Binding for LetBinding {
    fn container(&self) -> &Rc<Container> {
        &self.container
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Let
    }
}

impl Connectable for LetBinding {
    fn slots(&self) -> &ObserverSlots {
        &self.slots
    }
}

impl BehaviorHost for LetBinding {
    fn behaviors(&self) -> &BehaviorSlots {
        &self.behaviors
    }
}

impl Bindable for LetBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope)) {
                return Ok(());
            }
            self.unbind(flags | LifecycleFlags::FROM_BIND)?;
        }
        self.state.set(State::IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());
        *self.target.borrow_mut() = Some(self.target_of(scope));
        let bound = bind_source(&self.source, flags, scope, self, || {
            self.update(flags | LifecycleFlags::FROM_BIND, scope)
        });
        if let Err(err) = bound {
            self.slots.clear();
            self.target.borrow_mut().take();
            *self.scope.borrow_mut() = None;
            self.state.set(State::NONE);
            return Err(err);
        }
        self.state.set(State::IS_BOUND);
        Ok(())
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.state.set(self.state.get() | State::IS_UNBINDING);
        let scope = self.scope.borrow_mut().take();
        if let Some(scope) = scope {
            if self.source.has_unbind() {
                self.source.unbind(flags, &scope, self);
            }
        }
        self.slots.clear();
        self.target.borrow_mut().take();
        self.state.set(State::NONE);
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl PropertySubscriber for LetBinding {
    fn handle_change(&self, _: &Value, _: &Value, flags: LifecycleFlags) {
        self.refresh(flags);
    }
}

impl CollectionSubscriber for LetBinding {
    fn handle_collection_change(&self, _: &IndexMap, flags: LifecycleFlags) {
        self.refresh(flags);
    }
}

impl fmt::Debug for LetBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LetBinding")
            .field("target_property", &self.target_property)
            .field("to_view_model", &self.to_view_model)
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::scheduler::Scheduler;
    use trellis_expr::BindingType;

    fn let_binding(text: &str, to_view_model: bool) -> Rc<LetBinding> {
        let c = Container::with_scheduler(RuntimeConfig::default(), Rc::new(Scheduler::manual()));
        let expr = c.parser().parse(text, BindingType::None).expect("parse");
        LetBinding::new(expr, "full", to_view_model, c)
    }

    #[test]
    fn writes_to_override_context_and_recomputes() {
        let b = let_binding("first + ' ' + last", false);
        let vm = ObjectRef::from_pairs([("first", "Grace"), ("last", "Hopper")]);
        let scope = Scope::create(Value::Object(vm.clone()), None);
        b.bind(LifecycleFlags::NONE, &scope).expect("bind");
        assert_eq!(scope.override_context().get("full"), Value::from("Grace Hopper"));
        assert!(!vm.has("full"));
        vm.set("last", "Brewster");
        assert_eq!(scope.override_context().get("full"), Value::from("Grace Brewster"));
    }

    #[test]
    fn to_view_model_writes_binding_context() {
        let b = let_binding("1 + 1", true);
        let vm = ObjectRef::new();
        b.bind(LifecycleFlags::NONE, &Scope::create(Value::Object(vm.clone()), None))
            .expect("bind");
        assert_eq!(vm.get_untracked("full"), Value::from(2));
    }
}
