#![forbid(unsafe_code)]

//! `prop.call="expr"`: hands the target a function that evaluates `expr`.
//!
//! When the function is invoked with an object argument, that object's
//! own properties are visible to the expression through the override
//! context for the duration of the call.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{FunctionRef, LifecycleFlags, State, Value};
use trellis_expr::Expr;

use super::{bind_source, BehaviorHost, BehaviorSlots, Bindable, Binding, BindingKind};
use crate::container::Container;
use crate::error::Result;
use crate::expression::Evaluate;
use crate::observation::PropertyObserver;
use crate::scope::Scope;

pub struct CallBinding {
    container: Rc<Container>,
    source: Rc<Expr>,
    target: Value,
    target_property: Rc<str>,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
    target_observer: RefCell<Option<Rc<dyn PropertyObserver>>>,
    behaviors: BehaviorSlots,
    self_ref: Weak<Self>,
}

impl CallBinding {
    #[must_use]
    pub fn new(source: Rc<Expr>, target: Value, target_property: &str, container: Rc<Container>) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            container,
            source,
            target,
            target_property: Rc::from(target_property),
            state: Cell::new(State::NONE),
            scope: RefCell::new(None),
            target_observer: RefCell::new(None),
            behaviors: BehaviorSlots::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Evaluate the source with `args` exposed on the override context.
    pub fn call_source(&self, args: &[Value]) -> Result<Value> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(Value::Undefined);
        };
        let oc = scope.override_context();
        let exposed = match args.first() {
            Some(Value::Object(arg)) => arg.keys(),
            _ => Vec::new(),
        };
        if let Some(Value::Object(arg)) = args.first() {
            for key in &exposed {
                oc.set(key, arg.get_untracked(key));
            }
        }
        let result = self
            .source
            .evaluate(LifecycleFlags::MUST_EVALUATE, Some(&scope), &*self.container);
        for key in &exposed {
            oc.object().delete(key);
        }
        Ok(result?)
    }

    /// Install the calling function on the target property.
    fn install(&self, flags: LifecycleFlags) -> Result<()> {
        let observer = self
            .container
            .observer_locator()
            .get_accessor(&self.target, &self.target_property)?;
        let me = self.self_ref.clone();
        let function = FunctionRef::new(&self.target_property, move |_, args| {
            let Some(me) = me.upgrade() else {
                return Value::Undefined;
            };
            me.call_source(args).unwrap_or_else(|error| {
                tracing::warn!(%error, "call binding failed");
                Value::Undefined
            })
        });
        observer.set_value(Value::Function(function), flags | LifecycleFlags::FROM_BIND);
        *self.target_observer.borrow_mut() = Some(observer);
        Ok(())
    }
}

impl Binding for CallBinding {
    fn container(&self) -> &Rc<Container> {
        &self.container
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Call
    }
}

impl BehaviorHost for CallBinding {
    fn behaviors(&self) -> &BehaviorSlots {
        &self.behaviors
    }
}

impl Bindable for CallBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope)) {
                return Ok(());
            }
            self.unbind(flags | LifecycleFlags::FROM_BIND)?;
        }
        self.state.set(State::IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());
        if let Err(err) = bind_source(&self.source, flags, scope, self, || self.install(flags)) {
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
        if let Some(observer) = self.target_observer.borrow_mut().take() {
            observer.set_value(Value::Null, flags | LifecycleFlags::FROM_BIND);
        }
        self.state.set(State::NONE);
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl fmt::Debug for CallBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallBinding")
            .field("source", &self.source.to_string())
            .field("target_property", &self.target_property)
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::scheduler::Scheduler;
    use trellis_core::ObjectRef;
    use trellis_expr::BindingType;

    #[test]
    fn target_receives_a_callable_that_sees_arguments() {
        let c = Container::with_scheduler(RuntimeConfig::default(), Rc::new(Scheduler::manual()));
        let expr = c.parser().parse("picked = item", BindingType::None).expect("parse");
        let child_vm = ObjectRef::new();
        let b = CallBinding::new(expr, Value::Object(child_vm.clone()), "onPick", Rc::clone(&c));
        let vm = ObjectRef::new();
        let scope = Scope::create(Value::Object(vm.clone()), None);
        b.bind(LifecycleFlags::NONE, &scope).expect("bind");

        let Value::Function(f) = child_vm.get_untracked("onPick") else {
            panic!("expected a function");
        };
        f.call(&Value::Undefined, &[Value::Object(ObjectRef::from_pairs([("item", 3)]))]);
        assert_eq!(vm.get_untracked("picked"), Value::from(3));
        assert!(!scope.override_context().has("item"));

        b.unbind(LifecycleFlags::NONE).expect("unbind");
        assert_eq!(child_vm.get_untracked("onPick"), Value::Null);
    }
}
