#![forbid(unsafe_code)]

//! `ref="name"`: assigns the target (a node or a view model) to the
//! source expression while bound.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use trellis_core::{LifecycleFlags, State, Value};
use trellis_expr::Expr;

use super::{bind_source, BehaviorHost, BehaviorSlots, Bindable, Binding, BindingKind};
use crate::container::Container;
use crate::error::Result;
use crate::expression::Evaluate;
use crate::scope::Scope;

pub struct RefBinding {
    container: Rc<Container>,
    source: Rc<Expr>,
    target: Value,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
    behaviors: BehaviorSlots,
}

impl RefBinding {
    #[must_use]
    pub fn new(source: Rc<Expr>, target: Value, container: Rc<Container>) -> Rc<Self> {
        Rc::new(Self {
            container,
            source,
            target,
            state: Cell::new(State::NONE),
            scope: RefCell::new(None),
            behaviors: BehaviorSlots::new(),
        })
    }
}

impl Binding for RefBinding {
    fn container(&self) -> &Rc<Container> {
        &self.container
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Ref
    }
}

impl BehaviorHost for RefBinding {
    fn behaviors(&self) -> &BehaviorSlots {
        &self.behaviors
    }
}

impl Bindable for RefBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope)) {
                return Ok(());
            }
            self.unbind(flags | LifecycleFlags::FROM_BIND)?;
        }
        self.state.set(State::IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());
        let bound = bind_source(&self.source, flags, scope, self, || {
            self.source
                .assign(flags, Some(scope), &*self.container, self.target.clone())?;
            Ok(())
        });
        if let Err(err) = bound {
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
            // Only clear the reference if nothing else has replaced it.
            let current = self.source.evaluate(flags, Some(&scope), &*self.container)?;
            if current.strict_eq(&self.target) {
                self.source.assign(flags, Some(&scope), &*self.container, Value::Null)?;
            }
            if self.source.has_unbind() {
                self.source.unbind(flags, &scope, self);
            }
        }
        self.state.set(State::NONE);
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl fmt::Debug for RefBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefBinding")
            .field("source", &self.source.to_string())
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::scheduler::Scheduler;
    use trellis_core::{Node, ObjectRef};
    use trellis_expr::BindingType;

    #[test]
    fn assigns_on_bind_and_clears_own_reference_on_unbind() {
        let c = Container::with_scheduler(RuntimeConfig::default(), Rc::new(Scheduler::manual()));
        let node = Node::element("canvas");
        let expr = c.parser().parse("canvas", BindingType::IsRef).expect("parse");
        let b = RefBinding::new(expr, Value::Node(node.clone()), Rc::clone(&c));
        let vm = ObjectRef::new();
        b.bind(LifecycleFlags::NONE, &Scope::create(Value::Object(vm.clone()), None))
            .expect("bind");
        assert!(vm.get_untracked("canvas").as_node().is_some_and(|n| n.ptr_eq(&node)));
        b.unbind(LifecycleFlags::NONE).expect("unbind");
        assert_eq!(vm.get_untracked("canvas"), Value::Null);
    }
}
