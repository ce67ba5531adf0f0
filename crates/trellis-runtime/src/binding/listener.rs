#![forbid(unsafe_code)]

//! Event listener binding (`click.trigger="save($event)"`).
//!
//! While the handler runs, the dispatched event is visible to the
//! expression as `$event` on the override context; it is removed again
//! afterwards. The event's default action is prevented unless the handler
//! returns exactly `true` (when the binding was created with
//! `prevent_default`).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{Event, EventListener, LifecycleFlags, Node, State, Value};
use trellis_expr::Expr;

use super::{bind_source, BehaviorHost, BehaviorSlots, Bindable, Binding, BindingKind, LimitedOp};
use crate::container::Container;
use crate::error::Result;
use crate::expression::Evaluate;
use crate::scope::Scope;

const EVENT_NAME: &str = "$event";

pub struct ListenerBinding {
    container: Rc<Container>,
    target_event: Rc<str>,
    source: Rc<Expr>,
    target: Node,
    prevent_default: bool,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
    listener: RefCell<Option<EventListener>>,
    behaviors: BehaviorSlots,
    self_ref: Weak<Self>,
}

impl ListenerBinding {
    #[must_use]
    pub fn new(
        target_event: &str,
        source: Rc<Expr>,
        target: Node,
        prevent_default: bool,
        container: Rc<Container>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            container,
            target_event: Rc::from(target_event),
            source,
            target,
            prevent_default,
            state: Cell::new(State::NONE),
            scope: RefCell::new(None),
            listener: RefCell::new(None),
            behaviors: BehaviorSlots::new(),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn target_event(&self) -> &str {
        &self.target_event
    }

    /// Evaluate the handler for `event`.
    pub fn call_source(&self, event: &Event) -> Result<Value> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(Value::Undefined);
        };
        let oc = scope.override_context();
        oc.set(EVENT_NAME, event.to_value());
        let result = self
            .source
            .evaluate(LifecycleFlags::MUST_EVALUATE, Some(&scope), &*self.container);
        oc.object().delete(EVENT_NAME);
        let result = result?;
        if self.prevent_default && !matches!(result, Value::Bool(true)) {
            event.prevent_default();
        }
        Ok(result)
    }

    fn handle_event(&self, event: &Event) {
        if !self.is_bound() {
            return;
        }
        if self.behaviors.self_only() && event.current_target().is_some_and(|t| !t.ptr_eq(event.target())) {
            return;
        }
        let me = self.self_ref.clone();
        let event = event.clone();
        self.behaviors.rate_limit(LimitedOp::CallSource, move || {
            if let Some(me) = me.upgrade() {
                if let Err(error) = me.call_source(&event) {
                    tracing::warn!(%error, event = %me.target_event, "event handler failed");
                }
            }
        });
    }
}

impl Binding for ListenerBinding {
    fn container(&self) -> &Rc<Container> {
        &self.container
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Listener
    }
}

impl BehaviorHost for ListenerBinding {
    fn behaviors(&self) -> &BehaviorSlots {
        &self.behaviors
    }
}

impl Bindable for ListenerBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope)) {
                return Ok(());
            }
            self.unbind(flags | LifecycleFlags::FROM_BIND)?;
        }
        self.state.set(State::IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());
        if let Err(err) = bind_source(&self.source, flags, scope, self, || Ok(())) {
            *self.scope.borrow_mut() = None;
            self.state.set(State::NONE);
            return Err(err);
        }
        let me = self.self_ref.clone();
        let listener: EventListener = Rc::new(move |event: &Event| {
            if let Some(me) = me.upgrade() {
                me.handle_event(event);
            }
        });
        self.target.add_event_listener(&self.target_event, Rc::clone(&listener));
        *self.listener.borrow_mut() = Some(listener);
        self.state.set(State::IS_BOUND);
        tracing::trace!(event = %self.target_event, "listener bound");
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
        if let Some(listener) = self.listener.borrow_mut().take() {
            self.target.remove_event_listener(&self.target_event, &listener);
        }
        self.state.set(State::NONE);
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl fmt::Debug for ListenerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBinding")
            .field("event", &self.target_event)
            .field("source", &self.source.to_string())
            .field("prevent_default", &self.prevent_default)
            .field("state", &self.state.get())
            .finish()
    }
}
