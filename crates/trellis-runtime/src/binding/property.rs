#![forbid(unsafe_code)]

//! Property binding: an expression kept in sync with one target property.
//!
//! | Mode | On bind | Source change | Target change |
//! |------|---------|---------------|---------------|
//! | oneTime | write target | ignored | ignored |
//! | toView | write target, connect | write target, reconnect | ignored |
//! | fromView | subscribe target | ignored | assign source |
//! | twoWay | write target, connect, subscribe target | write target, reconnect | assign source |
//!
//! Writes happen only when the new value is not strictly equal to the
//! target's current value. The write on bind is never rate limited; later
//! writes go through a debounce or throttle behavior if one is applied.
//!
//! When bound with `FROM_START`, connecting is deferred to the lifecycle's
//! connect queue and runs once at the end of the outermost bind batch.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{BindingMode, CollectionSubscriber, IndexMap, LifecycleFlags, PropertySubscriber, State, Value};
use trellis_expr::Expr;

use super::{
    bind_source, BehaviorHost, BehaviorSlots, Bindable, Binding, BindingKind, Connectable, LimitedOp, ObserverSlots,
};
use crate::container::Container;
use crate::error::Result;
use crate::expression::Evaluate;
use crate::lifecycle::DeferredConnect;
use crate::observation::PropertyObserver;
use crate::scope::Scope;

pub struct PropertyBinding {
    container: Rc<Container>,
    source: Rc<Expr>,
    target: Value,
    target_property: Rc<str>,
    mode: BindingMode,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
    target_observer: RefCell<Option<Rc<dyn PropertyObserver>>>,
    target_subscriber: Rc<TargetSubscriber>,
    slots: ObserverSlots,
    behaviors: BehaviorSlots,
    self_ref: Weak<Self>,
}

impl PropertyBinding {
    #[must_use]
    pub fn new(
        source: Rc<Expr>,
        target: Value,
        target_property: &str,
        mode: BindingMode,
        container: Rc<Container>,
    ) -> Rc<Self> {
        let mode = resolve_default_mode(mode, &target, target_property);
        Rc::new_cyclic(|self_ref: &Weak<Self>| {
            let property: Weak<dyn PropertySubscriber> = self_ref.clone();
            let collection: Weak<dyn CollectionSubscriber> = self_ref.clone();
            Self {
                container,
                source,
                target,
                target_property: Rc::from(target_property),
                mode,
                state: Cell::new(State::NONE),
                scope: RefCell::new(None),
                target_observer: RefCell::new(None),
                target_subscriber: Rc::new(TargetSubscriber(self_ref.clone())),
                slots: ObserverSlots::new(property, collection),
                behaviors: BehaviorSlots::new(),
                self_ref: self_ref.clone(),
            }
        })
    }

    #[must_use]
    pub fn source(&self) -> &Rc<Expr> {
        &self.source
    }

    #[must_use]
    pub fn target(&self) -> &Value {
        &self.target
    }

    #[must_use]
    pub fn target_property(&self) -> &str {
        &self.target_property
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state.get()
    }

    #[must_use]
    pub fn mode(&self) -> BindingMode {
        self.effective_mode().unwrap_or(self.mode)
    }

    #[must_use]
    pub fn target_observer(&self) -> Option<Rc<dyn PropertyObserver>> {
        self.target_observer.borrow().clone()
    }

    fn current_scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    fn target_subscriber(&self) -> Weak<dyn PropertySubscriber> {
        let weak: Weak<TargetSubscriber> = Rc::downgrade(&self.target_subscriber);
        weak
    }

    /// Write `value` to the target unconditionally.
    pub fn update_target(&self, value: Value, flags: LifecycleFlags) {
        if let Some(observer) = self.target_observer() {
            observer.set_value(value, flags);
        }
    }

    /// Assign `value` back through the source expression.
    pub fn update_source(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        let scope = self.current_scope();
        self.source
            .assign(flags, scope.as_ref(), &*self.container, value)?;
        Ok(())
    }

    /// Re-run `connect`, dropping dependencies no longer touched.
    pub fn connect_now(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.current_scope() else {
            return Ok(());
        };
        self.slots.begin_cycle();
        let connected = self.source.connect(flags, Some(&scope), self);
        self.slots.unobserve_stale();
        connected?;
        Ok(())
    }

    fn source_changed(&self, flags: LifecycleFlags) {
        if !self.state.get().contains(State::IS_BOUND) {
            return;
        }
        let mode = self.mode();
        if !mode.updates_target() {
            return;
        }
        let Some(scope) = self.current_scope() else {
            return;
        };
        let value = match self.source.evaluate(flags, Some(&scope), &*self.container) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, expression = %self.source, "source evaluation failed");
                return;
            }
        };
        let current = self.target_observer().map_or(Value::Undefined, |o| o.get_value());
        if !value.strict_eq(&current) {
            let me = self.self_ref.clone();
            self.behaviors.rate_limit(LimitedOp::UpdateTarget, move || {
                if let Some(me) = me.upgrade() {
                    if me.state.get().contains(State::IS_BOUND) {
                        me.update_target(value, flags);
                    }
                }
            });
        }
        if mode != BindingMode::ONE_TIME {
            if let Err(error) = self.connect_now(flags) {
                tracing::warn!(%error, expression = %self.source, "reconnect failed");
            }
        }
    }

    fn target_changed(&self, value: &Value, flags: LifecycleFlags) {
        if !self.state.get().contains(State::IS_BOUND) || !self.mode().updates_source() {
            return;
        }
        let me = self.self_ref.clone();
        let value = value.clone();
        self.behaviors.rate_limit(LimitedOp::UpdateSource, move || {
            if let Some(me) = me.upgrade() {
                if let Err(error) = me.update_source(value, flags) {
                    tracing::warn!(%error, expression = %me.source, "update source failed");
                }
            }
        });
    }

    fn bind_target(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        let mode = self.mode();
        let observer = self
            .container
            .observer_locator()
            .get_observer(&self.target, &self.target_property)?;
        *self.target_observer.borrow_mut() = Some(Rc::clone(&observer));

        let flags = flags | LifecycleFlags::FROM_BIND;
        if mode.updates_target() {
            let value = self.source.evaluate(flags, Some(scope), &*self.container)?;
            self.update_target(value, flags | LifecycleFlags::UPDATE_TARGET_INSTANCE);
        }
        if mode.observes_source() {
            if flags.contains(LifecycleFlags::FROM_START) {
                if let Some(me) = self.self_ref.upgrade() {
                    self.container.lifecycle().enqueue_connect(me);
                }
            } else {
                self.connect_now(flags)?;
            }
        }
        if mode.updates_source() {
            observer.subscribe(self.target_subscriber());
            if let Some(events) = self.behaviors.update_events() {
                observer.set_update_events(&events);
            }
        }
        Ok(())
    }

    /// Drop observers and scope once the source is unbound.
    fn release(&self) {
        if let Some(observer) = self.target_observer() {
            observer.unsubscribe(&self.target_subscriber());
        }
        self.slots.clear();
        *self.scope.borrow_mut() = None;
        self.state.set(State::NONE);
    }
}

impl Binding for PropertyBinding {
    fn container(&self) -> &Rc<Container> {
        &self.container
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Property(self.mode)
    }
}

impl Connectable for PropertyBinding {
    fn slots(&self) -> &ObserverSlots {
        &self.slots
    }
}

impl BehaviorHost for PropertyBinding {
    fn behaviors(&self) -> &BehaviorSlots {
        &self.behaviors
    }

    fn signal_subscriber(&self) -> Option<Weak<dyn PropertySubscriber>> {
        let weak: Weak<dyn PropertySubscriber> = self.self_ref.clone();
        Some(weak)
    }
}

impl Bindable for PropertyBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.state.get().contains(State::IS_BOUND) {
            if self.current_scope().is_some_and(|s| s.ptr_eq(scope)) {
                return Ok(());
            }
            self.unbind(flags | LifecycleFlags::FROM_BIND)?;
        }
        self.state.set(self.state.get() | State::IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());
        if let Err(err) = bind_source(&self.source, flags, scope, self, || self.bind_target(flags, scope)) {
            self.release();
            return Err(err);
        }
        self.state.set((self.state.get() - State::IS_BINDING) | State::IS_BOUND);
        tracing::trace!(expression = %self.source, property = %self.target_property, mode = ?self.mode(), "property binding bound");
        Ok(())
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.state.get().contains(State::IS_BOUND) {
            return Ok(());
        }
        self.state.set(self.state.get() | State::IS_UNBINDING);
        if let Some(scope) = self.current_scope() {
            if self.source.has_unbind() {
                self.source.unbind(flags, &scope, self);
            }
        }
        self.release();
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl DeferredConnect for PropertyBinding {
    fn connect(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.connect_now(flags)
    }
}

impl PropertySubscriber for PropertyBinding {
    fn handle_change(&self, _new_value: &Value, _previous_value: &Value, flags: LifecycleFlags) {
        self.source_changed(flags);
    }
}

impl CollectionSubscriber for PropertyBinding {
    fn handle_collection_change(&self, _index_map: &IndexMap, flags: LifecycleFlags) {
        self.source_changed(flags);
    }
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("source", &self.source.to_string())
            .field("target_property", &self.target_property)
            .field("mode", &self.mode)
            .field("state", &self.state.get())
            .field("observed", &self.slots.len())
            .finish()
    }
}

/// `default` is two-way for form control values and one-way elsewhere.
fn resolve_default_mode(mode: BindingMode, target: &Value, property: &str) -> BindingMode {
    if mode != BindingMode::DEFAULT {
        return mode;
    }
    match target {
        Value::Node(node) => match (node.node_name(), property) {
            ("input" | "textarea" | "select", "value") | ("input", "checked") => BindingMode::TWO_WAY,
            _ => BindingMode::TO_VIEW,
        },
        _ => BindingMode::TO_VIEW,
    }
}

/// Receives target-side changes so they are never mistaken for source
/// changes when the target is itself an observed object.
struct TargetSubscriber(Weak<PropertyBinding>);

impl PropertySubscriber for TargetSubscriber {
    fn handle_change(&self, new_value: &Value, _previous_value: &Value, flags: LifecycleFlags) {
        if let Some(binding) = self.0.upgrade() {
            binding.target_changed(new_value, flags);
        }
    }
}
