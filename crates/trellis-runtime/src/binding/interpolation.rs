#![forbid(unsafe_code)]

//! One-way binding of a whole `${...}` interpolation to a target property.
//!
//! All parts of the interpolation share one binding and one set of
//! observer slots; any dependency change re-renders the complete string.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{CollectionSubscriber, IndexMap, LifecycleFlags, PropertySubscriber, State, Value};
use trellis_expr::Expr;

use super::{bind_source, BehaviorHost, BehaviorSlots, Bindable, Binding, BindingKind, Connectable, LimitedOp, ObserverSlots};
use crate::container::Container;
use crate::error::Result;
use crate::expression::Evaluate;
use crate::observation::PropertyObserver;
use crate::scope::Scope;

pub struct InterpolationBinding {
    container: Rc<Container>,
    interpolation: Rc<Expr>,
    target: Value,
    target_property: Rc<str>,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
    target_observer: RefCell<Option<Rc<dyn PropertyObserver>>>,
    slots: ObserverSlots,
    behaviors: BehaviorSlots,
    self_ref: Weak<Self>,
}

impl InterpolationBinding {
    #[must_use]
    pub fn new(interpolation: Rc<Expr>, target: Value, target_property: &str, container: Rc<Container>) -> Rc<Self> {
        Rc::new_cyclic(|self_ref: &Weak<Self>| {
            let property: Weak<dyn PropertySubscriber> = self_ref.clone();
            let collection: Weak<dyn CollectionSubscriber> = self_ref.clone();
            Self {
                container,
                interpolation,
                target,
                target_property: Rc::from(target_property),
                state: Cell::new(State::NONE),
                scope: RefCell::new(None),
                target_observer: RefCell::new(None),
                slots: ObserverSlots::new(property, collection),
                behaviors: BehaviorSlots::new(),
                self_ref: self_ref.clone(),
            }
        })
    }

    #[must_use]
    pub fn target_property(&self) -> &str {
        &self.target_property
    }

    fn render(&self, flags: LifecycleFlags, scope: &Scope) -> Result<Value> {
        Ok(self.interpolation.evaluate(flags, Some(scope), &*self.container)?)
    }

    fn connect_now(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        self.slots.begin_cycle();
        let connected = self.interpolation.connect(flags, Some(scope), self);
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
        match self.render(flags, &scope) {
            Ok(value) => {
                let observer = self.target_observer.borrow().clone();
                if let Some(observer) = observer {
                    if !value.strict_eq(&observer.get_value()) {
                        let me = self.self_ref.clone();
                        self.behaviors.rate_limit(LimitedOp::UpdateTarget, move || {
                            if let Some(me) = me.upgrade() {
                                if me.is_bound() {
                                    observer.set_value(value, flags);
                                }
                            }
                        });
                    }
                }
            }
            Err(error) => tracing::warn!(%error, "interpolation evaluation failed"),
        }
        if let Err(error) = self.connect_now(flags, &scope) {
            tracing::warn!(%error, "interpolation reconnect failed");
        }
    }
}

impl Binding for InterpolationBinding {
    fn container(&self) -> &Rc<Container> {
        &self.container
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Interpolation
    }
}

impl Connectable for InterpolationBinding {
    fn slots(&self) -> &ObserverSlots {
        &self.slots
    }
}

impl BehaviorHost for InterpolationBinding {
    fn behaviors(&self) -> &BehaviorSlots {
        &self.behaviors
    }

    fn signal_subscriber(&self) -> Option<Weak<dyn PropertySubscriber>> {
        let weak: Weak<dyn PropertySubscriber> = self.self_ref.clone();
        Some(weak)
    }
}

impl Bindable for InterpolationBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope)) {
                return Ok(());
            }
            self.unbind(flags | LifecycleFlags::FROM_BIND)?;
        }
        self.state.set(State::IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());
        let bound = bind_source(&self.interpolation, flags, scope, self, || {
            let observer = self
                .container
                .observer_locator()
                .get_accessor(&self.target, &self.target_property)?;
            let flags = flags | LifecycleFlags::FROM_BIND;
            observer.set_value(self.render(flags, scope)?, flags | LifecycleFlags::UPDATE_TARGET_INSTANCE);
            *self.target_observer.borrow_mut() = Some(observer);
            self.connect_now(flags, scope)
        });
        if let Err(err) = bound {
            self.slots.clear();
            *self.scope.borrow_mut() = None;
            self.state.set(State::NONE);
            return Err(err);
        }
        self.state.set(State::IS_BOUND);
        tracing::trace!(property = %self.target_property, "interpolation bound");
        Ok(())
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.state.set(self.state.get() | State::IS_UNBINDING);
        let scope = self.scope.borrow_mut().take();
        if let Some(scope) = scope {
            if self.interpolation.has_unbind() {
                self.interpolation.unbind(flags, &scope, self);
            }
        }
        self.slots.clear();
        self.state.set(State::NONE);
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl PropertySubscriber for InterpolationBinding {
    fn handle_change(&self, _: &Value, _: &Value, flags: LifecycleFlags) {
        self.refresh(flags);
    }
}

impl CollectionSubscriber for InterpolationBinding {
    fn handle_collection_change(&self, _: &IndexMap, flags: LifecycleFlags) {
        self.refresh(flags);
    }
}

impl fmt::Debug for InterpolationBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpolationBinding")
            .field("interpolation", &self.interpolation.to_string())
            .field("target_property", &self.target_property)
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::resources::{FnConverter, Resource};
    use crate::scheduler::Scheduler;
    use trellis_core::{Node, ObjectRef};

    fn setup() -> Rc<Container> {
        Container::with_scheduler(RuntimeConfig::default(), Rc::new(Scheduler::manual()))
    }

    fn interpolation(c: &Rc<Container>, text: &str, node: &Node, prop: &str) -> Rc<InterpolationBinding> {
        let expr = c.parser().parse_interpolation(text).expect("parse").expect("has parts");
        InterpolationBinding::new(expr, Value::Node(node.clone()), prop, Rc::clone(c))
    }

    #[test]
    fn renders_every_part_and_tracks_each() {
        let c = setup();
        let vm = ObjectRef::from_pairs([("first", "Ada"), ("last", "Lovelace")]);
        let node = Node::text("");
        let b = interpolation(&c, "Hi ${first} ${last}!", &node, "textContent");
        b.bind(LifecycleFlags::NONE, &Scope::create(Value::Object(vm.clone()), None))
            .expect("bind");
        assert_eq!(node.text_content(), "Hi Ada Lovelace!");
        vm.set("last", "King");
        c.scheduler().drain_microtasks();
        assert_eq!(node.text_content(), "Hi Ada King!");
        assert_eq!(b.slots().len(), 2);
    }

    #[test]
    fn converter_doubles_and_updates() {
        let c = setup();
        c.register(Resource::converter("b", FnConverter::new(|v, _| Value::from(v.to_number() * 2.0))));
        let vm = ObjectRef::from_pairs([("a", 5)]);
        let node = Node::text("");
        let b = interpolation(&c, "${a|b}", &node, "textContent");
        b.bind(LifecycleFlags::NONE, &Scope::create(Value::Object(vm.clone()), None))
            .expect("bind");
        assert_eq!(node.text_content(), "10");
        vm.set("a", 6);
        c.scheduler().drain_microtasks();
        assert_eq!(node.text_content(), "12");
    }

    #[test]
    fn attribute_target() {
        let c = setup();
        let vm = ObjectRef::from_pairs([("kind", "primary")]);
        let node = Node::element("button");
        let b = interpolation(&c, "btn-${kind}", &node, "data-kind");
        b.bind(LifecycleFlags::NONE, &Scope::create(Value::Object(vm.clone()), None))
            .expect("bind");
        assert_eq!(node.get_attribute("data-kind").as_deref(), Some("btn-primary"));
        b.unbind(LifecycleFlags::NONE).expect("unbind");
        vm.set("kind", "danger");
        c.scheduler().drain_microtasks();
        assert_eq!(node.get_attribute("data-kind").as_deref(), Some("btn-primary"));
    }
}
