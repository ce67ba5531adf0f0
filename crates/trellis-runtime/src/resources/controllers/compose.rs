#![forbid(unsafe_code)]

//! `compose`: shows whatever `subject` resolves to.
//!
//! | Subject | Shown |
//! |---------|-------|
//! | `TemplateDefinition` (opaque) | a view rendered from it |
//! | `ViewFactory` (opaque) | a view from the factory |
//! | `View` (opaque) | the view itself |
//! | `ElementDefinition` (opaque) | the element, registered in a child container |
//! | string | the registered custom element of that name |
//! | promise of any of the above | the settled value, once it settles |
//! | `undefined` / `null` | nothing |
//!
//! # Swaps
//!
//! A swap detaches and unbinds the previous view, then binds and attaches
//! the next one, each step waiting for the lifecycle task of the previous
//! one. At most one subject waits behind an in-flight swap; a newer one
//! replaces it. While a promise subject is still unsettled its swap is
//! cancelled outright. Once the view exchange has started it runs to
//! completion, and its completion starts the waiting subject.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{LifecycleFlags, Node, ObjectRef, PropertySubscriber, Settlement, Value};

use super::ControllerBase;
use crate::binding::Bindable;
use crate::container::Container;
use crate::error::{LifecycleError, Result};
use crate::observation::PropertyObserver;
use crate::resources::Resource;
use crate::scope::Scope;
use crate::task::Task;
use crate::templating::{
    Attachable, AttributeContext, AttributeController, ElementDefinition, Instruction, MountTarget,
    TemplateDefinition, View, ViewFactory,
};

pub struct Compose {
    base: ControllerBase,
    view_model: ObjectRef,
    observer: Rc<dyn PropertyObserver>,
    current: RefCell<Option<Rc<View>>>,
    task: RefCell<Task>,
    pending: RefCell<Option<Value>>,
    self_ref: Weak<Compose>,
}

impl Compose {
    pub(crate) fn create(ctx: AttributeContext<'_>) -> Result<Rc<dyn AttributeController>> {
        let base = ControllerBase::new("compose", &ctx)?;
        let view_model = ObjectRef::new();
        let observer = base.observe(&view_model, "subject")?;
        Ok(Rc::new_cyclic(|self_ref| Self {
            base,
            view_model,
            observer,
            current: RefCell::new(None),
            task: RefCell::new(Task::completed()),
            pending: RefCell::new(None),
            self_ref: self_ref.clone(),
        }))
    }

    /// The view currently shown, if any.
    #[must_use]
    pub fn current_view(&self) -> Option<Rc<View>> {
        self.current.borrow().clone()
    }

    /// The in-flight swap, or a completed task when idle.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task.borrow().clone()
    }

    /// Whether a subject is waiting behind the in-flight swap.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    fn compose(&self, subject: Value, flags: LifecycleFlags) {
        let in_flight = self.task();
        if in_flight.done() || in_flight.is_cancelled() {
            self.start(subject, flags);
            return;
        }
        *self.pending.borrow_mut() = Some(subject);
        if in_flight.cancel() {
            tracing::debug!("stale composition cancelled");
            self.on_swap_complete(flags);
        }
    }

    fn on_swap_complete(&self, flags: LifecycleFlags) {
        let next = self.pending.borrow_mut().take();
        if let Some(next) = next {
            self.compose(next, flags);
        }
    }

    fn start(&self, subject: Value, flags: LifecycleFlags) {
        let Value::Promise(promise) = subject else {
            self.swap(&subject, flags);
            return;
        };
        let waiting = Task::from_promise(&promise);
        *self.task.borrow_mut() = waiting.clone();
        let me = self.self_ref.clone();
        waiting.on_complete(move || {
            let Some(me) = me.upgrade() else {
                return;
            };
            let subject = match promise.settlement() {
                Some(Settlement::Fulfilled(value)) => value,
                Some(Settlement::Rejected(reason)) => {
                    tracing::warn!(reason = %reason.to_display_string(), "composition subject rejected");
                    Value::Undefined
                }
                None => Value::Undefined,
            };
            me.swap(&subject, flags);
        });
    }

    fn swap(&self, subject: &Value, flags: LifecycleFlags) {
        let next = self.resolve(subject).unwrap_or_else(|error| {
            tracing::error!(%error, code = error.code(), "composition failed");
            None
        });
        let previous = self.current.replace(next.clone());
        let done = Task::pending();
        *self.task.borrow_mut() = done.clone();
        tracing::debug!(
            from = previous.is_some(),
            to = next.is_some(),
            "compose swaps view"
        );

        let lifecycle = Rc::clone(self.base.container().lifecycle());
        let detached = match &previous {
            Some(view) if view.is_attached() => {
                lifecycle.begin_detach();
                log_failure(view.detach(flags), "detach");
                lifecycle.end_detach(flags).unwrap_or_else(|error| {
                    tracing::error!(%error, "compose detach failed");
                    Task::completed()
                })
            }
            _ => Task::completed(),
        };
        let me = self.self_ref.clone();
        let swapped = detached.then(move || match me.upgrade() {
            Some(me) => me.show(previous, next, flags),
            None => Task::completed(),
        });
        let me = self.self_ref.clone();
        swapped.on_complete(move || {
            done.complete();
            if let Some(me) = me.upgrade() {
                me.on_swap_complete(flags);
            }
        });
    }

    /// Retire `previous` and bring in `next`, returning the attach task.
    fn show(&self, previous: Option<Rc<View>>, next: Option<Rc<View>>, flags: LifecycleFlags) -> Task {
        if let Some(view) = previous {
            log_failure(view.unbind(flags), "unbind");
            view.release();
        }
        let (Some(view), Some(scope)) = (next, self.base.scope()) else {
            return Task::completed();
        };
        let lifecycle = Rc::clone(self.base.container().lifecycle());
        view.hold(MountTarget::Location(self.base.location().clone()));
        lifecycle.begin_bind();
        log_failure(view.bind(flags, &scope), "bind");
        let bound = lifecycle.end_bind(flags).unwrap_or_else(|error| {
            tracing::error!(%error, "compose bind failed");
            Task::completed()
        });
        let me = self.self_ref.clone();
        bound.then(move || {
            let Some(me) = me.upgrade() else {
                return Task::completed();
            };
            if !me.base.is_attached() {
                return Task::completed();
            }
            let lifecycle = me.base.container().lifecycle();
            lifecycle.begin_attach();
            log_failure(view.attach(flags), "attach");
            lifecycle.end_attach(flags).unwrap_or_else(|error| {
                tracing::error!(%error, "compose attach failed");
                Task::completed()
            })
        })
    }

    fn resolve(&self, subject: &Value) -> Result<Option<Rc<View>>> {
        let container = self.base.container();
        let view = match subject {
            Value::Undefined | Value::Null => return Ok(None),
            Value::String(name) => {
                if container.find_element(name).is_none() {
                    return Err(LifecycleError::ResourceNotFound { name: Rc::clone(name) }.into());
                }
                element_view(name, container)?
            }
            Value::Opaque(_) => {
                if let Some(view) = subject.downcast_opaque::<View>() {
                    view
                } else if let Some(factory) = subject.downcast_opaque::<ViewFactory>() {
                    factory.create()?
                } else if let Some(definition) = subject.downcast_opaque::<TemplateDefinition>() {
                    ViewFactory::new(definition, Rc::clone(container))?.create()?
                } else if let Some(element) = subject.downcast_opaque::<ElementDefinition>() {
                    let child = container.child();
                    child.register(Resource::Element(Rc::clone(&element)));
                    element_view(element.name(), &child)?
                } else {
                    tracing::warn!(subject = %subject.to_display_string(), "nothing to compose");
                    return Ok(None);
                }
            }
            other => {
                tracing::warn!(subject = %other.to_display_string(), "nothing to compose");
                return Ok(None);
            }
        };
        Ok(Some(view))
    }
}

/// A one-element view hydrating the custom element `name`.
fn element_view(name: &str, container: &Rc<Container>) -> Result<Rc<View>> {
    let template = Node::fragment();
    let host = Node::element(name);
    host.add_class("au");
    template.append_child(&host);
    let definition = TemplateDefinition::new(name, template)
        .with_instructions(vec![vec![Instruction::element(name, Vec::new())]]);
    ViewFactory::new(Rc::new(definition), Rc::clone(container))?.create()
}

fn log_failure(result: Result<()>, step: &'static str) {
    if let Err(error) = result {
        tracing::error!(%error, step, "compose step failed");
    }
}

impl PropertySubscriber for Compose {
    fn handle_change(&self, new_value: &Value, _: &Value, flags: LifecycleFlags) {
        if self.base.is_bound() {
            self.compose(new_value.clone(), flags);
        }
    }
}

impl Bindable for Compose {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if !self.base.enter(scope) {
            return Ok(());
        }
        let subscriber: Weak<dyn PropertySubscriber> = self.self_ref.clone();
        self.observer.subscribe(subscriber);
        match self.current_view() {
            Some(view) => view.bind(flags, scope),
            None => {
                self.compose(self.observer.get_value(), flags);
                Ok(())
            }
        }
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.base.leave() {
            return Ok(());
        }
        let subscriber: Weak<dyn PropertySubscriber> = self.self_ref.clone();
        self.observer.unsubscribe(&subscriber);
        self.pending.borrow_mut().take();
        self.task().cancel();
        match self.current_view() {
            Some(view) => view.unbind(flags),
            None => Ok(()),
        }
    }

    fn is_bound(&self) -> bool {
        self.base.is_bound()
    }
}

impl Attachable for Compose {
    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        self.base.set_attached(true);
        match self.current_view() {
            Some(view) if view.is_bound() => view.attach(flags),
            _ => Ok(()),
        }
    }

    fn detach(&self, flags: LifecycleFlags) -> Result<()> {
        self.base.set_attached(false);
        match self.current_view() {
            Some(view) => view.detach(flags),
            None => Ok(()),
        }
    }
}

impl AttributeController for Compose {
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

impl fmt::Debug for Compose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compose")
            .field("base", &self.base)
            .field("task", &self.task.borrow())
            .field("pending", &self.has_pending())
            .finish_non_exhaustive()
    }
}
