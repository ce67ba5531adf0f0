#![forbid(unsafe_code)]

//! Custom element controllers.
//!
//! A [`CustomElement`] pairs a view model (an [`ObjectRef`] from the
//! definition's factory) with a view rendered from the definition's
//! template. The element binds its view against its own view model, so
//! nothing from the enclosing scope leaks in except through bindable
//! properties set by the parent's instructions.
//!
//! # View-model hooks
//!
//! Optional function properties on the view model, called with the view
//! model as `this`:
//!
//! | Hook | When | A returned promise gates |
//! |------|------|--------------------------|
//! | `created` | after hydration | - |
//! | `binding` | before the view binds | the bind batch |
//! | `bound` | on the lifecycle's bound queue | - |
//! | `attaching` | before the view attaches | the attach batch |
//! | `attached` | on the attached queue, after mount | - |
//! | `detaching` | before the view detaches | the detach batch |
//! | `detached` | on the detached queue, after unmount | - |
//! | `unbinding` | before the view unbinds | the unbind batch |
//! | `unbound` | on the unbound queue | - |
//!
//! While bound, a change to a bindable property `p` calls `pChanged(new,
//! old)` when the view model defines it.
//!
//! # Failure Modes
//!
//! Hydrating an element that was not prepared, or hydrating twice, fails
//! with `HydrateWithoutPrepare`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{LifecycleFlags, Node, ObjectRef, PropertySubscriber, State, Value};

use crate::binding::Bindable;
use crate::container::Container;
use crate::error::{Error, LifecycleError, Result};
use crate::lifecycle::{Lifecycle, LifecycleHooks, Phase};
use crate::observation::PropertyObserver;
use crate::scope::Scope;
use crate::task::Task;
use crate::templating::{
    Attachable, ElementDefinition, MountTarget, RenderContext, RenderLocation, View, ViewFactory,
};

pub(crate) fn keep_first(first: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        first.get_or_insert(e);
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Calls optional function properties on a view model.
pub(crate) struct Hooks {
    view_model: ObjectRef,
    lifecycle: Rc<Lifecycle>,
}

impl Hooks {
    pub(crate) fn new(view_model: ObjectRef, lifecycle: Rc<Lifecycle>) -> Self {
        Self { view_model, lifecycle }
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.view_model.get_untracked(name).as_function().is_some()
    }

    pub(crate) fn call(&self, name: &str, args: &[Value]) -> Option<Value> {
        let hook = self.view_model.get_untracked(name);
        let function = hook.as_function()?;
        tracing::trace!(hook = name, "view-model hook");
        Some(function.call(&Value::Object(self.view_model.clone()), args))
    }

    /// Call `name`; a pending promise result gates `phase`.
    pub(crate) fn call_gated(&self, name: &str, phase: Phase) {
        if let Some(Value::Promise(promise)) = self.call(name, &[]) {
            if promise.is_pending() {
                self.lifecycle.register_task(phase, Task::from_promise(&promise));
            }
        }
    }
}

/// Calls `<property>Changed(new, old)` on a view model.
struct ChangeHandler {
    view_model: ObjectRef,
    callback: String,
    observer: Rc<dyn PropertyObserver>,
    active: Cell<bool>,
}

impl PropertySubscriber for ChangeHandler {
    fn handle_change(&self, new_value: &Value, previous: &Value, _flags: LifecycleFlags) {
        if !self.active.get() {
            return;
        }
        if let Some(function) = self.view_model.get_untracked(&self.callback).as_function() {
            function.call(
                &Value::Object(self.view_model.clone()),
                &[new_value.clone(), previous.clone()],
            );
        }
    }
}

// ---------------------------------------------------------------------------
// CustomElement
// ---------------------------------------------------------------------------

pub struct CustomElement {
    definition: Rc<ElementDefinition>,
    container: Rc<Container>,
    view_model: ObjectRef,
    hooks: Hooks,
    state: Cell<State>,
    view: RefCell<Option<Rc<View>>>,
    surrogates: RefCell<Vec<Rc<dyn Bindable>>>,
    surrogate_attachables: RefCell<Vec<Rc<dyn Attachable>>>,
    change_handlers: RefCell<Vec<Rc<ChangeHandler>>>,
    scope: RefCell<Option<Scope>>,
    self_ref: Weak<CustomElement>,
}

impl CustomElement {
    /// A new, unprepared element with a fresh view model.
    #[must_use]
    pub fn new(definition: Rc<ElementDefinition>, container: Rc<Container>) -> Rc<Self> {
        let view_model = definition.create_view_model();
        let hooks = Hooks::new(view_model.clone(), Rc::clone(container.lifecycle()));
        Rc::new_cyclic(|self_ref| Self {
            definition,
            container,
            view_model,
            hooks,
            state: Cell::new(State::NONE),
            view: RefCell::new(None),
            surrogates: RefCell::new(Vec::new()),
            surrogate_attachables: RefCell::new(Vec::new()),
            change_handlers: RefCell::new(Vec::new()),
            scope: RefCell::new(None),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    #[must_use]
    pub fn view_model(&self) -> &ObjectRef {
        &self.view_model
    }

    #[must_use]
    pub fn view(&self) -> Option<Rc<View>> {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state.get()
    }

    fn set(&self, flag: State, on: bool) {
        let mut state = self.state.get();
        state.set(flag, on);
        self.state.set(state);
    }

    pub fn prepare(&self) {
        self.set(State::IS_PREPARED, true);
    }

    /// Render the element's template for `host`. A containerless element
    /// replaces `host` with a render location.
    ///
    /// # Errors
    ///
    /// `HydrateWithoutPrepare` unless prepared and not yet hydrated; render
    /// failures otherwise.
    pub fn hydrate(&self, host: &Node) -> Result<()> {
        let state = self.state.get();
        if !state.contains(State::IS_PREPARED) || state.contains(State::IS_HYDRATED) {
            return Err(LifecycleError::HydrateWithoutPrepare {
                name: Rc::clone(self.definition.name()),
            }
            .into());
        }
        let definition = &self.definition.definition;
        let target = if definition.containerless {
            self.set(State::IS_CONTAINERLESS, true);
            MountTarget::Location(RenderLocation::replace(host))
        } else {
            MountTarget::Host(host.clone())
        };

        let factory = ViewFactory::new(Rc::clone(definition), Rc::clone(&self.container))?;
        let view = factory.create()?;
        view.hold(target);
        *self.view.borrow_mut() = Some(view);

        if !definition.containerless && !definition.surrogates.is_empty() {
            let mut bindables = Vec::new();
            let mut attachables = Vec::new();
            {
                let mut ctx = RenderContext::new(&self.container, &mut bindables, &mut attachables);
                let target = Value::Node(host.clone());
                for instruction in &definition.surrogates {
                    self.container
                        .renderer()
                        .render_instruction(&mut ctx, host, &target, instruction)?;
                }
            }
            *self.surrogates.borrow_mut() = bindables;
            *self.surrogate_attachables.borrow_mut() = attachables;
        }

        self.set(State::IS_PREPARED, false);
        self.set(State::IS_HYDRATED, true);
        tracing::debug!(element = %self.name(), containerless = definition.containerless, "element hydrated");
        self.hooks.call("created", &[]);
        Ok(())
    }

    fn watch_bindables(&self) -> Result<()> {
        let mut handlers = self.change_handlers.borrow_mut();
        if handlers.is_empty() {
            for property in &self.definition.definition.bindables {
                let callback = format!("{property}Changed");
                if !self.hooks.has(&callback) {
                    continue;
                }
                let observer = self
                    .container
                    .observer_locator()
                    .get_observer(&Value::Object(self.view_model.clone()), property)?;
                handlers.push(Rc::new(ChangeHandler {
                    view_model: self.view_model.clone(),
                    callback,
                    observer,
                    active: Cell::new(false),
                }));
            }
        }
        for handler in handlers.iter() {
            let weak: Weak<dyn PropertySubscriber> = Rc::downgrade(handler) as Weak<ChangeHandler>;
            handler.observer.subscribe(weak);
            handler.active.set(true);
        }
        Ok(())
    }

    fn unwatch_bindables(&self) {
        for handler in self.change_handlers.borrow().iter() {
            let weak: Weak<dyn PropertySubscriber> = Rc::downgrade(handler) as Weak<ChangeHandler>;
            handler.observer.unsubscribe(&weak);
            handler.active.set(false);
        }
    }

    fn hooks_target(&self) -> Option<Rc<dyn LifecycleHooks>> {
        self.self_ref.upgrade().map(|me| me as Rc<dyn LifecycleHooks>)
    }
}

impl Bindable for CustomElement {
    /// The element binds its view to its own view model; `_parent` only
    /// serves the bindings that target this element's properties.
    fn bind(&self, flags: LifecycleFlags, _parent: &Scope) -> Result<()> {
        if self.is_bound() {
            return Ok(());
        }
        let lifecycle = Rc::clone(self.container.lifecycle());
        lifecycle.begin_bind();
        self.set(State::IS_BINDING, true);
        self.hooks.call_gated("binding", Phase::Bind);

        let scope = Scope::create(Value::Object(self.view_model.clone()), None);
        *self.scope.borrow_mut() = Some(scope.clone());
        let mut first = None;
        keep_first(&mut first, self.watch_bindables());
        if let Some(view) = self.view() {
            keep_first(&mut first, view.bind(flags, &scope));
        }
        for surrogate in self.surrogates.borrow().iter() {
            keep_first(&mut first, surrogate.bind(flags | LifecycleFlags::FROM_BIND, &scope));
        }
        if self.hooks.has("bound") {
            if let Some(me) = self.hooks_target() {
                lifecycle.enqueue_bound(me);
            }
        }
        self.set(State::IS_BINDING, false);
        self.set(State::IS_BOUND, true);
        tracing::debug!(element = %self.name(), "element bound");
        let ended = lifecycle.end_bind(flags).map(drop);
        first.map_or(ended, Err)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        let lifecycle = Rc::clone(self.container.lifecycle());
        lifecycle.begin_unbind();
        self.set(State::IS_UNBINDING, true);
        self.hooks.call_gated("unbinding", Phase::Unbind);
        let mut first = None;
        for surrogate in self.surrogates.borrow().iter().rev() {
            keep_first(&mut first, surrogate.unbind(flags));
        }
        if let Some(view) = self.view() {
            keep_first(&mut first, view.unbind(flags));
        }
        self.unwatch_bindables();
        self.scope.borrow_mut().take();
        if self.hooks.has("unbound") {
            if let Some(me) = self.hooks_target() {
                lifecycle.enqueue_unbound(me);
            }
        }
        self.set(State::IS_UNBINDING | State::IS_BOUND, false);
        tracing::debug!(element = %self.name(), "element unbound");
        let ended = lifecycle.end_unbind(flags).map(drop);
        first.map_or(ended, Err)
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl Attachable for CustomElement {
    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        if self.state.get().contains(State::IS_ATTACHED) {
            return Ok(());
        }
        let lifecycle = Rc::clone(self.container.lifecycle());
        lifecycle.begin_attach();
        self.set(State::IS_ATTACHING, true);
        self.hooks.call_gated("attaching", Phase::Attach);
        let mut first = None;
        if let Some(view) = self.view() {
            keep_first(&mut first, view.attach(flags));
        }
        for attachable in self.surrogate_attachables.borrow().iter() {
            keep_first(&mut first, attachable.attach(flags));
        }
        if self.hooks.has("attached") {
            if let Some(me) = self.hooks_target() {
                lifecycle.enqueue_attached(me);
            }
        }
        self.set(State::IS_ATTACHING, false);
        self.set(State::IS_ATTACHED, true);
        let ended = lifecycle.end_attach(flags).map(drop);
        first.map_or(ended, Err)
    }

    fn detach(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.state.get().contains(State::IS_ATTACHED) {
            return Ok(());
        }
        let lifecycle = Rc::clone(self.container.lifecycle());
        lifecycle.begin_detach();
        self.set(State::IS_DETACHING, true);
        self.hooks.call_gated("detaching", Phase::Detach);
        let mut first = None;
        for attachable in self.surrogate_attachables.borrow().iter().rev() {
            keep_first(&mut first, attachable.detach(flags));
        }
        if let Some(view) = self.view() {
            keep_first(&mut first, view.detach(flags));
        }
        if self.hooks.has("detached") {
            if let Some(me) = self.hooks_target() {
                lifecycle.enqueue_detached(me);
            }
        }
        self.set(State::IS_DETACHING | State::IS_ATTACHED, false);
        let ended = lifecycle.end_detach(flags).map(drop);
        first.map_or(ended, Err)
    }

    fn cache(&self, flags: LifecycleFlags) {
        if let Some(view) = self.view() {
            view.cache(flags);
        }
    }
}

impl LifecycleHooks for CustomElement {
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

impl fmt::Debug for CustomElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomElement")
            .field("name", &self.name())
            .field("state", &self.state.get())
            .field("view", &self.view.borrow())
            .finish_non_exhaustive()
    }
}
