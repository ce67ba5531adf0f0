#![forbid(unsafe_code)]

//! A rendered template instance.
//!
//! # Invariants
//!
//! 1. Bind and unbind are wrapped in the lifecycle's begin/end pair, so
//!    `bound`/`unbound` hooks of everything inside fire once, after the
//!    outermost view finishes.
//! 2. Mounting happens on the lifecycle's mount queue, after every child
//!    attachable has attached.
//! 3. A view whose parent already queued an unmount in the same detach
//!    batch does not queue its own, unless the detach comes from a stop.
//!
//! # Failure Modes
//!
//! Attaching a view held at a location whose anchor has no parent fails
//! with `UnboundLocation`. Errors from children are returned after the
//! lifecycle batch has been closed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{LifecycleFlags, Node, State};

use super::{Attachable, NodeSequence, RenderLocation, ViewFactory};
use crate::binding::Bindable;
use crate::error::{Error, LifecycleError, Result};
use crate::lifecycle::{Lifecycle, Mountable};
use crate::scope::Scope;

/// Where a view's nodes go when it mounts.
#[derive(Debug, Clone, Default)]
pub enum MountTarget {
    #[default]
    None,
    /// Before the location's end comment.
    Location(RenderLocation),
    /// Appended to a host element.
    Host(Node),
}

pub struct View {
    factory: Weak<ViewFactory>,
    lifecycle: Rc<Lifecycle>,
    nodes: NodeSequence,
    bindables: Vec<Rc<dyn Bindable>>,
    attachables: Vec<Rc<dyn Attachable>>,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
    target: RefCell<MountTarget>,
    self_ref: Weak<View>,
}

fn keep_first(first: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        first.get_or_insert(e);
    }
}

impl View {
    #[must_use]
    pub fn new(
        factory: Weak<ViewFactory>,
        lifecycle: Rc<Lifecycle>,
        nodes: NodeSequence,
        bindables: Vec<Rc<dyn Bindable>>,
        attachables: Vec<Rc<dyn Attachable>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            factory,
            lifecycle,
            nodes,
            bindables,
            attachables,
            state: Cell::new(State::NONE),
            scope: RefCell::new(None),
            target: RefCell::new(MountTarget::None),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state.get()
    }

    #[must_use]
    pub fn nodes(&self) -> &NodeSequence {
        &self.nodes
    }

    #[must_use]
    pub fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    #[must_use]
    pub fn factory(&self) -> Option<Rc<ViewFactory>> {
        self.factory.upgrade()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state.get().contains(State::IS_ATTACHED)
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.state.get().contains(State::IS_MOUNTED)
    }

    /// Text of the view's own nodes, mounted or not.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.nodes
            .nodes()
            .iter()
            .filter(|n| !n.is_comment())
            .map(Node::text_content)
            .collect()
    }

    /// Choose where the nodes go on the next mount.
    pub fn hold(&self, target: MountTarget) {
        *self.target.borrow_mut() = target;
    }

    /// Move mounted nodes before `anchor` without a detach cycle.
    pub fn move_before(&self, anchor: &Node) {
        if self.is_mounted() {
            self.nodes.insert_before(anchor);
        }
    }

    /// Offer the view back to its factory's pool. Returns `false` if the
    /// pool is full or gone.
    pub fn release(&self) -> bool {
        let (Some(factory), Some(me)) = (self.factory.upgrade(), self.self_ref.upgrade()) else {
            return false;
        };
        if !factory.try_return_to_cache(&me) {
            return false;
        }
        self.nodes.remove();
        self.set(State::IS_MOUNTED, false);
        for attachable in &self.attachables {
            attachable.cache(LifecycleFlags::NONE);
        }
        true
    }

    pub(crate) fn set_cached(&self, cached: bool) {
        self.set(State::IS_CACHED, cached);
    }

    fn set(&self, flag: State, on: bool) {
        let mut state = self.state.get();
        state.set(flag, on);
        self.state.set(state);
    }

    fn check_location(&self) -> Result<()> {
        if let MountTarget::Location(location) = &*self.target.borrow() {
            if !location.is_connected() {
                return Err(LifecycleError::UnboundLocation.into());
            }
        }
        Ok(())
    }
}

impl Bindable for View {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope)) {
                return Ok(());
            }
            self.unbind(flags | LifecycleFlags::FROM_BIND)?;
        }
        self.lifecycle.begin_bind();
        self.set(State::IS_BINDING, true);
        *self.scope.borrow_mut() = Some(scope.clone());
        let mut first = None;
        for bindable in &self.bindables {
            keep_first(&mut first, bindable.bind(flags | LifecycleFlags::FROM_BIND, scope));
        }
        self.set(State::IS_BINDING, false);
        self.set(State::IS_BOUND, true);
        let ended = self.lifecycle.end_bind(flags).map(drop);
        first.map_or(ended, Err)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.lifecycle.begin_unbind();
        self.set(State::IS_UNBINDING, true);
        let mut first = None;
        for bindable in self.bindables.iter().rev() {
            keep_first(&mut first, bindable.unbind(flags | LifecycleFlags::FROM_UNBIND));
        }
        self.scope.borrow_mut().take();
        self.set(State::IS_UNBINDING | State::IS_BOUND, false);
        let ended = self.lifecycle.end_unbind(flags).map(drop);
        first.map_or(ended, Err)
    }

    fn is_bound(&self) -> bool {
        self.state.get().contains(State::IS_BOUND)
    }
}

impl Attachable for View {
    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        if self.is_attached() {
            return Ok(());
        }
        self.check_location()?;
        self.lifecycle.begin_attach();
        self.set(State::IS_ATTACHING, true);
        let mut first = None;
        for attachable in &self.attachables {
            keep_first(&mut first, attachable.attach(flags));
        }
        if !self.is_mounted() {
            if let Some(me) = self.self_ref.upgrade() {
                self.lifecycle.enqueue_mount(me);
            }
        }
        self.set(State::IS_ATTACHING, false);
        self.set(State::IS_ATTACHED, true);
        let ended = self.lifecycle.end_attach(flags).map(drop);
        first.map_or(ended, Err)
    }

    fn detach(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.is_attached() {
            return Ok(());
        }
        self.lifecycle.begin_detach();
        self.set(State::IS_DETACHING, true);
        let parent_queued =
            flags.contains(LifecycleFlags::PARENT_UNMOUNT_QUEUED) && !flags.contains(LifecycleFlags::FROM_STOP);
        if self.is_mounted() && !parent_queued {
            if let Some(me) = self.self_ref.upgrade() {
                self.lifecycle.enqueue_unmount(me);
            }
        }
        let mut first = None;
        for attachable in self.attachables.iter().rev() {
            keep_first(&mut first, attachable.detach(flags | LifecycleFlags::PARENT_UNMOUNT_QUEUED));
        }
        self.set(State::IS_DETACHING | State::IS_ATTACHED, false);
        let ended = self.lifecycle.end_detach(flags).map(drop);
        first.map_or(ended, Err)
    }

    fn cache(&self, flags: LifecycleFlags) {
        for attachable in &self.attachables {
            attachable.cache(flags);
        }
    }
}

impl Mountable for View {
    fn mount(&self, _flags: LifecycleFlags) {
        match &*self.target.borrow() {
            MountTarget::Location(location) => self.nodes.insert_before(location.anchor()),
            MountTarget::Host(host) => self.nodes.append_to(host),
            MountTarget::None => return,
        }
        self.set(State::IS_MOUNTED, true);
    }

    fn unmount(&self, _flags: LifecycleFlags) -> bool {
        if !self.is_mounted() {
            return false;
        }
        self.nodes.remove();
        self.set(State::IS_MOUNTED, false);
        true
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("state", &self.state.get())
            .field("bindables", &self.bindables.len())
            .field("attachables", &self.attachables.len())
            .field("nodes", &self.nodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSize, RuntimeConfig};
    use crate::container::Container;
    use crate::scheduler::Scheduler;
    use crate::templating::definition::marker;
    use crate::templating::{Instruction, TemplateDefinition};
    use trellis_core::{ObjectRef, Value};

    fn factory(cache: CacheSize) -> (Rc<Container>, Rc<ViewFactory>) {
        let c = Container::with_scheduler(RuntimeConfig::default(), Rc::new(Scheduler::manual()));
        let template = Node::fragment();
        template.append_child(&marker());
        let def = TemplateDefinition::new("greeting", template)
            .with_instructions(vec![vec![Instruction::text("hi ${name}")]])
            .with_cache(cache);
        let f = ViewFactory::new(Rc::new(def), Rc::clone(&c)).expect("factory");
        (c, f)
    }

    fn host_location() -> (Node, RenderLocation) {
        let host = Node::element("div");
        let m = Node::element("au-m");
        host.append_child(&m);
        (host, RenderLocation::replace(&m))
    }

    #[test]
    fn full_lifecycle_at_a_location() {
        let (c, f) = factory(CacheSize::None);
        let (host, location) = host_location();
        let view = f.create().expect("create");
        view.hold(MountTarget::Location(location));
        let vm = ObjectRef::from_pairs([("name", "Ada")]);
        view.bind(LifecycleFlags::NONE, &Scope::create(Value::Object(vm.clone()), None))
            .expect("bind");
        view.attach(LifecycleFlags::NONE).expect("attach");
        assert!(view.is_mounted());
        assert_eq!(host.text_content(), "hi Ada");

        vm.set("name", "Grace");
        c.scheduler().drain_microtasks();
        assert_eq!(host.text_content(), "hi Grace");

        view.detach(LifecycleFlags::NONE).expect("detach");
        view.unbind(LifecycleFlags::NONE).expect("unbind");
        assert!(!view.is_mounted());
        assert_eq!(host.text_content(), "");
        assert_eq!(view.text_content(), "hi Grace");
    }

    #[test]
    fn attach_at_detached_location_fails() {
        let (_, f) = factory(CacheSize::None);
        let view = f.create().expect("create");
        view.hold(MountTarget::Location(RenderLocation::new()));
        let err = view.attach(LifecycleFlags::NONE).expect_err("no parent");
        assert_eq!(err.code(), "TRL-301");
        assert!(!view.is_attached());
    }

    #[test]
    fn parent_queued_unmount_skips_own_unless_stopping() {
        let (_, f) = factory(CacheSize::None);
        let (_host, location) = host_location();
        let view = f.create().expect("create");
        view.hold(MountTarget::Location(location));
        view.attach(LifecycleFlags::NONE).expect("attach");
        view.detach(LifecycleFlags::PARENT_UNMOUNT_QUEUED).expect("detach");
        assert!(view.is_mounted(), "nodes travel with the parent");

        view.attach(LifecycleFlags::NONE).expect("attach");
        view.detach(LifecycleFlags::PARENT_UNMOUNT_QUEUED | LifecycleFlags::FROM_STOP)
            .expect("detach");
        assert!(!view.is_mounted());
    }

    #[test]
    fn released_view_is_reused() {
        let (_, f) = factory(CacheSize::Bounded(1));
        let first = f.create().expect("create");
        let second = f.create().expect("create");
        assert!(first.release());
        assert!(first.state().contains(State::IS_CACHED));
        assert!(!second.release(), "pool holds one");
        let again = f.create().expect("create");
        assert!(Rc::ptr_eq(&first, &again));
        assert!(!again.state().contains(State::IS_CACHED));
    }
}
