#![forbid(unsafe_code)]

//! Application bootstrap.
//!
//! ```text
//! App::new(config) -> register(resources) -> app(AppTarget) -> start() ... stop()
//! ```
//!
//! `start` hydrates the root component into its host on first use, binds
//! it with `FROM_START` and attaches it once the bind batch (including any
//! async `binding` gates) has completed. `stop` detaches and unbinds with
//! `FROM_STOP`, so every view unmounts itself and the app can be started
//! again.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use trellis_core::{LifecycleFlags, Node, Value};

use crate::binding::Bindable;
use crate::config::RuntimeConfig;
use crate::container::Container;
use crate::element::{CustomElement, keep_first};
use crate::error::{LifecycleError, Result};
use crate::lifecycle::{Lifecycle, Phase};
use crate::resources::Resource;
use crate::scope::Scope;
use crate::task::Task;
use crate::templating::{Attachable, ElementDefinition};

/// The root component and the node it renders into.
#[derive(Clone)]
pub struct AppTarget {
    pub host: Node,
    pub component: Rc<ElementDefinition>,
}

impl AppTarget {
    #[must_use]
    pub fn new(host: Node, component: ElementDefinition) -> Self {
        Self {
            host,
            component: Rc::new(component),
        }
    }
}

impl fmt::Debug for AppTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppTarget")
            .field("host", &self.host)
            .field("component", &self.component.name())
            .finish()
    }
}

pub struct App {
    container: Rc<Container>,
    target: RefCell<Option<AppTarget>>,
    root: RefCell<Option<Rc<CustomElement>>>,
}

impl App {
    /// An app on a fresh root container using the system clock.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_container(Container::new(config))
    }

    #[must_use]
    pub fn with_container(container: Rc<Container>) -> Self {
        Self {
            container,
            target: RefCell::new(None),
            root: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn container(&self) -> &Rc<Container> {
        &self.container
    }

    pub fn register(&self, resource: Resource) -> &Self {
        self.container.register(resource);
        self
    }

    /// Set the root component. Takes effect on the next start after the
    /// current root, if any, was stopped.
    pub fn app(&self, target: AppTarget) -> &Self {
        *self.target.borrow_mut() = Some(target);
        self.root.borrow_mut().take();
        self
    }

    /// The hydrated root element, once started.
    #[must_use]
    pub fn root(&self) -> Option<Rc<CustomElement>> {
        self.root.borrow().clone()
    }

    fn hydrated_root(&self) -> Result<Rc<CustomElement>> {
        if let Some(root) = self.root() {
            return Ok(root);
        }
        let Some(target) = self.target.borrow().clone() else {
            return Err(LifecycleError::NoRoot.into());
        };
        let root = CustomElement::new(Rc::clone(&target.component), Rc::clone(&self.container));
        root.prepare();
        root.hydrate(&target.host)?;
        *self.root.borrow_mut() = Some(Rc::clone(&root));
        Ok(root)
    }

    /// Bind and attach the root component. The returned task completes
    /// once it is attached.
    ///
    /// # Errors
    ///
    /// `NoRoot` without a target; hydration and synchronous bind or attach
    /// failures.
    pub fn start(&self) -> Result<Task> {
        let _span = tracing::info_span!("app_start").entered();
        let root = self.hydrated_root()?;
        let flags = LifecycleFlags::FROM_START;
        let lifecycle = Rc::clone(self.container.lifecycle());
        let scope = Scope::create(Value::Object(root.view_model().clone()), None);
        let bound = batch(&lifecycle, Phase::Bind, flags, || root.bind(flags, &scope))?;
        if bound.done() {
            let attached = batch(&lifecycle, Phase::Attach, flags, || root.attach(flags))?;
            tracing::info!(root = %root.name(), pending = !attached.done(), "app started");
            return Ok(attached);
        }
        tracing::info!(root = %root.name(), "app start waits on binding");
        Ok(bound.then(move || {
            batch(&lifecycle, Phase::Attach, flags, || root.attach(flags)).unwrap_or_else(|error| {
                tracing::error!(%error, "deferred attach failed");
                Task::completed()
            })
        }))
    }

    /// Detach and unbind the root component. The returned task completes
    /// once it is unbound.
    ///
    /// # Errors
    ///
    /// Synchronous detach or unbind failures.
    pub fn stop(&self) -> Result<Task> {
        let _span = tracing::info_span!("app_stop").entered();
        let Some(root) = self.root() else {
            return Ok(Task::completed());
        };
        let flags = LifecycleFlags::FROM_STOP;
        let lifecycle = Rc::clone(self.container.lifecycle());
        let detached = batch(&lifecycle, Phase::Detach, flags, || root.detach(flags))?;
        if detached.done() {
            let unbound = batch(&lifecycle, Phase::Unbind, flags, || root.unbind(flags))?;
            tracing::info!(root = %root.name(), "app stopped");
            return Ok(unbound);
        }
        Ok(detached.then(move || {
            batch(&lifecycle, Phase::Unbind, flags, || root.unbind(flags)).unwrap_or_else(|error| {
                tracing::error!(%error, "deferred unbind failed");
                Task::completed()
            })
        }))
    }
}

/// Run `body` inside one batch of `phase`. The batch is closed even when
/// `body` fails; its error wins over the closing error.
fn batch(
    lifecycle: &Lifecycle,
    phase: Phase,
    flags: LifecycleFlags,
    body: impl FnOnce() -> Result<()>,
) -> Result<Task> {
    let (begin, end): (fn(&Lifecycle), fn(&Lifecycle, LifecycleFlags) -> Result<Task>) = match phase {
        Phase::Bind => (Lifecycle::begin_bind, Lifecycle::end_bind),
        Phase::Attach => (Lifecycle::begin_attach, Lifecycle::end_attach),
        Phase::Detach => (Lifecycle::begin_detach, Lifecycle::end_detach),
        Phase::Unbind => (Lifecycle::begin_unbind, Lifecycle::end_unbind),
    };
    begin(lifecycle);
    let mut first = None;
    keep_first(&mut first, body());
    let ended = end(lifecycle, flags);
    match first {
        Some(error) => Err(error),
        None => ended,
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("target", &self.target.borrow())
            .field("started", &self.root().is_some_and(|r| r.is_bound()))
            .finish()
    }
}
