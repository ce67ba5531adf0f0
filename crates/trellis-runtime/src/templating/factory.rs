#![forbid(unsafe_code)]

//! Produces views from a template definition, pooling released ones.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::{RenderContext, TemplateDefinition, View};
use crate::config::CacheSize;
use crate::container::Container;
use crate::error::{LifecycleError, Result};
use crate::templating::NodeSequence;

pub struct ViewFactory {
    definition: Rc<TemplateDefinition>,
    container: Rc<Container>,
    /// `None` until set; reads fall back to the container default.
    cache_size: Cell<Option<CacheSize>>,
    pool: RefCell<Vec<Rc<View>>>,
    self_ref: Weak<ViewFactory>,
}

impl ViewFactory {
    /// A factory for `definition`, rendering with `container`'s resources.
    ///
    /// # Errors
    ///
    /// `FactoryNameRequired` if the definition has no name.
    pub fn new(definition: Rc<TemplateDefinition>, container: Rc<Container>) -> Result<Rc<Self>> {
        if definition.name.is_empty() {
            return Err(LifecycleError::FactoryNameRequired.into());
        }
        let cache = definition.cache;
        let factory = Rc::new_cyclic(|self_ref| Self {
            definition,
            container,
            cache_size: Cell::new(None),
            pool: RefCell::new(Vec::new()),
            self_ref: self_ref.clone(),
        });
        if let Some(size) = cache {
            factory.set_cache_size(size, true);
        }
        Ok(factory)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    #[must_use]
    pub fn definition(&self) -> &Rc<TemplateDefinition> {
        &self.definition
    }

    #[must_use]
    pub fn container(&self) -> &Rc<Container> {
        &self.container
    }

    #[must_use]
    pub fn cache_size(&self) -> CacheSize {
        self.cache_size
            .get()
            .unwrap_or(self.container.config().default_view_cache)
    }

    /// With `do_not_override`, an explicitly set size is kept.
    pub fn set_cache_size(&self, size: CacheSize, do_not_override: bool) {
        if do_not_override && self.cache_size.get().is_some() {
            return;
        }
        self.cache_size.set(Some(size));
        let mut pool = self.pool.borrow_mut();
        while !pool.is_empty() && !size.admits(pool.len() - 1) {
            pool.pop();
        }
    }

    #[must_use]
    pub fn pooled(&self) -> usize {
        self.pool.borrow().len()
    }

    /// Add `view` to the pool if there is room.
    pub fn try_return_to_cache(&self, view: &Rc<View>) -> bool {
        let mut pool = self.pool.borrow_mut();
        if !self.cache_size().admits(pool.len()) || pool.iter().any(|v| Rc::ptr_eq(v, view)) {
            return false;
        }
        view.set_cached(true);
        pool.push(Rc::clone(view));
        true
    }

    /// A pooled view if one is available, otherwise a freshly rendered one.
    ///
    /// # Errors
    ///
    /// Whatever rendering the template's instructions fails with.
    pub fn create(&self) -> Result<Rc<View>> {
        if let Some(view) = self.pool.borrow_mut().pop() {
            view.set_cached(false);
            tracing::trace!(factory = %self.definition.name, "view taken from pool");
            return Ok(view);
        }
        let fragment = self.definition.template.clone_node(true);
        let mut bindables = Vec::new();
        let mut attachables = Vec::new();
        {
            let mut ctx = RenderContext::new(&self.container, &mut bindables, &mut attachables);
            self.container
                .renderer()
                .render(&mut ctx, &fragment, &self.definition.instructions)?;
        }
        tracing::trace!(
            factory = %self.definition.name,
            bindables = bindables.len(),
            attachables = attachables.len(),
            "view rendered"
        );
        Ok(View::new(
            self.self_ref.clone(),
            Rc::clone(self.container.lifecycle()),
            NodeSequence::from_fragment(fragment),
            bindables,
            attachables,
        ))
    }
}

impl fmt::Debug for ViewFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewFactory")
            .field("name", &self.definition.name)
            .field("cache_size", &self.cache_size())
            .field("pooled", &self.pooled())
            .finish()
    }
}
