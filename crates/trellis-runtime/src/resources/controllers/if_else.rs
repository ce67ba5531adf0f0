#![forbid(unsafe_code)]

//! `if` / `else`.
//!
//! `If` shows the view of its own template while `value` is truthy and the
//! view of a linked `Else` otherwise. Changes to `value` are applied on the
//! next flush, so rapid toggles within one turn cost a single swap. Each
//! branch keeps its view once created.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{LifecycleFlags, ObjectRef, PropertySubscriber, Value};

use super::{ControllerBase, same_view};
use crate::binding::Bindable;
use crate::error::Result;
use crate::lifecycle::Flushable;
use crate::observation::PropertyObserver;
use crate::scope::Scope;
use crate::templating::{Attachable, AttributeContext, AttributeController, View, ViewFactory};

pub struct If {
    base: ControllerBase,
    view_model: ObjectRef,
    observer: Rc<dyn PropertyObserver>,
    else_factory: RefCell<Option<Rc<ViewFactory>>>,
    if_view: RefCell<Option<Rc<View>>>,
    else_view: RefCell<Option<Rc<View>>>,
    current: RefCell<Option<Rc<View>>>,
    queued: Cell<bool>,
    self_ref: Weak<If>,
}

impl If {
    pub(crate) fn create(ctx: AttributeContext<'_>) -> Result<Rc<dyn AttributeController>> {
        let base = ControllerBase::new("if", &ctx)?;
        let view_model = ObjectRef::new();
        view_model.set("value", false);
        let observer = base.observe(&view_model, "value")?;
        Ok(Rc::new_cyclic(|self_ref| Self {
            base,
            view_model,
            observer,
            else_factory: RefCell::new(None),
            if_view: RefCell::new(None),
            else_view: RefCell::new(None),
            current: RefCell::new(None),
            queued: Cell::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    /// The view currently shown, if any.
    #[must_use]
    pub fn current_view(&self) -> Option<Rc<View>> {
        self.current.borrow().clone()
    }

    #[must_use]
    pub fn has_else(&self) -> bool {
        self.else_factory.borrow().is_some()
    }

    fn link_else(&self, factory: Rc<ViewFactory>) {
        *self.else_factory.borrow_mut() = Some(factory);
    }

    fn subscriber(&self) -> Weak<dyn PropertySubscriber> {
        self.self_ref.clone()
    }

    /// The view for a branch, created on first use.
    fn branch(&self, condition: bool) -> Result<Option<Rc<View>>> {
        let (slot, factory) = if condition {
            (&self.if_view, Some(Rc::clone(self.base.factory())))
        } else {
            (&self.else_view, self.else_factory.borrow().clone())
        };
        if let Some(view) = slot.borrow().as_ref() {
            return Ok(Some(Rc::clone(view)));
        }
        let Some(factory) = factory else {
            return Ok(None);
        };
        let view = factory.create()?;
        *slot.borrow_mut() = Some(Rc::clone(&view));
        Ok(Some(view))
    }

    fn update(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.base.scope() else {
            return Ok(());
        };
        let condition = self.observer.get_value().is_truthy();
        let next = self.branch(condition)?;
        let previous = self.current.borrow().clone();
        if same_view(previous.as_ref(), next.as_ref()) {
            return Ok(());
        }
        tracing::debug!(condition, "if swaps branch");
        if let Some(previous) = previous {
            self.base.hide(&previous, flags)?;
        }
        *self.current.borrow_mut() = next.clone();
        match next {
            Some(view) => self.base.show(&view, &scope, flags),
            None => Ok(()),
        }
    }
}

impl PropertySubscriber for If {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {
        if !self.base.is_bound() || self.queued.replace(true) {
            return;
        }
        if let Some(me) = self.self_ref.upgrade() {
            self.base.container().lifecycle().enqueue_flush(me);
        }
    }
}

impl Flushable for If {
    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        self.queued.set(false);
        self.update(flags)
    }
}

impl Bindable for If {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.base.is_bound() {
            self.unbind(flags)?;
        }
        self.base.enter(scope);
        self.observer.subscribe(self.subscriber());
        self.update(flags)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.base.leave() {
            return Ok(());
        }
        self.observer.unsubscribe(&self.subscriber());
        self.queued.set(false);
        match self.current.borrow_mut().take() {
            Some(view) => view.unbind(flags),
            None => Ok(()),
        }
    }

    fn is_bound(&self) -> bool {
        self.base.is_bound()
    }
}

impl Attachable for If {
    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        self.base.set_attached(true);
        match self.current_view() {
            Some(view) => view.attach(flags),
            None => Ok(()),
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

impl AttributeController for If {
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

impl fmt::Debug for If {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("If")
            .field("base", &self.base)
            .field("has_else", &self.has_else())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Else
// ---------------------------------------------------------------------------

/// Hands its view factory to the preceding `If` and does nothing else.
pub struct Else {
    view_model: ObjectRef,
    factory: Rc<ViewFactory>,
}

impl Else {
    pub(crate) fn create(ctx: AttributeContext<'_>) -> Result<Rc<dyn AttributeController>> {
        let base = ControllerBase::new("else", &ctx)?;
        Ok(Rc::new(Self {
            view_model: ObjectRef::new(),
            factory: Rc::clone(base.factory()),
        }))
    }
}

impl Bindable for Else {
    fn bind(&self, _: LifecycleFlags, _: &Scope) -> Result<()> {
        Ok(())
    }

    fn unbind(&self, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn is_bound(&self) -> bool {
        false
    }
}

impl Attachable for Else {
    fn attach(&self, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn detach(&self, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

impl AttributeController for Else {
    fn view_model(&self) -> &ObjectRef {
        &self.view_model
    }

    fn bindable(self: Rc<Self>) -> Rc<dyn Bindable> {
        self
    }

    fn attachable(self: Rc<Self>) -> Rc<dyn Attachable> {
        self
    }

    fn link(&self, previous: &Rc<dyn AttributeController>) -> Result<()> {
        match previous.as_any().downcast_ref::<If>() {
            Some(condition) => condition.link_else(Rc::clone(&self.factory)),
            None => tracing::warn!("else must directly follow an if"),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Else {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Else").field("factory", &self.factory.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::controllers::test_support::{Page, text_template};
    use crate::templating::Instruction;
    use crate::templating::definition::marker;
    use trellis_core::{BindingMode, Node};

    fn if_else_page(show: bool) -> Page {
        let template = Node::fragment();
        template.append_child(&marker());
        template.append_child(&marker());
        let yes = text_template("yes", "'yes'");
        let no = text_template("no", "'no'");
        Page::start(
            template,
            vec![
                vec![Instruction::template_controller(
                    "if",
                    yes,
                    vec![Instruction::property("show", "value", BindingMode::TO_VIEW)],
                )],
                vec![Instruction::else_controller(no)],
            ],
            ObjectRef::from_pairs([("show", show)]),
        )
    }

    #[test]
    fn shows_the_branch_matching_the_condition() {
        assert_eq!(if_else_page(true).text(), "yes");
        assert_eq!(if_else_page(false).text(), "no");
    }

    #[test]
    fn toggles_apply_on_flush() {
        let page = if_else_page(true);
        page.view_model.set("show", false);
        assert_eq!(page.text(), "yes", "deferred until flush");
        page.settle();
        assert_eq!(page.text(), "no");
        page.view_model.set("show", true);
        page.view_model.set("show", false);
        page.view_model.set("show", true);
        page.settle();
        assert_eq!(page.text(), "yes");
    }

    #[test]
    fn hidden_branch_catches_up_when_shown_again() {
        let template = Node::fragment();
        template.append_child(&marker());
        let page = Page::start(
            template,
            vec![vec![Instruction::template_controller(
                "if",
                text_template("shown", "label"),
                vec![Instruction::property("show", "value", BindingMode::TO_VIEW)],
            )]],
            ObjectRef::from_pairs([("show", Value::from(true)), ("label", Value::from("on"))]),
        );
        assert_eq!(page.text(), "on");
        page.view_model.set("show", false);
        page.settle();
        assert_eq!(page.text(), "");
        page.view_model.set("label", "again");
        page.view_model.set("show", true);
        page.settle();
        assert_eq!(page.text(), "again");
    }

    #[test]
    fn stop_removes_the_shown_view() {
        let page = if_else_page(true);
        page.stop();
        assert_eq!(page.text(), "");
    }
}
