#![forbid(unsafe_code)]

//! `with.bind="value"`: one view whose binding context is `value`, with the
//! enclosing scope one `$parent` away.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{LifecycleFlags, ObjectRef, PropertySubscriber, Value};

use super::ControllerBase;
use crate::binding::Bindable;
use crate::error::Result;
use crate::lifecycle::Flushable;
use crate::observation::PropertyObserver;
use crate::scope::Scope;
use crate::templating::{Attachable, AttributeContext, AttributeController, MountTarget, View};

pub struct With {
    base: ControllerBase,
    view_model: ObjectRef,
    observer: Rc<dyn PropertyObserver>,
    view: Rc<View>,
    queued: Cell<bool>,
    self_ref: Weak<With>,
}

impl With {
    pub(crate) fn create(ctx: AttributeContext<'_>) -> Result<Rc<dyn AttributeController>> {
        let base = ControllerBase::new("with", &ctx)?;
        let view = base.factory().create()?;
        view.hold(MountTarget::Location(base.location().clone()));
        let view_model = ObjectRef::new();
        let observer = base.observe(&view_model, "value")?;
        Ok(Rc::new_cyclic(|self_ref| Self {
            base,
            view_model,
            observer,
            view,
            queued: Cell::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    #[must_use]
    pub fn view(&self) -> &Rc<View> {
        &self.view
    }

    fn bind_child(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(parent) = self.base.scope() else {
            return Ok(());
        };
        let scope = Scope::from_parent(&parent, self.observer.get_value());
        self.view.bind(flags, &scope)
    }
}

impl PropertySubscriber for With {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {
        if !self.base.is_bound() || self.queued.replace(true) {
            return;
        }
        if let Some(me) = self.self_ref.upgrade() {
            self.base.container().lifecycle().enqueue_flush(me);
        }
    }
}

impl Flushable for With {
    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        self.queued.set(false);
        tracing::debug!("with rebinds to a new value");
        self.bind_child(flags)
    }
}

impl Bindable for With {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if !self.base.enter(scope) {
            return Ok(());
        }
        let subscriber: Weak<dyn PropertySubscriber> = self.self_ref.clone();
        self.observer.subscribe(subscriber);
        self.bind_child(flags)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.base.leave() {
            return Ok(());
        }
        let subscriber: Weak<dyn PropertySubscriber> = self.self_ref.clone();
        self.observer.unsubscribe(&subscriber);
        self.queued.set(false);
        self.view.unbind(flags)
    }

    fn is_bound(&self) -> bool {
        self.base.is_bound()
    }
}

impl Attachable for With {
    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        self.base.set_attached(true);
        self.view.attach(flags)
    }

    fn detach(&self, flags: LifecycleFlags) -> Result<()> {
        self.base.set_attached(false);
        self.view.detach(flags)
    }
}

impl AttributeController for With {
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

impl fmt::Debug for With {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("With").field("base", &self.base).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::controllers::test_support::{Page, text_template};
    use crate::templating::Instruction;
    use trellis_core::BindingMode;

    fn with_page(body: &str) -> Page {
        let person = ObjectRef::from_pairs([("first", "Ada")]);
        Page::single(
            Instruction::template_controller(
                "with",
                text_template("person", body),
                vec![Instruction::property("person", "value", BindingMode::TO_VIEW)],
            ),
            ObjectRef::from_pairs([
                ("person", Value::Object(person)),
                ("greeting", Value::from("Hi")),
            ]),
        )
    }

    #[test]
    fn names_resolve_against_the_value_first() {
        assert_eq!(with_page("first").text(), "Ada");
        assert_eq!(with_page("$parent.greeting + ' ' + first").text(), "Hi Ada");
    }

    #[test]
    fn replacing_the_value_rebinds_on_flush() {
        let page = with_page("first");
        page.view_model
            .set("person", Value::Object(ObjectRef::from_pairs([("first", "Grace")])));
        page.settle();
        assert_eq!(page.text(), "Grace");
    }
}
