#![forbid(unsafe_code)]

//! Views, their factories and the renderer that wires compiled templates to
//! bindings and controllers.
//!
//! ```text
//! TemplateDefinition --ViewFactory::create--> View
//!        |                                     |
//!   instructions --Renderer--> bindables + attachables
//! ```
//!
//! A view's life is `create -> hold(target) -> bind(scope) -> attach ->
//! detach -> unbind -> release`. Released views return to their factory's
//! pool when it has room.
//!
//! Custom attributes and template controllers plug in through
//! [`AttributeFactory`]. Each produced controller exposes a [`Bindable`]
//! and an [`Attachable`] half, which the renderer collects alongside the
//! plain bindings of the owning view.

pub mod attribute;
pub mod definition;
pub mod factory;
pub mod location;
pub mod renderer;
pub mod view;

use std::any::Any;
use std::rc::Rc;

use trellis_core::{LifecycleFlags, Node, ObjectRef, Value};

use crate::binding::Bindable;
use crate::container::Container;
use crate::error::Result;

pub use attribute::{CustomAttribute, CustomAttributeFactory};
pub use definition::{
    ElementDefinition, Instruction, InstructionKind, LetBindingInstruction, ShadowMode, TemplateDefinition,
};
pub use factory::ViewFactory;
pub use location::{NodeSequence, RenderLocation};
pub use renderer::{RenderContext, Renderer};
pub use view::{MountTarget, View};

/// The attach/detach half of a view or controller.
pub trait Attachable {
    fn attach(&self, flags: LifecycleFlags) -> Result<()>;
    fn detach(&self, flags: LifecycleFlags) -> Result<()>;

    /// The owning view is entering a factory pool.
    fn cache(&self, _flags: LifecycleFlags) {}
}

/// A rendered custom attribute or template controller.
pub trait AttributeController {
    /// Bindable properties land here.
    fn view_model(&self) -> &ObjectRef;

    fn bindable(self: Rc<Self>) -> Rc<dyn Bindable>;

    fn attachable(self: Rc<Self>) -> Rc<dyn Attachable>;

    /// Called when the instruction asks to link with the controller rendered
    /// just before this one.
    fn link(&self, _previous: &Rc<dyn AttributeController>) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// What a controller is created from.
pub struct AttributeContext<'a> {
    pub container: &'a Rc<Container>,
    /// The element carrying the attribute, or the marker a template
    /// controller replaced.
    pub host: &'a Node,
    /// Template controllers only.
    pub factory: Option<Rc<ViewFactory>>,
    /// Template controllers only.
    pub location: Option<RenderLocation>,
    /// The instructions targeting the controller's view model.
    pub instructions: &'a [Instruction],
}

/// Creates custom attribute controllers.
pub trait AttributeFactory {
    /// Template controllers own a view factory and a render location.
    fn is_template_controller(&self) -> bool {
        false
    }

    fn create(&self, ctx: AttributeContext<'_>) -> Result<Rc<dyn AttributeController>>;
}

/// A named, application-provided renderer for `RenderStrategy`
/// instructions.
pub trait RenderStrategy {
    fn render(&self, ctx: &mut RenderContext<'_>, target: &Value, payload: &Value) -> Result<()>;
}
