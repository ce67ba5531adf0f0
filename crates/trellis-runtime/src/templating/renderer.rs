#![forbid(unsafe_code)]

//! Turns instruction rows into bindings and controllers.
//!
//! Targets are the template's nodes carrying the class `au`, in document
//! order; row `i` applies to target `i`. Each instruction is dispatched
//! through a table indexed by its [`InstructionKind`].
//!
//! | Tag | Kind | Produces |
//! |-----|------|----------|
//! | `a` | text binding | text node + interpolation binding on `textContent` |
//! | `b` | interpolation | interpolation binding, or a plain write for static text |
//! | `c` | property binding | property binding |
//! | `d` | iterator binding | to-view property binding of the iterable |
//! | `e` | listener binding | listener binding on the target node |
//! | `f` | call binding | call binding |
//! | `g` | ref binding | ref binding |
//! | `h` | style property binding | to-view binding of `style.<name>` |
//! | `i` | set property | immediate write |
//! | `j` | set attribute | immediate write |
//! | `k` | hydrate element | custom element |
//! | `l` | hydrate attribute | custom attribute controller |
//! | `m` | hydrate template controller | render location + view factory + controller |
//! | `n` | let element | let bindings; the `<let>` node is removed |
//! | `o` | render strategy | whatever the named strategy renders |
//!
//! Instructions nested in `k`, `l` and `m` target the created view model.
//! Their bindings are collected before the owning controller, so bindable
//! properties are set by the time the controller binds.

use std::fmt;
use std::rc::Rc;

use trellis_core::{BindingMode, Node, Value};
use trellis_expr::BindingType;

use super::{AttributeContext, AttributeController, Attachable, Instruction, InstructionKind, RenderLocation, ViewFactory};
use crate::binding::{
    Bindable, CallBinding, InterpolationBinding, LetBinding, ListenerBinding, PropertyBinding, RefBinding,
};
use crate::container::Container;
use crate::element::CustomElement;
use crate::error::{LifecycleError, Result};

/// Accumulates what a render pass produces.
pub struct RenderContext<'a> {
    container: &'a Rc<Container>,
    bindables: &'a mut Vec<Rc<dyn Bindable>>,
    attachables: &'a mut Vec<Rc<dyn Attachable>>,
    last_controller: Option<Rc<dyn AttributeController>>,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        container: &'a Rc<Container>,
        bindables: &'a mut Vec<Rc<dyn Bindable>>,
        attachables: &'a mut Vec<Rc<dyn Attachable>>,
    ) -> Self {
        Self {
            container,
            bindables,
            attachables,
            last_controller: None,
        }
    }

    #[must_use]
    pub fn container(&self) -> &'a Rc<Container> {
        self.container
    }

    pub fn push_bindable(&mut self, bindable: Rc<dyn Bindable>) {
        self.bindables.push(bindable);
    }

    pub fn push_attachable(&mut self, attachable: Rc<dyn Attachable>) {
        self.attachables.push(attachable);
    }

    fn push_controller(&mut self, controller: Rc<dyn AttributeController>) {
        self.bindables.push(Rc::clone(&controller).bindable());
        self.attachables.push(Rc::clone(&controller).attachable());
        self.last_controller = Some(controller);
    }
}

type RenderFn = fn(&Renderer, &mut RenderContext<'_>, &Node, &Value, &Instruction) -> Result<()>;

pub struct Renderer {
    table: [RenderFn; InstructionKind::ALL.len()],
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: [
                Self::text_binding,
                Self::interpolation,
                Self::property_binding,
                Self::iterator_binding,
                Self::listener_binding,
                Self::call_binding,
                Self::ref_binding,
                Self::style_property_binding,
                Self::set_property,
                Self::set_attribute,
                Self::hydrate_element,
                Self::hydrate_attribute,
                Self::hydrate_template_controller,
                Self::let_element,
                Self::render_strategy,
            ],
        }
    }

    /// Render `instructions` against the `au` targets under `root`.
    ///
    /// # Errors
    ///
    /// `MissingTarget` when a non-empty row has no node, plus any parse,
    /// resource lookup or controller creation failure.
    pub fn render(&self, ctx: &mut RenderContext<'_>, root: &Node, instructions: &[Vec<Instruction>]) -> Result<()> {
        let targets = root.query_class("au");
        for (index, row) in instructions.iter().enumerate() {
            let Some(first) = row.first() else {
                continue;
            };
            let Some(node) = targets.get(index) else {
                return Err(LifecycleError::MissingTarget {
                    kind: first.kind().tag(),
                    index,
                }
                .into());
            };
            let target = Value::Node(node.clone());
            for instruction in row {
                self.render_instruction(ctx, node, &target, instruction)?;
            }
        }
        Ok(())
    }

    /// Dispatch one instruction. `node` is the host element or marker;
    /// `target` is what bindings write to.
    pub fn render_instruction(
        &self,
        ctx: &mut RenderContext<'_>,
        node: &Node,
        target: &Value,
        instruction: &Instruction,
    ) -> Result<()> {
        (self.table[instruction.kind().index()])(self, ctx, node, target, instruction)
    }

    fn render_nested(
        &self,
        ctx: &mut RenderContext<'_>,
        node: &Node,
        view_model: &Value,
        instructions: &[Instruction],
    ) -> Result<()> {
        for instruction in instructions {
            self.render_instruction(ctx, node, view_model, instruction)?;
        }
        Ok(())
    }

    // -- bindings ----------------------------------------------------------

    fn text_binding(&self, ctx: &mut RenderContext<'_>, node: &Node, _: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::TextBinding { from } = ins else {
            return Ok(());
        };
        let text = Node::text("");
        node.replace_with(&text);
        match ctx.container.parser().parse_interpolation(from)? {
            Some(expr) => {
                let binding = InterpolationBinding::new(expr, Value::Node(text), "textContent", Rc::clone(ctx.container));
                ctx.push_bindable(binding);
            }
            None => text.set_data(from),
        }
        Ok(())
    }

    fn interpolation(&self, ctx: &mut RenderContext<'_>, _: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::Interpolation { from, to } = ins else {
            return Ok(());
        };
        match ctx.container.parser().parse_interpolation(from)? {
            Some(expr) => {
                let binding = InterpolationBinding::new(expr, target.clone(), to, Rc::clone(ctx.container));
                ctx.push_bindable(binding);
            }
            None => write(target, to, Value::str(from)),
        }
        Ok(())
    }

    fn property_binding(&self, ctx: &mut RenderContext<'_>, _: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::PropertyBinding { from, to, mode } = ins else {
            return Ok(());
        };
        let expr = ctx.container.parser().parse(from, BindingType::IsProperty)?;
        let binding = PropertyBinding::new(expr, target.clone(), to, *mode, Rc::clone(ctx.container));
        ctx.push_bindable(binding);
        Ok(())
    }

    fn iterator_binding(&self, ctx: &mut RenderContext<'_>, _: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::IteratorBinding { from, to } = ins else {
            return Ok(());
        };
        let expr = ctx.container.parser().parse(from, BindingType::IsIterator)?;
        let binding = PropertyBinding::new(expr, target.clone(), to, BindingMode::TO_VIEW, Rc::clone(ctx.container));
        ctx.push_bindable(binding);
        Ok(())
    }

    fn listener_binding(&self, ctx: &mut RenderContext<'_>, node: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::ListenerBinding {
            from,
            to,
            prevent_default,
        } = ins
        else {
            return Ok(());
        };
        let host = target.as_node().unwrap_or(node).clone();
        let expr = ctx.container.parser().parse(from, BindingType::IsFunction)?;
        let binding = ListenerBinding::new(to, expr, host, *prevent_default, Rc::clone(ctx.container));
        ctx.push_bindable(binding);
        Ok(())
    }

    fn call_binding(&self, ctx: &mut RenderContext<'_>, _: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::CallBinding { from, to } = ins else {
            return Ok(());
        };
        let expr = ctx.container.parser().parse(from, BindingType::IsFunction)?;
        ctx.push_bindable(CallBinding::new(expr, target.clone(), to, Rc::clone(ctx.container)));
        Ok(())
    }

    fn ref_binding(&self, ctx: &mut RenderContext<'_>, _: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::RefBinding { from } = ins else {
            return Ok(());
        };
        let expr = ctx.container.parser().parse(from, BindingType::IsRef)?;
        ctx.push_bindable(RefBinding::new(expr, target.clone(), Rc::clone(ctx.container)));
        Ok(())
    }

    fn style_property_binding(
        &self,
        ctx: &mut RenderContext<'_>,
        _: &Node,
        target: &Value,
        ins: &Instruction,
    ) -> Result<()> {
        let Instruction::StylePropertyBinding { from, to } = ins else {
            return Ok(());
        };
        let expr = ctx.container.parser().parse(from, BindingType::IsProperty)?;
        let key = format!("style.{to}");
        let binding = PropertyBinding::new(expr, target.clone(), &key, BindingMode::TO_VIEW, Rc::clone(ctx.container));
        ctx.push_bindable(binding);
        Ok(())
    }

    // -- static writes -----------------------------------------------------

    fn set_property(&self, _: &mut RenderContext<'_>, _: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        if let Instruction::SetProperty { value, to } = ins {
            write(target, to, value.clone());
        }
        Ok(())
    }

    fn set_attribute(&self, _: &mut RenderContext<'_>, _: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::SetAttribute { value, to } = ins else {
            return Ok(());
        };
        match target {
            Value::Node(node) => node.set_attribute(to, value),
            other => write(other, to, Value::String(Rc::clone(value))),
        }
        Ok(())
    }

    // -- controllers -------------------------------------------------------

    fn hydrate_element(&self, ctx: &mut RenderContext<'_>, node: &Node, _: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::HydrateElement { res, instructions } = ins else {
            return Ok(());
        };
        let definition = ctx
            .container
            .find_element(res)
            .ok_or_else(|| LifecycleError::ResourceNotFound { name: Rc::clone(res) })?;
        let element = CustomElement::new(definition, Rc::clone(ctx.container));
        element.prepare();
        element.hydrate(node)?;
        self.render_nested(ctx, node, &Value::Object(element.view_model().clone()), instructions)?;
        ctx.push_bindable(Rc::clone(&element) as Rc<dyn Bindable>);
        ctx.push_attachable(element);
        Ok(())
    }

    fn hydrate_attribute(&self, ctx: &mut RenderContext<'_>, node: &Node, _: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::HydrateAttribute { res, instructions } = ins else {
            return Ok(());
        };
        let factory = ctx
            .container
            .find_attribute(res)
            .ok_or_else(|| LifecycleError::ResourceNotFound { name: Rc::clone(res) })?;
        let controller = factory.create(AttributeContext {
            container: ctx.container,
            host: node,
            factory: None,
            location: None,
            instructions,
        })?;
        self.render_nested(ctx, node, &Value::Object(controller.view_model().clone()), instructions)?;
        ctx.push_controller(controller);
        Ok(())
    }

    fn hydrate_template_controller(
        &self,
        ctx: &mut RenderContext<'_>,
        node: &Node,
        _: &Value,
        ins: &Instruction,
    ) -> Result<()> {
        let Instruction::HydrateTemplateController {
            res,
            def,
            instructions,
            link,
        } = ins
        else {
            return Ok(());
        };
        let factory = ctx
            .container
            .find_attribute(res)
            .ok_or_else(|| LifecycleError::ResourceNotFound { name: Rc::clone(res) })?;
        let location = RenderLocation::replace(node);
        let views = ViewFactory::new(Rc::clone(def), Rc::clone(ctx.container))?;
        let controller = factory.create(AttributeContext {
            container: ctx.container,
            host: node,
            factory: Some(views),
            location: Some(location),
            instructions,
        })?;
        self.render_nested(ctx, node, &Value::Object(controller.view_model().clone()), instructions)?;
        if *link {
            match ctx.last_controller.as_ref() {
                Some(previous) => controller.link(previous)?,
                None => tracing::warn!(controller = %res, "no preceding controller to link to"),
            }
        }
        ctx.push_controller(controller);
        Ok(())
    }

    fn let_element(&self, ctx: &mut RenderContext<'_>, node: &Node, _: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::LetElement {
            instructions,
            to_view_model,
        } = ins
        else {
            return Ok(());
        };
        node.remove();
        for local in instructions {
            let expr = ctx.container.parser().parse(&local.from, BindingType::IsProperty)?;
            ctx.push_bindable(LetBinding::new(expr, &local.to, *to_view_model, Rc::clone(ctx.container)));
        }
        Ok(())
    }

    fn render_strategy(&self, ctx: &mut RenderContext<'_>, _: &Node, target: &Value, ins: &Instruction) -> Result<()> {
        let Instruction::RenderStrategy { name, payload } = ins else {
            return Ok(());
        };
        let strategy = ctx
            .container
            .find_strategy(name)
            .ok_or_else(|| LifecycleError::StrategyNotFound { name: Rc::clone(name) })?;
        strategy.render(ctx, target, payload)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer").field("kinds", &self.table.len()).finish()
    }
}

fn write(target: &Value, key: &str, value: Value) {
    match target {
        Value::Node(node) => node.set_property(key, value),
        Value::Object(object) => object.set(key, value),
        _ => {}
    }
}
