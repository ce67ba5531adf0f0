#![forbid(unsafe_code)]

//! Compiled template definitions and the instructions that drive the
//! renderer.
//!
//! A template is a fragment whose instruction targets carry the class `au`.
//! `instructions[i]` applies to the `i`-th such node in document order.
//! Text bindings and template controllers use an `<au-m class="au">`
//! marker element that the renderer replaces.

use std::fmt;
use std::rc::Rc;

use trellis_core::{BindingMode, Node, ObjectRef, Value};

use crate::config::CacheSize;

/// Instruction kinds and their one-character tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    TextBinding,
    Interpolation,
    PropertyBinding,
    IteratorBinding,
    ListenerBinding,
    CallBinding,
    RefBinding,
    StylePropertyBinding,
    SetProperty,
    SetAttribute,
    HydrateElement,
    HydrateAttribute,
    HydrateTemplateController,
    LetElement,
    RenderStrategy,
}

impl InstructionKind {
    pub const ALL: [Self; 15] = [
        Self::TextBinding,
        Self::Interpolation,
        Self::PropertyBinding,
        Self::IteratorBinding,
        Self::ListenerBinding,
        Self::CallBinding,
        Self::RefBinding,
        Self::StylePropertyBinding,
        Self::SetProperty,
        Self::SetAttribute,
        Self::HydrateElement,
        Self::HydrateAttribute,
        Self::HydrateTemplateController,
        Self::LetElement,
        Self::RenderStrategy,
    ];

    /// Position in [`InstructionKind::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn tag(self) -> char {
        // 'a' + index; the table has 15 entries.
        char::from(b'a' + self as u8)
    }

    #[must_use]
    pub fn from_tag(tag: char) -> Option<Self> {
        let index = (tag as u32).checked_sub(u32::from(b'a'))? as usize;
        Self::ALL.get(index).copied()
    }
}

/// One `<let>` local.
#[derive(Debug, Clone)]
pub struct LetBindingInstruction {
    pub from: Rc<str>,
    pub to: Rc<str>,
}

#[derive(Debug, Clone)]
pub enum Instruction {
    TextBinding {
        from: Rc<str>,
    },
    Interpolation {
        from: Rc<str>,
        to: Rc<str>,
    },
    PropertyBinding {
        from: Rc<str>,
        to: Rc<str>,
        mode: BindingMode,
    },
    IteratorBinding {
        from: Rc<str>,
        to: Rc<str>,
    },
    ListenerBinding {
        from: Rc<str>,
        to: Rc<str>,
        prevent_default: bool,
    },
    CallBinding {
        from: Rc<str>,
        to: Rc<str>,
    },
    RefBinding {
        from: Rc<str>,
    },
    StylePropertyBinding {
        from: Rc<str>,
        to: Rc<str>,
    },
    SetProperty {
        value: Value,
        to: Rc<str>,
    },
    SetAttribute {
        value: Rc<str>,
        to: Rc<str>,
    },
    HydrateElement {
        res: Rc<str>,
        instructions: Vec<Instruction>,
    },
    HydrateAttribute {
        res: Rc<str>,
        instructions: Vec<Instruction>,
    },
    HydrateTemplateController {
        res: Rc<str>,
        def: Rc<TemplateDefinition>,
        instructions: Vec<Instruction>,
        /// Link to the template controller rendered just before (`else`).
        link: bool,
    },
    LetElement {
        instructions: Vec<LetBindingInstruction>,
        to_view_model: bool,
    },
    RenderStrategy {
        name: Rc<str>,
        payload: Value,
    },
}

impl Instruction {
    #[must_use]
    pub fn kind(&self) -> InstructionKind {
        match self {
            Self::TextBinding { .. } => InstructionKind::TextBinding,
            Self::Interpolation { .. } => InstructionKind::Interpolation,
            Self::PropertyBinding { .. } => InstructionKind::PropertyBinding,
            Self::IteratorBinding { .. } => InstructionKind::IteratorBinding,
            Self::ListenerBinding { .. } => InstructionKind::ListenerBinding,
            Self::CallBinding { .. } => InstructionKind::CallBinding,
            Self::RefBinding { .. } => InstructionKind::RefBinding,
            Self::StylePropertyBinding { .. } => InstructionKind::StylePropertyBinding,
            Self::SetProperty { .. } => InstructionKind::SetProperty,
            Self::SetAttribute { .. } => InstructionKind::SetAttribute,
            Self::HydrateElement { .. } => InstructionKind::HydrateElement,
            Self::HydrateAttribute { .. } => InstructionKind::HydrateAttribute,
            Self::HydrateTemplateController { .. } => InstructionKind::HydrateTemplateController,
            Self::LetElement { .. } => InstructionKind::LetElement,
            Self::RenderStrategy { .. } => InstructionKind::RenderStrategy,
        }
    }

    // -- shorthand constructors --------------------------------------------

    pub fn text(from: &str) -> Self {
        Self::TextBinding { from: Rc::from(from) }
    }

    pub fn interpolation(from: &str, to: &str) -> Self {
        Self::Interpolation {
            from: Rc::from(from),
            to: Rc::from(to),
        }
    }

    pub fn property(from: &str, to: &str, mode: BindingMode) -> Self {
        Self::PropertyBinding {
            from: Rc::from(from),
            to: Rc::from(to),
            mode,
        }
    }

    pub fn iterator(from: &str) -> Self {
        Self::IteratorBinding {
            from: Rc::from(from),
            to: Rc::from("items"),
        }
    }

    pub fn listener(event: &str, from: &str, prevent_default: bool) -> Self {
        Self::ListenerBinding {
            from: Rc::from(from),
            to: Rc::from(event),
            prevent_default,
        }
    }

    pub fn template_controller(res: &str, def: TemplateDefinition, instructions: Vec<Instruction>) -> Self {
        Self::HydrateTemplateController {
            res: Rc::from(res),
            def: Rc::new(def),
            instructions,
            link: false,
        }
    }

    /// An `else` controller linked to the preceding `if`.
    pub fn else_controller(def: TemplateDefinition) -> Self {
        Self::HydrateTemplateController {
            res: Rc::from("else"),
            def: Rc::new(def),
            instructions: Vec::new(),
            link: true,
        }
    }

    pub fn element(res: &str, instructions: Vec<Instruction>) -> Self {
        Self::HydrateElement {
            res: Rc::from(res),
            instructions,
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateDefinition
// ---------------------------------------------------------------------------

/// Shadow root options recorded for an element. The in-memory host has no
/// shadow roots, so content is rendered into the host either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMode {
    Open,
    Closed,
}

#[derive(Clone)]
pub struct TemplateDefinition {
    pub name: Rc<str>,
    /// A fragment node; cloned for each view.
    pub template: Node,
    pub instructions: Vec<Vec<Instruction>>,
    /// Applied to the custom element's host node.
    pub surrogates: Vec<Instruction>,
    pub bindables: Vec<Rc<str>>,
    pub containerless: bool,
    pub shadow_options: Option<ShadowMode>,
    /// View pool size; the container default when `None`.
    pub cache: Option<CacheSize>,
}

impl TemplateDefinition {
    #[must_use]
    pub fn new(name: &str, template: Node) -> Self {
        Self {
            name: Rc::from(name),
            template,
            instructions: Vec::new(),
            surrogates: Vec::new(),
            bindables: Vec::new(),
            containerless: false,
            shadow_options: None,
            cache: None,
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: Vec<Vec<Instruction>>) -> Self {
        self.instructions = instructions;
        self
    }

    #[must_use]
    pub fn with_surrogates(mut self, surrogates: Vec<Instruction>) -> Self {
        self.surrogates = surrogates;
        self
    }

    #[must_use]
    pub fn with_bindables<S: AsRef<str>>(mut self, bindables: impl IntoIterator<Item = S>) -> Self {
        self.bindables = bindables.into_iter().map(|b| Rc::from(b.as_ref())).collect();
        self
    }

    #[must_use]
    pub fn containerless(mut self, containerless: bool) -> Self {
        self.containerless = containerless;
        self
    }

    #[must_use]
    pub fn with_shadow(mut self, mode: ShadowMode) -> Self {
        self.shadow_options = Some(mode);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheSize) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl fmt::Debug for TemplateDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateDefinition")
            .field("name", &self.name)
            .field("template", &self.template.to_html())
            .field("targets", &self.instructions.len())
            .field("containerless", &self.containerless)
            .finish_non_exhaustive()
    }
}

/// An `<au-m class="au">` marker for text bindings and template
/// controllers.
#[must_use]
pub fn marker() -> Node {
    let node = Node::element("au-m");
    node.add_class("au");
    node
}

/// An element marked as an instruction target.
#[must_use]
pub fn target(tag: &str) -> Node {
    let node = Node::element(tag);
    node.add_class("au");
    node
}

// ---------------------------------------------------------------------------
// ElementDefinition
// ---------------------------------------------------------------------------

pub type ViewModelFactory = Rc<dyn Fn() -> ObjectRef>;

/// A registrable custom element: its template plus a view-model factory.
#[derive(Clone)]
pub struct ElementDefinition {
    pub definition: Rc<TemplateDefinition>,
    pub view_model: ViewModelFactory,
}

impl ElementDefinition {
    #[must_use]
    pub fn new(definition: TemplateDefinition, view_model: impl Fn() -> ObjectRef + 'static) -> Self {
        Self {
            definition: Rc::new(definition),
            view_model: Rc::new(view_model),
        }
    }

    #[must_use]
    pub fn name(&self) -> &Rc<str> {
        &self.definition.name
    }

    #[must_use]
    pub fn create_view_model(&self) -> ObjectRef {
        (self.view_model)()
    }
}

impl fmt::Debug for ElementDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDefinition")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_run_a_through_o() {
        let tags: String = InstructionKind::ALL.iter().map(|k| k.tag()).collect();
        assert_eq!(tags, "abcdefghijklmno");
        for kind in InstructionKind::ALL {
            assert_eq!(InstructionKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(InstructionKind::from_tag('p'), None);
        assert_eq!(InstructionKind::from_tag('A'), None);
    }

    #[test]
    fn instruction_kind_matches_variant() {
        assert_eq!(Instruction::text("${a}").kind().tag(), 'a');
        assert_eq!(Instruction::iterator("item of items").kind().tag(), 'd');
        let def = TemplateDefinition::new("branch", Node::fragment());
        assert_eq!(Instruction::else_controller(def).kind().tag(), 'm');
    }
}
