#![forbid(unsafe_code)]

//! Binding expression syntax tree.
//!
//! [`Expr`] is a closed sum type. Category membership (assignable, has a
//! bind hook, literal, ...) is answered by [`Expr::kind`], which maps each
//! variant to a fixed [`ExpressionKind`] bit set; nothing inspects variants
//! at runtime to decide what a node can do.
//!
//! Trees are immutable and shared as `Rc<Expr>`. Structural equality
//! (`PartialEq`) is deep equality.
//!
//! `Display` prints source text that re-parses to an equal tree.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use trellis_core::value::format_number;

bitflags! {
    /// Category bits of an expression node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExpressionKind: u16 {
        const IS_PRIMARY = 1 << 0;
        const IS_LEFT_HAND_SIDE = 1 << 1;
        const HAS_BIND = 1 << 2;
        const HAS_UNBIND = 1 << 3;
        const IS_ASSIGNABLE = 1 << 4;
        const IS_LITERAL = 1 << 5;
        const IS_RESOURCE = 1 << 6;
        const IS_FOR_DECLARATION = 1 << 7;
        const IS_CONNECTABLE = 1 << 8;
        const IS_BINDING_PATTERN = 1 << 9;
    }
}

/// Parsing context an expression text is parsed under. Part of the cache
/// key: the same text under two binding types is two cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingType {
    #[default]
    None,
    Interpolation,
    IsRef,
    IsIterator,
    IsFunction,
    IsProperty,
    IsCustom,
}

/// Primitive literal payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    InstanceOf,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Every operator, lowest tier first.
    pub const ALL: [BinaryOp; 17] = [
        Self::Or,
        Self::And,
        Self::Eq,
        Self::Ne,
        Self::StrictEq,
        Self::StrictNe,
        Self::Lt,
        Self::Gt,
        Self::Le,
        Self::Ge,
        Self::In,
        Self::InstanceOf,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Mod,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::In => "in",
            Self::InstanceOf => "instanceof",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }

    /// Binding tier; higher binds tighter.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne | Self::StrictEq | Self::StrictNe => 3,
            Self::Lt | Self::Gt | Self::Le | Self::Ge | Self::In | Self::InstanceOf => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Mod => 6,
        }
    }

    /// Short-circuiting operators connect only the branch they take.
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::Or | Self::And)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
    Void,
}

impl UnaryOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Neg => "-",
            Self::Plus => "+",
            Self::TypeOf => "typeof",
            Self::Void => "void",
        }
    }
}

/// Expression node.
///
/// `ancestor` counts `$parent` hops: `$parent.$parent.x` is
/// `AccessScope { name: "x", ancestor: 2 }`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    AccessThis {
        ancestor: u32,
    },
    AccessScope {
        name: Rc<str>,
        ancestor: u32,
    },
    AccessMember {
        object: Rc<Expr>,
        name: Rc<str>,
    },
    AccessKeyed {
        object: Rc<Expr>,
        key: Rc<Expr>,
    },
    CallScope {
        name: Rc<str>,
        args: Vec<Rc<Expr>>,
        ancestor: u32,
    },
    CallMember {
        object: Rc<Expr>,
        name: Rc<str>,
        args: Vec<Rc<Expr>>,
    },
    CallFunction {
        func: Rc<Expr>,
        args: Vec<Rc<Expr>>,
    },
    Binary {
        op: BinaryOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Rc<Expr>,
    },
    Conditional {
        condition: Rc<Expr>,
        yes: Rc<Expr>,
        no: Rc<Expr>,
    },
    Assign {
        target: Rc<Expr>,
        value: Rc<Expr>,
    },
    PrimitiveLiteral(Literal),
    ArrayLiteral {
        elements: Vec<Rc<Expr>>,
    },
    ObjectLiteral {
        keys: Vec<Rc<str>>,
        values: Vec<Rc<Expr>>,
    },
    /// `cooked.len() == expressions.len() + 1`.
    Template {
        cooked: Vec<Rc<str>>,
        expressions: Vec<Rc<Expr>>,
    },
    TaggedTemplate {
        cooked: Vec<Rc<str>>,
        raw: Vec<Rc<str>>,
        func: Rc<Expr>,
        expressions: Vec<Rc<Expr>>,
    },
    ValueConverter {
        expression: Rc<Expr>,
        name: Rc<str>,
        args: Vec<Rc<Expr>>,
    },
    BindingBehavior {
        expression: Rc<Expr>,
        name: Rc<str>,
        args: Vec<Rc<Expr>>,
    },
    ForOfStatement {
        declaration: Rc<Expr>,
        iterable: Rc<Expr>,
    },
    /// `parts.len() == expressions.len() + 1`.
    Interpolation {
        parts: Vec<Rc<str>>,
        expressions: Vec<Rc<Expr>>,
    },
    BindingIdentifier {
        name: Rc<str>,
    },
    ArrayBindingPattern {
        elements: Vec<Rc<Expr>>,
    },
    ObjectBindingPattern {
        keys: Vec<Rc<str>>,
        values: Vec<Rc<Expr>>,
    },
}

impl Expr {
    /// Category bits of this node.
    #[must_use]
    pub fn kind(&self) -> ExpressionKind {
        use ExpressionKind as K;
        match self {
            Self::AccessThis { .. } => K::IS_PRIMARY | K::IS_LEFT_HAND_SIDE,
            Self::AccessScope { .. } => {
                K::IS_PRIMARY | K::IS_LEFT_HAND_SIDE | K::IS_ASSIGNABLE | K::IS_CONNECTABLE
            }
            Self::AccessMember { .. } | Self::AccessKeyed { .. } => {
                K::IS_LEFT_HAND_SIDE | K::IS_ASSIGNABLE | K::IS_CONNECTABLE
            }
            Self::CallScope { .. }
            | Self::CallMember { .. }
            | Self::CallFunction { .. }
            | Self::TaggedTemplate { .. } => K::IS_LEFT_HAND_SIDE | K::IS_CONNECTABLE,
            Self::Binary { .. }
            | Self::Unary { .. }
            | Self::Conditional { .. }
            | Self::Assign { .. }
            | Self::Interpolation { .. } => K::IS_CONNECTABLE,
            Self::PrimitiveLiteral(_) => K::IS_PRIMARY | K::IS_LEFT_HAND_SIDE | K::IS_LITERAL,
            Self::ArrayLiteral { .. } | Self::ObjectLiteral { .. } | Self::Template { .. } => {
                K::IS_PRIMARY | K::IS_LEFT_HAND_SIDE | K::IS_LITERAL | K::IS_CONNECTABLE
            }
            Self::ValueConverter { .. } | Self::BindingBehavior { .. } => {
                K::IS_RESOURCE | K::HAS_BIND | K::HAS_UNBIND | K::IS_CONNECTABLE
            }
            Self::ForOfStatement { .. } => {
                K::IS_FOR_DECLARATION | K::HAS_BIND | K::HAS_UNBIND | K::IS_CONNECTABLE
            }
            Self::BindingIdentifier { .. } => K::IS_ASSIGNABLE | K::IS_FOR_DECLARATION,
            Self::ArrayBindingPattern { .. } | Self::ObjectBindingPattern { .. } => {
                K::IS_ASSIGNABLE | K::IS_FOR_DECLARATION | K::IS_BINDING_PATTERN
            }
        }
    }

    #[must_use]
    pub fn is_assignable(&self) -> bool {
        self.kind().contains(ExpressionKind::IS_ASSIGNABLE)
    }

    #[must_use]
    pub fn is_left_hand_side(&self) -> bool {
        self.kind().contains(ExpressionKind::IS_LEFT_HAND_SIDE)
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.kind().contains(ExpressionKind::IS_PRIMARY)
    }

    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.kind().contains(ExpressionKind::IS_LITERAL)
    }

    #[must_use]
    pub fn is_resource(&self) -> bool {
        self.kind().contains(ExpressionKind::IS_RESOURCE)
    }

    #[must_use]
    pub fn has_bind(&self) -> bool {
        self.kind().contains(ExpressionKind::HAS_BIND)
    }

    #[must_use]
    pub fn has_unbind(&self) -> bool {
        self.kind().contains(ExpressionKind::HAS_UNBIND)
    }

    #[must_use]
    pub fn is_connectable(&self) -> bool {
        self.kind().contains(ExpressionKind::IS_CONNECTABLE)
    }

    // -- constructors (used by tests and programmatic bindings) --------------

    #[must_use]
    pub fn scope(name: &str) -> Rc<Self> {
        Rc::new(Self::AccessScope {
            name: Rc::from(name),
            ancestor: 0,
        })
    }

    #[must_use]
    pub fn member(object: Rc<Self>, name: &str) -> Rc<Self> {
        Rc::new(Self::AccessMember {
            object,
            name: Rc::from(name),
        })
    }

    #[must_use]
    pub fn keyed(object: Rc<Self>, key: Rc<Self>) -> Rc<Self> {
        Rc::new(Self::AccessKeyed { object, key })
    }

    #[must_use]
    pub fn binary(op: BinaryOp, left: Rc<Self>, right: Rc<Self>) -> Rc<Self> {
        Rc::new(Self::Binary { op, left, right })
    }

    #[must_use]
    pub fn number(n: f64) -> Rc<Self> {
        Rc::new(Self::PrimitiveLiteral(Literal::Number(n)))
    }

    #[must_use]
    pub fn string(s: &str) -> Rc<Self> {
        Rc::new(Self::PrimitiveLiteral(Literal::String(Rc::from(s))))
    }

    /// Name of the innermost value converter or behavior target when this
    /// node is a resource wrapper.
    #[must_use]
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            Self::ValueConverter { name, .. } | Self::BindingBehavior { name, .. } => Some(name),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Unparsing
// ---------------------------------------------------------------------------

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            _ => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

fn write_template_chunk(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => f.write_str("\\`")?,
            '\\' => f.write_str("\\\\")?,
            '$' if chars.peek() == Some(&'{') => f.write_str("\\$")?,
            _ => write!(f, "{c}")?,
        }
    }
    Ok(())
}

fn write_parent_prefix(f: &mut fmt::Formatter<'_>, ancestor: u32) -> fmt::Result {
    for _ in 0..ancestor {
        f.write_str("$parent.")?;
    }
    Ok(())
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Rc<Expr>]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_operand(f, item)?;
    }
    Ok(())
}

/// Operands that are not self-delimiting get parentheses.
fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    match e {
        Expr::Binary { .. }
        | Expr::Conditional { .. }
        | Expr::Assign { .. }
        | Expr::ValueConverter { .. }
        | Expr::BindingBehavior { .. } => write!(f, "({e})"),
        _ => write!(f, "{e}"),
    }
}

/// Objects of member access and call targets: anything that would re-parse
/// into a different shape gets parentheses.
fn write_target(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    if e.is_left_hand_side() && !matches!(e, Expr::AccessThis { .. } | Expr::PrimitiveLiteral(Literal::Number(_))) {
        write!(f, "{e}")
    } else {
        write!(f, "({e})")
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, name: &str, args: &[Rc<Expr>]) -> fmt::Result {
    f.write_str(name)?;
    for arg in args {
        f.write_str(":")?;
        if arg.is_primary() || matches!(&**arg, Expr::AccessMember { .. } | Expr::AccessKeyed { .. }) {
            write!(f, "{arg}")?;
        } else {
            write!(f, "({arg})")?;
        }
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.is_infinite() && *n > 0.0 => f.write_str("1e999"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => write_quoted(f, s),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessThis { ancestor: 0 } => f.write_str("$this"),
            Self::AccessThis { ancestor } => {
                for i in 0..*ancestor {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str("$parent")?;
                }
                Ok(())
            }
            Self::AccessScope { name, ancestor } => {
                write_parent_prefix(f, *ancestor)?;
                f.write_str(name)
            }
            Self::AccessMember { object, name } => {
                write_target(f, object)?;
                write!(f, ".{name}")
            }
            Self::AccessKeyed { object, key } => {
                write_target(f, object)?;
                write!(f, "[{key}]")
            }
            Self::CallScope {
                name,
                args,
                ancestor,
            } => {
                write_parent_prefix(f, *ancestor)?;
                write!(f, "{name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::CallMember { object, name, args } => {
                write_target(f, object)?;
                write!(f, ".{name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::CallFunction { func, args } => {
                match &**func {
                    Expr::AccessScope { .. } | Expr::AccessMember { .. } | Expr::AccessThis { .. } => {
                        write!(f, "({func})")?;
                    }
                    _ => write_target(f, func)?,
                }
                f.write_str("(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op.as_str())?;
                write_operand(f, right)
            }
            Self::Unary { op, operand } => {
                match op {
                    UnaryOp::TypeOf | UnaryOp::Void => write!(f, "{} ", op.as_str())?,
                    _ => f.write_str(op.as_str())?,
                }
                match &**operand {
                    Expr::Unary { .. } => write!(f, "({operand})"),
                    _ => write_operand(f, operand),
                }
            }
            Self::Conditional { condition, yes, no } => {
                write_operand(f, condition)?;
                f.write_str(" ? ")?;
                write_operand(f, yes)?;
                f.write_str(" : ")?;
                write_operand(f, no)
            }
            Self::Assign { target, value } => {
                write!(f, "{target} = ")?;
                match &**value {
                    Expr::Assign { .. } => write!(f, "{value}"),
                    _ => write_operand(f, value),
                }
            }
            Self::PrimitiveLiteral(lit) => write!(f, "{lit}"),
            Self::ArrayLiteral { elements } => {
                f.write_str("[")?;
                write_list(f, elements)?;
                f.write_str("]")
            }
            Self::ObjectLiteral { keys, values } => {
                f.write_str("{")?;
                for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if is_identifier(key) {
                        f.write_str(key)?;
                    } else {
                        write_quoted(f, key)?;
                    }
                    f.write_str(": ")?;
                    write_operand(f, value)?;
                }
                f.write_str("}")
            }
            Self::Template {
                cooked,
                expressions,
            } => {
                f.write_str("`")?;
                for (i, chunk) in cooked.iter().enumerate() {
                    write_template_chunk(f, chunk)?;
                    if let Some(e) = expressions.get(i) {
                        write!(f, "${{{e}}}")?;
                    }
                }
                f.write_str("`")
            }
            Self::TaggedTemplate {
                raw,
                func,
                expressions,
                ..
            } => {
                write_target(f, func)?;
                f.write_str("`")?;
                for (i, chunk) in raw.iter().enumerate() {
                    f.write_str(chunk)?;
                    if let Some(e) = expressions.get(i) {
                        write!(f, "${{{e}}}")?;
                    }
                }
                f.write_str("`")
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                match &**expression {
                    Expr::ValueConverter { .. } => write!(f, "{expression}")?,
                    _ => write_operand(f, expression)?,
                }
                f.write_str(" | ")?;
                write_args(f, name, args)
            }
            Self::BindingBehavior {
                expression,
                name,
                args,
            } => {
                match &**expression {
                    Expr::ValueConverter { .. } | Expr::BindingBehavior { .. } => {
                        write!(f, "{expression}")?;
                    }
                    _ => write_operand(f, expression)?,
                }
                f.write_str(" & ")?;
                write_args(f, name, args)
            }
            Self::ForOfStatement {
                declaration,
                iterable,
            } => write!(f, "{declaration} of {iterable}"),
            Self::Interpolation { parts, expressions } => {
                for (i, part) in parts.iter().enumerate() {
                    f.write_str(part)?;
                    if let Some(e) = expressions.get(i) {
                        write!(f, "${{{e}}}")?;
                    }
                }
                Ok(())
            }
            Self::BindingIdentifier { name } => f.write_str(name),
            Self::ArrayBindingPattern { elements } => {
                f.write_str("[")?;
                write_list(f, elements)?;
                f.write_str("]")
            }
            Self::ObjectBindingPattern { keys, values } => {
                f.write_str("{")?;
                for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match &**value {
                        Expr::BindingIdentifier { name } if name == key => f.write_str(key)?,
                        _ => write!(f, "{key}: {value}")?,
                    }
                }
                f.write_str("}")
            }
        }
    }
}
