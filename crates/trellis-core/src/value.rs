#![forbid(unsafe_code)]

//! Dynamic values with host-language semantics.
//!
//! [`Value`] is what binding expressions produce and consume. Reference
//! variants (`Object`, `Array`, ...) share storage on clone; primitive
//! variants are copied.
//!
//! # Equality
//!
//! | Operation          | Rule |
//! |--------------------|------|
//! | [`Value::strict_eq`] | same variant and equal primitive, or same reference; `NaN` is never equal |
//! | [`Value::loose_eq`]  | `null == undefined`; numbers, strings and booleans coerce through [`Value::to_number`] |
//! | [`Value::same_value_zero`] | strict, except `NaN` equals `NaN` (map and set keys) |
//!
//! The Rust `PartialEq` impl is `strict_eq`, which is the comparison
//! bindings use to decide whether a target needs updating.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::collections::{ArrayRef, MapRef, SetRef};
use crate::dom::Node;
use crate::object::ObjectRef;
use crate::promise::Promise;

/// A dynamic value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Map(MapRef),
    Set(SetRef),
    Function(FunctionRef),
    Node(Node),
    Promise(Promise),
    /// A runtime-level handle (view, factory, definition) carried through
    /// bindable properties.
    Opaque(OpaqueRef),
}

impl Value {
    /// Shorthand for a string value.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::String(Rc::from(s))
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// `null` or `undefined`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Whether this is a reference (object-like) value.
    #[must_use]
    pub fn is_object_like(&self) -> bool {
        !matches!(
            self,
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_)
        )
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Downcast an opaque handle.
    #[must_use]
    pub fn downcast_opaque<T: Any>(&self) -> Option<Rc<T>> {
        match self {
            Self::Opaque(o) => o.downcast::<T>(),
            _ => None,
        }
    }

    /// Truthiness (`!!x`).
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric conversion (`+x`).
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => string_to_number(s),
            Self::Array(a) => string_to_number(&Value::Array(a.clone()).to_display_string()),
            _ => f64::NAN,
        }
    }

    /// String conversion (`String(x)`).
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Object(_) => "[object Object]".to_owned(),
            Self::Array(a) => a
                .to_vec()
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Map(_) => "[object Map]".to_owned(),
            Self::Set(_) => "[object Set]".to_owned(),
            Self::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
            Self::Node(n) => n.text_content(),
            Self::Promise(_) => "[object Promise]".to_owned(),
            Self::Opaque(o) => format!("[object {}]", o.type_name()),
        }
    }

    /// The `typeof` operator.
    #[must_use]
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            _ => "object",
        }
    }

    /// Strict equality (`===`).
    #[must_use]
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Map(a), Self::Map(b)) => a.ptr_eq(b),
            (Self::Set(a), Self::Set(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Node(a), Self::Node(b)) => a.ptr_eq(b),
            (Self::Promise(a), Self::Promise(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Loose equality (`==`).
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Self::Bool(_), _) | (_, Self::Bool(_)) => {
                Value::Number(self.to_number()).loose_eq(&Value::Number(other.to_number()))
            }
            (Self::Number(a), Self::String(_)) => *a == other.to_number(),
            (Self::String(_), Self::Number(b)) => self.to_number() == *b,
            (a, b) if a.is_object_like() != b.is_object_like() => {
                let (obj, prim) = if a.is_object_like() { (a, b) } else { (b, a) };
                Value::String(Rc::from(obj.to_display_string())).loose_eq(prim)
            }
            _ => self.strict_eq(other),
        }
    }

    /// SameValueZero: strict equality where `NaN` equals `NaN`.
    #[must_use]
    pub fn same_value_zero(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_eq(other),
        }
    }

    /// The `+` operator: concatenation when either side is a string after
    /// primitive conversion, numeric addition otherwise.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        let left_stringy = matches!(self, Self::String(_)) || self.is_object_like();
        let right_stringy = matches!(other, Self::String(_)) || other.is_object_like();
        if left_stringy || right_stringy {
            let mut s = self.to_display_string();
            s.push_str(&other.to_display_string());
            Self::String(Rc::from(s))
        } else {
            Self::Number(self.to_number() + other.to_number())
        }
    }

    /// Relational comparison; `None` when either side is `NaN`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }

    /// Identity key for reference values; `None` for primitives.
    #[must_use]
    pub fn identity(&self) -> Option<usize> {
        match self {
            Self::Object(o) => Some(o.id()),
            Self::Array(a) => Some(a.id()),
            Self::Map(m) => Some(m.id()),
            Self::Set(s) => Some(s.id()),
            Self::Function(f) => Some(Rc::as_ptr(&f.0).cast::<()>() as usize),
            Self::Node(n) => Some(n.id()),
            Self::Promise(p) => Some(p.id()),
            Self::Opaque(o) => Some(Rc::as_ptr(&o.value).cast::<()>() as usize),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(o) => fmt::Debug::fmt(o, f),
            Self::Array(a) => fmt::Debug::fmt(a, f),
            Self::Map(m) => fmt::Debug::fmt(m, f),
            Self::Set(s) => fmt::Debug::fmt(s, f),
            Self::Function(func) => write!(f, "[function {}]", func.name()),
            Self::Node(n) => fmt::Debug::fmt(n, f),
            Self::Promise(p) => fmt::Debug::fmt(p, f),
            Self::Opaque(o) => write!(f, "[opaque {}]", o.type_name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Self::Number(n as f64)
            }
        })*
    };
}

impl_from_number!(i32, i64, u32, usize, f32);

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Self::Object(o)
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Self::Array(a)
    }
}

impl From<MapRef> for Value {
    fn from(m: MapRef) -> Self {
        Self::Map(m)
    }
}

impl From<SetRef> for Value {
    fn from(s: SetRef) -> Self {
        Self::Set(s)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Self::Function(f)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Self::Node(n)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Self::Promise(p)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Functions and opaque handles
// ---------------------------------------------------------------------------

type NativeFn = dyn Fn(&Value, &[Value]) -> Value;

struct FunctionInner {
    name: Rc<str>,
    call: Box<NativeFn>,
}

/// A callable value. The closure receives `this` and the arguments.
#[derive(Clone)]
pub struct FunctionRef(Rc<FunctionInner>);

impl FunctionRef {
    pub fn new(name: &str, call: impl Fn(&Value, &[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(FunctionInner {
            name: Rc::from(name),
            call: Box::new(call),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Invoke with an explicit `this`.
    pub fn call(&self, this: &Value, args: &[Value]) -> Value {
        (self.0.call)(this, args)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRef")
            .field("name", &self.0.name)
            .finish_non_exhaustive()
    }
}

/// A type-erased shared handle.
#[derive(Clone)]
pub struct OpaqueRef {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl OpaqueRef {
    pub fn new<T: Any>(value: Rc<T>) -> Self {
        Self {
            value,
            type_name: short_type_name::<T>(),
        }
    }

    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.value).downcast::<T>().ok()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

impl<T: Any> From<Rc<T>> for OpaqueRef {
    fn from(value: Rc<T>) -> Self {
        Self::new(value)
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

// ---------------------------------------------------------------------------
// Number helpers
// ---------------------------------------------------------------------------

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return f64::NAN;
            }
            trimmed.parse::<f64>().unwrap_or(f64::NAN)
        }
    }
}

/// Format a number the way `String(n)` does for the common cases.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_equality_distinguishes_types() {
        assert!(Value::from(1).strict_eq(&Value::from(1.0)));
        assert!(!Value::from(1).strict_eq(&Value::str("1")));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
        assert!(!Value::Number(f64::NAN).strict_eq(&Value::Number(f64::NAN)));
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(Value::from(1).loose_eq(&Value::str("1")));
        assert!(Value::from(true).loose_eq(&Value::from(1)));
        assert!(Value::str("").loose_eq(&Value::from(0)));
        assert!(!Value::Null.loose_eq(&Value::from(0)));
        assert!(!Value::Undefined.loose_eq(&Value::from(false)));
    }

    #[test]
    fn same_value_zero_matches_nan() {
        let nan = Value::Number(f64::NAN);
        assert!(nan.same_value_zero(&nan.clone()));
    }

    #[test]
    fn add_concatenates_with_strings() {
        assert_eq!(Value::from(1).add(&Value::from(2)), Value::from(3));
        assert_eq!(Value::str("a").add(&Value::from(1)), Value::str("a1"));
        assert_eq!(Value::from(1).add(&Value::str("b")), Value::str("1b"));
        assert_eq!(Value::Null.add(&Value::from(1)), Value::from(1));
        assert!(Value::Undefined.add(&Value::from(1)).to_number().is_nan());
    }

    #[test]
    fn display_string_rules() {
        assert_eq!(Value::from(42).to_display_string(), "42");
        assert_eq!(Value::from(1.5).to_display_string(), "1.5");
        assert_eq!(Value::Number(-0.0).to_display_string(), "0");
        assert_eq!(Value::Number(f64::INFINITY).to_display_string(), "Infinity");
        assert_eq!(Value::Undefined.to_display_string(), "undefined");
        let arr = ArrayRef::from_vec(vec![Value::from(1), Value::Null, Value::str("x")]);
        assert_eq!(Value::Array(arr).to_display_string(), "1,,x");
    }

    #[test]
    fn to_number_rules() {
        assert_eq!(Value::str(" 12 ").to_number(), 12.0);
        assert_eq!(Value::str("").to_number(), 0.0);
        assert!(Value::str("abc").to_number().is_nan());
        assert_eq!(Value::from(true).to_number(), 1.0);
        assert!(Value::Undefined.to_number().is_nan());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("0").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::Object(ObjectRef::new()).is_truthy());
    }

    #[test]
    fn compare_strings_and_numbers() {
        assert_eq!(Value::str("a").compare(&Value::str("b")), Some(Ordering::Less));
        assert_eq!(Value::str("10").compare(&Value::from(9)), Some(Ordering::Greater));
        assert_eq!(Value::Undefined.compare(&Value::from(1)), None);
    }

    #[test]
    fn type_of_values() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::from(FunctionRef::new("f", |_, _| Value::Undefined)).type_of(), "function");
    }

    #[test]
    fn opaque_downcast() {
        let v = Value::Opaque(OpaqueRef::new(Rc::new(7u32)));
        assert_eq!(v.downcast_opaque::<u32>().as_deref(), Some(&7));
        assert!(v.downcast_opaque::<String>().is_none());
    }

    #[test]
    fn reference_identity() {
        let o = ObjectRef::new();
        let a = Value::Object(o.clone());
        let b = Value::Object(o);
        assert_eq!(a, b);
        assert_ne!(a, Value::Object(ObjectRef::new()));
    }
}
