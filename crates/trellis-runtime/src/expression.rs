#![forbid(unsafe_code)]

//! Expression evaluation over [`Expr`] trees.
//!
//! [`Evaluate`] is implemented for the parser's AST and gives every node
//! five operations:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | `evaluate` | compute the current value against a scope |
//! | `assign` | write a value back through an assignable node |
//! | `connect` | declare the node's current dependencies to a binding |
//! | `bind` / `unbind` | apply and remove converter signals and binding behaviors |
//!
//! # Null propagation
//!
//! Member and keyed access on `null`/`undefined` yields `undefined`. Calling
//! a missing function yields `undefined` unless
//! [`LifecycleFlags::MUST_EVALUATE`] is set, in which case it is
//! [`EvalError::NotAFunction`]. Calling a value that exists but is not a
//! function is always an error.
//!
//! # Connect
//!
//! `connect` evaluates the deciding operand of `?:`, `&&` and `||` to pick
//! the branch to observe, so these operands are evaluated twice per
//! connect cycle (once here, once by the binding's own evaluation).
//! Keyed access on an array with a numeric key observes the collection,
//! never the individual index.
//!
//! # Resources
//!
//! Converters and behaviors are resolved by name from the locator each
//! time they are needed, so the same parsed tree can resolve different
//! resources in different containers.

use std::rc::Rc;

use trellis_core::value::format_number;
use trellis_core::{ArrayRef, LifecycleFlags, ObjectRef, Value};
use trellis_expr::{BinaryOp, Expr, Literal, UnaryOp};

use crate::binding::{BehaviorHost, Connectable};
use crate::error::EvalError;
use crate::resources::ServiceLocator;
use crate::scope::{BindingContext, Scope};

type EvalResult<T> = Result<T, EvalError>;

/// The evaluator contract.
pub trait Evaluate {
    fn evaluate(
        &self,
        flags: LifecycleFlags,
        scope: Option<&Scope>,
        locator: &dyn ServiceLocator,
    ) -> EvalResult<Value>;

    /// Write `value` through this node. Returns the value written.
    fn assign(
        &self,
        flags: LifecycleFlags,
        scope: Option<&Scope>,
        locator: &dyn ServiceLocator,
        value: Value,
    ) -> EvalResult<Value>;

    fn connect(
        &self,
        flags: LifecycleFlags,
        scope: Option<&Scope>,
        binding: &dyn Connectable,
    ) -> EvalResult<()>;

    fn bind(&self, flags: LifecycleFlags, scope: &Scope, binding: &dyn BehaviorHost) -> EvalResult<()>;

    fn unbind(&self, flags: LifecycleFlags, scope: &Scope, binding: &dyn BehaviorHost);

    /// Write an iteration item into `target` under this declaration's
    /// local name(s).
    fn declare(&self, target: &ObjectRef, item: Value) -> EvalResult<()>;
}

impl Evaluate for Expr {
    fn evaluate(
        &self,
        flags: LifecycleFlags,
        scope: Option<&Scope>,
        locator: &dyn ServiceLocator,
    ) -> EvalResult<Value> {
        let eval = |e: &Rc<Expr>| e.evaluate(flags, scope, locator);
        match self {
            Self::AccessThis { ancestor } => BindingContext::this(scope, *ancestor),
            Self::AccessScope { name, ancestor } => {
                let owner = BindingContext::get(scope, name, *ancestor)?;
                Ok(get_property(&owner, name))
            }
            Self::AccessMember { object, name } => {
                let instance = eval(object)?;
                Ok(get_property(&instance, name))
            }
            Self::AccessKeyed { object, key } => {
                let instance = eval(object)?;
                if instance.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let key = eval(key)?;
                Ok(get_keyed(&instance, &key))
            }
            Self::CallScope {
                name,
                args,
                ancestor,
            } => {
                let this = BindingContext::get(scope, name, *ancestor)?;
                let args = eval_list(args, flags, scope, locator)?;
                call_member(flags, &this, name, &args)
            }
            Self::CallMember { object, name, args } => {
                let instance = eval(object)?;
                let args = eval_list(args, flags, scope, locator)?;
                call_member(flags, &instance, name, &args)
            }
            Self::CallFunction { func, args } => {
                let callee = eval(func)?;
                let args = eval_list(args, flags, scope, locator)?;
                match callee {
                    Value::Function(f) => Ok(f.call(&Value::Undefined, &args)),
                    v if v.is_nullish() && !flags.contains(LifecycleFlags::MUST_EVALUATE) => {
                        Ok(Value::Undefined)
                    }
                    _ => Err(EvalError::NotAFunction {
                        name: func.to_string(),
                    }),
                }
            }
            Self::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let l = eval(left)?;
                    if l.is_truthy() { eval(right) } else { Ok(l) }
                }
                BinaryOp::Or => {
                    let l = eval(left)?;
                    if l.is_truthy() { Ok(l) } else { eval(right) }
                }
                _ => binary(*op, &eval(left)?, &eval(right)?),
            },
            Self::Unary { op, operand } => {
                let v = eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!v.is_truthy()),
                    UnaryOp::Neg => Value::Number(-v.to_number()),
                    UnaryOp::Plus => Value::Number(v.to_number()),
                    UnaryOp::TypeOf => Value::str(v.type_of()),
                    UnaryOp::Void => Value::Undefined,
                })
            }
            Self::Conditional { condition, yes, no } => {
                if eval(condition)?.is_truthy() {
                    eval(yes)
                } else {
                    eval(no)
                }
            }
            Self::Assign { target, value } => {
                let v = eval(value)?;
                target.assign(flags, scope, locator, v)
            }
            Self::PrimitiveLiteral(lit) => Ok(literal(lit)),
            Self::ArrayLiteral { elements } => Ok(Value::Array(ArrayRef::from_vec(eval_list(
                elements, flags, scope, locator,
            )?))),
            Self::ObjectLiteral { keys, values } => {
                let obj = ObjectRef::new();
                for (key, value) in keys.iter().zip(values) {
                    obj.set(key, eval(value)?);
                }
                Ok(Value::Object(obj))
            }
            Self::Template {
                cooked,
                expressions,
            } => {
                let mut out = String::new();
                for (i, part) in cooked.iter().enumerate() {
                    out.push_str(part);
                    if let Some(e) = expressions.get(i) {
                        out.push_str(&eval(e)?.to_display_string());
                    }
                }
                Ok(Value::from(out))
            }
            Self::TaggedTemplate {
                cooked,
                func,
                expressions,
                ..
            } => {
                let callee = eval(func)?;
                let Value::Function(f) = callee else {
                    return Err(EvalError::NotAFunction {
                        name: func.to_string(),
                    });
                };
                let strings: Vec<Value> = cooked.iter().map(|s| Value::String(Rc::clone(s))).collect();
                let mut args = vec![Value::Array(ArrayRef::from_vec(strings))];
                args.extend(eval_list(expressions, flags, scope, locator)?);
                Ok(f.call(&Value::Undefined, &args))
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let converter = locator
                    .value_converter(name)
                    .ok_or_else(|| EvalError::ConverterNotFound { name: Rc::clone(name) })?;
                let value = eval(expression)?;
                let args = eval_list(args, flags, scope, locator)?;
                Ok(converter.to_view(value, &args))
            }
            Self::BindingBehavior { expression, .. } => eval(expression),
            Self::ForOfStatement { iterable, .. } => eval(iterable),
            Self::Interpolation { parts, expressions } => {
                let mut out = String::new();
                for (i, part) in parts.iter().enumerate() {
                    out.push_str(part);
                    if let Some(e) = expressions.get(i) {
                        let v = eval(e)?;
                        if !v.is_nullish() {
                            out.push_str(&v.to_display_string());
                        }
                    }
                }
                Ok(Value::from(out))
            }
            Self::BindingIdentifier { name } => Ok(Value::String(Rc::clone(name))),
            Self::ArrayBindingPattern { .. } | Self::ObjectBindingPattern { .. } => Ok(Value::Undefined),
        }
    }

    fn assign(
        &self,
        flags: LifecycleFlags,
        scope: Option<&Scope>,
        locator: &dyn ServiceLocator,
        value: Value,
    ) -> EvalResult<Value> {
        match self {
            Self::AccessScope { name, ancestor } => {
                let owner = BindingContext::get(scope, name, *ancestor)?;
                set_property(&owner, name, value.clone());
                Ok(value)
            }
            Self::AccessMember { object, name } => {
                let mut instance = object.evaluate(flags, scope, locator)?;
                if !instance.is_object_like() {
                    instance = Value::Object(ObjectRef::new());
                    object.assign(flags, scope, locator, instance.clone())?;
                }
                set_property(&instance, name, value.clone());
                Ok(value)
            }
            Self::AccessKeyed { object, key } => {
                let instance = object.evaluate(flags, scope, locator)?;
                let key = key.evaluate(flags, scope, locator)?;
                match (&instance, array_index(&key)) {
                    (Value::Array(a), Some(i)) => a.set(i, value.clone()),
                    _ => set_property(&instance, &key.to_display_string(), value.clone()),
                }
                Ok(value)
            }
            Self::Assign { target, value: inner } => {
                inner.assign(flags, scope, locator, value.clone())?;
                target.assign(flags, scope, locator, value)
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let converter = locator
                    .value_converter(name)
                    .ok_or_else(|| EvalError::ConverterNotFound { name: Rc::clone(name) })?;
                let args = eval_list(args, flags, scope, locator)?;
                let converted = converter.from_view(value, &args);
                expression.assign(flags, scope, locator, converted)
            }
            Self::BindingBehavior { expression, .. } => expression.assign(flags, scope, locator, value),
            _ => Err(EvalError::NotAssignable {
                expression: self.to_string(),
            }),
        }
    }

    fn connect(
        &self,
        flags: LifecycleFlags,
        scope: Option<&Scope>,
        binding: &dyn Connectable,
    ) -> EvalResult<()> {
        let container = Rc::clone(binding.container());
        let locator: &dyn ServiceLocator = &*container;
        let connect_all = |list: &[Rc<Expr>]| -> EvalResult<()> {
            for e in list {
                e.connect(flags, scope, binding)?;
            }
            Ok(())
        };
        match self {
            Self::AccessScope { name, ancestor } => {
                let owner = BindingContext::get(scope, name, *ancestor)?;
                if owner.is_object_like() {
                    binding.observe_property(flags, &owner, name)?;
                }
                Ok(())
            }
            Self::AccessMember { object, name } => {
                object.connect(flags, scope, binding)?;
                let instance = object.evaluate(flags, scope, locator)?;
                if instance.is_object_like() {
                    binding.observe_property(flags, &instance, name)?;
                }
                Ok(())
            }
            Self::AccessKeyed { object, key } => {
                object.connect(flags, scope, binding)?;
                let instance = object.evaluate(flags, scope, locator)?;
                if !instance.is_object_like() {
                    return Ok(());
                }
                key.connect(flags, scope, binding)?;
                let key = key.evaluate(flags, scope, locator)?;
                match (&instance, array_index(&key)) {
                    (Value::Array(_), Some(_)) => binding.observe_collection(flags, &instance),
                    _ => binding.observe_property(flags, &instance, &key.to_display_string()),
                }
            }
            Self::CallScope { args, .. } => connect_all(args),
            Self::CallMember { object, args, .. } => {
                object.connect(flags, scope, binding)?;
                let instance = object.evaluate(flags, scope, locator)?;
                if matches!(instance, Value::Array(_) | Value::Map(_) | Value::Set(_)) {
                    binding.observe_collection(flags, &instance)?;
                }
                connect_all(args)
            }
            Self::CallFunction { func, args } => {
                func.connect(flags, scope, binding)?;
                connect_all(args)
            }
            Self::Binary { op, left, right } => {
                let short_circuits = match op {
                    BinaryOp::And => !left.evaluate(flags, scope, locator)?.is_truthy(),
                    BinaryOp::Or => left.evaluate(flags, scope, locator)?.is_truthy(),
                    _ => false,
                };
                left.connect(flags, scope, binding)?;
                if short_circuits {
                    return Ok(());
                }
                right.connect(flags, scope, binding)
            }
            Self::Unary { operand, .. } => operand.connect(flags, scope, binding),
            Self::Conditional { condition, yes, no } => {
                let taken = condition.evaluate(flags, scope, locator)?.is_truthy();
                condition.connect(flags, scope, binding)?;
                if taken {
                    yes.connect(flags, scope, binding)
                } else {
                    no.connect(flags, scope, binding)
                }
            }
            Self::Assign { value, .. } => value.connect(flags, scope, binding),
            Self::ArrayLiteral { elements } => connect_all(elements),
            Self::ObjectLiteral { values, .. } => connect_all(values),
            Self::Template { expressions, .. } | Self::Interpolation { expressions, .. } => {
                connect_all(expressions)
            }
            Self::TaggedTemplate { func, expressions, .. } => {
                func.connect(flags, scope, binding)?;
                connect_all(expressions)
            }
            Self::ValueConverter { expression, args, .. } => {
                expression.connect(flags, scope, binding)?;
                connect_all(args)
            }
            Self::BindingBehavior { expression, .. } => expression.connect(flags, scope, binding),
            Self::ForOfStatement { iterable, .. } => iterable.connect(flags, scope, binding),
            Self::AccessThis { .. }
            | Self::PrimitiveLiteral(_)
            | Self::BindingIdentifier { .. }
            | Self::ArrayBindingPattern { .. }
            | Self::ObjectBindingPattern { .. } => Ok(()),
        }
    }

    fn bind(&self, flags: LifecycleFlags, scope: &Scope, binding: &dyn BehaviorHost) -> EvalResult<()> {
        match self {
            Self::ValueConverter { expression, name, .. } => {
                bind_inner(expression, flags, scope, binding, || {
                    let converter = binding
                        .container()
                        .value_converter(name)
                        .ok_or_else(|| EvalError::ConverterNotFound { name: Rc::clone(name) })?;
                    let signals = converter.signals();
                    if !signals.is_empty() {
                        let Some(subscriber) = binding.signal_subscriber() else {
                            return Err(EvalError::InvalidBehaviorUse {
                                name: Rc::clone(name),
                                reason: "binding cannot receive signals",
                            });
                        };
                        let signaler = binding.container().signaler();
                        for signal in signals {
                            signaler.add_signal_listener(signal, subscriber.clone());
                        }
                    }
                    Ok(())
                })
            }
            Self::BindingBehavior {
                expression,
                name,
                args,
            } => {
                bind_inner(expression, flags, scope, binding, || {
                    let container = Rc::clone(binding.container());
                    let behavior = container
                        .binding_behavior(name)
                        .ok_or_else(|| EvalError::BehaviorNotFound { name: Rc::clone(name) })?;
                    let args = eval_list(args, flags, Some(scope), &*container)?;
                    binding.behaviors().apply(name)?;
                    behavior
                        .bind(flags, scope, binding, &args)
                        .inspect_err(|_| binding.behaviors().release(name))
                })
            }
            Self::ForOfStatement { iterable, .. } if iterable.has_bind() => iterable.bind(flags, scope, binding),
            _ => Ok(()),
        }
    }

    fn unbind(&self, flags: LifecycleFlags, scope: &Scope, binding: &dyn BehaviorHost) {
        match self {
            Self::ValueConverter { expression, name, .. } => {
                if let Some(converter) = binding.container().value_converter(name) {
                    if let Some(subscriber) = binding.signal_subscriber() {
                        let signaler = binding.container().signaler();
                        for signal in converter.signals() {
                            signaler.remove_signal_listener(signal, &subscriber);
                        }
                    }
                }
                if expression.has_unbind() {
                    expression.unbind(flags, scope, binding);
                }
            }
            Self::BindingBehavior { expression, name, .. } => {
                if let Some(behavior) = binding.container().binding_behavior(name) {
                    behavior.unbind(flags, scope, binding);
                }
                binding.behaviors().release(name);
                if expression.has_unbind() {
                    expression.unbind(flags, scope, binding);
                }
            }
            Self::ForOfStatement { iterable, .. } if iterable.has_unbind() => {
                iterable.unbind(flags, scope, binding);
            }
            _ => {}
        }
    }

    fn declare(&self, target: &ObjectRef, item: Value) -> EvalResult<()> {
        match self {
            Self::ForOfStatement { declaration, .. } => declaration.declare(target, item),
            Self::BindingIdentifier { name } => {
                target.set(name, item);
                Ok(())
            }
            Self::ArrayBindingPattern { elements } => {
                for (i, element) in elements.iter().enumerate() {
                    element.declare(target, get_keyed(&item, &Value::from(i)))?;
                }
                Ok(())
            }
            Self::ObjectBindingPattern { keys, values } => {
                for (key, local) in keys.iter().zip(values) {
                    local.declare(target, get_property(&item, key))?;
                }
                Ok(())
            }
            _ => Err(EvalError::NotAssignable {
                expression: self.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// Number of items an iterable yields.
pub fn count(iterable: &Value) -> EvalResult<usize> {
    match iterable {
        Value::Undefined | Value::Null => Ok(0),
        Value::Array(a) => Ok(a.len()),
        Value::Map(m) => Ok(m.len()),
        Value::Set(s) => Ok(s.len()),
        Value::Number(n) => Ok(number_count(*n)),
        other => Err(EvalError::NotIterable {
            expression: other.type_of().to_owned(),
        }),
    }
}

/// The items an iterable yields: array elements, `[key, value]` pairs for
/// maps, set members, `0..n` for numbers and nothing for null.
pub fn iterate(iterable: &Value) -> EvalResult<Vec<Value>> {
    match iterable {
        Value::Undefined | Value::Null => Ok(Vec::new()),
        Value::Array(a) => Ok(a.to_vec()),
        Value::Map(m) => Ok(m
            .entries()
            .into_iter()
            .map(|(k, v)| Value::Array(ArrayRef::from_vec(vec![k, v])))
            .collect()),
        Value::Set(s) => Ok(s.values()),
        Value::Number(n) => Ok((0..number_count(*n)).map(Value::from).collect()),
        other => Err(EvalError::NotIterable {
            expression: other.type_of().to_owned(),
        }),
    }
}

fn number_count(n: f64) -> usize {
    if n.is_finite() && n > 0.0 {
        // Saturating float-to-int conversion.
        n.floor() as usize
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Property access helpers
// ---------------------------------------------------------------------------

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(Rc::clone(s)),
    }
}

fn eval_list(
    list: &[Rc<Expr>],
    flags: LifecycleFlags,
    scope: Option<&Scope>,
    locator: &dyn ServiceLocator,
) -> EvalResult<Vec<Value>> {
    list.iter().map(|e| e.evaluate(flags, scope, locator)).collect()
}

/// Bind the wrapped expression, then run `outer`. When `outer` fails the
/// wrapped expression is unbound again.
fn bind_inner(
    expression: &Expr,
    flags: LifecycleFlags,
    scope: &Scope,
    binding: &dyn BehaviorHost,
    outer: impl FnOnce() -> EvalResult<()>,
) -> EvalResult<()> {
    if expression.has_bind() {
        expression.bind(flags, scope, binding)?;
    }
    outer().inspect_err(|_| {
        if expression.has_unbind() {
            expression.unbind(flags, scope, binding);
        }
    })
}

fn array_index(key: &Value) -> Option<usize> {
    let n = match key {
        Value::Number(n) => *n,
        Value::String(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    (n >= 0.0 && n.fract() == 0.0 && n.is_finite()).then_some(n as usize)
}

/// `target[key]` for a string key, following host-language rules for
/// built-in types.
pub(crate) fn get_property(target: &Value, key: &str) -> Value {
    match target {
        Value::Object(o) => o.get(key),
        Value::Node(n) => n.get_property(key),
        Value::Array(a) => match key {
            "length" => Value::from(a.len()),
            _ => array_index(&Value::str(key)).map_or(Value::Undefined, |i| a.get(i)),
        },
        Value::Map(m) if key == "size" => Value::from(m.len()),
        Value::Set(s) if key == "size" => Value::from(s.len()),
        Value::String(s) => match key {
            "length" => Value::from(s.chars().count()),
            _ => array_index(&Value::str(key))
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Undefined, |c| Value::from(c.to_string())),
        },
        Value::Function(f) if key == "name" => Value::str(f.name()),
        _ => Value::Undefined,
    }
}

fn get_keyed(target: &Value, key: &Value) -> Value {
    match (target, array_index(key)) {
        (Value::Array(a), Some(i)) => a.get(i),
        _ => get_property(target, &key.to_display_string()),
    }
}

fn set_property(target: &Value, key: &str, value: Value) {
    match target {
        Value::Object(o) => o.set(key, value),
        Value::Node(n) => n.set_property(key, value),
        Value::Array(a) => {
            if let Some(i) = array_index(&Value::str(key)) {
                a.set(i, value);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

fn call_member(flags: LifecycleFlags, this: &Value, name: &str, args: &[Value]) -> EvalResult<Value> {
    if let Some(result) = builtin_method(this, name, args) {
        return Ok(result);
    }
    match get_property(this, name) {
        Value::Function(f) => Ok(f.call(this, args)),
        v if v.is_nullish() && !flags.contains(LifecycleFlags::MUST_EVALUATE) => Ok(Value::Undefined),
        _ => Err(EvalError::NotAFunction { name: name.to_owned() }),
    }
}

/// A small set of methods on built-in values that templates commonly call.
fn builtin_method(this: &Value, name: &str, args: &[Value]) -> Option<Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
    match this {
        Value::Array(a) => match name {
            "indexOf" => Some(Value::from(
                a.index_of(&arg(0)).map_or(-1.0, |i| i as f64),
            )),
            "includes" => Some(Value::Bool(a.to_vec().iter().any(|v| v.same_value_zero(&arg(0))))),
            "join" => {
                let sep = args.first().map_or_else(|| ",".to_owned(), Value::to_display_string);
                let parts: Vec<String> = a
                    .to_vec()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                    .collect();
                Some(Value::from(parts.join(&sep)))
            }
            _ => None,
        },
        Value::Map(m) => match name {
            "get" => Some(m.get(&arg(0))),
            "has" => Some(Value::Bool(m.has(&arg(0)))),
            _ => None,
        },
        Value::Set(s) if name == "has" => Some(Value::Bool(s.has(&arg(0)))),
        Value::String(s) => match name {
            "toUpperCase" => Some(Value::from(s.to_uppercase())),
            "toLowerCase" => Some(Value::from(s.to_lowercase())),
            "trim" => Some(Value::str(s.trim())),
            "includes" => Some(Value::Bool(s.contains(&*arg(0).to_display_string()))),
            "startsWith" => Some(Value::Bool(s.starts_with(&*arg(0).to_display_string()))),
            "endsWith" => Some(Value::Bool(s.ends_with(&*arg(0).to_display_string()))),
            _ => None,
        },
        Value::Number(n) if name == "toFixed" => {
            let digits = arg(0).to_number();
            let digits = if digits.is_finite() { digits.clamp(0.0, 100.0) as usize } else { 0 };
            Some(Value::from(format!("{n:.digits$}")))
        }
        Value::Number(n) if name == "toString" => Some(Value::from(format_number(*n))),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn binary(op: BinaryOp, l: &Value, r: &Value) -> EvalResult<Value> {
    use std::cmp::Ordering;
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(l.to_number(), r.to_number()));
    Ok(match op {
        BinaryOp::Eq => Value::Bool(l.loose_eq(r)),
        BinaryOp::Ne => Value::Bool(!l.loose_eq(r)),
        BinaryOp::StrictEq => Value::Bool(l.strict_eq(r)),
        BinaryOp::StrictNe => Value::Bool(!l.strict_eq(r)),
        BinaryOp::Lt => Value::Bool(l.compare(r) == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(l.compare(r) == Some(Ordering::Greater)),
        BinaryOp::Le => Value::Bool(matches!(l.compare(r), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Ge => Value::Bool(matches!(
            l.compare(r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::In => Value::Bool(match r {
            Value::Object(o) => o.has(&l.to_display_string()),
            Value::Array(a) => l.to_display_string() == "length" || array_index(l).is_some_and(|i| i < a.len()),
            _ => false,
        }),
        BinaryOp::InstanceOf => Value::Bool(match (l, r) {
            (Value::Object(o), Value::Function(f)) => o.class_name() == Some(f.name()),
            (Value::Array(_), Value::Function(f)) => f.name() == "Array",
            (Value::Map(_), Value::Function(f)) => f.name() == "Map",
            (Value::Set(_), Value::Function(f)) => f.name() == "Set",
            _ => false,
        }),
        BinaryOp::Add => l.add(r),
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Mod => num(|a, b| a % b),
        // Short-circuiting operators never reach the strict path.
        BinaryOp::And | BinaryOp::Or => {
            return Err(EvalError::UnknownOperator {
                operator: op.as_str().to_owned(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{BindingBehavior, FnConverter, ValueConverter};
    use rustc_hash::FxHashMap;
    use trellis_core::{FunctionRef, MapRef};
    use trellis_expr::{parse, BindingType};

    #[derive(Default)]
    struct Locator {
        converters: FxHashMap<&'static str, Rc<dyn ValueConverter>>,
    }

    impl ServiceLocator for Locator {
        fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>> {
            self.converters.get(name).cloned()
        }

        fn binding_behavior(&self, _name: &str) -> Option<Rc<dyn BindingBehavior>> {
            None
        }
    }

    fn scope_of(pairs: Vec<(&str, Value)>) -> Scope {
        Scope::create(Value::Object(ObjectRef::from_pairs(pairs)), None)
    }

    fn eval_in(text: &str, scope: &Scope) -> EvalResult<Value> {
        let expr = parse(text, BindingType::None).expect("parse");
        expr.evaluate(LifecycleFlags::NONE, Some(scope), &Locator::default())
    }

    fn eval(text: &str) -> Value {
        eval_in(text, &scope_of(vec![])).expect("eval")
    }

    #[test]
    fn nested_member_access() {
        let c = ObjectRef::from_pairs([("c", 42)]);
        let b = ObjectRef::from_pairs([("b", Value::Object(c))]);
        let scope = scope_of(vec![("a", Value::Object(ObjectRef::from_pairs([("b", Value::Object(b))])))]);
        assert_eq!(eval_in("a.b.b.c", &scope).expect("eval"), Value::from(42));
    }

    #[test]
    fn member_of_missing_is_undefined() {
        assert_eq!(eval("missing.deep.chain"), Value::Undefined);
        assert_eq!(eval("missing[0]"), Value::Undefined);
    }

    #[test]
    fn calling_missing_function_depends_on_must_evaluate() {
        let scope = scope_of(vec![]);
        let expr = parse("nope()", BindingType::None).expect("parse");
        let lenient = expr.evaluate(LifecycleFlags::NONE, Some(&scope), &Locator::default());
        assert_eq!(lenient, Ok(Value::Undefined));
        let strict = expr.evaluate(LifecycleFlags::MUST_EVALUATE, Some(&scope), &Locator::default());
        assert_eq!(strict.map_err(|e| e.code()), Err("TRL-202"));
    }

    #[test]
    fn calling_a_non_function_is_an_error() {
        let scope = scope_of(vec![("x", Value::from(1))]);
        assert!(matches!(eval_in("x()", &scope), Err(EvalError::NotAFunction { .. })));
    }

    #[test]
    fn scope_call_binds_this() {
        let scope = scope_of(vec![("n", Value::from(3))]);
        let bc = scope.binding_context().clone();
        if let Value::Object(o) = &bc {
            o.set(
                "double",
                FunctionRef::new("double", |this, _| {
                    Value::from(this.as_object().map_or(0.0, |o| o.get("n").to_number()) * 2.0)
                }),
            );
        }
        assert_eq!(eval_in("double()", &scope).expect("eval"), Value::from(6));
    }

    #[test]
    fn operators_follow_host_semantics() {
        assert_eq!(eval("1 + '1'"), Value::str("11"));
        assert_eq!(eval("'2' * 3"), Value::from(6));
        assert_eq!(eval("1 == '1'"), Value::Bool(true));
        assert_eq!(eval("1 === '1'"), Value::Bool(false));
        assert_eq!(eval("null == undefined"), Value::Bool(true));
        assert_eq!(eval("0 || 'x'"), Value::str("x"));
        assert_eq!(eval("0 && 'x'"), Value::from(0));
        assert_eq!(eval("typeof 'a'"), Value::str("string"));
        assert_eq!(eval("!0"), Value::Bool(true));
        assert_eq!(eval("2 > 1 ? 'y' : 'n'"), Value::str("y"));
        assert_eq!(eval("'b' in {b: 1}"), Value::Bool(true));
    }

    #[test]
    fn template_literal_and_interpolation() {
        let scope = scope_of(vec![("name", Value::str("x")), ("gone", Value::Null)]);
        assert_eq!(eval_in("`a${name}b`", &scope).expect("eval"), Value::str("axb"));
        let interp = trellis_expr::parse_interpolation("[${name}${gone}]")
            .expect("parse")
            .expect("has expressions");
        let v = interp
            .evaluate(LifecycleFlags::NONE, Some(&scope), &Locator::default())
            .expect("eval");
        assert_eq!(v, Value::str("[x]"));
    }

    #[test]
    fn converter_resolved_at_evaluate_time() {
        let scope = scope_of(vec![("a", Value::from(5))]);
        let expr = parse("a | double", BindingType::None).expect("parse");
        let empty = Locator::default();
        assert!(matches!(
            expr.evaluate(LifecycleFlags::NONE, Some(&scope), &empty),
            Err(EvalError::ConverterNotFound { .. })
        ));
        let mut locator = Locator::default();
        locator.converters.insert(
            "double",
            Rc::new(
                FnConverter::new(|v, _| Value::from(v.to_number() * 2.0))
                    .with_from_view(|v, _| Value::from(v.to_number() / 2.0)),
            ),
        );
        assert_eq!(
            expr.evaluate(LifecycleFlags::NONE, Some(&scope), &locator),
            Ok(Value::from(10))
        );
        expr.assign(LifecycleFlags::NONE, Some(&scope), &locator, Value::from(14))
            .expect("assign");
        assert_eq!(eval_in("a", &scope).expect("eval"), Value::from(7));
    }

    #[test]
    fn assign_creates_intermediate_objects() {
        let scope = scope_of(vec![]);
        let expr = parse("a.b = 3", BindingType::None).expect("parse");
        expr.evaluate(LifecycleFlags::NONE, Some(&scope), &Locator::default())
            .expect("eval");
        assert_eq!(eval_in("a.b", &scope).expect("eval"), Value::from(3));
    }

    #[test]
    fn assign_to_non_assignable_is_an_error() {
        let scope = scope_of(vec![]);
        let expr = parse("1 + 2", BindingType::None).expect("parse");
        let err = expr
            .assign(LifecycleFlags::NONE, Some(&scope), &Locator::default(), Value::from(1))
            .unwrap_err();
        assert_eq!(err.code(), "TRL-206");
    }

    #[test]
    fn keyed_array_assignment() {
        let arr = ArrayRef::from_vec(vec![Value::from(1), Value::from(2)]);
        let scope = scope_of(vec![("xs", Value::Array(arr.clone()))]);
        let expr = parse("xs[1]", BindingType::None).expect("parse");
        expr.assign(LifecycleFlags::NONE, Some(&scope), &Locator::default(), Value::from(9))
            .expect("assign");
        assert_eq!(arr.get(1), Value::from(9));
    }

    #[test]
    fn iterate_supported_kinds() {
        assert_eq!(iterate(&Value::Null).expect("null"), Vec::<Value>::new());
        assert_eq!(iterate(&Value::from(3)).expect("number").len(), 3);
        let map = MapRef::from_entries([(Value::str("k"), Value::from(1))]);
        let items = iterate(&Value::Map(map)).expect("map");
        assert_eq!(items.len(), 1);
        assert!(matches!(iterate(&Value::Bool(true)), Err(EvalError::NotIterable { .. })));
        assert_eq!(count(&Value::from(2.7)).expect("count"), 2);
    }

    #[test]
    fn declare_destructures_patterns() {
        let target = ObjectRef::new();
        let pair = Value::Array(ArrayRef::from_vec(vec![Value::str("k"), Value::from(1)]));
        let for_of = parse("[key, value] of map", BindingType::IsIterator).expect("parse");
        for_of.declare(&target, pair).expect("declare");
        assert_eq!(target.get("key"), Value::str("k"));
        assert_eq!(target.get("value"), Value::from(1));

        let item = Value::Object(ObjectRef::from_pairs([("id", 7)]));
        let for_of = parse("{id: ident} of list", BindingType::IsIterator).expect("parse");
        for_of.declare(&target, item).expect("declare");
        assert_eq!(target.get("ident"), Value::from(7));
    }

    #[test]
    fn builtin_methods() {
        let scope = scope_of(vec![(
            "xs",
            Value::Array(ArrayRef::from_vec(vec![Value::from(1), Value::from(2)])),
        )]);
        assert_eq!(eval_in("xs.join('-')", &scope).expect("eval"), Value::str("1-2"));
        assert_eq!(eval_in("xs.indexOf(2)", &scope).expect("eval"), Value::from(1));
        assert_eq!(eval("'ab'.toUpperCase()"), Value::str("AB"));
        assert_eq!(eval_in("xs.length", &scope).expect("eval"), Value::from(2));
    }
}
