#![forbid(unsafe_code)]

//! Name resolution for expression evaluation.
//!
//! A [`Scope`] pairs the user's binding context with an
//! [`OverrideContext`]. Override contexts form a chain towards the root;
//! each owns an observable object for contextual names (`$index`,
//! `$event`, `let` values) that shadow the binding context.
//!
//! # Resolution
//!
//! [`BindingContext::get`] returns the object a name should be read from:
//!
//! 1. With `ancestor > 0`, hop that many override contexts up (or yield
//!    `undefined` if the chain is shorter) and pick that level's override
//!    context if it owns the name, else its binding context.
//! 2. Otherwise walk up from the current level and pick the first level
//!    whose override context or binding context owns the name.
//! 3. If no level owns it, fall back to the root: the scope's binding
//!    context, or its override context when the binding context is
//!    nullish.

use std::fmt;
use std::rc::Rc;

use trellis_core::{ObjectRef, Value};

use crate::error::EvalError;

// ---------------------------------------------------------------------------
// OverrideContext
// ---------------------------------------------------------------------------

struct OverrideInner {
    own: ObjectRef,
    binding_context: Value,
    parent: Option<OverrideContext>,
}

/// One level of the override chain.
#[derive(Clone)]
pub struct OverrideContext(Rc<OverrideInner>);

impl OverrideContext {
    #[must_use]
    pub fn create(binding_context: Value, parent: Option<OverrideContext>) -> Self {
        Self(Rc::new(OverrideInner {
            own: ObjectRef::binding_context(),
            binding_context,
            parent,
        }))
    }

    /// The observable object holding this level's contextual names.
    #[must_use]
    pub fn object(&self) -> &ObjectRef {
        &self.0.own
    }

    #[must_use]
    pub fn binding_context(&self) -> &Value {
        &self.0.binding_context
    }

    #[must_use]
    pub fn parent(&self) -> Option<&OverrideContext> {
        self.0.parent.as_ref()
    }

    /// Whether this level owns `name` itself.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.0.own.has(name)
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.0.own.set(name, value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Value {
        self.0.own.get(name)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn binding_context_has(&self, name: &str) -> bool {
        match &self.0.binding_context {
            Value::Object(o) => o.has(name),
            _ => false,
        }
    }

    fn owner_of(&self, name: &str) -> Value {
        if self.has(name) {
            Value::Object(self.0.own.clone())
        } else {
            self.0.binding_context.clone()
        }
    }
}

impl fmt::Debug for OverrideContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideContext")
            .field("own", &self.0.own)
            .field("binding_context", &self.0.binding_context)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

struct ScopeInner {
    binding_context: Value,
    override_context: OverrideContext,
}

/// A `(binding context, override context)` pair, compared by identity.
#[derive(Clone)]
pub struct Scope(Rc<ScopeInner>);

impl Scope {
    /// A root scope (or one over an existing override context).
    #[must_use]
    pub fn create(binding_context: Value, override_context: Option<OverrideContext>) -> Self {
        let override_context = override_context
            .unwrap_or_else(|| OverrideContext::create(binding_context.clone(), None));
        Self(Rc::new(ScopeInner {
            binding_context,
            override_context,
        }))
    }

    /// A child scope whose override context links to `parent`'s.
    #[must_use]
    pub fn from_parent(parent: &Scope, binding_context: Value) -> Self {
        let oc = OverrideContext::create(binding_context.clone(), Some(parent.override_context().clone()));
        Self::create(binding_context, Some(oc))
    }

    /// A scope over an existing override context.
    #[must_use]
    pub fn from_override(override_context: OverrideContext) -> Self {
        Self::create(override_context.binding_context().clone(), Some(override_context))
    }

    #[must_use]
    pub fn binding_context(&self) -> &Value {
        &self.0.binding_context
    }

    #[must_use]
    pub fn override_context(&self) -> &OverrideContext {
        &self.0.override_context
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("binding_context", &self.0.binding_context)
            .field("override_context", &self.0.override_context)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BindingContext
// ---------------------------------------------------------------------------

/// Scope-walking lookups.
pub struct BindingContext;

impl BindingContext {
    /// The object that owns `name` for a lookup `ancestor` levels up.
    pub fn get(scope: Option<&Scope>, name: &str, ancestor: u32) -> Result<Value, EvalError> {
        let Some(scope) = scope else {
            return Err(EvalError::NilScope {
                expression: name.to_owned(),
            });
        };
        let mut oc = scope.override_context();
        if ancestor > 0 {
            for _ in 0..ancestor {
                match oc.parent() {
                    Some(parent) => oc = parent,
                    None => return Ok(Value::Undefined),
                }
            }
            return Ok(oc.owner_of(name));
        }
        let mut level = Some(oc);
        while let Some(current) = level {
            if current.has(name) || current.binding_context_has(name) {
                return Ok(current.owner_of(name));
            }
            level = current.parent();
        }
        Ok(if scope.binding_context().is_nullish() {
            Value::Object(scope.override_context().object().clone())
        } else {
            scope.binding_context().clone()
        })
    }

    /// The binding context `ancestor` levels up (`$this`, `$parent`).
    pub fn this(scope: Option<&Scope>, ancestor: u32) -> Result<Value, EvalError> {
        let Some(scope) = scope else {
            return Err(EvalError::NilScope {
                expression: "$this".to_owned(),
            });
        };
        let mut oc = scope.override_context();
        for _ in 0..ancestor {
            match oc.parent() {
                Some(parent) => oc = parent,
                None => return Ok(Value::Undefined),
            }
        }
        Ok(oc.binding_context().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, i32)]) -> Value {
        Value::Object(ObjectRef::from_pairs(pairs.iter().map(|(k, v)| (*k, *v))))
    }

    fn owner(scope: &Scope, name: &str, ancestor: u32) -> Value {
        BindingContext::get(Some(scope), name, ancestor).expect("scope")
    }

    #[test]
    fn nil_scope_is_an_error() {
        let err = BindingContext::get(None, "a", 0).unwrap_err();
        assert_eq!(err.code(), "TRL-201");
    }

    #[test]
    fn finds_name_on_current_binding_context() {
        let bc = obj(&[("a", 1)]);
        let scope = Scope::create(bc.clone(), None);
        assert_eq!(owner(&scope, "a", 0), bc);
    }

    #[test]
    fn override_context_shadows_binding_context() {
        let scope = Scope::create(obj(&[("a", 1)]), None);
        scope.override_context().set("a", 2);
        let found = owner(&scope, "a", 0);
        assert_eq!(found.as_object().map(|o| o.get("a")), Some(Value::from(2)));
    }

    #[test]
    fn walks_up_to_parent() {
        let parent_bc = obj(&[("outer", 1)]);
        let parent = Scope::create(parent_bc.clone(), None);
        let child = Scope::from_parent(&parent, obj(&[("inner", 2)]));
        assert_eq!(owner(&child, "outer", 0), parent_bc);
    }

    #[test]
    fn unknown_name_falls_back_to_root() {
        let bc = obj(&[]);
        let parent = Scope::create(obj(&[]), None);
        let child = Scope::from_parent(&parent, bc.clone());
        assert_eq!(owner(&child, "missing", 0), bc);
    }

    #[test]
    fn nullish_binding_context_falls_back_to_override_object() {
        let scope = Scope::create(Value::Undefined, None);
        let found = owner(&scope, "x", 0);
        assert!(found.as_object().is_some_and(|o| o.ptr_eq(scope.override_context().object())));
    }

    #[test]
    fn ancestor_hops_exactly() {
        let grand_bc = obj(&[("x", 1)]);
        let grand = Scope::create(grand_bc.clone(), None);
        let parent = Scope::from_parent(&grand, obj(&[("x", 2)]));
        let child = Scope::from_parent(&parent, obj(&[("x", 3)]));
        assert_eq!(owner(&child, "x", 2), grand_bc);
        assert_eq!(owner(&child, "x", 3), Value::Undefined);
        assert_eq!(BindingContext::this(Some(&child), 2).expect("scope"), grand_bc);
    }

    #[test]
    fn from_override_shares_context() {
        let oc = OverrideContext::create(obj(&[("a", 1)]), None);
        let scope = Scope::from_override(oc.clone());
        assert!(scope.override_context().ptr_eq(&oc));
        assert_eq!(scope.binding_context(), oc.binding_context());
    }
}
