#![forbid(unsafe_code)]

//! Runtime errors.
//!
//! Two families, each with stable codes, plus an aggregate:
//!
//! | Range | Type | Raised by |
//! |-------|------|-----------|
//! | TRL-1xx | [`ParseError`] | expression parsing |
//! | TRL-2xx | [`EvalError`] | evaluate / assign / connect / bind |
//! | TRL-3xx | [`LifecycleError`] | views, locations, hydration, app |
//!
//! All errors are raised synchronously and never retried. The only silent
//! degradation is null propagation during evaluation.

use std::rc::Rc;

use thiserror::Error;
use trellis_expr::ParseError;

pub type Result<T> = std::result::Result<T, Error>;

/// Evaluation-time failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("[TRL-201] cannot evaluate `{expression}` without a scope")]
    NilScope { expression: String },

    #[error("[TRL-202] `{name}` is not a function")]
    NotAFunction { name: String },

    #[error("[TRL-203] no value converter named `{name}`")]
    ConverterNotFound { name: Rc<str> },

    #[error("[TRL-204] no binding behavior named `{name}`")]
    BehaviorNotFound { name: Rc<str> },

    #[error("[TRL-205] binding behavior `{name}` is already applied to this binding")]
    BehaviorAlreadyApplied { name: Rc<str> },

    #[error("[TRL-206] `{expression}` is not assignable")]
    NotAssignable { expression: String },

    #[error("[TRL-207] unknown operator `{operator}`")]
    UnknownOperator { operator: String },

    #[error("[TRL-208] `{expression}` is not iterable")]
    NotIterable { expression: String },

    #[error("[TRL-209] dirty checking is disallowed (property `{property}`)")]
    DirtyCheckDisallowed { property: Rc<str> },

    #[error("[TRL-210] binding behavior `{name}` cannot be used here: {reason}")]
    InvalidBehaviorUse { name: Rc<str>, reason: &'static str },
}

impl EvalError {
    /// Stable error code (`TRL-2xx`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NilScope { .. } => "TRL-201",
            Self::NotAFunction { .. } => "TRL-202",
            Self::ConverterNotFound { .. } => "TRL-203",
            Self::BehaviorNotFound { .. } => "TRL-204",
            Self::BehaviorAlreadyApplied { .. } => "TRL-205",
            Self::NotAssignable { .. } => "TRL-206",
            Self::UnknownOperator { .. } => "TRL-207",
            Self::NotIterable { .. } => "TRL-208",
            Self::DirtyCheckDisallowed { .. } => "TRL-209",
            Self::InvalidBehaviorUse { .. } => "TRL-210",
        }
    }
}

/// Lifecycle contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("[TRL-301] render location has no parent node")]
    UnboundLocation,

    #[error("[TRL-302] `{name}` hydrated before it was prepared")]
    HydrateWithoutPrepare { name: Rc<str> },

    #[error("[TRL-303] the app has no root component")]
    NoRoot,

    #[error("[TRL-304] a view factory name is required for part replacement")]
    FactoryNameRequired,

    #[error("[TRL-305] no custom element or attribute named `{name}`")]
    ResourceNotFound { name: Rc<str> },

    #[error("[TRL-306] no render strategy named `{name}`")]
    StrategyNotFound { name: Rc<str> },

    #[error("[TRL-307] instruction `{kind}` has no target node at position {index}")]
    MissingTarget { kind: char, index: usize },

    #[error("[TRL-308] `{name}` is a template controller and needs a view factory and a render location")]
    NotATemplate { name: Rc<str> },
}

impl LifecycleError {
    /// Stable error code (`TRL-3xx`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnboundLocation => "TRL-301",
            Self::HydrateWithoutPrepare { .. } => "TRL-302",
            Self::NoRoot => "TRL-303",
            Self::FactoryNameRequired => "TRL-304",
            Self::ResourceNotFound { .. } => "TRL-305",
            Self::StrategyNotFound { .. } => "TRL-306",
            Self::MissingTarget { .. } => "TRL-307",
            Self::NotATemplate { .. } => "TRL-308",
        }
    }
}

/// Any runtime failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl Error {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(e) => e.code(),
            Self::Eval(e) => e.code(),
            Self::Lifecycle(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_in_messages() {
        let err = EvalError::ConverterNotFound {
            name: Rc::from("upper"),
        };
        assert!(err.to_string().starts_with("[TRL-203]"));
        assert_eq!(err.code(), "TRL-203");
        let err = LifecycleError::UnboundLocation;
        assert!(err.to_string().starts_with(&format!("[{}]", err.code())));
    }

    #[test]
    fn aggregate_preserves_code() {
        let err: Error = LifecycleError::NoRoot.into();
        assert_eq!(err.code(), "TRL-303");
        let err: Error = EvalError::NilScope {
            expression: "a".into(),
        }
        .into();
        assert_eq!(err.code(), "TRL-201");
    }
}
