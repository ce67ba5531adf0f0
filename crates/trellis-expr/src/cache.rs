#![forbid(unsafe_code)]

//! Parse cache.
//!
//! [`ExpressionParser`] memoizes parse results by `(text, BindingType)`.
//! While an entry is cached, every request for the same key returns the
//! same `Rc`, so all bindings created from one attribute value share a
//! single tree. Errors are never cached.
//!
//! The cache is unbounded unless a capacity is given, in which case the
//! least recently used entry is evicted.

use std::cell::RefCell;
use std::fmt;
use std::num::NonZeroUsize;
use std::rc::Rc;

use lru::LruCache;

use crate::ast::{BindingType, Expr};
use crate::error::Result;
use crate::parser;

type Key = (Rc<str>, BindingType);

pub struct ExpressionParser {
    cache: RefCell<LruCache<Key, Option<Rc<Expr>>>>,
}

impl ExpressionParser {
    /// An unbounded cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: RefCell::new(LruCache::unbounded()),
        }
    }

    /// A cache holding at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    /// From an optional capacity (`None` is unbounded).
    #[must_use]
    pub fn with_optional_capacity(capacity: Option<NonZeroUsize>) -> Self {
        capacity.map_or_else(Self::new, Self::with_capacity)
    }

    fn cached(
        &self,
        text: &str,
        binding_type: BindingType,
        parse: impl FnOnce() -> Result<Option<Rc<Expr>>>,
    ) -> Result<Option<Rc<Expr>>> {
        let key: Key = (Rc::from(text), binding_type);
        if let Some(hit) = self.cache.borrow_mut().get(&key) {
            return Ok(hit.clone());
        }
        let parsed = parse()?;
        tracing::trace!(text, ?binding_type, "expression parsed");
        self.cache.borrow_mut().put(key, parsed.clone());
        Ok(parsed)
    }

    /// Parse `text` under `binding_type`, reusing a cached tree if present.
    pub fn parse(&self, text: &str, binding_type: BindingType) -> Result<Rc<Expr>> {
        if binding_type == BindingType::Interpolation {
            return match self.parse_interpolation(text)? {
                Some(expr) => Ok(expr),
                None => parser::parse(text, binding_type),
            };
        }
        self.cached(text, binding_type, || {
            parser::parse(text, binding_type).map(Some)
        })?
        .map_or_else(|| parser::parse(text, binding_type), Ok)
    }

    /// Parse text containing `${..}`; `None` (also cached) when it has none.
    pub fn parse_interpolation(&self, text: &str) -> Result<Option<Rc<Expr>>> {
        self.cached(text, BindingType::Interpolation, || {
            parser::parse_interpolation(text)
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }
}

impl Default for ExpressionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExpressionParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.borrow();
        f.debug_struct("ExpressionParser")
            .field("len", &cache.len())
            .field("cap", &cache.cap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_same_rc() {
        let parser = ExpressionParser::new();
        let a = parser.parse("a.b", BindingType::None).expect("parse");
        let b = parser.parse("a.b", BindingType::None).expect("parse");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(parser.len(), 1);
    }

    #[test]
    fn binding_type_is_part_of_key() {
        let parser = ExpressionParser::new();
        let a = parser.parse("a", BindingType::None).expect("parse");
        let b = parser.parse("a", BindingType::IsProperty).expect("parse");
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_eq!(parser.len(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let parser = ExpressionParser::new();
        assert!(parser.parse("a.", BindingType::None).is_err());
        assert!(parser.is_empty());
    }

    #[test]
    fn bounded_cache_evicts_least_recent() {
        let parser = ExpressionParser::with_capacity(NonZeroUsize::MIN.saturating_add(1));
        let a = parser.parse("a", BindingType::None).expect("parse");
        parser.parse("b", BindingType::None).expect("parse");
        parser.parse("a", BindingType::None).expect("parse");
        parser.parse("c", BindingType::None).expect("parse");
        assert_eq!(parser.len(), 2);
        let again = parser.parse("a", BindingType::None).expect("parse");
        assert!(Rc::ptr_eq(&a, &again), "recently used entry survives");
    }

    #[test]
    fn interpolation_none_is_cached() {
        let parser = ExpressionParser::new();
        assert!(parser.parse_interpolation("plain").expect("ok").is_none());
        assert_eq!(parser.len(), 1);
        let with = parser.parse_interpolation("${x}").expect("ok");
        assert!(with.is_some());
    }
}
