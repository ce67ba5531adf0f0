#![forbid(unsafe_code)]

//! Binding expression syntax for Trellis.
//!
//! Parses the binding subset of the host expression language (member and
//! keyed access, calls, literals, unary/binary/conditional operators,
//! assignment, template strings, value converters, binding behaviors and
//! `for ... of` declarations) into an immutable [`Expr`] tree.
//!
//! Evaluation lives in `trellis-runtime`; this crate is syntax only.
//!
//! # Example
//!
//! ```
//! use trellis_expr::{BindingType, Expr, ExpressionParser};
//!
//! let parser = ExpressionParser::new();
//! let expr = parser.parse("user.name | upper", BindingType::None).unwrap();
//! assert!(expr.is_resource());
//! assert_eq!(expr.to_string(), "user.name | upper");
//! ```

pub mod ast;
pub mod cache;
pub mod error;
mod lexer;
pub mod parser;

pub use ast::{BinaryOp, BindingType, Expr, ExpressionKind, Literal, UnaryOp};
pub use cache::ExpressionParser;
pub use error::{ParseError, Result};
pub use parser::{parse, parse_interpolation};
