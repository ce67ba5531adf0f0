#![forbid(unsafe_code)]

//! Parse errors.
//!
//! Every variant carries the byte offset at which the problem was detected
//! and the full input, and renders with a stable `TRL-1xx` code:
//!
//! | Code | Variant |
//! |------|---------|
//! | TRL-101 | `InvalidStartToken` |
//! | TRL-102 | `UnterminatedString` |
//! | TRL-103 | `UnterminatedTemplate` |
//! | TRL-104 | `UnexpectedCharacter` |
//! | TRL-105 | `ExpectedIdentifier` |
//! | TRL-106 | `MissingExpectedToken` |
//! | TRL-107 | `NotAssignable` |
//! | TRL-108 | `UnexpectedOf` |
//! | TRL-109 | `InvalidForDeclaration` |
//! | TRL-110 | `UnconsumedToken` |
//! | TRL-111 | `ConverterAfterBehavior` |
//! | TRL-112 | `InvalidNumber` |

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("[TRL-101] invalid start of expression at {position} in `{input}`")]
    InvalidStartToken { position: usize, input: String },

    #[error("[TRL-102] unterminated string literal starting at {position} in `{input}`")]
    UnterminatedString { position: usize, input: String },

    #[error("[TRL-103] unterminated template literal starting at {position} in `{input}`")]
    UnterminatedTemplate { position: usize, input: String },

    #[error("[TRL-104] unexpected character {ch:?} at {position} in `{input}`")]
    UnexpectedCharacter { ch: char, position: usize, input: String },

    #[error("[TRL-105] expected identifier after `{after}` at {position} in `{input}`")]
    ExpectedIdentifier {
        after: &'static str,
        position: usize,
        input: String,
    },

    #[error("[TRL-106] missing expected `{expected}` at {position} in `{input}`")]
    MissingExpectedToken {
        expected: &'static str,
        position: usize,
        input: String,
    },

    #[error("[TRL-107] left-hand side of assignment is not assignable at {position} in `{input}`")]
    NotAssignable { position: usize, input: String },

    #[error("[TRL-108] unexpected `of` outside a for declaration at {position} in `{input}`")]
    UnexpectedOf { position: usize, input: String },

    #[error("[TRL-109] invalid for declaration at {position} in `{input}`")]
    InvalidForDeclaration { position: usize, input: String },

    #[error("[TRL-110] unconsumed token `{token}` at {position} in `{input}`")]
    UnconsumedToken {
        token: String,
        position: usize,
        input: String,
    },

    #[error("[TRL-111] value converter after binding behavior at {position} in `{input}`")]
    ConverterAfterBehavior { position: usize, input: String },

    #[error("[TRL-112] invalid numeric literal at {position} in `{input}`")]
    InvalidNumber { position: usize, input: String },
}

impl ParseError {
    /// Stable error code (`TRL-1xx`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidStartToken { .. } => "TRL-101",
            Self::UnterminatedString { .. } => "TRL-102",
            Self::UnterminatedTemplate { .. } => "TRL-103",
            Self::UnexpectedCharacter { .. } => "TRL-104",
            Self::ExpectedIdentifier { .. } => "TRL-105",
            Self::MissingExpectedToken { .. } => "TRL-106",
            Self::NotAssignable { .. } => "TRL-107",
            Self::UnexpectedOf { .. } => "TRL-108",
            Self::InvalidForDeclaration { .. } => "TRL-109",
            Self::UnconsumedToken { .. } => "TRL-110",
            Self::ConverterAfterBehavior { .. } => "TRL-111",
            Self::InvalidNumber { .. } => "TRL-112",
        }
    }

    /// Byte offset at which the error was detected.
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::InvalidStartToken { position, .. }
            | Self::UnterminatedString { position, .. }
            | Self::UnterminatedTemplate { position, .. }
            | Self::UnexpectedCharacter { position, .. }
            | Self::ExpectedIdentifier { position, .. }
            | Self::MissingExpectedToken { position, .. }
            | Self::NotAssignable { position, .. }
            | Self::UnexpectedOf { position, .. }
            | Self::InvalidForDeclaration { position, .. }
            | Self::UnconsumedToken { position, .. }
            | Self::ConverterAfterBehavior { position, .. }
            | Self::InvalidNumber { position, .. } => *position,
        }
    }

    /// The expression text being parsed.
    #[must_use]
    pub fn input(&self) -> &str {
        match self {
            Self::InvalidStartToken { input, .. }
            | Self::UnterminatedString { input, .. }
            | Self::UnterminatedTemplate { input, .. }
            | Self::UnexpectedCharacter { input, .. }
            | Self::ExpectedIdentifier { input, .. }
            | Self::MissingExpectedToken { input, .. }
            | Self::NotAssignable { input, .. }
            | Self::UnexpectedOf { input, .. }
            | Self::InvalidForDeclaration { input, .. }
            | Self::UnconsumedToken { input, .. }
            | Self::ConverterAfterBehavior { input, .. }
            | Self::InvalidNumber { input, .. } => input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_code_and_position() {
        let err = ParseError::MissingExpectedToken {
            expected: ")",
            position: 4,
            input: "f(a".into(),
        };
        assert_eq!(err.code(), "TRL-106");
        assert_eq!(err.position(), 4);
        assert_eq!(err.input(), "f(a");
        assert_eq!(err.to_string(), "[TRL-106] missing expected `)` at 4 in `f(a`");
    }
}
