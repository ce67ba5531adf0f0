#![forbid(unsafe_code)]

//! On-demand tokenizer.
//!
//! The parser pulls one token at a time. Template literals are scanned in
//! pieces: the opening backtick yields a head (or a complete template),
//! and after the parser consumes the `}` that closes a substitution it
//! asks the lexer to continue the template from the current offset.

use std::rc::Rc;

use crate::error::{ParseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Punct {
    Dot,
    Comma,
    Colon,
    Semicolon,
    Question,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Bang,
    Assign,
    EqEq,
    EqEqEq,
    BangEq,
    BangEqEq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bar,
    BarBar,
    Amp,
    AmpAmp,
}

impl Punct {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Dot => ".",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Question => "?",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
            Self::OpenBracket => "[",
            Self::CloseBracket => "]",
            Self::OpenBrace => "{",
            Self::CloseBrace => "}",
            Self::Bang => "!",
            Self::Assign => "=",
            Self::EqEq => "==",
            Self::EqEqEq => "===",
            Self::BangEq => "!=",
            Self::BangEqEq => "!==",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bar => "|",
            Self::BarBar => "||",
            Self::Amp => "&",
            Self::AmpAmp => "&&",
        }
    }
}

/// A template chunk: escape-processed text plus the source spelling.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Chunk {
    pub cooked: Rc<str>,
    pub raw: Rc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Eof,
    Identifier(Rc<str>),
    Number(f64),
    String(Rc<str>),
    /// A whole template without substitutions.
    Template(Chunk),
    /// Template text up to the first `${`.
    TemplateHead(Chunk),
    Punct(Punct),
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Eof => "<end>".into(),
            Self::Identifier(name) => name.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => format!("'{s}'"),
            Self::Template(c) | Self::TemplateHead(c) => format!("`{}", c.raw),
            Self::Punct(p) => p.as_str().into(),
        }
    }
}

/// Result of continuing a template after a substitution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Continuation {
    /// More substitutions follow.
    Middle(Chunk),
    /// Closing backtick reached.
    Tail(Chunk),
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error_input(&self) -> String {
        self.input.to_owned()
    }

    /// Next token and its start offset.
    pub(crate) fn next_token(&mut self) -> Result<(Token, usize)> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok((Token::Eof, start));
        };
        if is_ident_start(c) {
            return Ok((self.scan_identifier(), start));
        }
        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.scan_number(start).map(|t| (t, start));
        }
        if c == '\'' || c == '"' {
            return self.scan_string(c, start).map(|t| (t, start));
        }
        if c == '`' {
            self.bump();
            return self.scan_template(start).map(|t| {
                let token = match t {
                    Continuation::Tail(chunk) => Token::Template(chunk),
                    Continuation::Middle(chunk) => Token::TemplateHead(chunk),
                };
                (token, start)
            });
        }
        self.bump();
        let punct = match c {
            '.' => Punct::Dot,
            ',' => Punct::Comma,
            ':' => Punct::Colon,
            ';' => Punct::Semicolon,
            '?' => Punct::Question,
            '(' => Punct::OpenParen,
            ')' => Punct::CloseParen,
            '[' => Punct::OpenBracket,
            ']' => Punct::CloseBracket,
            '{' => Punct::OpenBrace,
            '}' => Punct::CloseBrace,
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            '%' => Punct::Percent,
            '!' => {
                if self.eat('=') {
                    if self.eat('=') { Punct::BangEqEq } else { Punct::BangEq }
                } else {
                    Punct::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') { Punct::EqEqEq } else { Punct::EqEq }
                } else {
                    Punct::Assign
                }
            }
            '<' => {
                if self.eat('=') { Punct::Le } else { Punct::Lt }
            }
            '>' => {
                if self.eat('=') { Punct::Ge } else { Punct::Gt }
            }
            '|' => {
                if self.eat('|') { Punct::BarBar } else { Punct::Bar }
            }
            '&' => {
                if self.eat('&') { Punct::AmpAmp } else { Punct::Amp }
            }
            other => {
                return Err(ParseError::UnexpectedCharacter {
                    ch: other,
                    position: start,
                    input: self.error_input(),
                });
            }
        };
        Ok((Token::Punct(punct), start))
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_part) {
            self.bump();
        }
        Token::Identifier(Rc::from(&self.input[start..self.pos]))
    }

    fn scan_digits(&mut self) -> usize {
        let mut n = 0;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            n += 1;
        }
        n
    }

    fn scan_number(&mut self, start: usize) -> Result<Token> {
        self.scan_digits();
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
            self.bump();
            self.scan_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.scan_digits() == 0 {
                return Err(ParseError::InvalidNumber {
                    position: start,
                    input: self.error_input(),
                });
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(ParseError::InvalidNumber {
                position: start,
                input: self.error_input(),
            });
        }
        self.input[start..self.pos]
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::InvalidNumber {
                position: start,
                input: self.error_input(),
            })
    }

    /// Decode one escape sequence (the backslash is already consumed).
    fn scan_escape(&mut self, out: &mut String) -> Option<()> {
        let c = self.bump()?;
        match c {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'u' => {
                let hex_start = self.pos;
                for _ in 0..4 {
                    if !self.peek().is_some_and(|h| h.is_ascii_hexdigit()) {
                        out.push('u');
                        self.pos = hex_start;
                        return Some(());
                    }
                    self.bump();
                }
                let code = u32::from_str_radix(&self.input[hex_start..self.pos], 16).ok()?;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            other => out.push(other),
        }
        Some(())
    }

    fn scan_string(&mut self, quote: char, start: usize) -> Result<Token> {
        self.bump();
        let mut out = String::new();
        loop {
            let terminated = match self.bump() {
                None => false,
                Some(c) if c == quote => break,
                Some('\\') => self.scan_escape(&mut out).is_some(),
                Some(c) => {
                    out.push(c);
                    true
                }
            };
            if !terminated {
                return Err(ParseError::UnterminatedString {
                    position: start,
                    input: self.error_input(),
                });
            }
        }
        Ok(Token::String(Rc::from(out)))
    }

    /// Scan template text from the current offset up to `${` or the closing
    /// backtick.
    pub(crate) fn scan_template(&mut self, start: usize) -> Result<Continuation> {
        let raw_start = self.pos;
        let mut cooked = String::new();
        loop {
            let raw_end = self.pos;
            match self.bump() {
                None => {
                    return Err(ParseError::UnterminatedTemplate {
                        position: start,
                        input: self.error_input(),
                    });
                }
                Some('`') => {
                    return Ok(Continuation::Tail(Chunk {
                        cooked: Rc::from(cooked),
                        raw: Rc::from(&self.input[raw_start..raw_end]),
                    }));
                }
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    return Ok(Continuation::Middle(Chunk {
                        cooked: Rc::from(cooked),
                        raw: Rc::from(&self.input[raw_start..raw_end]),
                    }));
                }
                Some('\\') => {
                    if self.scan_escape(&mut cooked).is_none() {
                        return Err(ParseError::UnterminatedTemplate {
                            position: start,
                            input: self.error_input(),
                        });
                    }
                }
                Some(c) => cooked.push(c),
            }
        }
    }
}
