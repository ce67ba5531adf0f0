#![forbid(unsafe_code)]

//! Recursive-descent parser with precedence climbing for binary operators.
//!
//! # Grammar (lowest to highest)
//!
//! ```text
//! binding     := assign ( '|' ident (':' cond)* )* ( '&' ident (':' cond)* )*
//! assign      := cond ( '=' assign )?
//! cond        := binary ( '?' assign ':' assign )?
//! binary      := unary ( op unary )*        tiers: || && equality relational additive multiplicative
//! unary       := ('!' | '-' | '+' | 'typeof' | 'void') unary | lhs
//! lhs         := primary ( '.' ident | '[' assign ']' | args | template )*
//! primary     := $this | $parent | ident | literal | '(' assign ')' | array | object | template
//! for-of      := (ident | '[' idents ']' | '{' props '}') 'of' binding
//! ```
//!
//! `$this.x` and `$parent.x` resolve to scope access with an ancestor
//! count, so `$parent.$parent.x` is `AccessScope { x, ancestor: 2 }`.

use std::rc::Rc;

use trellis_core::value::format_number;

use crate::ast::{BinaryOp, BindingType, Expr, Literal, UnaryOp};
use crate::error::{ParseError, Result};
use crate::lexer::{Chunk, Continuation, Lexer, Punct, Token};

/// Parse `input` under `binding_type` (uncached).
///
/// `Interpolation` input without any `${` parses to a string literal of the
/// whole text; `IsCustom` input is always a string literal.
pub fn parse(input: &str, binding_type: BindingType) -> Result<Rc<Expr>> {
    match binding_type {
        BindingType::IsCustom => Ok(string_literal(input)),
        BindingType::Interpolation => {
            Ok(parse_interpolation(input)?.unwrap_or_else(|| string_literal(input)))
        }
        _ if input.trim().is_empty() => Ok(string_literal("")),
        _ => {
            let mut parser = Parser::new(input);
            parser.start_at(0)?;
            let expr = if binding_type == BindingType::IsIterator {
                parser.parse_for_of()?
            } else {
                parser.parse_binding()?
            };
            parser.expect_end()?;
            Ok(expr)
        }
    }
}

/// Parse text with `${..}` substitutions. `None` when there are none.
pub fn parse_interpolation(input: &str) -> Result<Option<Rc<Expr>>> {
    if !input.contains("${") {
        return Ok(None);
    }
    let mut parser = Parser::new(input);
    let mut parts = Vec::new();
    let mut expressions = Vec::new();
    let mut pos = 0;
    while let Some(rel) = input[pos..].find("${") {
        let open = pos + rel;
        parts.push(Rc::from(&input[pos..open]));
        parser.start_at(open + 2)?;
        expressions.push(parser.parse_binding()?);
        if !parser.is_punct(Punct::CloseBrace) {
            return Err(match parser.token {
                Token::Eof => ParseError::UnterminatedTemplate {
                    position: open,
                    input: input.to_owned(),
                },
                _ => parser.missing("}"),
            });
        }
        pos = parser.lexer.pos();
    }
    parts.push(Rc::from(&input[pos..]));
    Ok(Some(Rc::new(Expr::Interpolation { parts, expressions })))
}

fn string_literal(s: &str) -> Rc<Expr> {
    Rc::new(Expr::PrimitiveLiteral(Literal::String(Rc::from(s))))
}

/// How the expression produced so far was reached; decides what a
/// following `.name` or `(..)` turns into.
#[derive(Clone, Copy)]
enum Access {
    /// `$this` / `$parent` chain with this many hops.
    This(u32),
    /// A bare identifier (a following call is a scope call).
    Scope,
    Other,
}

pub(crate) struct Parser<'a> {
    input: &'a str,
    lexer: Lexer<'a>,
    token: Token,
    start: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            lexer: Lexer::new(input),
            token: Token::Eof,
            start: 0,
        }
    }

    fn start_at(&mut self, pos: usize) -> Result<()> {
        self.lexer.set_pos(pos);
        self.advance()
    }

    fn advance(&mut self) -> Result<()> {
        let (token, start) = self.lexer.next_token()?;
        self.token = token;
        self.start = start;
        Ok(())
    }

    // -- token helpers -------------------------------------------------------

    fn is_punct(&self, p: Punct) -> bool {
        self.token == Token::Punct(p)
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(&self.token, Token::Identifier(n) if &**n == name)
    }

    fn eat(&mut self, p: Punct) -> Result<bool> {
        if self.is_punct(p) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, p: Punct) -> Result<()> {
        if self.eat(p)? {
            Ok(())
        } else {
            Err(self.missing(p.as_str()))
        }
    }

    fn missing(&self, expected: &'static str) -> ParseError {
        ParseError::MissingExpectedToken {
            expected,
            position: self.start,
            input: self.input.to_owned(),
        }
    }

    fn identifier_after(&mut self, after: &'static str) -> Result<Rc<str>> {
        match &self.token {
            Token::Identifier(name) => {
                let name = Rc::clone(name);
                self.advance()?;
                Ok(name)
            }
            _ => Err(ParseError::ExpectedIdentifier {
                after,
                position: self.start,
                input: self.input.to_owned(),
            }),
        }
    }

    fn expect_end(&self) -> Result<()> {
        match &self.token {
            Token::Eof => Ok(()),
            Token::Identifier(name) if &**name == "of" => Err(ParseError::UnexpectedOf {
                position: self.start,
                input: self.input.to_owned(),
            }),
            other => Err(ParseError::UnconsumedToken {
                token: other.describe(),
                position: self.start,
                input: self.input.to_owned(),
            }),
        }
    }

    // -- binding level -------------------------------------------------------

    /// Expression followed by any value converters, then binding behaviors.
    fn parse_binding(&mut self) -> Result<Rc<Expr>> {
        let mut expr = self.parse_assign()?;
        let mut seen_behavior = false;
        loop {
            if self.is_punct(Punct::Bar) {
                if seen_behavior {
                    return Err(ParseError::ConverterAfterBehavior {
                        position: self.start,
                        input: self.input.to_owned(),
                    });
                }
                self.advance()?;
                let name = self.identifier_after("|")?;
                let args = self.parse_resource_args()?;
                expr = Rc::new(Expr::ValueConverter {
                    expression: expr,
                    name,
                    args,
                });
            } else if self.is_punct(Punct::Amp) {
                seen_behavior = true;
                self.advance()?;
                let name = self.identifier_after("&")?;
                let args = self.parse_resource_args()?;
                expr = Rc::new(Expr::BindingBehavior {
                    expression: expr,
                    name,
                    args,
                });
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_resource_args(&mut self) -> Result<Vec<Rc<Expr>>> {
        let mut args = Vec::new();
        while self.eat(Punct::Colon)? {
            args.push(self.parse_conditional()?);
        }
        Ok(args)
    }

    fn parse_for_of(&mut self) -> Result<Rc<Expr>> {
        let invalid = |position: usize, input: &str| ParseError::InvalidForDeclaration {
            position,
            input: input.to_owned(),
        };
        let declaration = match self.token.clone() {
            Token::Identifier(name) if &*name != "of" => {
                self.advance()?;
                Rc::new(Expr::BindingIdentifier { name })
            }
            Token::Punct(Punct::OpenBracket) => {
                self.advance()?;
                let mut elements = Vec::new();
                while let Token::Identifier(name) = self.token.clone() {
                    self.advance()?;
                    elements.push(Rc::new(Expr::BindingIdentifier { name }));
                    if !self.eat(Punct::Comma)? {
                        break;
                    }
                }
                if !self.eat(Punct::CloseBracket)? {
                    return Err(invalid(self.start, self.input));
                }
                Rc::new(Expr::ArrayBindingPattern { elements })
            }
            Token::Punct(Punct::OpenBrace) => {
                self.advance()?;
                let mut keys = Vec::new();
                let mut values = Vec::new();
                while let Token::Identifier(key) = self.token.clone() {
                    self.advance()?;
                    let local = if self.eat(Punct::Colon)? {
                        match self.token.clone() {
                            Token::Identifier(local) => {
                                self.advance()?;
                                local
                            }
                            _ => return Err(invalid(self.start, self.input)),
                        }
                    } else {
                        Rc::clone(&key)
                    };
                    keys.push(key);
                    values.push(Rc::new(Expr::BindingIdentifier { name: local }));
                    if !self.eat(Punct::Comma)? {
                        break;
                    }
                }
                if !self.eat(Punct::CloseBrace)? {
                    return Err(invalid(self.start, self.input));
                }
                Rc::new(Expr::ObjectBindingPattern { keys, values })
            }
            _ => return Err(invalid(self.start, self.input)),
        };
        if !self.is_ident("of") {
            return Err(invalid(self.start, self.input));
        }
        self.advance()?;
        let iterable = self.parse_binding()?;
        Ok(Rc::new(Expr::ForOfStatement {
            declaration,
            iterable,
        }))
    }

    // -- expressions ---------------------------------------------------------

    fn parse_assign(&mut self) -> Result<Rc<Expr>> {
        let start = self.start;
        let target = self.parse_conditional()?;
        if !self.is_punct(Punct::Assign) {
            return Ok(target);
        }
        if !target.is_assignable() {
            return Err(ParseError::NotAssignable {
                position: start,
                input: self.input.to_owned(),
            });
        }
        self.advance()?;
        let value = self.parse_assign()?;
        Ok(Rc::new(Expr::Assign { target, value }))
    }

    fn parse_conditional(&mut self) -> Result<Rc<Expr>> {
        let condition = self.parse_binary(1)?;
        if !self.eat(Punct::Question)? {
            return Ok(condition);
        }
        let yes = self.parse_assign()?;
        self.expect(Punct::Colon)?;
        let no = self.parse_assign()?;
        Ok(Rc::new(Expr::Conditional { condition, yes, no }))
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        Some(match &self.token {
            Token::Punct(p) => match p {
                Punct::BarBar => BinaryOp::Or,
                Punct::AmpAmp => BinaryOp::And,
                Punct::EqEq => BinaryOp::Eq,
                Punct::BangEq => BinaryOp::Ne,
                Punct::EqEqEq => BinaryOp::StrictEq,
                Punct::BangEqEq => BinaryOp::StrictNe,
                Punct::Lt => BinaryOp::Lt,
                Punct::Gt => BinaryOp::Gt,
                Punct::Le => BinaryOp::Le,
                Punct::Ge => BinaryOp::Ge,
                Punct::Plus => BinaryOp::Add,
                Punct::Minus => BinaryOp::Sub,
                Punct::Star => BinaryOp::Mul,
                Punct::Slash => BinaryOp::Div,
                Punct::Percent => BinaryOp::Mod,
                _ => return None,
            },
            Token::Identifier(name) => match &**name {
                "in" => BinaryOp::In,
                "instanceof" => BinaryOp::InstanceOf,
                _ => return None,
            },
            _ => return None,
        })
    }

    /// Precedence climbing; all tiers are left-associative.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Rc<Expr>> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance()?;
            let right = self.parse_binary(precedence + 1)?;
            left = Rc::new(Expr::Binary { op, left, right });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Rc<Expr>> {
        let op = match &self.token {
            Token::Punct(Punct::Bang) => Some(UnaryOp::Not),
            Token::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            Token::Punct(Punct::Plus) => Some(UnaryOp::Plus),
            Token::Identifier(name) if &**name == "typeof" => Some(UnaryOp::TypeOf),
            Token::Identifier(name) if &**name == "void" => Some(UnaryOp::Void),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Rc::new(Expr::Unary { op, operand }))
            }
            None => self.parse_left_hand_side(),
        }
    }

    fn parse_left_hand_side(&mut self) -> Result<Rc<Expr>> {
        let (mut expr, mut access) = self.parse_primary()?;
        loop {
            match self.token.clone() {
                Token::Punct(Punct::Dot) => {
                    self.advance()?;
                    let name = self.identifier_after(".")?;
                    if let Access::This(ancestor) = access {
                        if &*name == "$parent" {
                            expr = Rc::new(Expr::AccessThis {
                                ancestor: ancestor + 1,
                            });
                            access = Access::This(ancestor + 1);
                            continue;
                        }
                        expr = if self.is_punct(Punct::OpenParen) {
                            let args = self.parse_args()?;
                            Rc::new(Expr::CallScope {
                                name,
                                args,
                                ancestor,
                            })
                        } else {
                            Rc::new(Expr::AccessScope { name, ancestor })
                        };
                    } else if self.is_punct(Punct::OpenParen) {
                        let args = self.parse_args()?;
                        expr = Rc::new(Expr::CallMember {
                            object: expr,
                            name,
                            args,
                        });
                    } else {
                        expr = Rc::new(Expr::AccessMember { object: expr, name });
                    }
                    access = Access::Other;
                }
                Token::Punct(Punct::OpenBracket) => {
                    self.advance()?;
                    let key = self.parse_assign()?;
                    self.expect(Punct::CloseBracket)?;
                    expr = Rc::new(Expr::AccessKeyed { object: expr, key });
                    access = Access::Other;
                }
                Token::Punct(Punct::OpenParen) => {
                    let args = self.parse_args()?;
                    expr = match (access, &*expr) {
                        (Access::Scope, Expr::AccessScope { name, ancestor }) => {
                            Rc::new(Expr::CallScope {
                                name: Rc::clone(name),
                                args,
                                ancestor: *ancestor,
                            })
                        }
                        _ => Rc::new(Expr::CallFunction { func: expr, args }),
                    };
                    access = Access::Other;
                }
                Token::Template(chunk) => {
                    self.advance()?;
                    expr = Rc::new(Expr::TaggedTemplate {
                        cooked: vec![chunk.cooked],
                        raw: vec![chunk.raw],
                        func: expr,
                        expressions: Vec::new(),
                    });
                    access = Access::Other;
                }
                Token::TemplateHead(chunk) => {
                    let (chunks, expressions) = self.parse_template_rest(chunk)?;
                    let (cooked, raw): (Vec<Rc<str>>, Vec<Rc<str>>) = chunks.into_iter().map(|c| (c.cooked, c.raw)).unzip();
                    expr = Rc::new(Expr::TaggedTemplate {
                        cooked,
                        raw,
                        func: expr,
                        expressions,
                    });
                    access = Access::Other;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Rc<Expr>>> {
        self.expect(Punct::OpenParen)?;
        let mut args = Vec::new();
        if self.eat(Punct::CloseParen)? {
            return Ok(args);
        }
        loop {
            args.push(self.parse_assign()?);
            if !self.eat(Punct::Comma)? {
                break;
            }
        }
        self.expect(Punct::CloseParen)?;
        Ok(args)
    }

    fn literal(&mut self, lit: Literal) -> Result<(Rc<Expr>, Access)> {
        self.advance()?;
        Ok((Rc::new(Expr::PrimitiveLiteral(lit)), Access::Other))
    }

    fn parse_primary(&mut self) -> Result<(Rc<Expr>, Access)> {
        let start = self.start;
        match self.token.clone() {
            Token::Identifier(name) => match &*name {
                "$this" => {
                    self.advance()?;
                    Ok((Rc::new(Expr::AccessThis { ancestor: 0 }), Access::This(0)))
                }
                "$parent" => {
                    self.advance()?;
                    Ok((Rc::new(Expr::AccessThis { ancestor: 1 }), Access::This(1)))
                }
                "true" => self.literal(Literal::Bool(true)),
                "false" => self.literal(Literal::Bool(false)),
                "null" => self.literal(Literal::Null),
                "undefined" => self.literal(Literal::Undefined),
                "of" => Err(ParseError::UnexpectedOf {
                    position: start,
                    input: self.input.to_owned(),
                }),
                "in" | "instanceof" => Err(ParseError::InvalidStartToken {
                    position: start,
                    input: self.input.to_owned(),
                }),
                _ => {
                    self.advance()?;
                    Ok((Rc::new(Expr::AccessScope { name, ancestor: 0 }), Access::Scope))
                }
            },
            Token::Number(n) => self.literal(Literal::Number(n)),
            Token::String(s) => self.literal(Literal::String(s)),
            Token::Template(chunk) => {
                self.advance()?;
                Ok((
                    Rc::new(Expr::Template {
                        cooked: vec![chunk.cooked],
                        expressions: Vec::new(),
                    }),
                    Access::Other,
                ))
            }
            Token::TemplateHead(chunk) => {
                let (chunks, expressions) = self.parse_template_rest(chunk)?;
                let cooked = chunks.into_iter().map(|c| c.cooked).collect();
                Ok((Rc::new(Expr::Template { cooked, expressions }), Access::Other))
            }
            Token::Punct(Punct::OpenParen) => {
                self.advance()?;
                let inner = self.parse_assign()?;
                self.expect(Punct::CloseParen)?;
                Ok((inner, Access::Other))
            }
            Token::Punct(Punct::OpenBracket) => self.parse_array_literal(),
            Token::Punct(Punct::OpenBrace) => self.parse_object_literal(),
            _ => Err(ParseError::InvalidStartToken {
                position: start,
                input: self.input.to_owned(),
            }),
        }
    }

    fn parse_array_literal(&mut self) -> Result<(Rc<Expr>, Access)> {
        self.advance()?;
        let mut elements = Vec::new();
        loop {
            if self.is_punct(Punct::CloseBracket) {
                break;
            }
            if self.eat(Punct::Comma)? {
                elements.push(Rc::new(Expr::PrimitiveLiteral(Literal::Undefined)));
                continue;
            }
            elements.push(self.parse_assign()?);
            if !self.eat(Punct::Comma)? {
                break;
            }
        }
        self.expect(Punct::CloseBracket)?;
        Ok((Rc::new(Expr::ArrayLiteral { elements }), Access::Other))
    }

    fn parse_object_literal(&mut self) -> Result<(Rc<Expr>, Access)> {
        self.advance()?;
        let mut keys = Vec::new();
        let mut values = Vec::new();
        loop {
            let (key, shorthand) = match self.token.clone() {
                Token::Punct(Punct::CloseBrace) => break,
                Token::Identifier(name) => (name, true),
                Token::String(s) => (s, false),
                Token::Number(n) => (Rc::from(format_number(n)), false),
                _ => {
                    return Err(ParseError::InvalidStartToken {
                        position: self.start,
                        input: self.input.to_owned(),
                    });
                }
            };
            self.advance()?;
            let value = if self.eat(Punct::Colon)? {
                self.parse_assign()?
            } else if shorthand {
                Rc::new(Expr::AccessScope {
                    name: Rc::clone(&key),
                    ancestor: 0,
                })
            } else {
                return Err(self.missing(":"));
            };
            keys.push(key);
            values.push(value);
            if !self.eat(Punct::Comma)? {
                break;
            }
        }
        self.expect(Punct::CloseBrace)?;
        Ok((Rc::new(Expr::ObjectLiteral { keys, values }), Access::Other))
    }

    /// Substitutions and chunks after a template head. The current token is
    /// the head; on return the token after the closing backtick is current.
    fn parse_template_rest(&mut self, head: Chunk) -> Result<(Vec<Chunk>, Vec<Rc<Expr>>)> {
        let template_start = self.start;
        let mut chunks = vec![head];
        let mut expressions = Vec::new();
        self.advance()?;
        loop {
            expressions.push(self.parse_assign()?);
            match self.token {
                Token::Punct(Punct::CloseBrace) => {}
                Token::Eof => {
                    return Err(ParseError::UnterminatedTemplate {
                        position: template_start,
                        input: self.input.to_owned(),
                    });
                }
                _ => return Err(self.missing("}")),
            }
            match self.lexer.scan_template(template_start)? {
                Continuation::Middle(chunk) => {
                    chunks.push(chunk);
                    self.advance()?;
                }
                Continuation::Tail(chunk) => {
                    chunks.push(chunk);
                    self.advance()?;
                    return Ok((chunks, expressions));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(input: &str) -> Rc<Expr> {
        parse(input, BindingType::None).expect("parse")
    }

    fn err(input: &str) -> ParseError {
        parse(input, BindingType::None).expect_err("should fail")
    }

    fn scope(name: &str, ancestor: u32) -> Rc<Expr> {
        Rc::new(Expr::AccessScope {
            name: Rc::from(name),
            ancestor,
        })
    }

    #[test]
    fn member_chain() {
        let expected = Expr::member(Expr::member(Expr::scope("a"), "b"), "c");
        assert_eq!(p("a.b.c"), expected);
    }

    #[test]
    fn parenthesized_object_is_same_tree() {
        assert_eq!(p("(a).b"), p("a.b"));
        assert_eq!(p("((a + b))"), p("a + b"));
    }

    #[test]
    fn this_and_parent() {
        assert_eq!(*p("$this"), Expr::AccessThis { ancestor: 0 });
        assert_eq!(*p("$parent.$parent"), Expr::AccessThis { ancestor: 2 });
        assert_eq!(p("$parent.$parent.x"), scope("x", 2));
        assert_eq!(p("$this.x"), scope("x", 0));
        assert!(matches!(
            &*p("$parent.save(1)"),
            Expr::CallScope { name, ancestor: 1, args } if &**name == "save" && args.len() == 1
        ));
    }

    #[test]
    fn calls() {
        assert!(matches!(&*p("f(a, b)"), Expr::CallScope { args, .. } if args.len() == 2));
        assert!(matches!(&*p("a.f()"), Expr::CallMember { .. }));
        assert!(matches!(&*p("(f)()"), Expr::CallFunction { .. }));
        assert!(matches!(&*p("a.f()()"), Expr::CallFunction { .. }));
    }

    #[test]
    fn keyed_access() {
        assert_eq!(p("a[0]"), Expr::keyed(Expr::scope("a"), Expr::number(0.0)));
    }

    #[test]
    fn literals() {
        assert_eq!(*p("true"), Expr::PrimitiveLiteral(Literal::Bool(true)));
        assert_eq!(*p("undefined"), Expr::PrimitiveLiteral(Literal::Undefined));
        assert_eq!(p("'x'"), Expr::string("x"));
        assert!(matches!(&*p("[1, , 2]"), Expr::ArrayLiteral { elements } if elements.len() == 3));
        let obj = p("{a, 'b c': 1, 2: x}");
        let Expr::ObjectLiteral { keys, values } = &*obj else {
            panic!("not an object literal: {obj:?}");
        };
        assert_eq!(keys.iter().map(|k| &**k).collect::<Vec<_>>(), vec!["a", "b c", "2"]);
        assert_eq!(values[0], Expr::scope("a"));
    }

    #[test]
    fn templates() {
        let t = p("`a${b}c${d}`");
        let Expr::Template { cooked, expressions } = &*t else {
            panic!("not a template: {t:?}");
        };
        assert_eq!(cooked.iter().map(|c| &**c).collect::<Vec<_>>(), vec!["a", "c", ""]);
        assert_eq!(expressions.len(), 2);
        let nested = p("`x${`y${z}`}`");
        assert!(matches!(&*nested, Expr::Template { expressions, .. } if matches!(&*expressions[0], Expr::Template { .. })));
        assert!(matches!(&*p("tag`a${b}`"), Expr::TaggedTemplate { .. }));
    }

    #[test]
    fn conditional_and_assign() {
        assert!(matches!(&*p("a ? b : c"), Expr::Conditional { .. }));
        let chain = p("a = b = 1");
        let Expr::Assign { value, .. } = &*chain else {
            panic!("not an assignment");
        };
        assert!(matches!(&**value, Expr::Assign { .. }));
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let e = p("!a && -b");
        let Expr::Binary { op, left, right } = &*e else {
            panic!("not binary");
        };
        assert_eq!(*op, BinaryOp::And);
        assert!(matches!(&**left, Expr::Unary { op: UnaryOp::Not, .. }));
        assert!(matches!(&**right, Expr::Unary { op: UnaryOp::Neg, .. }));
        assert!(matches!(&*p("typeof a === 'x'"), Expr::Binary { op: BinaryOp::StrictEq, .. }));
    }

    #[test]
    fn converters_then_behaviors() {
        let e = p("a | upper | take:10 & debounce:500");
        let Expr::BindingBehavior { expression, name, args } = &*e else {
            panic!("not a behavior");
        };
        assert_eq!(&**name, "debounce");
        assert_eq!(args.len(), 1);
        assert!(matches!(&**expression, Expr::ValueConverter { name, .. } if &**name == "take"));
        assert_eq!(err("a & b | c").code(), "TRL-111");
    }

    #[test]
    fn for_of_declarations() {
        let e = parse("item of items | sort & oneTime", BindingType::IsIterator).expect("for-of");
        assert!(matches!(&*e, Expr::ForOfStatement { declaration, .. } if matches!(&**declaration, Expr::BindingIdentifier { .. })));
        let e = parse("[k, v] of map", BindingType::IsIterator).expect("array pattern");
        assert!(matches!(&*e, Expr::ForOfStatement { declaration, .. } if matches!(&**declaration, Expr::ArrayBindingPattern { elements } if elements.len() == 2)));
        let e = parse("{a, b: c} of list", BindingType::IsIterator).expect("object pattern");
        assert!(matches!(&*e, Expr::ForOfStatement { declaration, .. } if matches!(&**declaration, Expr::ObjectBindingPattern { .. })));
    }

    #[test]
    fn for_of_errors() {
        assert_eq!(parse("1 of x", BindingType::IsIterator).unwrap_err().code(), "TRL-109");
        assert_eq!(parse("a in x", BindingType::IsIterator).unwrap_err().code(), "TRL-109");
        assert_eq!(err("a of b").code(), "TRL-108");
        assert_eq!(err("of").code(), "TRL-108");
    }

    #[test]
    fn interpolation_parts() {
        let e = parse_interpolation("Hi ${name | upper}, you are ${age}!").expect("ok").expect("some");
        let Expr::Interpolation { parts, expressions } = &*e else {
            panic!("not interpolation");
        };
        assert_eq!(parts.iter().map(|p| &**p).collect::<Vec<_>>(), vec!["Hi ", ", you are ", "!"]);
        assert!(matches!(&*expressions[0], Expr::ValueConverter { .. }));
        assert!(parse_interpolation("plain").expect("ok").is_none());
        assert_eq!(parse("plain", BindingType::Interpolation).expect("ok"), Expr::string("plain"));
    }

    #[test]
    fn interpolation_with_object_literal_braces() {
        let e = parse_interpolation("${ {a: 1}.a }x").expect("ok").expect("some");
        assert!(matches!(&*e, Expr::Interpolation { parts, .. } if &*parts[1] == "x"));
        assert_eq!(parse_interpolation("${a").unwrap_err().code(), "TRL-103");
    }

    #[test]
    fn custom_is_raw_text() {
        assert_eq!(parse("a b c", BindingType::IsCustom).expect("ok"), Expr::string("a b c"));
    }

    #[test]
    fn error_codes() {
        assert_eq!(err(")").code(), "TRL-101");
        assert_eq!(err("a.").code(), "TRL-105");
        assert_eq!(err("a.(b)").code(), "TRL-105");
        assert_eq!(err("a | 1").code(), "TRL-105");
        assert_eq!(err("f(a").code(), "TRL-106");
        assert_eq!(err("a[0").code(), "TRL-106");
        assert_eq!(err("a ? b").code(), "TRL-106");
        assert_eq!(err("1 = a").code(), "TRL-107");
        assert_eq!(err("a + b = c").code(), "TRL-107");
        assert_eq!(err("a b").code(), "TRL-110");
        assert_eq!(err("'abc").code(), "TRL-102");
        assert_eq!(err("`abc").code(), "TRL-103");
        assert_eq!(err("a # b").code(), "TRL-104");
    }

    #[test]
    fn errors_report_position() {
        let e = err("foo(bar");
        assert_eq!(e.position(), 7);
        assert_eq!(e.input(), "foo(bar");
    }

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(p("   "), Expr::string(""));
    }
}
