//! Combinatorial operator precedence matrix.
//!
//! For every ordered pair of binary operators, `a op1 b op2 c` must nest the
//! tighter operator inside the looser one; equal tiers associate left.
//! Unary operators and the conditional are checked against every tier.

use std::rc::Rc;

use trellis_expr::{BinaryOp, BindingType, Expr, UnaryOp, parse};

fn p(input: &str) -> Rc<Expr> {
    parse(input, BindingType::None).unwrap_or_else(|e| panic!("{input}: {e}"))
}

fn bin(op: BinaryOp, left: Rc<Expr>, right: Rc<Expr>) -> Rc<Expr> {
    Expr::binary(op, left, right)
}

// ═══════════════════════════════════════════════════════════════════════
// Binary × binary
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn every_operator_pair_nests_by_tier() {
    let (a, b, c) = (Expr::scope("a"), Expr::scope("b"), Expr::scope("c"));
    for op1 in BinaryOp::ALL {
        for op2 in BinaryOp::ALL {
            let text = format!("a {} b {} c", op1.as_str(), op2.as_str());
            let expected = if op2.precedence() > op1.precedence() {
                bin(op1, Rc::clone(&a), bin(op2, Rc::clone(&b), Rc::clone(&c)))
            } else {
                bin(op2, bin(op1, Rc::clone(&a), Rc::clone(&b)), Rc::clone(&c))
            };
            assert_eq!(p(&text), expected, "{text}");
        }
    }
}

#[test]
fn explicit_parentheses_override_tiers() {
    for op1 in BinaryOp::ALL {
        for op2 in BinaryOp::ALL {
            let text = format!("a {} (b {} c)", op1.as_str(), op2.as_str());
            let expected = bin(
                op1,
                Expr::scope("a"),
                bin(op2, Expr::scope("b"), Expr::scope("c")),
            );
            assert_eq!(p(&text), expected, "{text}");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Unary × binary
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn unary_binds_tighter_than_every_binary_tier() {
    let unaries = [
        ("!", UnaryOp::Not),
        ("-", UnaryOp::Neg),
        ("+", UnaryOp::Plus),
        ("typeof ", UnaryOp::TypeOf),
        ("void ", UnaryOp::Void),
    ];
    for (spelling, uop) in unaries {
        for op in BinaryOp::ALL {
            let text = format!("{spelling}a {} b", op.as_str());
            let expected = bin(
                op,
                Rc::new(Expr::Unary {
                    op: uop,
                    operand: Expr::scope("a"),
                }),
                Expr::scope("b"),
            );
            assert_eq!(p(&text), expected, "{text}");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Conditional / assignment × binary
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn conditional_is_looser_than_every_binary_tier() {
    for op in BinaryOp::ALL {
        let text = format!("a {0} b ? c {0} d : e {0} f", op.as_str());
        let expected = Rc::new(Expr::Conditional {
            condition: bin(op, Expr::scope("a"), Expr::scope("b")),
            yes: bin(op, Expr::scope("c"), Expr::scope("d")),
            no: bin(op, Expr::scope("e"), Expr::scope("f")),
        });
        assert_eq!(p(&text), expected, "{text}");
    }
}

#[test]
fn conditional_is_right_associative() {
    let expected = Rc::new(Expr::Conditional {
        condition: Expr::scope("a"),
        yes: Expr::scope("b"),
        no: Rc::new(Expr::Conditional {
            condition: Expr::scope("c"),
            yes: Expr::scope("d"),
            no: Expr::scope("e"),
        }),
    });
    assert_eq!(p("a ? b : c ? d : e"), expected);
}

#[test]
fn assignment_is_loosest() {
    for op in BinaryOp::ALL {
        let text = format!("x = a {} b", op.as_str());
        let expected = Rc::new(Expr::Assign {
            target: Expr::scope("x"),
            value: bin(op, Expr::scope("a"), Expr::scope("b")),
        });
        assert_eq!(p(&text), expected, "{text}");
    }
}

#[test]
fn member_access_binds_tighter_than_unary() {
    let expected = Rc::new(Expr::Unary {
        op: UnaryOp::Not,
        operand: Expr::member(Expr::scope("a"), "b"),
    });
    assert_eq!(p("!a.b"), expected);
}

#[test]
fn converter_wraps_whole_conditional() {
    let e = p("a ? b : c | upper");
    assert!(matches!(&*e, Expr::ValueConverter { expression, .. } if matches!(&**expression, Expr::Conditional { .. })));
}
