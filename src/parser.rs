//! Postfix conversion.
//!
//! A shunting yard turns the validated token sequence into a postfix
//! stream. Function call boundaries survive the conversion: a call's
//! arguments are flushed up to the function name itself, so the linker can
//! reconnect arguments by position.
//!
//! Precedence quirks, kept deliberately:
//! * `^` is right-associative (an incoming `^` never pops the stack).
//! * A unary sign adopts power precedence when the operator stack's top
//!   already has power precedence, and additive precedence otherwise. So
//!   `2^-3` exponentiates the negated literal while `-2^2` negates the
//!   power, and a leading `-` wraps the whole scaling chain after it.

use crate::error::{ExprError, Result};
use crate::lexer::{InfixRank, Token, TokenKind};

/// Operator-stack slot: the token plus its effective precedence. Function
/// names and grouping parentheses carry no precedence and fence the
/// pop loops.
struct StackEntry {
    token: Token,
    rank: Option<InfixRank>,
}

/// Converts the token sequence to postfix order.
pub(crate) fn to_postfix(tokens: Vec<Token>) -> Result<Vec<Token>> {
    let mut postfix: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut stack: Vec<StackEntry> = Vec::new();

    for token in tokens {
        match token.kind {
            TokenKind::Infix(rank) if rank != InfixRank::Power => {
                while let Some(top) = stack.last() {
                    match top.rank {
                        Some(sp) if sp <= rank => {
                            postfix.push(stack.pop().map(|e| e.token).ok_or(POP)?)
                        }
                        _ => break,
                    }
                }
                stack.push(StackEntry {
                    rank: Some(rank),
                    token,
                });
            }
            TokenKind::Infix(rank) => {
                stack.push(StackEntry {
                    rank: Some(rank),
                    token,
                });
            }
            TokenKind::Unary => {
                let rank = match stack.last().and_then(|top| top.rank) {
                    Some(InfixRank::Power) => InfixRank::Power,
                    _ => InfixRank::Additive,
                };
                stack.push(StackEntry {
                    rank: Some(rank),
                    token,
                });
            }
            TokenKind::Literal | TokenKind::ConstantName | TokenKind::VariableName => {
                postfix.push(token);
            }
            TokenKind::FunctionName | TokenKind::LeftParen => {
                stack.push(StackEntry { rank: None, token });
            }
            TokenKind::RightParen => {
                loop {
                    let entry = stack.pop().ok_or(POP)?;
                    if entry.token.kind == TokenKind::LeftParen {
                        break;
                    }
                    postfix.push(entry.token);
                }
            }
            TokenKind::FunctionRightParen => loop {
                let entry = stack.pop().ok_or(POP)?;
                let done = entry.token.kind == TokenKind::FunctionName;
                postfix.push(entry.token);
                if done {
                    break;
                }
            },
            TokenKind::Comma => {
                while let Some(top) = stack.last() {
                    if top.token.kind == TokenKind::FunctionName {
                        break;
                    }
                    postfix.push(stack.pop().map(|e| e.token).ok_or(POP)?);
                }
            }
            TokenKind::FunctionLeftParen => {}
        }
    }

    while let Some(entry) = stack.pop() {
        postfix.push(entry.token);
    }

    Ok(postfix)
}

const POP: ExprError = ExprError::Internal("operator stack underflow");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::lexer::{tokenize, NameClass, ResolveNames};

    struct TestNames;

    impl ResolveNames for TestNames {
        fn classify(&self, name: &str) -> Option<NameClass> {
            match name {
                "a" | "b" | "c" | "x" => Some(NameClass::Variable),
                "pi" | "e" => Some(NameClass::Constant),
                _ => catalog::lookup(name).map(|op| NameClass::Function(op.arity)),
            }
        }
    }

    fn postfix_text(input: &str) -> String {
        let tokens = tokenize(input, &TestNames).unwrap();
        let postfix = to_postfix(tokens).unwrap();
        postfix
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn left_associative_chains() {
        assert_eq!(postfix_text("a - b - c"), "a b - c -");
        assert_eq!(postfix_text("a / b / c"), "a b / c /");
    }

    #[test]
    fn precedence_orders_operators() {
        assert_eq!(postfix_text("a + b * c"), "a b c * +");
        assert_eq!(postfix_text("a * b + c"), "a b * c +");
        assert_eq!(postfix_text("a < b + c"), "a b c + <");
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(postfix_text("a ^ b ^ c"), "a b c ^ ^");
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(postfix_text("(a + b) * c"), "a b + c *");
    }

    #[test]
    fn unary_minus_binds_loosely_by_default() {
        // The sign wraps the whole scaling chain that follows it.
        assert_eq!(postfix_text("-a * b"), "a b * -");
        assert_eq!(postfix_text("-a + b"), "a - b +");
        assert_eq!(postfix_text("-2 ^ 2"), "2 2 ^ -");
    }

    #[test]
    fn unary_after_power_keeps_power_precedence() {
        assert_eq!(postfix_text("2 ^ -3"), "2 3 - ^");
        assert_eq!(postfix_text("2 ^ -3 + 1"), "2 3 - ^ 1 +");
    }

    #[test]
    fn function_calls_preserve_boundaries() {
        assert_eq!(postfix_text("max(a, b)"), "a b max");
        assert_eq!(postfix_text("max(a + b, c)"), "a b + c max");
        assert_eq!(postfix_text("max(sin(a), 1)"), "a sin 1 max");
        assert_eq!(postfix_text("sin(a) * cos(b)"), "a sin b cos *");
    }

    #[test]
    fn unary_inside_call_arguments() {
        assert_eq!(postfix_text("max(-a, b)"), "a - b max");
        assert_eq!(postfix_text("sin(-a * b)"), "a b * - sin");
    }
}
