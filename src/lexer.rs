//! Tokenization.
//!
//! A character-driven state machine walks the expression text once,
//! producing the token sequence and rejecting malformed input with a
//! positioned error. Bracket balance and per-call argument counts are
//! checked here, during tokenization, so the later shunting-yard pass can
//! assume a well-formed stream.
//!
//! The only recognized whitespace is the plain space; a virtual trailing
//! space terminates the final token, which is why end-of-input errors
//! report the position one past the last character.

use crate::error::{ExprError, Result};

/// Infix operator precedence, tightest first.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) enum InfixRank {
    /// `^`
    Power,
    /// `*` and `/`
    Scaling,
    /// `+` and `-`
    Additive,
    /// `<`
    Ordering,
}

/// Token classification. Function parentheses are distinguished from
/// grouping parentheses so the postfix pass can cut call boundaries.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum TokenKind {
    Literal,
    ConstantName,
    VariableName,
    FunctionName,
    Infix(InfixRank),
    Unary,
    LeftParen,
    RightParen,
    FunctionLeftParen,
    FunctionRightParen,
    Comma,
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: usize,
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, position: usize, text: &str) -> Self {
        Token {
            kind,
            position,
            text: text.to_string(),
        }
    }
}

/// What an identifier resolves to at tokenization time.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum NameClass {
    Variable,
    Constant,
    /// A catalog operation, with its arity.
    Function(usize),
}

/// Name lookup seam between the lexer and whoever owns the bindings.
pub(crate) trait ResolveNames {
    fn classify(&self, name: &str) -> Option<NameClass>;
}

fn is_operator(c: u8) -> bool {
    matches!(c, b'+' | b'-' | b'*' | b'/' | b'^' | b'<')
}

fn is_alphabetic(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn infix_rank(c: u8) -> InfixRank {
    match c {
        b'^' => InfixRank::Power,
        b'*' | b'/' => InfixRank::Scaling,
        b'+' | b'-' => InfixRank::Additive,
        _ => InfixRank::Ordering,
    }
}

/// Lexer state: what the previous characters committed us to.
#[derive(Copy, Clone, PartialEq, Eq)]
enum State {
    /// Start of the whole expression, of a parenthesized group, or of a
    /// function argument.
    ExprStart,
    /// Just consumed an infix or unary operator.
    AfterInfix,
    /// Inside the integer part of a numeric literal.
    Integer,
    /// Inside a numeric literal, after the decimal point.
    Fraction,
    /// Inside an identifier.
    Word,
    /// Just completed an operand (literal, name, or closing parenthesis).
    AfterOperand,
    /// Just read a function name, its `(` is still outstanding.
    AfterFunctionName,
}

/// Bookkeeping for one function call (plus one base frame for the whole
/// expression): open grouping parentheses inside it, and how many
/// arguments the current call still expects.
struct Frame {
    open_parens: usize,
    pending_args: usize,
}

pub(crate) struct Lexer<'a, R: ResolveNames> {
    input: &'a [u8],
    names: &'a R,
    tokens: Vec<Token>,
    frames: Vec<Frame>,
    function_parens: usize,
    state: State,
    /// Byte offset where the literal or identifier under construction
    /// started.
    token_start: usize,
}

/// Tokenizes `input`, validating syntax, bracket structure and call
/// arities in one pass.
pub(crate) fn tokenize<R: ResolveNames>(input: &str, names: &R) -> Result<Vec<Token>> {
    Lexer::new(input, names).run()
}

impl<'a, R: ResolveNames> Lexer<'a, R> {
    fn new(input: &'a str, names: &'a R) -> Self {
        Lexer {
            input: input.as_bytes(),
            names,
            tokens: Vec::new(),
            frames: vec![Frame {
                open_parens: 0,
                pending_args: 0,
            }],
            function_parens: 0,
            state: State::ExprStart,
            token_start: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        // One iteration past the end with a virtual space, so the final
        // literal or identifier terminates like any other.
        for i in 0..=self.input.len() {
            let c = self.input.get(i).copied().unwrap_or(b' ');
            self.step(i, c)?;
        }

        let end = self.input.len() + 1;
        if self.frame().open_parens > 0 || self.function_parens > 0 {
            return Err(ExprError::UnbalancedParenthesis { position: end });
        }
        if self.state != State::AfterOperand {
            return Err(ExprError::UnexpectedEndOfExpression { position: end });
        }
        Ok(self.tokens)
    }

    fn step(&mut self, i: usize, c: u8) -> Result<()> {
        match self.state {
            State::ExprStart => {
                if c == b'-' || c == b'+' {
                    self.push(TokenKind::Unary, i, c);
                    self.state = State::AfterInfix;
                    return Ok(());
                }
                if c == b')' {
                    if self.frame().open_parens != 0 {
                        return Err(ExprError::EmptyArgument { position: i });
                    }
                    if self.function_parens == 0 {
                        return Err(ExprError::UnbalancedParenthesis { position: i });
                    }
                    if self.frame().pending_args != 0 {
                        return Err(ExprError::ArityMismatch { position: i });
                    }
                    self.tokens
                        .push(Token::new(TokenKind::FunctionRightParen, i, ")"));
                    self.function_parens -= 1;
                    self.frames.pop();
                    self.state = State::AfterOperand;
                    return Ok(());
                }
                self.operand_start(i, c)
            }
            State::AfterInfix => self.operand_start(i, c),
            State::Integer => {
                if c == b'.' {
                    self.state = State::Fraction;
                    return Ok(());
                }
                self.literal_continue(i, c)
            }
            State::Fraction => self.literal_continue(i, c),
            State::Word => self.word_continue(i, c),
            State::AfterOperand => match c {
                b' ' => Ok(()),
                _ if is_operator(c) => {
                    self.push(TokenKind::Infix(infix_rank(c)), i, c);
                    self.state = State::AfterInfix;
                    Ok(())
                }
                b')' => self.close_paren(i),
                b',' => self.comma(i),
                _ => Err(unexpected(i, c)),
            },
            State::AfterFunctionName => {
                if c == b'(' {
                    self.state = State::ExprStart;
                    Ok(())
                } else {
                    Err(unexpected(i, c))
                }
            }
        }
    }

    /// Shared entry for `ExprStart` and `AfterInfix`: everything that can
    /// begin an operand.
    fn operand_start(&mut self, i: usize, c: u8) -> Result<()> {
        match c {
            b' ' => Ok(()),
            b'0'..=b'9' => {
                self.token_start = i;
                self.state = State::Integer;
                Ok(())
            }
            b'.' => {
                // A decimal point must introduce digits: `.5` yes, `.` no.
                if self.input.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    self.token_start = i;
                    self.state = State::Fraction;
                    Ok(())
                } else {
                    Err(unexpected(i, c))
                }
            }
            _ if is_alphabetic(c) => {
                self.token_start = i;
                self.state = State::Word;
                Ok(())
            }
            b'-' | b'+' => {
                self.push(TokenKind::Unary, i, c);
                self.state = State::AfterInfix;
                Ok(())
            }
            b'(' => {
                self.tokens.push(Token::new(TokenKind::LeftParen, i, "("));
                self.frame_mut().open_parens += 1;
                self.state = State::ExprStart;
                Ok(())
            }
            _ => Err(unexpected(i, c)),
        }
    }

    /// Digits and whatever legally terminates a literal.
    fn literal_continue(&mut self, i: usize, c: u8) -> Result<()> {
        match c {
            b'0'..=b'9' => Ok(()),
            b' ' => {
                self.finish_literal(i);
                self.state = State::AfterOperand;
                Ok(())
            }
            b')' => {
                self.finish_literal(i);
                self.state = State::AfterOperand;
                self.close_paren(i)
            }
            _ if is_operator(c) => {
                self.finish_literal(i);
                self.push(TokenKind::Infix(infix_rank(c)), i, c);
                self.state = State::AfterInfix;
                Ok(())
            }
            b',' => {
                self.finish_literal(i);
                self.comma(i)
            }
            _ => Err(unexpected(i, c)),
        }
    }

    /// Identifier characters and whatever legally terminates a name.
    fn word_continue(&mut self, i: usize, c: u8) -> Result<()> {
        if is_alphabetic(c) || c.is_ascii_digit() {
            return Ok(());
        }
        let word = &self.input[self.token_start..i];
        let word = core::str::from_utf8(word).map_err(|_| ExprError::Internal("ascii word"))?;

        match c {
            b' ' => match self.names.classify(word) {
                Some(NameClass::Variable) => {
                    self.push_word(TokenKind::VariableName, word);
                    self.state = State::AfterOperand;
                    Ok(())
                }
                Some(NameClass::Constant) => {
                    self.push_word(TokenKind::ConstantName, word);
                    self.state = State::AfterOperand;
                    Ok(())
                }
                Some(NameClass::Function(arity)) => {
                    self.open_call(word, arity, i);
                    self.state = State::AfterFunctionName;
                    Ok(())
                }
                None => Err(self.unknown(word, i)),
            },
            b'(' => match self.names.classify(word) {
                Some(NameClass::Function(arity)) => {
                    self.open_call(word, arity, i);
                    self.state = State::ExprStart;
                    Ok(())
                }
                _ => Err(self.unknown(word, i)),
            },
            b')' => {
                self.push_value_name(word, i)?;
                self.state = State::AfterOperand;
                self.close_paren(i)
            }
            _ if is_operator(c) => {
                self.push_value_name(word, i)?;
                self.push(TokenKind::Infix(infix_rank(c)), i, c);
                self.state = State::AfterInfix;
                Ok(())
            }
            b',' => {
                self.push_value_name(word, i)?;
                self.comma(i)
            }
            _ => Err(unexpected(i, c)),
        }
    }

    /// A name in value position must be a variable or a constant; a
    /// function name here means a call with no parenthesis.
    fn push_value_name(&mut self, word: &str, i: usize) -> Result<()> {
        match self.names.classify(word) {
            Some(NameClass::Variable) => {
                self.push_word(TokenKind::VariableName, word);
                Ok(())
            }
            Some(NameClass::Constant) => {
                self.push_word(TokenKind::ConstantName, word);
                Ok(())
            }
            _ => Err(self.unknown(word, i)),
        }
    }

    fn open_call(&mut self, word: &str, arity: usize, i: usize) {
        self.push_word(TokenKind::FunctionName, word);
        self.tokens
            .push(Token::new(TokenKind::FunctionLeftParen, i, "("));
        self.frames.push(Frame {
            open_parens: 0,
            pending_args: arity,
        });
        self.function_parens += 1;
    }

    fn close_paren(&mut self, i: usize) -> Result<()> {
        if self.frame().open_parens > 0 {
            self.tokens.push(Token::new(TokenKind::RightParen, i, ")"));
            self.frame_mut().open_parens -= 1;
        } else if self.function_parens > 0 {
            if self.frame().pending_args != 1 {
                return Err(ExprError::ArityMismatch { position: i });
            }
            self.tokens
                .push(Token::new(TokenKind::FunctionRightParen, i, ")"));
            self.function_parens -= 1;
            self.frames.pop();
        } else {
            return Err(ExprError::UnbalancedParenthesis { position: i });
        }
        self.state = State::AfterOperand;
        Ok(())
    }

    fn comma(&mut self, i: usize) -> Result<()> {
        if self.frame().open_parens != 0 {
            return Err(ExprError::UnbalancedParenthesis { position: i });
        }
        if self.frame().pending_args < 2 {
            return Err(ExprError::ArityMismatch { position: i });
        }
        self.frame_mut().pending_args -= 1;
        self.tokens.push(Token::new(TokenKind::Comma, i, ","));
        self.state = State::ExprStart;
        Ok(())
    }

    fn finish_literal(&mut self, end: usize) {
        let text = core::str::from_utf8(&self.input[self.token_start..end])
            .unwrap_or_default()
            .to_string();
        self.tokens.push(Token {
            kind: TokenKind::Literal,
            position: self.token_start,
            text,
        });
    }

    fn push(&mut self, kind: TokenKind, position: usize, c: u8) {
        self.tokens.push(Token {
            kind,
            position,
            text: (c as char).to_string(),
        });
    }

    fn push_word(&mut self, kind: TokenKind, word: &str) {
        self.tokens.push(Token {
            kind,
            position: self.token_start,
            text: word.to_string(),
        });
    }

    fn unknown(&self, word: &str, i: usize) -> ExprError {
        ExprError::UnknownName {
            position: i,
            name: word.to_string(),
        }
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("base frame always present")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("base frame always present")
    }
}

fn unexpected(i: usize, c: u8) -> ExprError {
    ExprError::UnexpectedCharacter {
        position: i,
        found: c as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    struct TestNames;

    impl ResolveNames for TestNames {
        fn classify(&self, name: &str) -> Option<NameClass> {
            match name {
                "x" | "y" | "long_name_1" => Some(NameClass::Variable),
                "pi" | "e" => Some(NameClass::Constant),
                _ => catalog::lookup(name).map(|op| NameClass::Function(op.arity)),
            }
        }
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input, &TestNames)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_every_category() {
        let tokens = tokenize("1.5 + x * (pi - sin(y))", &TestNames).unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::Literal));
        assert!(kinds.contains(&TokenKind::VariableName));
        assert!(kinds.contains(&TokenKind::ConstantName));
        assert!(kinds.contains(&TokenKind::FunctionName));
        assert!(kinds.contains(&TokenKind::LeftParen));
        assert!(kinds.contains(&TokenKind::FunctionLeftParen));
        assert!(kinds.contains(&TokenKind::Infix(InfixRank::Additive)));
    }

    #[test]
    fn literal_forms() {
        assert_eq!(kinds("3"), vec![TokenKind::Literal]);
        assert_eq!(kinds("3.25"), vec![TokenKind::Literal]);
        assert_eq!(kinds("3."), vec![TokenKind::Literal]);
        assert_eq!(kinds(".5"), vec![TokenKind::Literal]);
        let tokens = tokenize(".5", &TestNames).unwrap();
        assert_eq!(tokens[0].text, ".5");
        assert_eq!(tokens[0].position, 0);
    }

    #[test]
    fn lone_dot_is_rejected() {
        let err = tokenize(".", &TestNames).unwrap_err();
        assert_eq!(
            err,
            ExprError::UnexpectedCharacter {
                position: 0,
                found: '.'
            }
        );
        let err = tokenize("1 + .", &TestNames).unwrap_err();
        assert_eq!(err.position(), Some(4));
    }

    #[test]
    fn no_scientific_notation() {
        // 'e' after digits reads as a name boundary failure, matching the
        // grammar's number production.
        let err = tokenize("1e5", &TestNames).unwrap_err();
        assert!(matches!(err, ExprError::UnexpectedCharacter { .. }));
    }

    #[test]
    fn unary_signs_chain() {
        let tokens = tokenize("--+1", &TestNames).unwrap();
        let unaries = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Unary)
            .count();
        assert_eq!(unaries, 3);
    }

    #[test]
    fn function_argument_counting() {
        assert!(tokenize("max(1, 2)", &TestNames).is_ok());
        assert!(tokenize("sin(x)", &TestNames).is_ok());
        assert!(tokenize("sin (x)", &TestNames).is_ok());

        let err = tokenize("sin(1, 2)", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::ArityMismatch { position: 5 });

        let err = tokenize("max(1)", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::ArityMismatch { position: 5 });

        let err = tokenize("sin()", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::ArityMismatch { position: 4 });
    }

    #[test]
    fn empty_group_is_reported() {
        let err = tokenize("()", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::EmptyArgument { position: 1 });

        let err = tokenize("max(1, 2*())", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::EmptyArgument { position: 10 });
    }

    #[test]
    fn unbalanced_parentheses() {
        let err = tokenize("(x", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::UnbalancedParenthesis { position: 3 });

        let err = tokenize("x)", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::UnbalancedParenthesis { position: 1 });

        let err = tokenize(")", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::UnbalancedParenthesis { position: 0 });

        let err = tokenize("1, 2", &TestNames).unwrap_err();
        assert!(matches!(err, ExprError::ArityMismatch { position: 1 }));
    }

    #[test]
    fn unknown_names_carry_the_name() {
        let err = tokenize("x + bogus", &TestNames).unwrap_err();
        match err {
            ExprError::UnknownName { name, position } => {
                assert_eq!(name, "bogus");
                assert_eq!(position, 9);
            }
            other => panic!("expected UnknownName, got {:?}", other),
        }

        // A function name in value position is unknown as a value.
        let err = tokenize("sin + 1", &TestNames).unwrap_err();
        assert!(matches!(err, ExprError::UnknownName { .. }));
    }

    #[test]
    fn dangling_operator_reports_one_past_the_end() {
        let err = tokenize("x^", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::UnexpectedEndOfExpression { position: 3 });

        let err = tokenize("", &TestNames).unwrap_err();
        assert_eq!(err, ExprError::UnexpectedEndOfExpression { position: 1 });
    }

    #[test]
    fn function_name_without_parenthesis() {
        let err = tokenize("sin 1", &TestNames).unwrap_err();
        assert!(matches!(err, ExprError::UnexpectedCharacter { .. }));
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = tokenize("x + long_name_1", &TestNames).unwrap();
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 2);
        assert_eq!(tokens[2].position, 4);
    }
}
