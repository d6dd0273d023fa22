//! Error types and handling for the exp-jit crate.
//!
//! Front-end errors (everything the parser and resolver can produce) carry
//! the byte offset of the offending character so callers can point at the
//! exact spot in the source text. Back-end errors come from the executable
//! page allocator and carry the OS error that caused them.

use core::fmt;

use errno::Errno;

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, ExprError>;

/// Error type for expression compilation and binding management.
///
/// Parse errors report positions as byte offsets into the expression text.
/// End-of-expression errors report `text.len() + 1`, the slot one past the
/// last character, since there is no offending character to point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// A character that cannot appear at this point of the expression.
    UnexpectedCharacter { position: usize, found: char },

    /// The expression ended in the middle of a construct, e.g. `"a^"`.
    UnexpectedEndOfExpression { position: usize },

    /// An identifier that is neither a bound variable, a named constant,
    /// nor a catalog operation.
    UnknownName { position: usize, name: String },

    /// A parenthesis with no partner, or a comma outside a function call.
    UnbalancedParenthesis { position: usize },

    /// A function call with the wrong number of arguments, detected at the
    /// comma or closing parenthesis.
    ArityMismatch { position: usize },

    /// An empty parenthesized group or an empty function argument.
    EmptyArgument { position: usize },

    /// `bind` was called with a name already taken by a binding, a named
    /// constant, or a catalog operation.
    NameInUse { name: String },

    /// `unbind` was called with a name that is not bound.
    NotFound { name: String },

    /// The host refused to allocate a page for generated code.
    OutOfMemory(Errno),

    /// The host refused to flip a code page from writable to executable.
    ProtectionFailed(Errno),

    /// A broken invariant inside the compiler itself. Callers cannot
    /// provoke this with any expression text; it indicates a bug.
    Internal(&'static str),
}

impl ExprError {
    /// Byte offset for parse errors, `None` for lifecycle and allocator
    /// errors.
    pub fn position(&self) -> Option<usize> {
        match self {
            ExprError::UnexpectedCharacter { position, .. }
            | ExprError::UnexpectedEndOfExpression { position }
            | ExprError::UnknownName { position, .. }
            | ExprError::UnbalancedParenthesis { position }
            | ExprError::ArityMismatch { position }
            | ExprError::EmptyArgument { position } => Some(*position),
            _ => None,
        }
    }

    /// True for errors produced while lexing, parsing or resolving the
    /// expression text.
    pub fn is_parse_error(&self) -> bool {
        self.position().is_some()
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::UnexpectedCharacter { position, found } => {
                write!(f, "'{}' not expected at position {}", found, position)
            }
            ExprError::UnexpectedEndOfExpression { position } => {
                write!(f, "unexpected end of expression at position {}", position)
            }
            ExprError::UnknownName { position, name } => {
                write!(
                    f,
                    "'{}' is not a known constant, variable or function name (position {})",
                    name, position
                )
            }
            ExprError::UnbalancedParenthesis { position } => {
                write!(f, "unbalanced parenthesis at position {}", position)
            }
            ExprError::ArityMismatch { position } => {
                write!(f, "wrong number of arguments at position {}", position)
            }
            ExprError::EmptyArgument { position } => {
                write!(f, "expected an expression at position {}", position)
            }
            ExprError::NameInUse { name } => {
                write!(f, "name '{}' is already in use", name)
            }
            ExprError::NotFound { name } => {
                write!(f, "no binding named '{}'", name)
            }
            ExprError::OutOfMemory(errno) => {
                write!(f, "executable page allocation failed: {}", errno)
            }
            ExprError::ProtectionFailed(errno) => {
                write!(f, "could not seal code page as executable: {}", errno)
            }
            ExprError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ExprError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_expose_positions() {
        let err = ExprError::UnexpectedCharacter {
            position: 7,
            found: '$',
        };
        assert_eq!(err.position(), Some(7));
        assert!(err.is_parse_error());

        let err = ExprError::NameInUse {
            name: "pi".to_string(),
        };
        assert_eq!(err.position(), None);
        assert!(!err.is_parse_error());
    }

    #[test]
    fn display_mentions_the_name() {
        let err = ExprError::UnknownName {
            position: 4,
            name: "bogus".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("bogus"));
        assert!(text.contains('4'));
    }
}
