use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::compile::{
    ast::{BinaryOp, SourcePos, UnaryOp},
    parser::{LineIndex, render_snippet},
};

/// Broad class of a runtime failure, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Name,
    Type,
    Arithmetic,
    ControlFlow,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Name => "NameError",
            Self::Type => "TypeError",
            Self::Arithmetic => "ArithmeticError",
            Self::ControlFlow => "ControlFlowError",
        };

        write!(f, "{name}")
    }
}

/// Typed errors produced while evaluating a program.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },

    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },

    #[error("'{name}' is a variable, not a function")]
    NotCallable { name: String },

    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    FunctionArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Unsupported operand types for {op}: {left} and {right}")]
    UnsupportedOperands {
        op: BinaryOp,
        left: &'static str,
        right: &'static str,
    },

    #[error("Bad operand type for unary {op}: {type_name}")]
    UnsupportedOperand { op: UnaryOp, type_name: &'static str },

    #[error("Type {type_name} does not support indexing")]
    NotIndexable { type_name: &'static str },

    #[error("Index must be an integer, got {type_name}")]
    IndexNotInteger { type_name: &'static str },

    #[error("Index out of range: index {index}, len {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Cannot assign to an index of '{name}', which is a {type_name}")]
    NotAList {
        name: String,
        type_name: &'static str,
    },

    #[error("Type {type_name} is not iterable")]
    NotIterable { type_name: &'static str },

    #[error("len() requires a list or string, got {type_name}")]
    LenUnsupported { type_name: &'static str },

    #[error("String method '{method}' called on {type_name}")]
    MethodOnNonString {
        method: String,
        type_name: &'static str,
    },

    #[error("Unknown string method '{method}'")]
    UnknownMethod { method: String },

    #[error("Method '{method}' expected {expected} arguments, got {found}")]
    MethodArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("Arguments of '{method}' must be strings, got {type_name}")]
    MethodArgument {
        method: String,
        type_name: &'static str,
    },

    #[error("range() arguments must be integers, got {type_name}")]
    RangeArgument { type_name: &'static str },

    #[error("range() step must not be zero")]
    RangeStepZero,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Modulo by zero")]
    ModuloByZero,

    #[error("Integer overflow in {operation}")]
    IntegerOverflow { operation: &'static str },

    #[error("'break' outside loop")]
    BreakOutsideLoop,

    #[error("'continue' outside loop")]
    ContinueOutsideLoop,

    #[error("Maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize },
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UndefinedVariable { .. } | Self::UndefinedFunction { .. } => ErrorKind::Name,
            Self::DivisionByZero | Self::ModuloByZero | Self::IntegerOverflow { .. } => {
                ErrorKind::Arithmetic
            }
            Self::BreakOutsideLoop
            | Self::ContinueOutsideLoop
            | Self::NotCallable { .. }
            | Self::FunctionArityMismatch { .. }
            | Self::CallDepthExceeded { .. } => ErrorKind::ControlFlow,
            _ => ErrorKind::Type,
        }
    }

    /// A short suggestion for fixing the program, where one applies.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UndefinedVariable { name } => {
                Some(format!("assign '{name}' before reading it"))
            }
            Self::UndefinedFunction { name } => {
                Some(format!("define '{name}' with 'def' before calling it"))
            }
            Self::NotCallable { name } => Some(format!(
                "'{name}' holds a value; only names bound by 'def' can be called"
            )),
            Self::FunctionArityMismatch { name, expected, .. } => {
                Some(format!("call '{name}' with exactly {expected} argument(s)"))
            }
            Self::IndexOutOfRange { len, .. } => match len {
                0 => Some("the sequence is empty".to_string()),
                len => Some(format!("valid indices are 0 to {}", len - 1)),
            },
            Self::DivisionByZero | Self::ModuloByZero => {
                Some("check the divisor before dividing".to_string())
            }
            Self::BreakOutsideLoop | Self::ContinueOutsideLoop => {
                Some("only use it inside 'while' or 'for'".to_string())
            }
            Self::CallDepthExceeded { .. } => {
                Some("make sure the recursion has a reachable base case".to_string())
            }
            Self::UnknownMethod { .. } => {
                Some("strings support upper(), lower(), strip() and replace(old, new)".to_string())
            }
            _ => None,
        }
    }
}

/// A runtime error with the position of the statement that raised it.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{} at line {line}, column {column}: {error}", .error.kind())]
pub struct ScriptError {
    pub error: RuntimeError,
    pub line: usize,
    pub column: usize,
    pub span: SourcePos,
}

impl ScriptError {
    pub fn new(error: RuntimeError, span: SourcePos, index: &LineIndex) -> Self {
        let (line, column) = index.position(span.start);

        Self {
            error,
            line,
            column,
            span,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// The error rendered against its source text.
    pub fn report(&self, src: &str) -> String {
        render_snippet(src, &self.span, &self.to_string(), self.error.hint().as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_classified() {
        assert_eq!(RuntimeError::DivisionByZero.kind(), ErrorKind::Arithmetic);
        assert_eq!(RuntimeError::BreakOutsideLoop.kind(), ErrorKind::ControlFlow);
        assert_eq!(
            RuntimeError::UndefinedVariable { name: "x".into() }.kind(),
            ErrorKind::Name
        );
        assert_eq!(RuntimeError::RangeStepZero.kind(), ErrorKind::Type);
        assert_eq!(
            RuntimeError::NotCallable { name: "f".into() }.kind(),
            ErrorKind::ControlFlow
        );
    }

    #[test]
    fn located_error_mentions_kind_and_line() {
        let src = "x = 1\ny = x / 0";
        let index = LineIndex::new(src);
        let err = ScriptError::new(RuntimeError::DivisionByZero, 6..15, &index);

        assert_eq!(
            err.to_string(),
            "ArithmeticError at line 2, column 1: Division by zero"
        );
    }
}
