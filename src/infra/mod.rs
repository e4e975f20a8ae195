use std::process::Termination;

use thiserror::Error;

use crate::{compile::parser::SyntaxError, interp::error::ScriptError};

pub struct ExitCode(u8);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAIL_PARSING: ExitCode = ExitCode(42);
    pub const FAIL_SEMANTIC: ExitCode = ExitCode(7);
    pub const FAIL_RUNTIME: ExitCode = ExitCode(70);
}

impl Termination for ExitCode {
    fn report(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self.0)
    }
}

impl From<&QuillError> for ExitCode {
    fn from(value: &QuillError) -> Self {
        match value {
            QuillError::SyntaxError(_) => ExitCode::FAIL_PARSING,
            QuillError::SemanticError(_) => ExitCode::FAIL_SEMANTIC,
            QuillError::RuntimeError(_) => ExitCode::FAIL_RUNTIME,
            _ => ExitCode(255),
        }
    }
}

impl From<QuillError> for ExitCode {
    fn from(value: QuillError) -> Self {
        ExitCode::from(&value)
    }
}

#[derive(Error, Debug)]
pub enum QuillError {
    #[error("Syntactic Analysis failed: {0}")]
    SyntaxError(#[from] SyntaxError),

    #[error("Semantic Analysis failed with {0} error(s).")]
    SemanticError(usize),

    #[error("Execution failed: {0}")]
    RuntimeError(#[from] ScriptError),

    #[error("There was an I/O error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("There was a Formatting error: {0}")]
    FmtError(#[from] std::fmt::Error),
}

/// Formats a float the way scripts print it: integral values keep a trailing `.0`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_keep_a_fraction_digit() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(3.25), "3.25");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(1e16), "10000000000000000.0");
        assert_eq!(format_float(1e20), "100000000000000000000.0");
    }

    #[test]
    fn exit_codes_follow_failure_kind() {
        let code = ExitCode::from(QuillError::SemanticError(2));

        assert_eq!(code.0, ExitCode::FAIL_SEMANTIC.0);
    }
}
