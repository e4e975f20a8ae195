//! An educational scripting language: a tree-walking interpreter plus an instructional
//! compiler pipeline (semantic analysis, three-address code, heuristic optimization and
//! pseudo-assembly) whose phases each produce a printable report.

pub mod compile;
pub mod datstructures;
pub mod infra;
pub mod interp;

use compile::{Pipeline, parser::SyntaxError, report::PhaseReport};
use interp::Execution;

/// Runs a program with the default configuration.
pub fn run(src: &str) -> Execution {
    Pipeline::new().run(src)
}

/// Runs every compiler phase with the default configuration.
pub fn analyze_phases(src: &str) -> PhaseReport {
    Pipeline::new().analyze_phases(src)
}

/// Folds constants and prunes literal branches, returning the rewritten source.
pub fn simplify(src: &str) -> Result<String, SyntaxError> {
    Pipeline::new().simplify(src)
}
