use asm::{Asm, codegen};
use ast::{Program, simplify::simplify, tree::TreeNode};
use ir::{
    Ir,
    lowering::lower,
    optimize::{Optimization, Optimized, OptimizerConfig},
};
use parser::{
    LineIndex, SyntaxError,
    lex::{Lexed, tokenize},
};
use report::{LexicalReport, PhaseReport, Stage};
use semantic::{SemanticAnalysis, SemanticReport};

use crate::{
    infra::QuillError,
    interp::{DEFAULT_MAX_CALL_DEPTH, Execution, Interpreter},
};

pub mod asm;
pub mod ast;
pub mod ir;
pub mod parser;
pub mod report;
pub mod semantic;

/// Runs source text through the interpreter or through the instructional pipeline.
///
/// Every run builds its own lexer output, environment and counters; nothing is shared
/// between runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    max_call_depth: usize,
    optimizations: OptimizerConfig,
    stop_on_semantic_errors: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            optimizations: OptimizerConfig::default(),
            stop_on_semantic_errors: true,
        }
    }
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    pub fn max_call_depth(&mut self, depth: usize) -> &mut Self {
        self.max_call_depth = depth;

        self
    }

    pub fn optimizations(&mut self, config: OptimizerConfig) -> &mut Self {
        self.optimizations = config;

        self
    }

    /// Whether [`Pipeline::analyze_phases`] stops after a semantic report with diagnostics.
    pub fn stop_on_semantic_errors(&mut self, stop: bool) -> &mut Self {
        self.stop_on_semantic_errors = stop;

        self
    }

    pub fn tokenize<'src>(&self, src: &'src str) -> Lexed<'src> {
        tokenize(src)
    }

    pub fn parse(&self, src: &str) -> Result<Program, SyntaxError> {
        let lexed = self.tokenize(src);

        parser::parse(src, &lexed.tokens)
    }

    pub fn analyze(&self, src: &str, program: &Program) -> SemanticReport {
        let index = LineIndex::new(src);

        SemanticAnalysis::analyze(program, &index)
    }

    pub fn lower(&self, program: &Program) -> Ir {
        lower(program)
    }

    pub fn optimize(&self, ir: &Ir) -> Optimized {
        Optimization::new(self.optimizations).optimize(&ir.instructions)
    }

    pub fn generate(&self, optimized: &Optimized) -> Asm {
        codegen::generate(&optimized.instructions())
    }

    /// Lexes, parses and interprets. Output printed before a failure is kept.
    pub fn run(&self, src: &str) -> Execution {
        let lexed = self.tokenize(src);

        let program = match parser::parse(src, &lexed.tokens) {
            Ok(program) => program,
            Err(err) => {
                return Execution {
                    output: String::new(),
                    result: Err(err.into()),
                    lex_errors: lexed.errors,
                    caught: Vec::new(),
                };
            }
        };

        let index = LineIndex::new(src);
        let (output, result, caught) =
            Interpreter::new(self.max_call_depth).execute(&program, &index);

        Execution {
            output,
            result: result.map_err(QuillError::from),
            lex_errors: lexed.errors,
            caught,
        }
    }

    /// Runs every phase in order and reports on each. A failing phase marks the later ones
    /// as skipped.
    pub fn analyze_phases(&self, src: &str) -> PhaseReport {
        let lexed = self.tokenize(src);
        let mut report = PhaseReport::new(LexicalReport::new(src, &lexed));

        let program = match parser::parse(src, &lexed.tokens) {
            Ok(program) => program,
            Err(err) => {
                report.syntax = Stage::Failed(err.report(src));
                report.error = Some(err.into());
                return report;
            }
        };
        report.syntax = Stage::Completed(TreeNode::from(&program));

        let semantic = self.analyze(src, &program);
        let diagnostics = semantic.diagnostics.len();
        report.semantic = Stage::Completed(semantic);

        if diagnostics > 0 {
            report.error = Some(QuillError::SemanticError(diagnostics));

            if self.stop_on_semantic_errors {
                return report;
            }
        }

        let ir = self.lower(&program);
        let optimized = self.optimize(&ir);
        let asm = self.generate(&optimized);

        report.ir = Stage::Completed(ir);
        report.optimization = Stage::Completed(optimized);
        report.codegen = Stage::Completed(asm);

        report
    }

    /// Folds constants and prunes literal branches, then renders the program back to source.
    pub fn simplify(&self, src: &str) -> Result<String, SyntaxError> {
        self.parse(src).map(|program| simplify(program).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::report::{Phase, SKIPPED};

    #[test]
    fn semantic_errors_stop_the_pipeline_by_default() {
        let report = Pipeline::new().analyze_phases("print(y)");

        assert!(matches!(report.error(), Some(QuillError::SemanticError(1))));
        assert_eq!(report.section(Phase::Ir), SKIPPED);
    }

    #[test]
    fn keep_going_lowers_despite_diagnostics() {
        let report = Pipeline::new()
            .stop_on_semantic_errors(false)
            .analyze_phases("print(y)");

        assert!(report.error().is_some());
        assert!(report.ir.completed().is_some());
        assert!(report.codegen.completed().is_some());
    }

    #[test]
    fn disabled_optimizations_leave_code_alone() {
        let src = "x = 2 + 3\nprint(x)";
        let ir = Pipeline::new().lower(&Pipeline::new().parse(src).unwrap());
        let optimized = Pipeline::new()
            .optimizations(OptimizerConfig::none())
            .optimize(&ir);

        assert!(optimized.notes.is_empty());
        assert_eq!(optimized.instructions(), ir.instructions);
    }

    #[test]
    fn recursion_is_bounded() {
        let execution = Pipeline::new()
            .max_call_depth(10)
            .run("def f(n):\n    return f(n + 1)\nf(0)");

        assert!(execution.error().is_some());
        assert!(execution.error().unwrap().to_string().contains("call depth"));
    }
}
