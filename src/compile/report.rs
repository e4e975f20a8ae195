//! Per-phase reports of one pipeline run.
//!
//! Every section renders on its own. A phase that never ran because an earlier one failed
//! says so instead of showing partial output.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use crate::infra::QuillError;

use super::{
    asm::Asm,
    ast::tree::TreeNode,
    ir::{
        Ir,
        optimize::{Optimized, Pass},
    },
    parser::{
        LineIndex,
        lex::{LexError, Lexed, TokenCategory},
    },
    semantic::SemanticReport,
};

pub const SKIPPED: &str = "skipped due to upstream error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Lexical,
    Syntax,
    Semantic,
    Ir,
    Optimization,
    Codegen,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Lexical,
        Phase::Syntax,
        Phase::Semantic,
        Phase::Ir,
        Phase::Optimization,
        Phase::Codegen,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::Lexical => "Lexical Analysis",
            Self::Syntax => "Syntax & AST Analysis",
            Self::Semantic => "Semantic Analysis",
            Self::Ir => "Intermediate Code Generation",
            Self::Optimization => "Code Optimization",
            Self::Codegen => "Code Generation",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// The state a phase ended in.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage<T> {
    Completed(T),
    /// The phase ran and failed; holds the rendered diagnostic.
    Failed(String),
    Skipped,
}

impl<T> Stage<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    fn render(&self, section: impl FnOnce(&T) -> String) -> String {
        match self {
            Self::Completed(value) => section(value),
            Self::Failed(message) => message.clone(),
            Self::Skipped => SKIPPED.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenRow {
    pub kind: &'static str,
    pub value: String,
    pub category: TokenCategory,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalReport {
    pub tokens: Vec<TokenRow>,
    pub errors: Vec<LexError>,
}

impl LexicalReport {
    pub fn new(src: &str, lexed: &Lexed<'_>) -> Self {
        let index = LineIndex::new(src);

        let tokens = lexed
            .tokens
            .iter()
            .map(|(token, span)| {
                let (line, column) = index.position(span.start);

                TokenRow {
                    kind: token.kind(),
                    value: token.lexeme(),
                    category: token.category(),
                    line,
                    column,
                    offset: span.start,
                }
            })
            .collect();

        Self {
            tokens,
            errors: lexed.errors.clone(),
        }
    }

    pub fn count(&self, category: TokenCategory) -> usize {
        self.tokens
            .iter()
            .filter(|token| token.category == category)
            .count()
    }
}

impl Display for LexicalReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.tokens.is_empty() && self.errors.is_empty() {
            return writeln!(f, "No tokens found in the input code.");
        }

        writeln!(
            f,
            "{:<14}{:<24}{:<8}{:<8}Offset",
            "Token Type", "Token Value", "Line", "Column"
        )?;
        writeln!(f, "{}", "-".repeat(60))?;
        for token in &self.tokens {
            writeln!(
                f,
                "{:<14}{:<24}{:<8}{:<8}{}",
                token.kind, token.value, token.line, token.column, token.offset
            )?;
        }

        let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
        for token in &self.tokens {
            *kinds.entry(token.kind).or_default() += 1;
        }

        writeln!(f)?;
        writeln!(f, "Token Summary:")?;
        for (kind, count) in kinds {
            writeln!(f, "- {kind}: {count} tokens")?;
        }

        writeln!(f)?;
        writeln!(f, "Token Categories:")?;
        for category in [
            TokenCategory::Keyword,
            TokenCategory::Operator,
            TokenCategory::Delimiter,
            TokenCategory::Literal,
            TokenCategory::Identifier,
        ] {
            writeln!(f, "- {category}: {}", self.count(category))?;
        }

        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "Lexical Errors:")?;
            for error in &self.errors {
                writeln!(f, "- {error}")?;
            }
        }

        Ok(())
    }
}

/// One report per phase, in pipeline order.
#[derive(Debug)]
pub struct PhaseReport {
    pub lexical: LexicalReport,
    pub syntax: Stage<TreeNode>,
    pub semantic: Stage<SemanticReport>,
    pub ir: Stage<Ir>,
    pub optimization: Stage<Optimized>,
    pub codegen: Stage<Asm>,
    /// The first failure, if any phase failed.
    pub error: Option<QuillError>,
}

impl PhaseReport {
    /// A report where nothing past lexing has run yet.
    pub fn new(lexical: LexicalReport) -> Self {
        Self {
            lexical,
            syntax: Stage::Skipped,
            semantic: Stage::Skipped,
            ir: Stage::Skipped,
            optimization: Stage::Skipped,
            codegen: Stage::Skipped,
            error: None,
        }
    }

    pub fn error(&self) -> Option<&QuillError> {
        self.error.as_ref()
    }

    pub fn is_skipped(&self, phase: Phase) -> bool {
        match phase {
            Phase::Lexical => false,
            Phase::Syntax => self.syntax.is_skipped(),
            Phase::Semantic => self.semantic.is_skipped(),
            Phase::Ir => self.ir.is_skipped(),
            Phase::Optimization => self.optimization.is_skipped(),
            Phase::Codegen => self.codegen.is_skipped(),
        }
    }

    /// One line describing what a finished phase produced.
    pub fn summary(&self, phase: Phase) -> Option<String> {
        match phase {
            Phase::Lexical => Some(format!(
                "{} tokens, {} lexical errors",
                self.lexical.tokens.len(),
                self.lexical.errors.len()
            )),
            Phase::Syntax => self
                .syntax
                .completed()
                .map(|tree| format!("{} top-level statements", tree.children.len())),
            Phase::Semantic => self
                .semantic
                .completed()
                .map(|report| format!("{} diagnostics", report.diagnostics.len())),
            Phase::Ir => self
                .ir
                .completed()
                .map(|ir| format!("{} instructions", ir.len())),
            Phase::Optimization => self.optimization.completed().map(|optimized| {
                format!(
                    "{} optimizations, {} lines removed",
                    optimized.notes.len(),
                    optimized.removed()
                )
            }),
            Phase::Codegen => self
                .codegen
                .completed()
                .map(|asm| format!("{} instructions, {} registers", asm.len(), asm.registers)),
        }
    }

    pub fn section(&self, phase: Phase) -> String {
        match phase {
            Phase::Lexical => self.lexical.to_string(),
            Phase::Syntax => self.syntax.render(TreeNode::to_string),
            Phase::Semantic => self.semantic.render(SemanticReport::to_string),
            Phase::Ir => self.ir.render(|ir| IrSection(ir).to_string()),
            Phase::Optimization => self
                .optimization
                .render(|optimized| OptimizationSection(optimized).to_string()),
            Phase::Codegen => self.codegen.render(|asm| CodegenSection(asm).to_string()),
        }
    }

    pub fn sections(&self) -> Vec<(Phase, String)> {
        Phase::ALL
            .into_iter()
            .map(|phase| (phase, self.section(phase)))
            .collect()
    }
}

impl Display for PhaseReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (phase, section) in self.sections() {
            writeln!(f, "== {phase} ==")?;
            writeln!(f, "{}", section.trim_end())?;
            writeln!(f)?;
        }

        Ok(())
    }
}

fn heading(f: &mut Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{title}")?;
    writeln!(f, "{}", "-".repeat(title.chars().count()))
}

struct IrSection<'a>(&'a Ir);

impl Display for IrSection<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let ir = self.0;
        if ir.is_empty() {
            return writeln!(f, "No intermediate code generated.");
        }

        heading(f, "Three-Address Code:")?;
        write!(f, "{ir}")?;
        writeln!(f)?;
        heading(f, "Legend:")?;
        writeln!(f, "tN    : Temporary variable")?;
        writeln!(f, "LN    : Label")?;
        writeln!(f, "goto  : Jump instruction")?;
        writeln!(f, "call  : Function call")?;
        writeln!(f, "param : Function parameter")
    }
}

struct OptimizationSection<'a>(&'a Optimized);

impl Display for OptimizationSection<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let optimized = self.0;

        heading(f, "Applied Optimizations:")?;
        if optimized.notes.is_empty() {
            writeln!(f, "No optimizations applied.")?;
        }
        for note in &optimized.notes {
            writeln!(f, "✓ {note}")?;
        }

        writeln!(f)?;
        heading(f, "Optimized Code:")?;
        write!(f, "{optimized}")?;

        writeln!(f)?;
        heading(f, "Optimization Summary:")?;
        writeln!(f, "• Total optimizations applied: {}", optimized.notes.len())?;
        writeln!(f, "• Instructions removed: {}", optimized.removed())?;
        for pass in Pass::ALL {
            writeln!(f, "  - {pass}: {}", optimized.notes_for(pass).count())?;
        }

        Ok(())
    }
}

struct CodegenSection<'a>(&'a Asm);

impl Display for CodegenSection<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let asm = self.0;
        if asm.is_empty() {
            return writeln!(f, "No code generated.");
        }

        heading(f, "Generated Code:")?;
        write!(f, "{asm}")?;

        writeln!(f)?;
        heading(f, "Register Usage:")?;
        writeln!(f, "• Total registers used: {}", asm.registers)?;
        writeln!(f, "• Register naming: R1, R2, R3, ... (R0 holds return values)")?;

        writeln!(f)?;
        heading(f, "Label Usage:")?;
        writeln!(f, "• Total labels used: {}", asm.labels)?;
        writeln!(f, "• Label naming: L1, L2, L3, ...")?;

        writeln!(f)?;
        heading(f, "Instruction Types:")?;
        writeln!(f, "• MOV: Move immediate value to register")?;
        writeln!(f, "• LDR: Load from memory to register")?;
        writeln!(f, "• STR: Store from register to memory")?;
        writeln!(f, "• ADD/SUB/MUL/DIV/MOD: Arithmetic operations")?;
        writeln!(f, "• AND/ORR/NOT/NEG: Logical and unary operations")?;
        writeln!(f, "• CMP/SETcc: Compare operands and keep the result")?;
        writeln!(f, "• B/BNE: Branch instructions")?;
        writeln!(f, "• PUSH/POP: Stack operations")?;
        writeln!(f, "• CALL/RET: Function calls")
    }
}
