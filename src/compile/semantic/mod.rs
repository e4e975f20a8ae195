use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use thiserror::Error;

use crate::{
    compile::{
        ast::{BinaryOp, Block, Expr, FunctionDef, Program, SourcePos, Stmt, StmtKind, UnaryOp},
        parser::LineIndex,
    },
    datstructures::ordered_table::OrderedTable,
};

/// What the analyzer knows about the value of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    List,
    Range,
    None,
    Function,
    /// Parameters, list elements and call results: checks involving them are skipped.
    Unknown,
}

impl Type {
    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    fn matches(&self, other: &Type) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "str",
            Self::List => "list",
            Self::Range => "range",
            Self::None => "None",
            Self::Function => "function",
            Self::Unknown => "unknown",
        };

        write!(f, "{name}")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SemanticError {
    #[error("Undeclared variable: '{0}'")]
    UndeclaredVariable(String),

    #[error("Undeclared function: '{0}'")]
    UndeclaredFunction(String),

    #[error("'{0}' is a variable, not a function")]
    NotCallable(String),

    #[error("Function '{name}' expects {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Type mismatch in arithmetic operation '{op}': {left} and {right}")]
    ArithmeticMismatch { op: BinaryOp, left: Type, right: Type },

    #[error("Type mismatch in comparison '{op}': {left} and {right}")]
    ComparisonMismatch { op: BinaryOp, left: Type, right: Type },

    #[error("Type mismatch in logical operation '{op}': {left} and {right}")]
    LogicalMismatch { op: BinaryOp, left: Type, right: Type },

    #[error("{construct} condition must be a boolean, got {found}")]
    NonBooleanCondition { construct: &'static str, found: Type },

    #[error("For loop iterable must be a list, string or range, got {0}")]
    NotIterable(Type),

    #[error("Indexing requires a list or string, got {0}")]
    NotIndexable(Type),

    #[error("List index must be an integer, got {0}")]
    IndexNotInteger(Type),

    #[error("Index assignment requires '{name}' to be a list, got {found}")]
    IndexAssignNonList { name: String, found: Type },

    #[error("String method '{method}' called on non-string type: {found}")]
    MethodOnNonString { method: String, found: Type },

    #[error("Unknown string method '{0}'")]
    UnknownMethod(String),

    #[error("len() requires a list or string, got {0}")]
    LenUnsupported(Type),

    #[error("Range argument {position} must be an integer, got {found}")]
    RangeArgument { position: usize, found: Type },

    #[error("Unary minus requires a number, got {0}")]
    UnaryMinus(Type),

    #[error("Logical not requires a boolean, got {0}")]
    LogicalNot(Type),

    #[error("'{0}' outside loop")]
    OutsideLoop(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: SemanticError,
    pub line: usize,
    pub column: usize,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.error)
    }
}

/// Everything one analysis run found out about a program.
#[derive(Debug, Clone, Default)]
pub struct SemanticReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Inferred type per name, in the order names were first seen. Besides variables it
    /// records `print_expr`, `return_value`, parameters and functions.
    pub types: OrderedTable<String, String>,
    /// The top-level symbol table as it stands after the last statement.
    pub symbols: OrderedTable<String, Type>,
}

impl SemanticReport {
    pub fn passed(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl Display for SemanticReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.passed() {
            writeln!(f, "No semantic errors found!")?;
        } else {
            writeln!(f, "Semantic Errors Found:")?;
            for diagnostic in &self.diagnostics {
                writeln!(f, "  {diagnostic}")?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Type Information:")?;
        writeln!(f, "----------------")?;
        for (name, ty) in self.types.iter() {
            writeln!(f, "  {name}: {ty}")?;
        }

        writeln!(f)?;
        writeln!(f, "Symbol Table:")?;
        writeln!(f, "-------------")?;
        for (name, ty) in self.symbols.iter() {
            writeln!(f, "  {name}: {ty}")?;
        }

        Ok(())
    }
}

/// Read-only pass that infers what it can and reports what looks wrong.
///
/// Nothing here stops the program from running; the interpreter performs its own checks.
pub struct SemanticAnalysis<'ast, 'src> {
    index: &'src LineIndex<'src>,
    functions: HashMap<&'ast str, usize>,
    symbols: OrderedTable<String, Type>,
    loop_depth: usize,
    span: SourcePos,
    report: SemanticReport,
}

impl<'ast, 'src> SemanticAnalysis<'ast, 'src> {
    fn new(index: &'src LineIndex<'src>) -> Self {
        Self {
            index,
            functions: HashMap::new(),
            symbols: OrderedTable::new(),
            loop_depth: 0,
            span: 0..0,
            report: SemanticReport::default(),
        }
    }

    pub fn analyze(program: &'ast Program, index: &'src LineIndex<'src>) -> SemanticReport {
        let mut analysis = Self::new(index);

        // calls may precede the definition in the file
        for def in program.functions() {
            analysis.functions.insert(def.name.as_str(), def.params.len());
        }

        analysis.block(&program.body);

        let mut report = analysis.report;
        report.symbols = analysis.symbols;
        report
    }

    fn error(&mut self, error: SemanticError) {
        let (line, column) = self.index.position(self.span.start);

        self.report.diagnostics.push(Diagnostic {
            error,
            line,
            column,
        });
    }

    fn record(&mut self, key: &str, ty: impl ToString) {
        self.report.types.insert(key.to_string(), ty.to_string());
    }

    fn block(&mut self, block: &'ast Block) {
        for stmt in block {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &'ast Stmt) {
        self.span = stmt.span.clone();

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expr(expr);
            }
            StmtKind::Print(expr) => {
                let ty = self.expr(expr);
                if ty.is_known() {
                    self.record("print_expr", ty);
                }
            }
            StmtKind::Assign(name, expr) => {
                let ty = self.expr(expr);
                self.record(name, ty);
                self.symbols.insert(name.clone(), ty);
            }
            StmtKind::IndexAssign(name, index, expr) => {
                match self.symbols.get(name.as_str()).copied() {
                    None => self.error(SemanticError::UndeclaredVariable(name.clone())),
                    Some(ty) if ty.is_known() && ty != Type::List => {
                        self.error(SemanticError::IndexAssignNonList {
                            name: name.clone(),
                            found: ty,
                        })
                    }
                    Some(_) => {}
                }

                let index = self.expr(index);
                if index.is_known() && index != Type::Int {
                    self.error(SemanticError::IndexNotInteger(index));
                }

                self.expr(expr);
            }
            StmtKind::If(cond, then, otherwise) => {
                self.condition("If", cond);
                self.block(then);
                if let Some(otherwise) = otherwise {
                    self.block(otherwise);
                }
            }
            StmtKind::While(cond, body) => {
                self.condition("While loop", cond);

                self.loop_depth += 1;
                self.block(body);
                self.loop_depth -= 1;
            }
            StmtKind::For(var, iterable, body) => {
                let element = match self.expr(iterable) {
                    Type::Range => Type::Int,
                    Type::Str => Type::Str,
                    Type::List | Type::Unknown => Type::Unknown,
                    other => {
                        self.error(SemanticError::NotIterable(other));
                        Type::Unknown
                    }
                };

                let shadowed = self.symbols.insert(var.clone(), element);
                self.record(var, element);

                self.loop_depth += 1;
                self.block(body);
                self.loop_depth -= 1;

                match shadowed {
                    Some(ty) => self.symbols.insert(var.clone(), ty),
                    None => self.symbols.remove(var.as_str()),
                };
            }
            StmtKind::FunctionDef(def) => self.function(def),
            StmtKind::Return(expr) => {
                if let Some(expr) = expr {
                    let ty = self.expr(expr);
                    if ty.is_known() {
                        self.record("return_value", ty);
                    }
                }
            }
            StmtKind::Break if self.loop_depth == 0 => {
                self.error(SemanticError::OutsideLoop("break"))
            }
            StmtKind::Continue if self.loop_depth == 0 => {
                self.error(SemanticError::OutsideLoop("continue"))
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::TryExcept(body, handler) => {
                self.block(body);
                self.block(handler);
            }
        }
    }

    fn condition(&mut self, construct: &'static str, cond: &'ast Expr) {
        let found = self.expr(cond);

        if found.is_known() && found != Type::Bool {
            self.error(SemanticError::NonBooleanCondition { construct, found });
        }
    }

    fn function(&mut self, def: &'ast FunctionDef) {
        self.functions.insert(def.name.as_str(), def.params.len());
        self.symbols.insert(def.name.clone(), Type::Function);
        self.record(&def.name, Type::Function);

        let mut frame = OrderedTable::new();
        for param in &def.params {
            frame.insert(param.clone(), Type::Unknown);
            self.record(param, "parameter");
        }

        let outer = std::mem::replace(&mut self.symbols, frame);
        let outer_loops = std::mem::replace(&mut self.loop_depth, 0);

        self.block(&def.body);

        self.loop_depth = outer_loops;
        self.symbols = outer;
    }

    fn expr(&mut self, expr: &'ast Expr) -> Type {
        match expr {
            Expr::Int(_) => Type::Int,
            Expr::Float(_) => Type::Float,
            Expr::Str(_) => Type::Str,
            Expr::Bool(_) => Type::Bool,
            Expr::Ident(name) => match self.symbols.get(name.as_str()) {
                Some(ty) => *ty,
                None => {
                    self.error(SemanticError::UndeclaredVariable(name.clone()));
                    Type::Unknown
                }
            },
            Expr::List(items) => {
                for item in items {
                    self.expr(item);
                }

                Type::List
            }
            Expr::Index(target, index) => {
                let target = self.expr(target);
                let index = self.expr(index);

                if index.is_known() && index != Type::Int {
                    self.error(SemanticError::IndexNotInteger(index));
                }

                match target {
                    Type::Str => Type::Str,
                    Type::List | Type::Unknown => Type::Unknown,
                    other => {
                        self.error(SemanticError::NotIndexable(other));
                        Type::Unknown
                    }
                }
            }
            Expr::Unary(op, operand) => self.unary(*op, operand),
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs),
            Expr::Call(name, args) => {
                for arg in args {
                    self.expr(arg);
                }

                match self.functions.get(name.as_str()) {
                    Some(&expected) if expected != args.len() => {
                        self.error(SemanticError::ArityMismatch {
                            name: name.clone(),
                            expected,
                            found: args.len(),
                        })
                    }
                    Some(_) => {}
                    None if self.symbols.contains_key(name.as_str()) => {
                        self.error(SemanticError::NotCallable(name.clone()))
                    }
                    None => self.error(SemanticError::UndeclaredFunction(name.clone())),
                }

                Type::Unknown
            }
            Expr::Method(receiver, method, args) => {
                let receiver = self.expr(receiver);
                for arg in args {
                    self.expr(arg);
                }

                if receiver.is_known() && receiver != Type::Str {
                    self.error(SemanticError::MethodOnNonString {
                        method: method.clone(),
                        found: receiver,
                    });
                } else if !matches!(method.as_str(), "upper" | "lower" | "strip" | "replace") {
                    self.error(SemanticError::UnknownMethod(method.clone()));
                }

                Type::Str
            }
            Expr::Len(target) => {
                let target = self.expr(target);

                if target.is_known() && !matches!(target, Type::List | Type::Str) {
                    self.error(SemanticError::LenUnsupported(target));
                }

                Type::Int
            }
            Expr::Range(start, stop, step) => {
                for (position, bound) in [start, stop, step].into_iter().enumerate() {
                    let Some(bound) = bound else {
                        continue;
                    };

                    let found = self.expr(bound);
                    if found.is_known() && found != Type::Int {
                        self.error(SemanticError::RangeArgument {
                            position: position + 1,
                            found,
                        });
                    }
                }

                Type::Range
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &'ast Expr) -> Type {
        let ty = self.expr(operand);

        match op {
            UnaryOp::Neg if ty.is_known() && !ty.is_numeric() => {
                self.error(SemanticError::UnaryMinus(ty));
                Type::Unknown
            }
            UnaryOp::Neg => ty,
            UnaryOp::Not if ty.is_known() && ty != Type::Bool => {
                self.error(SemanticError::LogicalNot(ty));
                Type::Bool
            }
            UnaryOp::Not => Type::Bool,
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &'ast Expr, rhs: &'ast Expr) -> Type {
        let left = self.expr(lhs);
        let right = self.expr(rhs);
        let known = left.is_known() && right.is_known();

        if op.is_arithmetic() {
            return match (left, right) {
                (Type::Int, Type::Int) if op == BinaryOp::Div => Type::Float,
                (Type::Int, Type::Int) => Type::Int,
                (l, r) if l.is_numeric() && r.is_numeric() => Type::Float,
                (Type::Str, Type::Str) if op == BinaryOp::Add => Type::Str,
                (Type::List, Type::List) if op == BinaryOp::Add => Type::List,
                _ if known => {
                    self.error(SemanticError::ArithmeticMismatch { op, left, right });
                    Type::Unknown
                }
                _ => Type::Unknown,
            };
        }

        if op.is_comparison() && known && !left.matches(&right) {
            self.error(SemanticError::ComparisonMismatch { op, left, right });
        }

        if op.is_logical() && known && (left != Type::Bool || right != Type::Bool) {
            self.error(SemanticError::LogicalMismatch { op, left, right });
        }

        Type::Bool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::parser::{lex::tokenize, parse};

    fn analyze(src: &str) -> SemanticReport {
        let lexed = tokenize(src);
        let program = parse(src, &lexed.tokens).unwrap();
        let index = LineIndex::new(src);

        SemanticAnalysis::analyze(&program, &index)
    }

    fn errors(src: &str) -> Vec<SemanticError> {
        analyze(src)
            .diagnostics
            .into_iter()
            .map(|diagnostic| diagnostic.error)
            .collect()
    }

    #[test]
    fn clean_program_passes() {
        let report = analyze("x = 10\ny = x * 2.5\nprint(y)");

        assert!(report.passed());
        assert_eq!(report.types.get("x").map(String::as_str), Some("int"));
        assert_eq!(report.types.get("y").map(String::as_str), Some("float"));
        assert_eq!(report.types.get("print_expr").map(String::as_str), Some("float"));
        assert_eq!(report.symbols.get("y"), Some(&Type::Float));
    }

    #[test]
    fn undeclared_names_are_reported_with_position() {
        let report = analyze("x = 1\nprint(y)");

        assert_eq!(
            report.diagnostics,
            vec![Diagnostic {
                error: SemanticError::UndeclaredVariable("y".into()),
                line: 2,
                column: 1,
            }]
        );
    }

    #[test]
    fn arithmetic_on_strings_and_numbers_mismatches() {
        assert_eq!(
            errors("x = \"a\" - 1"),
            vec![SemanticError::ArithmeticMismatch {
                op: BinaryOp::Sub,
                left: Type::Str,
                right: Type::Int,
            }]
        );
        assert!(errors("x = \"a\" + \"b\"").is_empty());
    }

    #[test]
    fn conditions_must_be_boolean() {
        assert_eq!(
            errors("x = 1\nwhile x:\n    x = 0"),
            vec![SemanticError::NonBooleanCondition {
                construct: "While loop",
                found: Type::Int,
            }]
        );
    }

    #[test]
    fn functions_may_be_called_before_definition() {
        let report = analyze("print(f(1))\ndef f(a):\n    return a + 1");

        assert!(report.passed(), "{report}");
        assert_eq!(report.types.get("a").map(String::as_str), Some("parameter"));
        assert_eq!(report.symbols.get("f"), Some(&Type::Function));
    }

    #[test]
    fn function_bodies_do_not_see_globals() {
        assert_eq!(
            errors("x = 1\ndef f():\n    return x"),
            vec![SemanticError::UndeclaredVariable("x".into())]
        );
    }

    #[test]
    fn calls_are_checked() {
        assert_eq!(
            errors("g(1)"),
            vec![SemanticError::UndeclaredFunction("g".into())]
        );
        assert!(matches!(
            errors("def f(a):\n    return a\nf(1, 2)").as_slice(),
            [SemanticError::ArityMismatch { expected: 1, found: 2, .. }]
        ));
    }

    #[test]
    fn loop_variable_is_scoped_to_the_loop() {
        let report = analyze("for i in range(3):\n    print(i)\nprint(i)");

        assert_eq!(
            report
                .diagnostics
                .iter()
                .map(|d| (&d.error, d.line))
                .collect::<Vec<_>>(),
            vec![(&SemanticError::UndeclaredVariable("i".into()), 3)]
        );
    }

    #[test]
    fn break_outside_loop_is_reported() {
        assert_eq!(errors("break"), vec![SemanticError::OutsideLoop("break")]);
        assert!(errors("while True:\n    break").is_empty());
    }

    #[test]
    fn builtins_are_checked() {
        assert_eq!(errors("n = len(5)"), vec![SemanticError::LenUnsupported(Type::Int)]);
        assert_eq!(
            errors("x = 5\ny = x.upper()"),
            vec![SemanticError::MethodOnNonString {
                method: "upper".into(),
                found: Type::Int,
            }]
        );
        assert_eq!(
            errors("r = range(1, \"a\")"),
            vec![SemanticError::RangeArgument {
                position: 2,
                found: Type::Str,
            }]
        );
    }

    #[test]
    fn report_lists_sections() {
        let text = analyze("x = True\nprint(not 1)").to_string();

        assert!(text.starts_with("Semantic Errors Found:"));
        assert!(text.contains("Logical not requires a boolean, got int"));
        assert!(text.contains("Type Information:"));
        assert!(text.contains("  x: bool"));
        assert!(text.contains("Symbol Table:"));
    }
}
