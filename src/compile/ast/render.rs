//! Canonical source rendering.
//!
//! Binary operations are parenthesized unless they form the whole right-hand side of a
//! statement, strings are double quoted and every block is indented by four spaces, so the
//! output re-parses to an equal tree.

use std::fmt::{self, Display, Formatter};

use crate::{
    compile::ast::{Block, Expr, Program, Stmt, StmtKind, UnaryOp},
    infra::format_float,
};

const INDENT: &str = "    ";

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{}", format_float(*value)),
            Self::Str(value) => write!(f, "\"{}\"", escape(value)),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Ident(name) => write!(f, "{name}"),
            Self::List(items) => write!(f, "[{}]", Separated(items)),
            Self::Index(target, index) => write!(f, "{target}[{index}]"),
            Self::Unary(op, operand) => write!(f, "({op}{}{operand})", op_gap(op)),
            Self::Binary(op, lhs, rhs) => write!(f, "({lhs} {op} {rhs})"),
            Self::Call(name, args) => write!(f, "{name}({})", Separated(args)),
            Self::Method(receiver, method, args) => {
                write!(f, "{receiver}.{method}({})", Separated(args))
            }
            Self::Len(target) => write!(f, "len({target})"),
            Self::Range(start, stop, step) => {
                let bounds: Vec<&Expr> = [start, stop, step]
                    .into_iter()
                    .flatten()
                    .map(|bound| &**bound)
                    .collect();

                write!(f, "range({})", Separated(&bounds))
            }
        }
    }
}

fn op_gap(op: &UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "",
        UnaryOp::Not => " ",
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            c => escaped.push(c),
        }
    }

    escaped
}

struct Separated<'a, T>(&'a [T]);

impl<T: Display> Display for Separated<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }

        Ok(())
    }
}

/// An expression in statement position, where the outermost parentheses are redundant.
struct Top<'a>(&'a Expr);

impl Display for Top<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expr::Binary(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
            expr => write!(f, "{expr}"),
        }
    }
}

fn write_block(f: &mut Formatter<'_>, block: &Block, depth: usize) -> fmt::Result {
    for stmt in block {
        write_stmt(f, stmt, depth)?;
    }

    Ok(())
}

fn write_stmt(f: &mut Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
    let indent = INDENT.repeat(depth);

    match &stmt.kind {
        StmtKind::Expr(expr) => writeln!(f, "{indent}{}", Top(expr)),
        StmtKind::Print(expr) => writeln!(f, "{indent}print({})", Top(expr)),
        StmtKind::Assign(name, value) => writeln!(f, "{indent}{name} = {}", Top(value)),
        StmtKind::IndexAssign(name, index, value) => {
            writeln!(f, "{indent}{name}[{}] = {}", Top(index), Top(value))
        }
        StmtKind::If(cond, then, otherwise) => {
            writeln!(f, "{indent}if {}:", Top(cond))?;
            write_block(f, then, depth + 1)?;

            if let Some(otherwise) = otherwise {
                writeln!(f, "{indent}else:")?;
                write_block(f, otherwise, depth + 1)?;
            }

            Ok(())
        }
        StmtKind::While(cond, body) => {
            writeln!(f, "{indent}while {}:", Top(cond))?;
            write_block(f, body, depth + 1)
        }
        StmtKind::For(var, iterable, body) => {
            writeln!(f, "{indent}for {var} in {}:", Top(iterable))?;
            write_block(f, body, depth + 1)
        }
        StmtKind::FunctionDef(def) => {
            writeln!(f, "{indent}def {}({}):", def.name, def.params.join(", "))?;
            write_block(f, &def.body, depth + 1)
        }
        StmtKind::Return(Some(value)) => writeln!(f, "{indent}return {}", Top(value)),
        StmtKind::Return(None) => writeln!(f, "{indent}return"),
        StmtKind::Break => writeln!(f, "{indent}break"),
        StmtKind::Continue => writeln!(f, "{indent}continue"),
        StmtKind::TryExcept(body, handler) => {
            writeln!(f, "{indent}try:")?;
            write_block(f, body, depth + 1)?;
            writeln!(f, "{indent}except:")?;
            write_block(f, handler, depth + 1)
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_block(f, &self.body, 0)
    }
}
