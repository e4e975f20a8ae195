//! Source-level simplification: folds constant arithmetic and prunes branches whose
//! condition is a boolean literal.
//!
//! Anything that would fail at runtime, like division by zero, is left as written.

use crate::interp::value::{self, Value};

use super::{Block, Expr, FunctionDef, Program, Stmt, StmtKind, UnaryOp};

pub fn simplify(program: Program) -> Program {
    Program::new(program.body.into_iter().flat_map(simplify_stmt).collect())
}

/// A block never becomes empty. If every statement would be pruned, the first one stays
/// as written.
fn simplify_block(block: Block) -> Block {
    let first = block.first().cloned();
    let simplified: Block = block.into_iter().flat_map(simplify_stmt).collect();

    match first {
        Some(first) if simplified.is_empty() => vec![first],
        _ => simplified,
    }
}

fn simplify_stmt(stmt: Stmt) -> Vec<Stmt> {
    let Stmt { kind, span } = stmt;

    let kind = match kind {
        StmtKind::If(cond, then, otherwise) => match simplify_expr(cond) {
            Expr::Bool(true) => return simplify_block(then),
            Expr::Bool(false) => return otherwise.map(simplify_block).unwrap_or_default(),
            cond => StmtKind::If(cond, simplify_block(then), otherwise.map(simplify_block)),
        },
        StmtKind::Expr(expr) => StmtKind::Expr(simplify_expr(expr)),
        StmtKind::Print(expr) => StmtKind::Print(simplify_expr(expr)),
        StmtKind::Assign(name, value) => StmtKind::Assign(name, simplify_expr(value)),
        StmtKind::IndexAssign(name, index, value) => {
            StmtKind::IndexAssign(name, simplify_expr(index), simplify_expr(value))
        }
        StmtKind::While(cond, body) => StmtKind::While(simplify_expr(cond), simplify_block(body)),
        StmtKind::For(var, iterable, body) => {
            StmtKind::For(var, simplify_expr(iterable), simplify_block(body))
        }
        StmtKind::FunctionDef(FunctionDef { name, params, body }) => {
            StmtKind::FunctionDef(FunctionDef {
                name,
                params,
                body: simplify_block(body),
            })
        }
        StmtKind::Return(value) => StmtKind::Return(value.map(simplify_expr)),
        StmtKind::TryExcept(body, handler) => {
            StmtKind::TryExcept(simplify_block(body), simplify_block(handler))
        }
        kind @ (StmtKind::Break | StmtKind::Continue) => kind,
    };

    vec![Stmt::new(kind, span)]
}

fn number(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Int(value) => Some(Value::Int(*value)),
        Expr::Float(value) => Some(Value::Float(*value)),
        _ => None,
    }
}

/// The literal a folded value becomes, if it renders to text that parses back.
fn constant(value: Value) -> Option<Expr> {
    match value {
        // `9223372036854775808` does not fit the literal, so its negation stays unfolded
        Value::Int(i64::MIN) => None,
        Value::Int(value) => Some(Expr::Int(value)),
        Value::Float(value) if value.is_finite() => Some(Expr::Float(value)),
        _ => None,
    }
}

fn simplify_expr(expr: Expr) -> Expr {
    let many = |exprs: Vec<Expr>| exprs.into_iter().map(simplify_expr).collect::<Vec<_>>();
    let boxed = |expr: Box<Expr>| simplify_expr(*expr).boxed();

    match expr {
        Expr::Binary(op, lhs, rhs) => {
            let (lhs, rhs) = (simplify_expr(*lhs), simplify_expr(*rhs));

            let folded = match (number(&lhs), number(&rhs)) {
                (Some(left), Some(right)) if op.is_arithmetic() => {
                    value::binary(op, left, right).ok().and_then(constant)
                }
                _ => None,
            };

            folded.unwrap_or_else(|| Expr::Binary(op, lhs.boxed(), rhs.boxed()))
        }
        Expr::Unary(UnaryOp::Neg, operand) => {
            let operand = simplify_expr(*operand);

            number(&operand)
                .and_then(|value| value::unary(UnaryOp::Neg, value).ok())
                .and_then(constant)
                .unwrap_or_else(|| Expr::Unary(UnaryOp::Neg, operand.boxed()))
        }
        Expr::Unary(op, operand) => Expr::Unary(op, boxed(operand)),
        Expr::List(items) => Expr::List(many(items)),
        Expr::Index(target, index) => Expr::Index(boxed(target), boxed(index)),
        Expr::Call(name, args) => Expr::Call(name, many(args)),
        Expr::Method(receiver, method, args) => Expr::Method(boxed(receiver), method, many(args)),
        Expr::Len(target) => Expr::Len(boxed(target)),
        Expr::Range(start, stop, step) => {
            Expr::Range(start.map(boxed), stop.map(boxed), step.map(boxed))
        }
        leaf @ (Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Bool(_)
        | Expr::Ident(_)) => leaf,
    }
}
