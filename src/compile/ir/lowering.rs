use crate::compile::ast::{BinaryOp, Block, Expr, FunctionDef, Program, Stmt, StmtKind};

use super::{Instr, Ir, Label, Operand, Place, Rvalue, Temp};

pub fn lower(program: &Program) -> Ir {
    let mut lowering = Lowering::new();
    lowering.block(&program.body);

    Ir {
        instructions: lowering.code,
        temps: lowering.temps,
        labels: lowering.labels,
    }
}

struct Lowering {
    code: Vec<Instr>,
    temps: usize,
    labels: usize,
    loops: Vec<(Label, Label)>, // (continue target, exit)
}

impl Lowering {
    fn new() -> Self {
        Self {
            code: Vec::new(),
            temps: 0,
            labels: 0,
            loops: Vec::new(),
        }
    }

    fn fresh_temp(&mut self) -> Temp {
        self.temps += 1;
        self.temps
    }

    fn fresh_label(&mut self) -> Label {
        self.labels += 1;
        self.labels
    }

    fn emit(&mut self, instr: Instr) {
        self.code.push(instr);
    }

    /// Emits `tN = rvalue` into a fresh temporary.
    fn assign_temp(&mut self, rvalue: Rvalue) -> Operand {
        let temp = self.fresh_temp();
        self.emit(Instr::Assign(Place::Temp(temp), rvalue));

        Operand::Temp(temp)
    }

    fn block(&mut self, block: &Block) {
        for stmt in block {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expr(expr);
            }
            StmtKind::Print(expr) => {
                let value = self.expr(expr);
                self.emit(Instr::Print(value));
            }
            StmtKind::Assign(name, expr) => {
                let value = self.expr(expr);
                self.emit(Instr::Assign(Place::Var(name.clone()), Rvalue::Use(value)));
            }
            StmtKind::IndexAssign(name, index, expr) => {
                let index = self.expr(index);
                let value = self.expr(expr);
                self.emit(Instr::IndexStore(Operand::Var(name.clone()), index, value));
            }
            StmtKind::If(cond, then, otherwise) => {
                let cond = self.expr(cond);
                let else_label = self.fresh_label();
                let end_label = self.fresh_label();

                self.emit(Instr::IfFalse(cond, else_label));
                self.block(then);
                self.emit(Instr::Goto(end_label));
                self.emit(Instr::Label(else_label));
                if let Some(otherwise) = otherwise {
                    self.block(otherwise);
                }
                self.emit(Instr::Label(end_label));
            }
            StmtKind::While(cond, body) => {
                let start = self.fresh_label();
                let end = self.fresh_label();

                self.emit(Instr::Label(start));
                let cond = self.expr(cond);
                self.emit(Instr::IfFalse(cond, end));

                self.loops.push((start, end));
                self.block(body);
                self.loops.pop();

                self.emit(Instr::Goto(start));
                self.emit(Instr::Label(end));
            }
            StmtKind::For(var, iterable, body) => self.for_loop(var, iterable, body),
            StmtKind::FunctionDef(def) => self.function(def),
            StmtKind::Return(expr) => {
                let value = expr.as_ref().map(|expr| self.expr(expr));
                self.emit(Instr::Return(value));
            }
            StmtKind::Break => {
                let exit = self.loops.last().map(|&(_, exit)| exit);
                self.emit(Instr::Break(exit));
            }
            StmtKind::Continue => {
                let next = self.loops.last().map(|&(next, _)| next);
                self.emit(Instr::Continue(next));
            }
            StmtKind::TryExcept(body, handler) => {
                let try_label = self.fresh_label();
                let except_label = self.fresh_label();
                let end_label = self.fresh_label();

                self.emit(Instr::Label(try_label));
                self.block(body);
                self.emit(Instr::Goto(end_label));
                self.emit(Instr::Label(except_label));
                self.block(handler);
                self.emit(Instr::Label(end_label));
            }
        }
    }

    // for x in xs: body
    //
    //     t_seq = xs
    //     t_len = len(t_seq)
    //     t_i = 0
    // start:
    //     t_c = t_i < t_len
    //     if t_c == False goto end
    //     x = t_seq[t_i]
    //     body
    // step:
    //     t_i = t_i + 1
    //     goto start
    // end:
    fn for_loop(&mut self, var: &str, iterable: &Expr, body: &Block) {
        let sequence = self.expr(iterable);
        let len = self.assign_temp(Rvalue::Len(sequence.clone()));
        let counter = self.fresh_temp();
        self.emit(Instr::Assign(
            Place::Temp(counter),
            Rvalue::Use(Operand::Int(0)),
        ));

        let start = self.fresh_label();
        let step = self.fresh_label();
        let end = self.fresh_label();

        self.emit(Instr::Label(start));
        let cond = self.assign_temp(Rvalue::Binary(BinaryOp::Less, Operand::Temp(counter), len));
        self.emit(Instr::IfFalse(cond, end));
        self.emit(Instr::Assign(
            Place::Var(var.to_string()),
            Rvalue::Index(sequence, Operand::Temp(counter)),
        ));

        self.loops.push((step, end));
        self.block(body);
        self.loops.pop();

        self.emit(Instr::Label(step));
        self.emit(Instr::Assign(
            Place::Temp(counter),
            Rvalue::Binary(BinaryOp::Add, Operand::Temp(counter), Operand::Int(1)),
        ));
        self.emit(Instr::Goto(start));
        self.emit(Instr::Label(end));
    }

    /// Function bodies sit inline in the listing, behind a jump that skips them.
    fn function(&mut self, def: &FunctionDef) {
        let skip = self.fresh_label();

        self.emit(Instr::Goto(skip));
        self.emit(Instr::Function(def.name.clone()));
        for param in &def.params {
            self.emit(Instr::Param(param.clone()));
        }

        let outer_loops = std::mem::take(&mut self.loops);
        self.block(&def.body);
        self.loops = outer_loops;

        if !matches!(self.code.last(), Some(Instr::Return(_))) {
            self.emit(Instr::Return(None));
        }

        self.emit(Instr::Label(skip));
    }

    fn expr(&mut self, expr: &Expr) -> Operand {
        match expr {
            Expr::Int(value) => self.assign_temp(Rvalue::Use(Operand::Int(*value))),
            Expr::Float(value) => self.assign_temp(Rvalue::Use(Operand::Float(*value))),
            Expr::Str(value) => self.assign_temp(Rvalue::Use(Operand::Str(value.clone()))),
            Expr::Bool(value) => self.assign_temp(Rvalue::Use(Operand::Bool(*value))),
            Expr::Ident(name) => self.assign_temp(Rvalue::Use(Operand::Var(name.clone()))),
            Expr::List(items) => {
                let list = self.assign_temp(Rvalue::NewList);
                for item in items {
                    let item = self.expr(item);
                    self.emit(Instr::Append(list.clone(), item));
                }

                list
            }
            Expr::Index(target, index) => {
                let target = self.expr(target);
                let index = self.expr(index);

                self.assign_temp(Rvalue::Index(target, index))
            }
            Expr::Unary(op, operand) => {
                let operand = self.expr(operand);

                self.assign_temp(Rvalue::Unary(*op, operand))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);

                self.assign_temp(Rvalue::Binary(*op, lhs, rhs))
            }
            Expr::Call(name, args) => {
                let args = args.iter().map(|arg| self.expr(arg)).collect();

                self.assign_temp(Rvalue::Call(name.clone(), args))
            }
            Expr::Method(receiver, method, args) => {
                let receiver = self.expr(receiver);
                let args = args.iter().map(|arg| self.expr(arg)).collect();

                self.assign_temp(Rvalue::Method(receiver, method.clone(), args))
            }
            Expr::Len(target) => {
                let target = self.expr(target);

                self.assign_temp(Rvalue::Len(target))
            }
            Expr::Range(start, stop, step) => {
                let start = self.bound(start.as_deref(), 0);
                let stop = self.bound(stop.as_deref(), 0);
                let step = self.bound(step.as_deref(), 1);

                self.assign_temp(Rvalue::Range(start, stop, step))
            }
        }
    }

    fn bound(&mut self, bound: Option<&Expr>, default: i64) -> Operand {
        match bound {
            Some(bound) => self.expr(bound),
            None => Operand::Int(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::parser::{lex::tokenize, parse};

    fn listing(src: &str) -> Vec<String> {
        let lexed = tokenize(src);
        let program = parse(src, &lexed.tokens).unwrap();

        lower(&program)
            .instructions
            .iter()
            .map(Instr::to_string)
            .collect()
    }

    #[test]
    fn expressions_use_one_temporary_per_step() {
        assert_eq!(
            listing("x = 1 + 2\nprint(x)"),
            vec![
                "t1 = 1",
                "t2 = 2",
                "t3 = t1 + t2",
                "x = t3",
                "t4 = x",
                "print t4",
            ]
        );
    }

    #[test]
    fn if_else_jumps_over_branches() {
        assert_eq!(
            listing("if True:\n    print(1)\nelse:\n    print(2)"),
            vec![
                "t1 = True",
                "if t1 == False goto L1",
                "t2 = 1",
                "print t2",
                "goto L2",
                "L1:",
                "t3 = 2",
                "print t3",
                "L2:",
            ]
        );
    }

    #[test]
    fn while_loops_jump_back_to_their_start() {
        assert_eq!(
            listing("while x < 5:\n    break"),
            vec![
                "L1:",
                "t1 = x",
                "t2 = 5",
                "t3 = t1 < t2",
                "if t3 == False goto L2",
                "break L2",
                "goto L1",
                "L2:",
            ]
        );
    }

    #[test]
    fn for_loops_walk_an_index() {
        let code = listing("for c in \"ab\":\n    continue");

        assert_eq!(
            code,
            vec![
                "t1 = 'ab'",
                "t2 = len(t1)",
                "t3 = 0",
                "L1:",
                "t4 = t3 < t2",
                "if t4 == False goto L3",
                "c = t1[t3]",
                "continue L2",
                "L2:",
                "t3 = t3 + 1",
                "goto L1",
                "L3:",
            ]
        );
    }

    #[test]
    fn functions_are_skipped_over() {
        assert_eq!(
            listing("def add(a, b):\n    return a + b\nprint(add(2, 3))"),
            vec![
                "goto L1",
                "function add:",
                "param a",
                "param b",
                "t1 = a",
                "t2 = b",
                "t3 = t1 + t2",
                "return t3",
                "L1:",
                "t4 = 2",
                "t5 = 3",
                "t6 = call add(t4, t5)",
                "print t6",
            ]
        );
    }

    #[test]
    fn lists_are_built_by_appending() {
        assert_eq!(
            listing("a = [1, 2]\na[0] = 5"),
            vec![
                "t1 = []",
                "t2 = 1",
                "t1.append(t2)",
                "t3 = 2",
                "t1.append(t3)",
                "a = t1",
                "t4 = 0",
                "t5 = 5",
                "a[t4] = t5",
            ]
        );
    }

    #[test]
    fn counters_restart_per_run() {
        assert_eq!(listing("x = 1")[0], "t1 = 1");
        assert_eq!(listing("y = 2")[0], "t1 = 2");
    }
}
