use std::collections::HashMap;

use crate::compile::ast::{Block, Expr, FunctionDef, Program, SourcePos, Stmt, StmtKind};
use crate::compile::parser::LineIndex;
use crate::compile::parser::lex::LexError;
use crate::infra::QuillError;

pub mod error;
pub mod value;

use error::{RuntimeError, ScriptError};
use value::{RangeValue, Value};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// How a statement finished.
#[derive(Debug, Clone)]
enum Signal {
    Normal(Value),
    Break,
    Continue,
    Return(Value),
}

/// A runtime error on its way up to the nearest statement that can place it.
#[derive(Debug, Clone)]
pub struct Fault {
    error: RuntimeError,
    span: Option<SourcePos>,
}

impl Fault {
    fn or_at(mut self, span: &SourcePos) -> Self {
        if self.span.is_none() {
            self.span = Some(span.clone());
        }
        self
    }

    fn locate(self, index: &LineIndex) -> ScriptError {
        ScriptError::new(self.error, self.span.unwrap_or(0..0), index)
    }
}

impl From<RuntimeError> for Fault {
    fn from(error: RuntimeError) -> Self {
        Self { error, span: None }
    }
}

/// The outcome of running a program.
#[derive(Debug)]
pub struct Execution {
    /// Everything the program printed, one line per `print`.
    pub output: String,
    /// The value of the last top-level statement, or the failure that stopped the program.
    pub result: Result<Value, QuillError>,
    /// Characters the lexer skipped.
    pub lex_errors: Vec<LexError>,
    /// Errors raised inside `try` blocks and handled by `except`.
    pub caught: Vec<ScriptError>,
}

impl Execution {
    pub fn error(&self) -> Option<&QuillError> {
        self.result.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Problems the run recovered from: lexer diagnostics, then handled errors.
    pub fn diagnostics(&self) -> Vec<String> {
        self.lex_errors
            .iter()
            .map(ToString::to_string)
            .chain(self.caught.iter().map(ToString::to_string))
            .collect()
    }
}

/// Tree-walking evaluator.
///
/// Function bodies see only their parameters and the function registry. Entering a function
/// swaps in a fresh frame and a zero loop depth; both are restored when the call finishes,
/// whether or not it failed.
pub struct Interpreter<'ast> {
    env: HashMap<String, Value>,
    functions: HashMap<&'ast str, &'ast FunctionDef>,
    loop_depth: usize,
    call_depth: usize,
    max_call_depth: usize,
    output: String,
    caught: Vec<Fault>,
}

impl Default for Interpreter<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALL_DEPTH)
    }
}

impl<'ast> Interpreter<'ast> {
    pub fn new(max_call_depth: usize) -> Self {
        Self {
            env: HashMap::new(),
            functions: HashMap::new(),
            loop_depth: 0,
            call_depth: 0,
            max_call_depth,
            output: String::new(),
            caught: Vec::new(),
        }
    }

    /// Runs a program to completion. Output printed before a failure is kept.
    pub fn execute(
        mut self,
        program: &'ast Program,
        index: &LineIndex,
    ) -> (String, Result<Value, ScriptError>, Vec<ScriptError>) {
        let result = self.program(program).map_err(|fault| fault.locate(index));
        let caught = self
            .caught
            .into_iter()
            .map(|fault| fault.locate(index))
            .collect();

        (self.output, result, caught)
    }

    fn program(&mut self, program: &'ast Program) -> Result<Value, Fault> {
        let mut last = Value::None;

        for stmt in &program.body {
            match self.exec_stmt(stmt)? {
                Signal::Normal(value) => last = value,
                Signal::Return(value) => return Ok(value),
                Signal::Break | Signal::Continue => {}
            }
        }

        Ok(last)
    }

    fn exec_block(&mut self, block: &'ast Block) -> Result<Signal, Fault> {
        let mut last = Value::None;

        for stmt in block {
            match self.exec_stmt(stmt)? {
                Signal::Normal(value) => last = value,
                signal => return Ok(signal),
            }
        }

        Ok(Signal::Normal(last))
    }

    fn exec_stmt(&mut self, stmt: &'ast Stmt) -> Result<Signal, Fault> {
        self.exec_kind(&stmt.kind)
            .map_err(|fault| fault.or_at(&stmt.span))
    }

    fn exec_kind(&mut self, kind: &'ast StmtKind) -> Result<Signal, Fault> {
        match kind {
            StmtKind::Expr(expr) => Ok(Signal::Normal(self.eval(expr)?)),
            StmtKind::Print(expr) => {
                let value = self.eval(expr)?;
                self.output.push_str(&value.to_string());
                self.output.push('\n');

                Ok(Signal::Normal(Value::None))
            }
            StmtKind::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.env.insert(name.clone(), value.clone());

                Ok(Signal::Normal(value))
            }
            StmtKind::IndexAssign(name, index, expr) => {
                let value = self.eval(expr)?;
                let index = self.eval(index)?;

                let list = match self.env.get(name) {
                    Some(Value::List(list)) => list.clone(),
                    Some(other) => {
                        return Err(RuntimeError::NotAList {
                            name: name.clone(),
                            type_name: other.type_name(),
                        }
                        .into());
                    }
                    None => {
                        return Err(RuntimeError::UndefinedVariable { name: name.clone() }.into());
                    }
                };

                value::store(&list, &index, value.clone())?;

                Ok(Signal::Normal(value))
            }
            StmtKind::If(cond, then, otherwise) => {
                if self.eval(cond)?.is_truthy() {
                    self.exec_block(then)
                } else if let Some(otherwise) = otherwise {
                    self.exec_block(otherwise)
                } else {
                    Ok(Signal::Normal(Value::None))
                }
            }
            StmtKind::While(cond, body) => {
                self.loop_depth += 1;
                let result = self.exec_while(cond, body);
                self.loop_depth -= 1;

                result
            }
            StmtKind::For(var, iterable, body) => {
                let items: Box<dyn Iterator<Item = Value>> = match self.eval(iterable)? {
                    Value::List(items) => {
                        let snapshot = items.borrow().clone();
                        Box::new(snapshot.into_iter())
                    }
                    Value::Range(range) => Box::new(range.values().map(Value::Int)),
                    Value::Str(text) => {
                        let chars: Vec<Value> =
                            text.chars().map(|c| Value::Str(c.to_string())).collect();
                        Box::new(chars.into_iter())
                    }
                    other => {
                        return Err(RuntimeError::NotIterable {
                            type_name: other.type_name(),
                        }
                        .into());
                    }
                };

                let shadowed = self.env.get(var).cloned();

                self.loop_depth += 1;
                let result = self.exec_for(var, items, body);
                self.loop_depth -= 1;

                match shadowed {
                    Some(value) => self.env.insert(var.clone(), value),
                    None => self.env.remove(var),
                };

                result
            }
            StmtKind::FunctionDef(def) => {
                self.functions.insert(def.name.as_str(), def);

                Ok(Signal::Normal(Value::None))
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };

                Ok(Signal::Return(value))
            }
            StmtKind::Break if self.loop_depth == 0 => Err(RuntimeError::BreakOutsideLoop.into()),
            StmtKind::Break => Ok(Signal::Break),
            StmtKind::Continue if self.loop_depth == 0 => {
                Err(RuntimeError::ContinueOutsideLoop.into())
            }
            StmtKind::Continue => Ok(Signal::Continue),
            StmtKind::TryExcept(body, handler) => match self.exec_block(body) {
                Ok(signal) => Ok(signal),
                Err(fault) => {
                    self.caught.push(fault);
                    self.exec_block(handler)
                }
            },
        }
    }

    fn exec_while(&mut self, cond: &'ast Expr, body: &'ast Block) -> Result<Signal, Fault> {
        let mut last = Value::None;

        while self.eval(cond)?.is_truthy() {
            match self.exec_block(body)? {
                Signal::Normal(value) => last = value,
                Signal::Continue => continue,
                Signal::Break => break,
                signal @ Signal::Return(_) => return Ok(signal),
            }
        }

        Ok(Signal::Normal(last))
    }

    fn exec_for(
        &mut self,
        var: &str,
        items: impl Iterator<Item = Value>,
        body: &'ast Block,
    ) -> Result<Signal, Fault> {
        let mut last = Value::None;

        for item in items {
            self.env.insert(var.to_string(), item);

            match self.exec_block(body)? {
                Signal::Normal(value) => last = value,
                Signal::Continue => continue,
                Signal::Break => break,
                signal @ Signal::Return(_) => return Ok(signal),
            }
        }

        Ok(Signal::Normal(last))
    }

    fn eval(&mut self, expr: &'ast Expr) -> Result<Value, Fault> {
        let value = match expr {
            Expr::Int(value) => Value::Int(*value),
            Expr::Float(value) => Value::Float(*value),
            Expr::Str(value) => Value::Str(value.clone()),
            Expr::Bool(value) => Value::Bool(*value),
            Expr::Ident(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })?,
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;

                Value::list(items)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;

                value::index(&target, &index)?
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;

                value::unary(*op, operand)?
            }
            // both operands are evaluated before the operator applies, `and`/`or` included
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;

                value::binary(*op, lhs, rhs)?
            }
            Expr::Call(name, args) => self.call(name, args)?,
            Expr::Method(receiver, method, args) => {
                let receiver = self.eval(receiver)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;

                value::call_method(&receiver, method, &args)?
            }
            Expr::Len(target) => {
                let target = self.eval(target)?;

                value::len(&target)?
            }
            Expr::Range(start, stop, step) => {
                let start = self.eval_bound(start.as_deref(), 0)?;
                let stop = self.eval_bound(stop.as_deref(), 0)?;
                let step = self.eval_bound(step.as_deref(), 1)?;

                Value::Range(RangeValue::new(start, stop, step)?)
            }
        };

        Ok(value)
    }

    fn eval_bound(&mut self, bound: Option<&'ast Expr>, default: i64) -> Result<i64, Fault> {
        let Some(bound) = bound else {
            return Ok(default);
        };

        match self.eval(bound)? {
            Value::Int(value) => Ok(value),
            other => Err(RuntimeError::RangeArgument {
                type_name: other.type_name(),
            }
            .into()),
        }
    }

    fn call(&mut self, name: &str, args: &'ast [Expr]) -> Result<Value, Fault> {
        let Some(&def) = self.functions.get(name) else {
            let error = if self.env.contains_key(name) {
                RuntimeError::NotCallable {
                    name: name.to_string(),
                }
            } else {
                RuntimeError::UndefinedFunction {
                    name: name.to_string(),
                }
            };

            return Err(error.into());
        };

        if def.params.len() != args.len() {
            return Err(RuntimeError::FunctionArityMismatch {
                name: name.to_string(),
                expected: def.params.len(),
                found: args.len(),
            }
            .into());
        }

        if self.call_depth >= self.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.max_call_depth,
            }
            .into());
        }

        let mut frame = HashMap::with_capacity(args.len());
        for (param, arg) in def.params.iter().zip(args) {
            frame.insert(param.clone(), self.eval(arg)?);
        }

        let caller_env = std::mem::replace(&mut self.env, frame);
        let caller_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.call_depth += 1;

        let result = self.exec_block(&def.body);

        self.call_depth -= 1;
        self.loop_depth = caller_loops;
        self.env = caller_env;

        match result? {
            Signal::Normal(value) | Signal::Return(value) => Ok(value),
            Signal::Break | Signal::Continue => Ok(Value::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::parser::{lex::tokenize, parse};
    use error::ErrorKind;

    fn run_with_depth(
        src: &str,
        depth: usize,
    ) -> (String, Result<Value, ScriptError>, Vec<ScriptError>) {
        let lexed = tokenize(src);
        let program = parse(src, &lexed.tokens).unwrap();
        let index = LineIndex::new(src);

        Interpreter::new(depth).execute(&program, &index)
    }

    fn run(src: &str) -> (String, Result<Value, ScriptError>, Vec<ScriptError>) {
        run_with_depth(src, DEFAULT_MAX_CALL_DEPTH)
    }

    fn output(src: &str) -> String {
        let (output, result, _) = run(src);
        assert!(result.is_ok(), "program failed: {result:?}");
        output
    }

    #[test]
    fn prints_arithmetic() {
        assert_eq!(output("x = 10\ny = 20\nprint(x + y)"), "30\n");
        assert_eq!(output("print(7 / 2)\nprint(7 % 3)"), "3.5\n1\n");
    }

    #[test]
    fn while_loop_counts() {
        assert_eq!(
            output("i = 0\nwhile i < 5:\n    i = i + 1\nprint(i)"),
            "5\n"
        );
    }

    #[test]
    fn functions_return_values() {
        assert_eq!(
            output("def add(a, b):\n    return a + b\nprint(add(2, 3))"),
            "5\n"
        );
    }

    #[test]
    fn function_without_return_yields_last_value() {
        assert_eq!(output("def f(a):\n    b = a * 2\nprint(f(4))"), "8\n");
        assert_eq!(output("def g():\n    print(1)\nprint(g())"), "1\nNone\n");
    }

    #[test]
    fn recursion() {
        let src = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\nprint(fact(10))";

        assert_eq!(output(src), "3628800\n");
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let (_, result, _) = run_with_depth("def f(n):\n    return f(n + 1)\nf(0)", 25);

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ControlFlow);
        assert_eq!(err.error, RuntimeError::CallDepthExceeded { limit: 25 });
    }

    #[test]
    fn functions_do_not_see_globals() {
        let (_, result, _) = run("x = 1\ndef f():\n    return x\nf()");

        assert_eq!(
            result.unwrap_err().error,
            RuntimeError::UndefinedVariable { name: "x".into() }
        );
    }

    #[test]
    fn caller_frame_survives_failed_call() {
        let src = "x = 5\ndef f():\n    return 1 / 0\ntry:\n    f()\nexcept:\n    print(x)";
        let (output, result, caught) = run(src);

        assert!(result.is_ok());
        assert_eq!(output, "5\n");
        assert_eq!(caught.len(), 1);
        assert_eq!(caught[0].error, RuntimeError::DivisionByZero);
        assert_eq!(caught[0].line, 3);
    }

    #[test]
    fn for_restores_loop_variable() {
        assert_eq!(
            output("i = 42\nfor i in range(3):\n    print(i)\nprint(i)"),
            "0\n1\n2\n42\n"
        );

        let (_, result, _) = run("for j in [1]:\n    j = 2\nprint(j)");
        assert!(matches!(
            result.unwrap_err().error,
            RuntimeError::UndefinedVariable { .. }
        ));
    }

    #[test]
    fn break_and_continue() {
        let src = "for i in range(10):\n    if i == 2:\n        continue\n    if i == 4:\n        break\n    print(i)";

        assert_eq!(output(src), "0\n1\n3\n");
    }

    #[test]
    fn break_outside_loop_is_control_flow_error() {
        let (_, result, _) = run("break");

        assert_eq!(result.unwrap_err().kind(), ErrorKind::ControlFlow);
    }

    #[test]
    fn break_inside_function_called_from_loop_is_rejected() {
        let (_, result, _) = run("def f():\n    break\nwhile True:\n    f()");

        assert_eq!(result.unwrap_err().error, RuntimeError::BreakOutsideLoop);
    }

    #[test]
    fn lists_are_shared() {
        assert_eq!(
            output("a = [1, 2, 3]\nb = a\nb[0] = 9\nprint(a)\nprint(a[1])"),
            "[9, 2, 3]\n2\n"
        );
    }

    #[test]
    fn index_errors_carry_position() {
        let (output, result, _) = run("a = [1, 2, 3]\nprint(a[1])\nprint(a[5])");
        let err = result.unwrap_err();

        assert_eq!(output, "2\n");
        assert_eq!(err.error, RuntimeError::IndexOutOfRange { index: 5, len: 3 });
        assert_eq!(err.line, 3);
    }

    #[test]
    fn division_by_zero_is_arithmetic_error() {
        let (_, result, _) = run("x = 1 / 0");

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Arithmetic);
    }

    #[test]
    fn calling_a_variable_is_not_callable() {
        let (_, result, _) = run("f = 1\nf()");

        assert_eq!(
            result.unwrap_err().error,
            RuntimeError::NotCallable { name: "f".into() }
        );
    }

    #[test]
    fn arity_is_checked() {
        let (_, result, _) = run("def f(a):\n    return a\nf(1, 2)");

        assert!(matches!(
            result.unwrap_err().error,
            RuntimeError::FunctionArityMismatch {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn strings_iterate_and_index() {
        assert_eq!(
            output("s = \"hey\"\nfor c in s:\n    print(c.upper())\nprint(s[0] + s[2])"),
            "H\nE\nY\nhy\n"
        );
    }

    #[test]
    fn range_step_zero_is_rejected() {
        let (_, result, _) = run("r = range(0, 5, 0)");

        assert_eq!(result.unwrap_err().error, RuntimeError::RangeStepZero);
    }

    fn failure(src: &str) -> RuntimeError {
        let (_, result, _) = run(src);

        result.unwrap_err().error
    }

    #[test]
    fn index_assignment_needs_a_list() {
        assert_eq!(
            failure("x = 3\nx[0] = 1"),
            RuntimeError::NotAList {
                name: "x".into(),
                type_name: "int",
            }
        );
    }

    #[test]
    fn for_needs_an_iterable() {
        assert_eq!(
            failure("for x in 5:\n    print(x)"),
            RuntimeError::NotIterable { type_name: "int" }
        );
    }

    #[test]
    fn indices_must_be_integers() {
        assert_eq!(
            failure("a = [1]\nprint(a[\"0\"])"),
            RuntimeError::IndexNotInteger { type_name: "str" }
        );
        assert_eq!(
            failure("a = [1]\na[0.5] = 2"),
            RuntimeError::IndexNotInteger { type_name: "float" }
        );
    }

    #[test]
    fn range_bounds_must_be_integers() {
        assert_eq!(
            failure("r = range(1.5)"),
            RuntimeError::RangeArgument { type_name: "float" }
        );
        assert_eq!(
            failure("r = range(0, \"3\")"),
            RuntimeError::RangeArgument { type_name: "str" }
        );
    }

    #[test]
    fn replace_takes_two_arguments() {
        assert_eq!(
            failure("s = \"ab\".replace(\"a\")"),
            RuntimeError::MethodArityMismatch {
                method: "replace".into(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn unknown_function_is_a_name_error() {
        let (_, result, _) = run("missing(1)");
        let err = result.unwrap_err();

        assert_eq!(
            err.error,
            RuntimeError::UndefinedFunction {
                name: "missing".into()
            }
        );
        assert_eq!(err.kind(), ErrorKind::Name);
    }

    #[test]
    fn top_level_return_ends_the_run() {
        let (output, result, _) = run("print(1)\nreturn 7\nprint(2)");

        assert_eq!(output, "1\n");
        assert!(result.unwrap().equals(&Value::Int(7)));
    }

    #[test]
    fn self_containing_list_prints() {
        assert_eq!(
            output("a = [1]\na[0] = a\nprint(a)\nb = [a, a]\nprint(b)\nprint(a == a[0])"),
            "[[...]]\n[[[...]], [[...]]]\nTrue\n"
        );
    }

    #[test]
    fn empty_range_without_arguments() {
        assert_eq!(output("for i in range():\n    print(i)\nprint(len([]))"), "0\n");
    }
}
