//! Three-address code.
//!
//! A program lowers to one flat instruction list. Temporaries and labels are numbered from 1
//! in the order they are created, per lowering run.

use std::fmt::{self, Display, Formatter};

use crate::{
    compile::ast::{BinaryOp, UnaryOp},
    infra::format_float,
    interp::value::Value,
};

pub mod lowering;
pub mod optimize;

pub type Temp = usize;
pub type Label = usize;

/// Something an instruction writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Place {
    Temp(Temp),
    Var(String),
}

impl Display for Place {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp(temp) => write!(f, "t{temp}"),
            Self::Var(name) => write!(f, "{name}"),
        }
    }
}

/// Something an instruction reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Temp(Temp),
    Var(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

impl Operand {
    pub fn place(&self) -> Option<Place> {
        match self {
            Self::Temp(temp) => Some(Place::Temp(*temp)),
            Self::Var(name) => Some(Place::Var(name.clone())),
            _ => None,
        }
    }

    pub fn is_place(&self, place: &Place) -> bool {
        match (self, place) {
            (Self::Temp(a), Place::Temp(b)) => a == b,
            (Self::Var(a), Place::Var(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.place().is_none()
    }

    /// The runtime value of a literal operand.
    pub fn value(&self) -> Option<Value> {
        match self {
            Self::Int(value) => Some(Value::Int(*value)),
            Self::Float(value) => Some(Value::Float(*value)),
            Self::Str(value) => Some(Value::Str(value.clone())),
            Self::Bool(value) => Some(Value::Bool(*value)),
            Self::None => Some(Value::None),
            Self::Temp(_) | Self::Var(_) => None,
        }
    }

    /// The literal operand for a scalar value.
    pub fn literal(value: &Value) -> Option<Self> {
        match value {
            Value::Int(value) => Some(Self::Int(*value)),
            Value::Float(value) => Some(Self::Float(*value)),
            Value::Str(value) => Some(Self::Str(value.clone())),
            Value::Bool(value) => Some(Self::Bool(*value)),
            Value::None => Some(Self::None),
            Value::List(_) | Value::Range(_) => None,
        }
    }
}

impl From<Place> for Operand {
    fn from(place: Place) -> Self {
        match place {
            Place::Temp(temp) => Self::Temp(temp),
            Place::Var(name) => Self::Var(name),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp(temp) => write!(f, "t{temp}"),
            Self::Var(name) => write!(f, "{name}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{}", format_float(*value)),
            Self::Str(value) => write!(f, "{}", Value::Str(value.clone()).repr()),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::None => write!(f, "None"),
        }
    }
}

/// The right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Rvalue {
    Use(Operand),
    Unary(UnaryOp, Operand),
    Binary(BinaryOp, Operand, Operand),
    Call(String, Vec<Operand>),
    NewList,
    Index(Operand, Operand),
    Len(Operand),
    Method(Operand, String, Vec<Operand>),
    Range(Operand, Operand, Operand),
}

impl Rvalue {
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Self::Use(operand) | Self::Unary(_, operand) | Self::Len(operand) => vec![operand],
            Self::Binary(_, lhs, rhs) | Self::Index(lhs, rhs) => vec![lhs, rhs],
            Self::Call(_, args) => args.iter().collect(),
            Self::NewList => Vec::new(),
            Self::Method(receiver, _, args) => std::iter::once(receiver).chain(args).collect(),
            Self::Range(start, stop, step) => vec![start, stop, step],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Self::Use(operand) | Self::Unary(_, operand) | Self::Len(operand) => vec![operand],
            Self::Binary(_, lhs, rhs) | Self::Index(lhs, rhs) => vec![lhs, rhs],
            Self::Call(_, args) => args.iter_mut().collect(),
            Self::NewList => Vec::new(),
            Self::Method(receiver, _, args) => std::iter::once(receiver).chain(args).collect(),
            Self::Range(start, stop, step) => vec![start, stop, step],
        }
    }

    /// Computes a value from its operands alone, with no effect beyond a possible error.
    pub fn is_pure(&self) -> bool {
        matches!(self, Self::Use(_) | Self::Unary(..) | Self::Binary(..))
    }
}

impl Display for Rvalue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Use(operand) => write!(f, "{operand}"),
            Self::Unary(UnaryOp::Neg, operand) => write!(f, "-{operand}"),
            Self::Unary(UnaryOp::Not, operand) => write!(f, "not {operand}"),
            Self::Binary(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
            Self::Call(name, args) => write!(f, "call {name}({})", joined(args)),
            Self::NewList => write!(f, "[]"),
            Self::Index(target, index) => write!(f, "{target}[{index}]"),
            Self::Len(target) => write!(f, "len({target})"),
            Self::Method(receiver, method, args) => {
                write!(f, "{receiver}.{method}({})", joined(args))
            }
            Self::Range(start, stop, step) => write!(f, "range({start}, {stop}, {step})"),
        }
    }
}

fn joined(operands: &[Operand]) -> String {
    operands
        .iter()
        .map(Operand::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Assign(Place, Rvalue),
    Append(Operand, Operand),
    IndexStore(Operand, Operand, Operand),
    Print(Operand),
    /// Jumps when the operand is falsy.
    IfFalse(Operand, Label),
    Goto(Label),
    Label(Label),
    Function(String),
    Param(String),
    Return(Option<Operand>),
    /// Leaves the innermost loop; the label is its exit. Outside a loop there is none.
    Break(Option<Label>),
    /// Starts the next iteration of the innermost loop at the label.
    Continue(Option<Label>),
}

impl Instr {
    pub fn defined(&self) -> Option<&Place> {
        match self {
            Self::Assign(place, _) => Some(place),
            _ => None,
        }
    }

    pub fn uses(&self) -> Vec<&Operand> {
        match self {
            Self::Assign(_, rvalue) => rvalue.operands(),
            Self::Append(list, item) => vec![list, item],
            Self::IndexStore(list, index, value) => vec![list, index, value],
            Self::Print(operand) | Self::IfFalse(operand, _) => vec![operand],
            Self::Return(operand) => operand.iter().collect(),
            Self::Goto(_)
            | Self::Label(_)
            | Self::Function(_)
            | Self::Param(_)
            | Self::Break(_)
            | Self::Continue(_) => Vec::new(),
        }
    }

    pub fn uses_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Self::Assign(_, rvalue) => rvalue.operands_mut(),
            Self::Append(list, item) => vec![list, item],
            Self::IndexStore(list, index, value) => vec![list, index, value],
            Self::Print(operand) | Self::IfFalse(operand, _) => vec![operand],
            Self::Return(operand) => operand.iter_mut().collect(),
            Self::Goto(_)
            | Self::Label(_)
            | Self::Function(_)
            | Self::Param(_)
            | Self::Break(_)
            | Self::Continue(_) => Vec::new(),
        }
    }

    pub fn reads(&self, place: &Place) -> bool {
        self.uses().iter().any(|operand| operand.is_place(place))
    }

    /// Replaces every read of `place` and reports whether anything changed.
    pub fn substitute(&mut self, place: &Place, with: &Operand) -> bool {
        let mut changed = false;

        for operand in self.uses_mut() {
            if operand.is_place(place) {
                *operand = with.clone();
                changed = true;
            }
        }

        changed
    }

    /// Whether straight-line execution may not continue with the next instruction.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Self::IfFalse(..)
                | Self::Goto(_)
                | Self::Label(_)
                | Self::Function(_)
                | Self::Return(_)
                | Self::Break(_)
                | Self::Continue(_)
        )
    }

    /// Where control may go besides the next instruction.
    pub fn target(&self) -> Option<Label> {
        match self {
            Self::IfFalse(_, label) | Self::Goto(label) => Some(*label),
            Self::Break(label) | Self::Continue(label) => *label,
            _ => None,
        }
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign(place, rvalue) => write!(f, "{place} = {rvalue}"),
            Self::Append(list, item) => write!(f, "{list}.append({item})"),
            Self::IndexStore(list, index, value) => write!(f, "{list}[{index}] = {value}"),
            Self::Print(operand) => write!(f, "print {operand}"),
            Self::IfFalse(operand, label) => write!(f, "if {operand} == False goto L{label}"),
            Self::Goto(label) => write!(f, "goto L{label}"),
            Self::Label(label) => write!(f, "L{label}:"),
            Self::Function(name) => write!(f, "function {name}:"),
            Self::Param(name) => write!(f, "param {name}"),
            Self::Return(Some(operand)) => write!(f, "return {operand}"),
            Self::Return(None) => write!(f, "return"),
            Self::Break(Some(label)) => write!(f, "break L{label}"),
            Self::Break(None) => write!(f, "break"),
            Self::Continue(Some(label)) => write!(f, "continue L{label}"),
            Self::Continue(None) => write!(f, "continue"),
        }
    }
}

/// The lowered program.
#[derive(Debug, Clone, Default)]
pub struct Ir {
    pub instructions: Vec<Instr>,
    pub temps: usize,
    pub labels: usize,
}

impl Ir {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl Display for Ir {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "{:3} | {instr}", i + 1)?;
        }

        Ok(())
    }
}

/// Spans `[start, end]` of backward jumps, each from a label to a jump back to it.
pub fn loop_spans(instructions: &[&Instr]) -> Vec<(usize, usize, Label)> {
    let mut spans = Vec::new();

    for (end, instr) in instructions.iter().enumerate() {
        let Some(label) = instr.target() else {
            continue;
        };

        let start = instructions[..end]
            .iter()
            .position(|instr| **instr == Instr::Label(label));

        if let Some(start) = start {
            spans.push((start, end, label));
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_render_as_three_address_code() {
        let add = Instr::Assign(
            Place::Temp(3),
            Rvalue::Binary(BinaryOp::Add, Operand::Var("a".into()), Operand::Int(1)),
        );

        assert_eq!(add.to_string(), "t3 = a + 1");
        assert_eq!(
            Instr::IfFalse(Operand::Temp(1), 2).to_string(),
            "if t1 == False goto L2"
        );
        assert_eq!(
            Instr::Assign(
                Place::Temp(4),
                Rvalue::Call("f".into(), vec![Operand::Temp(2), Operand::Str("x".into())])
            )
            .to_string(),
            "t4 = call f(t2, 'x')"
        );
    }

    #[test]
    fn substitution_replaces_reads_only() {
        let mut instr = Instr::Assign(
            Place::Temp(2),
            Rvalue::Binary(BinaryOp::Mul, Operand::Temp(1), Operand::Temp(1)),
        );

        assert!(instr.substitute(&Place::Temp(1), &Operand::Int(4)));
        assert_eq!(instr.to_string(), "t2 = 4 * 4");
        assert!(!instr.substitute(&Place::Temp(2), &Operand::Int(0)));
    }

    #[test]
    fn finds_backward_jumps() {
        let code = [
            Instr::Label(1),
            Instr::IfFalse(Operand::Var("c".into()), 2),
            Instr::Goto(1),
            Instr::Label(2),
        ];
        let refs: Vec<&Instr> = code.iter().collect();

        assert_eq!(loop_spans(&refs), vec![(0, 2, 1)]);
    }
}
