//! Illustrative pseudo-assembly.
//!
//! Registers are virtual and never reused; every operand load gets a fresh one. `R0` is
//! reserved for return values.

use std::fmt::{self, Display, Formatter};

use crate::compile::ir::Label;

pub mod codegen;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Register {
    Virtual(usize),
    Return,
}

impl Display for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Virtual(n) => write!(f, "R{n}"),
            Self::Return => write!(f, "R0"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Location {
    Register(Register),
    Immediate(String),
    /// The storage cell of a variable or temporary.
    Memory(String),
    /// The k-th word above the stack pointer.
    Stack(usize),
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(reg) => write!(f, "{reg}"),
            Self::Immediate(value) => write!(f, "#{value}"),
            Self::Memory(name) => write!(f, "[{name}]"),
            Self::Stack(0) => write!(f, "[SP]"),
            Self::Stack(k) => write!(f, "[SP, #{}]", 4 * k),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    EQ,
    NE,
    LT,
    LE,
    GT,
    GE,
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EQ => "EQ",
            Self::NE => "NE",
            Self::LT => "LT",
            Self::LE => "LE",
            Self::GT => "GT",
            Self::GE => "GE",
        };

        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    NOP,
    Label(Label),
    Function(String),
    MOV(Register, Location),
    LDR(Register, Location),
    STR(Register, Location),
    ADD(Register, Register, Register),
    SUB(Register, Register, Register),
    MUL(Register, Register, Register),
    DIV(Register, Register, Register),
    MOD(Register, Register, Register),
    AND(Register, Register, Register),
    ORR(Register, Register, Register),
    NEG(Register, Register),
    NOT(Register, Register),
    CMP(Register, Register),
    /// Writes 1 to the register when the last comparison met the condition, else 0.
    SET(Condition, Register),
    B(Label),
    BNE(Label),
    PUSH(Register),
    POP(Register),
    CALL(String),
    RET,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NOP => write!(f, "NOP"),
            Self::Label(label) => write!(f, "L{label}:"),
            Self::Function(name) => write!(f, "{name}:"),
            Self::MOV(dest, src) => write!(f, "MOV {dest}, {src}"),
            Self::LDR(dest, src) => write!(f, "LDR {dest}, {src}"),
            Self::STR(src, dest) => write!(f, "STR {src}, {dest}"),
            Self::ADD(dest, lhs, rhs) => write!(f, "ADD {dest}, {lhs}, {rhs}"),
            Self::SUB(dest, lhs, rhs) => write!(f, "SUB {dest}, {lhs}, {rhs}"),
            Self::MUL(dest, lhs, rhs) => write!(f, "MUL {dest}, {lhs}, {rhs}"),
            Self::DIV(dest, lhs, rhs) => write!(f, "DIV {dest}, {lhs}, {rhs}"),
            Self::MOD(dest, lhs, rhs) => write!(f, "MOD {dest}, {lhs}, {rhs}"),
            Self::AND(dest, lhs, rhs) => write!(f, "AND {dest}, {lhs}, {rhs}"),
            Self::ORR(dest, lhs, rhs) => write!(f, "ORR {dest}, {lhs}, {rhs}"),
            Self::NEG(dest, src) => write!(f, "NEG {dest}, {src}"),
            Self::NOT(dest, src) => write!(f, "NOT {dest}, {src}"),
            Self::CMP(lhs, rhs) => write!(f, "CMP {lhs}, {rhs}"),
            Self::SET(cond, dest) => write!(f, "SET{cond} {dest}"),
            Self::B(label) => write!(f, "B L{label}"),
            Self::BNE(label) => write!(f, "BNE L{label}"),
            Self::PUSH(reg) => write!(f, "PUSH {reg}"),
            Self::POP(reg) => write!(f, "POP {reg}"),
            Self::CALL(name) => write!(f, "CALL {name}"),
            Self::RET => write!(f, "RET"),
        }
    }
}

/// An instruction with the comment explaining it.
#[derive(Clone, Debug, PartialEq)]
pub struct AsmLine {
    pub instruction: Instruction,
    pub comment: String,
}

impl Display for AsmLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:<22} ; {}", self.instruction.to_string(), self.comment)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Asm {
    pub lines: Vec<AsmLine>,
    /// Virtual registers handed out, `R0` not included.
    pub registers: usize,
    /// Labels defined in the listing.
    pub labels: usize,
}

impl Asm {
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.lines.iter().map(|line| &line.instruction)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Display for Asm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            writeln!(f, "{:3} | {line}", i + 1)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_arm_like_syntax() {
        let line = AsmLine {
            instruction: Instruction::MOV(
                Register::Virtual(1),
                Location::Immediate("5".to_string()),
            ),
            comment: "Load constant 5".to_string(),
        };

        assert_eq!(line.to_string(), "MOV R1, #5             ; Load constant 5");
        assert_eq!(
            Instruction::LDR(Register::Virtual(2), Location::Stack(1)).to_string(),
            "LDR R2, [SP, #4]"
        );
        assert_eq!(
            Instruction::SET(Condition::LT, Register::Virtual(3)).to_string(),
            "SETLT R3"
        );
    }
}
