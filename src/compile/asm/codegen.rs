use crate::{
    compile::{
        ast::{BinaryOp, UnaryOp},
        ir::{Instr, Operand, Place, Rvalue},
    },
    infra::format_float,
};

use super::{Asm, AsmLine, Condition, Instruction, Location, Register};

/// Lowers three-address code into the pseudo-assembly listing.
pub fn generate(instructions: &[Instr]) -> Asm {
    let mut generator = CodeGenerator::default();

    for instr in instructions {
        generator.munch(instr);
    }

    Asm {
        labels: instructions
            .iter()
            .filter(|instr| matches!(instr, Instr::Label(_)))
            .count(),
        registers: generator.registers,
        lines: generator.lines,
    }
}

#[derive(Default)]
struct CodeGenerator {
    lines: Vec<AsmLine>,
    registers: usize,
    /// Parameters seen since the last function marker.
    params: usize,
}

fn immediate(operand: &Operand) -> Option<String> {
    match operand {
        Operand::Int(value) => Some(value.to_string()),
        Operand::Float(value) => Some(format_float(*value)),
        Operand::Str(_) => Some(operand.to_string()),
        Operand::Bool(value) => Some(u8::from(*value).to_string()),
        Operand::None => Some("0".to_string()),
        Operand::Temp(_) | Operand::Var(_) => None,
    }
}

fn memory(place: &Place) -> Location {
    Location::Memory(place.to_string())
}

impl CodeGenerator {
    fn fresh_register(&mut self) -> Register {
        self.registers += 1;
        Register::Virtual(self.registers)
    }

    fn emit(&mut self, instruction: Instruction, comment: impl Into<String>) {
        self.lines.push(AsmLine {
            instruction,
            comment: comment.into(),
        });
    }

    fn load(&mut self, operand: &Operand) -> Register {
        let reg = self.fresh_register();

        match immediate(operand) {
            Some(value) => self.emit(
                Instruction::MOV(reg, Location::Immediate(value)),
                format!("Load constant {operand}"),
            ),
            None => self.emit(
                Instruction::LDR(reg, Location::Memory(operand.to_string())),
                format!("Load {operand}"),
            ),
        }

        reg
    }

    fn store(&mut self, reg: Register, place: &Place) {
        self.emit(Instruction::STR(reg, memory(place)), format!("Store in {place}"));
    }

    /// Pushes each argument, calls, then pops them again.
    fn call(&mut self, target: &str, args: &[&Operand], comment: &str) {
        for arg in args {
            let reg = self.load(arg);
            self.emit(Instruction::PUSH(reg), "Push argument");
        }

        self.emit(Instruction::CALL(target.to_string()), comment);

        for _ in args {
            let reg = self.fresh_register();
            self.emit(Instruction::POP(reg), "Clean up stack");
        }
    }

    fn munch(&mut self, instr: &Instr) {
        match instr {
            Instr::Assign(place, rvalue) => self.munch_assign(place, rvalue),
            Instr::Append(list, item) => {
                self.call("__list_append", &[list, item], "Append to list");
            }
            Instr::IndexStore(list, index, value) => {
                self.call("__index_store", &[list, index, value], "Store list element");
            }
            Instr::Print(operand) => {
                let reg = self.load(operand);
                self.emit(Instruction::PUSH(reg), "Push value to print");
                self.emit(Instruction::CALL("print".to_string()), "Call print");
                self.emit(Instruction::POP(reg), "Clean up stack");
            }
            Instr::IfFalse(operand, label) => {
                let cond = self.load(operand);
                let truth = self.fresh_register();
                self.emit(
                    Instruction::MOV(truth, Location::Immediate("1".to_string())),
                    "Load True",
                );
                self.emit(Instruction::CMP(cond, truth), "Compare condition");
                self.emit(Instruction::BNE(*label), "Branch if false");
            }
            Instr::Goto(label) => self.emit(Instruction::B(*label), "Unconditional branch"),
            Instr::Label(label) => self.emit(Instruction::Label(*label), "Label"),
            Instr::Function(name) => {
                self.params = 0;
                self.emit(Instruction::Function(name.clone()), "Function entry");
            }
            Instr::Param(name) => {
                let reg = self.fresh_register();
                self.emit(
                    Instruction::LDR(reg, Location::Stack(self.params)),
                    format!("Load parameter {name}"),
                );
                self.store(reg, &Place::Var(name.clone()));
                self.params += 1;
            }
            Instr::Return(value) => {
                match value {
                    Some(operand) => {
                        let reg = self.load(operand);
                        self.emit(
                            Instruction::MOV(Register::Return, Location::Register(reg)),
                            "Set return register",
                        );
                    }
                    None => self.emit(
                        Instruction::MOV(Register::Return, Location::Immediate("0".to_string())),
                        "Return None",
                    ),
                }
                self.emit(Instruction::RET, "Return from function");
            }
            Instr::Break(Some(label)) => self.emit(Instruction::B(*label), "Break out of loop"),
            Instr::Continue(Some(label)) => self.emit(Instruction::B(*label), "Next iteration"),
            Instr::Break(None) => self.emit(Instruction::NOP, "break outside loop"),
            Instr::Continue(None) => self.emit(Instruction::NOP, "continue outside loop"),
        }
    }

    fn munch_assign(&mut self, place: &Place, rvalue: &Rvalue) {
        match rvalue {
            Rvalue::Use(operand) => {
                let reg = self.load(operand);
                self.store(reg, place);
            }
            Rvalue::Unary(op, operand) => {
                let src = self.load(operand);
                let dest = self.fresh_register();
                match op {
                    UnaryOp::Neg => self.emit(Instruction::NEG(dest, src), "Negate"),
                    UnaryOp::Not => self.emit(Instruction::NOT(dest, src), "Logical not"),
                }
                self.store(dest, place);
            }
            Rvalue::Binary(op, lhs, rhs) => {
                let lhs = self.load(lhs);
                let rhs = self.load(rhs);
                let dest = self.fresh_register();
                self.munch_binary(*op, dest, lhs, rhs);
                self.store(dest, place);
            }
            Rvalue::Call(name, args) => {
                let args: Vec<&Operand> = args.iter().collect();
                self.call(name, &args, &format!("Call {name}"));
                self.store(Register::Return, place);
            }
            Rvalue::NewList => {
                self.call("__list_new", &[], "Allocate list");
                self.store(Register::Return, place);
            }
            Rvalue::Index(target, index) => {
                self.call("__index", &[target, index], "Read element");
                self.store(Register::Return, place);
            }
            Rvalue::Len(target) => {
                self.call("__len", &[target], "Length");
                self.store(Register::Return, place);
            }
            Rvalue::Method(receiver, method, args) => {
                let args: Vec<&Operand> = std::iter::once(receiver).chain(args).collect();
                self.call(&format!("__str_{method}"), &args, &format!("String {method}"));
                self.store(Register::Return, place);
            }
            Rvalue::Range(start, stop, step) => {
                self.call("__range", &[start, stop, step], "Build range");
                self.store(Register::Return, place);
            }
        }
    }

    fn munch_binary(&mut self, op: BinaryOp, dest: Register, lhs: Register, rhs: Register) {
        let (instruction, comment) = match op {
            BinaryOp::Add => (Instruction::ADD(dest, lhs, rhs), "Add operands"),
            BinaryOp::Sub => (Instruction::SUB(dest, lhs, rhs), "Subtract operands"),
            BinaryOp::Mul => (Instruction::MUL(dest, lhs, rhs), "Multiply operands"),
            BinaryOp::Div => (Instruction::DIV(dest, lhs, rhs), "Divide operands"),
            BinaryOp::Mod => (Instruction::MOD(dest, lhs, rhs), "Remainder"),
            BinaryOp::And => (Instruction::AND(dest, lhs, rhs), "Logical and"),
            BinaryOp::Or => (Instruction::ORR(dest, lhs, rhs), "Logical or"),
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Less
            | BinaryOp::LessEq
            | BinaryOp::Greater
            | BinaryOp::GreaterEq => {
                let cond = match op {
                    BinaryOp::Eq => Condition::EQ,
                    BinaryOp::NotEq => Condition::NE,
                    BinaryOp::Less => Condition::LT,
                    BinaryOp::LessEq => Condition::LE,
                    BinaryOp::Greater => Condition::GT,
                    _ => Condition::GE,
                };

                self.emit(Instruction::CMP(lhs, rhs), "Compare operands");
                (Instruction::SET(cond, dest), "Keep comparison result")
            }
        };

        self.emit(instruction, comment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{
        ir::lowering::lower,
        parser::{lex::tokenize, parse},
    };

    fn listing(instructions: &[Instr]) -> Vec<String> {
        generate(instructions)
            .instructions()
            .map(Instruction::to_string)
            .collect()
    }

    #[test]
    fn constant_assignment_is_move_and_store() {
        let code = [Instr::Assign(
            Place::Var("x".into()),
            Rvalue::Use(Operand::Int(5)),
        )];

        assert_eq!(listing(&code), vec!["MOV R1, #5", "STR R1, [x]"]);
    }

    #[test]
    fn arithmetic_loads_both_operands() {
        let code = [Instr::Assign(
            Place::Temp(3),
            Rvalue::Binary(BinaryOp::Sub, Operand::Var("a".into()), Operand::Int(1)),
        )];

        assert_eq!(
            listing(&code),
            vec!["LDR R1, [a]", "MOV R2, #1", "SUB R3, R1, R2", "STR R3, [t3]"]
        );
    }

    #[test]
    fn conditional_jump_compares_with_true() {
        let code = [Instr::IfFalse(Operand::Temp(1), 2), Instr::Goto(1)];

        assert_eq!(
            listing(&code),
            vec!["LDR R1, [t1]", "MOV R2, #1", "CMP R1, R2", "BNE L2", "B L1"]
        );
    }

    #[test]
    fn calls_push_pop_and_store_the_result() {
        let code = [Instr::Assign(
            Place::Temp(4),
            Rvalue::Call("add".into(), vec![Operand::Temp(2), Operand::Temp(3)]),
        )];

        assert_eq!(
            listing(&code),
            vec![
                "LDR R1, [t2]",
                "PUSH R1",
                "LDR R2, [t3]",
                "PUSH R2",
                "CALL add",
                "POP R3",
                "POP R4",
                "STR R0, [t4]",
            ]
        );
    }

    #[test]
    fn functions_read_parameters_from_the_stack() {
        let src = "def add(a, b):\n    return a + b\nprint(add(2, 3))";
        let lexed = tokenize(src);
        let program = parse(src, &lexed.tokens).unwrap();
        let asm = generate(&lower(&program).instructions);
        let text = asm.to_string();

        assert!(text.contains("LDR R1, [SP]"));
        assert!(text.contains("LDR R2, [SP, #4]"));
        assert!(text.contains("MOV R0, "));
        assert!(text.contains("RET"));
        assert!(text.contains("CALL print"));
        assert!(asm.labels >= 1);
    }
}
