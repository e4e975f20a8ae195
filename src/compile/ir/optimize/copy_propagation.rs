use crate::compile::ir::{Instr, Operand, Place, Rvalue, Temp};

use super::{Line, Note, Optimizer, Pass};

/// Rewrites reads of a temporary that merely copies a name to read the name itself.
///
/// Only works inside one straight-line block: a label or jump forgets every copy.
pub struct CopyPropagationOptimizer;

impl Optimizer for CopyPropagationOptimizer {
    fn pass(&self) -> Pass {
        Pass::CopyPropagation
    }

    fn optimize(&self, lines: &mut [Line], notes: &mut Vec<Note>) {
        let mut copies: Vec<(Temp, Operand)> = Vec::new();

        for line in lines.iter_mut() {
            let Some(instr) = line.instr_mut() else {
                continue;
            };

            for (temp, source) in copies.iter() {
                if instr.substitute(&Place::Temp(*temp), source) {
                    notes.push(Note::new(Pass::CopyPropagation, format!("t{temp} → {source}")));
                }
            }

            if let Some(defined) = instr.defined() {
                copies.retain(|(temp, source)| {
                    !source.is_place(defined) && Place::Temp(*temp) != *defined
                });
            }

            if let Instr::Assign(Place::Temp(temp), Rvalue::Use(source)) = instr {
                if !source.is_literal() && !source.is_place(&Place::Temp(*temp)) {
                    copies.push((*temp, source.clone()));
                }
            }

            if instr.ends_block() {
                copies.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ast::BinaryOp;

    fn var(name: &str) -> Operand {
        Operand::Var(name.to_string())
    }

    #[test]
    fn reads_go_to_the_source() {
        let mut lines = vec![
            Line::Active(Instr::Assign(Place::Temp(1), Rvalue::Use(var("x")))),
            Line::Active(Instr::Assign(
                Place::Temp(2),
                Rvalue::Binary(BinaryOp::Add, Operand::Temp(1), Operand::Int(1)),
            )),
        ];
        let mut notes = Vec::new();

        CopyPropagationOptimizer.optimize(&mut lines, &mut notes);

        assert_eq!(lines[1].to_string(), "t2 = x + 1");
        assert_eq!(notes[0].message, "t1 → x");
    }

    #[test]
    fn reassigning_the_source_stops_propagation() {
        let mut lines = vec![
            Line::Active(Instr::Assign(Place::Temp(1), Rvalue::Use(var("x")))),
            Line::Active(Instr::Assign(
                Place::Var("x".into()),
                Rvalue::Use(Operand::Int(3)),
            )),
            Line::Active(Instr::Print(Operand::Temp(1))),
        ];
        let mut notes = Vec::new();

        CopyPropagationOptimizer.optimize(&mut lines, &mut notes);

        assert!(notes.is_empty());
        assert_eq!(lines[2].to_string(), "print t1");
    }

    #[test]
    fn labels_end_the_block() {
        let mut lines = vec![
            Line::Active(Instr::Assign(Place::Temp(1), Rvalue::Use(var("x")))),
            Line::Active(Instr::Label(1)),
            Line::Active(Instr::Print(Operand::Temp(1))),
        ];
        let mut notes = Vec::new();

        CopyPropagationOptimizer.optimize(&mut lines, &mut notes);

        assert_eq!(lines[2].to_string(), "print t1");
    }
}
