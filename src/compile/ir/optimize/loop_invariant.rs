use std::collections::HashSet;

use crate::compile::ir::{Instr, Place, loop_spans};

use super::{Line, Note, Optimizer, Pass, definitions, is_single_def};

/// Flags temporaries computed inside a loop from names the loop never assigns.
///
/// A loop is any span from a label to a later jump back to it. Flagged lines stay where
/// they are; moving them could raise an error the loop would never have reached.
pub struct LoopInvariantOptimizer;

impl Optimizer for LoopInvariantOptimizer {
    fn pass(&self) -> Pass {
        Pass::LoopInvariant
    }

    fn optimize(&self, lines: &mut [Line], notes: &mut Vec<Note>) {
        let defs = definitions(lines);
        let live: Vec<usize> = (0..lines.len())
            .filter(|&i| lines[i].instr().is_some())
            .collect();
        let instructions: Vec<&Instr> = live.iter().filter_map(|&i| lines[i].instr()).collect();

        let mut marks = Vec::new();

        for (start, end, label) in loop_spans(&instructions) {
            let assigned: HashSet<&Place> = instructions[start..=end]
                .iter()
                .filter_map(|instr| instr.defined())
                .collect();

            for k in start + 1..end {
                let Instr::Assign(place @ Place::Temp(_), rvalue) = instructions[k] else {
                    continue;
                };

                let invariant = rvalue.is_pure()
                    && is_single_def(&defs, place)
                    && instructions.iter().any(|instr| instr.reads(place))
                    && rvalue
                        .operands()
                        .iter()
                        .all(|operand| operand.place().is_none_or(|p| !assigned.contains(&p)));

                if invariant && !marks.iter().any(|&(line, _)| line == live[k]) {
                    marks.push((live[k], label));
                }
            }
        }

        for (line, label) in marks {
            if let Line::Active(instr) = &lines[line] {
                notes.push(Note::new(
                    Pass::LoopInvariant,
                    format!("`{instr}` is invariant in the loop at L{label}"),
                ));
                let hoistable = Line::Hoistable(instr.clone(), label);
                lines[line] = hoistable;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{
        ast::BinaryOp,
        ir::{Operand, Rvalue},
    };

    fn active(instr: Instr) -> Line {
        Line::Active(instr)
    }

    #[test]
    fn flags_computations_on_unchanged_names() {
        let mut lines = vec![
            active(Instr::Label(1)),
            active(Instr::Assign(
                Place::Temp(1),
                Rvalue::Binary(BinaryOp::Mul, Operand::Var("k".into()), Operand::Int(2)),
            )),
            active(Instr::Assign(
                Place::Temp(2),
                Rvalue::Binary(BinaryOp::Add, Operand::Var("i".into()), Operand::Temp(1)),
            )),
            active(Instr::Assign(Place::Var("i".into()), Rvalue::Use(Operand::Temp(2)))),
            active(Instr::Goto(1)),
        ];
        let mut notes = Vec::new();

        LoopInvariantOptimizer.optimize(&mut lines, &mut notes);

        assert!(matches!(lines[1], Line::Hoistable(_, 1)));
        assert!(matches!(lines[2], Line::Active(_)));
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn straight_line_code_has_no_loops() {
        let mut lines = vec![
            active(Instr::Label(1)),
            active(Instr::Assign(Place::Temp(1), Rvalue::Use(Operand::Var("k".into())))),
            active(Instr::Print(Operand::Temp(1))),
        ];
        let mut notes = Vec::new();

        LoopInvariantOptimizer.optimize(&mut lines, &mut notes);

        assert!(notes.is_empty());
    }
}
