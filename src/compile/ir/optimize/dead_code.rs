use std::collections::HashSet;

use crate::compile::ir::{Instr, Place, Rvalue, loop_spans};

use super::{Line, Note, Optimizer, Pass, Removal};

/// Removes assignments whose target is never read afterwards.
///
/// Scans backwards so a removed line no longer keeps its own operands alive. Inside a loop a
/// name read anywhere in the loop body counts as read, since the next iteration may reach
/// it. Calls always stay.
pub struct DeadCodeOptimizer;

impl Optimizer for DeadCodeOptimizer {
    fn pass(&self) -> Pass {
        Pass::DeadCode
    }

    fn optimize(&self, lines: &mut [Line], notes: &mut Vec<Note>) {
        let live: Vec<usize> = (0..lines.len())
            .filter(|&i| lines[i].instr().is_some())
            .collect();

        let loops: Vec<(usize, usize, HashSet<Place>)> = {
            let instructions: Vec<&Instr> =
                live.iter().filter_map(|&i| lines[i].instr()).collect();

            loop_spans(&instructions)
                .into_iter()
                .map(|(start, end, _)| {
                    let read = instructions[start..=end]
                        .iter()
                        .flat_map(|instr| instr.uses())
                        .filter_map(|operand| operand.place())
                        .collect();

                    (start, end, read)
                })
                .collect()
        };

        let mut read: HashSet<Place> = HashSet::new();

        for (k, &i) in live.iter().enumerate().rev() {
            let Some(instr) = lines[i].instr() else {
                continue;
            };

            if let Instr::Assign(place, rvalue) = instr {
                let needed = matches!(rvalue, Rvalue::Call(..))
                    || read.contains(place)
                    || loops
                        .iter()
                        .any(|(start, end, body)| (*start..=*end).contains(&k) && body.contains(place));

                if !needed {
                    notes.push(Note::new(
                        Pass::DeadCode,
                        format!("{place} is never used"),
                    ));
                    lines[i].remove(Removal::DeadCode);
                    continue;
                }
            }

            read.extend(instr.uses().into_iter().filter_map(|operand| operand.place()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ir::Operand;

    fn assign(place: Place, rvalue: Rvalue) -> Line {
        Line::Active(Instr::Assign(place, rvalue))
    }

    #[test]
    fn unused_chains_disappear_together() {
        let mut lines = vec![
            assign(Place::Temp(1), Rvalue::Use(Operand::Int(1))),
            assign(Place::Var("x".into()), Rvalue::Use(Operand::Temp(1))),
            assign(Place::Var("y".into()), Rvalue::Use(Operand::Int(2))),
            Line::Active(Instr::Print(Operand::Var("y".into()))),
        ];
        let mut notes = Vec::new();

        DeadCodeOptimizer.optimize(&mut lines, &mut notes);

        assert!(matches!(lines[0], Line::Removed(_, Removal::DeadCode)));
        assert!(matches!(lines[1], Line::Removed(_, Removal::DeadCode)));
        assert!(matches!(lines[2], Line::Active(_)));
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn calls_are_kept() {
        let mut lines = vec![assign(Place::Temp(1), Rvalue::Call("f".into(), Vec::new()))];
        let mut notes = Vec::new();

        DeadCodeOptimizer.optimize(&mut lines, &mut notes);

        assert!(matches!(lines[0], Line::Active(_)));
    }

    #[test]
    fn loop_carried_names_stay() {
        // L1: t1 = i; print t1; i = 5; goto L1
        let mut lines = vec![
            Line::Active(Instr::Label(1)),
            assign(Place::Temp(1), Rvalue::Use(Operand::Var("i".into()))),
            Line::Active(Instr::Print(Operand::Temp(1))),
            assign(Place::Var("i".into()), Rvalue::Use(Operand::Int(5))),
            Line::Active(Instr::Goto(1)),
        ];
        let mut notes = Vec::new();

        DeadCodeOptimizer.optimize(&mut lines, &mut notes);

        assert!(notes.is_empty());
    }
}
