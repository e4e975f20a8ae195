use crate::compile::ir::{Instr, Operand, Place, Rvalue, Temp};

use super::{Line, Note, Optimizer, Pass, Removal, definitions, is_single_def, substitute_all};

/// Drops a computation whose operator and operands match one made earlier in the same
/// straight-line block, provided none of the operands was reassigned in between.
pub struct CommonSubexpressionOptimizer;

/// An operator applied to operands and stored in a temporary.
fn computation(instr: &Instr) -> Option<(&Place, Temp, &Rvalue)> {
    match instr {
        Instr::Assign(place @ Place::Temp(temp), rvalue @ (Rvalue::Unary(..) | Rvalue::Binary(..))) => {
            Some((place, *temp, rvalue))
        }
        _ => None,
    }
}

impl Optimizer for CommonSubexpressionOptimizer {
    fn pass(&self) -> Pass {
        Pass::CommonSubexpression
    }

    fn optimize(&self, lines: &mut [Line], notes: &mut Vec<Note>) {
        let defs = definitions(lines);
        let mut available: Vec<(Rvalue, Temp)> = Vec::new();

        for i in 0..lines.len() {
            let Some(instr) = lines[i].instr().cloned() else {
                continue;
            };

            if let Some((place, _, rvalue)) = computation(&instr) {
                let earlier = available
                    .iter()
                    .find(|(computed, _)| computed == rvalue)
                    .map(|&(_, earlier)| earlier);

                if let Some(earlier) = earlier.filter(|_| is_single_def(&defs, place)) {
                    substitute_all(lines, i, place, &Operand::Temp(earlier));
                    lines[i].remove(Removal::CommonSubexpression(earlier));
                    notes.push(Note::new(
                        Pass::CommonSubexpression,
                        format!("{rvalue} → t{earlier}"),
                    ));
                    continue;
                }
            }

            if let Some(defined) = instr.defined() {
                available.retain(|(computed, temp)| {
                    Place::Temp(*temp) != *defined
                        && !computed.operands().iter().any(|operand| operand.is_place(defined))
                });
            }

            if let Some((place, temp, rvalue)) = computation(&instr) {
                if is_single_def(&defs, place) {
                    available.push((rvalue.clone(), temp));
                }
            }

            if instr.ends_block() {
                available.clear();
            }
        }
    }
}
