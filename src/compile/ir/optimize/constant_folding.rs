use crate::{
    compile::{
        ast::UnaryOp,
        ir::{Instr, Operand, Place, Rvalue},
    },
    interp::value::{self, Value},
};

use super::{Line, Note, Optimizer, Pass, definitions, is_single_def, substitute_all};

/// Folds arithmetic on numeric literals and propagates temporaries that hold a literal.
pub struct ConstantFoldingOptimizer;

fn is_number(operand: &Operand) -> bool {
    matches!(operand, Operand::Int(_) | Operand::Float(_))
}

impl ConstantFoldingOptimizer {
    fn fold(rvalue: &Rvalue) -> Option<Operand> {
        let folded = match rvalue {
            Rvalue::Binary(op, lhs, rhs)
                if op.is_arithmetic() && is_number(lhs) && is_number(rhs) =>
            {
                value::binary(*op, lhs.value()?, rhs.value()?).ok()?
            }
            Rvalue::Unary(UnaryOp::Neg, operand) if is_number(operand) => {
                value::unary(UnaryOp::Neg, operand.value()?).ok()?
            }
            _ => return None,
        };

        match folded {
            Value::Float(value) if !value.is_finite() => None,
            folded => Operand::literal(&folded),
        }
    }

    fn fold_lines(lines: &mut [Line], notes: &mut Vec<Note>) -> bool {
        let mut changed = false;

        for line in lines.iter_mut() {
            let Some(Instr::Assign(_, rvalue)) = line.instr_mut() else {
                continue;
            };

            // division and modulo by zero stay for the runtime to report
            let Some(folded) = Self::fold(rvalue) else {
                continue;
            };

            notes.push(Note::new(
                Pass::ConstantFolding,
                format!("{rvalue} → {folded}"),
            ));
            *rvalue = Rvalue::Use(folded);
            changed = true;
        }

        changed
    }

    fn propagate(lines: &mut [Line], notes: &mut Vec<Note>) -> bool {
        let defs = definitions(lines);
        let mut changed = false;

        for i in 0..lines.len() {
            let Some(Instr::Assign(place @ Place::Temp(_), Rvalue::Use(operand))) = lines[i].instr()
            else {
                continue;
            };

            if !operand.is_literal() || !is_single_def(&defs, place) {
                continue;
            }

            let (place, operand) = (place.clone(), operand.clone());
            if substitute_all(lines, i, &place, &operand) > 0 {
                notes.push(Note::new(
                    Pass::ConstantFolding,
                    format!("{place} replaced by constant {operand}"),
                ));
                changed = true;
            }
        }

        changed
    }
}

impl Optimizer for ConstantFoldingOptimizer {
    fn pass(&self) -> Pass {
        Pass::ConstantFolding
    }

    fn optimize(&self, lines: &mut [Line], notes: &mut Vec<Note>) {
        // both halves run every round; each round removes an operator or a temporary read
        while Self::fold_lines(lines, notes) | Self::propagate(lines, notes) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ast::BinaryOp;

    fn temp(n: usize, rvalue: Rvalue) -> Line {
        Line::Active(Instr::Assign(Place::Temp(n), rvalue))
    }

    #[test]
    fn folds_through_literal_temporaries() {
        let mut lines = vec![
            temp(1, Rvalue::Use(Operand::Int(6))),
            temp(2, Rvalue::Use(Operand::Int(7))),
            temp(3, Rvalue::Binary(BinaryOp::Mul, Operand::Temp(1), Operand::Temp(2))),
            Line::Active(Instr::Print(Operand::Temp(3))),
        ];
        let mut notes = Vec::new();

        ConstantFoldingOptimizer.optimize(&mut lines, &mut notes);

        assert_eq!(lines[3], Line::Active(Instr::Print(Operand::Int(42))));
        assert!(notes.iter().any(|note| note.message == "6 * 7 → 42"));
    }

    #[test]
    fn division_is_true_division() {
        let rvalue = Rvalue::Binary(BinaryOp::Div, Operand::Int(7), Operand::Int(2));

        assert_eq!(
            ConstantFoldingOptimizer::fold(&rvalue),
            Some(Operand::Float(3.5))
        );
    }

    #[test]
    fn leaves_division_by_zero_alone() {
        let rvalue = Rvalue::Binary(BinaryOp::Mod, Operand::Int(1), Operand::Int(0));

        assert_eq!(ConstantFoldingOptimizer::fold(&rvalue), None);
    }

    #[test]
    fn reassigned_temporaries_are_not_propagated() {
        let mut lines = vec![
            temp(1, Rvalue::Use(Operand::Int(0))),
            temp(1, Rvalue::Binary(BinaryOp::Add, Operand::Temp(1), Operand::Int(1))),
            Line::Active(Instr::Print(Operand::Temp(1))),
        ];
        let mut notes = Vec::new();

        ConstantFoldingOptimizer.optimize(&mut lines, &mut notes);

        assert!(notes.is_empty());
        assert_eq!(lines[2], Line::Active(Instr::Print(Operand::Temp(1))));
    }
}
