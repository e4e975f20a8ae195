//! Line-oriented heuristic passes over three-address code.
//!
//! Passes never delete lines. A removed instruction stays in place as a comment, so the
//! optimized listing lines up with the original one.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use common_subexpr::CommonSubexpressionOptimizer;
use constant_folding::ConstantFoldingOptimizer;
use copy_propagation::CopyPropagationOptimizer;
use dead_code::DeadCodeOptimizer;
use loop_invariant::LoopInvariantOptimizer;

use super::{Instr, Label, Operand, Place, Temp};

pub mod common_subexpr;
pub mod constant_folding;
pub mod copy_propagation;
pub mod dead_code;
pub mod loop_invariant;

pub trait Optimizer {
    fn pass(&self) -> Pass;

    fn optimize(&self, lines: &mut [Line], notes: &mut Vec<Note>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    ConstantFolding,
    CopyPropagation,
    CommonSubexpression,
    LoopInvariant,
    DeadCode,
}

impl Pass {
    /// Every pass, in the order they run.
    pub const ALL: [Pass; 5] = [
        Pass::ConstantFolding,
        Pass::CopyPropagation,
        Pass::CommonSubexpression,
        Pass::LoopInvariant,
        Pass::DeadCode,
    ];
}

impl Display for Pass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConstantFolding => "Constant folding",
            Self::CopyPropagation => "Copy propagation",
            Self::CommonSubexpression => "Common subexpression elimination",
            Self::LoopInvariant => "Loop optimization",
            Self::DeadCode => "Dead code elimination",
        };

        write!(f, "{name}")
    }
}

/// Which passes run. All of them by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerConfig {
    pub constant_folding: bool,
    pub copy_propagation: bool,
    pub common_subexpression: bool,
    pub loop_invariant: bool,
    pub dead_code: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            constant_folding: true,
            copy_propagation: true,
            common_subexpression: true,
            loop_invariant: true,
            dead_code: true,
        }
    }
}

impl OptimizerConfig {
    pub fn none() -> Self {
        Self {
            constant_folding: false,
            copy_propagation: false,
            common_subexpression: false,
            loop_invariant: false,
            dead_code: false,
        }
    }

    fn flag(&mut self, pass: Pass) -> &mut bool {
        match pass {
            Pass::ConstantFolding => &mut self.constant_folding,
            Pass::CopyPropagation => &mut self.copy_propagation,
            Pass::CommonSubexpression => &mut self.common_subexpression,
            Pass::LoopInvariant => &mut self.loop_invariant,
            Pass::DeadCode => &mut self.dead_code,
        }
    }

    pub fn enabled(&self, pass: Pass) -> bool {
        match pass {
            Pass::ConstantFolding => self.constant_folding,
            Pass::CopyPropagation => self.copy_propagation,
            Pass::CommonSubexpression => self.common_subexpression,
            Pass::LoopInvariant => self.loop_invariant,
            Pass::DeadCode => self.dead_code,
        }
    }

    pub fn enable(&mut self, pass: Pass) -> &mut Self {
        *self.flag(pass) = true;
        self
    }

    pub fn disable(&mut self, pass: Pass) -> &mut Self {
        *self.flag(pass) = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// Recomputes the value already held by the temporary.
    CommonSubexpression(Temp),
    DeadCode,
}

impl Display for Removal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommonSubexpression(temp) => {
                write!(f, "Common subexpression eliminated, reuses t{temp}")
            }
            Self::DeadCode => write!(f, "Dead code eliminated"),
        }
    }
}

/// One line of the optimized listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Active(Instr),
    /// Still executed, but computes the same value on every iteration of the loop that
    /// starts at the label.
    Hoistable(Instr, Label),
    Removed(Instr, Removal),
}

impl Line {
    /// The instruction, unless it was removed.
    pub fn instr(&self) -> Option<&Instr> {
        match self {
            Self::Active(instr) | Self::Hoistable(instr, _) => Some(instr),
            Self::Removed(..) => None,
        }
    }

    pub fn instr_mut(&mut self) -> Option<&mut Instr> {
        match self {
            Self::Active(instr) | Self::Hoistable(instr, _) => Some(instr),
            Self::Removed(..) => None,
        }
    }

    pub fn remove(&mut self, removal: Removal) {
        if let Self::Active(instr) | Self::Hoistable(instr, _) = self {
            *self = Self::Removed(instr.clone(), removal);
        }
    }
}

impl Display for Line {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active(instr) => write!(f, "{instr}"),
            Self::Hoistable(instr, label) => {
                write!(f, "{instr}  # Loop invariant, can move above L{label}")
            }
            Self::Removed(instr, removal) => write!(f, "# {instr}  # {removal}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub pass: Pass,
    pub message: String,
}

impl Note {
    pub fn new(pass: Pass, message: impl Into<String>) -> Self {
        Self {
            pass,
            message: message.into(),
        }
    }
}

impl Display for Note {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pass, self.message)
    }
}

/// How often each place is assigned among the lines still in the listing.
pub fn definitions(lines: &[Line]) -> HashMap<Place, usize> {
    let mut counts = HashMap::new();

    for place in lines.iter().filter_map(Line::instr).filter_map(Instr::defined) {
        *counts.entry(place.clone()).or_insert(0) += 1;
    }

    counts
}

pub fn is_single_def(definitions: &HashMap<Place, usize>, place: &Place) -> bool {
    definitions.get(place) == Some(&1)
}

/// Replaces reads of `place` on every line but `except`; returns how many lines changed.
pub fn substitute_all(
    lines: &mut [Line],
    except: usize,
    place: &Place,
    with: &Operand,
) -> usize {
    lines
        .iter_mut()
        .enumerate()
        .filter(|(i, _)| *i != except)
        .filter_map(|(_, line)| line.instr_mut())
        .map(|instr| instr.substitute(place, with))
        .filter(|changed| *changed)
        .count()
}

pub struct Optimization {
    optimizers: Vec<Box<dyn Optimizer>>,
}

impl Default for Optimization {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl Optimization {
    pub fn new(config: OptimizerConfig) -> Self {
        let optimizers: Vec<Box<dyn Optimizer>> = vec![
            Box::new(ConstantFoldingOptimizer),
            Box::new(CopyPropagationOptimizer),
            Box::new(CommonSubexpressionOptimizer),
            Box::new(LoopInvariantOptimizer),
            Box::new(DeadCodeOptimizer),
        ];

        Self {
            optimizers: optimizers
                .into_iter()
                .filter(|optimizer| config.enabled(optimizer.pass()))
                .collect(),
        }
    }

    pub fn optimize(&self, instructions: &[Instr]) -> Optimized {
        let mut lines: Vec<Line> = instructions.iter().cloned().map(Line::Active).collect();
        let mut notes = Vec::new();

        for optimizer in self.optimizers.iter() {
            optimizer.optimize(&mut lines, &mut notes);
        }

        Optimized { lines, notes }
    }
}

/// The result of one optimization run.
#[derive(Debug, Clone, Default)]
pub struct Optimized {
    pub lines: Vec<Line>,
    pub notes: Vec<Note>,
}

impl Optimized {
    /// The instructions that remain, hoistable ones included.
    pub fn instructions(&self) -> Vec<Instr> {
        self.lines.iter().filter_map(Line::instr).cloned().collect()
    }

    pub fn removed(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line, Line::Removed(..)))
            .count()
    }

    pub fn notes_for(&self, pass: Pass) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(move |note| note.pass == pass)
    }
}

impl Display for Optimized {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            writeln!(f, "{:3} | {line}", i + 1)?;
        }

        Ok(())
    }
}
