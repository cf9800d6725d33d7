//! Mutation strategies over decoded functions.
//!
//! Each strategy walks an [`ExecutableUnit`] and lazily yields one mutant at
//! a time. The working copy is restored right after each mutant is built, so
//! every yielded mutant differs from the original in exactly one place.

use crate::code::Function;
use crate::instruction::{CompareOp, Opcode};
use crate::unit::ExecutableUnit;
use mutant_core::{MutationConfig, StrategyKind, Value};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::mem;
use tracing::debug;

/// A built mutant and a short description of the change
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub function: Function,
    pub description: String,
}

pub struct Mutator {
    config: MutationConfig,
}

impl Mutator {
    pub fn new(config: MutationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Lazily generate the mutants of `unit` for one strategy
    pub fn mutants<'r>(
        &self,
        kind: StrategyKind,
        unit: ExecutableUnit,
        rng: &'r mut ChaCha8Rng,
    ) -> Mutants<'r> {
        debug!(
            function = unit.name(),
            strategy = %kind,
            instructions = unit.instructions.len(),
            literals = unit.consts.len(),
            "generating mutants"
        );
        match kind {
            StrategyKind::Comparison => Mutants::Comparison(ComparisonMutants::new(unit)),
            StrategyKind::Constant => Mutants::Constant(ConstantMutants::new(
                unit,
                rng,
                self.config.random_range.max(1),
            )),
            StrategyKind::Branch => Mutants::Branch(BranchMutants::new(unit)),
        }
    }
}

/// Mutant stream for one of the fixed strategies
pub enum Mutants<'r> {
    Comparison(ComparisonMutants),
    Constant(ConstantMutants<'r>),
    Branch(BranchMutants),
}

impl Iterator for Mutants<'_> {
    type Item = MutationRecord;

    fn next(&mut self) -> Option<MutationRecord> {
        match self {
            Mutants::Comparison(m) => m.next(),
            Mutants::Constant(m) => m.next(),
            Mutants::Branch(m) => m.next(),
        }
    }
}

/// Swaps the operator of every `COMPARE_OP` for each other real operator
pub struct ComparisonMutants {
    unit: ExecutableUnit,
    index: usize,
    candidate: usize,
}

impl ComparisonMutants {
    pub fn new(unit: ExecutableUnit) -> Self {
        Self {
            unit,
            index: 0,
            candidate: 0,
        }
    }
}

impl Iterator for ComparisonMutants {
    type Item = MutationRecord;

    fn next(&mut self) -> Option<MutationRecord> {
        while self.index < self.unit.instructions.len() {
            let original = self.unit.instructions[self.index];
            let current = if original.is(Opcode::CompareOp) {
                CompareOp::from_index(original.arg())
            } else {
                None
            };

            if let Some(current) = current {
                while self.candidate < CompareOp::TABLE.len() {
                    let replacement = CompareOp::TABLE[self.candidate];
                    self.candidate += 1;
                    if replacement == current || replacement.is_sentinel() {
                        continue;
                    }

                    self.unit.instructions[self.index].operand = Some(replacement.index());
                    let function = self.unit.build();
                    self.unit.instructions[self.index] = original;

                    return Some(MutationRecord {
                        function,
                        description: format!("changed {} to {}", current, replacement),
                    });
                }
            }

            self.index += 1;
            self.candidate = 0;
        }
        None
    }
}

/// Replaces literals with `None`, nudged integers and trimmed strings
pub struct ConstantMutants<'r> {
    unit: ExecutableUnit,
    rng: &'r mut ChaCha8Rng,
    range: i64,
    /// Next literal to plan
    cursor: usize,
    pending: VecDeque<(Value, String)>,
}

impl<'r> ConstantMutants<'r> {
    pub fn new(unit: ExecutableUnit, rng: &'r mut ChaCha8Rng, range: i64) -> Self {
        Self {
            unit,
            rng,
            range,
            cursor: 0,
            pending: VecDeque::new(),
        }
    }

    fn plan(&mut self, value: &Value) -> VecDeque<(Value, String)> {
        let mut plan = VecDeque::new();

        if !value.is_none() {
            plan.push_back((Value::None, format!("replaced {} with None", value)));
        }

        match value {
            Value::Int(v) => {
                let v = *v;
                plan.push_back((Value::Int(v.wrapping_add(1)), format!("added 1 to {}", v)));
                plan.push_back((
                    Value::Int(v.wrapping_sub(1)),
                    format!("subtracted 1 from {}", v),
                ));

                let mut r = self.rng.gen_range(-self.range..=self.range);
                while r == v {
                    r = self.rng.gen_range(-self.range..=self.range);
                }
                plan.push_back((Value::Int(r), format!("replaced {} with {}", v, r)));
            }
            Value::Str(s) if s.is_empty() => {
                plan.push_back((
                    Value::Str("a".to_string()),
                    "replaced empty string with 'a'".to_string(),
                ));
            }
            Value::Str(s) => {
                let mut without_last = s.clone();
                without_last.pop();
                plan.push_back((
                    Value::Str(String::new()),
                    format!("replaced '{}' with empty string", s),
                ));
                plan.push_back((
                    Value::Str(s.chars().skip(1).collect()),
                    format!("dropped first character of '{}'", s),
                ));
                plan.push_back((
                    Value::Str(without_last),
                    format!("dropped last character of '{}'", s),
                ));
            }
            _ => {}
        }

        plan
    }
}

impl Iterator for ConstantMutants<'_> {
    type Item = MutationRecord;

    fn next(&mut self) -> Option<MutationRecord> {
        loop {
            if let Some((replacement, description)) = self.pending.pop_front() {
                let slot = self.cursor - 1;
                let original = mem::replace(&mut self.unit.consts[slot], replacement);
                let function = self.unit.build();
                self.unit.consts[slot] = original;
                return Some(MutationRecord {
                    function,
                    description,
                });
            }

            if self.cursor >= self.unit.consts.len() {
                return None;
            }
            let value = self.unit.consts[self.cursor].clone();
            self.pending = self.plan(&value);
            self.cursor += 1;
        }
    }
}

/// Flips each conditional jump to the jump on the opposite condition
pub struct BranchMutants {
    unit: ExecutableUnit,
    index: usize,
}

impl BranchMutants {
    pub fn new(unit: ExecutableUnit) -> Self {
        Self { unit, index: 0 }
    }
}

impl Iterator for BranchMutants {
    type Item = MutationRecord;

    fn next(&mut self) -> Option<MutationRecord> {
        while self.index < self.unit.instructions.len() {
            let original = self.unit.instructions[self.index];
            self.index += 1;

            let Some(negated) = original.op().and_then(Opcode::negated_jump) else {
                continue;
            };

            let i = self.index - 1;
            self.unit.instructions[i].opcode = negated.byte();
            let function = self.unit.build();
            self.unit.instructions[i] = original;

            return Some(MutationRecord {
                function,
                description: format!("negated jump on line {}", original.line),
            });
        }
        None
    }
}
