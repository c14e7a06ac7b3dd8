//! A single circuit column.

use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, CircuitResult};
use crate::gate::Gate;

/// One column of the circuit: exactly one record per root offset.
///
/// Records live in a per-step arena; each offset stores the index of the
/// record that owns it, so a multi-qubit gate is shared by every offset of
/// its span rather than duplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    records: Vec<Gate>,
    slots: Vec<usize>,
}

impl Step {
    /// Create a step of `width` empty placeholders.
    pub fn new(width: usize) -> Self {
        Self {
            records: (0..width).map(Gate::empty).collect(),
            slots: (0..width).collect(),
        }
    }

    /// Number of root offsets this step covers.
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Get the record owning `offset`.
    pub fn gate_at(&self, offset: usize) -> Option<&Gate> {
        self.slots.get(offset).map(|&id| &self.records[id])
    }

    /// Arena index of the record owning `offset`.
    pub fn record_id(&self, offset: usize) -> Option<usize> {
        self.slots.get(offset).copied()
    }

    /// Iterate the non-empty records in offset order, each once.
    pub fn gates(&self) -> StepGates<'_> {
        StepGates {
            step: self,
            offset: 0,
        }
    }

    /// Whether every offset holds an empty placeholder.
    pub fn is_empty(&self) -> bool {
        self.records.iter().all(Gate::is_empty)
    }

    /// Whether every offset in `[begin, end]` is empty.
    pub fn is_span_free(&self, begin: usize, end: usize) -> bool {
        end < self.width()
            && (begin..=end).all(|offset| self.gate_at(offset).is_some_and(Gate::is_empty))
    }

    /// Whether any record in this step is a measurement, directly.
    pub fn has_measure(&self) -> bool {
        self.gates().any(Gate::is_measure)
    }

    /// Place `gate` at its span, replacing whatever occupies it.
    ///
    /// Records that overlap the span only partially are removed entirely
    /// and their remaining offsets become empty.
    pub fn set_gate(&mut self, gate: Gate) -> CircuitResult<()> {
        let width = self.width();
        if gate.end() >= width {
            return Err(CircuitError::SpanOutOfRange {
                begin: gate.begin(),
                end: gate.end(),
                width,
            });
        }
        let (begin, end) = (gate.begin(), gate.end());
        self.clear_span(begin, end);
        if gate.is_empty() {
            return Ok(());
        }
        let id = self.records.len();
        self.records.push(gate);
        for slot in &mut self.slots[begin..=end] {
            *slot = id;
        }
        self.compact();
        Ok(())
    }

    /// Empty every record overlapping `[begin, end]`, including the parts
    /// of those records outside the span.
    pub fn clear_span(&mut self, begin: usize, end: usize) {
        let end = end.min(self.width().saturating_sub(1));
        let mut offset = begin;
        while offset <= end && offset < self.width() {
            let id = self.slots[offset];
            let (gate_begin, gate_end) = (self.records[id].begin(), self.records[id].end());
            if !self.records[id].is_empty() {
                for o in gate_begin..=gate_end {
                    self.records.push(Gate::empty(o));
                    self.slots[o] = self.records.len() - 1;
                }
            }
            offset = gate_end.max(offset) + 1;
        }
        self.compact();
    }

    /// Drop unreferenced arena entries.
    pub fn compact(&mut self) {
        let mut remap = vec![usize::MAX; self.records.len()];
        let mut records = Vec::with_capacity(self.width());
        for slot in &mut self.slots {
            if remap[*slot] == usize::MAX {
                remap[*slot] = records.len();
                records.push(self.records[*slot].clone());
            }
            *slot = remap[*slot];
        }
        self.records = records;
    }

    /// Copy of this step after `count` qubits are inserted at `at`.
    pub fn with_inserted_qubits(&self, at: usize, count: usize) -> CircuitResult<Step> {
        let mut step = Step::new(self.width() + count);
        for gate in self.gates() {
            step.set_gate(gate.with_inserted_qubits(at, count))?;
        }
        Ok(step)
    }

    /// Copy of this step after the qubits `[at, at + count)` are deleted.
    pub fn with_removed_qubits(&self, at: usize, count: usize) -> CircuitResult<Step> {
        let mut step = Step::new(self.width().saturating_sub(count));
        for gate in self.gates() {
            if let Some(gate) = gate.with_removed_qubits(at, count) {
                step.set_gate(gate)?;
            }
        }
        Ok(step)
    }

    /// Check the grid invariant, reporting violations against `index`.
    pub fn validate(&self, index: usize) -> CircuitResult<()> {
        let violation = |message: String| CircuitError::InvariantViolation {
            step: index,
            message,
        };
        for (offset, &id) in self.slots.iter().enumerate() {
            let gate = self
                .records
                .get(id)
                .ok_or_else(|| violation(format!("offset {offset} points past the arena")))?;
            if !gate.span().contains(&offset) {
                return Err(violation(format!(
                    "offset {offset} owned by '{}' spanning [{}, {}]",
                    gate.name(),
                    gate.begin(),
                    gate.end()
                )));
            }
        }
        for (id, gate) in self.records.iter().enumerate() {
            if gate.end() >= self.width() {
                return Err(violation(format!("'{}' extends past the step", gate.name())));
            }
            if let Some(offset) = gate.span().find(|&o| self.slots[o] != id) {
                return Err(violation(format!(
                    "'{}' does not own offset {offset} of its span",
                    gate.name()
                )));
            }
            if let Some(offset) = gate
                .participants()
                .into_iter()
                .find(|o| !gate.span().contains(o))
            {
                return Err(violation(format!(
                    "'{}' acts on offset {offset} outside its span",
                    gate.name()
                )));
            }
        }
        Ok(())
    }
}

/// Iterator over the distinct non-empty records of a [`Step`].
///
/// Each record is visited at its first offset; iteration then continues
/// after its last offset.
pub struct StepGates<'a> {
    step: &'a Step,
    offset: usize,
}

impl<'a> Iterator for StepGates<'a> {
    type Item = &'a Gate;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(gate) = self.step.gate_at(self.offset) {
            self.offset = gate.end().max(self.offset) + 1;
            if !gate.is_empty() {
                return Some(gate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateKind;

    #[test]
    fn test_new_step_is_empty() {
        let step = Step::new(3);
        assert_eq!(step.width(), 3);
        assert!(step.is_empty());
        assert_eq!(step.gates().count(), 0);
        step.validate(0).unwrap();
    }

    #[test]
    fn test_multi_qubit_record_shared() {
        let mut step = Step::new(4);
        step.set_gate(Gate::new(GateKind::CNot, 3, vec![1])).unwrap();

        let ids: Vec<_> = (1..=3).map(|o| step.record_id(o).unwrap()).collect();
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert!(step.gate_at(0).unwrap().is_empty());
        assert_eq!(step.gates().count(), 1);
        step.validate(0).unwrap();
    }

    #[test]
    fn test_set_gate_clears_overlapping_record() {
        let mut step = Step::new(4);
        step.set_gate(Gate::new(GateKind::CNot, 2, vec![0])).unwrap();
        step.set_gate(Gate::new(GateKind::Hadamard, 2, vec![])).unwrap();

        let names: Vec<_> = step.gates().map(Gate::name).collect();
        assert_eq!(names, vec!["h"]);
        assert!(step.gate_at(0).unwrap().is_empty());
        assert!(step.gate_at(1).unwrap().is_empty());
        step.validate(0).unwrap();
    }

    #[test]
    fn test_set_gate_out_of_range() {
        let mut step = Step::new(2);
        let result = step.set_gate(Gate::new(GateKind::Hadamard, 2, vec![]));
        assert!(matches!(result, Err(CircuitError::SpanOutOfRange { .. })));
    }

    #[test]
    fn test_span_free() {
        let mut step = Step::new(3);
        step.set_gate(Gate::new(GateKind::SigmaZ, 1, vec![])).unwrap();
        assert!(step.is_span_free(0, 0));
        assert!(!step.is_span_free(0, 1));
        assert!(!step.is_span_free(2, 3));
    }

    #[test]
    fn test_insert_and_remove_qubits() {
        let mut step = Step::new(3);
        step.set_gate(Gate::new(GateKind::CNot, 2, vec![0])).unwrap();

        let wider = step.with_inserted_qubits(1, 2).unwrap();
        assert_eq!(wider.width(), 5);
        assert_eq!(wider.gate_at(4).unwrap().span(), 0..=4);
        wider.validate(0).unwrap();

        let narrower = step.with_removed_qubits(0, 1).unwrap();
        assert_eq!(narrower.width(), 2);
        assert!(narrower.is_empty());
    }
}
