//! The ordered gate log.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use crate::error::{CircuitError, CircuitResult};
use crate::gate::Gate;
use crate::step::Step;

/// An ordered sequence of steps over a root register of fixed width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateLog {
    width: usize,
    steps: Vec<Step>,
    #[serde(default = "default_packing")]
    pack_steps: bool,
}

fn default_packing() -> bool {
    true
}

impl GateLog {
    /// Create an empty log over a root register of `width` qubits.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            steps: vec![],
            pack_steps: true,
        }
    }

    /// Choose whether pushed gates may join the last step.
    #[must_use]
    pub fn with_packing(mut self, pack_steps: bool) -> Self {
        self.pack_steps = pack_steps;
        self
    }

    /// Root register width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the log has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Get a step by index.
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Consume the log, returning its steps.
    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// Grow the root register by `count` qubits appended at the end.
    pub fn extend_width(&mut self, count: usize) -> CircuitResult<()> {
        let at = self.width;
        self.insert_qubits(at, count)
    }

    // =========================================================================
    // Gate placement
    // =========================================================================

    /// Append a gate, returning the index of the step that received it.
    ///
    /// With packing enabled the gate joins the last step when its span is
    /// free there; otherwise a new step is opened.
    pub fn push_gate(&mut self, gate: Gate) -> CircuitResult<usize> {
        self.check_span(&gate)?;
        if self.pack_steps {
            if let Some(last) = self.steps.last_mut() {
                if last.is_span_free(gate.begin(), gate.end()) {
                    last.set_gate(gate)?;
                    return Ok(self.steps.len() - 1);
                }
            }
        }
        let mut step = Step::new(self.width);
        step.set_gate(gate)?;
        self.steps.push(step);
        Ok(self.steps.len() - 1)
    }

    /// Replace whatever occupies the gate's span in `step`.
    pub fn set_gate(&mut self, step: usize, gate: Gate) -> CircuitResult<()> {
        self.check_span(&gate)?;
        let len = self.steps.len();
        self.steps
            .get_mut(step)
            .ok_or(CircuitError::StepOutOfRange { step, len })?
            .set_gate(gate)
    }

    /// Get the record at `(step, offset)`.
    pub fn gate_at(&self, step: usize, offset: usize) -> CircuitResult<&Gate> {
        let record = self.steps.get(step).ok_or(CircuitError::StepOutOfRange {
            step,
            len: self.steps.len(),
        })?;
        record.gate_at(offset).ok_or(CircuitError::OffsetOutOfRange {
            offset,
            width: self.width,
        })
    }

    // =========================================================================
    // Structural edits
    // =========================================================================

    /// Insert an empty step before `at`.
    pub fn insert_step(&mut self, at: usize) -> CircuitResult<()> {
        if at > self.steps.len() {
            return Err(CircuitError::StepOutOfRange {
                step: at,
                len: self.steps.len(),
            });
        }
        self.steps.insert(at, Step::new(self.width));
        Ok(())
    }

    /// Remove the step at `at`, returning it.
    pub fn remove_step(&mut self, at: usize) -> CircuitResult<Step> {
        if at >= self.steps.len() {
            return Err(CircuitError::StepOutOfRange {
                step: at,
                len: self.steps.len(),
            });
        }
        Ok(self.steps.remove(at))
    }

    /// Insert `count` qubits before root offset `at` in every step.
    ///
    /// Records after the insertion point move down; records whose span
    /// contains it widen.
    pub fn insert_qubits(&mut self, at: usize, count: usize) -> CircuitResult<()> {
        if at > self.width {
            return Err(CircuitError::OffsetOutOfRange {
                offset: at,
                width: self.width,
            });
        }
        debug!(at, count, steps = self.steps.len(), "Inserting qubits into gate log");
        self.steps = self
            .steps
            .iter()
            .map(|step| step.with_inserted_qubits(at, count))
            .collect::<CircuitResult<_>>()?;
        self.width += count;
        Ok(())
    }

    /// Delete the qubits `[at, at + count)` from every step.
    ///
    /// Records that lose a target, control or composite wire are dropped;
    /// measurements and register parameters narrow.
    pub fn remove_qubits(&mut self, at: usize, count: usize) -> CircuitResult<()> {
        if at + count > self.width {
            return Err(CircuitError::OffsetOutOfRange {
                offset: at + count.saturating_sub(1),
                width: self.width,
            });
        }
        debug!(at, count, steps = self.steps.len(), "Removing qubits from gate log");
        self.steps = self
            .steps
            .iter()
            .map(|step| step.with_removed_qubits(at, count))
            .collect::<CircuitResult<_>>()?;
        self.width -= count;
        Ok(())
    }

    /// Remove empty steps whose index lies in `range`, returning how many
    /// were removed.
    pub fn remove_empty_steps(&mut self, range: Range<usize>) -> usize {
        let before = self.steps.len();
        let mut index = 0;
        self.steps.retain(|step| {
            let keep = !range.contains(&index) || !step.is_empty();
            index += 1;
            keep
        });
        before - self.steps.len()
    }

    // =========================================================================
    // Selections
    // =========================================================================

    /// Collect the gates inside `steps` x `[begin, end]`, in execution order,
    /// rebased so that `begin` becomes offset 0.
    ///
    /// Fails when a record crosses the selection boundary or when the
    /// selection holds no gates.
    pub fn capture_selection(
        &self,
        steps: Range<usize>,
        begin: usize,
        end: usize,
    ) -> CircuitResult<Vec<Gate>> {
        self.check_selection(&steps, begin, end)?;
        let mut captured = vec![];
        for index in steps {
            for gate in self.steps[index].gates() {
                if gate.end() < begin || gate.begin() > end {
                    continue;
                }
                if gate.begin() < begin || gate.end() > end {
                    return Err(CircuitError::SelectionCutsGate {
                        gate: gate.name().to_string(),
                        step: index,
                        begin: gate.begin(),
                        end: gate.end(),
                    });
                }
                captured.push(gate.rebased(begin));
            }
        }
        if captured.is_empty() {
            return Err(CircuitError::EmptySelection);
        }
        Ok(captured)
    }

    /// Empty every record inside `steps` x `[begin, end]`.
    pub fn clear_selection(
        &mut self,
        steps: Range<usize>,
        begin: usize,
        end: usize,
    ) -> CircuitResult<()> {
        self.check_selection(&steps, begin, end)?;
        for step in &mut self.steps[steps] {
            step.clear_span(begin, end);
        }
        Ok(())
    }

    /// Replace the macro record at `(step, offset)` with `replacement`.
    ///
    /// The first replacement step is merged into `step`; the rest are
    /// inserted after it. Every replacement gate must stay inside the macro
    /// record's span. Returns the number of steps inserted.
    pub fn splice_replacement(
        &mut self,
        step: usize,
        offset: usize,
        replacement: Vec<Step>,
    ) -> CircuitResult<usize> {
        let (begin, end) = {
            let gate = self.gate_at(step, offset)?;
            (gate.begin(), gate.end())
        };
        for candidate in &replacement {
            if candidate.width() != self.width {
                return Err(CircuitError::StepWidthMismatch {
                    expected: self.width,
                    got: candidate.width(),
                });
            }
            if let Some(gate) = candidate
                .gates()
                .find(|g| g.begin() < begin || g.end() > end)
            {
                let offset = if gate.begin() < begin { gate.begin() } else { gate.end() };
                return Err(CircuitError::ReplacementOutsideSpan {
                    gate: gate.name().to_string(),
                    offset,
                    begin,
                    end,
                });
            }
        }

        self.steps[step].clear_span(begin, end);
        let mut replacement = replacement.into_iter().filter(|s| !s.is_empty());
        let Some(first) = replacement.next() else {
            return Ok(0);
        };
        for gate in first.gates() {
            self.steps[step].set_gate(gate.clone())?;
        }
        let mut inserted = 0;
        for extra in replacement {
            inserted += 1;
            self.steps.insert(step + inserted, extra);
        }
        debug!(step, inserted, "Spliced replacement into gate log");
        Ok(inserted)
    }

    /// Check the grid invariant on every step.
    pub fn validate(&self) -> CircuitResult<()> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.width() != self.width {
                return Err(CircuitError::StepWidthMismatch {
                    expected: self.width,
                    got: step.width(),
                });
            }
            step.validate(index)?;
        }
        Ok(())
    }

    fn check_span(&self, gate: &Gate) -> CircuitResult<()> {
        if gate.end() >= self.width {
            return Err(CircuitError::SpanOutOfRange {
                begin: gate.begin(),
                end: gate.end(),
                width: self.width,
            });
        }
        Ok(())
    }

    fn check_selection(&self, steps: &Range<usize>, begin: usize, end: usize) -> CircuitResult<()> {
        if steps.end > self.steps.len() || steps.start >= steps.end {
            return Err(CircuitError::StepOutOfRange {
                step: steps.end.saturating_sub(1),
                len: self.steps.len(),
            });
        }
        if begin > end || end >= self.width {
            return Err(CircuitError::SpanOutOfRange {
                begin,
                end,
                width: self.width,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateKind;

    fn h(target: usize) -> Gate {
        Gate::new(GateKind::Hadamard, target, vec![])
    }

    #[test]
    fn test_push_packs_into_last_step() {
        let mut log = GateLog::new(3);
        assert_eq!(log.push_gate(h(0)).unwrap(), 0);
        assert_eq!(log.push_gate(h(1)).unwrap(), 0);
        assert_eq!(log.push_gate(h(0)).unwrap(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_push_without_packing() {
        let mut log = GateLog::new(3).with_packing(false);
        log.push_gate(h(0)).unwrap();
        log.push_gate(h(1)).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_push_rejects_out_of_range() {
        let mut log = GateLog::new(2);
        assert!(matches!(
            log.push_gate(h(2)),
            Err(CircuitError::SpanOutOfRange { .. })
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn test_remove_empty_steps_in_range() {
        let mut log = GateLog::new(1).with_packing(false);
        log.push_gate(h(0)).unwrap();
        log.insert_step(1).unwrap();
        log.insert_step(0).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.remove_empty_steps(1..3), 1);
        assert_eq!(log.len(), 2);
        assert!(log.step(0).unwrap().is_empty());
    }

    #[test]
    fn test_splice_inserts_after_first() {
        let mut log = GateLog::new(2);
        log.push_gate(Gate::composite("bell", 0, 2)).unwrap();
        log.push_gate(h(1)).unwrap();

        let mut first = Step::new(2);
        first.set_gate(h(0)).unwrap();
        let mut second = Step::new(2);
        second.set_gate(Gate::new(GateKind::CNot, 1, vec![0])).unwrap();

        let inserted = log.splice_replacement(0, 0, vec![first, second]).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(log.len(), 3);
        assert_eq!(log.gate_at(0, 0).unwrap().name(), "h");
        assert_eq!(log.gate_at(1, 1).unwrap().name(), "cnot");
        assert_eq!(log.gate_at(2, 1).unwrap().name(), "h");
        log.validate().unwrap();
    }

    #[test]
    fn test_splice_rejects_gate_outside_span() {
        let mut log = GateLog::new(3);
        log.push_gate(Gate::composite("pair", 0, 2)).unwrap();
        let mut outside = Step::new(3);
        outside.set_gate(h(2)).unwrap();

        let result = log.splice_replacement(0, 1, vec![outside]);
        assert!(matches!(
            result,
            Err(CircuitError::ReplacementOutsideSpan { offset: 2, .. })
        ));
        assert_eq!(log.gate_at(0, 0).unwrap().name(), "pair");
    }
}
