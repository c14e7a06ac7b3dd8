//! Forward and backward replay of the gate log.
//!
//! The evaluator position is the number of log steps the engine state
//! reflects: 0 means the engine holds only the declared registers' initial
//! states. Running a step forward dispatches each of its records to the
//! engine; running it backward dispatches their inverses.

use qide_circuit::{CircuitError, Gate, GateKind};
use qide_engine::{Unitary2x2, phase_shift_angle};
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

use crate::error::{SessionError, SessionResult};
use crate::extension::Argument;
use crate::session::Session;

impl Session {
    /// Number of steps the engine state reflects.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether every logged step has been applied.
    pub fn is_at_end(&self) -> bool {
        self.cursor >= self.log.len()
    }

    /// Run the next step forward, or the previous step backward.
    ///
    /// Returns `false` without touching the engine when there is no step in
    /// that direction.
    pub fn run_step(&mut self, backward: bool) -> SessionResult<bool> {
        if backward {
            let Some(index) = self.cursor.checked_sub(1) else {
                return Ok(false);
            };
            self.execute_step(index, true)?;
            self.cursor = index;
        } else {
            if self.is_at_end() {
                return Ok(false);
            }
            self.execute_step(self.cursor, false)?;
            self.cursor += 1;
        }
        debug!(cursor = self.cursor, backward, "Step transition");
        Ok(true)
    }

    /// Run the next step forward.
    pub fn step_forward(&mut self) -> SessionResult<bool> {
        self.run_step(false)
    }

    /// Undo the previous step.
    pub fn step_backward(&mut self) -> SessionResult<bool> {
        self.run_step(true)
    }

    /// Run every remaining step. Returns whether any gate was applied.
    pub fn run_to_end(&mut self) -> SessionResult<bool> {
        let mut changed = false;
        while !self.is_at_end() {
            let has_gates = self
                .log
                .step(self.cursor)
                .is_some_and(|step| !step.is_empty());
            self.run_step(false)?;
            changed |= has_gates;
        }
        Ok(changed)
    }

    /// Rebuild the engine from the declared registers' initial states and
    /// rewind to step 0.
    pub fn reset_engine(&mut self) -> SessionResult<()> {
        self.engine.reset();
        self.registers.prepare(&mut self.engine)?;
        self.cursor = 0;
        self.last_measurement = None;
        debug!(
            qubits = self.engine.num_qubits(),
            steps = self.log.len(),
            "Rebuilt engine"
        );
        Ok(())
    }

    /// Move the evaluator to `target`, replaying from the initial state
    /// when moving back.
    pub fn seek(&mut self, target: usize) -> SessionResult<()> {
        if target > self.log.len() {
            return Err(CircuitError::StepOutOfRange {
                step: target,
                len: self.log.len(),
            }
            .into());
        }
        if target < self.cursor {
            self.reset_engine()?;
        }
        while self.cursor < target {
            self.run_step(false)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn execute_step(&mut self, index: usize, backward: bool) -> SessionResult<()> {
        let gates: Vec<Gate> = self
            .log
            .step(index)
            .ok_or(CircuitError::StepOutOfRange {
                step: index,
                len: self.log.len(),
            })?
            .gates()
            .cloned()
            .collect();
        if backward && gates.iter().any(|gate| self.is_irreversible(gate)) {
            return Err(SessionError::IrreversibleStep { step: index });
        }
        for gate in &gates {
            self.apply_gate(gate, backward, index)?;
        }
        Ok(())
    }

    /// Whether a record contains a measurement, looking through composites.
    fn is_irreversible(&self, gate: &Gate) -> bool {
        match gate.kind() {
            GateKind::Measure => true,
            GateKind::Composite { name, .. } => self
                .composites
                .get(name)
                .is_some_and(|def| def.gates().iter().any(|g| self.is_irreversible(g))),
            _ => false,
        }
    }

    /// Dispatch one record to the engine, or its inverse when `backward`.
    pub(crate) fn apply_gate(&mut self, gate: &Gate, backward: bool, step: usize) -> SessionResult<()> {
        trace!(gate = gate.name(), qubit = gate.target(), backward, "Dispatching gate");
        match gate.kind() {
            GateKind::Empty => Ok(()),
            GateKind::Measure if backward => Err(SessionError::IrreversibleStep { step }),
            GateKind::Composite { name, wires } => {
                let mut gates = self.composites.expand(name, wires)?;
                if backward {
                    gates.reverse();
                }
                for constituent in &gates {
                    self.apply_gate(constituent, backward, step)?;
                }
                Ok(())
            }
            GateKind::Parametric { procedure, params } => {
                let args: Vec<Argument> = params.iter().map(Argument::from_param_value).collect();
                let Some(extension) = self.extensions.resolve(procedure, &args) else {
                    warn!(procedure = %procedure.name, "Unresolved procedure, skipping gate");
                    return Ok(());
                };
                let body = if backward {
                    extension.inverse().map(Arc::clone)
                } else {
                    Some(Arc::clone(extension.forward()))
                };
                let Some(body) = body else {
                    warn!(procedure = %procedure.name, "Procedure has no inverse, skipping gate");
                    return Ok(());
                };
                let args = extension.coerce(&args);
                let was_replaying = std::mem::replace(&mut self.replaying, true);
                let result = body(self, &args);
                self.replaying = was_replaying;
                result
            }
            _ if backward => match gate.inverse() {
                Some(inverse) => self.apply_primitive(&inverse),
                None => Err(SessionError::IrreversibleStep { step }),
            },
            _ => self.apply_primitive(gate),
        }
    }

    fn apply_primitive(&mut self, gate: &Gate) -> SessionResult<()> {
        let target = gate.target();
        let controls = gate.controls();
        let engine = &mut self.engine;
        match gate.kind() {
            GateKind::Hadamard => engine.apply_unitary(target, controls, &Unitary2x2::hadamard())?,
            GateKind::SigmaX | GateKind::CNot | GateKind::Toffoli => {
                engine.apply_controlled_not(target, controls)?;
            }
            GateKind::SigmaY => engine.apply_unitary(target, controls, &Unitary2x2::sigma_y())?,
            GateKind::SigmaZ => engine.apply_unitary(target, controls, &Unitary2x2::sigma_z())?,
            GateKind::SqrtX => engine.apply_unitary(target, controls, &Unitary2x2::sqrt_x())?,
            GateKind::RotateX(gamma) => {
                engine.apply_unitary(target, controls, &Unitary2x2::rotate_x(*gamma))?;
            }
            GateKind::RotateY(gamma) => {
                engine.apply_unitary(target, controls, &Unitary2x2::rotate_y(*gamma))?;
            }
            GateKind::RotateZ(angle) | GateKind::PhaseScale(angle) | GateKind::PhaseKick(angle) => {
                engine.apply_phase(target, controls, *angle)?;
            }
            GateKind::CPhaseShift(distance) => {
                engine.apply_phase(target, controls, phase_shift_angle(*distance))?;
            }
            GateKind::InvCPhaseShift(distance) => {
                engine.apply_phase(target, controls, -phase_shift_angle(*distance))?;
            }
            GateKind::Unitary(matrix) => engine.apply_unitary(target, controls, matrix)?,
            GateKind::Measure => {
                let value = engine.measure(gate.begin()..gate.end() + 1)?;
                self.last_measurement = Some(value);
            }
            GateKind::Empty | GateKind::Composite { .. } | GateKind::Parametric { .. } => {}
        }
        Ok(())
    }
}
