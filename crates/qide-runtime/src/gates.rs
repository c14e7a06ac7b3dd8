//! The gate placement API.

use qide_circuit::{CircuitError, Gate, GateKind};
use qide_engine::Unitary2x2;

use crate::error::{SessionError, SessionResult};
use crate::register::Register;
use crate::session::Session;

/// Gate placement on one register.
///
/// Offsets are register-local. Every call validates its operands before the
/// log or the engine is touched, then logs one record (and applies it in
/// immediate mode). Calls chain:
///
/// ```rust
/// use qide_runtime::{InitialState, Session};
///
/// let mut session = Session::new();
/// let q = session.declare_register("q", 2, InitialState::Value(0)).unwrap();
/// session.gates(q).hadamard(0, &[]).unwrap().cnot(1, 0).unwrap();
/// assert_eq!(session.log().len(), 2);
/// ```
pub struct Gates<'s> {
    session: &'s mut Session,
    register: Register,
}

impl Session {
    /// Place gates on `register`.
    pub fn gates(&mut self, register: Register) -> Gates<'_> {
        Gates {
            session: self,
            register,
        }
    }
}

impl Gates<'_> {
    /// The register gates are placed on.
    pub fn register(&self) -> Register {
        self.register
    }

    /// Hadamard.
    pub fn hadamard(&mut self, target: usize, controls: &[usize]) -> SessionResult<&mut Self> {
        self.place("hadamard", GateKind::Hadamard, target, controls)
    }

    /// Pauli-X. With one control this logs a CNot record, with more a
    /// Toffoli record.
    pub fn sigma_x(&mut self, target: usize, controls: &[usize]) -> SessionResult<&mut Self> {
        let kind = match controls.len() {
            0 => GateKind::SigmaX,
            1 => GateKind::CNot,
            _ => GateKind::Toffoli,
        };
        self.place("sigma_x", kind, target, controls)
    }

    /// Pauli-Y.
    pub fn sigma_y(&mut self, target: usize, controls: &[usize]) -> SessionResult<&mut Self> {
        self.place("sigma_y", GateKind::SigmaY, target, controls)
    }

    /// Pauli-Z.
    pub fn sigma_z(&mut self, target: usize, controls: &[usize]) -> SessionResult<&mut Self> {
        self.place("sigma_z", GateKind::SigmaZ, target, controls)
    }

    /// Square root of Pauli-X.
    pub fn sqrt_x(&mut self, target: usize, controls: &[usize]) -> SessionResult<&mut Self> {
        self.place("sqrt_x", GateKind::SqrtX, target, controls)
    }

    /// Rotation about X by `gamma`.
    pub fn rotate_x(
        &mut self,
        target: usize,
        gamma: f64,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        check_angle("rotate_x", gamma)?;
        self.place("rotate_x", GateKind::RotateX(gamma), target, controls)
    }

    /// Rotation about Y by `gamma`.
    pub fn rotate_y(
        &mut self,
        target: usize,
        gamma: f64,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        check_angle("rotate_y", gamma)?;
        self.place("rotate_y", GateKind::RotateY(gamma), target, controls)
    }

    /// Rotation about Z: phase `e^{iγ}` where the target (and every control) is set.
    pub fn rotate_z(
        &mut self,
        target: usize,
        gamma: f64,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        check_angle("rotate_z", gamma)?;
        self.place("rotate_z", GateKind::RotateZ(gamma), target, controls)
    }

    /// Phase `e^{iθ}` where the target (and every control) is set.
    pub fn phase_scale(
        &mut self,
        target: usize,
        theta: f64,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        check_angle("phase_scale", theta)?;
        self.place("phase_scale", GateKind::PhaseScale(theta), target, controls)
    }

    /// Phase `e^{iθ}` on the |1⟩ component.
    pub fn phase_kick(
        &mut self,
        target: usize,
        theta: f64,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        check_angle("phase_kick", theta)?;
        self.place("phase_kick", GateKind::PhaseKick(theta), target, controls)
    }

    /// Phase `e^{i·2π/2^distance}` on the |1⟩ component.
    pub fn cphase_shift(
        &mut self,
        target: usize,
        distance: u32,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        self.place("cphase_shift", GateKind::CPhaseShift(distance), target, controls)
    }

    /// Phase `e^{-i·2π/2^distance}` on the |1⟩ component.
    pub fn inverse_cphase_shift(
        &mut self,
        target: usize,
        distance: u32,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        self.place(
            "inverse_cphase_shift",
            GateKind::InvCPhaseShift(distance),
            target,
            controls,
        )
    }

    /// Controlled NOT.
    pub fn cnot(&mut self, target: usize, control: usize) -> SessionResult<&mut Self> {
        self.place("cnot", GateKind::CNot, target, &[control])
    }

    /// NOT gated on two or more controls.
    pub fn toffoli(&mut self, target: usize, controls: &[usize]) -> SessionResult<&mut Self> {
        if controls.len() < 2 {
            return Err(SessionError::InvalidParameter {
                method: "toffoli",
                parameter: "controls",
                reason: format!("needs at least two controls, got {}", controls.len()),
            });
        }
        self.place("toffoli", GateKind::Toffoli, target, controls)
    }

    /// Arbitrary single-qubit unitary.
    pub fn gate1(
        &mut self,
        target: usize,
        matrix: Unitary2x2,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        let epsilon = self.session.config.engine.epsilon;
        if !matrix.is_unitary(epsilon) {
            return Err(SessionError::InvalidParameter {
                method: "gate1",
                parameter: "matrix",
                reason: format!("not unitary within {epsilon}"),
            });
        }
        self.place("gate1", GateKind::Unitary(matrix), target, controls)
    }

    /// Measure the whole register as one record.
    pub fn measure(&mut self) -> SessionResult<&mut Self> {
        self.session.check_register(self.register)?;
        let Some(last) = self.register.range().last() else {
            return Err(self.out_of_range("measure", 0));
        };
        self.session
            .place(Gate::measure(self.register.offset(), last))?;
        Ok(self)
    }

    /// Measure one qubit.
    pub fn measure_qubit(&mut self, offset: usize) -> SessionResult<&mut Self> {
        let (target, _) = self.operands("measure_qubit", offset, &[])?;
        self.session.place(Gate::measure(target, target))?;
        Ok(self)
    }

    /// Apply composite `name` to the whole register.
    pub fn composite(&mut self, name: &str) -> SessionResult<&mut Self> {
        self.session.check_register(self.register)?;
        let definition = self
            .session
            .composites
            .get(name)
            .ok_or_else(|| CircuitError::UnknownComposite(name.to_string()))?;
        if definition.width() != self.register.width() {
            return Err(CircuitError::CompositeWidthMismatch {
                name: name.to_string(),
                expected: definition.width(),
                got: self.register.width(),
            }
            .into());
        }
        let gate = Gate::composite(name, self.register.offset(), self.register.width());
        self.session.place(gate)?;
        Ok(self)
    }

    fn place(
        &mut self,
        method: &'static str,
        kind: GateKind,
        target: usize,
        controls: &[usize],
    ) -> SessionResult<&mut Self> {
        let (target, controls) = self.operands(method, target, controls)?;
        self.session.place(Gate::new(kind, target, controls))?;
        Ok(self)
    }

    fn operands(
        &self,
        method: &'static str,
        target: usize,
        controls: &[usize],
    ) -> SessionResult<(usize, Vec<usize>)> {
        validate_operands(self.session, self.register, method, target, controls)
    }

    fn out_of_range(&self, method: &'static str, offset: usize) -> SessionError {
        SessionError::OffsetOutOfRange {
            method,
            register: self.session.registers.describe(self.register),
            offset,
            width: self.register.width(),
        }
    }
}

/// Check register-local operands and translate them to root offsets.
pub(crate) fn validate_operands(
    session: &Session,
    register: Register,
    method: &'static str,
    target: usize,
    controls: &[usize],
) -> SessionResult<(usize, Vec<usize>)> {
    session.check_register(register)?;
    let describe = || session.registers.describe(register);
    let mut seen = Vec::with_capacity(controls.len() + 1);
    for &offset in std::iter::once(&target).chain(controls) {
        if offset >= register.width() {
            return Err(SessionError::OffsetOutOfRange {
                method,
                register: describe(),
                offset,
                width: register.width(),
            });
        }
        if seen.contains(&offset) {
            return Err(SessionError::DuplicateQubit {
                method,
                register: describe(),
                offset,
            });
        }
        seen.push(offset);
    }
    let base = register.offset();
    Ok((base + target, controls.iter().map(|c| base + c).collect()))
}

fn check_angle(method: &'static str, angle: f64) -> SessionResult<()> {
    if angle.is_finite() {
        Ok(())
    } else {
        Err(SessionError::InvalidParameter {
            method,
            parameter: "angle",
            reason: format!("{angle} is not finite"),
        })
    }
}
