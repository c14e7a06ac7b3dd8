//! Two-call gate placement.
//!
//! Gates that need a user-supplied parameter (an angle, a phase distance, a
//! matrix, a composite or procedure arguments) are placed in two calls:
//! [`Session::begin_placement`] validates the operands and describes the
//! missing parameter, and [`Session::commit_placement`] places the gate once
//! the caller has obtained it. Dropping the pending placement cancels it;
//! nothing is logged or applied before the commit.

use qide_engine::Unitary2x2;
use std::fmt;

use crate::error::{SessionError, SessionResult};
use crate::extension::Argument;
use crate::gates::validate_operands;
use crate::register::Register;
use crate::session::Session;

/// The gate a placement will produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementKind {
    /// Hadamard.
    Hadamard,
    /// Pauli-X.
    SigmaX,
    /// Pauli-Y.
    SigmaY,
    /// Pauli-Z.
    SigmaZ,
    /// Square root of Pauli-X.
    SqrtX,
    /// X rotation.
    RotateX,
    /// Y rotation.
    RotateY,
    /// Z rotation (phase on |1⟩).
    RotateZ,
    /// Phase scale on |1⟩.
    PhaseScale,
    /// Phase on |1⟩.
    PhaseKick,
    /// Controlled phase shift.
    CPhaseShift,
    /// Inverse controlled phase shift.
    InverseCPhaseShift,
    /// Controlled NOT; exactly one control.
    CNot,
    /// Multi-controlled NOT.
    Toffoli,
    /// Arbitrary 2x2 unitary.
    Gate1,
    /// Whole-register measurement.
    Measure,
    /// A composite applied to the whole register.
    Composite,
    /// A registered procedure.
    Procedure(String),
}

impl PlacementKind {
    /// Name used in messages.
    pub fn name(&self) -> &str {
        match self {
            PlacementKind::Hadamard => "hadamard",
            PlacementKind::SigmaX => "sigma_x",
            PlacementKind::SigmaY => "sigma_y",
            PlacementKind::SigmaZ => "sigma_z",
            PlacementKind::SqrtX => "sqrt_x",
            PlacementKind::RotateX => "rotate_x",
            PlacementKind::RotateY => "rotate_y",
            PlacementKind::RotateZ => "rotate_z",
            PlacementKind::PhaseScale => "phase_scale",
            PlacementKind::PhaseKick => "phase_kick",
            PlacementKind::CPhaseShift => "cphase_shift",
            PlacementKind::InverseCPhaseShift => "inverse_cphase_shift",
            PlacementKind::CNot => "cnot",
            PlacementKind::Toffoli => "toffoli",
            PlacementKind::Gate1 => "gate1",
            PlacementKind::Measure => "measure",
            PlacementKind::Composite => "composite",
            PlacementKind::Procedure(name) => name,
        }
    }

    /// Whether the target offset is meaningful for this kind.
    fn has_target(&self) -> bool {
        !matches!(
            self,
            PlacementKind::Measure | PlacementKind::Composite | PlacementKind::Procedure(_)
        )
    }
}

/// The parameter a pending placement is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterRequest {
    /// Nothing; commit with [`ParameterValue::None`].
    None,
    /// An angle in radians.
    Angle,
    /// A phase-shift distance.
    Distance,
    /// A 2x2 unitary matrix.
    Matrix,
    /// A composite name; `candidates` lists the definitions that fit the
    /// register.
    CompositeName {
        /// Matching definitions, sorted.
        candidates: Vec<String>,
    },
    /// Procedure arguments.
    Arguments {
        /// Procedure name.
        procedure: String,
    },
}

impl fmt::Display for ParameterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterRequest::None => write!(f, "no parameter"),
            ParameterRequest::Angle => write!(f, "an angle"),
            ParameterRequest::Distance => write!(f, "a phase distance"),
            ParameterRequest::Matrix => write!(f, "a 2x2 matrix"),
            ParameterRequest::CompositeName { .. } => write!(f, "a composite name"),
            ParameterRequest::Arguments { procedure } => write!(f, "arguments for '{procedure}'"),
        }
    }
}

/// A parameter supplied at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// No parameter.
    None,
    /// An angle in radians.
    Angle(f64),
    /// A phase-shift distance.
    Distance(u32),
    /// A 2x2 unitary matrix.
    Matrix(Unitary2x2),
    /// A composite name.
    CompositeName(String),
    /// Procedure arguments.
    Arguments(Vec<Argument>),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::None => write!(f, "no parameter"),
            ParameterValue::Angle(a) => write!(f, "angle {a}"),
            ParameterValue::Distance(d) => write!(f, "distance {d}"),
            ParameterValue::Matrix(_) => write!(f, "a matrix"),
            ParameterValue::CompositeName(name) => write!(f, "composite '{name}'"),
            ParameterValue::Arguments(args) => write!(f, "{} argument(s)", args.len()),
        }
    }
}

/// A validated placement waiting for its parameter.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a pending placement does nothing until committed"]
pub struct PendingPlacement {
    register: Register,
    kind: PlacementKind,
    target: usize,
    controls: Vec<usize>,
    request: ParameterRequest,
}

impl PendingPlacement {
    /// The parameter the caller must supply.
    pub fn request(&self) -> &ParameterRequest {
        &self.request
    }

    /// The gate being placed.
    pub fn kind(&self) -> &PlacementKind {
        &self.kind
    }

    /// The register the gate is placed on.
    pub fn register(&self) -> Register {
        self.register
    }
}

impl Session {
    /// Validate a placement and describe the parameter it still needs.
    ///
    /// `target` and `controls` are register-local; `target` is ignored for
    /// measurements, composites and procedures.
    pub fn begin_placement(
        &self,
        register: Register,
        kind: PlacementKind,
        target: usize,
        controls: &[usize],
    ) -> SessionResult<PendingPlacement> {
        let method = "begin_placement";
        if kind.has_target() {
            validate_operands(self, register, method, target, controls)?;
        } else {
            self.check_register(register)?;
        }
        match (&kind, controls.len()) {
            (PlacementKind::CNot, 1) | (PlacementKind::Toffoli, 2..) => {}
            (PlacementKind::CNot | PlacementKind::Toffoli, got) => {
                return Err(SessionError::InvalidParameter {
                    method,
                    parameter: "controls",
                    reason: format!("{} cannot take {got} control(s)", kind.name()),
                });
            }
            _ => {}
        }

        let request = match &kind {
            PlacementKind::RotateX
            | PlacementKind::RotateY
            | PlacementKind::RotateZ
            | PlacementKind::PhaseScale
            | PlacementKind::PhaseKick => ParameterRequest::Angle,
            PlacementKind::CPhaseShift | PlacementKind::InverseCPhaseShift => {
                ParameterRequest::Distance
            }
            PlacementKind::Gate1 => ParameterRequest::Matrix,
            PlacementKind::Composite => ParameterRequest::CompositeName {
                candidates: self
                    .composites
                    .names()
                    .into_iter()
                    .filter(|name| {
                        self.composites
                            .get(name)
                            .is_some_and(|def| def.width() == register.width())
                    })
                    .map(str::to_string)
                    .collect(),
            },
            PlacementKind::Procedure(name) => {
                if !self.extensions.contains(name) {
                    return Err(SessionError::ExtensionNotFound {
                        name: name.clone(),
                        arguments: vec![],
                    });
                }
                ParameterRequest::Arguments {
                    procedure: name.clone(),
                }
            }
            _ => ParameterRequest::None,
        };

        Ok(PendingPlacement {
            register,
            kind,
            target,
            controls: controls.to_vec(),
            request,
        })
    }

    /// Place a pending gate with its parameter.
    pub fn commit_placement(
        &mut self,
        pending: PendingPlacement,
        value: ParameterValue,
    ) -> SessionResult<()> {
        let PendingPlacement {
            register,
            kind,
            target,
            controls,
            request,
        } = pending;
        let c = controls.as_slice();
        if let PlacementKind::Procedure(name) = &kind {
            return match value {
                ParameterValue::Arguments(args) => self.invoke(name, &args),
                value => Err(SessionError::ParameterMismatch {
                    gate: name.clone(),
                    expected: request.to_string(),
                    got: value.to_string(),
                }),
            };
        }

        let mut gates = self.gates(register);
        let placed = match (&kind, value) {
            (PlacementKind::Hadamard, ParameterValue::None) => gates.hadamard(target, c),
            (PlacementKind::SigmaX | PlacementKind::CNot, ParameterValue::None) => {
                gates.sigma_x(target, c)
            }
            (PlacementKind::SigmaY, ParameterValue::None) => gates.sigma_y(target, c),
            (PlacementKind::SigmaZ, ParameterValue::None) => gates.sigma_z(target, c),
            (PlacementKind::SqrtX, ParameterValue::None) => gates.sqrt_x(target, c),
            (PlacementKind::RotateX, ParameterValue::Angle(a)) => gates.rotate_x(target, a, c),
            (PlacementKind::RotateY, ParameterValue::Angle(a)) => gates.rotate_y(target, a, c),
            (PlacementKind::RotateZ, ParameterValue::Angle(a)) => gates.rotate_z(target, a, c),
            (PlacementKind::PhaseScale, ParameterValue::Angle(a)) => {
                gates.phase_scale(target, a, c)
            }
            (PlacementKind::PhaseKick, ParameterValue::Angle(a)) => gates.phase_kick(target, a, c),
            (PlacementKind::CPhaseShift, ParameterValue::Distance(d)) => {
                gates.cphase_shift(target, d, c)
            }
            (PlacementKind::InverseCPhaseShift, ParameterValue::Distance(d)) => {
                gates.inverse_cphase_shift(target, d, c)
            }
            (PlacementKind::Toffoli, ParameterValue::None) => gates.toffoli(target, c),
            (PlacementKind::Gate1, ParameterValue::Matrix(m)) => gates.gate1(target, m, c),
            (PlacementKind::Measure, ParameterValue::None) => gates.measure(),
            (PlacementKind::Composite, ParameterValue::CompositeName(name)) => {
                gates.composite(&name)
            }
            (kind, value) => Err(SessionError::ParameterMismatch {
                gate: kind.name().to_string(),
                expected: request.to_string(),
                got: value.to_string(),
            }),
        };
        placed.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::InitialState;

    #[test]
    fn test_begin_validates_offsets() {
        let mut session = Session::new();
        let q = session.declare_register("q", 2, InitialState::Value(0)).unwrap();
        assert!(
            session
                .begin_placement(q, PlacementKind::RotateX, 2, &[])
                .is_err()
        );
        assert!(
            session
                .begin_placement(q, PlacementKind::CNot, 1, &[])
                .is_err()
        );
    }

    #[test]
    fn test_request_matches_kind() {
        let mut session = Session::new();
        let q = session.declare_register("q", 1, InitialState::Value(0)).unwrap();
        let pending = session
            .begin_placement(q, PlacementKind::CPhaseShift, 0, &[])
            .unwrap();
        assert_eq!(pending.request(), &ParameterRequest::Distance);

        let pending = session
            .begin_placement(q, PlacementKind::Hadamard, 0, &[])
            .unwrap();
        assert_eq!(pending.request(), &ParameterRequest::None);
    }

    #[test]
    fn test_wrong_value_is_rejected_without_change() {
        let mut session = Session::new();
        let q = session.declare_register("q", 1, InitialState::Value(0)).unwrap();
        let pending = session
            .begin_placement(q, PlacementKind::RotateY, 0, &[])
            .unwrap();
        let result = session.commit_placement(pending, ParameterValue::Distance(2));
        assert!(matches!(result, Err(SessionError::ParameterMismatch { .. })));
        assert!(session.log().is_empty());
    }
}
