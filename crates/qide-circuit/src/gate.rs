//! Gate records.

use qide_engine::Unitary2x2;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::error::{CircuitError, CircuitResult};

/// A model-space parameter of a parametric gate.
///
/// Register and qubit parameters hold root-register offsets so that
/// structural edits can shift them along with the rest of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// A contiguous span of the root register.
    Register {
        /// First root offset.
        begin: usize,
        /// Number of qubits.
        width: usize,
    },
    /// A single root offset.
    Qubit(usize),
    /// Integer argument.
    Int(i64),
    /// Floating-point argument.
    Float(f64),
    /// Boolean argument.
    Bool(bool),
}

impl ParamValue {
    /// Root offsets this parameter refers to.
    pub fn offsets(&self) -> Option<RangeInclusive<usize>> {
        match self {
            ParamValue::Register { begin, width } if *width > 0 => Some(*begin..=begin + width - 1),
            ParamValue::Qubit(offset) => Some(*offset..=*offset),
            _ => None,
        }
    }
}

/// Reference to the procedure behind a parametric gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureRef {
    /// Registered procedure name.
    pub name: String,
    /// Registry slot the procedure resolved to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ProcedureRef {
    /// Create a reference resolved to a registry slot.
    pub fn resolved(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }

    /// Create a reference that has not been resolved.
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }
}

/// The closed set of logged operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateKind {
    /// Placeholder for an unused qubit.
    Empty,
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
    /// X rotation by an angle.
    RotateX(f64),
    /// Y rotation by an angle.
    RotateY(f64),
    /// Z rotation: phase `e^{iγ}` on the |1⟩ component.
    RotateZ(f64),
    /// Phase `e^{iθ}` on the |1⟩ component.
    PhaseScale(f64),
    /// Phase `e^{iθ}` on the |1⟩ component.
    PhaseKick(f64),
    /// Phase `e^{i·2π/2^d}` on the |1⟩ component.
    CPhaseShift(u32),
    /// Phase `e^{-i·2π/2^d}` on the |1⟩ component.
    InvCPhaseShift(u32),
    /// Controlled NOT.
    CNot,
    /// Multi-controlled NOT.
    Toffoli,
    /// Arbitrary 2x2 unitary.
    Unitary(Unitary2x2),
    /// Measurement of every qubit in the span.
    Measure,
    /// A named fixed gate sequence.
    Composite {
        /// Composite definition name.
        name: String,
        /// Root offset of each definition wire, ascending. Qubits inserted
        /// inside the span later sit between wires and are left alone.
        wires: Vec<usize>,
    },
    /// A procedure-backed gate.
    Parametric {
        /// Backing procedure.
        procedure: ProcedureRef,
        /// Model-space parameters.
        params: Vec<ParamValue>,
    },
}

impl GateKind {
    /// Get the name of this gate kind.
    pub fn name(&self) -> &str {
        match self {
            GateKind::Empty => "empty",
            GateKind::Hadamard => "h",
            GateKind::SigmaX => "x",
            GateKind::SigmaY => "y",
            GateKind::SigmaZ => "z",
            GateKind::SqrtX => "sqrt_x",
            GateKind::RotateX(_) => "rx",
            GateKind::RotateY(_) => "ry",
            GateKind::RotateZ(_) => "rz",
            GateKind::PhaseScale(_) => "phase_scale",
            GateKind::PhaseKick(_) => "phase_kick",
            GateKind::CPhaseShift(_) => "cphase",
            GateKind::InvCPhaseShift(_) => "inv_cphase",
            GateKind::CNot => "cnot",
            GateKind::Toffoli => "toffoli",
            GateKind::Unitary(_) => "unitary",
            GateKind::Measure => "measure",
            GateKind::Composite { name, .. } => name,
            GateKind::Parametric { procedure, .. } => &procedure.name,
        }
    }

    /// Whether this kind expands into other gates.
    pub fn is_macro(&self) -> bool {
        matches!(self, GateKind::Composite { .. } | GateKind::Parametric { .. })
    }
}

/// An immutable record of one logged operation.
///
/// A record occupies the contiguous root span `[begin, end]`, which covers
/// its target, its controls and every qubit it acts on. Records are never
/// edited in place; structural edits produce new records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    kind: GateKind,
    target: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    controls: Vec<usize>,
    begin: usize,
    end: usize,
}

impl Gate {
    /// Create an empty placeholder at `offset`.
    pub fn empty(offset: usize) -> Self {
        Self {
            kind: GateKind::Empty,
            target: offset,
            controls: vec![],
            begin: offset,
            end: offset,
        }
    }

    /// Create a gate whose span is the smallest one covering target and controls.
    pub fn new(kind: GateKind, target: usize, controls: Vec<usize>) -> Self {
        let begin = controls.iter().copied().fold(target, usize::min);
        let end = controls.iter().copied().fold(target, usize::max);
        Self {
            kind,
            target,
            controls,
            begin,
            end,
        }
    }

    /// Create a gate with an explicit span.
    pub fn spanning(
        kind: GateKind,
        target: usize,
        controls: Vec<usize>,
        begin: usize,
        end: usize,
    ) -> CircuitResult<Self> {
        let gate = Self {
            kind,
            target,
            controls,
            begin,
            end,
        };
        if let Some(offset) = gate
            .operands()
            .find(|offset| !(begin..=end).contains(offset))
        {
            return Err(CircuitError::InvalidSpan {
                gate: gate.name().to_string(),
                begin,
                end,
                offset,
            });
        }
        Ok(gate)
    }

    /// Measurement of `[begin, end]`.
    pub fn measure(begin: usize, end: usize) -> Self {
        Self {
            kind: GateKind::Measure,
            target: begin,
            controls: vec![],
            begin,
            end: end.max(begin),
        }
    }

    /// Composite gate `name` applied to `width` qubits starting at `begin`.
    pub fn composite(name: impl Into<String>, begin: usize, width: usize) -> Self {
        Self::composite_on(name, (begin..begin + width.max(1)).collect())
    }

    /// Composite gate `name` with definition wire `i` on root offset `wires[i]`.
    ///
    /// `wires` must be ascending.
    pub fn composite_on(name: impl Into<String>, wires: Vec<usize>) -> Self {
        let begin = wires.first().copied().unwrap_or_default();
        let end = wires.last().copied().unwrap_or(begin);
        Self {
            kind: GateKind::Composite {
                name: name.into(),
                wires,
            },
            target: begin,
            controls: vec![],
            begin,
            end,
        }
    }

    /// Parametric gate spanning every register and qubit parameter.
    pub fn parametric(procedure: ProcedureRef, params: Vec<ParamValue>) -> CircuitResult<Self> {
        let (begin, end) = param_span(&params)
            .ok_or_else(|| CircuitError::NoQubitParameters(procedure.name.clone()))?;
        Ok(Self {
            kind: GateKind::Parametric { procedure, params },
            target: begin,
            controls: vec![],
            begin,
            end,
        })
    }

    /// Get the gate kind.
    pub fn kind(&self) -> &GateKind {
        &self.kind
    }

    /// Get the target offset.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Get the control offsets.
    pub fn controls(&self) -> &[usize] {
        &self.controls
    }

    /// The single control, when the gate has exactly one.
    pub fn control(&self) -> Option<usize> {
        match self.controls.as_slice() {
            [control] => Some(*control),
            _ => None,
        }
    }

    /// First offset of the span.
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Last offset of the span.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of offsets the span covers.
    pub fn width(&self) -> usize {
        self.end - self.begin + 1
    }

    /// The span as a range.
    pub fn span(&self) -> RangeInclusive<usize> {
        self.begin..=self.end
    }

    /// Get the name of this gate.
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Whether this is an empty placeholder.
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, GateKind::Empty)
    }

    /// Whether this gate expands into other gates.
    pub fn is_macro(&self) -> bool {
        self.kind.is_macro()
    }

    /// Whether this gate is a measurement.
    pub fn is_measure(&self) -> bool {
        matches!(self.kind, GateKind::Measure)
    }

    /// The inverse of a primitive gate.
    ///
    /// Returns `None` for measurement and for macro gates, which are
    /// inverted by expansion.
    pub fn inverse(&self) -> Option<Gate> {
        let kind = match &self.kind {
            GateKind::Empty
            | GateKind::Hadamard
            | GateKind::SigmaX
            | GateKind::SigmaY
            | GateKind::SigmaZ
            | GateKind::CNot
            | GateKind::Toffoli => self.kind.clone(),
            GateKind::SqrtX => GateKind::Unitary(Unitary2x2::sqrt_x().adjoint()),
            GateKind::RotateX(gamma) => GateKind::RotateX(-gamma),
            GateKind::RotateY(gamma) => GateKind::RotateY(-gamma),
            GateKind::RotateZ(gamma) => GateKind::RotateZ(-gamma),
            GateKind::PhaseScale(theta) => GateKind::PhaseScale(-theta),
            GateKind::PhaseKick(theta) => GateKind::PhaseKick(-theta),
            GateKind::CPhaseShift(dist) => GateKind::InvCPhaseShift(*dist),
            GateKind::InvCPhaseShift(dist) => GateKind::CPhaseShift(*dist),
            GateKind::Unitary(matrix) => GateKind::Unitary(matrix.adjoint()),
            GateKind::Measure | GateKind::Composite { .. } | GateKind::Parametric { .. } => {
                return None;
            }
        };
        Some(Gate {
            kind,
            ..self.clone()
        })
    }

    /// Root offsets the gate acts on.
    pub fn participants(&self) -> Vec<usize> {
        match &self.kind {
            GateKind::Empty => vec![],
            GateKind::Measure => self.span().collect(),
            GateKind::Composite { wires, .. } => wires.clone(),
            GateKind::Parametric { params, .. } => {
                let mut offsets: Vec<usize> =
                    params.iter().filter_map(ParamValue::offsets).flatten().collect();
                offsets.sort_unstable();
                offsets.dedup();
                offsets
            }
            _ => self.operands().collect(),
        }
    }

    /// Copy of the gate with offsets made relative to `origin`.
    ///
    /// Every offset of the gate must be at least `origin`.
    #[must_use]
    pub fn rebased(&self, origin: usize) -> Gate {
        self.map_offsets(|offset| offset - origin)
    }

    /// Place a capture-relative gate so that local offset `i` lands on
    /// `wires[i]`.
    ///
    /// A measured span that is no longer contiguous splits into one joint
    /// measurement per contiguous run. A register parameter must stay
    /// contiguous.
    pub fn onto_wires(&self, wires: &[usize]) -> CircuitResult<Vec<Gate>> {
        let wire = |offset: usize| {
            wires
                .get(offset)
                .copied()
                .ok_or(CircuitError::SpanOutOfRange {
                    begin: self.begin,
                    end: self.end,
                    width: wires.len(),
                })
        };
        match &self.kind {
            GateKind::Empty => Ok(vec![]),
            GateKind::Measure => {
                let mapped = self.span().map(wire).collect::<CircuitResult<Vec<_>>>()?;
                Ok(contiguous_runs(&mapped)
                    .into_iter()
                    .map(|(begin, end)| Gate::measure(begin, end))
                    .collect())
            }
            GateKind::Composite { name, wires: inner } => {
                let mapped = inner
                    .iter()
                    .map(|&offset| wire(offset))
                    .collect::<CircuitResult<Vec<_>>>()?;
                Ok(vec![Gate::composite_on(name.clone(), mapped)])
            }
            GateKind::Parametric { procedure, params } => {
                let mut mapped = Vec::with_capacity(params.len());
                for param in params {
                    mapped.push(match param {
                        ParamValue::Register { begin, width } if *width > 0 => {
                            let first = wire(*begin)?;
                            let last = wire(begin + width - 1)?;
                            if last + 1 - first != *width {
                                return Err(CircuitError::SplitRegister {
                                    gate: procedure.name.clone(),
                                    begin: first,
                                    end: last,
                                });
                            }
                            ParamValue::Register {
                                begin: first,
                                width: *width,
                            }
                        }
                        ParamValue::Qubit(offset) => ParamValue::Qubit(wire(*offset)?),
                        other => other.clone(),
                    });
                }
                Ok(vec![Gate::parametric(procedure.clone(), mapped)?])
            }
            _ => {
                let controls = self
                    .controls
                    .iter()
                    .map(|&control| wire(control))
                    .collect::<CircuitResult<Vec<_>>>()?;
                Ok(vec![Gate::new(self.kind.clone(), wire(self.target)?, controls)])
            }
        }
    }

    /// Copy of the gate after `count` qubits are inserted at root offset `at`.
    ///
    /// Offsets at or after `at` move down; a span or register parameter that
    /// strictly contains the insertion point widens. Composite wires move
    /// with their qubits, so the new qubits are not acted on.
    #[must_use]
    pub fn with_inserted_qubits(&self, at: usize, count: usize) -> Gate {
        let shift = |offset: usize| if offset >= at { offset + count } else { offset };
        let kind = match &self.kind {
            GateKind::Parametric { procedure, params } => GateKind::Parametric {
                procedure: procedure.clone(),
                params: params
                    .iter()
                    .map(|param| match param {
                        ParamValue::Register { begin, width } if *begin >= at => {
                            ParamValue::Register {
                                begin: begin + count,
                                width: *width,
                            }
                        }
                        ParamValue::Register { begin, width } if at < begin + width => {
                            ParamValue::Register {
                                begin: *begin,
                                width: width + count,
                            }
                        }
                        ParamValue::Qubit(offset) => ParamValue::Qubit(shift(*offset)),
                        other => other.clone(),
                    })
                    .collect(),
            },
            GateKind::Composite { name, wires } => GateKind::Composite {
                name: name.clone(),
                wires: wires.iter().copied().map(shift).collect(),
            },
            other => other.clone(),
        };
        let mut gate = Gate {
            kind,
            target: shift(self.target),
            controls: self.controls.iter().copied().map(shift).collect(),
            begin: shift(self.begin),
            end: shift(self.end),
        };
        gate.fit_parametric_span();
        gate
    }

    /// Copy of the gate after the qubits `[at, at + count)` are deleted.
    ///
    /// Returns `None` when the gate loses its target, a control, a qubit
    /// parameter or a composite wire. Measurements and register parameters
    /// narrow instead.
    #[must_use]
    pub fn with_removed_qubits(&self, at: usize, count: usize) -> Option<Gate> {
        let removed = at..at + count;
        let shift = |offset: usize| if offset >= removed.end { offset - count } else { offset };

        match &self.kind {
            GateKind::Empty => None,
            GateKind::Measure => {
                let surviving: Vec<usize> = self
                    .span()
                    .filter(|offset| !removed.contains(offset))
                    .map(shift)
                    .collect();
                let (&begin, &end) = (surviving.first()?, surviving.last()?);
                Some(Gate::measure(begin, end))
            }
            GateKind::Composite { name, wires } => {
                if wires.iter().any(|offset| removed.contains(offset)) {
                    None
                } else {
                    Some(Gate::composite_on(
                        name.clone(),
                        wires.iter().copied().map(shift).collect(),
                    ))
                }
            }
            GateKind::Parametric { procedure, params } => {
                let mut narrowed = Vec::with_capacity(params.len());
                for param in params {
                    narrowed.push(match param {
                        ParamValue::Register { begin, width } => {
                            let overlap = (*begin..begin + width)
                                .filter(|offset| removed.contains(offset))
                                .count();
                            if overlap == *width {
                                return None;
                            }
                            let new_begin = if *begin >= removed.end {
                                begin - count
                            } else if *begin >= at {
                                at
                            } else {
                                *begin
                            };
                            ParamValue::Register {
                                begin: new_begin,
                                width: width - overlap,
                            }
                        }
                        ParamValue::Qubit(offset) if removed.contains(offset) => return None,
                        ParamValue::Qubit(offset) => ParamValue::Qubit(shift(*offset)),
                        other => other.clone(),
                    });
                }
                Gate::parametric(procedure.clone(), narrowed).ok()
            }
            _ => {
                if self.operands().any(|offset| removed.contains(&offset)) {
                    None
                } else {
                    Some(Gate::new(
                        self.kind.clone(),
                        shift(self.target),
                        self.controls.iter().copied().map(shift).collect(),
                    ))
                }
            }
        }
    }

    fn operands(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.target).chain(self.controls.iter().copied())
    }

    fn map_offsets(&self, f: impl Fn(usize) -> usize) -> Gate {
        let kind = match &self.kind {
            GateKind::Parametric { procedure, params } => GateKind::Parametric {
                procedure: procedure.clone(),
                params: params
                    .iter()
                    .map(|param| match param {
                        ParamValue::Register { begin, width } => ParamValue::Register {
                            begin: f(*begin),
                            width: *width,
                        },
                        ParamValue::Qubit(offset) => ParamValue::Qubit(f(*offset)),
                        other => other.clone(),
                    })
                    .collect(),
            },
            GateKind::Composite { name, wires } => GateKind::Composite {
                name: name.clone(),
                wires: wires.iter().copied().map(&f).collect(),
            },
            other => other.clone(),
        };
        Gate {
            kind,
            target: f(self.target),
            controls: self.controls.iter().copied().map(&f).collect(),
            begin: f(self.begin),
            end: f(self.end),
        }
    }

    fn fit_parametric_span(&mut self) {
        if let GateKind::Parametric { params, .. } = &self.kind {
            if let Some((begin, end)) = param_span(params) {
                self.begin = begin;
                self.end = end;
                self.target = begin;
            }
        }
    }
}

/// Split ascending offsets into `(first, last)` runs of consecutive values.
fn contiguous_runs(offsets: &[usize]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &offset in offsets {
        match runs.last_mut() {
            Some((_, last)) if *last + 1 == offset => *last = offset,
            _ => runs.push((offset, offset)),
        }
    }
    runs
}

fn param_span(params: &[ParamValue]) -> Option<(usize, usize)> {
    params
        .iter()
        .filter_map(ParamValue::offsets)
        .fold(None, |span, range| match span {
            None => Some((*range.start(), *range.end())),
            Some((begin, end)) => Some((begin.min(*range.start()), end.max(*range.end()))),
        })
}
