//! Error types for the circuit crate.

use qide_engine::EngineError;
use thiserror::Error;

/// Errors that can occur while editing the gate log.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CircuitError {
    /// A gate span does not fit the root register.
    #[error("Gate span [{begin}, {end}] exceeds {width}-qubit root register")]
    SpanOutOfRange {
        /// First offset of the span.
        begin: usize,
        /// Last offset of the span.
        end: usize,
        /// Root register width.
        width: usize,
    },

    /// A gate's span does not cover its operands.
    #[error("Gate '{gate}' span [{begin}, {end}] does not cover offset {offset}")]
    InvalidSpan {
        /// Gate name.
        gate: String,
        /// First offset of the span.
        begin: usize,
        /// Last offset of the span.
        end: usize,
        /// Operand outside the span.
        offset: usize,
    },

    /// Step index outside the log.
    #[error("Step {step} out of range (log has {len} steps)")]
    StepOutOfRange {
        /// Requested step.
        step: usize,
        /// Number of steps.
        len: usize,
    },

    /// Qubit offset outside the root register.
    #[error("Offset {offset} out of range for {width}-qubit root register")]
    OffsetOutOfRange {
        /// Requested offset.
        offset: usize,
        /// Root register width.
        width: usize,
    },

    /// A selection boundary cuts through a multi-qubit gate.
    #[error("Selection cuts gate '{gate}' at step {step} (span [{begin}, {end}])")]
    SelectionCutsGate {
        /// Gate name.
        gate: String,
        /// Step holding the gate.
        step: usize,
        /// First offset of the gate.
        begin: usize,
        /// Last offset of the gate.
        end: usize,
    },

    /// The selection holds no gates.
    #[error("Selection contains no gates")]
    EmptySelection,

    /// A composite with this name already exists.
    #[error("Composite gate '{0}' is already defined")]
    DuplicateComposite(String),

    /// No composite with this name exists.
    #[error("Composite gate '{0}' is not defined")]
    UnknownComposite(String),

    /// A composite was placed on a register of the wrong width.
    #[error("Composite gate '{name}' acts on {expected} qubits, target register has {got}")]
    CompositeWidthMismatch {
        /// Composite name.
        name: String,
        /// Width of the definition.
        expected: usize,
        /// Width of the target register.
        got: usize,
    },

    /// A parametric gate was built without any register or qubit parameter.
    #[error("Parametric gate '{0}' has no register or qubit parameter")]
    NoQubitParameters(String),

    /// A decomposition produced a gate outside the macro gate's span.
    #[error("Replacement gate '{gate}' at offset {offset} lies outside span [{begin}, {end}]")]
    ReplacementOutsideSpan {
        /// Gate name.
        gate: String,
        /// Offending offset.
        offset: usize,
        /// First offset of the allowed span.
        begin: usize,
        /// Last offset of the allowed span.
        end: usize,
    },

    /// A register parameter would be split by qubits inserted inside a composite.
    #[error("Register parameter of '{gate}' no longer contiguous on wires [{begin}, {end}]")]
    SplitRegister {
        /// Gate name.
        gate: String,
        /// First wire of the parameter.
        begin: usize,
        /// Last wire of the parameter.
        end: usize,
    },

    /// A replacement step has a different width than the log.
    #[error("Step width {got} does not match log width {expected}")]
    StepWidthMismatch {
        /// Log width.
        expected: usize,
        /// Width of the offending step.
        got: usize,
    },

    /// The per-offset grid invariant does not hold.
    #[error("Step {step} violates the grid invariant: {message}")]
    InvariantViolation {
        /// Offending step.
        step: usize,
        /// Description of the violation.
        message: String,
    },

    /// Error raised by the amplitude engine.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result type for circuit operations.
pub type CircuitResult<T> = Result<T, CircuitError>;
