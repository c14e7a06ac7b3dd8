//! Error types for the engine crate.

use thiserror::Error;

/// Errors raised by the amplitude engine.
///
/// Every variant is produced before the amplitude map is touched, so a
/// failed call leaves the state exactly as it was.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// A root-register offset lies outside the current register width.
    #[error("Offset {offset} out of range for {width}-qubit root register (operation: {operation})")]
    OffsetOutOfRange {
        /// The offending offset.
        offset: usize,
        /// Width of the root register.
        width: usize,
        /// Engine operation that rejected the offset.
        operation: &'static str,
    },

    /// The same qubit appears twice among target and controls.
    #[error("Qubit {offset} used more than once (operation: {operation})")]
    DuplicateQubit {
        /// The repeated offset.
        offset: usize,
        /// Engine operation that rejected the operands.
        operation: &'static str,
    },

    /// A 2x2 matrix failed the unitarity check.
    #[error("Matrix is not unitary within tolerance {epsilon}")]
    NonUnitary {
        /// Tolerance used for the check.
        epsilon: f64,
    },

    /// A register width cannot be accommodated.
    #[error("Register width {width} is invalid: {reason}")]
    InvalidWidth {
        /// Requested width.
        width: usize,
        /// Why it was rejected.
        reason: String,
    },

    /// A basis index does not fit the register it was given for.
    #[error("Basis index {index} does not fit a {width}-qubit register")]
    IndexOutOfRange {
        /// The basis index.
        index: u64,
        /// Register width.
        width: usize,
    },

    /// Initial amplitudes do not describe a normalized state.
    #[error("Initial amplitudes are not normalized (norm² = {norm_sqr})")]
    NotNormalized {
        /// Sum of squared magnitudes that was found.
        norm_sqr: f64,
    },

    /// Measurement or query on a state with no registers.
    #[error("Engine holds no qubits")]
    EmptyState,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
