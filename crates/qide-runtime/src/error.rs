//! Error types for the runtime crate.

use qide_circuit::CircuitError;
use qide_engine::EngineError;
use thiserror::Error;

use crate::extension::ParamType;

/// Errors raised by a simulation session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// A register-local offset is outside the register.
    #[error("{method}: offset {offset} out of range for register {register} of width {width}")]
    OffsetOutOfRange {
        /// Gate method that rejected the offset.
        method: &'static str,
        /// Register description.
        register: String,
        /// The offending offset.
        offset: usize,
        /// Register width.
        width: usize,
    },

    /// The same qubit appears twice among target and controls.
    #[error("{method}: qubit {offset} of register {register} used more than once")]
    DuplicateQubit {
        /// Gate method that rejected the operands.
        method: &'static str,
        /// Register description.
        register: String,
        /// The repeated offset.
        offset: usize,
    },

    /// A register handle no longer fits the root register.
    #[error("Register {register} lies outside the {width}-qubit root register")]
    StaleRegister {
        /// Register description.
        register: String,
        /// Root register width.
        width: usize,
    },

    /// A gate parameter is invalid.
    #[error("{method}: invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Gate method that rejected the parameter.
        method: &'static str,
        /// Parameter name.
        parameter: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A register name is already declared or reserved.
    #[error("Register name '{0}' is already declared or reserved")]
    DuplicateRegister(String),

    /// No register with this name.
    #[error("Register '{0}' is not declared")]
    UnknownRegister(String),

    /// A name is already used by a composite or a registered procedure.
    #[error("Name '{0}' is already used by a composite or procedure")]
    NameInUse(String),

    /// No procedure matches the name and argument types.
    #[error("No procedure '{name}' accepts ({})", format_types(.arguments))]
    ExtensionNotFound {
        /// Requested procedure name.
        name: String,
        /// Argument types that were supplied.
        arguments: Vec<ParamType>,
    },

    /// A procedure argument has the wrong type.
    #[error("Argument {index}: expected {expected:?}, found {found:?}")]
    ArgumentMismatch {
        /// Position of the argument.
        index: usize,
        /// Declared parameter type.
        expected: ParamType,
        /// Supplied argument type.
        found: ParamType,
    },

    /// The record at a position is not a composite or parametric gate.
    #[error("Gate '{gate}' at step {step}, offset {offset} is not a macro gate")]
    NotAMacro {
        /// Gate name.
        gate: String,
        /// Step index.
        step: usize,
        /// Root offset.
        offset: usize,
    },

    /// Expansion of a macro gate failed.
    #[error("Could not decompose '{gate}': {source}")]
    Decomposition {
        /// Macro gate name.
        gate: String,
        /// Underlying failure.
        #[source]
        source: Box<SessionError>,
    },

    /// A step holding a measurement cannot be run backward.
    #[error("Step {step} contains a measurement and cannot be run backward")]
    IrreversibleStep {
        /// Step index.
        step: usize,
    },

    /// A committed parameter does not answer the pending request.
    #[error("Placement of '{gate}' expects {expected}, got {got}")]
    ParameterMismatch {
        /// Gate being placed.
        gate: String,
        /// Requested parameter.
        expected: String,
        /// Supplied parameter.
        got: String,
    },

    /// A user procedure reported a failure.
    #[error("Procedure '{name}' failed: {message}")]
    Procedure {
        /// Procedure name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Session configuration could not be parsed.
    #[error("Invalid session configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Error from the amplitude engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Error from the gate log.
    #[error(transparent)]
    Circuit(#[from] CircuitError),

    /// Error from the reference resolver.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

fn format_types(types: &[ParamType]) -> String {
    types
        .iter()
        .map(|t| format!("{t:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised while resolving textual references.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ResolveError {
    /// The lexer could not read a token.
    #[error("Invalid character at position {position}: '{found}'")]
    InvalidToken {
        /// Byte offset in the input.
        position: usize,
        /// Offending text.
        found: String,
    },

    /// A token appeared where another was expected.
    #[error("Unexpected token at position {position}: expected {expected}, found '{found}'")]
    UnexpectedToken {
        /// Byte offset in the input.
        position: usize,
        /// What the grammar expected.
        expected: &'static str,
        /// Offending text.
        found: String,
    },

    /// The input ended early.
    #[error("Unexpected end of input: expected {0}")]
    UnexpectedEnd(&'static str),

    /// No register with this name.
    #[error("Unknown register '{0}'")]
    UnknownRegister(String),

    /// An index or slice bound is outside the register.
    #[error("Index {index} out of bounds for register '{register}' of width {width}")]
    IndexOutOfBounds {
        /// Register name.
        register: String,
        /// Offending index.
        index: u64,
        /// Register width.
        width: usize,
    },

    /// A slice selects no qubits.
    #[error("Slice [{start}:{end}] of register '{register}' is empty")]
    EmptySlice {
        /// Register name.
        register: String,
        /// Slice start.
        start: u64,
        /// Slice end.
        end: u64,
    },

    /// A qubit was expected but the reference spans several.
    #[error("'{reference}' names {width} qubits, expected one")]
    NotAQubit {
        /// Reference text.
        reference: String,
        /// Width it resolved to.
        width: usize,
    },
}

/// Result type for reference resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;
