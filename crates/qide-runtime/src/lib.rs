//! qide Runtime
//!
//! This crate ties the amplitude engine and the gate log together into an
//! interactive simulation session.
//!
//! # Core Components
//!
//! - **Session**: [`Session`] owns the engine, the declared registers, the
//!   gate log, the composite and extension registries and the evaluator
//!   cursor
//! - **Gate API**: [`Gates`] validates register-local operands and logs (and,
//!   in [`ExecutionMode::Immediate`], applies) one record per call
//! - **Evaluator**: step forward/backward over the log, with inverse
//!   dispatch and rejection of irreversible steps
//! - **Extensions**: [`ExtensionRegistry`] matches procedures by name and
//!   argument types; library procedures are logged as one parametric
//!   record, parser procedures log each gate they place
//! - **Decomposition**: [`Session::decompose`] turns a composite or
//!   parametric record into editable primitive steps
//! - **Resolver**: [`Resolver`] turns reference text such as `q[0:2]` into
//!   register and qubit handles
//!
//! # Example
//!
//! ```rust
//! use qide_runtime::{InitialState, Session};
//!
//! let mut session = Session::new();
//! let q = session.declare_register("q", 2, InitialState::Value(0)).unwrap();
//! session.gates(q).hadamard(0, &[]).unwrap().cnot(1, 0).unwrap();
//!
//! session.run_to_end().unwrap();
//! let probs = session.probabilities(q).unwrap();
//! assert!((probs[&0] - 0.5).abs() < 1e-10);
//! assert!((probs[&3] - 0.5).abs() < 1e-10);
//!
//! session.step_backward().unwrap();
//! session.step_backward().unwrap();
//! assert_eq!(session.value(q).unwrap(), Some(0));
//! ```

pub mod config;
pub mod decompose;
pub mod error;
pub mod evaluator;
pub mod extension;
pub mod gates;
pub mod placement;
pub mod register;
pub mod resolver;
pub mod session;

pub use config::{ExecutionMode, SessionConfig};
pub use error::{ResolveError, ResolveResult, SessionError, SessionResult};
pub use extension::{
    Argument, Extension, ExtensionKind, ExtensionModule, ExtensionRegistry, ParamType, Procedure,
};
pub use gates::Gates;
pub use placement::{ParameterRequest, ParameterValue, PendingPlacement, PlacementKind};
pub use register::{InitialState, QubitRef, ROOT, Register, RegisterEntry, RegisterTable};
pub use resolver::Resolver;
pub use session::Session;
