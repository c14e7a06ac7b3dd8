//! qide Gate Log
//!
//! This crate holds the editable circuit model: immutable gate records laid
//! out on a grid of steps (columns) by root-register offset.
//!
//! # Core Components
//!
//! - **Gates**: [`Gate`] records over a closed set of [`GateKind`]s, each
//!   occupying a contiguous span of root offsets
//! - **Steps**: [`Step`] holds exactly one record per offset; a multi-qubit
//!   record is stored once in the step's arena and referenced by index from
//!   every offset it covers
//! - **Log**: [`GateLog`] orders steps and performs structural edits
//!   (insert/remove steps and qubits) while keeping the grid invariant
//! - **Composites**: [`CompositeRegistry`] and [`make_composite`] capture a
//!   selection into a reusable named gate
//!
//! # Example
//!
//! ```rust
//! use qide_circuit::{Gate, GateKind, GateLog};
//!
//! let mut log = GateLog::new(2);
//! log.push_gate(Gate::new(GateKind::Hadamard, 0, vec![])).unwrap();
//! log.push_gate(Gate::new(GateKind::CNot, 1, vec![0])).unwrap();
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.gate_at(1, 0).unwrap().name(), "cnot");
//! log.validate().unwrap();
//! ```

pub mod composite;
pub mod error;
pub mod gate;
pub mod log;
pub mod step;

pub use composite::{CompositeDefinition, CompositeRegistry, CompositeSummary, make_composite};
pub use error::{CircuitError, CircuitResult};
pub use gate::{Gate, GateKind, ParamValue, ProcedureRef};
pub use log::GateLog;
pub use step::{Step, StepGates};
