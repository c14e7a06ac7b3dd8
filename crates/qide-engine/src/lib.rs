//! qide Amplitude Engine
//!
//! This crate holds the numeric core of the qide circuit simulator: a sparse
//! map from basis index to complex amplitude for the root register, and the
//! operations that evolve it.
//!
//! # Overview
//!
//! - **Registers**: [`QuantumEngine::new_register`] tensors a new register's
//!   distribution onto the existing state. Qubits are addressed by their
//!   root-register offset.
//! - **Gates**: [`QuantumEngine::apply_unitary`] (any 2x2 unitary, optionally
//!   multi-controlled), [`QuantumEngine::apply_controlled_not`] and
//!   [`QuantumEngine::apply_phase`].
//! - **Measurement**: [`QuantumEngine::measure`] collapses a contiguous range
//!   of qubits jointly.
//! - **Queries**: probabilities, amplitudes and dense vectors, each scoped to
//!   a range of root offsets.
//!
//! # Example: Bell state
//!
//! ```rust
//! use qide_engine::{QuantumEngine, Unitary2x2};
//!
//! let mut engine = QuantumEngine::new();
//! engine.new_register_from_value(0, 2).unwrap();
//! engine.apply_unitary(0, &[], &Unitary2x2::hadamard()).unwrap();
//! engine.apply_controlled_not(1, &[0]).unwrap();
//!
//! let probs = engine.probabilities(0..2).unwrap();
//! assert_eq!(probs.len(), 2);
//! assert!((probs[&0] - 0.5).abs() < 1e-10);
//! assert!((probs[&3] - 0.5).abs() < 1e-10);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod matrix;

pub use config::{DEFAULT_EPSILON, EngineConfig, MAX_QUBITS};
pub use engine::{MAX_DENSE_WIDTH, QuantumEngine, phase_shift_angle};
pub use error::{EngineError, EngineResult};
pub use matrix::Unitary2x2;

/// Complex amplitude type used throughout qide.
pub use num_complex::Complex64;
