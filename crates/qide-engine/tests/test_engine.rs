//! Integration tests for the sparse amplitude engine.

use std::f64::consts::PI;

use proptest::prelude::*;
use qide_engine::{Complex64, EngineConfig, EngineError, QuantumEngine, Unitary2x2};

const EPS: f64 = 1e-10;

fn engine_with_seed(seed: u64) -> QuantumEngine {
    QuantumEngine::with_config(EngineConfig::new().with_seed(seed))
}

fn uniform_two_qubits() -> Vec<(u64, Complex64)> {
    (0..4).map(|k| (k, Complex64::new(0.5, 0.0))).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn two_hadamards_give_uniform_real_amplitudes() {
    let mut engine = engine_with_seed(1);
    engine.new_register_from_value(0, 2).unwrap();
    engine.apply_unitary(0, &[], &Unitary2x2::hadamard()).unwrap();
    engine.apply_unitary(1, &[], &Unitary2x2::hadamard()).unwrap();

    let amps = engine.amplitudes(0..2).unwrap().unwrap();
    assert_eq!(amps.len(), 4);
    for key in 0..4 {
        let amp = amps[&key];
        assert!((amp.re - 0.5).abs() < EPS, "key {key}: {amp}");
        assert!(amp.im.abs() < EPS, "key {key}: {amp}");
    }
}

#[test]
fn hadamard_then_cnot_gives_bell_probabilities() {
    let mut engine = engine_with_seed(1);
    engine.new_register_from_value(0, 2).unwrap();
    engine.apply_unitary(0, &[], &Unitary2x2::hadamard()).unwrap();
    engine.apply_controlled_not(1, &[0]).unwrap();

    let probs = engine.probabilities(0..2).unwrap();
    assert_eq!(probs.keys().copied().collect::<Vec<_>>(), vec![0, 3]);
    assert!((probs[&0] - 0.5).abs() < EPS);
    assert!((probs[&3] - 0.5).abs() < EPS);
}

#[test]
fn probabilities_marginalize_other_registers() {
    let mut engine = engine_with_seed(1);
    engine.new_register_from_value(0, 1).unwrap();
    engine.new_register_from_value(0, 2).unwrap();
    engine.apply_unitary(0, &[], &Unitary2x2::hadamard()).unwrap();
    engine.apply_controlled_not(2, &[0]).unwrap();

    let first = engine.probabilities(0..1).unwrap();
    assert!((first[&0] - 0.5).abs() < EPS);
    assert!((first[&1] - 0.5).abs() < EPS);

    let second = engine.probabilities(1..3).unwrap();
    assert!((second[&0] - 0.5).abs() < EPS);
    assert!((second[&2] - 0.5).abs() < EPS);
}

// ---------------------------------------------------------------------------
// Control gating
// ---------------------------------------------------------------------------

#[test]
fn controlled_unitary_leaves_control_zero_entries_untouched() {
    let mut engine = engine_with_seed(3);
    engine.new_register(uniform_two_qubits(), 2).unwrap();
    engine.new_register_from_value(0, 1).unwrap();
    engine.apply_unitary(2, &[], &Unitary2x2::rotate_y(0.3)).unwrap();

    let before = engine.snapshot();
    engine
        .apply_unitary(2, &[0], &Unitary2x2::rotate_x(1.1))
        .unwrap();
    engine.apply_phase(1, &[0], 0.9).unwrap();
    let after = engine.snapshot();

    // Root offset 0 is local bit 0 of the first register, which sits above
    // the one-qubit second register.
    let control_bit = 1u64 << 1;
    let untouched = |entries: &[(u64, Complex64)]| -> Vec<(u64, Complex64)> {
        entries
            .iter()
            .filter(|(k, _)| k & control_bit == 0)
            .copied()
            .collect()
    };
    assert_eq!(untouched(&before), untouched(&after));
    assert_ne!(before, after);
}

#[test]
fn multi_controlled_not_requires_every_control() {
    let mut engine = engine_with_seed(3);
    engine.new_register_from_value(0b001, 3).unwrap();
    engine.apply_controlled_not(2, &[0, 1]).unwrap();
    assert_eq!(engine.value(0..3).unwrap(), Some(0b001));

    engine.apply_controlled_not(1, &[]).unwrap();
    engine.apply_controlled_not(2, &[0, 1]).unwrap();
    assert_eq!(engine.value(0..3).unwrap(), Some(0b111));
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

#[test]
fn equal_superposition_measurement_distribution() {
    let mut engine = engine_with_seed(2024);
    let trials = 10_000;
    let mut counts = [0usize; 4];

    for _ in 0..trials {
        engine.reset();
        engine.new_register(uniform_two_qubits(), 2).unwrap();
        let outcome = engine.measure(0..2).unwrap();
        counts[outcome as usize] += 1;

        let post = engine.snapshot();
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].0, outcome);
        assert!((post[0].1 - Complex64::new(1.0, 0.0)).norm() < EPS);
    }

    for (value, &count) in counts.iter().enumerate() {
        let freq = count as f64 / trials as f64;
        assert!(
            (freq - 0.25).abs() <= 0.025,
            "value {value} observed with frequency {freq}"
        );
    }
}

#[test]
fn single_qubit_measurement_renormalizes_survivors() {
    let mut engine = engine_with_seed(11);
    engine.new_register_from_value(0, 2).unwrap();
    engine.apply_unitary(0, &[], &Unitary2x2::hadamard()).unwrap();
    engine.apply_unitary(1, &[], &Unitary2x2::rotate_y(PI / 3.0)).unwrap();

    let bit = engine.measure_qubit(0).unwrap();
    assert!(engine.is_normalized());
    let p_one = engine.probability_of_one(0).unwrap();
    assert!((p_one - if bit { 1.0 } else { 0.0 }).abs() < EPS);
}

#[test]
fn measuring_without_registers_is_an_error() {
    let mut engine = engine_with_seed(0);
    assert!(matches!(engine.measure(0..1), Err(EngineError::EmptyState)));
}

// ---------------------------------------------------------------------------
// Boundary
// ---------------------------------------------------------------------------

#[test]
fn out_of_range_offsets_leave_state_unchanged() {
    let mut engine = engine_with_seed(5);
    engine.new_register_from_value(0, 2).unwrap();
    engine.apply_unitary(0, &[], &Unitary2x2::hadamard()).unwrap();
    let before = engine.snapshot();

    assert!(matches!(
        engine.apply_unitary(2, &[], &Unitary2x2::hadamard()),
        Err(EngineError::OffsetOutOfRange { offset: 2, width: 2, .. })
    ));
    assert!(engine.apply_controlled_not(0, &[7]).is_err());
    assert!(engine.apply_phase(9, &[], 0.1).is_err());
    assert!(engine.measure(1..3).is_err());

    assert_eq!(engine.snapshot(), before);
}

#[test]
fn config_round_trips_through_json() {
    let config = EngineConfig::new().with_seed(9).with_epsilon(1e-12);
    let json = serde_json::to_string(&config).unwrap();
    let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);

    let partial: EngineConfig = serde_json::from_str(r#"{"seed": 4}"#).unwrap();
    assert_eq!(partial.seed, Some(4));
    assert_eq!(partial.epsilon, qide_engine::DEFAULT_EPSILON);
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Unitary(usize, Option<usize>, u8, f64),
    Not(usize, Vec<usize>),
    Phase(usize, Option<usize>, f64),
}

fn arb_op(width: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..width, proptest::option::of(0..width), 0u8..6, -PI..PI)
            .prop_map(|(t, c, k, a)| Op::Unitary(t, c, k, a)),
        (0..width, proptest::collection::vec(0..width, 0..3)).prop_map(|(t, c)| Op::Not(t, c)),
        (0..width, proptest::option::of(0..width), -PI..PI).prop_map(|(t, c, a)| Op::Phase(t, c, a)),
    ]
}

fn matrix_for(kind: u8, angle: f64) -> Unitary2x2 {
    match kind {
        0 => Unitary2x2::hadamard(),
        1 => Unitary2x2::sqrt_x(),
        2 => Unitary2x2::rotate_x(angle),
        3 => Unitary2x2::rotate_y(angle),
        4 => Unitary2x2::rotate_z(angle),
        _ => Unitary2x2::sigma_y(),
    }
}

fn controls_of(target: usize, control: Option<usize>) -> Vec<usize> {
    control.filter(|&c| c != target).into_iter().collect()
}

proptest! {
    #[test]
    fn unitary_sequences_preserve_norm(ops in proptest::collection::vec(arb_op(4), 1..30)) {
        let mut engine = engine_with_seed(0);
        engine.new_register_from_value(0, 4).unwrap();

        for op in ops {
            match op {
                Op::Unitary(t, c, kind, angle) => {
                    engine.apply_unitary(t, &controls_of(t, c), &matrix_for(kind, angle)).unwrap();
                }
                Op::Not(t, mut controls) => {
                    controls.sort_unstable();
                    controls.dedup();
                    controls.retain(|&c| c != t);
                    engine.apply_controlled_not(t, &controls).unwrap();
                }
                Op::Phase(t, c, angle) => {
                    engine.apply_phase(t, &controls_of(t, c), angle).unwrap();
                }
            }
            prop_assert!((engine.norm_sqr() - 1.0).abs() < 1e-9);
        }
    }
}
