//! Integration tests for composites, procedure-backed gates, decomposition
//! and two-call placement.

use qide_circuit::{CircuitError, GateKind};
use qide_engine::{Complex64, EngineConfig};
use qide_runtime::{
    Argument, ExecutionMode, Extension, ExtensionModule, ExtensionRegistry, InitialState,
    ParamType, ParameterRequest, ParameterValue, PlacementKind, Register, Session, SessionConfig,
    SessionError, SessionResult,
};

const EPS: f64 = 1e-10;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn session() -> Session {
    init_tracing();
    Session::with_config(SessionConfig::new().with_engine(EngineConfig::new().with_seed(3)))
}

fn declare(session: &mut Session, name: &str, width: usize) -> Register {
    session
        .declare_register(name, width, InitialState::Value(0))
        .unwrap()
}

fn bell_forward(session: &mut Session, args: &[Argument]) -> SessionResult<()> {
    let pair = args[0].as_register(0)?;
    session.gates(pair).hadamard(0, &[])?.cnot(1, 0)?;
    Ok(())
}

fn bell_inverse(session: &mut Session, args: &[Argument]) -> SessionResult<()> {
    let pair = args[0].as_register(0)?;
    session.gates(pair).cnot(1, 0)?.hadamard(0, &[])?;
    Ok(())
}

struct Entangling;

impl ExtensionModule for Entangling {
    fn name(&self) -> &str {
        "entangling"
    }

    fn register(&self, registry: &mut ExtensionRegistry) {
        registry.register(
            Extension::library("bell", vec![ParamType::Register], bell_forward)
                .with_inverse(bell_inverse)
                .with_source("h q[0]; cx q[0], q[1];"),
        );
        registry.register(
            Extension::parser("ghz", vec![ParamType::Register], |session, args| {
                let r = args[0].as_register(0)?;
                session.gates(r).hadamard(0, &[])?;
                for i in 1..r.width() {
                    session.gates(r).cnot(i, i - 1)?;
                }
                Ok(())
            }),
        );
        registry.register(
            Extension::parser("flip", vec![], |session, args| {
                for (i, arg) in args.iter().enumerate() {
                    let qubit = arg.as_qubit(i)?;
                    session.gates(qubit.register()).sigma_x(qubit.offset(), &[])?;
                }
                Ok(())
            })
            .with_variadic(ParamType::Qubit),
        );
        registry.register(Extension::library(
            "kick",
            vec![ParamType::Qubit, ParamType::Float],
            |session, args| {
                let qubit = args[0].as_qubit(0)?;
                let theta = args[1].as_float(1)?;
                session
                    .gates(qubit.register())
                    .phase_kick(qubit.offset(), theta, &[])?;
                Ok(())
            },
        ));
    }
}

fn with_module() -> Session {
    let mut session = session();
    session.register_module(&Entangling).unwrap();
    session
}

fn kinds(session: &Session) -> Vec<Vec<String>> {
    session
        .log()
        .steps()
        .iter()
        .map(|step| step.gates().map(|g| g.name().to_string()).collect())
        .collect()
}

// ---------------------------------------------------------------------------
// Composites
// ---------------------------------------------------------------------------

#[test]
fn composite_replaces_selection_and_retargets() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    let r = declare(&mut session, "r", 2);
    session.gates(q).hadamard(0, &[]).unwrap().cnot(1, 0).unwrap();

    let summary = session.make_composite("pair", 0..2, q).unwrap();
    assert_eq!(summary.removed_steps, 1);
    assert_eq!(kinds(&session), vec![vec!["pair".to_string()]]);

    session.gates(r).composite("pair").unwrap();
    session.run_to_end().unwrap();
    let probs = session.probabilities(r).unwrap();
    assert!((probs[&0] - 0.5).abs() < EPS);
    assert!((probs[&3] - 0.5).abs() < EPS);
}

#[test]
fn composite_requires_matching_width() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    let wide = declare(&mut session, "wide", 3);
    session.gates(q).hadamard(0, &[]).unwrap();
    session.make_composite("solo", 0..1, q).unwrap();

    let result = session.gates(wide).composite("solo").map(|_| ());
    assert!(matches!(
        result,
        Err(SessionError::Circuit(CircuitError::CompositeWidthMismatch { .. }))
    ));
    let result = session.gates(q).composite("missing").map(|_| ());
    assert!(matches!(
        result,
        Err(SessionError::Circuit(CircuitError::UnknownComposite(_)))
    ));
}

#[test]
fn composite_steps_backward_in_reverse_order() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    session
        .gates(q)
        .hadamard(0, &[])
        .unwrap()
        .cnot(1, 0)
        .unwrap()
        .rotate_y(1, 0.4, &[])
        .unwrap();
    session.make_composite("mix", 0..3, q).unwrap();

    session.run_to_end().unwrap();
    session.step_backward().unwrap();
    assert_eq!(session.value(q).unwrap(), Some(0));
}

#[test]
fn nested_composites_replay() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    session.gates(q).hadamard(0, &[]).unwrap().cnot(1, 0).unwrap();
    session.make_composite("inner", 0..2, q).unwrap();
    session.gates(q).sigma_x(0, &[]).unwrap();
    session.make_composite("outer", 0..2, q).unwrap();
    assert_eq!(session.log().len(), 1);

    session.run_to_end().unwrap();
    let probs = session.probabilities(q).unwrap();
    assert_eq!(probs.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn composite_name_clashes_with_procedure() {
    let mut session = with_module();
    let q = declare(&mut session, "q", 2);
    session.gates(q).hadamard(0, &[]).unwrap();
    assert!(matches!(
        session.make_composite("bell", 0..1, q),
        Err(SessionError::NameInUse(_))
    ));

    session.make_composite("mine", 0..1, q).unwrap();
    let clash = Extension::parser("mine", vec![], |_, _| Ok(()));
    assert!(matches!(
        session.register_extension(clash),
        Err(SessionError::NameInUse(_))
    ));
}

#[test]
fn module_registration_checks_composite_names() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    session.gates(q).hadamard(0, &[]).unwrap();
    session.make_composite("ghz", 0..1, q).unwrap();

    let result = session.register_module(&Entangling);
    assert!(matches!(result, Err(SessionError::NameInUse(name)) if name == "ghz"));
    assert!(session.extensions().is_empty());
}

#[test]
fn composite_before_cursor_keeps_state() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    session
        .gates(q)
        .sigma_x(0, &[])
        .unwrap()
        .cnot(1, 0)
        .unwrap()
        .hadamard(0, &[])
        .unwrap();
    session.run_to_end().unwrap();
    let before = session.engine().snapshot();

    session.make_composite("prefix", 0..2, q).unwrap();
    assert_eq!(session.cursor(), session.log().len());
    assert_eq!(session.engine().snapshot(), before);
}

// ---------------------------------------------------------------------------
// Procedures
// ---------------------------------------------------------------------------

#[test]
fn library_procedure_logs_one_parametric_record() {
    let mut session = with_module();
    let q = declare(&mut session, "q", 2);
    session.invoke("bell", &[Argument::Register(q)]).unwrap();

    assert_eq!(session.log().len(), 1);
    let gate = session.log().gate_at(0, 0).unwrap();
    assert!(gate.is_macro());
    assert_eq!(gate.name(), "bell");
    assert_eq!((gate.begin(), gate.end()), (0, 1));

    session.run_to_end().unwrap();
    let probs = session.probabilities(q).unwrap();
    assert!((probs[&3] - 0.5).abs() < EPS);

    session.step_backward().unwrap();
    assert_eq!(session.value(q).unwrap(), Some(0));
    assert_eq!(
        session.extensions().source("bell"),
        Some("h q[0]; cx q[0], q[1];")
    );
}

#[test]
fn parser_procedure_logs_each_gate() {
    let mut session = with_module();
    let q = declare(&mut session, "q", 3);
    session.invoke_str("ghz", "q").unwrap();

    assert_eq!(
        kinds(&session),
        vec![vec!["h".to_string()], vec!["cnot".to_string()], vec!["cnot".to_string()]]
    );
    session.run_to_end().unwrap();
    let probs = session.probabilities(q).unwrap();
    assert_eq!(probs.keys().copied().collect::<Vec<_>>(), vec![0, 7]);
}

#[test]
fn variadic_and_coerced_arguments() {
    let mut session = with_module();
    let q = declare(&mut session, "q", 3);
    session.invoke_str("flip", "q[0], q[2]").unwrap();
    session.invoke_str("flip", "").unwrap();
    session.invoke_str("kick", "q[1:2], 1").unwrap();

    assert_eq!(session.log().len(), 1);
    let parametric = session.log().gate_at(0, 1).unwrap();
    assert_eq!(parametric.name(), "kick");
    session.run_to_end().unwrap();
    assert_eq!(session.value(q).unwrap(), Some(0b101));
}

#[test]
fn unmatched_arguments_report_not_found() {
    let mut session = with_module();
    declare(&mut session, "q", 2);
    let err = session.invoke("bell", &[Argument::Int(1)]).unwrap_err();
    assert!(matches!(err, SessionError::ExtensionNotFound { .. }));
    assert!(err.to_string().contains("bell"), "{err}");
    assert!(session.log().is_empty());
    assert!(session.invoke("nope", &[]).is_err());
}

#[test]
fn immediate_mode_runs_library_body() {
    let mut session = with_module();
    session.set_mode(ExecutionMode::Immediate);
    let q = declare(&mut session, "q", 2);
    session.invoke("bell", &[Argument::Register(q)]).unwrap();

    assert_eq!(session.log().len(), 1);
    let probs = session.probabilities(q).unwrap();
    assert!((probs[&3] - 0.5).abs() < EPS);
}

#[test]
fn missing_inverse_steps_back_as_no_op() {
    let mut session = with_module();
    let q = declare(&mut session, "q", 1);
    session.gates(q).hadamard(0, &[]).unwrap();
    session.invoke_str("kick", "q[0], 0.5").unwrap();
    session.run_to_end().unwrap();
    let kicked = session.engine().snapshot();

    assert!(session.step_backward().unwrap());
    assert_eq!(session.cursor(), 1);
    assert_eq!(session.engine().snapshot(), kicked);
}

#[test]
fn unresolved_procedure_is_skipped() {
    let mut source = with_module();
    let q = declare(&mut source, "q", 2);
    source.gates(q).sigma_x(0, &[]).unwrap();
    source.invoke("bell", &[Argument::Register(q)]).unwrap();
    let log = source.log().clone();

    let mut target = session();
    let q = declare(&mut target, "q", 2);
    target.restore_log(log).unwrap();
    target.run_to_end().unwrap();

    assert_eq!(target.cursor(), 2);
    assert_eq!(target.value(q).unwrap(), Some(1));
}

// ---------------------------------------------------------------------------
// Decomposition
// ---------------------------------------------------------------------------

#[test]
fn decomposed_procedure_matches_parametric_replay() {
    let mut macro_session = with_module();
    let q = declare(&mut macro_session, "q", 2);
    macro_session.gates(q).rotate_x(1, 0.6, &[]).unwrap();
    macro_session.invoke("bell", &[Argument::Register(q)]).unwrap();
    macro_session.run_to_end().unwrap();
    let expected = macro_session.engine().snapshot();

    let mut session = with_module();
    let q = declare(&mut session, "q", 2);
    session.gates(q).rotate_x(1, 0.6, &[]).unwrap();
    session.invoke("bell", &[Argument::Register(q)]).unwrap();
    let inserted = session.decompose(1, 0).unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(
        kinds(&session),
        vec![vec!["rx".to_string()], vec!["h".to_string()], vec!["cnot".to_string()]]
    );
    session.run_to_end().unwrap();
    let actual = session.engine().snapshot();
    assert_eq!(actual.len(), expected.len());
    for ((ka, a), (kb, b)) in expected.iter().zip(&actual) {
        assert_eq!(ka, kb);
        assert!((a - b).norm() < EPS, "key {ka}: {a} vs {b}");
    }
}

#[test]
fn decomposed_composite_becomes_editable() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    session.gates(q).hadamard(0, &[]).unwrap().cnot(1, 0).unwrap();
    session.make_composite("pair", 0..2, q).unwrap();

    session.decompose(0, 1).unwrap();
    assert_eq!(session.log().gate_at(0, 0).unwrap().kind(), &GateKind::Hadamard);
    assert_eq!(session.log().gate_at(1, 1).unwrap().kind(), &GateKind::CNot);
    assert!(session.composites().contains("pair"));
}

#[test]
fn decompose_keeps_cursor_consistent() {
    let mut session = with_module();
    let q = declare(&mut session, "q", 2);
    session.invoke("bell", &[Argument::Register(q)]).unwrap();
    session.gates(q).sigma_z(0, &[]).unwrap();
    session.run_to_end().unwrap();
    let before = session.engine().snapshot();

    session.decompose(0, 0).unwrap();
    assert_eq!(session.cursor(), session.log().len());
    assert_eq!(session.engine().snapshot(), before);
    while session.step_backward().unwrap() {}
    assert_eq!(session.value(q).unwrap(), Some(0));
}

#[test]
fn decompose_rejects_primitives() {
    let mut session = session();
    let q = declare(&mut session, "q", 1);
    session.gates(q).hadamard(0, &[]).unwrap();
    assert!(matches!(
        session.decompose(0, 0),
        Err(SessionError::NotAMacro { .. })
    ));
}

#[test]
fn failed_decomposition_leaves_log_untouched() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    declare(&mut session, "other", 1);
    session
        .register_extension(Extension::library(
            "broken",
            vec![ParamType::Register],
            |_, _| {
                Err(SessionError::Procedure {
                    name: "broken".into(),
                    message: "division by zero".into(),
                })
            },
        ))
        .unwrap();
    session
        .register_extension(Extension::library(
            "leaky",
            vec![ParamType::Register],
            |session, _| {
                let root = session.root();
                session.gates(root).hadamard(2, &[])?;
                Ok(())
            },
        ))
        .unwrap();
    session.invoke("broken", &[Argument::Register(q)]).unwrap();
    session.invoke("leaky", &[Argument::Register(q)]).unwrap();
    let before = session.log().clone();

    let err = session.decompose(0, 0).unwrap_err();
    assert!(matches!(err, SessionError::Decomposition { .. }));
    assert!(std::error::Error::source(&err).is_some());

    let err = session.decompose(1, 0).unwrap_err();
    assert!(matches!(err, SessionError::Decomposition { .. }));
    assert_eq!(session.log(), &before);
}

// ---------------------------------------------------------------------------
// Two-call placement
// ---------------------------------------------------------------------------

#[test]
fn placement_waits_for_angle() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    let pending = session
        .begin_placement(q, PlacementKind::RotateX, 1, &[0])
        .unwrap();
    assert_eq!(pending.request(), &ParameterRequest::Angle);
    assert!(session.log().is_empty());

    session
        .commit_placement(pending, ParameterValue::Angle(0.25))
        .unwrap();
    let gate = session.log().gate_at(0, 1).unwrap();
    assert_eq!(gate.kind(), &GateKind::RotateX(0.25));
    assert_eq!(gate.controls(), &[0]);
}

#[test]
fn cancelled_placement_changes_nothing() {
    let mut session = session();
    let q = declare(&mut session, "q", 1);
    let before = session.engine().snapshot();
    let pending = session
        .begin_placement(q, PlacementKind::Gate1, 0, &[])
        .unwrap();
    assert_eq!(pending.request(), &ParameterRequest::Matrix);
    drop(pending);

    assert!(session.log().is_empty());
    assert_eq!(session.engine().snapshot(), before);
}

#[test]
fn composite_placement_lists_fitting_definitions() {
    let mut session = session();
    let q = declare(&mut session, "q", 2);
    let one = declare(&mut session, "one", 1);
    session.gates(q).hadamard(0, &[]).unwrap().cnot(1, 0).unwrap();
    session.make_composite("pair", 0..2, q).unwrap();
    session.gates(one).sigma_x(0, &[]).unwrap();
    session.make_composite("single", 0..1, one).unwrap();

    let pending = session
        .begin_placement(q, PlacementKind::Composite, 0, &[])
        .unwrap();
    assert_eq!(
        pending.request(),
        &ParameterRequest::CompositeName {
            candidates: vec!["pair".to_string()]
        }
    );
    session
        .commit_placement(pending, ParameterValue::CompositeName("pair".into()))
        .unwrap();
    assert_eq!(session.log().gate_at(1, 0).unwrap().name(), "pair");
}

#[test]
fn procedure_placement_takes_arguments() {
    let mut session = with_module();
    let q = declare(&mut session, "q", 2);
    let pending = session
        .begin_placement(q, PlacementKind::Procedure("bell".into()), 0, &[])
        .unwrap();
    assert_eq!(
        pending.request(),
        &ParameterRequest::Arguments {
            procedure: "bell".into()
        }
    );
    let args = session.resolver().arguments("q").unwrap();
    session
        .commit_placement(pending, ParameterValue::Arguments(args))
        .unwrap();
    assert!(session.log().gate_at(0, 1).unwrap().is_macro());

    assert!(
        session
            .begin_placement(q, PlacementKind::Procedure("absent".into()), 0, &[])
            .is_err()
    );
}

#[test]
fn placement_distance_and_measure() {
    let mut session = session();
    session.set_mode(ExecutionMode::Immediate);
    let q = declare(&mut session, "q", 2);
    session.gates(q).sigma_x(0, &[]).unwrap().sigma_x(1, &[]).unwrap();

    let pending = session
        .begin_placement(q, PlacementKind::CPhaseShift, 1, &[0])
        .unwrap();
    session
        .commit_placement(pending, ParameterValue::Distance(1))
        .unwrap();
    let amps = session.amplitudes(q).unwrap().unwrap();
    assert!((amps[&3] - Complex64::new(-1.0, 0.0)).norm() < EPS);

    let pending = session
        .begin_placement(q, PlacementKind::Measure, 0, &[])
        .unwrap();
    assert_eq!(pending.request(), &ParameterRequest::None);
    session
        .commit_placement(pending, ParameterValue::None)
        .unwrap();
    assert_eq!(session.last_measurement(), Some(3));
}
