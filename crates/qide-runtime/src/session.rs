//! The simulation session.

use num_complex::Complex64;
use qide_circuit::{
    CompositeRegistry, CompositeSummary, Gate, GateLog, ProcedureRef, make_composite,
};
use qide_engine::{EngineError, QuantumEngine};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::{ExecutionMode, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::extension::{Argument, Extension, ExtensionKind, ExtensionModule, ExtensionRegistry};
use crate::register::{InitialState, Register, RegisterTable};
use crate::resolver::Resolver;

/// One independent simulation: declared registers, the gate log, the
/// amplitude engine and the macro registries.
///
/// Every gate placement goes through the session. In
/// [`ExecutionMode::Build`] gates are only logged and the engine advances by
/// stepping; in [`ExecutionMode::Immediate`] they are logged and applied.
pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) engine: QuantumEngine,
    pub(crate) registers: RegisterTable,
    pub(crate) log: GateLog,
    pub(crate) composites: CompositeRegistry,
    pub(crate) extensions: ExtensionRegistry,
    /// Number of log steps the engine state reflects.
    pub(crate) cursor: usize,
    pub(crate) mode: ExecutionMode,
    /// Set while a procedure body is being replayed; placements then go
    /// straight to the engine.
    pub(crate) replaying: bool,
    pub(crate) last_measurement: Option<u64>,
}

impl Session {
    /// Create a session with default settings.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Create a session.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            engine: QuantumEngine::with_config(config.engine.clone()),
            registers: RegisterTable::new(),
            log: GateLog::new(0).with_packing(config.pack_steps),
            composites: CompositeRegistry::new(),
            extensions: ExtensionRegistry::new(),
            cursor: 0,
            mode: config.mode,
            replaying: false,
            last_measurement: None,
            config,
        }
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the amplitude engine.
    pub fn engine(&self) -> &QuantumEngine {
        &self.engine
    }

    /// Get the gate log.
    pub fn log(&self) -> &GateLog {
        &self.log
    }

    /// Get the declared registers.
    pub fn registers(&self) -> &RegisterTable {
        &self.registers
    }

    /// Get the composite definitions.
    pub fn composites(&self) -> &CompositeRegistry {
        &self.composites
    }

    /// Get the registered procedures.
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Current placement mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Change the placement mode.
    pub fn set_mode(&mut self, mode: ExecutionMode) {
        debug!(?mode, "Switching execution mode");
        self.mode = mode;
    }

    /// Value observed by the most recent measurement.
    pub fn last_measurement(&self) -> Option<u64> {
        self.last_measurement
    }

    /// A resolver over the declared registers.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.registers)
    }

    // =========================================================================
    // Registers
    // =========================================================================

    /// Declare a register at the end of the root register.
    ///
    /// The new register is tensored onto the current state; the log gains
    /// empty offsets for it and the evaluator position is kept.
    pub fn declare_register(
        &mut self,
        name: &str,
        width: usize,
        initial: InitialState,
    ) -> SessionResult<Register> {
        let mut registers = self.registers.clone();
        let register = registers.declare(name, width, initial.clone())?;
        initial.prepare(&mut self.engine, width)?;
        self.registers = registers;
        self.log.extend_width(width)?;
        debug!(name, width, offset = register.offset(), "Declared register");
        Ok(register)
    }

    /// Insert a register before declaration index `index`.
    ///
    /// Gates after the insertion point move down; the engine is rebuilt and
    /// the evaluator rewinds to step 0.
    pub fn insert_register(
        &mut self,
        index: usize,
        name: &str,
        width: usize,
        initial: InitialState,
    ) -> SessionResult<Register> {
        self.check_growth(width)?;
        self.check_initial(&initial, width)?;
        let mut registers = self.registers.clone();
        let register = registers.insert(index, name, width, initial)?;
        self.log.insert_qubits(register.offset(), width)?;
        self.registers = registers;
        self.reset_engine()?;
        Ok(register)
    }

    /// Delete a register and every gate that loses a qubit with it.
    pub fn delete_register(&mut self, name: &str) -> SessionResult<()> {
        let mut registers = self.registers.clone();
        let removed = registers.remove(name)?;
        self.log.remove_qubits(removed.offset(), removed.width())?;
        self.registers = registers;
        self.reset_engine()
    }

    /// Insert a |0⟩ qubit before local offset `at` of register `name`.
    pub fn insert_qubit(&mut self, name: &str, at: usize) -> SessionResult<()> {
        self.check_growth(1)?;
        let mut registers = self.registers.clone();
        let root_offset = registers.insert_qubit(name, at)?;
        self.log.insert_qubits(root_offset, 1)?;
        self.registers = registers;
        self.reset_engine()
    }

    /// Delete local offset `at` of register `name`.
    pub fn delete_qubit(&mut self, name: &str, at: usize) -> SessionResult<()> {
        let mut registers = self.registers.clone();
        let root_offset = registers.remove_qubit(name, at)?;
        self.log.remove_qubits(root_offset, 1)?;
        self.registers = registers;
        self.reset_engine()
    }

    /// Insert an empty step before `at`.
    pub fn insert_step(&mut self, at: usize) -> SessionResult<()> {
        self.log.insert_step(at)?;
        if at < self.cursor {
            self.cursor += 1;
        }
        Ok(())
    }

    /// Delete the step at `at`.
    ///
    /// Deleting an already applied step replays the log up to the same
    /// logical position without it.
    pub fn delete_step(&mut self, at: usize) -> SessionResult<()> {
        let removed = self.log.remove_step(at)?;
        if at >= self.cursor {
            return Ok(());
        }
        let target = self.cursor - 1;
        if removed.is_empty() {
            self.cursor = target;
            return Ok(());
        }
        self.reset_engine()?;
        self.seek(target)
    }

    /// Replace the gate log with one kept by the host document.
    ///
    /// The log must span the root register and satisfy the grid invariant.
    /// The evaluator rewinds to step 0.
    pub fn restore_log(&mut self, log: GateLog) -> SessionResult<()> {
        let width = self.registers.width();
        if log.width() != width {
            return Err(SessionError::InvalidParameter {
                method: "restore_log",
                parameter: "log",
                reason: format!("log width {} does not match root width {width}", log.width()),
            });
        }
        log.validate()?;
        self.log = log;
        debug!(steps = self.log.len(), "Restored gate log");
        self.reset_engine()
    }

    /// Look up a register by name.
    pub fn register(&self, name: &str) -> SessionResult<Register> {
        self.registers
            .get(name)
            .ok_or_else(|| SessionError::UnknownRegister(name.to_string()))
    }

    /// The root register.
    pub fn root(&self) -> Register {
        self.registers.root()
    }

    fn check_growth(&self, width: usize) -> SessionResult<()> {
        let max = self.config.engine.max_qubits;
        if self.registers.width() + width > max {
            return Err(EngineError::InvalidWidth {
                width,
                reason: format!("root register would exceed {max} qubits"),
            }
            .into());
        }
        Ok(())
    }

    fn check_initial(&self, initial: &InitialState, width: usize) -> SessionResult<()> {
        let mut scratch = QuantumEngine::with_config(self.config.engine.clone());
        initial.prepare(&mut scratch, width)?;
        Ok(())
    }

    pub(crate) fn check_register(&self, register: Register) -> SessionResult<()> {
        let width = self.registers.width();
        if register.offset() + register.width() > width {
            return Err(SessionError::StaleRegister {
                register: register.to_string(),
                width,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The register's value when it holds a definite basis state.
    pub fn value(&self, register: Register) -> SessionResult<Option<u64>> {
        self.check_register(register)?;
        Ok(self.engine.value(register.range())?)
    }

    /// Probability of each register value, marginalized over other qubits.
    pub fn probabilities(&self, register: Register) -> SessionResult<BTreeMap<u64, f64>> {
        self.check_register(register)?;
        Ok(self.engine.probabilities(register.range())?)
    }

    /// The register's amplitudes, or `None` when it is entangled with the
    /// rest of the state.
    pub fn amplitudes(
        &self,
        register: Register,
    ) -> SessionResult<Option<BTreeMap<u64, Complex64>>> {
        self.check_register(register)?;
        Ok(self.engine.amplitudes(register.range())?)
    }

    /// Dense amplitude vector of the register, or `None` when entangled.
    pub fn vector(&self, register: Register) -> SessionResult<Option<Vec<Complex64>>> {
        self.check_register(register)?;
        Ok(self.engine.vector(register.range())?)
    }

    // =========================================================================
    // Composites and procedures
    // =========================================================================

    /// Capture `steps` x `register` as composite `name`.
    ///
    /// The selection is replaced in the log by one composite record. When the
    /// evaluator stood inside the selection it is moved back to its start.
    #[instrument(skip(self))]
    pub fn make_composite(
        &mut self,
        name: &str,
        steps: Range<usize>,
        register: Register,
    ) -> SessionResult<CompositeSummary> {
        if self.extensions.contains(name) {
            return Err(SessionError::NameInUse(name.to_string()));
        }
        self.check_register(register)?;
        let range = register.range();
        if range.is_empty() {
            return Err(SessionError::InvalidParameter {
                method: "make_composite",
                parameter: "register",
                reason: "register is empty".into(),
            });
        }
        let summary = make_composite(
            &mut self.log,
            &mut self.composites,
            name,
            steps.clone(),
            range.start,
            range.end - 1,
        )?;

        if self.cursor >= steps.end {
            self.cursor -= summary.removed_steps;
        } else if self.cursor > steps.start {
            self.seek(steps.start)?;
        }
        Ok(summary)
    }

    /// Register a procedure, returning its registry index.
    pub fn register_extension(&mut self, extension: Extension) -> SessionResult<usize> {
        if self.composites.contains(extension.name()) {
            return Err(SessionError::NameInUse(extension.name().to_string()));
        }
        Ok(self.extensions.register(extension))
    }

    /// Register every procedure of an extension module.
    ///
    /// Nothing is registered when any procedure name is already taken by a
    /// composite.
    pub fn register_module(&mut self, module: &dyn ExtensionModule) -> SessionResult<()> {
        debug!(module = module.name(), "Registering extension module");
        let mut staged = ExtensionRegistry::new();
        staged.register_module(module);
        if let Some(name) = staged
            .names()
            .into_iter()
            .find(|name| self.composites.contains(name))
        {
            return Err(SessionError::NameInUse(name.to_string()));
        }
        self.extensions.merge(staged);
        Ok(())
    }

    /// Call procedure `name` with `args`.
    ///
    /// Library procedures are logged as one parametric record; parser
    /// procedures run inline and log each gate they place.
    pub fn invoke(&mut self, name: &str, args: &[Argument]) -> SessionResult<()> {
        for arg in args {
            match arg {
                Argument::Register(r) => self.check_register(*r)?,
                Argument::Qubit(q) => self.check_register(q.as_register())?,
                _ => {}
            }
        }
        let (index, extension) = self
            .extensions
            .find(name, args)
            .map(|(i, e)| (i, Arc::clone(e)))
            .ok_or_else(|| SessionError::ExtensionNotFound {
                name: name.to_string(),
                arguments: args.iter().map(Argument::param_type).collect(),
            })?;
        let args = extension.coerce(args);

        match extension.kind() {
            ExtensionKind::Parser => (extension.forward())(self, &args),
            ExtensionKind::Library => {
                let params = args.iter().map(Argument::to_param_value).collect();
                let gate = Gate::parametric(ProcedureRef::resolved(name, index), params)?;
                self.place(gate)
            }
        }
    }

    /// Resolve `arguments` as a comma-separated reference list and call
    /// procedure `name`.
    pub fn invoke_str(&mut self, name: &str, arguments: &str) -> SessionResult<()> {
        let args = self.resolver().arguments(arguments)?;
        self.invoke(name, &args)
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Log a validated record and, depending on the mode, apply it.
    pub(crate) fn place(&mut self, gate: Gate) -> SessionResult<()> {
        if self.replaying {
            return self.apply_gate(&gate, false, self.cursor);
        }
        match self.mode {
            ExecutionMode::Build => {
                self.log.push_gate(gate)?;
            }
            ExecutionMode::Immediate => {
                self.run_to_end()?;
                let step = self.log.len();
                self.apply_gate(&gate, false, step)?;
                self.log.push_gate(gate)?;
                self.cursor = self.log.len();
            }
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("registers", &self.registers)
            .field("steps", &self.log.len())
            .field("cursor", &self.cursor)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
