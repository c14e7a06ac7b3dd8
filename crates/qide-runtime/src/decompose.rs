//! Decomposition of macro gates into editable primitive steps.

use qide_circuit::{GateKind, GateLog};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::ExecutionMode;
use crate::error::{SessionError, SessionResult};
use crate::extension::Argument;
use crate::session::Session;

impl Session {
    /// Replace the composite or parametric record at `(step, offset)` with
    /// the gates it expands to.
    ///
    /// Composites expand one level into their recorded gates. Parametric
    /// gates re-run their forward procedure with every placement logged
    /// individually. The log changes only when the expansion succeeds and
    /// stays inside the record's span. Returns the number of steps added
    /// after `step`.
    #[instrument(skip(self))]
    pub fn decompose(&mut self, step: usize, offset: usize) -> SessionResult<usize> {
        let gate = self.log.gate_at(step, offset)?.clone();
        let name = gate.name().to_string();
        let wrap = |source: SessionError| SessionError::Decomposition {
            gate: name.clone(),
            source: Box::new(source),
        };

        let captured = match gate.kind() {
            GateKind::Composite { name, wires } => {
                let gates = self.composites.expand(name, wires)?;
                self.capture(|session| {
                    for constituent in gates {
                        session.place(constituent)?;
                    }
                    Ok(())
                })
            }
            GateKind::Parametric { procedure, params } => {
                let args: Vec<Argument> = params.iter().map(Argument::from_param_value).collect();
                let extension = self.extensions.resolve(procedure, &args).ok_or_else(|| {
                    SessionError::ExtensionNotFound {
                        name: procedure.name.clone(),
                        arguments: args.iter().map(Argument::param_type).collect(),
                    }
                })?;
                let forward = Arc::clone(extension.forward());
                let args = extension.coerce(&args);
                self.capture(|session| forward(session, &args))
            }
            _ => {
                return Err(SessionError::NotAMacro {
                    gate: name.clone(),
                    step,
                    offset,
                });
            }
        }
        .map_err(wrap)?;

        let inserted = self
            .log
            .splice_replacement(step, offset, captured.into_steps())
            .map_err(|err| wrap(err.into()))?;
        if self.cursor > step {
            self.cursor += inserted;
        }
        debug!(gate = %name, step, inserted, "Decomposed macro gate");
        Ok(inserted)
    }

    /// Run `body` against an empty scratch log in build mode and return
    /// what it logged. The session's own log is restored either way.
    fn capture<F>(&mut self, body: F) -> SessionResult<GateLog>
    where
        F: FnOnce(&mut Session) -> SessionResult<()>,
    {
        let scratch = GateLog::new(self.log.width()).with_packing(self.config.pack_steps);
        let saved_log = std::mem::replace(&mut self.log, scratch);
        let saved_mode = std::mem::replace(&mut self.mode, ExecutionMode::Build);
        let saved_replaying = std::mem::replace(&mut self.replaying, false);

        let result = body(self);

        let captured = std::mem::replace(&mut self.log, saved_log);
        self.mode = saved_mode;
        self.replaying = saved_replaying;
        result.map(|()| captured)
    }
}
