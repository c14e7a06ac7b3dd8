//! Composite gate definitions.
//!
//! A composite is a fixed, named gate sequence captured from a rectangular
//! selection of the log. Definitions keep their capture-relative layout
//! (offsets start at 0). A composite record carries the root offset of each
//! definition wire, and expansion maps local offset `i` onto wire `i`, so a
//! qubit inserted inside the record's span later is left alone.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, instrument};

use crate::error::{CircuitError, CircuitResult};
use crate::gate::Gate;
use crate::log::GateLog;

/// A named gate sequence with capture-relative offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDefinition {
    name: String,
    width: usize,
    gates: Vec<Gate>,
}

impl CompositeDefinition {
    /// Create a definition; every gate must fit in `[0, width)`.
    pub fn new(name: impl Into<String>, width: usize, gates: Vec<Gate>) -> CircuitResult<Self> {
        if let Some(gate) = gates.iter().find(|g| g.end() >= width) {
            return Err(CircuitError::SpanOutOfRange {
                begin: gate.begin(),
                end: gate.end(),
                width,
            });
        }
        Ok(Self {
            name: name.into(),
            width,
            gates,
        })
    }

    /// Definition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of qubits the definition acts on.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Constituent gates in execution order.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }
}

/// Registry of composite definitions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct CompositeRegistry {
    definitions: FxHashMap<String, CompositeDefinition>,
}

impl CompositeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. Names are unique.
    pub fn define(&mut self, definition: CompositeDefinition) -> CircuitResult<()> {
        if self.definitions.contains_key(definition.name()) {
            return Err(CircuitError::DuplicateComposite(definition.name));
        }
        debug!(name = %definition.name, width = definition.width, "Defined composite");
        self.definitions
            .insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Get a definition by name.
    pub fn get(&self, name: &str) -> Option<&CompositeDefinition> {
        self.definitions.get(name)
    }

    /// Whether a definition with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Sorted definition names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The constituent gates of `name`, with definition wire `i` placed on
    /// root offset `wires[i]`.
    ///
    /// Nested composites are returned as records; callers expand them in
    /// turn.
    pub fn expand(&self, name: &str, wires: &[usize]) -> CircuitResult<Vec<Gate>> {
        let definition = self
            .get(name)
            .ok_or_else(|| CircuitError::UnknownComposite(name.to_string()))?;
        if wires.len() != definition.width {
            return Err(CircuitError::CompositeWidthMismatch {
                name: name.to_string(),
                expected: definition.width,
                got: wires.len(),
            });
        }
        let mut gates = Vec::with_capacity(definition.gates.len());
        for gate in &definition.gates {
            gates.extend(gate.onto_wires(wires)?);
        }
        Ok(gates)
    }
}

/// Outcome of [`make_composite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeSummary {
    /// Number of gates captured into the definition.
    pub captured: usize,
    /// Number of steps removed because they became empty.
    pub removed_steps: usize,
}

/// Capture `steps` x `[begin, end]` of `log` as composite `name` and replace
/// the selection with a single composite record in its first step.
///
/// The log is untouched when capture or definition fails.
#[instrument(skip(log, registry), fields(width = end + 1 - begin))]
pub fn make_composite(
    log: &mut GateLog,
    registry: &mut CompositeRegistry,
    name: &str,
    steps: Range<usize>,
    begin: usize,
    end: usize,
) -> CircuitResult<CompositeSummary> {
    if registry.contains(name) {
        return Err(CircuitError::DuplicateComposite(name.to_string()));
    }
    let gates = log.capture_selection(steps.clone(), begin, end)?;
    let width = end + 1 - begin;
    let captured = gates.len();
    registry.define(CompositeDefinition::new(name, width, gates)?)?;

    log.clear_selection(steps.clone(), begin, end)?;
    log.set_gate(steps.start, Gate::composite(name, begin, width))?;
    let removed_steps = log.remove_empty_steps(steps.start + 1..steps.end);
    debug!(captured, removed_steps, "Created composite");
    Ok(CompositeSummary {
        captured,
        removed_steps,
    })
}
