//! Register handles and the declared-register table.

use num_complex::Complex64;
use qide_engine::{EngineResult, QuantumEngine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use crate::error::{SessionError, SessionResult};

/// Reserved name of the implicit root register.
pub const ROOT: &str = "root";

/// A contiguous span of the root register.
///
/// Handles are plain offsets and own no state. A structural edit that moves
/// qubits invalidates previously obtained handles; look registers up again
/// by name afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Register {
    offset: usize,
    width: usize,
}

impl Register {
    /// Create a handle for `width` qubits starting at root offset `offset`.
    pub const fn new(offset: usize, width: usize) -> Self {
        Self { offset, width }
    }

    /// First root offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of qubits.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Root offsets covered by this register.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }

    /// A sub-register covering local offsets `range`.
    pub fn slice(&self, range: Range<usize>) -> Option<Register> {
        if range.start >= range.end || range.end > self.width {
            return None;
        }
        Some(Register::new(self.offset + range.start, range.end - range.start))
    }

    /// The qubit at local offset `index`.
    pub fn qubit(&self, index: usize) -> Option<QubitRef> {
        QubitRef::new(*self, index)
    }

    /// Iterate the qubits of this register.
    pub fn qubits(&self) -> impl Iterator<Item = QubitRef> + '_ {
        (0..self.width).map(|offset| QubitRef {
            register: *self,
            offset,
        })
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ROOT}[{}:{}]", self.offset, self.offset + self.width)
    }
}

/// One qubit, addressed through a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QubitRef {
    register: Register,
    offset: usize,
}

impl QubitRef {
    /// Create a reference, or `None` if `offset` is outside the register.
    pub fn new(register: Register, offset: usize) -> Option<Self> {
        (offset < register.width).then_some(Self { register, offset })
    }

    /// The qubit at root offset `offset`, as a width-1 register.
    pub fn at_root(offset: usize) -> Self {
        Self {
            register: Register::new(offset, 1),
            offset: 0,
        }
    }

    /// The register this reference is relative to.
    pub fn register(&self) -> Register {
        self.register
    }

    /// Offset within the register.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset within the root register.
    pub fn root_offset(&self) -> usize {
        self.register.offset + self.offset
    }

    /// This qubit as a width-1 register.
    pub fn as_register(&self) -> Register {
        Register::new(self.root_offset(), 1)
    }
}

/// Initial distribution of a declared register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitialState {
    /// A computational basis state.
    Value(u64),
    /// An explicit amplitude distribution; bit `i` of a key is local offset `i`.
    Amplitudes(BTreeMap<u64, Complex64>),
}

impl InitialState {
    /// Tensor this state onto `engine` as a new register of `width` qubits.
    pub fn prepare(&self, engine: &mut QuantumEngine, width: usize) -> EngineResult<Range<usize>> {
        match self {
            InitialState::Value(value) => engine.new_register_from_value(*value, width),
            InitialState::Amplitudes(amps) => {
                engine.new_register(amps.iter().map(|(&k, &a)| (k, a)), width)
            }
        }
    }

    /// The state after a |0⟩ qubit is inserted at local offset `at`.
    #[must_use]
    pub fn with_inserted_qubit(&self, at: usize) -> InitialState {
        let spread = |key: u64| {
            let low = key & low_mask(at);
            ((key >> at) << (at + 1)) | low
        };
        self.map_keys(spread)
    }

    /// The state after local offset `at` is removed.
    ///
    /// Amplitude distributions are projected onto the more likely value of
    /// the removed qubit and renormalized.
    #[must_use]
    pub fn with_removed_qubit(&self, at: usize) -> InitialState {
        let squeeze = |key: u64| ((key >> (at + 1)) << at) | (key & low_mask(at));
        match self {
            InitialState::Value(value) => InitialState::Value(squeeze(*value)),
            InitialState::Amplitudes(amps) => {
                let bit = 1u64 << at;
                let p_one: f64 = amps
                    .iter()
                    .filter(|(k, _)| *k & bit != 0)
                    .map(|(_, a)| a.norm_sqr())
                    .sum();
                let keep = u64::from(p_one > 0.5) * bit;
                let kept: Vec<(u64, Complex64)> = amps
                    .iter()
                    .filter(|(k, _)| *k & bit == keep)
                    .map(|(&k, &a)| (squeeze(k), a))
                    .collect();
                let norm = kept.iter().map(|(_, a)| a.norm_sqr()).sum::<f64>().sqrt();
                if norm == 0.0 {
                    return InitialState::Value(0);
                }
                InitialState::Amplitudes(kept.into_iter().map(|(k, a)| (k, a / norm)).collect())
            }
        }
    }

    fn map_keys(&self, f: impl Fn(u64) -> u64) -> InitialState {
        match self {
            InitialState::Value(value) => InitialState::Value(f(*value)),
            InitialState::Amplitudes(amps) => {
                InitialState::Amplitudes(amps.iter().map(|(&k, &a)| (f(k), a)).collect())
            }
        }
    }
}

fn low_mask(bits: usize) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// A declared register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterEntry {
    name: String,
    width: usize,
    initial: InitialState,
}

impl RegisterEntry {
    /// Register name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of qubits.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Initial distribution.
    pub fn initial(&self) -> &InitialState {
        &self.initial
    }
}

/// Declared registers in declaration order; their concatenation is the root
/// register.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterTable {
    entries: Vec<RegisterEntry>,
}

impl RegisterTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of declared registers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no register is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Root register width.
    pub fn width(&self) -> usize {
        self.entries.iter().map(|e| e.width).sum()
    }

    /// Declared registers in order.
    pub fn entries(&self) -> &[RegisterEntry] {
        &self.entries
    }

    /// The root register.
    pub fn root(&self) -> Register {
        Register::new(0, self.width())
    }

    /// Look up a register by name; `root` names the root register.
    pub fn get(&self, name: &str) -> Option<Register> {
        if name == ROOT {
            return Some(self.root());
        }
        let index = self.position(name)?;
        Some(self.register_at(index))
    }

    /// Declaration index of a register.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Human-readable name for a handle: the register name when the handle
    /// matches a declared register, otherwise a root slice.
    pub fn describe(&self, register: Register) -> String {
        for (index, entry) in self.entries.iter().enumerate() {
            let declared = self.register_at(index);
            if declared == register {
                return format!("'{}'", entry.name);
            }
            if declared.range().contains(&register.offset)
                && register.offset + register.width <= declared.offset + declared.width
            {
                let start = register.offset - declared.offset;
                return format!("'{}[{}:{}]'", entry.name, start, start + register.width);
            }
        }
        register.to_string()
    }

    /// Append a register.
    pub fn declare(
        &mut self,
        name: &str,
        width: usize,
        initial: InitialState,
    ) -> SessionResult<Register> {
        self.insert(self.entries.len(), name, width, initial)
    }

    /// Insert a register before declaration index `index`.
    pub fn insert(
        &mut self,
        index: usize,
        name: &str,
        width: usize,
        initial: InitialState,
    ) -> SessionResult<Register> {
        validate_name(name)?;
        if name == ROOT || self.position(name).is_some() {
            return Err(SessionError::DuplicateRegister(name.to_string()));
        }
        if width == 0 {
            return Err(SessionError::InvalidParameter {
                method: "declare_register",
                parameter: "width",
                reason: "register must hold at least one qubit".into(),
            });
        }
        if let InitialState::Value(value) = initial {
            if width < 64 && value >> width != 0 {
                return Err(SessionError::InvalidParameter {
                    method: "declare_register",
                    parameter: "initial",
                    reason: format!("value {value} does not fit {width} qubits"),
                });
            }
        }
        let index = index.min(self.entries.len());
        self.entries.insert(
            index,
            RegisterEntry {
                name: name.to_string(),
                width,
                initial,
            },
        );
        Ok(self.register_at(index))
    }

    /// Remove a register, returning the root span it occupied.
    pub fn remove(&mut self, name: &str) -> SessionResult<Register> {
        let index = self.index_of(name)?;
        let register = self.register_at(index);
        self.entries.remove(index);
        Ok(register)
    }

    /// Insert a |0⟩ qubit at local offset `at` (at most the width) of
    /// `name`, returning its root offset.
    pub fn insert_qubit(&mut self, name: &str, at: usize) -> SessionResult<usize> {
        let index = self.index_of(name)?;
        let register = self.register_at(index);
        if at > register.width {
            return Err(SessionError::OffsetOutOfRange {
                method: "insert_qubit",
                register: format!("'{name}'"),
                offset: at,
                width: register.width,
            });
        }
        let entry = &mut self.entries[index];
        entry.initial = entry.initial.with_inserted_qubit(at);
        entry.width += 1;
        Ok(register.offset + at)
    }

    /// Remove local offset `at` of `name`, returning its root offset.
    /// A register that loses its last qubit is removed.
    pub fn remove_qubit(&mut self, name: &str, at: usize) -> SessionResult<usize> {
        let index = self.index_of(name)?;
        let register = self.register_at(index);
        if at >= register.width {
            return Err(SessionError::OffsetOutOfRange {
                method: "delete_qubit",
                register: format!("'{name}'"),
                offset: at,
                width: register.width,
            });
        }
        if register.width == 1 {
            self.entries.remove(index);
        } else {
            let entry = &mut self.entries[index];
            entry.initial = entry.initial.with_removed_qubit(at);
            entry.width -= 1;
        }
        Ok(register.offset + at)
    }

    /// Tensor every register's initial state onto an empty engine.
    pub fn prepare(&self, engine: &mut QuantumEngine) -> EngineResult<()> {
        for entry in &self.entries {
            entry.initial.prepare(engine, entry.width)?;
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> SessionResult<usize> {
        self.position(name)
            .ok_or_else(|| SessionError::UnknownRegister(name.to_string()))
    }

    fn register_at(&self, index: usize) -> Register {
        let offset = self.entries[..index].iter().map(|e| e.width).sum();
        Register::new(offset, self.entries[index].width)
    }
}

fn validate_name(name: &str) -> SessionResult<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidParameter {
            method: "declare_register",
            parameter: "name",
            reason: format!("'{name}' is not an identifier"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_follow_declaration_order() {
        let mut table = RegisterTable::new();
        let a = table.declare("a", 2, InitialState::Value(0)).unwrap();
        let b = table.declare("b", 3, InitialState::Value(5)).unwrap();
        assert_eq!(a.range(), 0..2);
        assert_eq!(b.range(), 2..5);
        assert_eq!(table.root().width(), 5);
        assert_eq!(table.get("root"), Some(table.root()));
    }

    #[test]
    fn test_names_validated() {
        let mut table = RegisterTable::new();
        table.declare("q", 1, InitialState::Value(0)).unwrap();
        assert!(matches!(
            table.declare("q", 1, InitialState::Value(0)),
            Err(SessionError::DuplicateRegister(_))
        ));
        assert!(matches!(
            table.declare("root", 1, InitialState::Value(0)),
            Err(SessionError::DuplicateRegister(_))
        ));
        assert!(table.declare("1q", 1, InitialState::Value(0)).is_err());
        assert!(table.declare("big", 2, InitialState::Value(4)).is_err());
    }

    #[test]
    fn test_describe() {
        let mut table = RegisterTable::new();
        table.declare("a", 2, InitialState::Value(0)).unwrap();
        let b = table.declare("b", 3, InitialState::Value(0)).unwrap();
        assert_eq!(table.describe(b), "'b'");
        assert_eq!(table.describe(b.slice(1..3).unwrap()), "'b[1:3]'");
        assert_eq!(table.describe(Register::new(1, 2)), "root[1:3]");
    }

    #[test]
    fn test_initial_value_follows_qubit_edits() {
        // value 0b101 with a |0⟩ inserted at offset 1 becomes 0b1001
        let state = InitialState::Value(0b101).with_inserted_qubit(1);
        assert_eq!(state, InitialState::Value(0b1001));
        assert_eq!(state.with_removed_qubit(1), InitialState::Value(0b101));
    }

    #[test]
    fn test_removed_qubit_projects_amplitudes() {
        let half = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
        let state = InitialState::Amplitudes(BTreeMap::from([(0b00, half), (0b11, half)]));
        match state.with_removed_qubit(0) {
            InitialState::Amplitudes(amps) => {
                assert_eq!(amps.len(), 1);
                assert!((amps[&0].re - 1.0).abs() < 1e-12);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }
}
