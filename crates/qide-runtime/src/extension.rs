//! Procedure-backed gates.
//!
//! Extension modules register named procedures once at startup. A procedure
//! receives the session and its typed arguments and places gates through
//! the ordinary gate API. Several procedures may share a name; a call is
//! resolved by matching argument types against each overload's formal
//! parameters.
//!
//! Procedures come in two pools:
//!
//! - **Library** procedures carry a forward body, an optional inverse and
//!   optional source text. Invoking one logs a single parametric record that
//!   can later be decomposed into primitives.
//! - **Parser** procedures are user-authored gate definitions. Invoking one
//!   runs it inline, so every primitive it places is logged individually.

use qide_circuit::{ParamValue, ProcedureRef};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{SessionError, SessionResult};
use crate::register::{QubitRef, Register};
use crate::session::Session;

/// Signature shared by forward and inverse procedure bodies.
pub type Procedure = Arc<dyn Fn(&mut Session, &[Argument]) -> SessionResult<()> + Send + Sync>;

/// Type of a formal parameter or actual argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    /// A register or register slice.
    Register,
    /// A single qubit.
    Qubit,
    /// Integer.
    Int,
    /// Floating-point number.
    Float,
    /// Boolean.
    Bool,
}

impl ParamType {
    /// Whether an argument of this type can be passed for `parameter`.
    fn accepts(self, argument: &Argument) -> bool {
        match (self, argument) {
            (ParamType::Register, Argument::Register(_) | Argument::Qubit(_)) => true,
            (ParamType::Qubit, Argument::Qubit(_)) => true,
            (ParamType::Qubit, Argument::Register(r)) => r.width() == 1,
            (ParamType::Int, Argument::Int(_)) => true,
            (ParamType::Float, Argument::Float(_) | Argument::Int(_)) => true,
            (ParamType::Bool, Argument::Bool(_)) => true,
            _ => false,
        }
    }
}

/// An actual argument of a procedure call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// A register or register slice.
    Register(Register),
    /// A single qubit.
    Qubit(QubitRef),
    /// Integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
}

impl Argument {
    /// The type of this argument.
    pub fn param_type(&self) -> ParamType {
        match self {
            Argument::Register(_) => ParamType::Register,
            Argument::Qubit(_) => ParamType::Qubit,
            Argument::Int(_) => ParamType::Int,
            Argument::Float(_) => ParamType::Float,
            Argument::Bool(_) => ParamType::Bool,
        }
    }

    /// Convert to the declared parameter type. The pair must already have
    /// passed the parameter check.
    fn coerce(self, to: ParamType) -> Argument {
        match (to, self) {
            (ParamType::Register, Argument::Qubit(q)) => Argument::Register(q.as_register()),
            (ParamType::Qubit, Argument::Register(r)) if r.width() == 1 => {
                Argument::Qubit(QubitRef::at_root(r.offset()))
            }
            (ParamType::Float, Argument::Int(i)) => Argument::Float(i as f64),
            _ => self,
        }
    }

    /// Convert to the model-space form stored in a parametric record.
    pub fn to_param_value(&self) -> ParamValue {
        match *self {
            Argument::Register(r) => ParamValue::Register {
                begin: r.offset(),
                width: r.width(),
            },
            Argument::Qubit(q) => ParamValue::Qubit(q.root_offset()),
            Argument::Int(i) => ParamValue::Int(i),
            Argument::Float(f) => ParamValue::Float(f),
            Argument::Bool(b) => ParamValue::Bool(b),
        }
    }

    /// Rebuild a live argument from a parametric record's parameter.
    pub fn from_param_value(value: &ParamValue) -> Argument {
        match *value {
            ParamValue::Register { begin, width } => Argument::Register(Register::new(begin, width)),
            ParamValue::Qubit(offset) => Argument::Qubit(QubitRef::at_root(offset)),
            ParamValue::Int(i) => Argument::Int(i),
            ParamValue::Float(f) => Argument::Float(f),
            ParamValue::Bool(b) => Argument::Bool(b),
        }
    }

    /// Get the register argument.
    pub fn as_register(&self, index: usize) -> SessionResult<Register> {
        match self {
            Argument::Register(r) => Ok(*r),
            Argument::Qubit(q) => Ok(q.as_register()),
            _ => Err(self.mismatch(index, ParamType::Register)),
        }
    }

    /// Get the qubit argument.
    pub fn as_qubit(&self, index: usize) -> SessionResult<QubitRef> {
        match self {
            Argument::Qubit(q) => Ok(*q),
            Argument::Register(r) if r.width() == 1 => Ok(QubitRef::at_root(r.offset())),
            _ => Err(self.mismatch(index, ParamType::Qubit)),
        }
    }

    /// Get the integer argument.
    pub fn as_int(&self, index: usize) -> SessionResult<i64> {
        match self {
            Argument::Int(i) => Ok(*i),
            _ => Err(self.mismatch(index, ParamType::Int)),
        }
    }

    /// Get the numeric argument.
    pub fn as_float(&self, index: usize) -> SessionResult<f64> {
        match self {
            Argument::Float(f) => Ok(*f),
            Argument::Int(i) => Ok(*i as f64),
            _ => Err(self.mismatch(index, ParamType::Float)),
        }
    }

    /// Get the boolean argument.
    pub fn as_bool(&self, index: usize) -> SessionResult<bool> {
        match self {
            Argument::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(index, ParamType::Bool)),
        }
    }

    fn mismatch(&self, index: usize, expected: ParamType) -> SessionError {
        SessionError::ArgumentMismatch {
            index,
            expected,
            found: self.param_type(),
        }
    }
}

/// Which pool a procedure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionKind {
    /// Logged as one parametric record; supports decomposition.
    Library,
    /// Run inline; its primitives are logged individually.
    Parser,
}

/// A registered procedure.
#[derive(Clone)]
pub struct Extension {
    name: String,
    kind: ExtensionKind,
    params: Vec<ParamType>,
    variadic: Option<ParamType>,
    forward: Procedure,
    inverse: Option<Procedure>,
    source: Option<String>,
}

impl Extension {
    /// Create a library procedure.
    pub fn library<F>(name: impl Into<String>, params: Vec<ParamType>, forward: F) -> Self
    where
        F: Fn(&mut Session, &[Argument]) -> SessionResult<()> + Send + Sync + 'static,
    {
        Self::with_kind(ExtensionKind::Library, name, params, Arc::new(forward))
    }

    /// Create a parser procedure.
    pub fn parser<F>(name: impl Into<String>, params: Vec<ParamType>, forward: F) -> Self
    where
        F: Fn(&mut Session, &[Argument]) -> SessionResult<()> + Send + Sync + 'static,
    {
        Self::with_kind(ExtensionKind::Parser, name, params, Arc::new(forward))
    }

    fn with_kind(
        kind: ExtensionKind,
        name: impl Into<String>,
        params: Vec<ParamType>,
        forward: Procedure,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            params,
            variadic: None,
            forward,
            inverse: None,
            source: None,
        }
    }

    /// Attach an inverse body.
    #[must_use]
    pub fn with_inverse<F>(mut self, inverse: F) -> Self
    where
        F: Fn(&mut Session, &[Argument]) -> SessionResult<()> + Send + Sync + 'static,
    {
        self.inverse = Some(Arc::new(inverse));
        self
    }

    /// Attach source text for display.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Accept zero or more trailing arguments of type `ty`.
    #[must_use]
    pub fn with_variadic(mut self, ty: ParamType) -> Self {
        self.variadic = Some(ty);
        self
    }

    /// Procedure name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool this procedure belongs to.
    pub fn kind(&self) -> ExtensionKind {
        self.kind
    }

    /// Formal parameters, excluding the variadic tail.
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Type of the variadic tail, if any.
    pub fn variadic(&self) -> Option<ParamType> {
        self.variadic
    }

    /// Forward body.
    pub fn forward(&self) -> &Procedure {
        &self.forward
    }

    /// Inverse body, if registered.
    pub fn inverse(&self) -> Option<&Procedure> {
        self.inverse.as_ref()
    }

    /// Source text, if registered.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Whether `args` structurally match the formal parameters.
    pub fn matches(&self, args: &[Argument]) -> bool {
        if args.len() < self.params.len() {
            return false;
        }
        if args.len() > self.params.len() && self.variadic.is_none() {
            return false;
        }
        let fixed = self.params.iter().zip(args).all(|(p, a)| p.accepts(a));
        let tail = match self.variadic {
            Some(ty) => args[self.params.len()..].iter().all(|a| ty.accepts(a)),
            None => true,
        };
        fixed && tail
    }

    /// Convert `args` to the declared parameter types.
    pub fn coerce(&self, args: &[Argument]) -> Vec<Argument> {
        args.iter()
            .enumerate()
            .map(|(i, arg)| match self.params.get(i).copied().or(self.variadic) {
                Some(ty) => arg.coerce(ty),
                None => *arg,
            })
            .collect()
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .field("has_inverse", &self.inverse.is_some())
            .finish_non_exhaustive()
    }
}

/// A group of procedures registered together.
pub trait ExtensionModule {
    /// Module name, for diagnostics.
    fn name(&self) -> &str;

    /// Add this module's procedures to `registry`.
    fn register(&self, registry: &mut ExtensionRegistry);
}

/// All registered procedures, grouped by name.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<Extension>>,
    by_name: FxHashMap<String, Vec<usize>>,
}

impl ExtensionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a procedure, returning its stable index.
    pub fn register(&mut self, extension: Extension) -> usize {
        let index = self.extensions.len();
        self.by_name
            .entry(extension.name.clone())
            .or_default()
            .push(index);
        self.extensions.push(Arc::new(extension));
        index
    }

    /// Register every procedure of `module`.
    pub fn register_module(&mut self, module: &dyn ExtensionModule) {
        module.register(self);
    }

    /// Move every procedure of `other` to the end of this registry,
    /// keeping their order.
    pub fn merge(&mut self, other: ExtensionRegistry) {
        for extension in other.extensions {
            let index = self.extensions.len();
            self.by_name
                .entry(extension.name.clone())
                .or_default()
                .push(index);
            self.extensions.push(extension);
        }
    }

    /// Get a procedure by index.
    pub fn get(&self, index: usize) -> Option<&Arc<Extension>> {
        self.extensions.get(index)
    }

    /// Whether any procedure is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Sorted names of all registered procedures.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Procedures in one pool, in registration order.
    pub fn pool(&self, kind: ExtensionKind) -> impl Iterator<Item = &Arc<Extension>> {
        self.extensions.iter().filter(move |e| e.kind == kind)
    }

    /// Number of registered procedures.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// First procedure named `name`, in registration order, whose
    /// parameters accept `args`. Both pools are searched together.
    pub fn find(&self, name: &str, args: &[Argument]) -> Option<(usize, &Arc<Extension>)> {
        self.by_name
            .get(name)?
            .iter()
            .map(|&index| (index, &self.extensions[index]))
            .find(|(_, extension)| extension.matches(args))
    }

    /// Resolve a parametric record's procedure, re-matching by name and
    /// arguments when the stored index is missing or stale.
    pub fn resolve(&self, procedure: &ProcedureRef, args: &[Argument]) -> Option<Arc<Extension>> {
        if let Some(extension) = procedure
            .index
            .and_then(|i| self.extensions.get(i))
            .filter(|e| e.name == procedure.name)
        {
            return Some(Arc::clone(extension));
        }
        self.find(&procedure.name, args)
            .map(|(_, extension)| Arc::clone(extension))
    }

    /// Source text of the first procedure named `name` that has one.
    pub fn source(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name)?
            .iter()
            .find_map(|&i| self.extensions[i].source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Session, _: &[Argument]) -> SessionResult<()> {
        Ok(())
    }

    fn qubit(offset: usize) -> Argument {
        Argument::Qubit(Register::new(offset, 1).qubit(0).unwrap())
    }

    #[test]
    fn test_qubit_satisfies_register() {
        let ext = Extension::library("f", vec![ParamType::Register], noop);
        assert!(ext.matches(&[qubit(0)]));
        assert_eq!(
            ext.coerce(&[qubit(3)]),
            vec![Argument::Register(Register::new(3, 1))]
        );
    }

    #[test]
    fn test_width_one_register_satisfies_qubit() {
        let ext = Extension::library("f", vec![ParamType::Qubit], noop);
        assert!(ext.matches(&[Argument::Register(Register::new(2, 1))]));
        assert!(!ext.matches(&[Argument::Register(Register::new(2, 2))]));
    }

    #[test]
    fn test_int_satisfies_float() {
        let ext = Extension::library("f", vec![ParamType::Float], noop);
        assert!(ext.matches(&[Argument::Int(2)]));
        assert_eq!(ext.coerce(&[Argument::Int(2)]), vec![Argument::Float(2.0)]);
        assert!(!ext.matches(&[Argument::Bool(true)]));
    }

    #[test]
    fn test_variadic_tail() {
        let ext = Extension::parser("f", vec![ParamType::Register], noop)
            .with_variadic(ParamType::Qubit);
        let reg = Argument::Register(Register::new(0, 2));
        assert!(ext.matches(&[reg]));
        assert!(ext.matches(&[reg, qubit(3), qubit(4)]));
        assert!(!ext.matches(&[reg, Argument::Int(1)]));
        assert!(!ext.matches(&[]));
    }

    #[test]
    fn test_find_prefers_matching_overload() {
        let mut registry = ExtensionRegistry::new();
        registry.register(Extension::parser("rot", vec![ParamType::Register], noop));
        let float = registry.register(Extension::library(
            "rot",
            vec![ParamType::Register, ParamType::Float],
            noop,
        ));

        let reg = Argument::Register(Register::new(0, 2));
        let (index, _) = registry.find("rot", &[reg, Argument::Float(0.5)]).unwrap();
        assert_eq!(index, float);
        let (_, found) = registry.find("rot", &[reg]).unwrap();
        assert_eq!(found.kind(), ExtensionKind::Parser);
        assert!(registry.find("rot", &[Argument::Bool(true)]).is_none());
        assert!(registry.find("missing", &[]).is_none());
    }

    #[test]
    fn test_find_follows_registration_order() {
        let mut registry = ExtensionRegistry::new();
        let first = registry.register(Extension::parser("swap", vec![ParamType::Register], noop));
        registry.register(Extension::library("swap", vec![ParamType::Register], noop));

        let reg = Argument::Register(Register::new(0, 2));
        let (index, found) = registry.find("swap", &[reg]).unwrap();
        assert_eq!(index, first);
        assert_eq!(found.kind(), ExtensionKind::Parser);
    }

    #[test]
    fn test_merge_appends_in_order() {
        let mut registry = ExtensionRegistry::new();
        registry.register(Extension::library("a", vec![], noop));
        let mut staged = ExtensionRegistry::new();
        staged.register(Extension::parser("b", vec![], noop));
        staged.register(Extension::library("a", vec![], noop));

        registry.merge(staged);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(1).unwrap().name(), "b");
        assert_eq!(registry.find("a", &[]).unwrap().0, 0);
    }

    #[test]
    fn test_resolve_rematches_stale_index() {
        let mut registry = ExtensionRegistry::new();
        registry.register(Extension::library("a", vec![], noop));
        registry.register(Extension::library("b", vec![], noop).with_source("b() {}"));

        let stale = ProcedureRef::resolved("b", 0);
        assert_eq!(registry.resolve(&stale, &[]).unwrap().name(), "b");
        assert!(registry.resolve(&ProcedureRef::unresolved("c"), &[]).is_none());
        assert_eq!(registry.source("b"), Some("b() {}"));
        assert_eq!(registry.source("a"), None);
    }
}
