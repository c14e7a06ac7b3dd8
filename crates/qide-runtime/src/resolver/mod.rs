//! Textual register references.
//!
//! A reference is `name` (the whole register), `name[i]` (one qubit) or
//! `name[i:j]` (the half-open slice `i..j`). The reserved name `root`
//! addresses the root register. Argument lists separate references and
//! literals with commas:
//!
//! ```rust
//! use qide_runtime::{Argument, InitialState, Session};
//!
//! let mut session = Session::new();
//! session.declare_register("q", 3, InitialState::Value(0)).unwrap();
//! let args = session.resolver().arguments("q[0:2], q[2], 0.5").unwrap();
//! assert_eq!(args.len(), 3);
//! assert!(matches!(args[1], Argument::Qubit(_)));
//! ```

mod lexer;

use crate::error::{ResolveError, ResolveResult};
use crate::extension::Argument;
use crate::register::{QubitRef, Register, RegisterTable};

use lexer::{SpannedToken, Token, tokenize};

/// Resolves reference text against a register table.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registers: &'a RegisterTable,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over `registers`.
    pub fn new(registers: &'a RegisterTable) -> Self {
        Self { registers }
    }

    /// Resolve a register reference. A single-qubit reference resolves to
    /// a width-1 register.
    pub fn register(&self, text: &str) -> ResolveResult<Register> {
        let mut parser = Parser::new(text)?;
        let argument = parser.reference(self.registers)?;
        parser.finish()?;
        Ok(match argument {
            Reference::Qubit(qubit) => qubit.as_register(),
            Reference::Register(register) => register,
        })
    }

    /// Resolve a qubit reference. Whole registers and slices are accepted
    /// when they are one qubit wide.
    pub fn qubit(&self, text: &str) -> ResolveResult<QubitRef> {
        let mut parser = Parser::new(text)?;
        let argument = parser.reference(self.registers)?;
        parser.finish()?;
        match argument {
            Reference::Qubit(qubit) => Ok(qubit),
            Reference::Register(register) if register.width() == 1 => {
                Ok(QubitRef::at_root(register.offset()))
            }
            Reference::Register(register) => Err(ResolveError::NotAQubit {
                reference: text.trim().to_string(),
                width: register.width(),
            }),
        }
    }

    /// Resolve a comma-separated argument list. Empty text is an empty
    /// list.
    pub fn arguments(&self, text: &str) -> ResolveResult<Vec<Argument>> {
        let mut parser = Parser::new(text)?;
        let mut arguments = Vec::new();
        if parser.is_eof() {
            return Ok(arguments);
        }
        loop {
            arguments.push(parser.argument(self.registers)?);
            if !parser.consume(&Token::Comma) {
                break;
            }
        }
        parser.finish()?;
        Ok(arguments)
    }
}

enum Reference {
    Register(Register),
    Qubit(QubitRef),
}

impl From<Reference> for Argument {
    fn from(reference: Reference) -> Self {
        match reference {
            Reference::Register(register) => Argument::Register(register),
            Reference::Qubit(qubit) => Argument::Qubit(qubit),
        }
    }
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn new(source: &str) -> ResolveResult<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            len: source.len(),
        })
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.len, |t| t.span.start)
    }

    fn advance(&mut self, expected: &'static str) -> ResolveResult<Token> {
        let token = self
            .peek()
            .cloned()
            .ok_or(ResolveError::UnexpectedEnd(expected))?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self, expected: &'static str, found: &Token) -> ResolveError {
        ResolveError::UnexpectedToken {
            position: self.tokens.get(self.pos.saturating_sub(1)).map_or(0, |t| t.span.start),
            expected,
            found: found.to_string(),
        }
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> ResolveResult<()> {
        let found = self.advance(expected)?;
        if found == token {
            Ok(())
        } else {
            Err(self.unexpected(expected, &found))
        }
    }

    fn finish(&self) -> ResolveResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ResolveError::UnexpectedToken {
                position: self.position(),
                expected: "end of input",
                found: token.to_string(),
            }),
        }
    }

    fn argument(&mut self, registers: &RegisterTable) -> ResolveResult<Argument> {
        match self.peek() {
            Some(Token::IntLiteral(v)) => {
                let v = *v;
                self.pos += 1;
                Ok(Argument::Int(v))
            }
            Some(Token::FloatLiteral(v)) => {
                let v = *v;
                self.pos += 1;
                Ok(Argument::Float(v))
            }
            Some(Token::True) => {
                self.pos += 1;
                Ok(Argument::Bool(true))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Argument::Bool(false))
            }
            _ => self.reference(registers).map(Argument::from),
        }
    }

    fn reference(&mut self, registers: &RegisterTable) -> ResolveResult<Reference> {
        let name = match self.advance("a register name")? {
            Token::Identifier(name) => name,
            other => return Err(self.unexpected("a register name", &other)),
        };
        let register = registers
            .get(&name)
            .ok_or_else(|| ResolveError::UnknownRegister(name.clone()))?;
        if !self.consume(&Token::LBracket) {
            return Ok(Reference::Register(register));
        }

        let start = self.index()?;
        if self.consume(&Token::Colon) {
            let end = self.index()?;
            self.expect(Token::RBracket, "']'")?;
            let out_of_bounds = |index| ResolveError::IndexOutOfBounds {
                register: name.clone(),
                index,
                width: register.width(),
            };
            if start > register.width() as u64 {
                return Err(out_of_bounds(start));
            }
            if end > register.width() as u64 {
                return Err(out_of_bounds(end));
            }
            if start >= end {
                return Err(ResolveError::EmptySlice {
                    register: name.clone(),
                    start,
                    end,
                });
            }
            return register
                .slice(start as usize..end as usize)
                .map(Reference::Register)
                .ok_or_else(|| out_of_bounds(end));
        }

        self.expect(Token::RBracket, "']' or ':'")?;
        usize::try_from(start)
            .ok()
            .and_then(|index| register.qubit(index))
            .map(Reference::Qubit)
            .ok_or(ResolveError::IndexOutOfBounds {
                register: name,
                index: start,
                width: register.width(),
            })
    }

    fn index(&mut self) -> ResolveResult<u64> {
        match self.advance("an index")? {
            Token::IntLiteral(v) => u64::try_from(v).map_err(|_| ResolveError::UnexpectedToken {
                position: self.tokens[self.pos - 1].span.start,
                expected: "a non-negative index",
                found: v.to_string(),
            }),
            other => Err(self.unexpected("an index", &other)),
        }
    }
}
