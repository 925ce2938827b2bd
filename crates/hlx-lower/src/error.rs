//! Lowering errors.

use std::fmt;

use hlx_ir::{Location, ValueId};
use hlx_program::{BuildError, ShardingError};
use thiserror::Error;

/// Errors that can occur while lowering a module or block.
#[derive(Debug, Error)]
pub enum LowerError {
    #[error("malformed attribute `{name}`: {message}")]
    MalformedAttribute { name: String, message: String },

    #[error("unsupported value `{value}` for attribute `{name}`")]
    UnsupportedValue { name: String, value: String },

    #[error("invalid sharding in `{name}`: {source}")]
    Sharding {
        name: String,
        #[source]
        source: ShardingError,
    },

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("call cycle: {}", .chain.join(" -> "))]
    CallCycle { chain: Vec<String> },

    #[error("shape representation callback failed: {0}")]
    LayoutCallback(String),

    #[error("use of undefined value {0}")]
    UndefinedValue(ValueId),

    #[error("{what}: expected {expected}, found {found}")]
    ArityMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("module has no entry function `main`")]
    NoEntry,

    #[error("program builder error: {0}")]
    Build(#[from] BuildError),

    #[error("function `{caller}` calls unknown function `{callee}`")]
    MissingCallee { caller: String, callee: String },

    #[error("in {op}{}: {source}", At(.location))]
    InOp {
        op: String,
        location: Option<Location>,
        #[source]
        source: Box<LowerError>,
    },
}

/// Coarse classification of a [`LowerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    MalformedAttribute,
    UnsupportedConstruct,
    StructuralReference,
    MissingCallee,
}

impl LowerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LowerError::MalformedAttribute { .. }
            | LowerError::UnsupportedValue { .. }
            | LowerError::Sharding { .. } => ErrorClass::MalformedAttribute,
            LowerError::Unsupported(_)
            | LowerError::CallCycle { .. }
            | LowerError::LayoutCallback(_) => ErrorClass::UnsupportedConstruct,
            LowerError::UndefinedValue(_)
            | LowerError::ArityMismatch { .. }
            | LowerError::NoEntry
            | LowerError::Build(_) => ErrorClass::StructuralReference,
            LowerError::MissingCallee { .. } => ErrorClass::MissingCallee,
            LowerError::InOp { source, .. } => source.class(),
        }
    }

    /// The innermost error, with op context stripped.
    pub fn root_cause(&self) -> &LowerError {
        match self {
            LowerError::InOp { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Attach the op kind and location the error was raised in.
    pub fn in_op(self, op: &str, location: Option<Location>) -> Self {
        LowerError::InOp {
            op: op.to_string(),
            location,
            source: Box::new(self),
        }
    }

    pub(crate) fn malformed(name: &str, message: impl Into<String>) -> Self {
        LowerError::MalformedAttribute {
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn arity(what: impl Into<String>, expected: usize, found: usize) -> Self {
        LowerError::ArityMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}

struct At<'a>(&'a Option<Location>);

impl fmt::Display for At<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(location) => write!(f, " at {location}"),
            None => Ok(()),
        }
    }
}
