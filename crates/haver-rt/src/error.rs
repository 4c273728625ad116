//! Runtime error kinds and their user-facing messages.
//!
//! The runtime has three ways of reporting a failure and every error kind
//! belongs to exactly one of the first two:
//!
//! - **Fatal**: printed to stderr, then the process exits with status 1.
//!   Nothing can intercept these (see [`crate::panic::fatal`]).
//! - **Catchable**: handed to [`crate::hurl::hurl`], which unwinds to the
//!   innermost protected region or, when there is none, behaves as fatal.
//! - **Result records**: socket/DNS/TLS calls never raise for ordinary
//!   failures; they return `{ok, value | error, code}` dicts instead
//!   (see [`crate::record`]).

use std::fmt;

use crate::value::Tag;

/// Whether an error terminates the process or unwinds to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Catchable,
}

/// Every error the runtime itself can raise.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// An operation received operands of the wrong type.
    Type {
        op: &'static str,
        got: Tag,
        other: Option<Tag>,
    },
    /// List or bytes access outside `0..len` after negative-index adjustment.
    Index {
        index: i64,
        len: i64,
        what: &'static str,
    },
    /// `pop` on an empty list.
    EmptyPop,
    DivisionByZero,
    ModuloByZero,
    /// A string could not be fully parsed as a number.
    Conversion { text: String, target: NumberKind },
    /// A non-string, non-numeric value could not be converted to a number.
    Unconvertible { type_name: &'static str, target: NumberKind },
    /// Dict lookup of a key that is not present. Carries the stringified key.
    KeyNotFound(String),
    /// A handle of the wrong kind, or one that has been released.
    Handle { kind: &'static str },
    /// A free-form domain error raised by a runtime entry point.
    Message(String),
}

/// The numeric type a conversion was aiming for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Integer,
    Float,
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberKind::Integer => write!(f, "an integer"),
            NumberKind::Float => write!(f, "a float"),
        }
    }
}

impl RuntimeError {
    /// Shorthand for a domain error carrying `msg`.
    pub fn message(msg: impl Into<String>) -> Self {
        RuntimeError::Message(msg.into())
    }

    pub fn severity(&self) -> Severity {
        match self {
            RuntimeError::Type { .. }
            | RuntimeError::Index { .. }
            | RuntimeError::EmptyPop
            | RuntimeError::DivisionByZero
            | RuntimeError::ModuloByZero => Severity::Fatal,
            RuntimeError::Conversion { .. }
            | RuntimeError::Unconvertible { .. }
            | RuntimeError::KeyNotFound(_)
            | RuntimeError::Handle { .. }
            | RuntimeError::Message(_) => Severity::Catchable,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Type {
                op,
                got,
                other: Some(other),
            } => write!(
                f,
                "Och! Type error in '{op}': got {} and {}",
                got.name(),
                other.name()
            ),
            RuntimeError::Type {
                op,
                got,
                other: None,
            } => write!(f, "Och! Type error in '{op}': got {}", got.name()),
            RuntimeError::Index { index, len, what } => {
                write!(f, "Och! Index {index} oot o' bounds ({what} has {len} items)")
            }
            RuntimeError::EmptyPop => write!(f, "Och! Cannae yank from an empty list!"),
            RuntimeError::DivisionByZero => write!(f, "Och! Division by zero!"),
            RuntimeError::ModuloByZero => write!(f, "Och! Modulo by zero!"),
            RuntimeError::Conversion { text, target } => {
                write!(f, "Cannae turn '{text}' intae {target}")
            }
            RuntimeError::Unconvertible { type_name, target } => {
                write!(f, "Cannae turn {type_name} intae {target}")
            }
            RuntimeError::KeyNotFound(key) => {
                write!(f, "Awa' an bile yer heid! '{key}' hasnae been defined yet")
            }
            RuntimeError::Handle { kind } => write!(f, "Invalid {kind} handle"),
            RuntimeError::Message(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Raise `err` through the channel its severity calls for. Never returns.
pub fn raise(err: RuntimeError) -> ! {
    match err.severity() {
        Severity::Fatal => crate::panic::fatal(&err),
        Severity::Catchable => crate::hurl::hurl_error(err),
    }
}
