//! Fatal error path.
//!
//! Called when a program hits an error that must not be intercepted:
//! type errors, out-of-bounds list/bytes access, popping an empty list,
//! division or modulo by zero, and any `hurl` that no handler catches.

use std::fmt;

use crate::error::RuntimeError;
use crate::value::Value;

/// Print `msg` to stderr and terminate the process with status 1.
///
/// The hurl stack is bypassed: a surrounding protected region does not
/// see the error. Covered by `tests/fatal.rs`, which runs it in a child
/// process.
pub fn fatal(msg: &dyn fmt::Display) -> ! {
    log::debug!("fatal runtime error, exiting");
    eprintln!("{msg}");
    std::process::exit(1);
}

/// Terminate with the standard type-error message for `op`.
pub fn type_error(op: &'static str, got: &Value, other: Option<&Value>) -> ! {
    fatal(&RuntimeError::Type {
        op,
        got: got.tag(),
        other: other.map(Value::tag),
    })
}
