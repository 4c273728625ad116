//! The hurl stack: the runtime's only catchable error path.
//!
//! A protected region is opened with [`protect`]. Inside it, [`hurl`]
//! records the error value as the thread's last error and unwinds back
//! to the innermost open region, discarding every frame in between.
//! With no region open, a hurl prints the value and exits with status 1.
//!
//! Each thread has its own stack of at most [`MAX_DEPTH`] regions. A
//! region opened beyond that depth is not registered: its body still
//! runs, but hurls inside it propagate to the nearest registered region.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

use crate::error::RuntimeError;
use crate::value::{make_string, Value};

/// Maximum number of protected regions open at once on one thread.
pub const MAX_DEPTH: usize = 64;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_ERROR: RefCell<Value> = const { RefCell::new(Value::Nil) };
}

/// Unwind payload carrying a hurled value.
struct Hurled(Value);

/// Pops one registered frame when dropped, including during unwinding.
struct Frame;

impl Drop for Frame {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

fn try_push() -> Option<Frame> {
    DEPTH.with(|d| {
        let depth = d.get();
        if depth < MAX_DEPTH {
            d.set(depth + 1);
            Some(Frame)
        } else {
            None
        }
    })
}

/// Run `body` as a protected region.
///
/// Returns `Err(value)` if `body` (or anything it calls) hurled `value`.
/// Fatal errors are not intercepted: they end the process before
/// control ever returns here. Rust panics that are not hurls keep
/// unwinding.
pub fn protect<T>(body: impl FnOnce() -> T) -> Result<T, Value> {
    let Some(frame) = try_push() else {
        log::warn!("hurl stack full ({MAX_DEPTH} regions), region left unprotected");
        return Ok(body());
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(body));
    drop(frame);
    match outcome {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<Hurled>() {
            Ok(hurled) => Err(hurled.0),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Throw `value`.
///
/// Records it as the last error, then transfers control to the innermost
/// protected region. With none open, prints the value and exits.
pub fn hurl(value: Value) -> ! {
    LAST_ERROR.with(|e| *e.borrow_mut() = value.clone());
    if depth() > 0 {
        log::trace!("hurl: unwinding to protected region");
        panic::resume_unwind(Box::new(Hurled(value)));
    }
    crate::panic::fatal(&value)
}

/// Hurl a plain message.
pub fn hurl_msg(msg: &str) -> ! {
    hurl(make_string(msg))
}

/// Hurl the message of a runtime error.
pub fn hurl_error(err: RuntimeError) -> ! {
    hurl(make_string(&err.to_string()))
}

/// The value most recently hurled on this thread, or nil.
pub fn last_error() -> Value {
    LAST_ERROR.with(|e| e.borrow().clone())
}

pub fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = Value::Nil);
}

/// Number of protected regions currently registered on this thread.
pub fn depth() -> usize {
    DEPTH.with(Cell::get)
}
