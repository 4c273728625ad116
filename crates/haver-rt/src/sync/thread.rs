//! OS threads running program functions.
//!
//! `thread_spawn` accepts a function or a closure plus an optional list of
//! arguments. A closure's captured values are passed ahead of the
//! explicit arguments. Generated code calls thread entries with a fixed
//! argument window, so a closure may capture at most
//! [`MAX_CAPTURES`] values and a call may carry at most [`MAX_ARGS`]
//! values in total. Both limits are checked in the spawning thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::{raise, RuntimeError};
use crate::gc::Collector;
use crate::panic::type_error;
use crate::runtime::{collector, handles};
use crate::value::{Function, Value};

pub const MAX_CAPTURES: usize = 3;
pub const MAX_ARGS: usize = 6;

/// Book-keeping for one spawned thread. The table entry is released when
/// the thread is joined, or when a detached thread finishes.
pub struct ThreadState {
    join: Mutex<Option<JoinHandle<Value>>>,
    result: Mutex<Option<Value>>,
    lifecycle: Mutex<Lifecycle>,
}

#[derive(Default)]
struct Lifecycle {
    detached: bool,
    finished: bool,
}

impl ThreadState {
    fn new() -> Self {
        ThreadState {
            join: Mutex::new(None),
            result: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    fn is_detached(&self) -> bool {
        self.lifecycle.lock().detached
    }
}

fn release(handle: i64) {
    if handles().threads.lock().remove(handle).is_some() {
        log::trace!("thread handle {handle:#x} released");
    }
}

/// Marks the thread finished when its body returns or unwinds, releasing
/// the handle if nobody can join it any more.
struct Exit {
    handle: i64,
    state: Arc<ThreadState>,
}

impl Drop for Exit {
    fn drop(&mut self) {
        let detached = {
            let mut life = self.state.lifecycle.lock();
            life.finished = true;
            life.detached
        };
        if detached {
            release(self.handle);
        }
    }
}

/// Registers the current thread with the collector for as long as it
/// lives, including when the thread unwinds.
struct Registration(Arc<dyn Collector>);

impl Registration {
    fn enter(collector: Arc<dyn Collector>) -> Self {
        collector.register_thread();
        Registration(collector)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.0.unregister_thread();
    }
}

/// Split a callable into its function and leading arguments.
fn callee(func: &Value) -> (Arc<Function>, Vec<Value>) {
    match func {
        Value::Function(f) => (Arc::clone(f), Vec::new()),
        Value::Closure(c) => {
            if c.captures.len() > MAX_CAPTURES {
                raise(RuntimeError::message(
                    "Closure captures > 3 not supported in threads",
                ));
            }
            (Arc::clone(&c.function), c.captures.clone())
        }
        other => type_error("thread_spawn", other, None),
    }
}

// ── Public API ────────────────────────────────────────────────────────

/// Start `func` on a new OS thread with `args` (nil or a list).
pub fn thread_spawn(func: &Value, args: &Value) -> Value {
    let (function, mut call_args) = callee(func);
    match args {
        Value::Nil => {}
        Value::List(_) => call_args.extend(crate::collections::list::items(args)),
        other => type_error("thread_spawn", other, None),
    }
    if call_args.len() > MAX_ARGS {
        raise(RuntimeError::message("Too many arguments for thread spawn"));
    }

    let gc = collector();
    let name = function.name().to_string();
    let state = Arc::new(ThreadState::new());
    let handle = handles().threads.lock().insert_shared(Arc::clone(&state));
    let exit = Exit {
        handle,
        state: Arc::clone(&state),
    };
    let spawned = std::thread::Builder::new()
        .name(format!("haver:{name}"))
        .spawn(move || {
            let _exit = exit;
            let _registration = Registration::enter(gc);
            log::trace!("thread '{}' started", function.name());
            let result = function.call(&call_args);
            log::trace!("thread '{}' finished", function.name());
            result
        });
    match spawned {
        Ok(join) => *state.join.lock() = Some(join),
        Err(e) => {
            release(handle);
            raise(RuntimeError::message(format!("thread_spawn failed: {e}")))
        }
    }
    log::debug!("spawned thread '{name}' as {handle:#x}");
    Value::Int(handle)
}

/// Wait for the thread to finish and return its result. The handle is
/// released once the result is collected; joining a detached thread
/// hurls.
pub fn thread_join(handle: &Value) -> Value {
    let state = handles().threads.lock().resolve("thread_join", handle);
    if state.is_detached() {
        raise(RuntimeError::message("Cannot join detached thread"));
    }

    // Held across the join so a concurrent joiner waits for the result.
    let mut join = state.join.lock();
    if let Some(running) = join.take() {
        let value = match running.join() {
            Ok(value) => value,
            Err(_) => {
                log::error!("joined thread panicked; result is naething");
                Value::Nil
            }
        };
        *state.result.lock() = Some(value);
        if let Value::Int(raw) = handle {
            release(*raw);
        }
    }
    drop(join);

    let result = state.result.lock().clone();
    result.unwrap_or_default()
}

/// Let the thread run to completion unobserved. Its handle is released
/// when it finishes. Detaching twice is harmless.
pub fn thread_detach(handle: &Value) {
    let state = handles().threads.lock().resolve("thread_detach", handle);
    let finished = {
        let mut life = state.lifecycle.lock();
        if life.detached {
            return;
        }
        life.detached = true;
        life.finished
    };
    // Dropping the JoinHandle detaches the OS thread.
    drop(state.join.lock().take());
    if finished {
        if let Value::Int(raw) = handle {
            release(*raw);
        }
    }
}
