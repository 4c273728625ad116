//! Program-level condition variable.
//!
//! A waiter takes the condvar's internal gate before releasing the
//! program mutex, and a signaller must take the same gate before
//! notifying. A signal sent after the waiter released the program mutex
//! therefore cannot slip past it. As with POSIX condvars, each condvar
//! should be used with one program mutex at a time, and waiters must
//! re-check their predicate after waking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{raise, RuntimeError};
use crate::runtime::handles;
use crate::sync::mutex::{self, ScriptMutex};
use crate::value::{int_arg, Value};

pub struct ScriptCondvar {
    gate: Mutex<()>,
    cond: Condvar,
}

impl ScriptCondvar {
    pub fn new() -> Self {
        ScriptCondvar {
            gate: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Release `held`, wait for a signal, then re-acquire `held`.
    pub fn wait(&self, held: &ScriptMutex) {
        let mut gate = self.gate.lock();
        held.unlock();
        self.cond.wait(&mut gate);
        drop(gate);
        held.lock();
    }

    /// Like [`wait`](Self::wait) but gives up at `deadline`. Returns
    /// `true` when woken by a signal, `false` on timeout.
    pub fn wait_until(&self, held: &ScriptMutex, deadline: Instant) -> bool {
        let mut gate = self.gate.lock();
        held.unlock();
        let result = self.cond.wait_until(&mut gate, deadline);
        drop(gate);
        held.lock();
        !result.timed_out()
    }

    pub fn signal(&self) {
        let _gate = self.gate.lock();
        self.cond.notify_one();
    }

    pub fn broadcast(&self) {
        let _gate = self.gate.lock();
        self.cond.notify_all();
    }
}

impl Default for ScriptCondvar {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(op: &'static str, handle: &Value) -> Arc<ScriptCondvar> {
    handles().condvars.lock().resolve(op, handle)
}

// ── Public API ────────────────────────────────────────────────────────

pub fn condvar_new() -> Value {
    Value::Int(handles().condvars.lock().insert(ScriptCondvar::new()))
}

/// Wait on `cv`. The caller must hold the program mutex `m`.
pub fn condvar_wait(cv: &Value, m: &Value) {
    let cv = resolve("condvar_wait", cv);
    let m = mutex::resolve("condvar_wait", m);
    cv.wait(&m);
}

/// Wait on `cv` for at most `ms` milliseconds. Returns aye when
/// signalled, nae on timeout.
pub fn condvar_timed_wait(cv: &Value, m: &Value, ms: &Value) -> Value {
    let ms = int_arg("condvar_timed_wait", ms);
    let Ok(ms) = u64::try_from(ms) else {
        raise(RuntimeError::message(
            "condvar_timed_wait expects non-negative timeout",
        ));
    };
    let cv = resolve("condvar_timed_wait", cv);
    let m = mutex::resolve("condvar_timed_wait", m);
    let deadline = Instant::now() + Duration::from_millis(ms);
    Value::Bool(cv.wait_until(&m, deadline))
}

pub fn condvar_signal(cv: &Value) {
    resolve("condvar_signal", cv).signal();
}

pub fn condvar_broadcast(cv: &Value) {
    resolve("condvar_broadcast", cv).broadcast();
}

pub fn condvar_free(cv: &Value) -> Value {
    Value::Bool(handles().condvars.lock().release("condvar_free", cv).is_some())
}
