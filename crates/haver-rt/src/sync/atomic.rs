//! Mutex-guarded integer cell.
//!
//! Not lock-free: every operation, including compare-and-swap, runs
//! under the cell's own lock.

use parking_lot::Mutex;

use crate::runtime::handles;
use crate::value::{int_arg, Value};

pub struct ScriptAtomic {
    value: Mutex<i64>,
}

impl ScriptAtomic {
    pub fn new(initial: i64) -> Self {
        ScriptAtomic {
            value: Mutex::new(initial),
        }
    }

    pub fn load(&self) -> i64 {
        *self.value.lock()
    }

    pub fn store(&self, value: i64) {
        *self.value.lock() = value;
    }

    /// Add `delta` (wrapping) and return the new value.
    pub fn add(&self, delta: i64) -> i64 {
        let mut value = self.value.lock();
        *value = value.wrapping_add(delta);
        *value
    }

    /// Replace the value with `new` if it currently equals `expected`.
    pub fn compare_and_swap(&self, expected: i64, new: i64) -> bool {
        let mut value = self.value.lock();
        if *value != expected {
            return false;
        }
        *value = new;
        true
    }
}

// ── Public API ────────────────────────────────────────────────────────

pub fn atomic_new(initial: &Value) -> Value {
    let initial = int_arg("atomic_new", initial);
    Value::Int(handles().atomics.lock().insert(ScriptAtomic::new(initial)))
}

pub fn atomic_load(handle: &Value) -> Value {
    let cell = handles().atomics.lock().resolve("atomic_load", handle);
    Value::Int(cell.load())
}

pub fn atomic_store(handle: &Value, value: &Value) {
    let value = int_arg("atomic_store", value);
    let cell = handles().atomics.lock().resolve("atomic_store", handle);
    cell.store(value);
}

pub fn atomic_add(handle: &Value, delta: &Value) -> Value {
    let delta = int_arg("atomic_add", delta);
    let cell = handles().atomics.lock().resolve("atomic_add", handle);
    Value::Int(cell.add(delta))
}

pub fn atomic_cas(handle: &Value, expected: &Value, new: &Value) -> Value {
    let expected = int_arg("atomic_cas", expected);
    let new = int_arg("atomic_cas", new);
    let cell = handles().atomics.lock().resolve("atomic_cas", handle);
    Value::Bool(cell.compare_and_swap(expected, new))
}

pub fn atomic_free(handle: &Value) -> Value {
    Value::Bool(handles().atomics.lock().release("atomic_free", handle).is_some())
}
