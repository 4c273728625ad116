//! Program-level mutex.
//!
//! Programs lock and unlock in separate calls, so the lock state cannot
//! be a guard on the Rust stack. It is a flag guarded by a
//! `parking_lot::Mutex`, with a condvar to park contending lockers.
//! There is no owner tracking: any thread may unlock, and re-locking
//! from the owning thread deadlocks.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::runtime::handles;
use crate::value::Value;

pub struct ScriptMutex {
    locked: Mutex<bool>,
    unlocked: Condvar,
}

impl ScriptMutex {
    pub fn new() -> Self {
        ScriptMutex {
            locked: Mutex::new(false),
            unlocked: Condvar::new(),
        }
    }

    pub fn lock(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.unlocked.wait(&mut locked);
        }
        *locked = true;
    }

    pub fn try_lock(&self) -> bool {
        let mut locked = self.locked.lock();
        if *locked {
            return false;
        }
        *locked = true;
        true
    }

    pub fn unlock(&self) {
        *self.locked.lock() = false;
        self.unlocked.notify_one();
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

impl Default for ScriptMutex {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn resolve(op: &'static str, handle: &Value) -> Arc<ScriptMutex> {
    handles().mutexes.lock().resolve(op, handle)
}

// ── Public API ────────────────────────────────────────────────────────

pub fn mutex_new() -> Value {
    Value::Int(handles().mutexes.lock().insert(ScriptMutex::new()))
}

pub fn mutex_lock(handle: &Value) {
    resolve("mutex_lock", handle).lock();
}

pub fn mutex_unlock(handle: &Value) {
    resolve("mutex_unlock", handle).unlock();
}

/// Release the handle. Threads still holding or waiting on the mutex keep
/// it alive until they are done. Returns whether the handle was live.
pub fn mutex_free(handle: &Value) -> Value {
    Value::Bool(handles().mutexes.lock().release("mutex_free", handle).is_some())
}

/// Take the lock if it is free. Returns whether it was taken.
pub fn mutex_try_lock(handle: &Value) -> Value {
    Value::Bool(resolve("mutex_try_lock", handle).try_lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hurl::protect;
    use std::time::Duration;

    #[test]
    fn test_try_lock_contention() {
        let m = mutex_new();
        assert_eq!(mutex_try_lock(&m), Value::Bool(true));
        assert_eq!(mutex_try_lock(&m), Value::Bool(false));
        mutex_unlock(&m);
        assert_eq!(mutex_try_lock(&m), Value::Bool(true));
        mutex_unlock(&m);
    }

    #[test]
    fn test_lock_blocks_until_unlock() {
        let m = Arc::new(ScriptMutex::new());
        m.lock();
        let waiter = {
            let m = Arc::clone(&m);
            std::thread::spawn(move || {
                m.lock();
                m.unlock();
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        m.unlock();
        waiter.join().unwrap();
        assert!(!m.is_locked());
    }

    #[test]
    fn test_counter_under_lock() {
        let m = mutex_new();
        let counter = Arc::new(Mutex::new(0i64));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let m = m.clone();
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        mutex_lock(&m);
                        let current = *counter.lock();
                        *counter.lock() = current + 1;
                        mutex_unlock(&m);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(*counter.lock(), 1000);
    }

    #[test]
    fn test_free_while_locked_elsewhere() {
        let m = mutex_new();
        let held = resolve("mutex_lock", &m);
        held.lock();
        assert_eq!(mutex_free(&m), Value::Bool(true));
        // The holder keeps the mutex alive and can still release it.
        held.unlock();
        assert!(!held.is_locked());
        let err = protect(|| mutex_lock(&m)).unwrap_err();
        assert_eq!(err.as_str(), Some("Invalid mutex handle"));
    }

    #[test]
    fn test_wrong_kind_handle() {
        let chan = crate::sync::chan::chan_new(&Value::Int(1));
        let err = protect(|| mutex_lock(&chan)).unwrap_err();
        assert_eq!(err.as_str(), Some("Invalid mutex handle"));
    }
}
