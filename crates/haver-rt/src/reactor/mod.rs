//! Single-threaded readiness and timer reactor.
//!
//! Programs create event loops by id, register socket watches and timers
//! on them, then call [`event_loop_poll`] repeatedly. Each poll returns a
//! list of event dicts; dispatching the callbacks in them is up to the
//! caller. A loop must only be polled from one thread at a time.

pub mod event_loop;
pub mod timer;

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{raise, RuntimeError};
use crate::panic::type_error;
use crate::value::{int_arg, Value};

pub use event_loop::{Event, EventLoop, Watch};
pub use timer::Timer;

/// All live event loops, by id. Ids start at 1 and are never reused.
pub struct Registry {
    loops: FxHashMap<i64, Arc<Mutex<EventLoop>>>,
    next_id: i64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            loops: FxHashMap::default(),
            next_id: 1,
        }
    }

    pub fn create(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.loops.insert(id, Arc::new(Mutex::new(EventLoop::new())));
        id
    }

    pub fn get(&self, id: i64) -> Option<Arc<Mutex<EventLoop>>> {
        self.loops.get(&id).cloned()
    }

    pub fn remove(&mut self, id: i64) -> bool {
        self.loops.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.loops.clear();
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}

fn lookup(op: &'static str, handle: &Value) -> Arc<Mutex<EventLoop>> {
    let Value::Int(id) = handle else {
        type_error(op, handle, None);
    };
    let found = crate::runtime::current().reactors.lock().get(*id);
    match found {
        Some(ev) => ev,
        None => raise(RuntimeError::message("Unknown event loop handle")),
    }
}

/// A socket argument as a file descriptor. Anything outside `0..=i32::MAX`
/// hurls `Invalid socket for <what>`.
fn fd_arg(op: &'static str, what: &str, sock: &Value) -> i32 {
    match i32::try_from(int_arg(op, sock)) {
        Ok(fd) if fd >= 0 => fd,
        _ => raise(RuntimeError::message(format!("Invalid socket for {what}"))),
    }
}

// ── Public API ────────────────────────────────────────────────────────

pub fn event_loop_new() -> Value {
    let id = crate::runtime::current().reactors.lock().create();
    log::debug!("event loop {id} created");
    Value::Int(id)
}

/// Make every later poll return a single stop event.
pub fn event_loop_stop(handle: &Value) {
    lookup("event_loop_stop", handle).lock().stop();
}

/// Drop the loop. Its id is not reused; later calls with it hurl.
pub fn event_loop_free(handle: &Value) -> Value {
    let Value::Int(id) = handle else {
        type_error("event_loop_free", handle, None);
    };
    Value::Bool(crate::runtime::current().reactors.lock().remove(*id))
}

pub fn watch_read(handle: &Value, sock: &Value, callback: &Value) {
    let fd = fd_arg("watch_read", "event_watch_read", sock);
    lookup("watch_read", handle)
        .lock()
        .watch_read(fd, callback.clone());
}

pub fn watch_write(handle: &Value, sock: &Value, callback: &Value) {
    let fd = fd_arg("watch_write", "event_watch_write", sock);
    lookup("watch_write", handle)
        .lock()
        .watch_write(fd, callback.clone());
}

pub fn unwatch(handle: &Value, sock: &Value) -> Value {
    let fd = fd_arg("unwatch", "event_unwatch", sock);
    Value::Bool(lookup("unwatch", handle).lock().unwatch(fd))
}

pub fn timer_after(handle: &Value, ms: &Value, callback: &Value) -> Value {
    let ms = int_arg("timer_after", ms);
    if ms < 0 {
        raise(RuntimeError::message("timer_after expects a non-negative delay"));
    }
    let ev = lookup("timer_after", handle);
    let id = ev.lock().timer_after(ms, callback.clone());
    Value::Int(id)
}

pub fn timer_every(handle: &Value, ms: &Value, callback: &Value) -> Value {
    let ms = int_arg("timer_every", ms);
    if ms <= 0 {
        raise(RuntimeError::message("timer_every expects a positive interval"));
    }
    let ev = lookup("timer_every", handle);
    let id = ev.lock().timer_every(ms, callback.clone());
    Value::Int(id)
}

pub fn timer_cancel(handle: &Value, id: &Value) -> Value {
    let id = int_arg("timer_cancel", id);
    Value::Bool(lookup("timer_cancel", handle).lock().timer_cancel(id))
}

/// Poll the loop. `timeout` is nil (no limit), or milliseconds as an int
/// or float; negative also means no limit. Returns a list of event dicts.
pub fn event_loop_poll(handle: &Value, timeout: &Value) -> Value {
    let timeout = match timeout {
        Value::Nil => None,
        Value::Int(ms) => Some(*ms),
        Value::Float(ms) => Some(*ms as i64),
        other => type_error("event_loop_poll", other, None),
    };
    let ev = lookup("event_loop_poll", handle);
    let polled = ev.lock().poll(timeout);
    match polled {
        Ok(events) => {
            log::trace!("event loop poll returned {} events", events.len());
            crate::collections::list::from_values(events.iter().map(Event::to_value).collect())
        }
        Err(e) => {
            log::debug!("event_loop_poll: {e}");
            raise(RuntimeError::message("event_loop_poll failed"))
        }
    }
}
