//! Multi-producer, multi-consumer channel.
//!
//! A ring buffer behind one `parking_lot::Mutex`, with two condvars:
//! `not_empty` parks receivers and `not_full` parks senders.
//!
//! A channel created with capacity 0 is unbounded: its buffer is
//! allocated on the first send and doubles instead of blocking when
//! full. After [`Channel::close`], sends fail at once and receivers
//! drain whatever is buffered before seeing nil.

use parking_lot::{Condvar, Mutex};

use crate::error::{raise, RuntimeError};
use crate::runtime::handles;
use crate::value::{int_arg, Value};

struct Ring {
    slots: Vec<Value>,
    head: usize,
    tail: usize,
    count: usize,
    closed: bool,
    unbounded: bool,
}

impl Ring {
    fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    fn push(&mut self, value: Value) {
        let cap = self.slots.len();
        self.slots[self.tail] = value;
        self.tail = (self.tail + 1) % cap;
        self.count += 1;
    }

    fn pop(&mut self) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let cap = self.slots.len();
        let value = std::mem::take(&mut self.slots[self.head]);
        self.head = (self.head + 1) % cap;
        self.count -= 1;
        Some(value)
    }

    /// Reallocate with twice the slots (or `initial` when empty),
    /// unrolling the ring so the oldest value sits at index 0.
    fn grow(&mut self, initial: usize) {
        let cap = self.slots.len();
        let new_cap = if cap == 0 { initial.max(1) } else { cap * 2 };
        let mut slots = Vec::with_capacity(new_cap);
        for i in 0..self.count {
            slots.push(std::mem::take(&mut self.slots[(self.head + i) % cap]));
        }
        slots.resize(new_cap, Value::Nil);
        self.slots = slots;
        self.head = 0;
        self.tail = self.count % new_cap;
    }
}

pub struct Channel {
    ring: Mutex<Ring>,
    not_empty: Condvar,
    not_full: Condvar,
    initial_slots: usize,
}

impl Channel {
    /// A channel holding at most `capacity` values, or an unbounded one
    /// when `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        Self::with_initial_slots(capacity, crate::runtime::config().chan_initial_slots)
    }

    fn with_initial_slots(capacity: usize, initial_slots: usize) -> Self {
        Channel {
            ring: Mutex::new(Ring {
                slots: vec![Value::Nil; capacity],
                head: 0,
                tail: 0,
                count: 0,
                closed: false,
                unbounded: capacity == 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            initial_slots,
        }
    }

    /// Enqueue `value`, blocking while a bounded channel is full.
    /// Returns `false` if the channel is (or becomes) closed.
    pub fn send(&self, value: Value) -> bool {
        let mut ring = self.ring.lock();
        if ring.unbounded {
            if ring.closed {
                return false;
            }
            if ring.is_full() {
                ring.grow(self.initial_slots);
            }
        } else {
            while ring.is_full() && !ring.closed {
                self.not_full.wait(&mut ring);
            }
            if ring.closed {
                return false;
            }
        }
        ring.push(value);
        drop(ring);
        self.not_empty.notify_one();
        true
    }

    /// Dequeue the oldest value, blocking while the channel is empty and
    /// open. Returns `None` once closed and drained.
    pub fn recv(&self) -> Option<Value> {
        let mut ring = self.ring.lock();
        while ring.count == 0 && !ring.closed {
            self.not_empty.wait(&mut ring);
        }
        let value = ring.pop();
        drop(ring);
        if value.is_some() {
            self.not_full.notify_one();
        }
        value
    }

    /// Dequeue without blocking.
    pub fn try_recv(&self) -> Option<Value> {
        let value = self.ring.lock().pop();
        if value.is_some() {
            self.not_full.notify_one();
        }
        value
    }

    pub fn close(&self) {
        self.ring.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("Channel")
            .field("len", &ring.count)
            .field("cap", &ring.slots.len())
            .field("closed", &ring.closed)
            .field("unbounded", &ring.unbounded)
            .finish()
    }
}

// ── Public API ────────────────────────────────────────────────────────

/// Create a channel. Capacity 0 means unbounded; negative capacities
/// hurl.
pub fn chan_new(capacity: &Value) -> Value {
    let capacity = int_arg("chan_new", capacity);
    let Ok(capacity) = usize::try_from(capacity) else {
        raise(RuntimeError::message("chan_new expects non-negative capacity"));
    };
    Value::Int(handles().channels.lock().insert(Channel::new(capacity)))
}

/// Send `value`. Returns aye on success, nae when the channel is closed.
pub fn chan_send(chan: &Value, value: &Value) -> Value {
    let chan = handles().channels.lock().resolve("chan_send", chan);
    Value::Bool(chan.send(value.clone()))
}

/// Receive the next value; nil once the channel is closed and empty.
pub fn chan_recv(chan: &Value) -> Value {
    let chan = handles().channels.lock().resolve("chan_recv", chan);
    chan.recv().unwrap_or_default()
}

/// Receive without blocking; nil when nothing is buffered.
pub fn chan_try_recv(chan: &Value) -> Value {
    let chan = handles().channels.lock().resolve("chan_try_recv", chan);
    chan.try_recv().unwrap_or_default()
}

pub fn chan_close(chan: &Value) {
    handles().channels.lock().resolve("chan_close", chan).close();
}

/// Close the channel and release its handle. A receiver blocked on the
/// empty channel wakes up with nil.
pub fn chan_free(chan: &Value) -> Value {
    let released = handles().channels.lock().release("chan_free", chan);
    match released {
        Some(chan) => {
            chan.close();
            Value::Bool(true)
        }
        None => Value::Bool(false),
    }
}

pub fn chan_is_closed(chan: &Value) -> Value {
    let chan = handles().channels.lock().resolve("chan_is_closed", chan);
    Value::Bool(chan.is_closed())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
