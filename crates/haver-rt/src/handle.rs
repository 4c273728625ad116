//! Typed, generation-checked handle tables.
//!
//! Concurrency resources (threads, mutexes, condvars, atomics, channels)
//! are handed to programs as plain integers. Each integer packs three
//! fields:
//!
//! ```text
//!  63      56 55      32 31                0
//! +----------+----------+-------------------+
//! |   kind   |   gen    |       index       |
//! +----------+----------+-------------------+
//! ```
//!
//! A lookup succeeds only if the kind matches the table, the slot is
//! occupied, and the slot's generation matches. Releasing a slot bumps
//! its generation, so a stale handle can never reach the slot's next
//! occupant.

use std::sync::Arc;

use crate::error::{raise, RuntimeError};
use crate::panic::type_error;
use crate::value::Value;

const KIND_SHIFT: u32 = 56;
const GEN_SHIFT: u32 = 32;
const GEN_MASK: u32 = 0x00FF_FFFF;
const INDEX_MASK: i64 = 0xFFFF_FFFF;

/// Resource kind stored in the top byte of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleKind {
    Thread = 1,
    Mutex = 2,
    Condvar = 3,
    Atomic = 4,
    Channel = 5,
}

impl HandleKind {
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Thread => "thread",
            HandleKind::Mutex => "mutex",
            HandleKind::Condvar => "condvar",
            HandleKind::Atomic => "atomic",
            HandleKind::Channel => "channel",
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

/// Slot arena for one resource kind.
pub struct HandleTable<T> {
    kind: HandleKind,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> HandleTable<T> {
    pub fn new(kind: HandleKind) -> Self {
        HandleTable {
            kind,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn encode(&self, index: u32, generation: u32) -> i64 {
        ((self.kind as i64) << KIND_SHIFT)
            | (i64::from(generation & GEN_MASK) << GEN_SHIFT)
            | i64::from(index)
    }

    /// Decode `handle` into a slot index, if it names a live slot of
    /// this table.
    fn slot_index(&self, handle: i64) -> Option<usize> {
        if (handle >> KIND_SHIFT) != self.kind as i64 {
            return None;
        }
        let generation = ((handle >> GEN_SHIFT) as u32) & GEN_MASK;
        let index = (handle & INDEX_MASK) as usize;
        let slot = self.slots.get(index)?;
        (slot.generation == generation && slot.value.is_some()).then_some(index)
    }

    /// Store `value` and return its handle.
    pub fn insert(&mut self, value: T) -> i64 {
        self.insert_shared(Arc::new(value))
    }

    /// Store an already shared `value`, for resources whose owner needs a
    /// reference before the handle is handed out.
    pub fn insert_shared(&mut self, value: Arc<T>) -> i64 {
        let value = Some(value);
        let (index, generation) = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = value;
                (index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 1,
                    value,
                });
                (index, 1)
            }
        };
        let handle = self.encode(index, generation);
        log::trace!("{} handle {handle:#x} allocated", self.kind.name());
        handle
    }

    pub fn get(&self, handle: i64) -> Option<Arc<T>> {
        let index = self.slot_index(handle)?;
        self.slots[index].value.clone()
    }

    /// Release the slot behind `handle`. The handle, and every copy of it,
    /// is invalid afterwards.
    pub fn remove(&mut self, handle: i64) -> Option<Arc<T>> {
        let index = self.slot_index(handle)?;
        let slot = &mut self.slots[index];
        let value = slot.value.take();
        slot.generation = (slot.generation % GEN_MASK) + 1;
        self.free.push(index as u32);
        value
    }

    /// Look up a handle passed in from a program. A non-integer is a type
    /// error; an unknown or stale handle hurls.
    pub fn resolve(&self, op: &'static str, handle: &Value) -> Arc<T> {
        let Value::Int(raw) = handle else {
            type_error(op, handle, None);
        };
        match self.get(*raw) {
            Some(value) => value,
            None => raise(RuntimeError::Handle {
                kind: self.kind.name(),
            }),
        }
    }

    /// Release a handle passed in from a program. A non-integer is a type
    /// error; an unknown or stale handle releases nothing.
    pub fn release(&mut self, op: &'static str, handle: &Value) -> Option<Arc<T>> {
        let Value::Int(raw) = handle else {
            type_error(op, handle, None);
        };
        let released = self.remove(*raw);
        if released.is_some() {
            log::trace!("{} handle {raw:#x} released", self.kind.name());
        }
        released
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every slot. Outstanding handles become stale.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.value.take().is_some() {
                slot.generation = (slot.generation % GEN_MASK) + 1;
                self.free.push(index as u32);
            }
        }
    }
}
