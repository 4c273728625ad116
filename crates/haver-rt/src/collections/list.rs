//! Mutable list with reference semantics.
//!
//! Every [`Value::List`] handle that points at the same buffer sees every
//! mutation. Capacity starts at the configured default (8) and doubles
//! whenever a push finds the buffer full.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RuntimeError;
use crate::ops::values_equal;
use crate::panic::{fatal, type_error};
use crate::value::{ListRef, Value};

// ── Internal helpers ──────────────────────────────────────────────────

fn list_ref<'a>(op: &'static str, list: &'a Value) -> &'a ListRef {
    match list {
        Value::List(l) => l,
        other => type_error(op, other, None),
    }
}

/// Map a possibly negative index onto `0..len`, or die with the adjusted
/// index in the message.
fn resolve_index(index: i64, len: usize) -> usize {
    let len = len as i64;
    let adjusted = if index < 0 { index + len } else { index };
    if adjusted < 0 || adjusted >= len {
        fatal(&RuntimeError::Index {
            index: adjusted,
            len,
            what: "list",
        });
    }
    adjusted as usize
}

// ── Public API ────────────────────────────────────────────────────────

/// Create an empty list with room for `capacity` items. A non-positive
/// capacity uses the configured default.
pub fn with_capacity(capacity: i64) -> Value {
    let capacity = if capacity > 0 {
        capacity as usize
    } else {
        crate::runtime::config().default_list_capacity
    };
    Value::List(Arc::new(Mutex::new(Vec::with_capacity(capacity))))
}

/// Wrap `items` in a new list.
pub fn from_values(items: Vec<Value>) -> Value {
    Value::List(Arc::new(Mutex::new(items)))
}

/// Append `item`, doubling the capacity when the buffer is full.
pub fn push(list: &Value, item: &Value) {
    let mut items = list_ref("shove", list).lock();
    if items.len() == items.capacity() {
        let grow = items.capacity().max(1);
        items.reserve_exact(grow);
    }
    items.push(item.clone());
}

/// Remove and return the last item. Popping an empty list is fatal.
pub fn pop(list: &Value) -> Value {
    let popped = list_ref("yank", list).lock().pop();
    match popped {
        Some(item) => item,
        None => fatal(&RuntimeError::EmptyPop),
    }
}

pub fn get(list: &Value, index: i64) -> Value {
    let items = list_ref("index", list).lock();
    let i = resolve_index(index, items.len());
    items[i].clone()
}

pub fn set(list: &Value, index: i64, item: &Value) {
    let mut items = list_ref("index", list).lock();
    let i = resolve_index(index, items.len());
    items[i] = item.clone();
}

/// Number of items; 0 for anything that is not a list.
pub fn len(list: &Value) -> i64 {
    match list {
        Value::List(l) => l.lock().len() as i64,
        _ => 0,
    }
}

/// A snapshot of the items. Later mutation of the list is not reflected.
pub fn items(list: &Value) -> Vec<Value> {
    match list {
        Value::List(l) => l.lock().clone(),
        _ => Vec::new(),
    }
}

pub fn contains(list: &Value, item: &Value) -> bool {
    index_of(list, item) >= 0
}

/// Position of the first item equal to `item`, or -1.
pub fn index_of(list: &Value, item: &Value) -> i64 {
    items(list)
        .iter()
        .position(|candidate| values_equal(candidate, item))
        .map_or(-1, |i| i as i64)
}

#[cfg(test)]
pub(crate) fn capacity(list: &Value) -> usize {
    list_ref("capacity", list).lock().capacity()
}
