//! Flat-buffer dictionary.
//!
//! A dict is an ordered buffer of `(key, value)` entries searched
//! linearly with [`key_eq`]. There is no hashing.
//!
//! Aliasing rule: [`set`] on a key that already exists overwrites the
//! value in the shared buffer, so every handle to that dict sees it.
//! [`set`] on a new key copies the entries into a fresh buffer one entry
//! larger and returns a handle to it; handles to the old buffer do not
//! see the new key. Compiled code always rebinds the result of `set`.
//! Every other operation that produces a dict builds a fresh one.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{raise, RuntimeError};
use crate::panic::type_error;
use crate::value::{key_eq, DictRef, Value};

// ── Internal helpers ──────────────────────────────────────────────────

fn dict_ref<'a>(op: &'static str, dict: &'a Value) -> &'a DictRef {
    match dict {
        Value::Dict(d) => d,
        other => type_error(op, other, None),
    }
}

fn snapshot(op: &'static str, dict: &Value) -> Vec<(Value, Value)> {
    dict_ref(op, dict).lock().clone()
}

fn lookup(op: &'static str, dict: &Value, key: &Value) -> Option<Value> {
    dict_ref(op, dict)
        .lock()
        .iter()
        .find(|(k, _)| key_eq(k, key))
        .map(|(_, v)| v.clone())
}

// ── Public API ────────────────────────────────────────────────────────

pub fn empty() -> Value {
    Value::Dict(Arc::new(Mutex::new(Vec::new())))
}

/// Bind `key` to `value`. Returns the same dict when `key` was already
/// present (updated in place) and a new dict when it was not.
pub fn set(dict: &Value, key: &Value, value: &Value) -> Value {
    let shared = dict_ref("dict_set", dict);
    let mut entries = shared.lock();
    if let Some(slot) = entries.iter_mut().find(|(k, _)| key_eq(k, key)) {
        slot.1 = value.clone();
        return dict.clone();
    }
    let mut grown = Vec::with_capacity(entries.len() + 1);
    grown.extend(entries.iter().cloned());
    grown.push((key.clone(), value.clone()));
    Value::Dict(Arc::new(Mutex::new(grown)))
}

/// Look up `key`, hurling when it is missing.
pub fn get(dict: &Value, key: &Value) -> Value {
    match lookup("dict_get", dict, key) {
        Some(v) => v,
        None => raise(RuntimeError::KeyNotFound(key.to_string())),
    }
}

pub fn get_default(dict: &Value, key: &Value, default: &Value) -> Value {
    lookup("dict_get", dict, key).unwrap_or_else(|| default.clone())
}

pub fn contains(dict: &Value, key: &Value) -> bool {
    dict_ref("dict_has", dict)
        .lock()
        .iter()
        .any(|(k, _)| key_eq(k, key))
}

pub fn len(dict: &Value) -> i64 {
    match dict {
        Value::Dict(d) => d.lock().len() as i64,
        _ => 0,
    }
}

/// The keys, in insertion order, as a new list.
pub fn keys(dict: &Value) -> Value {
    let keys = snapshot("keys", dict).into_iter().map(|(k, _)| k).collect();
    super::list::from_values(keys)
}

/// The values, in insertion order, as a new list.
pub fn values(dict: &Value) -> Value {
    let values = snapshot("values", dict)
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    super::list::from_values(values)
}

/// Snapshot of the entries in insertion order.
pub fn entries(dict: &Value) -> Vec<(Value, Value)> {
    match dict {
        Value::Dict(d) => d.lock().clone(),
        _ => Vec::new(),
    }
}

/// A fresh dict holding every entry of `a`, then every entry of `b`
/// (so `b` wins on shared keys).
pub fn merge(a: &Value, b: &Value) -> Value {
    let left = snapshot("dict_merge", a);
    let right = snapshot("dict_merge", b);
    left.iter()
        .chain(right.iter())
        .fold(empty(), |acc, (k, v)| set(&acc, k, v))
}

/// A fresh dict without `key`.
pub fn remove(dict: &Value, key: &Value) -> Value {
    snapshot("dict_remove", dict)
        .iter()
        .filter(|(k, _)| !key_eq(k, key))
        .fold(empty(), |acc, (k, v)| set(&acc, k, v))
}

/// A fresh dict mapping each value back to its key. When several keys
/// share a value, the last one wins.
pub fn invert(dict: &Value) -> Value {
    snapshot("dict_invert", dict)
        .iter()
        .fold(empty(), |acc, (k, v)| set(&acc, v, k))
}

/// Build a dict from a list of `[key, value]` pairs. Items that are not
/// lists, or have fewer than two elements, are skipped.
pub fn fae_pairs(pairs: &Value) -> Value {
    if !matches!(pairs, Value::List(_)) {
        type_error("fae_pairs", pairs, None);
    }
    super::list::items(pairs)
        .iter()
        .filter_map(|pair| match pair {
            Value::List(_) => {
                let kv = super::list::items(pair);
                (kv.len() >= 2).then(|| (kv[0].clone(), kv[1].clone()))
            }
            _ => None,
        })
        .fold(empty(), |acc, (k, v)| set(&acc, &k, &v))
}
