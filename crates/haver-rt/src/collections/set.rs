//! The creel: an immutable set of values.
//!
//! A creel is a buffer of distinct items under their own tag, so it is
//! never confused with a dict. Membership uses [`key_eq`], the same key
//! identity dicts use. Operations that change membership return a NEW
//! creel; operations that would not change it return the input as is.

use std::sync::Arc;

use crate::panic::type_error;
use crate::value::{key_eq, SetRef, Value};

// ── Internal helpers ──────────────────────────────────────────────────

fn set_ref<'a>(op: &'static str, set: &'a Value) -> &'a SetRef {
    match set {
        Value::Set(s) => s,
        other => type_error(op, other, None),
    }
}

fn has(items: &[Value], item: &Value) -> bool {
    items.iter().any(|candidate| key_eq(candidate, item))
}

fn from_items(items: Vec<Value>) -> Value {
    Value::Set(Arc::new(items))
}

// ── Public API ────────────────────────────────────────────────────────

pub fn empty() -> Value {
    from_items(Vec::new())
}

/// Build a creel from the items of a list, dropping duplicates. Nil
/// gives an empty creel.
pub fn make_creel(list: &Value) -> Value {
    match list {
        Value::Nil => empty(),
        Value::List(_) => {
            let mut items: Vec<Value> = Vec::new();
            for item in super::list::items(list) {
                if !has(&items, &item) {
                    items.push(item);
                }
            }
            from_items(items)
        }
        other => type_error("make_creel", other, None),
    }
}

/// Add `item`. Returns `set` itself when `item` is already a member.
pub fn toss_in(set: &Value, item: &Value) -> Value {
    let items = set_ref("toss_in", set);
    if has(items, item) {
        return set.clone();
    }
    let mut grown = Vec::with_capacity(items.len() + 1);
    grown.extend(items.iter().cloned());
    grown.push(item.clone());
    from_items(grown)
}

/// Remove `item`. Returns `set` itself when `item` is not a member.
pub fn heave_oot(set: &Value, item: &Value) -> Value {
    let items = set_ref("heave_oot", set);
    if !has(items, item) {
        return set.clone();
    }
    from_items(
        items
            .iter()
            .filter(|candidate| !key_eq(candidate, item))
            .cloned()
            .collect(),
    )
}

pub fn is_in_creel(set: &Value, item: &Value) -> bool {
    has(set_ref("is_in_creel", set), item)
}

pub fn len(set: &Value) -> i64 {
    match set {
        Value::Set(s) => s.len() as i64,
        _ => 0,
    }
}

/// The members as a new list, sorted by their string form.
pub fn creel_tae_list(set: &Value) -> Value {
    let mut keyed: Vec<(String, Value)> = set_ref("creel_tae_list", set)
        .iter()
        .map(|item| (item.to_string(), item.clone()))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    super::list::from_values(keyed.into_iter().map(|(_, item)| item).collect())
}

/// Union: every member of `a`, then the members of `b` not in `a`.
pub fn creels_thegither(a: &Value, b: &Value) -> Value {
    let left = set_ref("creels_thegither", a);
    let right = set_ref("creels_thegither", b);
    let mut items: Vec<Value> = left.iter().cloned().collect();
    for item in right.iter() {
        if !has(&items, item) {
            items.push(item.clone());
        }
    }
    from_items(items)
}

/// Intersection: members of `a` that are also in `b`.
pub fn creels_baith(a: &Value, b: &Value) -> Value {
    let left = set_ref("creels_baith", a);
    let right = set_ref("creels_baith", b);
    from_items(left.iter().filter(|i| has(right, i)).cloned().collect())
}

/// Difference: members of `a` that are not in `b`.
pub fn creels_differ(a: &Value, b: &Value) -> Value {
    let left = set_ref("creels_differ", a);
    let right = set_ref("creels_differ", b);
    from_items(left.iter().filter(|i| !has(right, i)).cloned().collect())
}

pub fn is_subset(a: &Value, b: &Value) -> bool {
    let left = set_ref("is_subset", a);
    let right = set_ref("is_subset", b);
    left.iter().all(|i| has(right, i))
}

pub fn is_superset(a: &Value, b: &Value) -> bool {
    is_subset(b, a)
}

pub fn is_disjoint(a: &Value, b: &Value) -> bool {
    let left = set_ref("is_disjoint", a);
    let right = set_ref("is_disjoint", b);
    !left.iter().any(|i| has(right, i))
}
