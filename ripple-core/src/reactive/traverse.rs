//! Deep traversal for `deep` watchers.
//!
//! Reading every reachable property through its tracked getter registers
//! all nested slots as dependencies of the active watcher. Containers are
//! visited once per pass: wrapped ones by their dep id, unwrapped ones by
//! address, so self-referencing graphs terminate.

use std::collections::HashSet;

use crate::observer::Value;

#[derive(Hash, PartialEq, Eq)]
enum Visit {
    Dep(u64),
    Addr(usize),
}

/// Touch every property reachable from `value`.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<Visit>) {
    match value {
        Value::Object(obj) => {
            if obj.is_frozen() {
                return;
            }
            let visit = match obj.observer() {
                Some(observer) => Visit::Dep(observer.dep().id().raw()),
                None => Visit::Addr(obj.addr()),
            };
            if !seen.insert(visit) {
                return;
            }
            for key in obj.keys().iter().rev() {
                walk(&obj.get(key), seen);
            }
        }
        Value::Array(arr) => {
            if arr.is_frozen() {
                return;
            }
            let visit = match arr.observer() {
                Some(observer) => Visit::Dep(observer.dep().id().raw()),
                None => Visit::Addr(arr.addr()),
            };
            if !seen.insert(visit) {
                return;
            }
            for item in arr.to_vec().iter().rev() {
                walk(item, seen);
            }
        }
        _ => {}
    }
}
