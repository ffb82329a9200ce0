//! Array Implementation
//!
//! Element reads cannot be intercepted, so an [`Array`] is tracked through
//! whatever slot holds it and through its observer's dep. Every mutating
//! method performs the mutation, wraps newly inserted elements, then
//! notifies that dep once.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::warn;

use super::observe::{observe_items, Observer};
use super::Value;

pub(crate) struct ArrayInner {
    items: RwLock<Vec<Value>>,
    observer: OnceLock<Arc<Observer>>,
    frozen: AtomicBool,
}

/// A shared handle to a vector of values.
#[derive(Clone)]
pub struct Array(pub(crate) Arc<ArrayInner>);

impl Array {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(ArrayInner {
            items: RwLock::new(items),
            observer: OnceLock::new(),
            frozen: AtomicBool::new(false),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.read().is_empty()
    }

    /// Element at `index`, or `Undefined`. Untracked.
    pub fn get(&self, index: usize) -> Value {
        self.0.items.read().get(index).cloned().unwrap_or_default()
    }

    /// Snapshot of the elements. Untracked.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.read().clone()
    }

    /// Append an element; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        if self.rejects_mutation("push") {
            return self.len();
        }
        let len = {
            let mut items = self.0.items.write();
            items.push(value.clone());
            items.len()
        };
        self.mutated(&[value]);
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        if self.rejects_mutation("pop") {
            return Value::Undefined;
        }
        let popped = self.0.items.write().pop().unwrap_or_default();
        self.mutated(&[]);
        popped
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        if self.rejects_mutation("shift") {
            return Value::Undefined;
        }
        let shifted = {
            let mut items = self.0.items.write();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        };
        self.mutated(&[]);
        shifted
    }

    /// Prepend elements, keeping their order; returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let values: Vec<Value> = values.into_iter().collect();
        if self.rejects_mutation("unshift") {
            return self.len();
        }
        let len = {
            let mut items = self.0.items.write();
            items.splice(0..0, values.iter().cloned());
            items.len()
        };
        self.mutated(&values);
        len
    }

    /// Remove `delete_count` elements starting at `start` and insert
    /// `values` in their place. Out-of-range bounds are clamped. Returns the
    /// removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let values: Vec<Value> = values.into_iter().collect();
        if self.rejects_mutation("splice") {
            return Vec::new();
        }
        let removed = {
            let mut items = self.0.items.write();
            let start = start.min(items.len());
            let end = start + delete_count.min(items.len() - start);
            let removed: Vec<Value> = items.splice(start..end, values.iter().cloned()).collect();
            removed
        };
        self.mutated(&values);
        removed
    }

    pub fn reverse(&self) {
        if self.rejects_mutation("reverse") {
            return;
        }
        self.0.items.write().reverse();
        self.mutated(&[]);
    }

    /// Sort by string conversion, with `Undefined` last.
    pub fn sort(&self) {
        self.sort_by(|a, b| match (a, b) {
            (Value::Undefined, Value::Undefined) => CmpOrdering::Equal,
            (Value::Undefined, _) => CmpOrdering::Greater,
            (_, Value::Undefined) => CmpOrdering::Less,
            _ => a.to_string().cmp(&b.to_string()),
        });
    }

    /// Stable sort with a comparator. The comparator runs without any lock
    /// held, so it may read other reactive state.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&Value, &Value) -> CmpOrdering,
    {
        if self.rejects_mutation("sort") {
            return;
        }
        let mut items = self.to_vec();
        items.sort_by(&mut compare);
        *self.0.items.write() = items;
        self.mutated(&[]);
    }

    /// Make the array immutable. Frozen arrays are never wrapped.
    pub fn freeze(&self) {
        self.0.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::SeqCst)
    }

    pub fn is_extensible(&self) -> bool {
        !self.is_frozen()
    }

    /// The observer wrapping this array, if any.
    pub fn observer(&self) -> Option<Arc<Observer>> {
        self.0.observer.get().cloned()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Arc<Observer>) {
        let _ = self.0.observer.set(observer);
    }

    /// Pad with `Undefined` up to `len` elements, without notifying.
    pub(crate) fn grow_to(&self, len: usize) {
        let mut items = self.0.items.write();
        if items.len() < len {
            items.resize(len, Value::Undefined);
        }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ArrayInner> {
        Arc::downgrade(&self.0)
    }

    fn rejects_mutation(&self, method: &str) -> bool {
        if self.is_frozen() {
            warn!(target: "ripple::warn", method, "cannot mutate a frozen array");
            return true;
        }
        false
    }

    fn mutated(&self, inserted: &[Value]) {
        if let Some(observer) = self.observer() {
            observe_items(inserted);
            observer.dep().notify();
        }
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self::from_vec(items)
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.len())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}
