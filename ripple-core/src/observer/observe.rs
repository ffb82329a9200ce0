//! Observer Implementation
//!
//! An [`Observer`] is attached to each wrapped object or array. Attaching it
//! converts every property of an object into a tracked slot, or wraps every
//! element of an array, recursively. The observer's own dep stands for the
//! container as a whole: it is notified when keys are added or removed and
//! when an array is mutated.
//!
//! # Root data
//!
//! `vm_count` counts the instances that use the container as their root
//! data. Structural [`set`] and [`del`] refuse to change such containers,
//! since instances proxy root keys through accessors installed up front and
//! a key added later would never be reachable through them.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tracing::warn;

use super::array::ArrayInner;
use super::object::ObjectInner;
use super::slot::define_slot;
use super::{Array, Object, Value};
use crate::reactive::{should_convert, Dep};

enum WeakTarget {
    Object(Weak<ObjectInner>),
    Array(Weak<ArrayInner>),
}

/// The reactive wrapper attached to one object or array.
pub struct Observer {
    dep: Arc<Dep>,
    vm_count: AtomicUsize,
    target: WeakTarget,
}

impl Observer {
    fn attach_object(obj: &Object) -> Arc<Observer> {
        let observer = Arc::new(Observer {
            dep: Arc::new(Dep::new()),
            vm_count: AtomicUsize::new(0),
            target: WeakTarget::Object(obj.downgrade()),
        });
        // Attach before walking so self-references find the observer.
        obj.attach_observer(observer.clone());
        for key in obj.keys() {
            let value = obj.raw_get(&key);
            define_slot(obj, &key, value, None);
        }
        observer
    }

    fn attach_array(arr: &Array) -> Arc<Observer> {
        let observer = Arc::new(Observer {
            dep: Arc::new(Dep::new()),
            vm_count: AtomicUsize::new(0),
            target: WeakTarget::Array(arr.downgrade()),
        });
        arr.attach_observer(observer.clone());
        observe_items(&arr.to_vec());
        observer
    }

    /// The container-level dep.
    pub fn dep(&self) -> &Arc<Dep> {
        &self.dep
    }

    /// Number of instances using this container as root data.
    pub fn vm_count(&self) -> usize {
        self.vm_count.load(Ordering::SeqCst)
    }

    pub(crate) fn release_root(&self) {
        let _ = self
            .vm_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1));
    }

    /// The wrapped container, while it is still alive.
    pub fn value(&self) -> Option<Value> {
        match &self.target {
            WeakTarget::Object(weak) => weak.upgrade().map(|inner| Value::Object(Object(inner))),
            WeakTarget::Array(weak) => weak.upgrade().map(|inner| Value::Array(Array(inner))),
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("vm_count", &self.vm_count())
            .finish()
    }
}

/// Wrap `value` if it is an eligible container, returning its observer.
///
/// Already wrapped containers return their existing observer. Scalars,
/// frozen containers and instance objects are never wrapped, and nothing
/// new is wrapped while conversion is switched off. `as_root` counts the
/// container as an instance's root data.
pub fn observe(value: &Value, as_root: bool) -> Option<Arc<Observer>> {
    let observer = match value {
        Value::Object(obj) => obj.observer().or_else(|| {
            (should_convert() && obj.is_extensible() && !obj.is_instance())
                .then(|| Observer::attach_object(obj))
        }),
        Value::Array(arr) => arr.observer().or_else(|| {
            (should_convert() && arr.is_extensible()).then(|| Observer::attach_array(arr))
        }),
        _ => return None,
    };
    if as_root {
        if let Some(observer) = &observer {
            observer.vm_count.fetch_add(1, Ordering::SeqCst);
        }
    }
    observer
}

pub(crate) fn observe_items(items: &[Value]) {
    for item in items {
        observe(item, false);
    }
}

/// Register the container deps of every wrapped element of `arr`, nested
/// arrays included, with the active watcher.
pub(crate) fn depend_array(arr: &Array) {
    let mut seen = HashSet::new();
    seen.insert(arr.addr());
    depend_array_inner(arr, &mut seen);
}

fn depend_array_inner(arr: &Array, seen: &mut HashSet<usize>) {
    for item in arr.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(inner) = &item {
            if seen.insert(inner.addr()) {
                depend_array_inner(inner, seen);
            }
        }
    }
}

/// A property name or array index for [`set`] and [`del`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(name) => name.parse().ok(),
        }
    }

    fn into_name(self) -> String {
        match self {
            Key::Index(index) => index.to_string(),
            Key::Name(name) => name,
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

fn is_root_or_instance(obj: &Object) -> bool {
    obj.is_instance() || obj.observer().is_some_and(|ob| ob.vm_count() > 0)
}

/// Set a property, adding it as a tracked key if it does not exist yet.
///
/// On arrays the value is spliced in at the index (growing the array as
/// needed), which notifies through the array's own instrumentation. On
/// objects an existing key is assigned normally; a new key gets a slot and
/// the container dep is notified. Returns `value`.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();
    match target {
        Value::Array(arr) => {
            let Some(index) = key.as_index() else {
                warn!(target: "ripple::warn", ?key, "cannot set a non-index key on an array");
                return value;
            };
            arr.grow_to(index);
            arr.splice(index, 1, [value.clone()]);
            value
        }
        Value::Object(obj) => {
            let key = key.into_name();
            if obj.contains_key(&key) {
                obj.set(&key, value.clone());
                return value;
            }
            if is_root_or_instance(obj) {
                warn!(
                    target: "ripple::warn",
                    key = %key,
                    "avoid adding reactive properties to an instance or its root data at runtime; \
                     declare them upfront in the data option"
                );
                return value;
            }
            match obj.observer() {
                Some(observer) => {
                    define_slot(obj, &key, value.clone(), None);
                    observer.dep().notify();
                }
                None => obj.set(&key, value.clone()),
            }
            value
        }
        other => {
            warn!(
                target: "ripple::warn",
                kind = other.type_name(),
                "cannot set a reactive property on a non-container value"
            );
            value
        }
    }
}

/// Delete a property and notify the container dep.
///
/// Absent keys are ignored. Array indices are spliced out.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match target {
        Value::Array(arr) => {
            if let Some(index) = key.as_index() {
                if index < arr.len() {
                    arr.splice(index, 1, Vec::new());
                }
            }
        }
        Value::Object(obj) => {
            let key = key.into_name();
            if is_root_or_instance(obj) {
                warn!(
                    target: "ripple::warn",
                    key = %key,
                    "avoid deleting properties on an instance or its root data; set them to null instead"
                );
                return;
            }
            if !obj.remove(&key) {
                return;
            }
            if let Some(observer) = obj.observer() {
                observer.dep().notify();
            }
        }
        _ => {}
    }
}
