//! Object Implementation
//!
//! An [`Object`] is an ordered property bag. Each property is one of:
//!
//! - a plain value (untracked),
//! - an accessor pair (a getter and optional setter supplied by the host),
//! - a tracked slot installed by the observer.
//!
//! [`Object::get`] and [`Object::set`] are the intercepted property read and
//! plain assignment. Assigning a key that does not exist yet adds a plain,
//! untracked property; use [`set`](crate::observer::set) to add a key that
//! notifies watchers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::warn;

use super::observe::Observer;
use super::slot::Slot;
use super::Value;

/// Getter half of an accessor property.
pub type AccessorGet = Arc<dyn Fn() -> Value + Send + Sync>;

/// Setter half of an accessor property.
pub type AccessorSet = Arc<dyn Fn(Value) + Send + Sync>;

/// A host-defined getter/setter pair.
#[derive(Clone)]
pub struct Accessor {
    pub(crate) get: AccessorGet,
    pub(crate) set: Option<AccessorSet>,
}

impl Accessor {
    pub fn new(get: AccessorGet, set: Option<AccessorSet>) -> Self {
        Self { get, set }
    }
}

#[derive(Clone)]
pub(crate) enum Property {
    Data(Value),
    Accessor(Accessor),
    Tracked(Arc<Slot>),
}

pub(crate) struct ObjectInner {
    props: RwLock<IndexMap<String, Property>>,
    observer: OnceLock<Arc<Observer>>,
    frozen: AtomicBool,
    instance: bool,
}

/// A shared handle to an ordered property bag.
#[derive(Clone)]
pub struct Object(pub(crate) Arc<ObjectInner>);

impl Object {
    pub fn new() -> Self {
        Self::with_marker(false)
    }

    /// The object backing an [`Instance`](crate::instance::Instance). It is
    /// never wrapped, and structural `set`/`delete` refuse to touch it.
    pub(crate) fn new_instance() -> Self {
        Self::with_marker(true)
    }

    fn with_marker(instance: bool) -> Self {
        Self(Arc::new(ObjectInner {
            props: RwLock::new(IndexMap::new()),
            observer: OnceLock::new(),
            frozen: AtomicBool::new(false),
            instance,
        }))
    }

    /// Read a property. Reading a tracked slot while a watcher is evaluating
    /// registers the dependency.
    pub fn get(&self, key: &str) -> Value {
        let property = self.0.props.read().get(key).cloned();
        match property {
            Some(Property::Data(value)) => value,
            Some(Property::Accessor(accessor)) => (accessor.get)(),
            Some(Property::Tracked(slot)) => slot.get(),
            None => Value::Undefined,
        }
    }

    /// Assign a property.
    ///
    /// Tracked slots notify their watchers; new keys are added as plain
    /// properties. Writes to a frozen object are dropped.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.is_frozen() {
            warn!(target: "ripple::warn", key, "cannot assign to a property of a frozen object");
            return;
        }
        let property = self.0.props.read().get(key).cloned();
        match property {
            Some(Property::Tracked(slot)) => slot.set(value),
            Some(Property::Accessor(accessor)) => {
                if let Some(setter) = accessor.set {
                    setter(value);
                }
            }
            Some(Property::Data(_)) | None => {
                self.0.props.write().insert(key.to_string(), Property::Data(value));
            }
        }
    }

    /// Define (or redefine) an accessor property.
    pub fn define_accessor(&self, key: &str, get: AccessorGet, set: Option<AccessorSet>) {
        if self.is_frozen() {
            return;
        }
        self.0
            .props
            .write()
            .insert(key.to_string(), Property::Accessor(Accessor::new(get, set)));
    }

    /// Own keys in insertion order. Untracked.
    pub fn keys(&self) -> Vec<String> {
        self.0.props.read().keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.props.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.props.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.props.read().is_empty()
    }

    /// Make the object non-extensible. Frozen objects are never wrapped.
    pub fn freeze(&self) {
        self.0.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::SeqCst)
    }

    pub fn is_extensible(&self) -> bool {
        !self.is_frozen()
    }

    pub fn is_instance(&self) -> bool {
        self.0.instance
    }

    /// The observer wrapping this object, if any.
    pub fn observer(&self) -> Option<Arc<Observer>> {
        self.0.observer.get().cloned()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Arc<Observer>) {
        let _ = self.0.observer.set(observer);
    }

    pub(crate) fn property(&self, key: &str) -> Option<Property> {
        self.0.props.read().get(key).cloned()
    }

    pub(crate) fn install_slot(&self, key: &str, slot: Arc<Slot>) {
        self.0
            .props
            .write()
            .insert(key.to_string(), Property::Tracked(slot));
    }

    /// Read without registering dependencies. Accessor getters still run.
    pub(crate) fn raw_get(&self, key: &str) -> Value {
        match self.property(key) {
            Some(Property::Data(value)) => value,
            Some(Property::Accessor(accessor)) => (accessor.get)(),
            Some(Property::Tracked(slot)) => slot.raw(),
            None => Value::Undefined,
        }
    }

    pub(crate) fn remove(&self, key: &str) -> bool {
        self.0.props.write().shift_remove(key).is_some()
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ObjectInner> {
        Arc::downgrade(&self.0)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let obj = Object::new();
        {
            let mut props = obj.0.props.write();
            for (key, value) in iter {
                props.insert(key.into(), Property::Data(value.into()));
            }
        }
        obj
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .field("observed", &self.observer().is_some())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
