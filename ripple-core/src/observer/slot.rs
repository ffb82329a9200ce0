//! Tracked slots.
//!
//! A slot replaces one property of a wrapped object. Reads register the
//! slot's dep (and the dep of a wrapped child container) with the active
//! watcher; writes that change the value re-wrap it and notify.

use std::sync::Arc;

use parking_lot::RwLock;

use super::object::{Accessor, Property};
use super::observe::{depend_array, observe, Observer};
use super::{Object, Value};
use crate::reactive::{Dep, ReactiveContext};

/// Hook run before a slot accepts a new value (prop mutation warnings).
pub type CustomSetter = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct Slot {
    dep: Arc<Dep>,
    value: RwLock<Value>,
    child: RwLock<Option<Arc<Observer>>>,
    passthrough: Option<Accessor>,
    custom_setter: Option<CustomSetter>,
}

impl Slot {
    pub(crate) fn get(&self) -> Value {
        let value = self.raw();
        if ReactiveContext::is_active() {
            self.dep.depend();
            let child = self.child.read().clone();
            if let Some(child) = child {
                child.dep().depend();
            }
            if let Value::Array(arr) = &value {
                depend_array(arr);
            }
        }
        value
    }

    pub(crate) fn set(&self, new_value: Value) {
        let current = self.raw();
        if new_value.same_value(&current) {
            return;
        }
        if let Some(custom_setter) = &self.custom_setter {
            custom_setter();
        }
        match self.passthrough.as_ref().and_then(|p| p.set.clone()) {
            Some(setter) => setter(new_value.clone()),
            None => *self.value.write() = new_value.clone(),
        }
        *self.child.write() = observe(&new_value, false);
        self.dep.notify();
    }

    /// Current value without registering a dependency.
    pub(crate) fn raw(&self) -> Value {
        match &self.passthrough {
            Some(passthrough) => (passthrough.get)(),
            None => self.value.read().clone(),
        }
    }

    pub(crate) fn dep(&self) -> &Arc<Dep> {
        &self.dep
    }
}

/// Install a tracked slot for `key` on `obj`, starting at `value`.
///
/// An existing accessor (or slot) for the key is kept as a pass-through, so
/// reads and writes still reach it. Frozen objects are left untouched.
pub fn define_slot(obj: &Object, key: &str, value: Value, custom_setter: Option<CustomSetter>) {
    if obj.is_frozen() {
        return;
    }
    let passthrough = match obj.property(key) {
        Some(Property::Accessor(accessor)) => Some(accessor),
        Some(Property::Tracked(previous)) => {
            let read = previous.clone();
            let write = previous;
            Some(Accessor::new(
                Arc::new(move || read.get()),
                Some(Arc::new(move |value| write.set(value))),
            ))
        }
        Some(Property::Data(_)) | None => None,
    };
    let child = observe(&value, false);
    let slot = Slot {
        dep: Arc::new(Dep::new()),
        value: RwLock::new(value),
        child: RwLock::new(child),
        passthrough,
        custom_setter,
    };
    obj.install_slot(key, Arc::new(slot));
}

/// The dep of the tracked slot behind `key`, if the property is tracked.
pub fn slot_dep(obj: &Object, key: &str) -> Option<Arc<Dep>> {
    match obj.property(key) {
        Some(Property::Tracked(slot)) => Some(slot.dep().clone()),
        _ => None,
    }
}
