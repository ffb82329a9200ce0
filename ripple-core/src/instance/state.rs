//! Instance state initialization: props, methods, data, computed properties
//! and declared watches, in that order.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use super::options::{ComputedDef, WatchDef, WatchHandler};
use super::Instance;
use crate::error::Result;
use crate::observer::{define_slot, observe, AccessorGet, AccessorSet, CustomSetter, Value};
use crate::reactive::{
    noop_callback, Callback, ConversionGuard, Expr, Getter, ReactiveContext, Watcher, WatcherOptions,
};

const RESERVED_PROPS: [&str; 3] = ["key", "ref", "slot"];

/// Keys starting with `$` or `_` are left to the framework and never
/// proxied.
fn is_reserved(key: &str) -> bool {
    key.starts_with('$') || key.starts_with('_')
}

pub(super) fn init_props(vm: &Instance, props: IndexMap<String, Value>) {
    let production = vm.runtime().is_production();
    let _convert = ConversionGuard::set(!vm.has_parent());
    for (key, value) in props {
        if !production && RESERVED_PROPS.contains(&key.as_str()) {
            warn!(target: "ripple::warn", key = %key, "reserved attribute cannot be used as a prop");
        }
        let custom_setter = (!production).then(|| prop_mutation_warning(vm, &key));
        define_slot(vm.object(), &key, value, custom_setter);
    }
}

fn prop_mutation_warning(vm: &Instance, key: &str) -> CustomSetter {
    let weak = vm.downgrade();
    let key = key.to_string();
    Arc::new(move || {
        let Some(vm) = weak.upgrade() else { return };
        if vm.has_parent() && !vm.is_setting_props() {
            warn!(
                target: "ripple::warn",
                key = %key,
                "avoid mutating a prop directly; the parent overwrites it on its next update"
            );
        }
    })
}

/// Methods live in the instance's own table; this only reports names that
/// collide with props or the framework's prefixes.
pub(super) fn init_methods(vm: &Instance) {
    if vm.runtime().is_production() {
        return;
    }
    for name in vm.method_names() {
        if vm.is_prop(name) {
            warn!(target: "ripple::warn", method = name, "method is already declared as a prop");
        }
        if is_reserved(name) {
            warn!(
                target: "ripple::warn",
                method = name,
                "method name conflicts with a framework name; avoid names starting with `$` or `_`"
            );
        }
    }
}

pub(super) fn init_data(vm: &Instance) {
    let production = vm.runtime().is_production();
    let data = vm.data().clone();
    for key in data.keys() {
        if !production && vm.has_method(&key) {
            warn!(target: "ripple::warn", key = %key, "method is already declared as a data property");
        }
        if vm.is_prop(&key) {
            if !production {
                warn!(target: "ripple::warn", key = %key, "data property is already declared as a prop");
            }
        } else if !is_reserved(&key) {
            proxy(vm, &key);
        }
    }
    observe(&Value::Object(data), true);
}

fn proxy(vm: &Instance, key: &str) {
    let read = vm.data().clone();
    let write = vm.data().clone();
    let read_key = key.to_string();
    let write_key = key.to_string();
    vm.object().define_accessor(
        key,
        Arc::new(move || read.get(&read_key)),
        Some(Arc::new(move |value| write.set(&write_key, value))),
    );
}

pub(super) fn init_computed(vm: &Instance, computed: IndexMap<String, ComputedDef>) {
    let production = vm.runtime().is_production();
    for (key, def) in computed {
        if !production && (vm.object().contains_key(&key) || vm.has_method(&key)) {
            warn!(
                target: "ripple::warn",
                key = %key,
                "existing instance property will be overwritten by a computed property"
            );
        }
        let get: AccessorGet = match def.get {
            Some(getter) if def.cache => make_computed_getter(vm, getter),
            Some(getter) => {
                let weak = vm.downgrade();
                Arc::new(move || weak.upgrade().map_or(Value::Undefined, |vm| getter(&vm)))
            }
            None => Arc::new(|| Value::Undefined),
        };
        let set: Option<AccessorSet> = def.set.map(|setter| {
            let weak = vm.downgrade();
            let set: AccessorSet = Arc::new(move |value| {
                if let Some(vm) = weak.upgrade() {
                    setter(&vm, value);
                }
            });
            set
        });
        vm.object().define_accessor(&key, get, set);
    }
}

/// Back a computed property with a lazy watcher. Reading it re-evaluates
/// only when dirty, and forwards the watcher's deps to whoever is reading.
fn make_computed_getter(vm: &Instance, getter: Getter) -> AccessorGet {
    let watcher = Watcher::new(
        vm,
        Expr::Func(getter),
        noop_callback(),
        WatcherOptions {
            lazy: true,
            ..Default::default()
        },
    );
    Arc::new(move || {
        if watcher.is_dirty() {
            watcher.evaluate();
        }
        if ReactiveContext::is_active() {
            watcher.depend();
        }
        watcher.value()
    })
}

pub(super) fn init_watch(vm: &Instance, watch: IndexMap<String, Vec<WatchDef>>) -> Result<()> {
    for (key, handlers) in watch {
        for def in handlers {
            let callback = match def.handler {
                WatchHandler::Callback(callback) => callback,
                WatchHandler::Method(name) => {
                    let Some(callback) = method_callback(vm, &name) else {
                        warn!(target: "ripple::warn", key = %key, method = %name, "watch handler names an unknown method");
                        continue;
                    };
                    callback
                }
            };
            vm.watch_with(Expr::from(key.as_str()), callback, def.options)?;
        }
    }
    Ok(())
}

fn method_callback(vm: &Instance, name: &str) -> Option<Callback> {
    let method = vm.method(name)?;
    let weak = vm.downgrade();
    Some(Arc::new(move |new: &Value, old: &Value| {
        let Some(vm) = weak.upgrade() else { return Ok(()) };
        method(&vm, &[new.clone(), old.clone()]).map(|_| ())
    }))
}
