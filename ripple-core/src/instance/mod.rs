//! Instances
//!
//! An [`Instance`] is the owning context for a group of watchers. It holds
//! an instance object through which props, root data and computed
//! properties are read and written, and a registry of every watcher
//! created against it, so that [`Instance::destroy`] can tear them all down
//! at once.
//!
//! # Initialization order
//!
//! 1. Props are installed as tracked slots on the instance object. Prop
//!    values of child instances are not wrapped; the parent owns them.
//! 2. Methods are checked against props and reserved names. They stay in
//!    the instance's method table and are invoked with [`Instance::call`].
//! 3. Root data is wrapped and every key is proxied onto the instance.
//! 4. Computed properties are defined, each backed by a lazy watcher.
//! 5. Declared watches are created. A handler may name a method.

mod options;
mod state;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

pub use options::{ComputedDef, ComputedSetter, InstanceOptions, Method, WatchDef, WatchHandle, WatchOptions};

use crate::error::{BoxError, ReactiveError, Result};
use crate::observer::{Object, Value};
use crate::reactive::{noop_callback, Callback, ConversionGuard, Expr, Runtime, Subscriber, SubscriberId, Watcher, WatcherOptions};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

struct InstanceInner {
    id: u64,
    runtime: Runtime,
    object: Object,
    data: Object,
    parent: Option<WeakInstance>,
    prop_keys: Vec<String>,
    methods: IndexMap<String, Method>,
    watchers: Mutex<Vec<Arc<Watcher>>>,
    render_watcher: Mutex<Option<Arc<Watcher>>>,
    being_destroyed: AtomicBool,
    destroyed: AtomicBool,
    setting_props: AtomicBool,
}

impl InstanceInner {
    /// Tear down every watcher and release the root data. Returns `false`
    /// if this already happened.
    fn shutdown(&self) -> bool {
        if self.being_destroyed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let watchers = std::mem::take(&mut *self.watchers.lock());
        self.render_watcher.lock().take();
        for watcher in watchers.iter().rev() {
            watcher.teardown();
        }
        if let Some(observer) = self.data.observer() {
            observer.release_root();
        }
        self.destroyed.store(true, Ordering::SeqCst);
        true
    }
}

impl Drop for InstanceInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A shared handle to an instance. Cloning shares it.
#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);

/// A non-owning handle to an instance.
#[derive(Clone)]
pub struct WeakInstance(Weak<InstanceInner>);

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(Instance)
    }
}

impl Instance {
    /// Build an instance and initialize its state.
    ///
    /// Fails only when an `immediate` declared watch invokes a callback that
    /// errors and the runtime has no error handler.
    pub fn new(runtime: &Runtime, options: InstanceOptions) -> Result<Instance> {
        let InstanceOptions {
            parent,
            props,
            methods,
            data,
            computed,
            watch,
        } = options;

        let vm = Instance(Arc::new(InstanceInner {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            runtime: runtime.clone(),
            object: Object::new_instance(),
            data: data.unwrap_or_default(),
            parent,
            prop_keys: props.keys().cloned().collect(),
            methods,
            watchers: Mutex::new(Vec::new()),
            render_watcher: Mutex::new(None),
            being_destroyed: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            setting_props: AtomicBool::new(false),
        }));

        state::init_props(&vm, props);
        state::init_methods(&vm);
        state::init_data(&vm);
        state::init_computed(&vm, computed);
        state::init_watch(&vm, watch)?;

        debug!(id = vm.id(), watchers = vm.watcher_count(), "instance initialized");
        Ok(vm)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    /// The instance object: props, proxied data and computed properties.
    pub fn object(&self) -> &Object {
        &self.0.object
    }

    /// The root data object.
    pub fn data(&self) -> &Object {
        &self.0.data
    }

    pub fn parent(&self) -> Option<Instance> {
        self.0.parent.as_ref().and_then(WeakInstance::upgrade)
    }

    pub fn has_parent(&self) -> bool {
        self.0.parent.is_some()
    }

    /// Read a property of the instance object.
    pub fn get(&self, key: &str) -> Value {
        self.0.object.get(key)
    }

    /// Write a property of the instance object.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.0.object.set(key, value);
    }

    /// Call the declared method `name`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .method(name)
            .ok_or_else(|| ReactiveError::UnknownMethod(name.to_string()))?;
        method(self, args).map_err(|source| ReactiveError::Method {
            name: name.to_string(),
            source,
        })
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.0.methods.contains_key(name)
    }

    /// Watch a path or function and call `callback` with `(new, old)` when
    /// its value changes.
    pub fn watch<F>(&self, expr: impl Into<Expr>, callback: F, options: WatchOptions) -> Result<WatchHandle>
    where
        F: Fn(&Value, &Value) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.watch_with(expr.into(), Arc::new(callback), options)
    }

    pub(crate) fn watch_with(&self, expr: Expr, callback: Callback, options: WatchOptions) -> Result<WatchHandle> {
        let watcher = Watcher::new(
            self,
            expr,
            callback,
            WatcherOptions {
                deep: options.deep,
                user: true,
                lazy: false,
                sync: options.sync,
            },
        );
        if options.immediate && watcher.is_active() {
            watcher.fire(&watcher.value(), &Value::Undefined)?;
        }
        Ok(WatchHandle::new(watcher))
    }

    /// Install the render watcher. `render` produces a tree from the
    /// instance state and `patch` applies it; both re-run whenever anything
    /// `render` read changes. Mounting again replaces the previous render
    /// watcher.
    pub fn mount<R, P>(&self, render: R, patch: P) -> Arc<Watcher>
    where
        R: Fn(&Instance) -> Value + Send + Sync + 'static,
        P: Fn(&Instance, Value) + Send + Sync + 'static,
    {
        let previous = self.0.render_watcher.lock().take();
        if let Some(previous) = previous {
            previous.teardown();
        }
        let watcher = Watcher::new(
            self,
            Expr::func(move |vm| {
                let tree = render(vm);
                patch(vm, tree);
                Value::Undefined
            }),
            noop_callback(),
            WatcherOptions::default(),
        );
        *self.0.render_watcher.lock() = Some(watcher.clone());
        watcher
    }

    /// Queue the render watcher as if one of its dependencies changed.
    pub fn force_update(&self) {
        let watcher = self.0.render_watcher.lock().clone();
        if let Some(watcher) = watcher {
            watcher.update();
        }
    }

    /// Push new prop values from the parent. Values are not wrapped, and
    /// the direct-mutation warning is suppressed.
    pub fn update_props<I, K, V>(&self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let _convert = ConversionGuard::set(false);
        let _setting = SettingProps::enter(&self.0.setting_props);
        for (key, value) in values {
            let key = key.as_ref();
            if self.is_prop(key) {
                self.0.object.set(key, value);
            } else if !self.0.runtime.is_production() {
                warn!(target: "ripple::warn", key, "not a declared prop");
            }
        }
    }

    /// Tear down every watcher of this instance. Calling it again is a
    /// no-op.
    pub fn destroy(&self) {
        if self.0.shutdown() {
            debug!(id = self.id(), "instance destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.load(Ordering::SeqCst)
    }

    /// Number of live watchers registered with this instance.
    pub fn watcher_count(&self) -> usize {
        self.0.watchers.lock().len()
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Arc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn method(&self, name: &str) -> Option<Method> {
        self.0.methods.get(name).cloned()
    }

    pub(crate) fn method_names(&self) -> impl Iterator<Item = &str> {
        self.0.methods.keys().map(String::as_str)
    }

    pub(crate) fn is_prop(&self, key: &str) -> bool {
        self.0.prop_keys.iter().any(|prop| prop == key)
    }

    pub(crate) fn register_watcher(&self, watcher: Arc<Watcher>) {
        self.0.watchers.lock().push(watcher);
    }

    pub(crate) fn unregister_watcher(&self, id: SubscriberId) {
        self.0.watchers.lock().retain(|watcher| watcher.id() != id);
    }

    pub(crate) fn is_being_destroyed(&self) -> bool {
        self.0.being_destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_setting_props(&self) -> bool {
        self.0.setting_props.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id())
            .field("props", &self.0.prop_keys)
            .field("watchers", &self.watcher_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

struct SettingProps<'a>(&'a AtomicBool);

impl<'a> SettingProps<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SettingProps<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::slot_dep;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn with_data(runtime: &Runtime, json: serde_json::Value) -> Instance {
        let data = Value::from_json(json).as_object().cloned().unwrap_or_default();
        Instance::new(runtime, InstanceOptions::new().data(data)).unwrap()
    }

    #[test]
    fn immediate_watch_fires_at_registration() {
        let runtime = Runtime::new();
        let vm = with_data(&runtime, serde_json::json!({ "a": 1 }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        vm.watch(
            "a",
            move |new, old| {
                log.lock().push((new.clone(), old.clone()));
                Ok(())
            },
            WatchOptions {
                immediate: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(*seen.lock(), vec![(Value::from(1), Value::Undefined)]);
    }

    #[test]
    fn unwatch_stops_callbacks() {
        let runtime = Runtime::new();
        let vm = with_data(&runtime, serde_json::json!({ "a": 1 }));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let handle = vm
            .watch(
                "a",
                move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                WatchOptions::default(),
            )
            .unwrap();

        handle.unwatch();
        handle.unwatch();
        vm.set("a", 2);
        runtime.tick().unwrap();

        assert!(!handle.is_active());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(vm.watcher_count(), 0);
    }

    #[test]
    fn render_watcher_rerenders_once_per_flush() {
        let runtime = Runtime::new();
        let vm = with_data(&runtime, serde_json::json!({ "a": 1, "b": 2 }));
        let patches = Arc::new(Mutex::new(Vec::new()));
        let log = patches.clone();
        vm.mount(
            |vm| Value::from(format!("{}-{}", vm.get("a"), vm.get("b"))),
            move |_, tree| log.lock().push(tree),
        );
        assert_eq!(*patches.lock(), vec![Value::from("1-2")]);

        vm.set("a", 10);
        vm.set("b", 20);
        runtime.tick().unwrap();
        assert_eq!(*patches.lock(), vec![Value::from("1-2"), Value::from("10-20")]);

        vm.force_update();
        runtime.tick().unwrap();
        assert_eq!(patches.lock().len(), 3);
    }

    #[test]
    fn destroy_tears_down_everything() {
        let runtime = Runtime::new();
        let vm = with_data(&runtime, serde_json::json!({ "a": 1 }));
        let handle = vm.watch("a", |_, _| Ok(()), WatchOptions::default()).unwrap();
        vm.mount(|vm| vm.get("a"), |_, _| {});
        let dep = slot_dep(vm.data(), "a").unwrap();
        assert_eq!(dep.subscriber_count(), 2);

        vm.destroy();
        vm.destroy();

        assert!(vm.is_destroyed());
        assert!(!handle.is_active());
        assert_eq!(dep.subscriber_count(), 0);
        assert_eq!(vm.watcher_count(), 0);
        assert_eq!(vm.data().observer().unwrap().vm_count(), 0);
    }

    #[test]
    fn dropping_the_instance_tears_down_watchers() {
        let runtime = Runtime::new();
        let data: Object = [("a", 1)].into_iter().collect();
        let handle = {
            let vm = Instance::new(&runtime, InstanceOptions::new().data(data.clone())).unwrap();
            vm.watch("a", |_, _| Ok(()), WatchOptions::default()).unwrap()
        };
        assert!(!handle.is_active());
        assert_eq!(slot_dep(&data, "a").unwrap().subscriber_count(), 0);
    }

    #[test]
    fn update_props_does_not_wrap_or_warn() {
        let runtime = Runtime::new();
        let parent = with_data(&runtime, serde_json::json!({}));
        let child = Instance::new(&runtime, InstanceOptions::new().parent(&parent).prop("item")).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        child
            .watch(
                "item",
                move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                WatchOptions {
                    sync: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let item: Object = [("x", 1)].into_iter().collect();
        child.update_props([("item", item.clone())]);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(item.observer().is_none());
        assert!(!child.is_setting_props());
        assert!(child.parent().unwrap().ptr_eq(&parent));
    }

    #[test]
    fn immediate_errors_without_handler_fail_construction() {
        let runtime = Runtime::new();
        let data: Object = [("a", 1)].into_iter().collect();
        let result = Instance::new(
            &runtime,
            InstanceOptions::new().data(data).watch(
                "a",
                WatchDef::new(
                    |_, _| Err("nope".into()),
                    WatchOptions {
                        immediate: true,
                        ..Default::default()
                    },
                ),
            ),
        );
        assert!(result.is_err());
    }

    #[test]
    fn watch_after_destroy_is_inert() {
        let runtime = Runtime::new();
        let vm = with_data(&runtime, serde_json::json!({ "a": 1 }));
        vm.destroy();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let handle = vm
            .watch(
                "a",
                move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                WatchOptions {
                    immediate: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!handle.is_active());
        assert_eq!(vm.watcher_count(), 0);
        assert_eq!(slot_dep(&vm.data(), "a").unwrap().subscriber_count(), 0);

        vm.set("a", 2);
        runtime.tick().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn declared_methods_are_callable() {
        let runtime = Runtime::new();
        let data: Object = [("count", 2)].into_iter().collect();
        let vm = Instance::new(
            &runtime,
            InstanceOptions::new()
                .data(data)
                .method("scaled", |vm, args| {
                    let factor = args.first().and_then(Value::as_number).unwrap_or(1.0);
                    Ok(Value::from(vm.get("count").as_number().unwrap_or_default() * factor))
                })
                .method("fail", |_, _| Err("nope".into())),
        )
        .unwrap();

        assert!(vm.has_method("scaled"));
        assert_eq!(vm.call("scaled", &[Value::from(3)]).unwrap(), Value::from(6));
        assert!(matches!(vm.call("fail", &[]), Err(ReactiveError::Method { .. })));
        assert!(matches!(vm.call("missing", &[]), Err(ReactiveError::UnknownMethod(_))));
    }
}
