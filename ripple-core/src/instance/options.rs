//! Declarative instance options.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{Instance, WeakInstance};
use crate::error::BoxError;
use crate::observer::{Object, Value};
use crate::reactive::{Callback, Getter, Watcher};

/// A named instance method. It receives the instance and the call
/// arguments.
pub type Method = Arc<dyn Fn(&Instance, &[Value]) -> Result<Value, BoxError> + Send + Sync>;

/// Setter half of a computed property.
pub type ComputedSetter = Arc<dyn Fn(&Instance, Value) + Send + Sync>;

/// A computed property definition.
#[derive(Clone)]
pub struct ComputedDef {
    pub(crate) get: Option<Getter>,
    pub(crate) set: Option<ComputedSetter>,
    pub(crate) cache: bool,
}

impl ComputedDef {
    /// A cached, read-only computed property.
    pub fn getter<F>(get: F) -> Self
    where
        F: Fn(&Instance) -> Value + Send + Sync + 'static,
    {
        Self {
            get: Some(Arc::new(get)),
            set: None,
            cache: true,
        }
    }

    /// A cached computed property that also accepts writes.
    pub fn accessor<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&Instance) -> Value + Send + Sync + 'static,
        S: Fn(&Instance, Value) + Send + Sync + 'static,
    {
        Self {
            get: Some(Arc::new(get)),
            set: Some(Arc::new(set)),
            cache: true,
        }
    }

    /// A write-only computed property; reads yield `Undefined`.
    pub fn setter<S>(set: S) -> Self
    where
        S: Fn(&Instance, Value) + Send + Sync + 'static,
    {
        Self {
            get: None,
            set: Some(Arc::new(set)),
            cache: true,
        }
    }

    /// With `false`, the getter runs on every read instead of being cached
    /// by a lazy watcher.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

/// Options accepted by [`Instance::watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Depend on everything reachable from the value.
    pub deep: bool,
    /// Invoke the callback with the current value at registration.
    pub immediate: bool,
    /// Run on every write instead of once per flush.
    pub sync: bool,
}

#[derive(Clone)]
pub(crate) enum WatchHandler {
    Callback(Callback),
    /// Resolved against the instance's methods when watches are set up.
    Method(String),
}

/// One handler of a declared watch.
#[derive(Clone)]
pub struct WatchDef {
    pub(crate) handler: WatchHandler,
    pub(crate) options: WatchOptions,
}

impl WatchDef {
    pub fn new<F>(callback: F, options: WatchOptions) -> Self
    where
        F: Fn(&Value, &Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            handler: WatchHandler::Callback(Arc::new(callback)),
            options,
        }
    }

    /// Handle changes with the declared method `name`, called with
    /// `[new, old]`.
    pub fn method(name: impl Into<String>, options: WatchOptions) -> Self {
        Self {
            handler: WatchHandler::Method(name.into()),
            options,
        }
    }
}

/// Everything an [`Instance`] is built from.
#[derive(Default)]
pub struct InstanceOptions {
    pub(crate) parent: Option<WeakInstance>,
    pub(crate) props: IndexMap<String, Value>,
    pub(crate) methods: IndexMap<String, Method>,
    pub(crate) data: Option<Object>,
    pub(crate) computed: IndexMap<String, ComputedDef>,
    pub(crate) watch: IndexMap<String, Vec<WatchDef>>,
}

impl InstanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make this a child instance. Children do not wrap prop values and
    /// warn when a prop is assigned directly.
    pub fn parent(mut self, parent: &Instance) -> Self {
        self.parent = Some(parent.downgrade());
        self
    }

    /// Declare a prop the parent did not pass a value for.
    pub fn prop(mut self, key: impl Into<String>) -> Self {
        self.props.entry(key.into()).or_insert(Value::Undefined);
        self
    }

    /// Declare a prop with the value passed by the parent.
    pub fn prop_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Declare a method, callable with [`Instance::call`] and usable as a
    /// watch handler by name.
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Root data. Every key is proxied onto the instance.
    pub fn data(mut self, data: Object) -> Self {
        self.data = Some(data);
        self
    }

    pub fn computed(mut self, key: impl Into<String>, def: ComputedDef) -> Self {
        self.computed.insert(key.into(), def);
        self
    }

    /// Declare a watch. Declaring the same key again adds another handler.
    pub fn watch(mut self, key: impl Into<String>, def: WatchDef) -> Self {
        self.watch.entry(key.into()).or_default().push(def);
        self
    }
}

/// Handle to a user watch created by [`Instance::watch`].
#[derive(Clone)]
pub struct WatchHandle {
    watcher: Arc<Watcher>,
}

impl WatchHandle {
    pub(crate) fn new(watcher: Arc<Watcher>) -> Self {
        Self { watcher }
    }

    /// Stop watching. Calling it again is a no-op.
    pub fn unwatch(&self) {
        self.watcher.teardown();
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_active()
    }

    /// The last value the watch observed.
    pub fn value(&self) -> Value {
        self.watcher.value()
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").field("watcher", &self.watcher).finish()
    }
}
