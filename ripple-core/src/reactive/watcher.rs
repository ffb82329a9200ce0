//! Watcher Implementation
//!
//! A Watcher wraps an expression, remembers its last value, re-collects its
//! dependencies on every evaluation, and re-runs when one of them changes.
//! It backs render functions, computed properties and user watches.
//!
//! # Dependency bookkeeping
//!
//! Each evaluation collects deps into a fresh set. A dep read for the first
//! time subscribes the watcher; a dep that was already a dependency last
//! time is not subscribed again. After the evaluation, deps from the
//! previous run that were not read this time are unsubscribed, then the two
//! sets swap. The subscription graph therefore always matches what the last
//! evaluation actually read.
//!
//! # Modes
//!
//! - `lazy`: a notification only marks the watcher dirty; the value is
//!   recomputed by [`Watcher::evaluate`] when someone reads it.
//! - `sync`: a notification re-runs the watcher immediately.
//! - otherwise the watcher is queued with the runtime and runs once in the
//!   next flush, however many times it was notified.
//! - `user`: reaction callback errors go to the runtime's error handler.
//! - `deep`: every property reachable from the value becomes a dependency.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{error, warn};

use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::path::parse_path;
use super::runtime::Runtime;
use super::traverse::traverse;
use super::{Subscriber, SubscriberId};
use crate::error::{BoxError, ReactiveError, Result};
use crate::instance::{Instance, WeakInstance};
use crate::observer::Value;

/// Evaluation function of a watcher.
pub type Getter = Arc<dyn Fn(&Instance) -> Value + Send + Sync>;

/// Reaction callback, invoked with `(new_value, old_value)`.
pub type Callback = Arc<dyn Fn(&Value, &Value) -> std::result::Result<(), BoxError> + Send + Sync>;

/// A callback that does nothing. Computed and render watchers use it.
pub fn noop_callback() -> Callback {
    Arc::new(|_, _| Ok(()))
}

/// What a watcher evaluates.
#[derive(Clone)]
pub enum Expr {
    /// A dot-delimited property path resolved from the instance object.
    Path(String),
    /// An arbitrary evaluation function.
    Func(Getter),
}

impl Expr {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Instance) -> Value + Send + Sync + 'static,
    {
        Expr::Func(Arc::new(f))
    }

    fn describe(&self) -> String {
        match self {
            Expr::Path(path) => path.clone(),
            Expr::Func(_) => "function".to_string(),
        }
    }
}

impl From<&str> for Expr {
    fn from(path: &str) -> Self {
        Expr::Path(path.to_string())
    }
}

impl From<String> for Expr {
    fn from(path: String) -> Self {
        Expr::Path(path)
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Expr::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Behavior flags of a watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherOptions {
    pub deep: bool,
    pub user: bool,
    pub lazy: bool,
    pub sync: bool,
}

type DepList = SmallVec<[Arc<Dep>; 4]>;

struct WatcherState {
    value: Value,
    dirty: bool,
    deps: DepList,
    dep_ids: HashSet<DepId>,
    new_deps: DepList,
    new_dep_ids: HashSet<DepId>,
}

/// A live, re-runnable subscription over an expression.
pub struct Watcher {
    id: SubscriberId,
    this: Weak<Watcher>,
    owner: WeakInstance,
    runtime: Runtime,
    expression: String,
    getter: Getter,
    callback: Callback,
    options: WatcherOptions,
    active: AtomicBool,
    state: Mutex<WatcherState>,
}

impl Watcher {
    /// Create a watcher owned by `vm` and register it with the instance.
    ///
    /// Non-lazy watchers evaluate immediately to collect their initial
    /// dependencies; lazy ones start dirty. A path that cannot be parsed
    /// yields a watcher whose value is always `Undefined`. On an instance
    /// that is being destroyed the watcher starts inactive and is neither
    /// registered nor evaluated.
    pub fn new(vm: &Instance, expr: Expr, callback: Callback, options: WatcherOptions) -> Arc<Watcher> {
        let runtime = vm.runtime().clone();
        let expression = expr.describe();
        let getter = match expr {
            Expr::Func(getter) => getter,
            Expr::Path(path) => parse_path(&path).unwrap_or_else(|| {
                if !runtime.is_production() {
                    warn!(
                        target: "ripple::warn",
                        path = %path,
                        "failed watching path: only simple dot-delimited paths are accepted; \
                         use a function for anything else"
                    );
                }
                let fallback: Getter = Arc::new(|_: &Instance| Value::Undefined);
                fallback
            }),
        };

        let destroyed = vm.is_being_destroyed();
        let watcher = Arc::new_cyclic(|this| Watcher {
            id: SubscriberId::new(),
            this: this.clone(),
            owner: vm.downgrade(),
            runtime,
            expression,
            getter,
            callback,
            options,
            active: AtomicBool::new(!destroyed),
            state: Mutex::new(WatcherState {
                value: Value::Undefined,
                dirty: options.lazy,
                deps: SmallVec::new(),
                dep_ids: HashSet::new(),
                new_deps: SmallVec::new(),
                new_dep_ids: HashSet::new(),
            }),
        });
        if destroyed {
            return watcher;
        }
        vm.register_watcher(watcher.clone());

        if !options.lazy {
            let value = watcher.get();
            watcher.state.lock().value = value;
        }
        watcher
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn options(&self) -> WatcherOptions {
        self.options
    }

    /// The cached value from the last evaluation.
    pub fn value(&self) -> Value {
        self.state.lock().value.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ids of the deps collected by the last completed evaluation.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.state.lock().deps.iter().map(|dep| dep.id()).collect()
    }

    pub fn dependency_count(&self) -> usize {
        self.state.lock().deps.len()
    }

    /// Run the getter as the active computation and re-collect dependencies.
    ///
    /// Panics from the getter propagate; the context stack is still
    /// restored and the partial collection is dropped, leaving the previous
    /// dependencies in place.
    pub fn get(&self) -> Value {
        let (Some(vm), Some(this)) = (self.owner.upgrade(), self.this.upgrade()) else {
            return Value::Undefined;
        };
        let value = {
            let _ctx = ReactiveContext::enter(this);
            let collecting = Collecting {
                watcher: self,
                finished: false,
            };
            let value = (self.getter)(&vm);
            if self.options.deep {
                traverse(&value);
            }
            collecting.finish();
            value
        };
        self.cleanup_deps();
        value
    }

    fn cleanup_deps(&self) {
        let stale: DepList = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let stale = state
                .deps
                .iter()
                .filter(|dep| !state.new_dep_ids.contains(&dep.id()))
                .cloned()
                .collect();
            std::mem::swap(&mut state.deps, &mut state.new_deps);
            std::mem::swap(&mut state.dep_ids, &mut state.new_dep_ids);
            state.new_deps.clear();
            state.new_dep_ids.clear();
            stale
        };
        for dep in stale {
            dep.remove_sub(self.id);
        }
    }

    fn discard_new_deps(&self) {
        let partial: DepList = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let partial = state
                .new_deps
                .iter()
                .filter(|dep| !state.dep_ids.contains(&dep.id()))
                .cloned()
                .collect();
            state.new_deps.clear();
            state.new_dep_ids.clear();
            partial
        };
        for dep in partial {
            dep.remove_sub(self.id);
        }
    }

    /// Re-evaluate and fire the callback if the value changed.
    ///
    /// Containers always count as changed, since they may have been mutated
    /// in place; so does anything a deep watcher returns.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let value = self.get();
        let old_value = {
            let mut state = self.state.lock();
            let changed = !value.strict_equals(&state.value) || value.is_container() || self.options.deep;
            if !changed {
                return Ok(());
            }
            std::mem::replace(&mut state.value, value.clone())
        };
        self.fire(&value, &old_value)
    }

    /// Invoke the reaction callback, routing failures of user callbacks
    /// through the runtime's error handler.
    pub(crate) fn fire(&self, value: &Value, old_value: &Value) -> Result<()> {
        let Err(source) = (self.callback)(value, old_value) else {
            return Ok(());
        };
        let error = ReactiveError::Callback {
            expression: self.expression.clone(),
            source,
        };
        if !self.options.user {
            return Err(error);
        }
        let vm = self.owner.upgrade();
        self.runtime.handle_error(error, vm.as_ref())
    }

    /// Recompute a lazy watcher's value and clear its dirty flag.
    pub fn evaluate(&self) {
        let value = self.get();
        let mut state = self.state.lock();
        state.value = value;
        state.dirty = false;
    }

    /// Register every dep of this watcher with the active computation.
    pub fn depend(&self) {
        let deps = self.state.lock().deps.clone();
        for dep in deps.iter().rev() {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep and leave the owner's registry.
    /// Calling it again is a no-op.
    pub fn teardown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(vm) = self.owner.upgrade() {
            if !vm.is_being_destroyed() {
                vm.unregister_watcher(self.id);
            }
        }
        let deps = self.state.lock().deps.clone();
        for dep in deps.iter().rev() {
            dep.remove_sub(self.id);
        }
    }
}

impl Subscriber for Watcher {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Arc<Dep>) {
        let subscribe = {
            let mut state = self.state.lock();
            let id = dep.id();
            if state.new_dep_ids.insert(id) {
                state.new_deps.push(dep.clone());
                !state.dep_ids.contains(&id)
            } else {
                false
            }
        };
        if subscribe {
            let weak: Weak<dyn Subscriber> = self.this.clone();
            dep.add_sub(self.id, weak);
        }
    }

    fn update(&self) {
        if self.options.lazy {
            self.state.lock().dirty = true;
        } else if self.options.sync {
            if let Err(err) = self.run() {
                // user failures were already logged by the runtime unless in production
                if !self.options.user || self.runtime.is_production() {
                    error!(target: "ripple::error", expression = %self.expression, error = %err, "sync watcher failed");
                }
            }
        } else if let Some(this) = self.this.upgrade() {
            self.runtime.queue_watcher(this);
        }
    }
}

/// Drops a partial dependency collection when the getter unwinds.
struct Collecting<'a> {
    watcher: &'a Watcher,
    finished: bool,
}

impl Collecting<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for Collecting<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.watcher.discard_new_deps();
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("expression", &self.expression)
            .field("options", &self.options)
            .field("active", &self.is_active())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
