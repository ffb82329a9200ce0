//! Reactive Runtime
//!
//! The runtime is the handle for one independent reactive universe. It
//! connects watchers to the batching scheduler and owns the pieces of state
//! that are shared by everything created against it:
//!
//! - the [`Config`],
//! - the error handler for user callbacks,
//! - the watcher queue and the next-tick queue,
//! - hooks that run after every flush.
//!
//! # How a write propagates
//!
//! 1. A tracked slot is written and notifies its dep.
//! 2. Each subscribed watcher either marks itself dirty (lazy), runs on the
//!    spot (sync), or is queued here.
//! 3. The first watcher queued in a turn requests a drain from the
//!    [`Tick`] strategy.
//! 4. The drain flushes the queue once, in creation order.
//!
//! Several runtimes can coexist; watchers belong to the runtime of the
//! instance that created them.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use super::Watcher;
use crate::config::Config;
use crate::error::{ReactiveError, Result};
use crate::instance::Instance;
use crate::scheduler::queue::WatcherQueue;
use crate::scheduler::tick::{NextTick, Task};
use crate::scheduler::{ManualTick, Tick};

/// Sink for errors raised by user watcher callbacks.
pub type ErrorHandler = Arc<dyn Fn(&ReactiveError, Option<&Instance>) + Send + Sync>;

/// Hook invoked after each flush of the watcher queue.
pub type FlushHook = Arc<dyn Fn() + Send + Sync>;

struct RuntimeInner {
    config: RwLock<Config>,
    error_handler: RwLock<Option<ErrorHandler>>,
    flush_hooks: RwLock<Vec<FlushHook>>,
    queue: WatcherQueue,
    next_tick: NextTick,
}

/// Handle to a reactive universe. Cloning shares it.
#[derive(Clone)]
pub struct Runtime(Arc<RuntimeInner>);

impl Runtime {
    /// A runtime with the default config whose host drives flushes by
    /// calling [`tick`](Self::tick).
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_tick(config, ManualTick)
    }

    /// A runtime that defers flushes through `tick`.
    pub fn with_tick(config: Config, tick: impl Tick) -> Self {
        Self(Arc::new(RuntimeInner {
            config: RwLock::new(config),
            error_handler: RwLock::new(None),
            flush_hooks: RwLock::new(Vec::new()),
            queue: WatcherQueue::default(),
            next_tick: NextTick::new(Arc::new(tick)),
        }))
    }

    pub fn config(&self) -> Config {
        self.0.config.read().clone()
    }

    pub fn set_config(&self, config: Config) {
        *self.0.config.write() = config;
    }

    pub fn is_production(&self) -> bool {
        self.0.config.read().production
    }

    /// Install the sink for user callback errors. With a sink installed,
    /// such errors no longer propagate.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&ReactiveError, Option<&Instance>) + Send + Sync + 'static,
    {
        *self.0.error_handler.write() = Some(Arc::new(handler));
    }

    pub fn clear_error_handler(&self) {
        *self.0.error_handler.write() = None;
    }

    pub(crate) fn handle_error(&self, error: ReactiveError, vm: Option<&Instance>) -> Result<()> {
        let handler = self.0.error_handler.read().clone();
        match handler {
            Some(handler) => {
                handler(&error, vm);
                Ok(())
            }
            None => {
                if !self.is_production() {
                    error!(target: "ripple::error", error = %error, "unhandled watcher callback error");
                }
                Err(error)
            }
        }
    }

    /// Register a hook to run after every flush of the watcher queue.
    pub fn on_flush<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.0.flush_hooks.write().push(Arc::new(hook));
    }

    /// Defer `callback` until the next drain.
    pub fn next_tick<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.0.next_tick.push(Task::Callback(Box::new(callback)), self);
    }

    /// Drain deferred work: flush queued watchers and run next-tick
    /// callbacks, in the order they were deferred.
    pub fn tick(&self) -> Result<()> {
        self.0.next_tick.drain(self)
    }

    /// Whether a drain has been requested and not run yet.
    pub fn has_pending_tick(&self) -> bool {
        self.0.next_tick.is_pending()
    }

    /// Number of watchers waiting for the next flush.
    pub fn queued_watchers(&self) -> usize {
        self.0.queue.len()
    }

    pub(crate) fn queue_watcher(&self, watcher: Arc<Watcher>) {
        if self.0.queue.push(watcher) {
            self.0.next_tick.push(Task::FlushWatchers, self);
        }
    }

    pub(crate) fn flush_watchers(&self) -> Result<()> {
        let max_update_count = self.0.config.read().max_update_count;
        let result = self.0.queue.flush(max_update_count);
        let hooks = self.0.flush_hooks.read().clone();
        for hook in hooks {
            hook();
        }
        result
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config())
            .field("queued_watchers", &self.queued_watchers())
            .field("pending_tick", &self.has_pending_tick())
            .finish()
    }
}
