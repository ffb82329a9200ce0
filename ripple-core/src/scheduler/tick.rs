//! Next-tick deferral.
//!
//! Work deferred with [`Runtime::next_tick`](crate::reactive::Runtime::next_tick)
//! runs once the current synchronous turn is over. The first task queued in
//! a turn asks the [`Tick`] strategy for a drain; later tasks ride along.
//! A drain runs a snapshot of the queue, so tasks queued while draining
//! wait for the next drain.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::RuntimeFlavor;
use tracing::{error, trace};

use crate::error::{ReactiveError, Result};
use crate::reactive::Runtime;

/// A deferred drain request.
pub type Drain = Box<dyn FnOnce() + Send + 'static>;

/// How a runtime defers its drain until after the current turn.
pub trait Tick: Send + Sync + 'static {
    /// Arrange for `drain` to run once the current synchronous work has
    /// unwound.
    fn schedule(&self, drain: Drain);
}

/// The host drives the drain by calling
/// [`Runtime::tick`](crate::reactive::Runtime::tick) at the end of each turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualTick;

impl Tick for ManualTick {
    fn schedule(&self, _drain: Drain) {
        trace!("drain requested; waiting for the host to tick");
    }
}

/// Spawns the drain as a task on a current-thread tokio runtime, so it runs
/// once the writing task yields.
///
/// Multi-thread runtimes are refused: a worker could pick the drain up while
/// the writer's synchronous turn is still going. Writes must happen on the
/// runtime's own thread.
#[derive(Debug, Clone)]
pub struct TokioTick {
    handle: tokio::runtime::Handle,
}

impl TokioTick {
    pub fn new(handle: tokio::runtime::Handle) -> Result<Self> {
        match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Ok(Self { handle }),
            _ => Err(ReactiveError::TokioRuntime("a current-thread runtime is required")),
        }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| ReactiveError::TokioRuntime("not called from within a tokio runtime"))?;
        Self::new(handle)
    }
}

impl Tick for TokioTick {
    fn schedule(&self, drain: Drain) {
        self.handle.spawn(async move { drain() });
    }
}

pub(crate) enum Task {
    FlushWatchers,
    Callback(Box<dyn FnOnce() + Send + 'static>),
}

#[derive(Default)]
struct TickState {
    tasks: Vec<Task>,
    pending: bool,
}

pub(crate) struct NextTick {
    state: Mutex<TickState>,
    strategy: Arc<dyn Tick>,
}

impl NextTick {
    pub(crate) fn new(strategy: Arc<dyn Tick>) -> Self {
        Self {
            state: Mutex::new(TickState::default()),
            strategy,
        }
    }

    pub(crate) fn push(&self, task: Task, runtime: &Runtime) {
        let request = {
            let mut state = self.state.lock();
            state.tasks.push(task);
            !std::mem::replace(&mut state.pending, true)
        };
        if request {
            let runtime = runtime.clone();
            self.strategy.schedule(Box::new(move || {
                if let Err(err) = runtime.tick() {
                    error!(target: "ripple::error", error = %err, "deferred flush failed");
                }
            }));
        }
    }

    /// Run the queued tasks. Returns the first flush error, after every
    /// task has run.
    pub(crate) fn drain(&self, runtime: &Runtime) -> Result<()> {
        let tasks = {
            let mut state = self.state.lock();
            state.pending = false;
            std::mem::take(&mut state.tasks)
        };
        let mut first_error = None;
        for task in tasks {
            match task {
                Task::FlushWatchers => {
                    if let Err(err) = runtime.flush_watchers() {
                        first_error.get_or_insert(err);
                    }
                }
                Task::Callback(callback) => callback(),
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state.lock().pending
    }
}
