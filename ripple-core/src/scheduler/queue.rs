//! Watcher Queue
//!
//! Non-sync watchers are not run when notified; they are queued and run
//! together in the next flush.
//!
//! # Guarantees
//!
//! 1. A watcher is queued at most once until the flush starts running it.
//! 2. The flush runs watchers in ascending id order, i.e. creation order,
//!    so a parent's render runs before its children's.
//! 3. A watcher queued while the flush is in progress joins the same flush
//!    at its id position after the watcher currently running.
//! 4. Inactive (torn down) watchers are skipped when their turn comes.
//! 5. A watcher that keeps re-queueing itself is cut off after
//!    `max_update_count` re-runs; the flush stops and reports the loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ReactiveError, Result};
use crate::reactive::{SubscriberId, Watcher};

#[derive(Default)]
struct QueueState {
    queue: Vec<Arc<Watcher>>,
    has: HashSet<SubscriberId>,
    circular: HashMap<SubscriberId, usize>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

impl QueueState {
    fn reset(&mut self) {
        self.queue.clear();
        self.has.clear();
        self.circular.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
    }
}

/// Resets the queue when a flush ends, including by unwinding out of a
/// watcher, so the next write can request a flush again.
struct ResetOnDrop<'a>(&'a Mutex<QueueState>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.lock().reset();
    }
}

#[derive(Default)]
pub(crate) struct WatcherQueue {
    state: Mutex<QueueState>,
}

impl WatcherQueue {
    /// Queue a watcher. Returns `true` when a flush has to be requested.
    pub(crate) fn push(&self, watcher: Arc<Watcher>) -> bool {
        let mut state = self.state.lock();
        let id = watcher.id();
        if !state.has.insert(id) {
            return false;
        }
        if state.flushing {
            let mut position = state.queue.len();
            while position > state.index + 1 && state.queue[position - 1].id() > id {
                position -= 1;
            }
            state.queue.insert(position, watcher);
        } else {
            state.queue.push(watcher);
        }
        !std::mem::replace(&mut state.waiting, true)
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn flush(&self, max_update_count: usize) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.flushing = true;
            state.index = 0;
            state.queue.sort_by_key(|watcher| watcher.id());
            debug!(queued = state.queue.len(), "flushing watcher queue");
        }
        let _reset = ResetOnDrop(&self.state);

        let mut first_error = None;
        loop {
            let watcher = {
                let mut state = self.state.lock();
                if state.index >= state.queue.len() {
                    break;
                }
                let watcher = state.queue[state.index].clone();
                state.has.remove(&watcher.id());
                watcher
            };

            if let Err(err) = watcher.run() {
                first_error.get_or_insert(err);
            }

            let mut state = self.state.lock();
            let id = watcher.id();
            if state.has.contains(&id) {
                let count = state.circular.entry(id).or_insert(0);
                *count += 1;
                if *count > max_update_count {
                    let count = *count;
                    warn!(
                        target: "ripple::warn",
                        expression = watcher.expression(),
                        count,
                        "you may have an infinite update loop"
                    );
                    first_error.get_or_insert(ReactiveError::InfiniteUpdateLoop {
                        expression: watcher.expression().to_string(),
                        count,
                    });
                    break;
                }
            }
            state.index += 1;
        }

        first_error.map_or(Ok(()), Err)
    }
}
