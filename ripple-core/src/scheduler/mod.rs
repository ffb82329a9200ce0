//! Scheduling
//!
//! Notified watchers are batched: they are queued in a watcher queue that is
//! flushed once per turn through the next-tick mechanism. The
//! host decides what "after the current turn" means by picking a [`Tick`]
//! strategy when building the runtime.

pub(crate) mod queue;
pub(crate) mod tick;

pub use tick::{Drain, ManualTick, Tick, TokioTick};
