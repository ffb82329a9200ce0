//! Reactive Primitives
//!
//! This module implements dependency tracking: deps, watchers, and the
//! runtime that schedules them.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A [`Dep`] is the subscription point for one observable location: a
//! single object property, or the structure of a whole object or array.
//! Reading the location while a watcher evaluates subscribes that watcher;
//! writing it notifies every subscriber.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates an expression, records which deps it read, and
//! reacts when any of them changes. Render functions, computed properties
//! and user watches are all watchers with different options.
//!
//! ## Runtime
//!
//! The [`Runtime`] batches watcher re-runs: writes within one synchronous
//! turn queue each affected watcher once, and the queue is flushed in
//! creation order when the turn ends.
//!
//! # Implementation Notes
//!
//! The watcher currently being evaluated lives on a thread-local stack (see
//! [`ReactiveContext`]). Deps only hold weak references to their
//! subscribers; the owning [`Instance`](crate::instance::Instance) keeps
//! watchers alive.

mod context;
mod dep;
mod path;
mod runtime;
mod subscriber;
mod traverse;
mod watcher;

pub use context::{should_convert, ConversionGuard, ReactiveContext};
pub use dep::{Dep, DepId};
pub use path::parse_path;
pub use runtime::{ErrorHandler, FlushHook, Runtime};
pub use subscriber::{Subscriber, SubscriberId};
pub use traverse::traverse;
pub use watcher::{noop_callback, Callback, Expr, Getter, Watcher, WatcherOptions};
