//! Ripple Core
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Observable value trees (objects and arrays with tracked properties)
//! - Automatic dependency tracking for watchers
//! - Cached computed properties and user watches
//! - Batched, ordered re-runs with next-tick deferral
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observer`: the dynamic value model and the wrapping that makes it
//!   observable
//! - `reactive`: deps, watchers and the runtime that schedules them
//! - `scheduler`: the watcher queue and next-tick strategies
//! - `instance`: owning contexts with props, data, computed properties and
//!   watches
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{ComputedDef, Instance, InstanceOptions, Object, Runtime, Value, WatchOptions};
//!
//! let runtime = Runtime::new();
//! let data: Object = [("count", 1)].into_iter().collect();
//! let vm = Instance::new(
//!     &runtime,
//!     InstanceOptions::new().data(data).computed(
//!         "doubled",
//!         ComputedDef::getter(|vm| Value::from(vm.get("count").as_number().unwrap_or(0.0) * 2.0)),
//!     ),
//! )?;
//!
//! vm.watch("doubled", |new, old| {
//!     println!("doubled: {old} -> {new}");
//!     Ok(())
//! }, WatchOptions::default())?;
//!
//! vm.set("count", 5);
//! // Nothing has run yet; the watcher is queued until the turn ends.
//! runtime.tick()?;
//! // prints: "doubled: 2 -> 10"
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod observer;
pub mod reactive;
pub mod scheduler;

pub use config::Config;
pub use error::{BoxError, ReactiveError, Result};
pub use instance::{ComputedDef, Instance, InstanceOptions, Method, WatchDef, WatchHandle, WatchOptions};
pub use observer::{del, observe, set, Array, Object, Value};
pub use reactive::{Expr, Runtime, Watcher, WatcherOptions};
pub use scheduler::{ManualTick, Tick, TokioTick};
