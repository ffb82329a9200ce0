//! Error types for the reactive runtime.
//!
//! Failures that surface as values: a reaction callback or method that
//! returned an error, a call to an undeclared method, a flush that hit the
//! re-run cap, a bad configuration document, and a tokio runtime the tick
//! strategy cannot defer on. Usage mistakes
//! (adding keys to root data, writing to frozen containers, malformed watch
//! paths) are reported through `tracing` and otherwise ignored. Panics in
//! evaluation functions are never caught here.

use thiserror::Error;

/// Error type returned by reaction callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A watcher's reaction callback returned an error.
    #[error("error in watcher \"{expression}\": {source}")]
    Callback {
        /// The watched expression, or a label for function watchers.
        expression: String,
        #[source]
        source: BoxError,
    },

    /// A watcher kept re-queueing itself within a single flush.
    #[error("infinite update loop in watcher \"{expression}\" after {count} re-runs in one flush")]
    InfiniteUpdateLoop { expression: String, count: usize },

    /// A method was called by a name the instance never declared.
    #[error("no method named \"{0}\"")]
    UnknownMethod(String),

    /// A declared method returned an error.
    #[error("error in method \"{name}\": {source}")]
    Method {
        name: String,
        #[source]
        source: BoxError,
    },

    /// A configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// [`TokioTick`](crate::scheduler::TokioTick) was handed a runtime it
    /// cannot defer on.
    #[error("tokio tick unavailable: {0}")]
    TokioRuntime(&'static str),
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
