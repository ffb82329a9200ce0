//! Reactive Context
//!
//! The reactive context tracks which computation is currently evaluating.
//! This enables automatic dependency tracking: when a tracked slot is read,
//! the slot's [`Dep`](super::Dep) is handed to the computation on top of the
//! stack.
//!
//! # Implementation
//!
//! We use a thread-local stack of subscribers. Entering an evaluation pushes
//! the watcher; dropping the returned guard pops it, so the stack is restored
//! even when an evaluation function panics. Nesting is expected: a render
//! that reads a computed property evaluates the computed watcher on top of
//! itself, and the render must be the target again afterwards.
//!
//! The same thread-local state carries the conversion flag: while it is off,
//! values handed to the tracking layer are left unwrapped. Instance
//! initialization turns it off for child-instance props only.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::{Subscriber, SubscriberId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Arc<dyn Subscriber>>> = RefCell::new(Vec::new());
    static SHOULD_CONVERT: Cell<bool> = const { Cell::new(true) };
}

/// Guard that pops the evaluation target when dropped.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Make `target` the active computation until the guard is dropped.
    pub fn enter(target: Arc<dyn Subscriber>) -> Self {
        let subscriber_id = target.subscriber_id();
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { subscriber_id }
    }

    /// Check if there is an active computation.
    pub fn is_active() -> bool {
        TARGET_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The computation on top of the stack, if any.
    pub fn current() -> Option<Arc<dyn Subscriber>> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        TARGET_STACK.with(|stack| stack.borrow().last().map(|target| target.subscriber_id()))
    }

    /// Number of nested evaluations in progress on this thread.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(target) = popped {
                debug_assert_eq!(
                    target.subscriber_id(),
                    self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id,
                    target.subscriber_id()
                );
            }
        });
    }
}

/// Whether newly encountered containers are wrapped.
pub fn should_convert() -> bool {
    SHOULD_CONVERT.with(Cell::get)
}

/// Scoped override of the conversion flag.
///
/// Dropping the guard turns conversion back on, including during unwinding.
pub struct ConversionGuard {
    _private: (),
}

impl ConversionGuard {
    pub fn set(enabled: bool) -> Self {
        SHOULD_CONVERT.with(|flag| flag.set(enabled));
        Self { _private: () }
    }
}

impl Drop for ConversionGuard {
    fn drop(&mut self) {
        SHOULD_CONVERT.with(|flag| flag.set(true));
    }
}
