//! Reactive Context
//!
//! The reactive context tracks which lifecycle is rendering and which effect
//! is currently running. This enables automatic dependency tracking: when an
//! atom is read, the running effect (if any) is told about it.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a context pushes an entry, and the
//! returned guard pops it when dropped, so the stack stays balanced even if
//! the computation panics.
//!
//! Rendering enters a context with a lifecycle but no tracker: atoms read by
//! a template are not dependencies of whatever effect triggered the render.

use std::cell::RefCell;
use std::rc::Rc;

use super::lifecycle::Lifecycle;
use crate::graph::SourceId;

/// Something that wants to hear about atom reads.
pub(crate) trait Tracker {
    fn report(&self, source: SourceId);
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

#[derive(Clone)]
struct ContextEntry {
    id: u64,
    lifecycle: Option<Lifecycle>,
    tracker: Option<Rc<dyn Tracker>>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    id: u64,
}

impl ReactiveContext {
    pub(crate) fn enter(lifecycle: Option<Lifecycle>, tracker: Option<Rc<dyn Tracker>>) -> Self {
        thread_local! {
            static NEXT_ID: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
        }
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });

        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry { id, lifecycle, tracker });
        });

        Self { id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Whether atom reads are currently being recorded by an effect.
    pub fn is_tracking() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.tracker.is_some())
        })
    }

    /// The lifecycle hooks and effects currently attach to.
    pub fn current_lifecycle() -> Option<Lifecycle> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.lifecycle.clone())
        })
    }

    /// Report that `source` was read.
    ///
    /// Does nothing outside of an effect run.
    pub(crate) fn report_access(source: SourceId) {
        let tracker = CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.tracker.clone())
        });

        if let Some(tracker) = tracker {
            tracker.report(source);
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten();

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.id, self.id,
                "ReactiveContext mismatch: expected {}, got {}",
                self.id, entry.id
            );
        }
    }
}

/// Run `f` with `lifecycle` as the current lifecycle and tracking disabled.
///
/// The previous context is restored afterwards, including on panic.
pub fn with_lifecycle<R>(lifecycle: &Lifecycle, f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(Some(lifecycle.clone()), None);
    f()
}

/// Run `f` without recording atom reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(ReactiveContext::current_lifecycle(), None);
    f()
}
