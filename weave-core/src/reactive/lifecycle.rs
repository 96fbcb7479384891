//! Lifecycle Implementation
//!
//! A Lifecycle is the unit of teardown. It owns every dependency edge that
//! was created while it was current, plus mount and unmount callbacks.
//!
//! # How Lifecycles Work
//!
//! 1. Rendering a template makes its group's lifecycle current. Effects,
//!    reactive bindings and hooks created during the render attach to it.
//!
//! 2. `notify_mounted` runs the mount callbacks once, in registration order.
//!
//! 3. `notify_unmounted` tears down child lifecycles, unlinks every owned
//!    edge and runs the unmount callbacks once, in registration order.
//!
//! Callback lists are moved out of the lifecycle before any callback runs,
//! so a panicking callback cannot leave a partially cleared list behind.

use std::rc::{Rc, Weak};

use tracing::debug;

use super::context::ReactiveContext;
use crate::error::{Error, Result};
use crate::graph::{self, HookKind, Scheduler, ScopeId};

/// Callback run when an effect re-runs or its lifecycle unmounts.
pub type Teardown = Box<dyn FnOnce()>;

/// Return types accepted from effect and mount blocks.
pub trait IntoTeardown {
    fn into_teardown(self) -> Option<Teardown>;
}

impl IntoTeardown for () {
    fn into_teardown(self) -> Option<Teardown> {
        None
    }
}

impl IntoTeardown for Teardown {
    fn into_teardown(self) -> Option<Teardown> {
        Some(self)
    }
}

impl IntoTeardown for Option<Teardown> {
    fn into_teardown(self) -> Option<Teardown> {
        self
    }
}

/// Handle to a lifecycle scope. Cloning shares the scope.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Rc<LifecycleInner>,
}

struct LifecycleInner {
    scope: ScopeId,
    scheduler: Rc<Scheduler>,
}

impl Drop for LifecycleInner {
    fn drop(&mut self) {
        graph::release_scope(self.scope);
    }
}

impl Lifecycle {
    /// Create a root lifecycle driven by `scheduler`.
    pub fn new(scheduler: Rc<Scheduler>) -> Self {
        Self {
            inner: Rc::new(LifecycleInner {
                scope: graph::create_scope(None),
                scheduler,
            }),
        }
    }

    /// Create a root lifecycle whose reactions re-run synchronously.
    pub fn root() -> Self {
        Self::new(Scheduler::immediate())
    }

    /// Create a child lifecycle sharing this lifecycle's scheduler. The child
    /// is torn down whenever this lifecycle unmounts.
    pub fn child(&self) -> Self {
        Self {
            inner: Rc::new(LifecycleInner {
                scope: graph::create_scope(Some(self.inner.scope)),
                scheduler: self.inner.scheduler.clone(),
            }),
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.inner.scope
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.inner.scheduler
    }

    /// A handle that does not keep the lifecycle alive. Callbacks stored in
    /// the lifecycle's own scope use it to avoid reference cycles.
    pub fn downgrade(&self) -> WeakLifecycle {
        WeakLifecycle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether this lifecycle's subtree is attached to the live output.
    pub fn is_mounted(&self) -> bool {
        graph::with_graph(|graph| graph.scope(self.inner.scope).is_some_and(|slot| slot.mounted))
    }

    /// Number of dependency edges this lifecycle currently owns.
    pub fn edge_count(&self) -> usize {
        graph::owned_count(self.inner.scope)
    }

    /// Register a callback to run when this lifecycle mounts.
    pub fn on_mount(&self, hook: impl FnOnce() + 'static) {
        graph::push_hook(self.inner.scope, HookKind::Mount, Box::new(hook));
    }

    /// Register a callback to run when this lifecycle unmounts.
    pub fn on_unmount(&self, hook: impl FnOnce() + 'static) {
        graph::push_hook(self.inner.scope, HookKind::Unmount, Box::new(hook));
    }

    /// Mark the lifecycle mounted and run its mount callbacks.
    pub fn notify_mounted(&self) {
        let scope = self.inner.scope;
        graph::with_graph(|graph| {
            if let Some(slot) = graph.scope_mut(scope) {
                slot.mounted = true;
            }
        });

        let hooks = graph::take_hooks(scope, HookKind::Mount);
        for hook in hooks {
            hook();
        }
    }

    /// Tear the lifecycle down.
    ///
    /// Invalidates jobs already queued for this lifecycle, tears down child
    /// lifecycles, unlinks every owned edge and finally runs the unmount
    /// callbacks. The lifecycle can be mounted again afterwards.
    pub fn notify_unmounted(&self) {
        teardown_scope(self.inner.scope);
    }
}

/// Teardown addressed by scope id, so children reached through the graph
/// are handled the same way as the lifecycle they belong to.
fn teardown_scope(scope: ScopeId) {
    graph::with_graph(|graph| {
        if let Some(slot) = graph.scope_mut(scope) {
            slot.mounted = false;
            slot.generation += 1;
        }
    });

    // children first: owned edges may hold the last handle to a child
    let children = graph::children(scope);
    for child in &children {
        teardown_scope(*child);
    }

    let released = graph::unlink_scope(scope);

    let hooks = graph::take_hooks(scope, HookKind::Unmount);
    debug!(?scope, released, children = children.len(), hooks = hooks.len(), "lifecycle unmounted");
    for hook in hooks {
        hook();
    }
}

/// Non-owning counterpart of [`Lifecycle`].
#[derive(Clone)]
pub struct WeakLifecycle {
    inner: Weak<LifecycleInner>,
}

impl WeakLifecycle {
    pub fn upgrade(&self) -> Option<Lifecycle> {
        self.inner.upgrade().map(|inner| Lifecycle { inner })
    }
}

impl PartialEq for Lifecycle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Lifecycle {}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("scope", &self.inner.scope)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// The current lifecycle, or [`Error::NoActiveLifecycle`].
pub fn current_lifecycle() -> Result<Lifecycle> {
    ReactiveContext::current_lifecycle().ok_or(Error::NoActiveLifecycle)
}

/// Register a block to run just after the current lifecycle mounts.
///
/// If the block returns a teardown, it runs when the lifecycle unmounts.
pub fn mounted<F, R>(block: F) -> Result<()>
where
    F: FnOnce() -> R + 'static,
    R: IntoTeardown,
{
    let lifecycle = current_lifecycle()?;
    let target = lifecycle.downgrade();
    lifecycle.on_mount(move || {
        let teardown = block().into_teardown();
        if let (Some(teardown), Some(target)) = (teardown, target.upgrade()) {
            target.on_unmount(teardown);
        }
    });
    Ok(())
}

/// Register a block to run just before the current lifecycle unmounts.
pub fn unmounted(block: impl FnOnce() + 'static) -> Result<()> {
    current_lifecycle()?.on_unmount(block);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::with_lifecycle;
    use std::cell::RefCell;

    fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn hooks_run_once_in_registration_order() {
        let lifecycle = Lifecycle::root();
        let log = recorder();

        for name in ["first", "second"] {
            let log = log.clone();
            lifecycle.on_mount(move || log.borrow_mut().push(name));
        }
        let unmount_log = log.clone();
        lifecycle.on_unmount(move || unmount_log.borrow_mut().push("gone"));

        lifecycle.notify_mounted();
        assert!(lifecycle.is_mounted());
        lifecycle.notify_mounted();
        lifecycle.notify_unmounted();
        lifecycle.notify_unmounted();

        assert!(!lifecycle.is_mounted());
        assert_eq!(*log.borrow(), vec!["first", "second", "gone"]);
    }

    #[test]
    fn hooks_require_a_lifecycle() {
        assert_eq!(mounted(|| ()), Err(Error::NoActiveLifecycle));
        assert_eq!(unmounted(|| ()), Err(Error::NoActiveLifecycle));
    }

    #[test]
    fn mounted_teardown_runs_on_unmount() {
        let lifecycle = Lifecycle::root();
        let log = recorder();

        let block_log = log.clone();
        with_lifecycle(&lifecycle, || {
            mounted(move || {
                block_log.borrow_mut().push("setup");
                let teardown_log = block_log.clone();
                Box::new(move || teardown_log.borrow_mut().push("teardown")) as Teardown
            })
        })
        .unwrap();

        lifecycle.notify_mounted();
        assert_eq!(*log.borrow(), vec!["setup"]);
        lifecycle.notify_unmounted();
        assert_eq!(*log.borrow(), vec!["setup", "teardown"]);
    }

    #[test]
    fn panicking_hook_does_not_run_twice() {
        let lifecycle = Lifecycle::root();
        let log = recorder();

        lifecycle.on_unmount(|| panic!("teardown failed"));
        let after = log.clone();
        lifecycle.on_unmount(move || after.borrow_mut().push("after"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            lifecycle.notify_unmounted();
        }));
        assert!(result.is_err());

        // the list was cleared before the first callback ran
        lifecycle.notify_unmounted();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unmount_cascades_to_children() {
        let parent = Lifecycle::root();
        let child = parent.child();
        let grandchild = child.child();
        let log = recorder();

        let child_log = log.clone();
        child.on_unmount(move || child_log.borrow_mut().push("child"));
        let grandchild_log = log.clone();
        grandchild.on_unmount(move || grandchild_log.borrow_mut().push("grandchild"));
        let parent_log = log.clone();
        parent.on_unmount(move || parent_log.borrow_mut().push("parent"));

        parent.notify_mounted();
        child.notify_mounted();
        grandchild.notify_mounted();
        parent.notify_unmounted();

        assert!(!child.is_mounted());
        assert!(!grandchild.is_mounted());
        assert_eq!(*log.borrow(), vec!["grandchild", "child", "parent"]);
    }
}
