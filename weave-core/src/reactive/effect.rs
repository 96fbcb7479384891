//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever an atom
//! it read during its last run changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its block immediately to establish
//!    initial dependencies.
//!
//! 2. Every run first increments the effect's epoch. Each atom read during
//!    the run creates an edge tagged with the current epoch, or re-tags the
//!    edge the effect already holds for that atom.
//!
//! 3. When an atom notifies, the edge's tag is compared with the effect's
//!    epoch. An older tag means the atom was not read during the latest
//!    run: the edge is unlinked on the spot and the notification dropped.
//!    Otherwise the effect is queued on its lifecycle's scheduler, once per
//!    tick no matter how many atoms notify.
//!
//! This keeps dependency cleanup lazy and O(1) per stale edge instead of
//! diffing dependency sets after every run.
//!
//! A run that writes an atom it already read can re-trigger itself through a
//! synchronous scheduler. The nested trigger only marks the effect dirty, and
//! the outer run loops once it returns.
//!
//! # Cleanup
//!
//! A block can return a [`Teardown`]. It runs right before the next run and
//! when the effect's lifecycle unmounts.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::{ReactiveContext, Tracker};
use super::lifecycle::{current_lifecycle, IntoTeardown, Lifecycle, Teardown, WeakLifecycle};
use crate::error::Result;
use crate::graph::{self, EdgeId, Job, ScopeId, SourceId};

type Block = Box<dyn FnMut() -> Option<Teardown>>;

/// A computation that runs when its dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use weave_core::reactive::{Atom, Effect, Lifecycle};
///
/// let lifecycle = Lifecycle::root();
/// let count = Atom::new(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let (count_clone, seen_clone) = (count.clone(), seen.clone());
/// let _effect = Effect::new(&lifecycle, move || seen_clone.set(count_clone.get()));
/// assert_eq!(seen.get(), 0);
///
/// count.set(5); // the root lifecycle's scheduler drains synchronously
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

struct EffectInner {
    lifecycle: WeakLifecycle,
    scope: ScopeId,

    /// The user block.
    block: RefCell<Block>,

    /// Starts at 1, incremented at the start of every run.
    epoch: Cell<u64>,

    /// Edge currently held for each atom read and still alive.
    deps: RefCell<HashMap<SourceId, EdgeId>>,

    /// Teardown returned by the previous run.
    teardown: RefCell<Option<Teardown>>,
    teardown_registered: Cell<bool>,

    queued: Cell<bool>,
    running: Cell<bool>,
    /// Set when the effect was triggered again while its block was running.
    dirty: Cell<bool>,
    disposed: Cell<bool>,
    runs: Cell<usize>,

    /// Job body handed to the scheduler; holds only a weak reference.
    job: Rc<dyn Fn()>,
    this: Weak<EffectInner>,
}

impl Effect {
    /// Create an effect owned by `lifecycle` and run it once.
    pub fn new<F, R>(lifecycle: &Lifecycle, mut block: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: IntoTeardown,
    {
        let inner = Rc::new_cyclic(|this: &Weak<EffectInner>| {
            let weak = this.clone();
            EffectInner {
                lifecycle: lifecycle.downgrade(),
                scope: lifecycle.scope(),
                block: RefCell::new(Box::new(move || block().into_teardown())),
                epoch: Cell::new(1),
                deps: RefCell::new(HashMap::new()),
                teardown: RefCell::new(None),
                teardown_registered: Cell::new(false),
                queued: Cell::new(false),
                running: Cell::new(false),
                dirty: Cell::new(false),
                disposed: Cell::new(false),
                runs: Cell::new(0),
                job: Rc::new(move || {
                    if let Some(effect) = weak.upgrade() {
                        effect.run();
                    }
                }),
                this: this.clone(),
            }
        });

        inner.run();
        Self { inner }
    }

    /// The effect's current epoch.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Number of atoms the effect is still linked to. Edges of atoms that
    /// were not read in the latest run count until they are lazily dropped.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .borrow()
            .values()
            .filter(|edge| graph::is_linked(**edge))
            .count()
    }

    /// Stop the effect: unlink its edges and run its pending teardown.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl EffectInner {
    fn run(&self) {
        if self.running.get() {
            // the outer run is still inside the block; it re-runs on return
            trace!(scope = ?self.scope, "effect triggered while running");
            self.dirty.set(true);
            return;
        }
        let _running = Running::enter(&self.running);

        loop {
            self.queued.set(false);
            self.dirty.set(false);
            if self.disposed.get() {
                return;
            }

            let previous = self.teardown.borrow_mut().take();
            if let Some(teardown) = previous {
                teardown();
            }

            let next = self.resolve();
            let has_teardown = next.is_some();
            *self.teardown.borrow_mut() = next;

            if has_teardown && !self.teardown_registered.replace(true) {
                if let (Some(lifecycle), Some(this)) = (self.lifecycle.upgrade(), self.this.upgrade()) {
                    lifecycle.on_unmount(move || this.run_teardown());
                }
            }

            // atoms dropped since they were read took their edges with them
            self.deps.borrow_mut().retain(|_, edge| graph::is_linked(*edge));

            if !self.dirty.get() {
                return;
            }
        }
    }

    /// Run the block with this effect as the tracker.
    fn resolve(&self) -> Option<Teardown> {
        let Some(this) = self.this.upgrade() else {
            return None;
        };

        self.epoch.set(self.epoch.get() + 1);
        self.runs.set(self.runs.get() + 1);

        let mut block = self.block.borrow_mut();
        let _ctx = ReactiveContext::enter(self.lifecycle.upgrade(), Some(this as Rc<dyn Tracker>));
        (*block)()
    }

    /// Edge callback: drop stale notifications, schedule fresh ones.
    fn react(&self, source: SourceId, edge: EdgeId, epoch: u64) {
        if self.epoch.get() > epoch {
            trace!(?edge, epoch, current = self.epoch.get(), "dropping stale notification");
            if self.forget(source, edge).is_ok() {
                trace!(?source, "lazily unlinked");
            }
            return;
        }

        if self.disposed.get() || self.queued.replace(true) {
            return;
        }

        match self.lifecycle.upgrade() {
            Some(lifecycle) => {
                trace!(scope = ?self.scope, "scheduling effect");
                lifecycle
                    .scheduler()
                    .schedule(Job::new(self.scope, self.job.clone()));
            }
            None => self.queued.set(false),
        }
    }

    /// Unlink a stale edge and remove it from the dependency map.
    fn forget(&self, source: SourceId, edge: EdgeId) -> Result<()> {
        graph::unlink(edge)?;
        let mut deps = self.deps.borrow_mut();
        if deps.get(&source) == Some(&edge) {
            deps.remove(&source);
        }
        Ok(())
    }

    fn run_teardown(&self) {
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        let edges: Vec<EdgeId> = self.deps.borrow_mut().drain().map(|(_, edge)| edge).collect();
        for edge in edges {
            // edges already dropped lazily or by a teardown are fine to skip
            let _ = graph::unlink(edge);
        }
        self.run_teardown();
    }
}

impl Tracker for EffectInner {
    fn report(&self, source: SourceId) {
        let epoch = self.epoch.get();

        let held = self.deps.borrow().get(&source).copied();
        if let Some(edge) = held {
            if graph::retag(edge, epoch).is_ok() {
                return;
            }
        }

        let Some(this) = self.this.upgrade() else {
            return;
        };
        let edge = graph::link(
            self.scope,
            source,
            epoch,
            graph::callback(move |edge, tag, _| this.react(source, edge, tag)),
        );
        self.deps.borrow_mut().insert(source, edge);
    }
}

/// Marks an effect as running; cleared even if the block panics.
struct Running<'a>(&'a Cell<bool>);

impl<'a> Running<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("scope", &self.inner.scope)
            .field("epoch", &self.epoch())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect in the current lifecycle.
///
/// Fails with [`Error::NoActiveLifecycle`](crate::Error::NoActiveLifecycle)
/// outside of a render or effect run.
pub fn effect<F, R>(block: F) -> Result<Effect>
where
    F: FnMut() -> R + 'static,
    R: IntoTeardown,
{
    let lifecycle = current_lifecycle()?;
    Ok(Effect::new(&lifecycle, block))
}

/// Create an effect owned by an explicit lifecycle.
pub fn effect_in<F, R>(lifecycle: &Lifecycle, block: F) -> Effect
where
    F: FnMut() -> R + 'static,
    R: IntoTeardown,
{
    Effect::new(lifecycle, block)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::graph::{Scheduler, Tick};
    use crate::reactive::{with_lifecycle, Atom};

    /// Lifecycle whose scheduler only drains when the test says so.
    fn deferred() -> (Lifecycle, Rc<Scheduler>) {
        let tick: Tick = Rc::new(|_drain: Box<dyn FnOnce()>| {});
        let scheduler = Scheduler::new(tick);
        (Lifecycle::new(scheduler.clone()), scheduler)
    }

    fn counter() -> (Rc<Cell<i32>>, Rc<Cell<i32>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn effect_runs_on_creation() {
        let lifecycle = Lifecycle::root();
        let (run_count, run_count_clone) = counter();

        let _effect = Effect::new(&lifecycle, move || {
            run_count_clone.set(run_count_clone.get() + 1);
        });

        // Effect should have run once on creation
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn effect_requires_a_lifecycle() {
        assert_eq!(effect(|| ()).map(|_| ()), Err(Error::NoActiveLifecycle));

        let lifecycle = Lifecycle::root();
        let created = with_lifecycle(&lifecycle, || effect(|| ()));
        assert!(created.is_ok());
    }

    #[test]
    fn notifications_are_coalesced_per_tick() {
        let (lifecycle, scheduler) = deferred();
        let a = Atom::new(0);
        let b = Atom::new(0);
        let (runs, runs_clone) = counter();

        let (a_clone, b_clone) = (a.clone(), b.clone());
        let effect = Effect::new(&lifecycle, move || {
            a_clone.get();
            b_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        a.set(1);
        b.set(1);
        a.set(2);
        assert_eq!(scheduler.pending(), 1);

        scheduler.drain();
        assert_eq!(runs.get(), 2);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn dropped_dependency_stops_notifying() {
        let lifecycle = Lifecycle::root();
        let a = Atom::new(1);
        let b = Atom::new(1);
        let use_b = Atom::new(true);
        let (runs, runs_clone) = counter();

        let (a_clone, b_clone, use_b_clone) = (a.clone(), b.clone(), use_b.clone());
        let effect = Effect::new(&lifecycle, move || {
            runs_clone.set(runs_clone.get() + 1);
            a_clone.get();
            if use_b_clone.get() {
                b_clone.get();
            }
        });
        assert_eq!(effect.dependency_count(), 3);

        // run N+1 reads only a (and the flag)
        use_b.set(false);
        assert_eq!(runs.get(), 2);

        // b's edge is stale: it is unlinked and the effect does not re-run
        b.set(2);
        assert_eq!(runs.get(), 2);
        assert_eq!(b.subscriber_count(), 0);
        assert_eq!(effect.dependency_count(), 2);

        a.set(2);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn stale_atom_is_relinked_when_read_again() {
        let lifecycle = Lifecycle::root();
        let flag = Atom::new(true);
        let value = Atom::new(0);
        let seen = Rc::new(Cell::new(-1));

        let (flag_clone, value_clone, seen_clone) = (flag.clone(), value.clone(), seen.clone());
        let _effect = Effect::new(&lifecycle, move || {
            if flag_clone.get() {
                seen_clone.set(value_clone.get());
            }
        });

        flag.set(false);
        value.set(1); // stale, dropped
        flag.set(true);
        assert_eq!(seen.get(), 1);

        value.set(2);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn write_then_read_inside_effect_sees_new_value() {
        let lifecycle = Lifecycle::root();
        let atom = Atom::new(0);
        let seen = Rc::new(Cell::new(-1));

        let (atom_clone, seen_clone) = (atom.clone(), seen.clone());
        let _effect = Effect::new(&lifecycle, move || {
            atom_clone.set(7);
            seen_clone.set(atom_clone.get());
        });

        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn teardown_runs_before_next_run_and_on_unmount() {
        let lifecycle = Lifecycle::root();
        let atom = Atom::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let (atom_clone, log_clone) = (atom.clone(), log.clone());
        let _effect = Effect::new(&lifecycle, move || {
            let value = atom_clone.get();
            log_clone.borrow_mut().push(format!("run {value}"));
            let log = log_clone.clone();
            Box::new(move || log.borrow_mut().push(format!("teardown {value}"))) as Teardown
        });

        atom.set(1);
        lifecycle.notify_unmounted();
        atom.set(2);

        assert_eq!(
            *log.borrow(),
            vec!["run 0", "teardown 0", "run 1", "teardown 1"]
        );
    }

    #[test]
    fn unmount_cancels_queued_runs() {
        let (lifecycle, scheduler) = deferred();
        let atom = Atom::new(0);
        let (runs, runs_clone) = counter();

        let atom_clone = atom.clone();
        let _effect = Effect::new(&lifecycle, move || {
            atom_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        atom.set(1);
        lifecycle.notify_unmounted();
        assert_eq!(atom.subscriber_count(), 0);

        scheduler.drain();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn reentrant_writes_settle_in_one_pass() {
        let (lifecycle, scheduler) = deferred();
        let source = Atom::new(1);
        let doubled = Atom::new(0);
        let observed = Rc::new(RefCell::new(Vec::new()));

        let (source_clone, doubled_clone) = (source.clone(), doubled.clone());
        let _writer = Effect::new(&lifecycle, move || {
            let value = source_clone.get();
            doubled_clone.set(value * 2);
        });

        let (doubled_clone, observed_clone) = (doubled.clone(), observed.clone());
        let _reader = Effect::new(&lifecycle, move || {
            observed_clone.borrow_mut().push(doubled_clone.get());
        });

        source.set(5);
        source.set(6);
        scheduler.drain();

        // the reader ran once more, after the writer, and saw the final value
        assert_eq!(*observed.borrow(), vec![2, 12]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn effect_that_clamps_its_own_input_keeps_its_dependency() {
        let lifecycle = Lifecycle::root();
        let value = Atom::new(20);
        let (runs, runs_clone) = counter();

        let value_clone = value.clone();
        let effect = Effect::new(&lifecycle, move || {
            runs_clone.set(runs_clone.get() + 1);
            if value_clone.get() > 10 {
                value_clone.set(10);
            }
        });

        // the write re-triggered the first run, which looped once
        assert_eq!((runs.get(), value.get()), (2, 10));
        assert_eq!(value.subscriber_count(), 1);

        value.set(50);
        assert_eq!(value.get(), 10);
        assert_eq!(runs.get(), 4);
        assert_eq!(value.subscriber_count(), 1);
        assert_eq!(effect.dependency_count(), 1);

        value.set(3);
        assert_eq!((runs.get(), value.get()), (5, 3));
    }

    #[test]
    fn self_trigger_on_a_deferred_scheduler_runs_next_tick() {
        let (lifecycle, scheduler) = deferred();
        let value = Atom::new(20);
        let (runs, runs_clone) = counter();

        let value_clone = value.clone();
        let _effect = Effect::new(&lifecycle, move || {
            runs_clone.set(runs_clone.get() + 1);
            if value_clone.get() > 10 {
                value_clone.set(10);
            }
        });
        assert_eq!(runs.get(), 1);
        assert_eq!(scheduler.pending(), 1);

        scheduler.drain();
        assert_eq!(runs.get(), 2);
        assert_eq!(value.subscriber_count(), 1);
    }

    #[test]
    fn dropped_atoms_leave_the_dependency_map() {
        let lifecycle = Lifecycle::root();
        let holder = Atom::new(Atom::new(0));
        let seen = Rc::new(Cell::new(-1));

        let (holder_clone, seen_clone) = (holder.clone(), seen.clone());
        let effect = Effect::new(&lifecycle, move || seen_clone.set(holder_clone.get().get()));

        for i in 1..=100 {
            holder.set(Atom::new(i));
        }

        assert_eq!(seen.get(), 100);
        assert_eq!(effect.inner.deps.borrow().len(), 2);
        assert_eq!(effect.dependency_count(), 2);
    }

    #[test]
    fn disposed_effect_does_not_run() {
        let lifecycle = Lifecycle::root();
        let atom = Atom::new(0);
        let (runs, runs_clone) = counter();

        let atom_clone = atom.clone();
        let effect = Effect::new(&lifecycle, move || {
            atom_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(atom.subscriber_count(), 0);

        atom.set(1);
        assert_eq!(runs.get(), 1);
    }
}
