//! Update Scheduler
//!
//! The scheduler batches reaction re-runs into ticks.
//!
//! # Algorithm
//!
//! 1. `schedule` appends a job to a FIFO queue.
//! 2. If no drain is armed or running, the host tick primitive is asked to
//!    call `drain` later (e.g. on the next microtask or event-loop turn).
//! 3. `drain` pops jobs in FIFO order until the queue is empty. Jobs
//!    scheduled while draining join the same pass, which gives already
//!    queued updates priority and keeps dependency cycles from recursing
//!    synchronously.
//! 4. A job whose scope was torn down after it was queued is skipped. Scope
//!    teardown never scans the queue.
//!
//! An effect that re-schedules itself on every run never lets the queue
//! empty. That is a non-convergent user program and will hang the drain.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::{with_graph, ScopeId};

/// Host primitive that arranges for the given drain to run later.
pub type Tick = Rc<dyn Fn(Box<dyn FnOnce()>)>;

/// Tick implementation for hosts running on a tokio `LocalSet`.
///
/// # Panics
///
/// Panics when called outside of a `LocalSet` context.
pub fn tokio_tick(drain: Box<dyn FnOnce()>) {
    tokio::task::spawn_local(async move { drain() });
}

/// A unit of work bound to the scope that scheduled it.
pub struct Job {
    scope: ScopeId,
    generation: u64,
    run: Rc<dyn Fn()>,
}

impl Job {
    /// Create a job for `scope`, capturing the scope's current generation.
    pub fn new(scope: ScopeId, run: Rc<dyn Fn()>) -> Self {
        let generation = with_graph(|graph| graph.scope(scope).map(|slot| slot.generation)).unwrap_or(0);
        Self { scope, generation, run }
    }

    /// Whether the scope is still alive and has not been torn down since
    /// the job was created.
    fn is_live(&self) -> bool {
        with_graph(|graph| {
            graph
                .scope(self.scope)
                .is_some_and(|slot| slot.generation == self.generation)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Armed,
    Draining,
}

/// Single-threaded batching queue. Each renderer owns one.
pub struct Scheduler {
    queue: RefCell<VecDeque<Job>>,
    state: Cell<State>,
    tick: Tick,
    this: Weak<Scheduler>,
}

impl Scheduler {
    /// Create a scheduler that arms drains through `tick`.
    pub fn new(tick: Tick) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            queue: RefCell::new(VecDeque::new()),
            state: Cell::new(State::Idle),
            tick,
            this: this.clone(),
        })
    }

    /// Create a scheduler whose tick drains synchronously, inside the
    /// `schedule` call that armed it. Useful for detached lifecycles and
    /// tests.
    pub fn immediate() -> Rc<Self> {
        Self::new(Rc::new(|drain: Box<dyn FnOnce()>| drain()))
    }

    /// Enqueue a job.
    ///
    /// While a drain is running the job joins the current pass; otherwise a
    /// drain is armed through the host tick if one is not already pending.
    pub fn schedule(&self, job: Job) {
        self.queue.borrow_mut().push_back(job);

        if self.state.get() == State::Idle {
            self.state.set(State::Armed);
            trace!("arming scheduler tick");
            let this = self.this.clone();
            (self.tick)(Box::new(move || {
                if let Some(scheduler) = this.upgrade() {
                    scheduler.drain();
                }
            }));
        }
    }

    /// Run queued jobs until the queue is empty.
    ///
    /// Calling `drain` from inside a job is a no-op; the outer pass picks up
    /// whatever was queued.
    pub fn drain(&self) {
        if self.state.get() == State::Draining {
            return;
        }

        let _reset = ResetOnExit(&self.state);
        self.state.set(State::Draining);

        let mut ran = 0usize;
        let mut skipped = 0usize;
        loop {
            let job = self.queue.borrow_mut().pop_front();
            let Some(job) = job else {
                break;
            };

            if job.is_live() {
                (job.run)();
                ran += 1;
            } else {
                skipped += 1;
            }
        }

        trace!(ran, skipped, "scheduler drained");
    }

    /// Whether a drain pass is currently running.
    pub fn is_draining(&self) -> bool {
        self.state.get() == State::Draining
    }

    /// Number of jobs waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state.get())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Puts the scheduler back to idle even if a job panics.
struct ResetOnExit<'a>(&'a Cell<State>);

impl Drop for ResetOnExit<'_> {
    fn drop(&mut self) {
        self.0.set(State::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{create_scope, with_graph};

    /// Tick that stores drains so the test decides when they run.
    fn manual_tick() -> (Rc<RefCell<Vec<Box<dyn FnOnce()>>>>, Tick) {
        let ticks: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
        let ticks_clone = ticks.clone();
        let tick: Tick = Rc::new(move |drain: Box<dyn FnOnce()>| ticks_clone.borrow_mut().push(drain));
        (ticks, tick)
    }

    fn run_ticks(ticks: &Rc<RefCell<Vec<Box<dyn FnOnce()>>>>) {
        let pending: Vec<_> = ticks.borrow_mut().drain(..).collect();
        for drain in pending {
            drain();
        }
    }

    #[test]
    fn schedule_arms_a_single_tick() {
        let (ticks, tick) = manual_tick();
        let scheduler = Scheduler::new(tick);
        let scope = create_scope(None);
        let log = Rc::new(RefCell::new(Vec::new()));

        for value in 0..3 {
            let log = log.clone();
            scheduler.schedule(Job::new(scope, Rc::new(move || log.borrow_mut().push(value))));
        }

        assert_eq!(ticks.borrow().len(), 1);
        assert!(log.borrow().is_empty());

        run_ticks(&ticks);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn jobs_scheduled_during_drain_join_the_same_pass() {
        let (ticks, tick) = manual_tick();
        let scheduler = Scheduler::new(tick);
        let scope = create_scope(None);
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_log = log.clone();
        let inner: Rc<dyn Fn()> = Rc::new(move || inner_log.borrow_mut().push("inner"));

        let outer_log = log.clone();
        let weak = Rc::downgrade(&scheduler);
        scheduler.schedule(Job::new(
            scope,
            Rc::new(move || {
                outer_log.borrow_mut().push("outer");
                if let Some(scheduler) = weak.upgrade() {
                    assert!(scheduler.is_draining());
                    scheduler.schedule(Job::new(scope, inner.clone()));
                }
            }),
        ));

        run_ticks(&ticks);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
        // no second tick was armed
        assert!(ticks.borrow().is_empty());
    }

    #[test]
    fn jobs_of_torn_down_scopes_are_skipped() {
        let (ticks, tick) = manual_tick();
        let scheduler = Scheduler::new(tick);
        let scope = create_scope(None);
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();

        scheduler.schedule(Job::new(scope, Rc::new(move || ran_clone.set(true))));
        with_graph(|graph| {
            if let Some(slot) = graph.scope_mut(scope) {
                slot.generation += 1;
            }
        });

        run_ticks(&ticks);
        assert!(!ran.get());
    }

    #[test]
    fn tokio_tick_drains_on_local_set() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let local = tokio::task::LocalSet::new();
        let scheduler = Scheduler::new(Rc::new(tokio_tick));
        let scope = create_scope(None);
        let ran = Rc::new(Cell::new(false));

        local.block_on(&runtime, async {
            let ran_clone = ran.clone();
            scheduler.schedule(Job::new(scope, Rc::new(move || ran_clone.set(true))));
            assert!(!ran.get());
        });
        // the drain was spawned onto the set; run it to completion
        runtime.block_on(local);
        assert!(ran.get());
    }
}
