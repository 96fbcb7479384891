//! Root Renderer
//!
//! A [`Renderer`] owns the adapter, the one [`Scheduler`] of its tree and
//! the root mounting group. Every group split from the root shares that
//! scheduler, so effects anywhere in the tree are batched into the same
//! tick.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use super::adapter::NodeAdapter;
use super::group::MountingGroup;
use super::view::View;
use crate::error::{Error, Result};
use crate::graph::Scheduler;
use crate::reactive::Lifecycle;

/// Renderer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Pass descriptive hints such as `"/Show"` when creating anchors.
    pub debug_anchors: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug_anchors: cfg!(debug_assertions),
        }
    }
}

/// Root of a rendered tree.
pub struct Renderer<A: NodeAdapter> {
    adapter: Rc<A>,
    options: Options,
    scheduler: Rc<Scheduler>,
    root: RefCell<Option<MountingGroup<A>>>,
}

impl<A: NodeAdapter> Renderer<A> {
    pub fn new(adapter: A) -> Self {
        Self::with_options(adapter, Options::default())
    }

    pub fn with_options(adapter: A, options: Options) -> Self {
        let adapter = Rc::new(adapter);
        let host = Rc::downgrade(&adapter);
        let scheduler = Scheduler::new(Rc::new(move |drain: Box<dyn FnOnce()>| {
            if let Some(adapter) = host.upgrade() {
                adapter.tick(drain);
            }
        }));

        Self {
            adapter,
            options,
            scheduler,
            root: RefCell::new(None),
        }
    }

    pub fn adapter(&self) -> &Rc<A> {
        &self.adapter
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    pub fn is_mounted(&self) -> bool {
        self.root.borrow().as_ref().is_some_and(MountingGroup::is_mounted)
    }

    /// Render `component` as the content of `root`.
    ///
    /// Returns [`Error::AlreadyMounted`] if the renderer already shows a
    /// tree; unmount it first.
    pub fn mount(&self, root: &A::Node, component: impl FnOnce() -> View<A>) -> Result<()> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }

        let group = MountingGroup::new(
            Lifecycle::new(self.scheduler.clone()),
            self.adapter.clone(),
            self.options,
        );
        group.mount(|_: &()| component(), &(), root, None)?;

        debug!(?root, "renderer mounted");
        *self.root.borrow_mut() = Some(group);
        Ok(())
    }

    /// Tear the whole tree down and remove its nodes.
    pub fn unmount(&self) {
        let root = self.root.borrow_mut().take();
        if let Some(group) = root {
            group.unmount();
            debug!("renderer unmounted");
        }
    }
}

impl<A: NodeAdapter> Drop for Renderer<A> {
    fn drop(&mut self) {
        self.unmount();
    }
}
