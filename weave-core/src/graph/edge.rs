//! Arena Records
//!
//! This module defines the records that live in the dependency arena:
//! edges, the subscriber list heads of sources, and scope slots.

use std::any::Any;
use std::rc::Rc;

use indexmap::IndexSet;
use slotmap::new_key_type;

new_key_type! {
    /// Handle to a dependency edge.
    ///
    /// Keys are generational: once an edge is unlinked its handle never
    /// resolves again, even if the arena slot is reused.
    pub struct EdgeId;

    /// Handle to a notification source (an atom, list or proxy).
    pub struct SourceId;

    /// Handle to a lifecycle scope.
    pub struct ScopeId;
}

/// Callback invoked when an edge's source notifies.
///
/// Receives the edge itself, the tag recorded on the edge and the payload
/// passed to [`notify`](super::notify). Atoms pass `()`, lists pass their
/// [`Delta`](crate::list::Delta).
pub type Callback = Rc<dyn Fn(EdgeId, u64, &dyn Any)>;

/// One-shot mount or unmount callback stored on a scope.
pub type Hook = Box<dyn FnOnce()>;

/// A dependency edge.
///
/// Each edge is a member of two doubly linked lists at once: the subscriber
/// list of its source and the owned-edge list of its scope.
pub(crate) struct Edge {
    pub(crate) source: SourceId,
    pub(crate) scope: ScopeId,

    pub(crate) source_prev: Option<EdgeId>,
    pub(crate) source_next: Option<EdgeId>,

    pub(crate) scope_prev: Option<EdgeId>,
    pub(crate) scope_next: Option<EdgeId>,

    /// Opaque value refreshed by the subscriber (effects store their epoch).
    pub(crate) tag: u64,

    pub(crate) callback: Callback,
}

/// Subscriber list of a source.
#[derive(Debug, Default)]
pub(crate) struct Source {
    pub(crate) head: Option<EdgeId>,
    pub(crate) tail: Option<EdgeId>,
}

/// A lifecycle scope.
pub(crate) struct Scope {
    /// Head of the owned-edge list.
    pub(crate) head: Option<EdgeId>,
    /// Tail of the owned-edge list.
    pub(crate) tail: Option<EdgeId>,

    pub(crate) mounted: bool,

    /// Incremented on every teardown. Scheduled jobs compare against it to
    /// detect that their scope was torn down after they were queued.
    pub(crate) generation: u64,

    pub(crate) parent: Option<ScopeId>,
    pub(crate) children: IndexSet<ScopeId>,

    pub(crate) on_mount: Vec<Hook>,
    pub(crate) on_unmount: Vec<Hook>,
}

impl Scope {
    pub(crate) fn new(parent: Option<ScopeId>) -> Self {
        Self {
            head: None,
            tail: None,
            mounted: false,
            generation: 0,
            parent,
            children: IndexSet::new(),
            on_mount: Vec::new(),
            on_unmount: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("source", &self.source)
            .field("scope", &self.scope)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}
