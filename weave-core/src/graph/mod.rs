//! Dependency Graph
//!
//! This module implements the arena that links notification sources (atoms,
//! lists, proxies) to their subscribers.
//!
//! # Overview
//!
//! The graph is made of three kinds of records, all stored in generational
//! arenas on the current thread:
//!
//! - Sources own a subscriber list.
//! - Scopes (the storage behind a [`Lifecycle`](crate::reactive::Lifecycle))
//!   own a list of the edges they created, plus mount/unmount hooks.
//! - Edges connect exactly one source to exactly one scope. Every edge is a
//!   member of both lists at the same time.
//!
//! # Design Decisions
//!
//! 1. Edges carry four neighbour handles instead of living in per-source
//!    vectors, so any edge can be unlinked in O(1) given only its handle.
//!
//! 2. Tearing down a scope walks the scope's own list, never a source's list.
//!    Unmounting a subtree therefore touches only the edges it owns.
//!
//! 3. Records are removed from the arena as soon as they are unlinked. Their
//!    callbacks are dropped only after the arena borrow is released, because
//!    a callback may own handles whose `Drop` re-enters the graph.

mod edge;
mod scheduler;

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use slotmap::SlotMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{Error, Result};

pub use edge::{Callback, EdgeId, Hook, ScopeId, SourceId};
pub(crate) use edge::{Edge, Scope, Source};
pub use scheduler::{tokio_tick, Job, Scheduler, Tick};

thread_local! {
    static GRAPH: RefCell<Graph> = RefCell::new(Graph::default());
}

/// Run `f` with exclusive access to this thread's graph.
///
/// `f` must not call back into anything that touches the graph.
pub(crate) fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Like [`with_graph`], but returns `None` instead of panicking when the
/// graph is unavailable (thread teardown). Used from `Drop` impls.
pub(crate) fn try_with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> Option<R> {
    GRAPH
        .try_with(|graph| graph.try_borrow_mut().ok().map(|mut graph| f(&mut graph)))
        .ok()
        .flatten()
}

/// Which hook list of a scope to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Mount,
    Unmount,
}

/// The arena itself.
#[derive(Default)]
pub(crate) struct Graph {
    edges: SlotMap<EdgeId, Edge>,
    sources: SlotMap<SourceId, Source>,
    scopes: SlotMap<ScopeId, Scope>,
}

impl Graph {
    fn link(&mut self, scope: ScopeId, source: SourceId, tag: u64, callback: Callback) -> EdgeId {
        let source_tail = self.sources[source].tail;
        let scope_tail = self.scopes[scope].tail;

        let id = self.edges.insert(Edge {
            source,
            scope,
            source_prev: source_tail,
            source_next: None,
            scope_prev: scope_tail,
            scope_next: None,
            tag,
            callback,
        });

        match source_tail {
            Some(tail) => self.edges[tail].source_next = Some(id),
            None => self.sources[source].head = Some(id),
        }
        self.sources[source].tail = Some(id);

        match scope_tail {
            Some(tail) => self.edges[tail].scope_next = Some(id),
            None => self.scopes[scope].head = Some(id),
        }
        self.scopes[scope].tail = Some(id);

        id
    }

    /// Remove an edge from both of its lists and from the arena.
    fn detach(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(id)?;
        self.splice_source(id, &edge);
        self.splice_scope(id, &edge);
        Some(edge)
    }

    fn splice_source(&mut self, id: EdgeId, edge: &Edge) {
        match edge.source_prev.and_then(|prev| self.edges.get_mut(prev)) {
            Some(prev) => prev.source_next = edge.source_next,
            None => {
                if let Some(source) = self.sources.get_mut(edge.source) {
                    if source.head == Some(id) {
                        source.head = edge.source_next;
                    }
                }
            }
        }

        match edge.source_next.and_then(|next| self.edges.get_mut(next)) {
            Some(next) => next.source_prev = edge.source_prev,
            None => {
                if let Some(source) = self.sources.get_mut(edge.source) {
                    if source.tail == Some(id) {
                        source.tail = edge.source_prev;
                    }
                }
            }
        }
    }

    fn splice_scope(&mut self, id: EdgeId, edge: &Edge) {
        match edge.scope_prev.and_then(|prev| self.edges.get_mut(prev)) {
            Some(prev) => prev.scope_next = edge.scope_next,
            None => {
                if let Some(scope) = self.scopes.get_mut(edge.scope) {
                    if scope.head == Some(id) {
                        scope.head = edge.scope_next;
                    }
                }
            }
        }

        match edge.scope_next.and_then(|next| self.edges.get_mut(next)) {
            Some(next) => next.scope_prev = edge.scope_prev,
            None => {
                if let Some(scope) = self.scopes.get_mut(edge.scope) {
                    if scope.tail == Some(id) {
                        scope.tail = edge.scope_prev;
                    }
                }
            }
        }
    }

    /// Unlink every edge a scope owns. The scope's list is dropped wholesale,
    /// so only the source side of each edge needs splicing.
    fn release_owned(&mut self, scope: ScopeId) -> Vec<Edge> {
        let mut cursor = match self.scopes.get_mut(scope) {
            Some(slot) => {
                slot.tail = None;
                slot.head.take()
            }
            None => None,
        };

        let mut released = Vec::new();
        while let Some(id) = cursor {
            let Some(edge) = self.edges.remove(id) else {
                break;
            };
            cursor = edge.scope_next;
            self.splice_source(id, &edge);
            released.push(edge);
        }
        released
    }

    /// Unlink every edge subscribed to a source.
    fn release_subscribers(&mut self, source: SourceId) -> Vec<Edge> {
        let mut cursor = match self.sources.get_mut(source) {
            Some(slot) => {
                slot.tail = None;
                slot.head.take()
            }
            None => None,
        };

        let mut released = Vec::new();
        while let Some(id) = cursor {
            let Some(edge) = self.edges.remove(id) else {
                break;
            };
            cursor = edge.source_next;
            self.splice_scope(id, &edge);
            released.push(edge);
        }
        released
    }

    fn subscribers(&self, source: SourceId) -> SmallVec<[EdgeId; 8]> {
        let mut out = SmallVec::new();
        let mut cursor = self.sources.get(source).and_then(|slot| slot.head);
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.edges.get(id).and_then(|edge| edge.source_next);
        }
        out
    }

    pub(crate) fn scope(&self, scope: ScopeId) -> Option<&Scope> {
        self.scopes.get(scope)
    }

    pub(crate) fn scope_mut(&mut self, scope: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(scope)
    }

    /// Verify that both list memberships of every edge agree.
    #[cfg(test)]
    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        let mut seen = 0;
        for (source_id, source) in &self.sources {
            let mut prev = None;
            let mut cursor = source.head;
            while let Some(id) = cursor {
                let edge = self.edges.get(id).ok_or(format!("dangling edge {id:?} in source"))?;
                if edge.source != source_id {
                    return Err(format!("edge {id:?} listed under a foreign source"));
                }
                if edge.source_prev != prev {
                    return Err(format!("edge {id:?} has a broken source_prev"));
                }
                prev = cursor;
                cursor = edge.source_next;
                seen += 1;
            }
            if source.tail != prev {
                return Err(format!("source {source_id:?} has a stale tail"));
            }
        }
        if seen != self.edges.len() {
            return Err(format!("{} edges, {seen} reachable from sources", self.edges.len()));
        }

        seen = 0;
        for (scope_id, scope) in &self.scopes {
            let mut prev = None;
            let mut cursor = scope.head;
            while let Some(id) = cursor {
                let edge = self.edges.get(id).ok_or(format!("dangling edge {id:?} in scope"))?;
                if edge.scope != scope_id {
                    return Err(format!("edge {id:?} listed under a foreign scope"));
                }
                if edge.scope_prev != prev {
                    return Err(format!("edge {id:?} has a broken scope_prev"));
                }
                prev = cursor;
                cursor = edge.scope_next;
                seen += 1;
            }
            if scope.tail != prev {
                return Err(format!("scope {scope_id:?} has a stale tail"));
            }
        }
        if seen != self.edges.len() {
            return Err(format!("{} edges, {seen} reachable from scopes", self.edges.len()));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Sources and scopes
// ----------------------------------------------------------------------------

/// Allocate a new notification source with an empty subscriber list.
pub fn create_source() -> SourceId {
    with_graph(|graph| graph.sources.insert(Source::default()))
}

/// Unlink all subscribers of a source and free it.
pub fn release_source(source: SourceId) {
    let released = try_with_graph(|graph| {
        let edges = graph.release_subscribers(source);
        graph.sources.remove(source);
        edges
    });
    drop(released);
}

/// Allocate a new scope, registering it as a child of `parent`.
pub fn create_scope(parent: Option<ScopeId>) -> ScopeId {
    with_graph(|graph| {
        let id = graph.scopes.insert(Scope::new(parent));
        if let Some(parent) = parent.and_then(|parent| graph.scopes.get_mut(parent)) {
            parent.children.insert(id);
        }
        id
    })
}

/// Free a scope: unlink its edges, detach it from its parent and orphan its
/// children. Hooks still registered are dropped without running.
pub fn release_scope(scope: ScopeId) {
    let released = try_with_graph(|graph| {
        let edges = graph.release_owned(scope);
        let slot = graph.scopes.remove(scope);
        if let Some(slot) = &slot {
            if let Some(parent) = slot.parent.and_then(|parent| graph.scopes.get_mut(parent)) {
                parent.children.swap_remove(&scope);
            }
            for child in &slot.children {
                if let Some(child) = graph.scopes.get_mut(*child) {
                    child.parent = None;
                }
            }
        }
        (edges, slot)
    });
    drop(released);
}

/// Unlink every edge owned by `scope`, returning how many were removed.
pub fn unlink_scope(scope: ScopeId) -> usize {
    let released = with_graph(|graph| graph.release_owned(scope));
    let count = released.len();
    drop(released);
    if count > 0 {
        trace!(?scope, count, "released scope edges");
    }
    count
}

pub fn push_hook(scope: ScopeId, kind: HookKind, hook: Hook) {
    with_graph(|graph| {
        if let Some(slot) = graph.scopes.get_mut(scope) {
            match kind {
                HookKind::Mount => slot.on_mount.push(hook),
                HookKind::Unmount => slot.on_unmount.push(hook),
            }
        }
    });
}

/// Move the registered hooks out of the scope, leaving the list empty.
pub fn take_hooks(scope: ScopeId, kind: HookKind) -> Vec<Hook> {
    with_graph(|graph| match graph.scopes.get_mut(scope) {
        Some(slot) => match kind {
            HookKind::Mount => std::mem::take(&mut slot.on_mount),
            HookKind::Unmount => std::mem::take(&mut slot.on_unmount),
        },
        None => Vec::new(),
    })
}

pub fn children(scope: ScopeId) -> SmallVec<[ScopeId; 4]> {
    with_graph(|graph| {
        graph
            .scope(scope)
            .map(|slot| slot.children.iter().copied().collect())
            .unwrap_or_default()
    })
}

// ----------------------------------------------------------------------------
// Edges
// ----------------------------------------------------------------------------

/// Box a closure as an edge [`Callback`].
pub fn callback(f: impl Fn(EdgeId, u64, &dyn Any) + 'static) -> Callback {
    Rc::new(f)
}

/// Create an edge from `source` to a subscriber owned by `scope`.
///
/// The edge is appended to both the source's subscriber list and the scope's
/// owned-edge list. O(1).
///
/// # Panics
///
/// Panics if either the scope or the source has been released. Both are
/// owned by live handles, so this only happens on a broken invariant.
pub fn link(scope: ScopeId, source: SourceId, tag: u64, callback: Callback) -> EdgeId {
    let id = with_graph(|graph| graph.link(scope, source, tag, callback));
    trace!(edge = ?id, ?scope, ?source, "linked");
    id
}

/// Remove an edge from both lists it belongs to. O(1).
///
/// Unlinking an edge twice is a usage error and returns [`Error::DeadEdge`].
pub fn unlink(edge: EdgeId) -> Result<()> {
    let removed = with_graph(|graph| graph.detach(edge)).ok_or(Error::DeadEdge(edge))?;
    drop(removed);
    trace!(?edge, "unlinked");
    Ok(())
}

/// Unlink an edge if it is still live. Safe to call from `Drop` impls.
pub fn release_edge(edge: EdgeId) {
    let released = try_with_graph(|graph| graph.detach(edge));
    drop(released);
}

/// Overwrite the tag recorded on a live edge.
pub fn retag(edge: EdgeId, tag: u64) -> Result<()> {
    with_graph(|graph| match graph.edges.get_mut(edge) {
        Some(slot) => {
            slot.tag = tag;
            Ok(())
        }
        None => Err(Error::DeadEdge(edge)),
    })
}

pub fn is_linked(edge: EdgeId) -> bool {
    with_graph(|graph| graph.edges.contains_key(edge))
}

/// Invoke the callback of every edge subscribed to `source`.
///
/// The subscriber list is snapshotted before the first callback runs.
/// Callbacks may link or unlink edges freely: edges linked during the walk
/// are not visited, edges unlinked before they are reached are skipped.
pub fn notify(source: SourceId, payload: &dyn Any) {
    let snapshot = with_graph(|graph| graph.subscribers(source));
    for edge in snapshot {
        let Some((tag, callback)) =
            with_graph(|graph| graph.edges.get(edge).map(|slot| (slot.tag, slot.callback.clone())))
        else {
            continue;
        };
        callback(edge, tag, payload);
    }
}

pub fn subscriber_count(source: SourceId) -> usize {
    with_graph(|graph| graph.subscribers(source).len())
}

/// Number of edges owned by `scope`.
pub fn owned_count(scope: ScopeId) -> usize {
    with_graph(|graph| {
        let mut count = 0;
        let mut cursor = graph.scope(scope).and_then(|slot| slot.head);
        while let Some(id) = cursor {
            count += 1;
            cursor = graph.edges.get(id).and_then(|edge| edge.scope_next);
        }
        count
    })
}

/// Total number of live edges on this thread.
pub fn edge_count() -> usize {
    with_graph(|graph| graph.edges.len())
}

#[cfg(test)]
pub(crate) fn check() -> std::result::Result<(), String> {
    with_graph(|graph| graph.check())
}
