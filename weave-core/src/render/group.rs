//! Mounting Groups
//!
//! A mounting group pairs a [`Lifecycle`] with the nodes rendered while that
//! lifecycle was current. It is the unit that conditional and list
//! components create, move and destroy.
//!
//! # Top-Level Entries
//!
//! A group remembers only its top-level output, in document order. Each
//! entry is either a node the group inserted itself, or a [`NodeSource`]
//! standing in for a nested component whose nodes change over time (the
//! sub-group of a `Show`, the item groups of an `Each`). Nodes nested inside
//! an element are never tracked; they leave together with the element.
//!
//! Unmounting removes the group's own top-level nodes. Nested groups are
//! child lifecycles and remove their nodes as part of the cascade.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::adapter::NodeAdapter;
use super::renderer::Options;
use super::view::View;
use crate::error::{Error, Result};
use crate::reactive::{with_lifecycle, Lifecycle};

/// Something that currently owns a run of nodes in the output tree.
pub trait NodeSource<A: NodeAdapter> {
    /// Append the current nodes, in document order.
    fn collect_nodes(&self, out: &mut Vec<A::Node>);
}

enum Entry<A: NodeAdapter> {
    Node(A::Node),
    Source(Rc<dyn NodeSource<A>>),
}

/// A lifecycle plus the top-level nodes rendered into it.
pub struct MountingGroup<A: NodeAdapter> {
    inner: Rc<GroupInner<A>>,
}

struct GroupInner<A: NodeAdapter> {
    lifecycle: Lifecycle,
    adapter: Rc<A>,
    options: Options,
    top: RefCell<Vec<Entry<A>>>,
    parent: RefCell<Option<A::Node>>,
}

impl<A: NodeAdapter> GroupInner<A> {
    fn remove_nodes(&self) {
        let entries = std::mem::take(&mut *self.top.borrow_mut());
        let parent = self.parent.borrow().clone();
        if let Some(parent) = parent {
            for entry in &entries {
                if let Entry::Node(node) = entry {
                    self.adapter.remove(&parent, node);
                }
            }
        }
        // nested sources may own lifecycles; release them outside the borrow
        drop(entries);
    }
}

impl<A: NodeAdapter> NodeSource<A> for GroupInner<A> {
    fn collect_nodes(&self, out: &mut Vec<A::Node>) {
        for entry in self.top.borrow().iter() {
            match entry {
                Entry::Node(node) => out.push(node.clone()),
                Entry::Source(source) => source.collect_nodes(out),
            }
        }
    }
}

impl<A: NodeAdapter> MountingGroup<A> {
    /// Create a group around an existing lifecycle.
    pub fn new(lifecycle: Lifecycle, adapter: Rc<A>, options: Options) -> Self {
        Self {
            inner: Rc::new(GroupInner {
                lifecycle,
                adapter,
                options,
                top: RefCell::new(Vec::new()),
                parent: RefCell::new(None),
            }),
        }
    }

    /// Create a nested group whose lifecycle is a child of this one.
    pub fn split(&self) -> Self {
        Self::new(
            self.inner.lifecycle.child(),
            self.inner.adapter.clone(),
            self.inner.options,
        )
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    pub fn adapter(&self) -> &Rc<A> {
        &self.inner.adapter
    }

    pub fn options(&self) -> Options {
        self.inner.options
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.lifecycle.is_mounted()
    }

    /// Render `template` with `data` into this group and insert the output
    /// into `parent` before `before`.
    ///
    /// The template runs with the group's lifecycle current and without
    /// dependency tracking. Mount callbacks run once the output is in
    /// place. A failed render is unmounted again before the error is
    /// returned.
    pub fn mount<D: ?Sized>(
        &self,
        template: impl FnOnce(&D) -> View<A>,
        data: &D,
        parent: &A::Node,
        before: Option<&A::Node>,
    ) -> Result<()> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }
        *self.inner.parent.borrow_mut() = Some(parent.clone());

        let weak = Rc::downgrade(&self.inner);
        self.inner.lifecycle.on_unmount(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_nodes();
            }
        });

        let rendered = with_lifecycle(&self.inner.lifecycle, || {
            let cx = MountContext {
                group: self,
                parent,
                before,
                top: true,
            };
            template(data).mount(&cx)
        });
        if let Err(err) = rendered {
            self.inner.lifecycle.notify_unmounted();
            return Err(err);
        }

        self.inner.lifecycle.notify_mounted();
        debug!(scope = ?self.inner.lifecycle.scope(), top = self.inner.top.borrow().len(), "group mounted");
        Ok(())
    }

    /// Tear the group down: unlink its edges, unmount nested groups, run
    /// unmount callbacks and remove its nodes. The group can be mounted
    /// again afterwards.
    pub fn unmount(&self) {
        self.inner.lifecycle.notify_unmounted();
    }

    /// Current top-level nodes, including those of nested components.
    pub fn nodes(&self) -> Vec<A::Node> {
        let mut out = Vec::new();
        self.inner.collect_nodes(&mut out);
        out
    }

    pub fn first_node(&self) -> Option<A::Node> {
        self.nodes().into_iter().next()
    }

    /// Re-insert every node of the group before `before`, keeping their
    /// relative order. Used to relocate a recycled group.
    pub fn move_before(&self, before: Option<&A::Node>) {
        let Some(parent) = self.inner.parent.borrow().clone() else {
            return;
        };
        for node in self.nodes() {
            self.inner.adapter.insert(&node, &parent, before);
        }
    }

    pub(crate) fn as_source(&self) -> Rc<dyn NodeSource<A>> {
        self.inner.clone()
    }

    pub(crate) fn downgrade(&self) -> WeakGroup<A> {
        WeakGroup {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<A: NodeAdapter> Clone for MountingGroup<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: NodeAdapter> std::fmt::Debug for MountingGroup<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountingGroup")
            .field("lifecycle", &self.inner.lifecycle)
            .field("top", &self.inner.top.borrow().len())
            .finish()
    }
}

/// Non-owning group handle.
pub(crate) struct WeakGroup<A: NodeAdapter> {
    inner: Weak<GroupInner<A>>,
}

impl<A: NodeAdapter> WeakGroup<A> {
    pub(crate) fn upgrade(&self) -> Option<MountingGroup<A>> {
        self.inner.upgrade().map(|inner| MountingGroup { inner })
    }
}

/// Render `template` into `group`. See [`MountingGroup::mount`].
pub fn mount<A: NodeAdapter, D: ?Sized>(
    group: &MountingGroup<A>,
    template: impl FnOnce(&D) -> View<A>,
    data: &D,
    parent: &A::Node,
    before: Option<&A::Node>,
) -> Result<()> {
    group.mount(template, data, parent, before)
}

/// Unmount `group`. See [`MountingGroup::unmount`].
pub fn unmount<A: NodeAdapter>(group: &MountingGroup<A>) {
    group.unmount();
}

/// Where a view is being mounted.
///
/// Components receive it to insert their own nodes and to register nested
/// node sources with the enclosing group.
pub struct MountContext<'a, A: NodeAdapter> {
    group: &'a MountingGroup<A>,
    parent: &'a A::Node,
    before: Option<&'a A::Node>,
    /// Whether inserted nodes are top-level entries of `group`.
    top: bool,
}

impl<'a, A: NodeAdapter> MountContext<'a, A> {
    pub fn group(&self) -> &'a MountingGroup<A> {
        self.group
    }

    pub fn adapter(&self) -> &'a Rc<A> {
        &self.group.inner.adapter
    }

    pub fn lifecycle(&self) -> &'a Lifecycle {
        &self.group.inner.lifecycle
    }

    pub fn parent(&self) -> &'a A::Node {
        self.parent
    }

    pub fn before(&self) -> Option<&'a A::Node> {
        self.before
    }

    /// Anchor hint to pass to the adapter, honouring the debug option.
    pub fn anchor_hint(&self, hint: &'static str) -> Option<&'static str> {
        self.group.inner.options.debug_anchors.then_some(hint)
    }

    /// Insert a node at the current position.
    pub fn insert(&self, node: A::Node) {
        self.group.inner.adapter.insert(&node, self.parent, self.before);
        if self.top {
            self.group.inner.top.borrow_mut().push(Entry::Node(node));
        }
    }

    /// Register a nested source of nodes at the current position.
    pub fn attach(&self, source: Rc<dyn NodeSource<A>>) {
        if self.top {
            self.group.inner.top.borrow_mut().push(Entry::Source(source));
        }
    }

    /// Context for the children of `parent`, appended at its end.
    pub fn within<'b>(&'b self, parent: &'b A::Node) -> MountContext<'b, A> {
        MountContext {
            group: self.group,
            parent,
            before: None,
            top: false,
        }
    }
}
