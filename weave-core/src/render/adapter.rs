//! Node Adapter
//!
//! The engine never touches an output tree directly. Everything it renders
//! goes through a [`NodeAdapter`]: creating nodes, attaching them to a
//! parent, removing them and setting properties. An adapter also provides
//! the host's tick primitive, which decides when queued effects re-run.

use std::fmt::Debug;

/// Property values passed to [`NodeAdapter::set_property`].
pub type PropValue = serde_json::Value;

/// Capability over an opaque node handle.
///
/// Handles are cheap to clone and compare by identity.
pub trait NodeAdapter: 'static {
    type Node: Clone + PartialEq + Debug + 'static;

    /// Create an invisible placeholder node. `hint` describes its purpose
    /// and is only passed when debug anchors are enabled.
    fn create_anchor(&self, hint: Option<&str>) -> Self::Node;

    /// Create an element node by tag name.
    fn create_native(&self, tag: &str) -> Self::Node;

    fn create_text(&self, text: &str) -> Self::Node;

    fn set_text(&self, node: &Self::Node, text: &str);

    /// Insert `node` into `parent`, before `before` or as the last child.
    ///
    /// Inserting a node that already has a parent moves it.
    fn insert(&self, node: &Self::Node, parent: &Self::Node, before: Option<&Self::Node>);

    fn remove(&self, parent: &Self::Node, node: &Self::Node);

    fn set_property(&self, node: &Self::Node, key: &str, value: &PropValue);

    /// Arrange for `drain` to be called later, e.g. on the next event-loop
    /// turn.
    fn tick(&self, drain: Box<dyn FnOnce()>);
}
