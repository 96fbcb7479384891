//! In-Memory Adapter
//!
//! A headless [`NodeAdapter`] that keeps its node tree in a vector. Ticks
//! are queued and only run when [`MemoryAdapter::flush`] is called, which
//! makes update timing fully deterministic. Used by tests and for rendering
//! snapshots to strings.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;

use tracing::{trace, warn};

use super::adapter::{NodeAdapter, PropValue};

/// Handle to a node of a [`MemoryAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Anchor(Option<String>),
    Element {
        tag: String,
        props: BTreeMap<String, PropValue>,
    },
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Headless node tree with manually flushed ticks.
#[derive(Default)]
pub struct MemoryAdapter {
    nodes: RefCell<Vec<NodeData>>,
    ticks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    inserts: Cell<usize>,
    removes: Cell<usize>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element to mount into.
    pub fn root(&self) -> NodeId {
        self.create_native("root")
    }

    /// Run queued ticks until none are left. Returns how many ran.
    pub fn flush(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.ticks.borrow_mut().pop_front();
            let Some(drain) = next else {
                break;
            };
            drain();
            ran += 1;
        }
        ran
    }

    pub fn pending_ticks(&self) -> usize {
        self.ticks.borrow().len()
    }

    /// Number of nodes ever created.
    pub fn created(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Number of `insert` calls so far, moves included.
    pub fn inserts(&self) -> usize {
        self.inserts.get()
    }

    pub fn removes(&self) -> usize {
        self.removes.get()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .borrow()
            .get(node.0)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(node.0).and_then(|data| data.parent)
    }

    /// Text content of a text node.
    pub fn text(&self, node: NodeId) -> Option<String> {
        match self.nodes.borrow().get(node.0).map(|data| &data.kind) {
            Some(NodeKind::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn property(&self, node: NodeId, key: &str) -> Option<PropValue> {
        match self.nodes.borrow().get(node.0).map(|data| &data.kind) {
            Some(NodeKind::Element { props, .. }) => props.get(key).cloned(),
            _ => None,
        }
    }

    /// Serialize the children of `node` to a compact markup string.
    ///
    /// Elements render as `<tag key=value>…</tag>` with JSON property
    /// values, text renders verbatim, anchors as `<!--hint-->`.
    pub fn render(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        if let Some(data) = nodes.get(node.0) {
            for child in &data.children {
                render_node(&nodes, *child, &mut out);
            }
        }
        out
    }

    fn push(&self, kind: NodeKind) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(nodes.len() - 1)
    }
}

fn render_node(nodes: &[NodeData], node: NodeId, out: &mut String) {
    let Some(data) = nodes.get(node.0) else {
        return;
    };

    match &data.kind {
        NodeKind::Anchor(hint) => {
            let _ = write!(out, "<!--{}-->", hint.as_deref().unwrap_or_default());
        }
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Element { tag, props } => {
            out.push('<');
            out.push_str(tag);
            for (key, value) in props {
                let _ = write!(out, " {key}={value}");
            }
            out.push('>');
            for child in &data.children {
                render_node(nodes, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

impl NodeAdapter for MemoryAdapter {
    type Node = NodeId;

    fn create_anchor(&self, hint: Option<&str>) -> NodeId {
        self.push(NodeKind::Anchor(hint.map(str::to_owned)))
    }

    fn create_native(&self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_owned(),
            props: BTreeMap::new(),
        })
    }

    fn create_text(&self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_owned()))
    }

    fn set_text(&self, node: &NodeId, text: &str) {
        if let Some(NodeData {
            kind: NodeKind::Text(current),
            ..
        }) = self.nodes.borrow_mut().get_mut(node.0)
        {
            text.clone_into(current);
        }
    }

    fn insert(&self, node: &NodeId, parent: &NodeId, before: Option<&NodeId>) {
        let mut nodes = self.nodes.borrow_mut();

        if let Some(previous) = nodes[node.0].parent.take() {
            nodes[previous.0].children.retain(|child| child != node);
        }

        let siblings = &mut nodes[parent.0].children;
        let position = before
            .and_then(|before| siblings.iter().position(|child| child == before))
            .unwrap_or(siblings.len());
        if before.is_some() && position == siblings.len() {
            warn!(?node, ?parent, ?before, "insertion reference is not a child; appending");
        }
        siblings.insert(position, *node);
        nodes[node.0].parent = Some(*parent);

        self.inserts.set(self.inserts.get() + 1);
        trace!(?node, ?parent, position, "inserted node");
    }

    fn remove(&self, parent: &NodeId, node: &NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        nodes[parent.0].children.retain(|child| child != node);
        if nodes[node.0].parent == Some(*parent) {
            nodes[node.0].parent = None;
        }
        self.removes.set(self.removes.get() + 1);
    }

    fn set_property(&self, node: &NodeId, key: &str, value: &PropValue) {
        if let Some(NodeData {
            kind: NodeKind::Element { props, .. },
            ..
        }) = self.nodes.borrow_mut().get_mut(node.0)
        {
            props.insert(key.to_owned(), value.clone());
        }
    }

    fn tick(&self, drain: Box<dyn FnOnce()>) {
        self.ticks.borrow_mut().push_back(drain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_before_and_move() {
        let adapter = MemoryAdapter::new();
        let root = adapter.root();
        let a = adapter.create_text("a");
        let b = adapter.create_text("b");
        let anchor = adapter.create_anchor(Some("end"));

        adapter.insert(&anchor, &root, None);
        adapter.insert(&a, &root, Some(&anchor));
        adapter.insert(&b, &root, Some(&a));
        assert_eq!(adapter.render(root), "ba<!--end-->");

        // inserting again moves the node
        adapter.insert(&b, &root, Some(&anchor));
        assert_eq!(adapter.render(root), "ab<!--end-->");
        assert_eq!(adapter.children(root).len(), 3);
    }

    #[test]
    fn elements_render_props_and_children() {
        let adapter = MemoryAdapter::new();
        let root = adapter.root();
        let item = adapter.create_native("li");
        let label = adapter.create_text("one");

        adapter.set_property(&item, "id", &json!("x"));
        adapter.set_property(&item, "checked", &json!(true));
        adapter.insert(&label, &item, None);
        adapter.insert(&item, &root, None);

        assert_eq!(adapter.render(root), r#"<li checked=true id="x">one</li>"#);
        assert_eq!(adapter.property(item, "id"), Some(json!("x")));

        adapter.set_text(&label, "two");
        adapter.remove(&root, &item);
        assert_eq!(adapter.render(root), "");
        assert_eq!(adapter.parent(item), None);
        assert_eq!(adapter.text(label).as_deref(), Some("two"));
    }

    #[test]
    fn ticks_wait_for_flush() {
        let adapter = MemoryAdapter::new();
        let hits = std::rc::Rc::new(Cell::new(0));

        for _ in 0..2 {
            let hits = hits.clone();
            adapter.tick(Box::new(move || hits.set(hits.get() + 1)));
        }

        assert_eq!(hits.get(), 0);
        assert_eq!(adapter.pending_ticks(), 2);
        assert_eq!(adapter.flush(), 2);
        assert_eq!(hits.get(), 2);
    }
}
