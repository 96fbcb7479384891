//! Views
//!
//! A [`View`] is the description a template returns. Mounting a view walks
//! it once, creates nodes through the group's adapter and links the reactive
//! bindings it contains. There is no virtual tree kept around afterwards:
//! reactive text and properties update their node directly when the atom
//! they are bound to notifies.

use std::rc::Rc;

use serde::Serialize;
use tracing::{error, trace};

use super::adapter::{NodeAdapter, PropValue};
use super::group::MountContext;
use crate::error::Result;
use crate::graph::{self, SourceId};
use crate::reactive::{MaybeAtom, Readable};

/// A value that is fixed, or read from a reactive source.
pub enum Binding<V> {
    Static(V),
    Reactive {
        source: SourceId,
        read: Rc<dyn Fn() -> V>,
    },
}

impl<V: 'static> Binding<V> {
    /// Bind to `readable`, converting every value with `map`.
    pub fn reactive<T, R>(readable: R, map: impl Fn(T) -> V + 'static) -> Self
    where
        T: 'static,
        R: Readable<T>,
    {
        let source = readable.source();
        Binding::Reactive {
            source,
            read: Rc::new(move || map(readable.read_untracked())),
        }
    }

    /// Current value, without tracking.
    pub fn current(&self) -> V
    where
        V: Clone,
    {
        match self {
            Binding::Static(value) => value.clone(),
            Binding::Reactive { read, .. } => read(),
        }
    }

    /// Call `apply` on every change of a reactive binding, for as long as the
    /// current lifecycle of `cx` stays mounted.
    fn watch<A: NodeAdapter>(&self, cx: &MountContext<'_, A>, apply: impl Fn(V) + 'static) {
        if let Binding::Reactive { source, read } = self {
            let read = read.clone();
            graph::link(
                cx.lifecycle().scope(),
                *source,
                0,
                graph::callback(move |_, _, _| apply(read())),
            );
        }
    }
}

impl From<MaybeAtom<String>> for Binding<String> {
    fn from(value: MaybeAtom<String>) -> Self {
        match value {
            MaybeAtom::Static(text) => Binding::Static(text),
            MaybeAtom::Atom(atom) => Binding::reactive(atom, std::convert::identity),
        }
    }
}

/// Mount-time behaviour of a custom view.
///
/// Implemented by [`Show`](super::Show) and [`Each`](super::Each); user
/// components usually return a plain [`View`] instead.
pub trait Component<A: NodeAdapter>: 'static {
    fn mount(self: Box<Self>, cx: &MountContext<'_, A>) -> Result<()>;
}

/// What a template renders.
pub enum View<A: NodeAdapter> {
    Empty,
    Text(Binding<String>),
    Element(Element<A>),
    Fragment(Vec<View<A>>),
    Component(Box<dyn Component<A>>),
}

impl<A: NodeAdapter> View<A> {
    /// A text node, reactive if `text` is an atom.
    pub fn text(text: impl Into<MaybeAtom<String>>) -> Self {
        View::Text(text.into().into())
    }

    /// A text node showing the `Display` form of a reactive value.
    pub fn bind_text<T: ToString + 'static>(value: impl Readable<T>) -> Self {
        View::Text(Binding::reactive(value, |value: T| value.to_string()))
    }

    pub fn fragment<V: Into<View<A>>>(views: impl IntoIterator<Item = V>) -> Self {
        View::Fragment(views.into_iter().map(Into::into).collect())
    }

    pub fn component(component: impl Component<A>) -> Self {
        View::Component(Box::new(component))
    }

    /// Create the view's nodes and insert them at the position described by
    /// `cx`.
    pub fn mount(self, cx: &MountContext<'_, A>) -> Result<()> {
        match self {
            View::Empty => Ok(()),
            View::Text(binding) => {
                let adapter = cx.adapter();
                let node = adapter.create_text(&binding.current());

                let (adapter, target) = (adapter.clone(), node.clone());
                binding.watch(cx, move |text: String| adapter.set_text(&target, &text));

                cx.insert(node);
                Ok(())
            }
            View::Element(element) => element.mount(cx),
            View::Fragment(children) => {
                for child in children {
                    child.mount(cx)?;
                }
                Ok(())
            }
            View::Component(component) => component.mount(cx),
        }
    }
}

impl<A: NodeAdapter> From<&str> for View<A> {
    fn from(text: &str) -> Self {
        View::Text(Binding::Static(text.to_owned()))
    }
}

impl<A: NodeAdapter> From<String> for View<A> {
    fn from(text: String) -> Self {
        View::Text(Binding::Static(text))
    }
}

impl<A: NodeAdapter> From<Element<A>> for View<A> {
    fn from(element: Element<A>) -> Self {
        View::Element(element)
    }
}

impl<A: NodeAdapter> From<Vec<View<A>>> for View<A> {
    fn from(children: Vec<View<A>>) -> Self {
        View::Fragment(children)
    }
}

/// A native element with properties and children.
///
/// ```rust
/// use weave_core::reactive::Atom;
/// use weave_core::render::{el, MemoryAdapter, Renderer};
///
/// let renderer = Renderer::new(MemoryAdapter::new());
/// let root = renderer.adapter().root();
/// let done = Atom::new(false);
///
/// let flag = done.clone();
/// renderer
///     .mount(&root, move || {
///         el("li").prop("id", "first").bind("done", flag).child("write docs").into()
///     })
///     .unwrap();
/// assert_eq!(renderer.adapter().render(root), r#"<li done=false id="first">write docs</li>"#);
///
/// done.set(true);
/// assert_eq!(renderer.adapter().render(root), r#"<li done=true id="first">write docs</li>"#);
/// ```
pub struct Element<A: NodeAdapter> {
    tag: String,
    props: Vec<(String, Binding<PropValue>)>,
    children: Vec<View<A>>,
}

impl<A: NodeAdapter> Element<A> {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            props: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set a fixed property.
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.push((key.into(), Binding::Static(value.into())));
        self
    }

    /// Bind a property to a reactive value. The value is serialized to a
    /// [`PropValue`] on every change.
    pub fn bind<T: Serialize + 'static>(mut self, key: impl Into<String>, value: impl Readable<T>) -> Self {
        let key = key.into();
        let name = key.clone();
        let binding = Binding::reactive(value, move |value: T| {
            serde_json::to_value(&value).unwrap_or_else(|err| {
                error!(property = %name, %err, "property value does not serialize");
                PropValue::Null
            })
        });
        self.props.push((key, binding));
        self
    }

    pub fn child(mut self, child: impl Into<View<A>>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<V: Into<View<A>>>(mut self, children: impl IntoIterator<Item = V>) -> Self {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    fn mount(self, cx: &MountContext<'_, A>) -> Result<()> {
        let adapter = cx.adapter();
        let node = adapter.create_native(&self.tag);

        for (key, binding) in self.props {
            adapter.set_property(&node, &key, &binding.current());

            let (adapter, target) = (adapter.clone(), node.clone());
            binding.watch(cx, move |value: PropValue| {
                trace!(property = %key, "reactive property changed");
                adapter.set_property(&target, &key, &value);
            });
        }

        let inner = cx.within(&node);
        for child in self.children {
            child.mount(&inner)?;
        }

        cx.insert(node);
        Ok(())
    }
}

/// Shorthand for [`Element::new`].
pub fn el<A: NodeAdapter>(tag: impl Into<String>) -> Element<A> {
    Element::new(tag)
}
