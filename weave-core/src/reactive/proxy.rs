//! Proxy Atoms
//!
//! [`MaybeAtom`] is a value that is either fixed or reactive. Templates take
//! `MaybeAtom` wherever a component should accept both.
//!
//! [`ProxyAtom`] is a stable reactive handle whose backing value can be
//! swapped at runtime. Readers subscribe to the proxy, never to whatever it
//! is bound to, so rebinding does not require re-running them. List
//! iteration in proxy mode hands one proxy per item to the template and
//! rebinds it when the slot is reused for a different item.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::atom::Atom;
use super::context::ReactiveContext;
use super::lifecycle::Lifecycle;
use crate::graph::{self, EdgeId, SourceId};

/// A reactive value that can be read without tracking and observed through
/// its notification source. Bindings of rendered output accept any
/// `Readable`.
pub trait Readable<T>: 'static {
    fn source(&self) -> SourceId;
    fn read_untracked(&self) -> T;
}

impl<T: Clone + 'static> Readable<T> for Atom<T> {
    fn source(&self) -> SourceId {
        Atom::source(self)
    }

    fn read_untracked(&self) -> T {
        self.get_untracked()
    }
}

impl<T: Clone + PartialEq + 'static> Readable<T> for ProxyAtom<T> {
    fn source(&self) -> SourceId {
        self.inner.source
    }

    fn read_untracked(&self) -> T {
        self.get_untracked()
    }
}

/// Either a plain value or an atom holding one.
#[derive(Clone)]
pub enum MaybeAtom<T: 'static> {
    Static(T),
    Atom(Atom<T>),
}

impl<T: Clone + 'static> MaybeAtom<T> {
    /// Current value. Tracked when reactive.
    pub fn get(&self) -> T {
        match self {
            MaybeAtom::Static(value) => value.clone(),
            MaybeAtom::Atom(atom) => atom.get(),
        }
    }

    pub fn get_untracked(&self) -> T {
        match self {
            MaybeAtom::Static(value) => value.clone(),
            MaybeAtom::Atom(atom) => atom.get_untracked(),
        }
    }
}

impl<T: 'static> MaybeAtom<T> {
    pub fn is_reactive(&self) -> bool {
        matches!(self, MaybeAtom::Atom(_))
    }

    pub fn as_atom(&self) -> Option<&Atom<T>> {
        match self {
            MaybeAtom::Static(_) => None,
            MaybeAtom::Atom(atom) => Some(atom),
        }
    }
}

impl<T: 'static> From<T> for MaybeAtom<T> {
    fn from(value: T) -> Self {
        MaybeAtom::Static(value)
    }
}

impl<T: 'static> From<Atom<T>> for MaybeAtom<T> {
    fn from(atom: Atom<T>) -> Self {
        MaybeAtom::Atom(atom)
    }
}

impl<T: 'static> From<&Atom<T>> for MaybeAtom<T> {
    fn from(atom: &Atom<T>) -> Self {
        MaybeAtom::Atom(atom.clone())
    }
}

impl From<&str> for MaybeAtom<String> {
    fn from(value: &str) -> Self {
        MaybeAtom::Static(value.to_owned())
    }
}

impl<T: Debug + 'static> Debug for MaybeAtom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaybeAtom::Static(value) => f.debug_tuple("Static").field(value).finish(),
            MaybeAtom::Atom(atom) => f.debug_tuple("Atom").field(atom).finish(),
        }
    }
}

/// A re-bindable mirror of a [`MaybeAtom`].
///
/// While bound to an atom, the proxy holds one edge on that atom, owned by
/// the proxy's lifecycle. Notifications from the atom are forwarded to the
/// proxy's own subscribers. Unmounting the lifecycle stops the forwarding.
///
/// # Example
///
/// ```rust
/// use weave_core::reactive::{Atom, Lifecycle, ProxyAtom};
///
/// let lifecycle = Lifecycle::root();
/// let first = Atom::new(1);
/// let proxy: ProxyAtom<i32> = ProxyAtom::new(&lifecycle, &first);
/// assert_eq!(proxy.get(), 1);
///
/// proxy.use_value(Atom::new(2));
/// assert_eq!(proxy.get(), 2);
/// ```
pub struct ProxyAtom<T: 'static> {
    inner: Rc<ProxyInner<T>>,
}

struct ProxyInner<T: 'static> {
    source: SourceId,
    lifecycle: Lifecycle,
    binding: RefCell<MaybeAtom<T>>,
    edge: Cell<Option<EdgeId>>,
    this: Weak<ProxyInner<T>>,
}

impl<T: 'static> Drop for ProxyInner<T> {
    fn drop(&mut self) {
        if let Some(edge) = self.edge.take() {
            graph::release_edge(edge);
        }
        graph::release_source(self.source);
    }
}

impl<T: 'static> ProxyInner<T> {
    /// Forward notifications from the bound atom, if any.
    fn bind(&self) {
        let binding = self.binding.borrow();
        let MaybeAtom::Atom(atom) = &*binding else {
            return;
        };

        let this = self.this.clone();
        let edge = graph::link(
            self.lifecycle.scope(),
            atom.source(),
            0,
            graph::callback(move |_, _, _| {
                if let Some(proxy) = this.upgrade() {
                    graph::notify(proxy.source, &());
                }
            }),
        );
        self.edge.set(Some(edge));
    }

    fn unbind(&self) {
        if let Some(edge) = self.edge.take() {
            // already gone if the lifecycle was torn down in between
            if graph::is_linked(edge) {
                let _ = graph::unlink(edge);
            }
        }
    }
}

impl<T: Clone + PartialEq + 'static> ProxyAtom<T> {
    /// Create a proxy owned by `lifecycle`, initially bound to `value`.
    pub fn new(lifecycle: &Lifecycle, value: impl Into<MaybeAtom<T>>) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<ProxyInner<T>>| ProxyInner {
            source: graph::create_source(),
            lifecycle: lifecycle.clone(),
            binding: RefCell::new(value.into()),
            edge: Cell::new(None),
            this: this.clone(),
        });
        inner.bind();
        Self { inner }
    }

    /// Current value of whatever the proxy is bound to. Subscribes the
    /// running effect to the proxy.
    pub fn get(&self) -> T {
        ReactiveContext::report_access(self.inner.source);
        self.get_untracked()
    }

    pub fn get_untracked(&self) -> T {
        self.inner.binding.borrow().get_untracked()
    }

    /// Rebind the proxy. Subscribers are notified only when the visible
    /// value differs from the previous one.
    pub fn use_value(&self, value: impl Into<MaybeAtom<T>>) {
        let previous = self.get_untracked();

        self.inner.unbind();
        *self.inner.binding.borrow_mut() = value.into();
        self.inner.bind();

        if self.get_untracked() != previous {
            trace!(source = ?self.inner.source, "proxy rebound to a new value");
            graph::notify(self.inner.source, &());
        }
    }

    /// Write through to the bound atom, or replace the static value.
    pub fn set(&self, value: T) {
        let target = self.inner.binding.borrow().as_atom().cloned();
        match target {
            Some(atom) => atom.set(value),
            None => {
                *self.inner.binding.borrow_mut() = MaybeAtom::Static(value);
                graph::notify(self.inner.source, &());
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.inner.edge.get().is_some_and(graph::is_linked)
    }

    pub fn subscriber_count(&self) -> usize {
        graph::subscriber_count(self.inner.source)
    }
}

impl<T: 'static> Clone for ProxyAtom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for ProxyAtom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyAtom")
            .field("source", &self.inner.source)
            .field("binding", &*self.inner.binding.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;

    #[test]
    fn maybe_atom_reads_both_shapes() {
        let fixed: MaybeAtom<i32> = 3.into();
        let atom = Atom::new(4);
        let reactive: MaybeAtom<i32> = (&atom).into();

        assert!(!fixed.is_reactive());
        assert!(reactive.is_reactive());
        assert_eq!(fixed.get(), 3);
        assert_eq!(reactive.get(), 4);

        atom.set(5);
        assert_eq!(reactive.get_untracked(), 5);
    }

    #[test]
    fn proxy_forwards_bound_atom_changes() {
        let lifecycle = Lifecycle::root();
        let atom = Atom::new(1);
        let proxy: ProxyAtom<i32> = ProxyAtom::new(&lifecycle, &atom);
        let seen = Rc::new(Cell::new(0));

        let (proxy_clone, seen_clone) = (proxy.clone(), seen.clone());
        let _effect = Effect::new(&lifecycle, move || seen_clone.set(proxy_clone.get()));
        assert_eq!(seen.get(), 1);

        atom.set(2);
        assert_eq!(seen.get(), 2);
        // the effect subscribed to the proxy, not to the atom
        assert_eq!(atom.subscriber_count(), 1);
        assert_eq!(proxy.subscriber_count(), 1);
    }

    #[test]
    fn rebinding_notifies_only_on_change() {
        let lifecycle = Lifecycle::root();
        let first = Atom::new(7);
        let proxy: ProxyAtom<i32> = ProxyAtom::new(&lifecycle, &first);
        let runs = Rc::new(Cell::new(0));

        let (proxy_clone, runs_clone) = (proxy.clone(), runs.clone());
        let _effect = Effect::new(&lifecycle, move || {
            proxy_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        let same = Atom::new(7);
        proxy.use_value(&same);
        assert_eq!(runs.get(), 1);
        assert_eq!(first.subscriber_count(), 0);

        proxy.use_value(8);
        assert_eq!(runs.get(), 2);
        assert!(!proxy.is_bound());

        // the old atom no longer reaches the proxy
        same.set(100);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn set_writes_through() {
        let lifecycle = Lifecycle::root();
        let atom = Atom::new(String::from("a"));
        let proxy: ProxyAtom<String> = ProxyAtom::new(&lifecycle, &atom);

        proxy.set("b".to_owned());
        assert_eq!(atom.get(), "b");
        assert_eq!(proxy.get(), "b");
    }

    #[test]
    fn unmount_stops_forwarding() {
        let lifecycle = Lifecycle::root();
        let atom = Atom::new(0);
        let proxy: ProxyAtom<i32> = ProxyAtom::new(&lifecycle, &atom);
        assert!(proxy.is_bound());

        lifecycle.notify_unmounted();
        assert!(!proxy.is_bound());
        assert_eq!(atom.subscriber_count(), 0);
    }
}
