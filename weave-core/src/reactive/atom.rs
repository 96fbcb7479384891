//! Atom Implementation
//!
//! An Atom is the fundamental reactive primitive. It holds a value and a
//! subscriber list in the dependency graph.
//!
//! # How Atoms Work
//!
//! 1. When an atom is read inside an effect, the effect creates (or
//!    refreshes) a dependency edge from the atom to itself.
//!
//! 2. When an atom is written, the new value is stored first and then every
//!    subscriber edge is notified. A read right after a write always sees
//!    the new value, even inside an effect and before any tick.
//!
//! 3. Notifications only schedule work; effects re-run on the next drain.
//!
//! # Memory Layout
//!
//! Each atom consists of:
//! - A source handle into the graph (its subscriber list head and tail)
//! - The value, behind a `RefCell`
//!
//! Dropping the last handle unlinks every remaining subscriber edge.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::context::ReactiveContext;
use crate::graph::{self, SourceId};

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust
/// use weave_core::reactive::Atom;
///
/// let count = Atom::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Atom<T: 'static> {
    inner: Rc<AtomInner<T>>,
}

struct AtomInner<T> {
    source: SourceId,
    value: RefCell<T>,
}

impl<T> Drop for AtomInner<T> {
    fn drop(&mut self) {
        graph::release_source(self.source);
    }
}

impl<T: 'static> Atom<T> {
    /// Create a new atom with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(AtomInner {
                source: graph::create_source(),
                value: RefCell::new(value),
            }),
        }
    }

    /// The atom's notification source in the dependency graph.
    pub fn source(&self) -> SourceId {
        self.inner.source
    }

    /// Get the current value.
    ///
    /// If called while an effect runs, the effect subscribes to this atom.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        ReactiveContext::report_access(self.inner.source);
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value. Tracked like [`get`](Self::get).
    ///
    /// Writing to this atom from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        ReactiveContext::report_access(self.inner.source);
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        let previous = self.inner.value.replace(value);
        drop(previous);
        self.notify();
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Notify every subscriber without changing the value.
    pub fn notify(&self) {
        graph::notify(self.inner.source, &());
    }

    /// Get the number of subscriber edges.
    pub fn subscriber_count(&self) -> usize {
        graph::subscriber_count(self.inner.source)
    }

    /// Whether two handles refer to the same atom.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("source", &self.inner.source)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create an atom.
pub fn atom<T: 'static>(initial: T) -> Atom<T> {
    Atom::new(initial)
}

/// Read an atom, subscribing the running effect to it.
pub fn read<T: Clone + 'static>(atom: &Atom<T>) -> T {
    atom.get()
}

/// Write an atom and notify its subscribers.
pub fn write<T: 'static>(atom: &Atom<T>, value: T) {
    atom.set(value);
}

/// Replace an atom's value with a function of the current one.
pub fn update<T: 'static>(atom: &Atom<T>, f: impl FnOnce(&T) -> T) {
    atom.update(f);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Lifecycle;
    use std::cell::Cell;

    #[test]
    fn atom_get_and_set() {
        let atom = Atom::new(0);
        assert_eq!(atom.get(), 0);

        atom.set(42);
        assert_eq!(atom.get(), 42);
    }

    #[test]
    fn atom_update() {
        let atom = Atom::new(10);
        atom.update(|v| v + 5);
        assert_eq!(atom.get(), 15);

        update(&atom, |v| v * 2);
        assert_eq!(read(&atom), 30);
    }

    #[test]
    fn atom_notifies_subscribers() {
        let lifecycle = Lifecycle::root();
        let atom = Atom::new(0);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let callback = graph::callback(move |_, _, _| call_count_clone.set(call_count_clone.get() + 1));
        graph::link(lifecycle.scope(), atom.source(), 0, callback);

        write(&atom, 1);
        assert_eq!(call_count.get(), 1);

        write(&atom, 2);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn dropping_atom_unlinks_subscribers() {
        let lifecycle = Lifecycle::root();
        let atom = Atom::new("a");
        let callback = graph::callback(|_, _, _| {});
        graph::link(lifecycle.scope(), atom.source(), 0, callback);
        assert_eq!(lifecycle.edge_count(), 1);

        drop(atom);
        assert_eq!(lifecycle.edge_count(), 0);
    }

    #[test]
    fn atom_clone_shares_state() {
        let atom1 = Atom::new(0);
        let atom2 = atom1.clone();

        atom1.set(42);
        assert_eq!(atom2.get(), 42);
        assert!(atom1.ptr_eq(&atom2));

        atom2.set(100);
        assert_eq!(atom1.get(), 100);
    }

    #[test]
    fn atom_sources_are_unique() {
        let a1 = Atom::new(0);
        let a2 = Atom::new(0);
        assert_ne!(a1.source(), a2.source());
    }
}
