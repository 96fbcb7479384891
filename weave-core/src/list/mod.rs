//! Observable Lists
//!
//! A [`List`] is an ordered collection whose mutations are reported as
//! structured [`Delta`]s instead of whole-value replacements. Every mutator
//! call (or every [`List::batch`]) notifies subscribers exactly once, with the
//! delta as the notification payload.
//!
//! Reads through [`List::len`], [`List::get`] and friends are tracked like
//! atom reads, so a plain effect can depend on a list too. Such an effect
//! ignores the payload and simply re-runs.

mod delta;

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::graph::{self, SourceId};
use crate::reactive::ReactiveContext;

pub use delta::{Delta, Record};
use delta::DeltaBuilder;

/// An observable ordered collection.
///
/// # Example
///
/// ```rust
/// use weave_core::list::List;
///
/// let list = List::new(vec!["a", "b", "c"]);
/// list.batch(|tx| {
///     tx.remove(1)?;
///     tx.insert(1, "d")
/// })
/// .unwrap();
///
/// assert_eq!(list.to_vec(), vec!["a", "d", "c"]);
/// ```
pub struct List<T: 'static> {
    inner: Rc<ListInner<T>>,
}

struct ListInner<T> {
    source: SourceId,
    items: RefCell<Vec<T>>,
    batching: Cell<bool>,
}

impl<T> Drop for ListInner<T> {
    fn drop(&mut self) {
        graph::release_source(self.source);
    }
}

impl<T: Clone + 'static> List<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                source: graph::create_source(),
                items: RefCell::new(items),
                batching: Cell::new(false),
            }),
        }
    }

    /// The list's notification source. Subscribers receive a `Delta<T>`
    /// payload.
    pub fn source(&self) -> SourceId {
        self.inner.source
    }

    pub fn len(&self) -> usize {
        ReactiveContext::report_access(self.inner.source);
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        ReactiveContext::report_access(self.inner.source);
        self.inner.items.borrow().get(index).cloned()
    }

    /// Borrow the items. Tracked.
    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        ReactiveContext::report_access(self.inner.source);
        f(&self.inner.items.borrow())
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.with_items(<[T]>::to_vec)
    }

    pub fn to_vec_untracked(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    pub fn push(&self, item: T) -> Result<()> {
        self.batch(|tx| {
            tx.push(item);
            Ok(())
        })
    }

    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.batch(|tx| tx.insert(index, item))
    }

    pub fn remove(&self, index: usize) -> Result<T> {
        self.batch(|tx| tx.remove(index))
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, item: T) -> Result<T> {
        self.batch(|tx| tx.set(index, item))
    }

    pub fn clear(&self) -> Result<()> {
        self.batch(|tx| {
            tx.clear();
            Ok(())
        })
    }

    /// Replace the whole content. Emits a clear followed by insertions.
    pub fn replace(&self, items: Vec<T>) -> Result<()> {
        self.batch(|tx| {
            tx.clear();
            for item in items {
                tx.push(item);
            }
            Ok(())
        })
    }

    /// Apply several mutations and notify once with a single delta.
    ///
    /// Edits applied before `f` returns an error are kept and still
    /// notified. Reading the list itself from inside `f` panics; use the
    /// batch's accessors instead.
    ///
    /// Returns [`Error::NestedBatch`] when called from inside a batch of the
    /// same list.
    pub fn batch<R>(&self, f: impl FnOnce(&mut ListBatch<'_, T>) -> Result<R>) -> Result<R> {
        if self.inner.batching.replace(true) {
            return Err(Error::NestedBatch);
        }
        let guard = BatchGuard(&self.inner.batching);

        let (result, delta) = {
            let mut items = self.inner.items.borrow_mut();
            let mut tx = ListBatch {
                builder: DeltaBuilder::new(items.len()),
                items: &mut items,
            };
            let result = f(&mut tx);
            let ListBatch { builder, items } = tx;
            (result, builder.finish(items))
        };
        drop(guard);

        if !delta.is_empty() {
            trace!(
                source = ?self.inner.source,
                records = delta.records().len(),
                length_delta = delta.length_delta(),
                "list changed"
            );
            graph::notify(self.inner.source, &delta);
        }
        result
    }

    pub fn subscriber_count(&self) -> usize {
        graph::subscriber_count(self.inner.source)
    }
}

impl<T: 'static> Clone for List<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for List<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("List")
            .field("source", &self.inner.source)
            .field("items", &*self.inner.items.borrow())
            .finish()
    }
}

impl<T: Clone + 'static> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Create a list.
pub fn list<T: Clone + 'static>(items: Vec<T>) -> List<T> {
    List::new(items)
}

/// Clears the batching flag even if the batch body panics.
struct BatchGuard<'a>(&'a Cell<bool>);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Mutable view of a list inside [`List::batch`].
pub struct ListBatch<'a, T> {
    items: &'a mut Vec<T>,
    builder: DeltaBuilder,
}

impl<T> ListBatch<'_, T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn push(&mut self, item: T) {
        let index = self.items.len();
        self.items.push(item);
        self.builder.insert(index);
    }

    pub fn insert(&mut self, index: usize, item: T) -> Result<()> {
        let len = self.items.len();
        if index > len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        self.items.insert(index, item);
        self.builder.insert(index);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<T> {
        let len = self.items.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        self.builder.remove(index);
        Ok(self.items.remove(index))
    }

    pub fn set(&mut self, index: usize, item: T) -> Result<T> {
        let len = self.items.len();
        let Some(slot) = self.items.get_mut(index) else {
            return Err(Error::IndexOutOfBounds { index, len });
        };
        self.builder.set(index);
        Ok(std::mem::replace(slot, item))
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.builder.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Lifecycle};
    use std::any::Any;

    /// Record every delta the list emits.
    fn capture(list: &List<char>) -> (Lifecycle, Rc<RefCell<Vec<Delta<char>>>>) {
        let lifecycle = Lifecycle::root();
        let deltas = Rc::new(RefCell::new(Vec::new()));
        let deltas_clone = deltas.clone();
        graph::link(
            lifecycle.scope(),
            list.source(),
            0,
            graph::callback(move |_, _, payload: &dyn Any| {
                if let Some(delta) = payload.downcast_ref::<Delta<char>>() {
                    deltas_clone.borrow_mut().push(delta.clone());
                }
            }),
        );
        (lifecycle, deltas)
    }

    #[test]
    fn each_mutator_emits_one_delta() {
        let list = List::new(vec!['a', 'b']);
        let (_lifecycle, deltas) = capture(&list);

        list.push('c').unwrap();
        list.set(0, 'z').unwrap();
        list.remove(1).unwrap();
        list.clear().unwrap();

        let deltas = deltas.borrow();
        assert_eq!(deltas.len(), 4);
        assert_eq!(deltas[0].records(), &[Record::Insert { index: 2, item: 'c' }]);
        assert_eq!(deltas[1].records(), &[Record::Change { index: 0, item: 'z' }]);
        assert_eq!(deltas[2].records(), &[Record::Remove { index: 1 }]);
        assert_eq!(deltas[3].records(), &[Record::Clear]);
        assert_eq!(deltas[3].length_delta(), -2);
    }

    #[test]
    fn batch_emits_a_single_normalized_delta() {
        let list = List::new(vec!['a', 'b', 'c']);
        let (_lifecycle, deltas) = capture(&list);

        list.batch(|tx| {
            tx.remove(1)?;
            tx.insert(1, 'd')
        })
        .unwrap();

        assert_eq!(list.to_vec(), vec!['a', 'd', 'c']);
        assert_eq!(
            deltas.borrow()[0].records(),
            &[Record::Remove { index: 1 }, Record::Insert { index: 1, item: 'd' }]
        );
    }

    #[test]
    fn out_of_bounds_mutations_fail_without_notifying() {
        let list = List::new(vec!['a']);
        let (_lifecycle, deltas) = capture(&list);

        assert_eq!(list.insert(3, 'x'), Err(Error::IndexOutOfBounds { index: 3, len: 1 }));
        assert_eq!(list.remove(1), Err(Error::IndexOutOfBounds { index: 1, len: 1 }));
        assert_eq!(list.set(5, 'x'), Err(Error::IndexOutOfBounds { index: 5, len: 1 }));
        assert!(deltas.borrow().is_empty());
    }

    #[test]
    fn failed_batch_still_reports_applied_edits() {
        let list = List::new(vec!['a']);
        let (_lifecycle, deltas) = capture(&list);

        let result = list.batch(|tx| {
            tx.push('b');
            tx.remove(9)
        });

        assert!(result.is_err());
        assert_eq!(list.to_vec_untracked(), vec!['a', 'b']);
        assert_eq!(deltas.borrow().len(), 1);
    }

    #[test]
    fn nested_batches_are_rejected() {
        let list = List::new(vec![1]);
        let inner = list.clone();

        let result = list.batch(move |_| inner.batch(|tx| {
            tx.push(2);
            Ok(())
        }));

        assert_eq!(result, Err(Error::NestedBatch));
        // the flag is cleared again afterwards
        list.push(3).unwrap();
        assert_eq!(list.to_vec_untracked(), vec![1, 3]);
    }

    #[test]
    fn effects_track_list_reads() {
        let lifecycle = Lifecycle::root();
        let list: List<i32> = (1..=3).collect();
        let total = Rc::new(Cell::new(0));

        let (list_clone, total_clone) = (list.clone(), total.clone());
        let _effect = Effect::new(&lifecycle, move || {
            total_clone.set(list_clone.with_items(|items| items.iter().sum()));
        });
        assert_eq!(total.get(), 6);

        list.push(4).unwrap();
        assert_eq!(total.get(), 10);
        list.replace(vec![1]).unwrap();
        assert_eq!(total.get(), 1);
    }
}
