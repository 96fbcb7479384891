//! List Deltas
//!
//! A [`Delta`] describes how a list changed during one mutation or batch.
//!
//! # Record Order
//!
//! Records are sorted by ascending index and can be applied in a single
//! forward pass over the previous contents:
//!
//! - Every index is a position in the *new* list. A `Remove { index }` drops
//!   the old element currently at that position of the partially built list.
//! - Removals come before insertions at the same position, so a consumer
//!   that recycles removed elements sees the donor before the recipient.
//! - `Clear`, if present, is the first record and is only followed by
//!   insertions.
//!
//! # Normalization
//!
//! A batch records its edits against a shadow of the list. Each shadow slot
//! is either an element that existed when the batch started (remembering its
//! old index and whether it was overwritten) or an element inserted during
//! the batch. The finished shadow is walked once, emitting removals for
//! every old index that no longer appears.

use serde::Serialize;

/// One structured change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record<T> {
    /// The element at `index` was replaced in place.
    Change { index: usize, item: T },
    /// `item` was inserted at `index`.
    Insert { index: usize, item: T },
    /// The old element at `index` was removed.
    Remove { index: usize },
    /// Every old element was removed.
    Clear,
}

impl<T> Record<T> {
    /// Position the record applies to. `None` for [`Record::Clear`].
    pub fn index(&self) -> Option<usize> {
        match self {
            Record::Change { index, .. } | Record::Insert { index, .. } | Record::Remove { index } => {
                Some(*index)
            }
            Record::Clear => None,
        }
    }
}

/// Ordered change records produced by one list mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delta<T> {
    records: Vec<Record<T>>,
    length_delta: isize,
}

impl<T> Delta<T> {
    pub fn records(&self) -> &[Record<T>] {
        &self.records
    }

    /// New length minus old length.
    pub fn length_delta(&self) -> isize {
        self.length_delta
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record<T>> {
        self.records.iter()
    }
}

impl<'a, T> IntoIterator for &'a Delta<T> {
    type Item = &'a Record<T>;
    type IntoIter = std::slice::Iter<'a, Record<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Old { index: usize, changed: bool },
    New,
}

/// Accumulates the edits of one batch.
///
/// Callers validate indices before recording; the builder mirrors the
/// list's own `Vec` operations and assumes they succeeded.
#[derive(Debug)]
pub(crate) struct DeltaBuilder {
    old_len: usize,
    cleared: bool,
    shadow: Vec<Slot>,
}

impl DeltaBuilder {
    pub(crate) fn new(old_len: usize) -> Self {
        Self {
            old_len,
            cleared: false,
            shadow: (0..old_len).map(|index| Slot::Old { index, changed: false }).collect(),
        }
    }

    pub(crate) fn set(&mut self, index: usize) {
        if let Some(Slot::Old { changed, .. }) = self.shadow.get_mut(index) {
            *changed = true;
        }
    }

    pub(crate) fn insert(&mut self, index: usize) {
        self.shadow.insert(index, Slot::New);
    }

    pub(crate) fn remove(&mut self, index: usize) {
        self.shadow.remove(index);
    }

    pub(crate) fn clear(&mut self) {
        self.cleared = true;
        self.shadow.clear();
    }

    /// Produce the normalized delta. `items` is the list content after the
    /// batch.
    pub(crate) fn finish<T: Clone>(self, items: &[T]) -> Delta<T> {
        debug_assert_eq!(items.len(), self.shadow.len());
        let length_delta = items.len() as isize - self.old_len as isize;

        if self.cleared {
            let mut records = Vec::with_capacity(items.len() + 1);
            records.push(Record::Clear);
            records.extend(items.iter().enumerate().map(|(index, item)| Record::Insert {
                index,
                item: item.clone(),
            }));
            return Delta { records, length_delta };
        }

        // next surviving old index at or after each shadow position
        let mut next_old = vec![self.old_len; self.shadow.len() + 1];
        for (position, slot) in self.shadow.iter().enumerate().rev() {
            next_old[position] = match slot {
                Slot::Old { index, .. } => *index,
                Slot::New => next_old[position + 1],
            };
        }

        let mut records = Vec::new();
        let mut cursor = 0;
        for (position, slot) in self.shadow.iter().enumerate() {
            while cursor < next_old[position] {
                records.push(Record::Remove { index: position });
                cursor += 1;
            }

            match slot {
                Slot::Old { index, changed } => {
                    cursor = index + 1;
                    if *changed {
                        records.push(Record::Change {
                            index: position,
                            item: items[position].clone(),
                        });
                    }
                }
                Slot::New => records.push(Record::Insert {
                    index: position,
                    item: items[position].clone(),
                }),
            }
        }

        while cursor < self.old_len {
            records.push(Record::Remove { index: self.shadow.len() });
            cursor += 1;
        }

        Delta { records, length_delta }
    }
}
