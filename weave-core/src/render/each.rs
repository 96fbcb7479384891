//! List Rendering
//!
//! [`Each`] renders one mounting group per list item and keeps the groups in
//! step with the list by consuming the [`Delta`] of every mutation, instead
//! of diffing old and new contents.
//!
//! # Binding Strategies
//!
//! How an item reaches its template is decided once per `Each`, by its
//! [`Binder`]:
//!
//! - [`Remount`] hands the template the item itself. A changed item
//!   unmounts its group and renders it again.
//! - [`Proxy<P>`] hands the template a reactive proxy `P` built from the
//!   item. A changed item only updates the proxy, and groups freed by
//!   removals are recycled for insertions in the same delta.
//!
//! # Reconciliation
//!
//! Records are walked once, in ascending index order. Untouched groups
//! between records are carried over as they are. Insertions that could
//! reuse a group freed later in the same delta are parked and resolved in a
//! second pass, once every removal has been seen. Recycled groups keep
//! their nodes and are moved into place. Nodes are always placed before the
//! first following group that has nodes, or before the list's own anchor.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::{debug, error, warn};

use super::adapter::NodeAdapter;
use super::group::{MountContext, MountingGroup, NodeSource, WeakGroup};
use super::view::{Component, View};
use crate::error::Result;
use crate::graph;
use crate::list::{Delta, List, Record};
use crate::reactive::{untrack, Atom, Lifecycle, ProxyAtom};

/// A reactive per-item value that can be re-pointed at another item.
pub trait ItemProxy<T>: 'static {
    fn create(lifecycle: &Lifecycle, item: &T) -> Self;
    fn update(&self, item: &T);
}

impl<T: Clone + 'static> ItemProxy<T> for Atom<T> {
    fn create(_lifecycle: &Lifecycle, item: &T) -> Self {
        Atom::new(item.clone())
    }

    fn update(&self, item: &T) {
        self.set(item.clone());
    }
}

/// For lists of atoms: the proxy mirrors the item's atom and is rebound
/// when the group is reused.
impl<T: Clone + PartialEq + 'static> ItemProxy<Atom<T>> for ProxyAtom<T> {
    fn create(lifecycle: &Lifecycle, item: &Atom<T>) -> Self {
        ProxyAtom::new(lifecycle, item)
    }

    fn update(&self, item: &Atom<T>) {
        self.use_value(item);
    }
}

/// Turns list items into template data.
pub trait Binder<T>: 'static {
    type Data: 'static;

    /// Whether groups freed by removals may be reused for insertions.
    const RECYCLES: bool;

    fn create(lifecycle: &Lifecycle, item: &T) -> Self::Data;

    /// Point existing data at a new item.
    fn update(data: &mut Self::Data, item: &T);
}

/// Pass items to the template as they are; re-render on change.
#[derive(Debug, Clone, Copy, Default)]
pub struct Remount;

impl<T: Clone + 'static> Binder<T> for Remount {
    type Data = T;
    const RECYCLES: bool = false;

    fn create(_lifecycle: &Lifecycle, item: &T) -> T {
        item.clone()
    }

    fn update(data: &mut T, item: &T) {
        data.clone_from(item);
    }
}

/// Pass items to the template through an [`ItemProxy`].
pub struct Proxy<P>(PhantomData<P>);

impl<T, P: ItemProxy<T>> Binder<T> for Proxy<P> {
    type Data = P;
    const RECYCLES: bool = true;

    fn create(lifecycle: &Lifecycle, item: &T) -> P {
        P::create(lifecycle, item)
    }

    fn update(data: &mut P, item: &T) {
        data.update(item);
    }
}

/// Renders a template once per list item.
pub struct Each<A: NodeAdapter, T: 'static, B: Binder<T> = Remount> {
    list: List<T>,
    template: Rc<dyn Fn(&B::Data) -> View<A>>,
    binder: PhantomData<B>,
}

impl<A: NodeAdapter, T: Clone + 'static, B: Binder<T>> Each<A, T, B> {
    pub fn new(list: &List<T>, template: impl Fn(&B::Data) -> View<A> + 'static) -> Self {
        Self {
            list: list.clone(),
            template: Rc::new(template),
            binder: PhantomData,
        }
    }
}

impl<A: NodeAdapter, T: Clone + 'static> Each<A, T, Remount> {
    pub fn remount(list: &List<T>, template: impl Fn(&T) -> View<A> + 'static) -> Self {
        Self::new(list, template)
    }
}

impl<A: NodeAdapter, T: Clone + 'static, P: ItemProxy<T>> Each<A, T, Proxy<P>> {
    pub fn proxied(list: &List<T>, template: impl Fn(&P) -> View<A> + 'static) -> Self {
        Self::new(list, template)
    }
}

impl<A: NodeAdapter, T: Clone + 'static, B: Binder<T>> Component<A> for Each<A, T, B> {
    fn mount(self: Box<Self>, cx: &MountContext<'_, A>) -> Result<()> {
        let Each { list, template, .. } = *self;

        let state = Rc::new(EachState::<A, T, B> {
            owner: cx.group().downgrade(),
            parent: cx.parent().clone(),
            anchor: cx.adapter().create_anchor(cx.anchor_hint("/Each")),
            template,
            items: RefCell::new(Vec::new()),
            queue: RefCell::new(VecDeque::new()),
            reconciling: Cell::new(false),
        });
        cx.attach(state.clone());
        cx.insert(state.anchor.clone());

        let initial = list.to_vec_untracked();
        let items = initial
            .iter()
            .map(|item| state.create_item(cx.group(), item, &state.anchor))
            .collect();
        *state.items.borrow_mut() = items;

        let target = state.clone();
        graph::link(
            cx.lifecycle().scope(),
            list.source(),
            0,
            graph::callback(move |_, _, payload| match payload.downcast_ref::<Delta<T>>() {
                Some(delta) => target.apply(delta.clone()),
                None => warn!("list notification without a delta"),
            }),
        );

        debug!(items = initial.len(), recycles = B::RECYCLES, "list mounted");
        Ok(())
    }
}

impl<A: NodeAdapter, T: Clone + 'static, B: Binder<T>> From<Each<A, T, B>> for View<A> {
    fn from(each: Each<A, T, B>) -> Self {
        View::component(each)
    }
}

/// Render `template` for every item, re-rendering changed items.
pub fn each<A: NodeAdapter, T: Clone + 'static>(
    list: &List<T>,
    template: impl Fn(&T) -> View<A> + 'static,
) -> View<A> {
    Each::remount(list, template).into()
}

/// Render `template` for every item through a proxy `P`, recycling groups.
pub fn each_proxied<A: NodeAdapter, T: Clone + 'static, P: ItemProxy<T>>(
    list: &List<T>,
    template: impl Fn(&P) -> View<A> + 'static,
) -> View<A> {
    Each::proxied(list, template).into()
}

struct Item<A: NodeAdapter, D> {
    group: MountingGroup<A>,
    data: D,
}

/// Mounted state of one `Each`.
struct EachState<A: NodeAdapter, T: 'static, B: Binder<T>> {
    owner: WeakGroup<A>,
    parent: A::Node,
    anchor: A::Node,
    template: Rc<dyn Fn(&B::Data) -> View<A>>,
    items: RefCell<Vec<Item<A, B::Data>>>,

    /// Deltas that arrived while a reconciliation was running.
    queue: RefCell<VecDeque<Delta<T>>>,
    reconciling: Cell<bool>,
}

#[derive(Debug, Default)]
struct Summary {
    created: usize,
    reused: usize,
    deferred: usize,
    unmounted: usize,
}

impl<A: NodeAdapter, T: Clone + 'static, B: Binder<T>> EachState<A, T, B> {
    /// Queue `delta` and reconcile until the queue is empty. A delta caused
    /// by a template mounted during reconciliation is handled afterwards.
    fn apply(&self, delta: Delta<T>) {
        self.queue.borrow_mut().push_back(delta);
        if self.reconciling.replace(true) {
            return;
        }
        let _reset = ClearOnExit(&self.reconciling);

        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(delta) = next else {
                break;
            };
            untrack(|| self.reconcile(&delta));
        }
    }

    fn reconcile(&self, delta: &Delta<T>) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };

        let mut old: Vec<Option<Item<A, B::Data>>> = self.items.take().into_iter().map(Some).collect();
        let mut out: Vec<Option<Item<A, B::Data>>> = Vec::with_capacity(old.len());
        let mut recycled: VecDeque<Item<A, B::Data>> = VecDeque::new();
        let mut pending: Vec<(usize, T)> = Vec::new();
        let mut summary = Summary::default();
        let mut created = 0isize;
        let mut oi = 0;

        for record in delta {
            if let Some(index) = record.index() {
                while out.len() < index && oi < old.len() {
                    out.push(old[oi].take());
                    oi += 1;
                }
            }

            match record {
                Record::Change { index, item } => {
                    let Some(mut entry) = old.get_mut(oi).and_then(Option::take) else {
                        error!(index, "change record past the end of the list");
                        continue;
                    };
                    oi += 1;

                    B::update(&mut entry.data, item);
                    if !B::RECYCLES {
                        entry.group.unmount();
                        let before = self.anchor_in(&old, oi);
                        self.mount_item(&entry.group, &entry.data, &before);
                    }
                    out.push(Some(entry));
                }
                Record::Insert { item, .. } => {
                    if let Some(mut entry) = recycled.pop_front() {
                        B::update(&mut entry.data, item);
                        entry.group.move_before(Some(&self.anchor_in(&old, oi)));
                        out.push(Some(entry));
                        summary.reused += 1;
                    } else if !B::RECYCLES || created < delta.length_delta() {
                        let before = self.anchor_in(&old, oi);
                        out.push(Some(self.create_item(&owner, item, &before)));
                        created += 1;
                        summary.created += 1;
                    } else {
                        // a removal later in this delta may free a group
                        pending.push((out.len(), item.clone()));
                        out.push(None);
                        summary.deferred += 1;
                    }
                }
                Record::Remove { index } => {
                    let Some(entry) = old.get_mut(oi).and_then(Option::take) else {
                        error!(index, "remove record past the end of the list");
                        continue;
                    };
                    oi += 1;
                    self.discard(entry, &mut recycled, &mut summary);
                }
                Record::Clear => {
                    for entry in old.iter_mut().skip(oi).filter_map(Option::take) {
                        self.discard(entry, &mut recycled, &mut summary);
                    }
                    oi = old.len();
                }
            }
        }

        // everything after the last record stays in place
        out.extend(old.iter_mut().skip(oi).map(Option::take));

        for (index, item) in pending {
            let before = self.anchor_in(&out, index + 1);
            let entry = match recycled.pop_front() {
                Some(mut entry) => {
                    B::update(&mut entry.data, &item);
                    entry.group.move_before(Some(&before));
                    summary.reused += 1;
                    entry
                }
                None => {
                    summary.created += 1;
                    self.create_item(&owner, &item, &before)
                }
            };
            out[index] = Some(entry);
        }

        for entry in recycled {
            entry.group.unmount();
            summary.unmounted += 1;
        }

        *self.items.borrow_mut() = out.into_iter().flatten().collect();
        debug!(
            records = delta.records().len(),
            length = self.items.borrow().len(),
            created = summary.created,
            reused = summary.reused,
            deferred = summary.deferred,
            unmounted = summary.unmounted,
            "list reconciled"
        );
    }

    /// Recycle a removed group, or unmount it when recycling is off.
    fn discard(&self, entry: Item<A, B::Data>, recycled: &mut VecDeque<Item<A, B::Data>>, summary: &mut Summary) {
        if B::RECYCLES {
            recycled.push_back(entry);
        } else {
            entry.group.unmount();
            summary.unmounted += 1;
        }
    }

    /// First node of the first group at or after `from` that has nodes, or
    /// the list's anchor.
    fn anchor_in(&self, entries: &[Option<Item<A, B::Data>>], from: usize) -> A::Node {
        entries
            .iter()
            .skip(from)
            .flatten()
            .find_map(|entry| entry.group.first_node())
            .unwrap_or_else(|| self.anchor.clone())
    }

    fn create_item(&self, owner: &MountingGroup<A>, item: &T, before: &A::Node) -> Item<A, B::Data> {
        let group = owner.split();
        let data = B::create(group.lifecycle(), item);
        self.mount_item(&group, &data, before);
        Item { group, data }
    }

    fn mount_item(&self, group: &MountingGroup<A>, data: &B::Data, before: &A::Node) {
        let template = &self.template;
        if let Err(err) = group.mount(|data: &B::Data| template(data), data, &self.parent, Some(before)) {
            error!(%err, "failed to mount list item");
        }
    }
}

impl<A: NodeAdapter, T: 'static, B: Binder<T>> NodeSource<A> for EachState<A, T, B> {
    fn collect_nodes(&self, out: &mut Vec<A::Node>) {
        for item in self.items.borrow().iter() {
            out.extend(item.group.nodes());
        }
    }
}

struct ClearOnExit<'a>(&'a Cell<bool>);

impl Drop for ClearOnExit<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
