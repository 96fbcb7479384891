//! Conditional rendering.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, error};

use super::adapter::NodeAdapter;
use super::group::MountContext;
use super::view::{Component, View};
use crate::error::Result;
use crate::reactive::{effect_in, MaybeAtom};

/// Renders its template while a condition holds.
///
/// A fixed condition is resolved once, inline, without creating anything
/// extra. A reactive condition renders into a nested group placed before a
/// dedicated anchor node; an effect on the enclosing group mounts and
/// unmounts that group as the condition flips.
pub struct Show<A: NodeAdapter> {
    when: MaybeAtom<bool>,
    template: Rc<dyn Fn() -> View<A>>,
}

impl<A: NodeAdapter> Show<A> {
    pub fn new(when: impl Into<MaybeAtom<bool>>, template: impl Fn() -> View<A> + 'static) -> Self {
        Self {
            when: when.into(),
            template: Rc::new(template),
        }
    }
}

impl<A: NodeAdapter> Component<A> for Show<A> {
    fn mount(self: Box<Self>, cx: &MountContext<'_, A>) -> Result<()> {
        let Show { when, template } = *self;
        let when = match when {
            MaybeAtom::Static(true) => return template().mount(cx),
            MaybeAtom::Static(false) => return Ok(()),
            MaybeAtom::Atom(atom) => atom,
        };

        let sub = cx.group().split();
        let anchor = cx.adapter().create_anchor(cx.anchor_hint("/Show"));
        cx.attach(sub.as_source());
        cx.insert(anchor.clone());

        let parent = cx.parent().clone();
        let shown = Cell::new(false);
        effect_in(cx.lifecycle(), move || {
            let visible = when.get();
            if shown.replace(visible) == visible {
                return;
            }

            if visible {
                let result = sub.mount(|_: &()| template(), &(), &parent, Some(&anchor));
                if let Err(err) = result {
                    error!(%err, "failed to mount conditional content");
                }
            } else {
                sub.unmount();
            }
            debug!(visible, "condition toggled");
        });

        Ok(())
    }
}

impl<A: NodeAdapter> From<Show<A>> for View<A> {
    fn from(show: Show<A>) -> Self {
        View::component(show)
    }
}

/// Render `template` while `when` is true.
pub fn show<A: NodeAdapter>(
    when: impl Into<MaybeAtom<bool>>,
    template: impl Fn() -> View<A> + 'static,
) -> View<A> {
    Show::new(when, template).into()
}
