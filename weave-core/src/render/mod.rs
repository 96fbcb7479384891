//! Rendering
//!
//! Turns templates into nodes of an output tree through a [`NodeAdapter`],
//! and keeps those nodes up to date as atoms and lists change.
//!
//! The unit of rendering is the [`MountingGroup`]: a lifecycle plus the
//! nodes created while it was current. [`Show`] and [`Each`] split nested
//! groups off their enclosing one and mount, move or unmount them as their
//! inputs change.

mod adapter;
mod each;
mod group;
mod memory;
mod renderer;
mod show;
mod view;

pub use adapter::{NodeAdapter, PropValue};
pub use each::{each, each_proxied, Binder, Each, ItemProxy, Proxy, Remount};
pub use group::{mount, unmount, MountContext, MountingGroup, NodeSource};
pub use memory::{MemoryAdapter, NodeId};
pub use renderer::{Options, Renderer};
pub use show::{show, Show};
pub use view::{el, Binding, Component, Element, View};
