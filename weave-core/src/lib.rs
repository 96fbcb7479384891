//! Weave Core
//!
//! This crate provides the core runtime for the Weave reactive rendering
//! engine. It implements:
//!
//! - Reactive primitives (atoms, effects, lifecycles, proxies)
//! - A dependency graph with O(1) link, unlink and scope teardown
//! - A batching scheduler driven by a host tick
//! - Observable lists that report structured deltas
//! - A renderer that reconciles lists and conditionals against any node tree
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: edge arena, sources, scopes and the scheduler
//! - `reactive`: atoms, effects, lifecycles and dependency tracking
//! - `list`: observable lists and their deltas
//! - `render`: node adapters, mounting groups, views, `Show` and `Each`
//!
//! # Example
//!
//! ```rust
//! use weave_core::list::List;
//! use weave_core::reactive::Atom;
//! use weave_core::render::{each, el, MemoryAdapter, Options, Renderer, View};
//!
//! let renderer = Renderer::with_options(MemoryAdapter::new(), Options { debug_anchors: true });
//! let root = renderer.adapter().root();
//!
//! let title = Atom::new(String::from("Todo"));
//! let items = List::new(vec!["milk", "eggs"]);
//!
//! let (heading, rows) = (title.clone(), items.clone());
//! renderer
//!     .mount(&root, move || {
//!         View::fragment([
//!             View::from(el("h1").child(View::text(heading))),
//!             el("ul").child(each(&rows, |item: &&str| el("li").child(*item).into())).into(),
//!         ])
//!     })
//!     .unwrap();
//!
//! items.push("bread").unwrap();
//! title.set("Shopping".to_owned());
//!
//! assert_eq!(
//!     renderer.adapter().render(root),
//!     "<h1>Shopping</h1><ul><li>milk</li><li>eggs</li><li>bread</li><!--/Each--></ul>"
//! );
//! ```

pub mod error;
pub mod graph;
pub mod list;
pub mod reactive;
pub mod render;

pub use error::{Error, Result};
pub use list::{list, Delta, List, Record};
pub use reactive::{atom, effect, mounted, read, unmounted, update, write, Atom, Effect, Lifecycle};
pub use render::{mount, unmount, MountingGroup, NodeAdapter, Renderer};
