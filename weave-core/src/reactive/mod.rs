//! Reactive Primitives
//!
//! This module implements the reactive system on top of the dependency
//! graph: atoms, effects, lifecycles and proxies.
//!
//! # Concepts
//!
//! ## Atoms
//!
//! An Atom is a container for mutable state. When an atom is read while an
//! effect runs, the effect subscribes to it. When the atom is written, every
//! subscriber is notified.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever an atom
//! it read last time changes. Re-runs are batched by the lifecycle's
//! scheduler.
//!
//! ## Lifecycles
//!
//! A Lifecycle owns the edges and hooks created while it is current.
//! Unmounting it unlinks all of them at once.
//!
//! ## Proxies
//!
//! A ProxyAtom is a stable handle in front of a value that can be swapped
//! out, used to reuse rendered output for a different list item.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local context stack to detect
//! dependencies automatically. When an atom is read, we check whether an
//! effect is running and, if so, report the read to it.

mod atom;
mod context;
mod effect;
mod lifecycle;
mod proxy;

pub use atom::{atom, read, update, write, Atom};
pub use context::{untrack, with_lifecycle, ReactiveContext};
pub use effect::{effect, effect_in, Effect};
pub use lifecycle::{current_lifecycle, mounted, unmounted, IntoTeardown, Lifecycle, Teardown, WeakLifecycle};
pub use proxy::{MaybeAtom, ProxyAtom, Readable};
