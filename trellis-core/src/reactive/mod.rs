//! Reactive Primitives
//!
//! This module implements the typed layer of the reactive system: signals,
//! memos, and effects. Each is a small `Copy` handle naming a node of a
//! [`Graph`](crate::graph::Graph).
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the running
//! computation records it as a dependency. When the signal's value changes,
//! the live part of the graph downstream is marked stale.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result, or its failure. It
//! re-evaluates only when it is read and one of its dependencies really
//! changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation. It is never run by the graph
//! directly: it is handed to a schedule hook, and the host runs it later.
//! [`Runtime`] is such a host.
//!
//! # Implementation Notes
//!
//! The running computation is tracked in a slot on the graph itself. When a
//! signal or memo is read, the graph attributes the read to whoever occupies
//! the slot. This approach (sometimes called "automatic dependency tracking"
//! or "transparent reactivity") is used by SolidJS, Vue 3, Angular and
//! Leptos.

mod effect;
mod memo;
mod runtime;
mod signal;

pub use effect::{Cleanups, Effect, EffectOptions};
pub use memo::{Memo, MemoOptions, OutcomeKind};
pub use runtime::Runtime;
pub use signal::{Signal, SignalOptions};
