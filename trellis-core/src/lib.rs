//! Trellis Core
//!
//! This crate provides a fine-grained reactive dependency graph. It
//! implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Automatic dependency tracking with ordered, self-pruning edges
//! - Push-pull change propagation that recomputes only what really changed
//! - A pluggable effect scheduling contract plus a ready-made FIFO runtime
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: the node arena, edges, the active-consumer slot and the
//!   propagation algorithm
//! - `reactive`: typed handles over the graph and the effect runtime
//! - `error`: the error type every fallible operation returns
//! - `config`: tunables loaded from code or JSON
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use trellis_core::reactive::{Memo, Runtime, Signal};
//!
//! let rt = Runtime::new();
//! let graph = rt.graph();
//!
//! // Create a signal
//! let count = Signal::new(graph, 0);
//!
//! // Create a derived value
//! let doubled = Memo::new(graph, move |g| Ok(count.get(g)? * 2));
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let sink = log.clone();
//! rt.effect(move |g, _| {
//!     sink.borrow_mut().push(format!("{} {}", count.get(g)?, doubled.get(g)?));
//!     Ok(())
//! });
//! rt.flush().unwrap();
//!
//! // Update the signal, then let the runtime run what it scheduled
//! count.set(graph, 5).unwrap();
//! rt.flush().unwrap();
//! assert_eq!(*log.borrow(), vec!["0 0", "5 10"]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::GraphConfig;
pub use error::GraphError;
