//! Reactive Runtime
//!
//! The runtime pairs a [`Graph`] with a queue of scheduled effects and decides
//! when they run.
//!
//! # How It Works
//!
//! 1. Effects created through the runtime get a schedule hook that appends
//!    them to an insertion-ordered set. Scheduling an already queued effect
//!    is a no-op.
//!
//! 2. [`Runtime::flush`] takes a snapshot of the queue and runs each entry
//!    in order. An entry is removed from the queue right before it runs, so
//!    an effect that writes one of its own dependencies is queued again
//!    for the next flush instead of looping.
//!
//! 3. [`Runtime::stabilize`] flushes until nothing is queued, giving up
//!    after `max_stabilize_rounds` rounds.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexSet;

use super::effect::{Cleanups, Effect, EffectOptions};
use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::graph::Graph;

type Queue = Rc<RefCell<IndexSet<Effect>>>;

/// A graph plus a FIFO effect scheduler.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use trellis_core::reactive::{Runtime, Signal};
///
/// let rt = Runtime::new();
/// let count = Signal::new(rt.graph(), 1);
/// let total = Rc::new(Cell::new(0));
///
/// let sink = total.clone();
/// rt.effect(move |g, _| {
///     sink.set(sink.get() + count.get(g)?);
///     Ok(())
/// });
///
/// rt.flush().unwrap();
/// count.set(rt.graph(), 10).unwrap();
/// rt.flush().unwrap();
/// assert_eq!(total.get(), 11);
/// ```
pub struct Runtime {
    graph: Graph,
    queue: Queue,
}

impl Runtime {
    /// Create a runtime over an empty graph with default configuration.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create a runtime over an empty graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            graph: Graph::with_config(config),
            queue: Rc::default(),
        }
    }

    /// The graph that signals and memos for this runtime live in.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Create an effect scheduled on this runtime's queue.
    pub fn effect(
        &self,
        body: impl FnMut(&Graph, &mut Cleanups) -> Result<(), GraphError> + 'static,
    ) -> Effect {
        self.effect_with_options(body, EffectOptions::from_config(self.graph.config()))
    }

    /// Create a scheduled effect with explicit options.
    pub fn effect_with_options(
        &self,
        body: impl FnMut(&Graph, &mut Cleanups) -> Result<(), GraphError> + 'static,
        options: EffectOptions,
    ) -> Effect {
        let queue = Rc::clone(&self.queue);
        Effect::with_options(
            &self.graph,
            body,
            move |effect| {
                queue.borrow_mut().insert(effect);
            },
            options,
        )
    }

    /// Run every effect queued at the time of the call.
    ///
    /// Effects queued while flushing wait for the next flush. A failing body
    /// does not stop the batch; the first failure is returned once the batch
    /// is done. On success, returns how many bodies actually executed.
    pub fn flush(&self) -> Result<usize, GraphError> {
        let batch: Vec<Effect> = self.queue.borrow().iter().copied().collect();
        if batch.is_empty() {
            return Ok(0);
        }
        tracing::debug!(pending = batch.len(), "flushing effects");

        let mut ran = 0;
        let mut first_error = None;
        for effect in batch {
            // Destroyed or discarded since the snapshot was taken.
            if !self.queue.borrow_mut().shift_remove(&effect) {
                continue;
            }
            if effect.is_destroyed(&self.graph) {
                continue;
            }

            match effect.run(&self.graph) {
                Ok(true) => ran += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(effect = %effect.id(), error = %err, "effect failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(ran),
        }
    }

    /// Flush repeatedly until no effect is queued.
    ///
    /// Fails with [`GraphError::StabilizeLimit`] when effects keep
    /// rescheduling each other past the configured number of rounds.
    pub fn stabilize(&self) -> Result<usize, GraphError> {
        let limit = self.graph.config().max_stabilize_rounds;
        let mut total = 0;
        for _ in 0..limit {
            if self.is_idle() {
                return Ok(total);
            }
            total += self.flush()?;
        }
        if self.is_idle() {
            return Ok(total);
        }
        tracing::warn!(rounds = limit, pending = self.pending_count(), "effects did not settle");
        Err(GraphError::StabilizeLimit(limit))
    }

    /// Unqueue and destroy an effect.
    pub fn destroy(&self, effect: Effect) -> bool {
        self.queue.borrow_mut().shift_remove(&effect);
        effect.destroy(&self.graph)
    }

    /// Number of effects waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Drop queued runs without executing them. Returns how many were dropped.
    ///
    /// The dropped effects stay alive and are scheduled again by the next
    /// change to one of their dependencies. Effects that have not run yet
    /// keep their place in the queue, since nothing else would schedule them.
    pub fn reset(&self) -> usize {
        let queued: Vec<Effect> = self.queue.borrow_mut().drain(..).collect();
        let mut dropped = 0;
        for effect in queued {
            if self.graph.cancel_reaction(effect.id()) {
                dropped += 1;
            } else if !effect.is_destroyed(&self.graph) {
                self.queue.borrow_mut().insert(effect);
            }
        }
        dropped
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("graph", &self.graph)
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
