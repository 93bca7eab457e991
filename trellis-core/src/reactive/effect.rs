//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect is handed to its schedule hook straight away.
//!    Nothing runs until the scheduler calls [`Effect::run`].
//!
//! 2. When any dependency changes, the effect is handed to the hook again,
//!    at most once until it runs.
//!
//! 3. A run first polls the recorded dependencies. If none of them really
//!    changed (a memo recomputed to an equal value, say) the body is
//!    skipped. Otherwise the previous cleanups run and the body executes,
//!    re-recording its dependencies.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are live and get notified
//!   eagerly, which also keeps every memo they read live.
//! - Memos forbid signal writes; effects allow them when created with
//!   [`EffectOptions::allow_signal_writes`].
//!
//! # Cleanup
//!
//! The body receives a [`Cleanups`] registry. Callbacks registered there run
//! in registration order before the next run and when the effect is
//! destroyed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::graph::{Graph, NodeBody, NodeId, NodeRecord, Reaction};

type Body = Box<dyn FnMut(&Graph, &mut Cleanups) -> Result<(), GraphError>>;
type Schedule = Box<dyn Fn(Effect)>;

/// Cleanup callbacks registered by one run of an effect.
#[derive(Default)]
pub struct Cleanups {
    callbacks: Vec<Box<dyn FnOnce()>>,
}

impl Cleanups {
    /// Register `f` to run before the next run, or on destroy.
    pub fn on_cleanup(&mut self, f: impl FnOnce() + 'static) {
        self.callbacks.push(Box::new(f));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    fn run(self) {
        for callback in self.callbacks {
            callback();
        }
    }
}

/// Construction options for an [`Effect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectOptions {
    /// Permit the body to write signals.
    pub allow_signal_writes: bool,
    pub label: Option<String>,
}

impl EffectOptions {
    /// Options carrying the graph-wide defaults.
    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            allow_signal_writes: config.effects_allow_signal_writes,
            label: None,
        }
    }

    pub fn allow_signal_writes(mut self, allow: bool) -> Self {
        self.allow_signal_writes = allow;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct ReactionCell {
    body: RefCell<Body>,
    schedule: Schedule,
    cleanups: RefCell<Cleanups>,
    running: Cell<bool>,
}

/// Clears the running flag on every exit path.
struct RunningFlag<'a>(&'a Cell<bool>);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Reaction for ReactionCell {
    fn schedule(&self, id: NodeId) {
        (self.schedule)(Effect { id });
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }

    fn execute(&self, graph: &Graph) -> Result<(), GraphError> {
        let _running = RunningFlag::raise(&self.running);
        let mut cleanups = Cleanups::default();
        let result = {
            let mut body = self.body.borrow_mut();
            (&mut **body)(graph, &mut cleanups)
        };
        *self.cleanups.borrow_mut() = cleanups;
        result
    }

    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        cleanups.run();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The effect does not run itself: it hands itself to `schedule`, and the
/// host decides when to call [`run`](Self::run). [`Runtime`](super::Runtime)
/// is a ready-made host with a FIFO queue.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use trellis_core::graph::Graph;
/// use trellis_core::reactive::{Effect, Signal};
///
/// let graph = Graph::new();
/// let count = Signal::new(&graph, 0);
/// let queue: Rc<RefCell<Vec<Effect>>> = Rc::default();
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let log = seen.clone();
/// let scheduled = queue.clone();
/// Effect::new(
///     &graph,
///     move |g, _| {
///         log.borrow_mut().push(count.get(g)?);
///         Ok(())
///     },
///     move |effect| scheduled.borrow_mut().push(effect),
/// );
///
/// for effect in queue.borrow_mut().drain(..) {
///     effect.run(&graph).unwrap();
/// }
/// count.set(&graph, 5).unwrap();
/// for effect in queue.borrow_mut().drain(..) {
///     effect.run(&graph).unwrap();
/// }
/// assert_eq!(*seen.borrow(), vec![0, 5]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: NodeId,
}

impl Effect {
    /// Create an effect using the graph's default options.
    pub fn new(
        graph: &Graph,
        body: impl FnMut(&Graph, &mut Cleanups) -> Result<(), GraphError> + 'static,
        schedule: impl Fn(Effect) + 'static,
    ) -> Self {
        Self::with_options(graph, body, schedule, EffectOptions::from_config(graph.config()))
    }

    /// Create an effect with explicit options.
    ///
    /// The effect is scheduled before this returns.
    pub fn with_options(
        graph: &Graph,
        body: impl FnMut(&Graph, &mut Cleanups) -> Result<(), GraphError> + 'static,
        schedule: impl Fn(Effect) + 'static,
        options: EffectOptions,
    ) -> Self {
        let cell: Rc<dyn Reaction> = Rc::new(ReactionCell {
            body: RefCell::new(Box::new(body)),
            schedule: Box::new(schedule),
            cleanups: RefCell::default(),
            running: Cell::new(false),
        });
        let record =
            NodeRecord::reaction(cell, options.allow_signal_writes).with_label(options.label);
        let id = graph.insert_node(record);

        // Effects start dirty.
        graph.notify_reaction(id);
        Self { id }
    }

    /// Get the effect's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Run the effect on behalf of its scheduler.
    ///
    /// Returns `Ok(false)` if the body was skipped because no dependency
    /// really changed. Running an effect from inside its own body fails
    /// with [`GraphError::CycleDetected`].
    pub fn run(&self, graph: &Graph) -> Result<bool, GraphError> {
        graph.run_reaction(self.id)
    }

    /// Detach the effect from the graph and run its pending cleanups.
    ///
    /// Returns false if it was already destroyed.
    pub fn destroy(&self, graph: &Graph) -> bool {
        let Some(record) = graph.remove_node(self.id) else {
            return false;
        };
        if let NodeBody::Reaction(slot) = record.body {
            graph.untracked(|_| slot.cell.run_cleanups());
        }
        true
    }

    /// Whether the effect was handed to its scheduler and has not run since.
    pub fn is_pending(&self, graph: &Graph) -> bool {
        match graph.core().nodes.get(&self.id).map(|record| &record.body) {
            Some(NodeBody::Reaction(slot)) => slot.pending,
            _ => false,
        }
    }

    pub fn is_destroyed(&self, graph: &Graph) -> bool {
        !graph.contains(self.id)
    }

    /// Number of times the body has executed. Zero once destroyed.
    pub fn run_count(&self, graph: &Graph) -> u64 {
        match graph.core().nodes.get(&self.id).map(|record| &record.body) {
            Some(NodeBody::Reaction(slot)) => slot.runs,
            _ => 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
