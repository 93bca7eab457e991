//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! reports every read to the graph so that the running memo or effect
//! records it as a dependency.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    graph records an edge from that context to the signal.
//!
//! 2. When a signal is written with a value its equality predicate deems
//!    different, its version and the graph epoch advance and live consumers
//!    are marked stale.
//!
//! 3. Effects downstream are handed to their scheduler. Memos downstream
//!    recompute lazily on their next read.
//!
//! # Handles
//!
//! `Signal<T>` is a `Copy` handle: an id plus a type marker. The value itself
//! lives inside the [`Graph`], so a handle can be captured by any number of
//! closures without reference counting or cycles.

use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::GraphError;
use crate::graph::{Graph, LivenessHook, NodeId, NodeRecord, Version};

/// Equality predicate used to suppress no-op writes.
type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

/// Storage for a signal's value inside the graph.
struct SourceCell<T> {
    value: RefCell<T>,
    equals: Equality<T>,
}

/// Construction options for a [`Signal`].
///
/// # Example
///
/// ```rust
/// use trellis_core::graph::Graph;
/// use trellis_core::reactive::{Signal, SignalOptions};
///
/// let graph = Graph::new();
/// // Compare case-insensitively: "Hi" -> "HI" is not a change.
/// let name = Signal::with_options(
///     &graph,
///     String::from("Hi"),
///     SignalOptions::with_equality(|a: &String, b: &String| a.eq_ignore_ascii_case(b))
///         .label("name"),
/// );
///
/// name.set(&graph, "HI".into()).unwrap();
/// assert_eq!(name.version(&graph), Some(0));
/// ```
pub struct SignalOptions<T> {
    equals: Equality<T>,
    label: Option<String>,
    on_watched: Option<LivenessHook>,
    on_unwatched: Option<LivenessHook>,
}

impl<T: 'static> SignalOptions<T> {
    /// Options using a custom equality predicate.
    pub fn with_equality(equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equals: Box::new(equals),
            label: None,
            on_watched: None,
            on_unwatched: None,
        }
    }

    /// Replace the equality predicate.
    pub fn equals(mut self, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.equals = Box::new(equals);
        self
    }

    /// Debug label shown in snapshots.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Called when the signal gains its first live consumer.
    pub fn on_watched(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_watched = Some(Rc::new(hook));
        self
    }

    /// Called when the signal loses its last live consumer.
    pub fn on_unwatched(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_unwatched = Some(Rc::new(hook));
        self
    }
}

impl<T: PartialEq + 'static> Default for SignalOptions<T> {
    fn default() -> Self {
        Self::with_equality(|a: &T, b: &T| a == b)
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use trellis_core::graph::Graph;
/// use trellis_core::reactive::Signal;
///
/// let graph = Graph::new();
/// let count = Signal::new(&graph, 0);
///
/// // Read the value
/// assert_eq!(count.get(&graph), Ok(0));
///
/// // Update the value (notifies live consumers)
/// count.set(&graph, 5).unwrap();
/// count.update(&graph, |n| n + 1).unwrap();
/// assert_eq!(count.get(&graph), Ok(6));
/// ```
pub struct Signal<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal compared with `PartialEq`.
    pub fn new(graph: &Graph, value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(graph, value, SignalOptions::default())
    }

    /// Create a new signal with explicit options.
    pub fn with_options(graph: &Graph, value: T, options: SignalOptions<T>) -> Self {
        let SignalOptions {
            equals,
            label,
            on_watched,
            on_unwatched,
        } = options;

        let cell: Rc<dyn Any> = Rc::new(SourceCell {
            value: RefCell::new(value),
            equals,
        });
        let record = NodeRecord::source(cell)
            .with_label(label)
            .with_hooks(on_watched, on_unwatched);

        Self {
            id: graph.insert_node(record),
            _marker: PhantomData,
        }
    }

    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn cell(&self, graph: &Graph) -> Result<Rc<SourceCell<T>>, GraphError> {
        graph
            .source_cell(self.id)?
            .downcast::<SourceCell<T>>()
            .map_err(|_| GraphError::UnknownNode(self.id))
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the signal as
    /// a dependency of the running computation.
    pub fn get(&self, graph: &Graph) -> Result<T, GraphError>
    where
        T: Clone,
    {
        self.with(graph, T::clone)
    }

    /// Borrow the current value, tracking the read like [`get`](Self::get).
    ///
    /// Writing this signal from `f` fails with `InvalidWriteToSignal`.
    pub fn with<R>(&self, graph: &Graph, f: impl FnOnce(&T) -> R) -> Result<R, GraphError> {
        let cell = self.cell(graph)?;
        graph.producer_accessed(self.id)?;
        let value = cell.value.borrow();
        Ok(f(&*value))
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self, graph: &Graph) -> Result<T, GraphError>
    where
        T: Clone,
    {
        graph.untracked(|g| self.get(g))
    }

    /// Set a new value.
    ///
    /// A value equal to the current one is ignored. Otherwise the version
    /// advances and live consumers are notified. Fails with
    /// `InvalidWriteToSignal` while the value is borrowed by `with` or `update`.
    pub fn set(&self, graph: &Graph, value: T) -> Result<(), GraphError> {
        graph.ensure_writable(self.id)?;
        let cell = self.cell(graph)?;

        {
            let mut current = self.borrow_for_write(&cell)?;
            if (cell.equals)(&*current, &value) {
                tracing::trace!(node = %self.id, "write ignored, value unchanged");
                return Ok(());
            }
            *current = value;
        }
        graph.source_changed(self.id);
        Ok(())
    }

    /// Update the value using a function of the current one.
    ///
    /// The current value is read without recording a dependency, so an
    /// effect may update a signal it does not otherwise depend on. `f` must
    /// not write this signal itself; such a write fails.
    pub fn update(&self, graph: &Graph, f: impl FnOnce(&T) -> T) -> Result<(), GraphError> {
        graph.ensure_writable(self.id)?;
        let next = {
            let cell = self.cell(graph)?;
            let current = cell.value.borrow();
            f(&*current)
        };
        self.set(graph, next)
    }

    /// Mutate the value in place.
    ///
    /// The equality predicate is bypassed: the signal always counts as changed.
    /// `f` must not read this signal.
    pub fn mutate(&self, graph: &Graph, f: impl FnOnce(&mut T)) -> Result<(), GraphError> {
        graph.ensure_writable(self.id)?;
        let cell = self.cell(graph)?;
        f(&mut *self.borrow_for_write(&cell)?);
        graph.source_changed(self.id);
        Ok(())
    }

    fn borrow_for_write<'c>(&self, cell: &'c SourceCell<T>) -> Result<RefMut<'c, T>, GraphError> {
        cell.value
            .try_borrow_mut()
            .map_err(|_| GraphError::InvalidWriteToSignal(self.id))
    }

    /// Remove the signal from the graph. Returns false if it was already gone.
    ///
    /// Consumers that read it again fail with [`GraphError::UnknownNode`].
    pub fn dispose(&self, graph: &Graph) -> bool {
        graph.remove_node(self.id).is_some()
    }

    /// Current version, or `None` if the signal was disposed.
    pub fn version(&self, graph: &Graph) -> Option<Version> {
        graph.version_of(self.id)
    }

    /// Whether some effect transitively depends on this signal.
    pub fn is_live(&self, graph: &Graph) -> bool {
        graph.is_live(self.id)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> Hash for Signal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("id", &self.id).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
