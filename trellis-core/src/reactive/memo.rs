//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Creating a memo runs nothing. On first access, the memo runs its
//!    computation and caches the outcome.
//!
//! 2. When accessed again, if no dependencies have changed, returns the
//!    cached outcome.
//!
//! 3. When a dependency changes, a live memo is marked `Dirty` (direct
//!    producer) or `Check` (transitive producer). A memo nobody watches is
//!    not marked at all; it notices the new epoch on its next read.
//!
//! 4. On next access, the memo polls its producers in the order it read
//!    them. If one of them really changed, it recomputes. Otherwise it is
//!    marked clean and returns the cache.
//!
//! 5. A recomputation that yields a value equal to the previous one keeps
//!    the old value and does not advance the version, so consumers further
//!    down do not recompute either.
//!
//! # Failures
//!
//! Bodies return `Result`. A failure is cached like a value: every reader
//! gets the same error back until an upstream change causes a successful
//! recomputation.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::GraphError;
use crate::graph::{Derivation, DirtyState, Graph, NodeId, NodeRecord, Version};

type Compute<T> = Box<dyn Fn(&Graph) -> Result<T, GraphError>>;
type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

/// What a memo currently holds.
enum Outcome<T> {
    /// Never computed, or reset by a panicking body.
    Unset,
    /// The body is running.
    Computing,
    Error(GraphError),
    /// Shared so readers can release the cell before using the value.
    Value(Rc<T>),
}

/// Observable summary of a memo's cached outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Unset,
    Computing,
    Error,
    Value,
}

impl<T> Outcome<T> {
    fn kind(&self) -> OutcomeKind {
        match self {
            Self::Unset => OutcomeKind::Unset,
            Self::Computing => OutcomeKind::Computing,
            Self::Error(_) => OutcomeKind::Error,
            Self::Value(_) => OutcomeKind::Value,
        }
    }
}

struct ComputedCell<T> {
    compute: Compute<T>,
    equals: Equality<T>,
    outcome: RefCell<Outcome<T>>,
}

/// Resets the outcome to `Unset` if the body unwinds.
struct UnwindReset<'a, T> {
    outcome: &'a RefCell<Outcome<T>>,
}

impl<T> Drop for UnwindReset<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            if let Ok(mut outcome) = self.outcome.try_borrow_mut() {
                *outcome = Outcome::Unset;
            }
        }
    }
}

impl<T: 'static> Derivation for ComputedCell<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn must_recompute(&self) -> bool {
        matches!(*self.outcome.borrow(), Outcome::Unset | Outcome::Computing)
    }

    fn is_computing(&self) -> bool {
        matches!(*self.outcome.borrow(), Outcome::Computing)
    }

    fn recompute(&self, graph: &Graph) -> bool {
        let previous = self.outcome.replace(Outcome::Computing);
        let next = {
            let _reset = UnwindReset {
                outcome: &self.outcome,
            };
            match (self.compute)(graph) {
                Ok(value) => Outcome::Value(Rc::new(value)),
                Err(err) => Outcome::Error(err),
            }
        };

        let changed = match (&previous, &next) {
            (Outcome::Value(old), Outcome::Value(new)) => !(self.equals)(&**old, &**new),
            (Outcome::Error(old), Outcome::Error(new)) => old != new,
            _ => true,
        };

        // An equal result keeps the old value.
        self.outcome.replace(if changed { next } else { previous });
        changed
    }
}

/// Construction options for a [`Memo`].
pub struct MemoOptions<T> {
    equals: Equality<T>,
    label: Option<String>,
}

impl<T: 'static> MemoOptions<T> {
    /// Options using a custom equality predicate.
    pub fn with_equality(equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equals: Box::new(equals),
            label: None,
        }
    }

    /// Debug label shown in snapshots.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl<T: PartialEq + 'static> Default for MemoOptions<T> {
    fn default() -> Self {
        Self::with_equality(|a: &T, b: &T| a == b)
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use trellis_core::graph::Graph;
/// use trellis_core::reactive::{Memo, Signal};
///
/// let graph = Graph::new();
/// let first = Signal::new(&graph, "John".to_string());
/// let last = Signal::new(&graph, "Doe".to_string());
/// let full = Memo::new(&graph, move |g| {
///     Ok(format!("{} {}", first.get(g)?, last.get(g)?))
/// });
///
/// assert_eq!(full.get(&graph).unwrap(), "John Doe");
/// first.set(&graph, "Bob".into()).unwrap();
/// assert_eq!(full.get(&graph).unwrap(), "Bob Doe");
/// ```
pub struct Memo<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Memo<T> {
    /// Create a new memo compared with `PartialEq`.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new(graph: &Graph, compute: impl Fn(&Graph) -> Result<T, GraphError> + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(graph, compute, MemoOptions::default())
    }

    /// Create a memo whose changes are judged by `equals`.
    pub fn with_equality(
        graph: &Graph,
        compute: impl Fn(&Graph) -> Result<T, GraphError> + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::with_options(graph, compute, MemoOptions::with_equality(equals))
    }

    pub fn with_options(
        graph: &Graph,
        compute: impl Fn(&Graph) -> Result<T, GraphError> + 'static,
        options: MemoOptions<T>,
    ) -> Self {
        let cell: Rc<dyn Derivation> = Rc::new(ComputedCell {
            compute: Box::new(compute),
            equals: options.equals,
            outcome: RefCell::new(Outcome::Unset),
        });
        let record = NodeRecord::computed(cell).with_label(options.label);

        Self {
            id: graph.insert_node(record),
            _marker: PhantomData,
        }
    }

    /// Get the memo's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn downcast(id: NodeId, derivation: &Rc<dyn Derivation>) -> Result<&ComputedCell<T>, GraphError> {
        derivation
            .as_any()
            .downcast_ref::<ComputedCell<T>>()
            .ok_or(GraphError::UnknownNode(id))
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// A cached failure is returned as `Err`. Within a reactive context the
    /// memo is recorded as a dependency, failed or not.
    pub fn get(&self, graph: &Graph) -> Result<T, GraphError>
    where
        T: Clone,
    {
        self.with(graph, T::clone)
    }

    /// Borrow the current value, resolving and tracking like [`get`](Self::get).
    ///
    /// The memo's cell is not borrowed while `f` runs, so `f` may write the
    /// memo's sources and read the memo again.
    pub fn with<R>(&self, graph: &Graph, f: impl FnOnce(&T) -> R) -> Result<R, GraphError> {
        graph.ensure_readable()?;
        let derivation = graph.derivation(self.id)?;
        let cell = Self::downcast(self.id, &derivation)?;

        graph.update_if_necessary(self.id)?;
        graph.producer_accessed(self.id)?;

        let value = match &*cell.outcome.borrow() {
            Outcome::Value(value) => Rc::clone(value),
            Outcome::Error(err) => return Err(err.clone()),
            Outcome::Unset | Outcome::Computing => return Err(GraphError::CycleDetected(self.id)),
        };
        Ok(f(&value))
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self, graph: &Graph) -> Result<T, GraphError>
    where
        T: Clone,
    {
        graph.untracked(|g| self.get(g))
    }

    /// What the memo holds right now, without resolving it.
    pub fn outcome_kind(&self, graph: &Graph) -> Result<OutcomeKind, GraphError> {
        let derivation = graph.derivation(self.id)?;
        let cell = Self::downcast(self.id, &derivation)?;
        let kind = cell.outcome.borrow().kind();
        Ok(kind)
    }

    /// Dirty state, or `None` if the memo was disposed.
    pub fn state(&self, graph: &Graph) -> Option<DirtyState> {
        graph.state_of(self.id)
    }

    /// Current version, or `None` if the memo was disposed.
    pub fn version(&self, graph: &Graph) -> Option<Version> {
        graph.version_of(self.id)
    }

    /// Whether some effect transitively depends on this memo.
    pub fn is_live(&self, graph: &Graph) -> bool {
        graph.is_live(self.id)
    }

    /// Remove the memo from the graph. Returns false if it was already gone.
    pub fn dispose(&self, graph: &Graph) -> bool {
        graph.remove_node(self.id).is_some()
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Memo<T> {}

impl<T> PartialEq for Memo<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Memo<T> {}

impl<T> Hash for Memo<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo").field("id", &self.id).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
