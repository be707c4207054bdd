//! Optimistic local state with rollback
//!
//! A dashboard owns [`ViewState`]s holding its in-memory sets (memberships,
//! vote caches, progress boards). Mutations go through [`ViewState::begin`]:
//!
//! 1. apply the optimistic change immediately; the change hands back its
//!    own inverse
//! 2. await the store call
//! 3. [`Transaction::settle`] the result: keep the change, or run the
//!    inverse on failure
//!
//! Rolling back through the inverse only undoes this transaction's change,
//! so another mutation that settled on the same view in the meantime stays.
//!
//! Each transaction captures a lease on the view when it begins. If the view
//! is torn down before the store call returns, the late result is discarded:
//! nothing is applied and nothing is rolled back into a view nobody owns.
//!
//! The lock is never held across an await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::CompetencyError;

/// Shared, tear-down-aware local state for one dashboard instance
#[derive(Debug)]
pub struct ViewState<S> {
    state: Arc<Mutex<S>>,
    live: Arc<AtomicBool>,
}

impl<S> Clone for ViewState<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            live: Arc::clone(&self.live),
        }
    }
}

/// Liveness flag captured when a mutation starts
#[derive(Debug, Clone)]
pub struct ViewLease {
    live: Arc<AtomicBool>,
}

impl ViewLease {
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// How a mutation's result was taken up by its view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T> {
    /// The store accepted the write and the view keeps the change
    Committed(T),
    /// The view was torn down before the result arrived
    Discarded,
}

impl<T> Settled<T> {
    pub fn committed(self) -> Option<T> {
        match self {
            Settled::Committed(value) => Some(value),
            Settled::Discarded => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Settled::Discarded)
    }
}

impl<S: Clone> ViewState<S> {
    pub fn new(initial: S) -> Self {
        Self {
            state: Arc::new(Mutex::new(initial)),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        // A poisoned lock still holds the last written state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the current state
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&*self.lock())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> S {
        self.lock().clone()
    }

    /// Replace the state wholesale (used when reloading from the store)
    pub fn replace(&self, state: S) {
        if self.is_live() {
            *self.lock() = state;
        }
    }

    /// Mark the owning view as gone. In-flight transactions will discard.
    pub fn tear_down(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn lease(&self) -> ViewLease {
        ViewLease {
            live: Arc::clone(&self.live),
        }
    }

    /// Apply an optimistic change. `apply` returns the inverse used on rollback.
    /// A torn-down view is left untouched.
    pub fn begin<U>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut S) -> U,
    ) -> Transaction<'_, S, U>
    where
        U: FnOnce(&mut S),
    {
        let lease = self.lease();
        let undo = if lease.is_live() {
            Some(apply(&mut *self.lock()))
        } else {
            None
        };
        Transaction {
            view: self,
            lease,
            undo,
            operation,
        }
    }
}

/// In-flight optimistic change awaiting its store result
#[must_use = "an optimistic change must be settled with the store result"]
pub struct Transaction<'v, S, U> {
    view: &'v ViewState<S>,
    lease: ViewLease,
    undo: Option<U>,
    operation: &'static str,
}

impl<S: Clone, U: FnOnce(&mut S)> Transaction<'_, S, U> {
    /// Settle with the store result, keeping the optimistic change on success
    pub fn settle<T>(
        self,
        result: Result<T, CompetencyError>,
    ) -> Result<Settled<T>, CompetencyError> {
        self.settle_with(result, |_, _| {})
    }

    /// Settle, letting the committed value reconcile the local state
    pub fn settle_with<T>(
        self,
        result: Result<T, CompetencyError>,
        reconcile: impl FnOnce(&mut S, &T),
    ) -> Result<Settled<T>, CompetencyError> {
        if !self.lease.is_live() {
            debug!(
                operation = self.operation,
                succeeded = result.is_ok(),
                "View torn down before result arrived, discarding"
            );
            return Ok(Settled::Discarded);
        }

        match result {
            Ok(value) => {
                reconcile(&mut *self.view.lock(), &value);
                Ok(Settled::Committed(value))
            }
            Err(e) => {
                if let Some(undo) = self.undo {
                    undo(&mut *self.view.lock());
                }
                warn!(
                    operation = self.operation,
                    error = %e,
                    "Store call failed, rolled back optimistic change"
                );
                Err(e)
            }
        }
    }
}
