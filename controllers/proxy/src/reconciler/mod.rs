//! Convergence loops for `ProxyConfig` and `Proxy` records.
//!
//! Each pass fetches the record fresh by identity, fetches the objects
//! derived from it, asks the planner for corrective writes and executes
//! them in order. The result is a `ReconcileOutcome` the scheduler glue
//! logs and turns into a requeue decision.
//!
//! - `proxy_config`: ProxyConfig -> ConfigMap + status
//! - `proxy`: Proxy -> Deployment + Service + status

pub mod proxy;
pub mod proxy_config;

use crate::error::ControllerError;
use cluster_store::{ClusterStoreTrait, StoreError};
use std::fmt;
use std::time::Duration;

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Observed state matches the record; `applied` lists the writes this pass issued
    Converged { applied: Vec<&'static str> },
    /// The record no longer exists
    Gone,
    /// Retry the pass after `after`
    Retry { after: Duration, reason: String },
    /// Retrying cannot help until the record changes
    Fatal { reason: String },
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Converged { applied } if applied.is_empty() => write!(f, "converged (no changes)"),
            ReconcileOutcome::Converged { applied } => write!(f, "converged ({})", applied.join(", ")),
            ReconcileOutcome::Gone => write!(f, "record deleted"),
            ReconcileOutcome::Retry { after, reason } => write!(f, "retry in {:?}: {}", after, reason),
            ReconcileOutcome::Fatal { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Reconciles proxy records against the cluster store.
pub struct Reconciler {
    pub(crate) store: Box<dyn ClusterStoreTrait>,
    requeue_interval: Duration,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("requeue_interval", &self.requeue_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler retrying failed passes after `requeue_interval`.
    pub fn new(store: Box<dyn ClusterStoreTrait>, requeue_interval: Duration) -> Self {
        Self { store, requeue_interval }
    }

    /// Backoff applied after a retryable failure
    pub fn requeue_interval(&self) -> Duration {
        self.requeue_interval
    }

    /// Maps a failed pass to its outcome.
    ///
    /// Store failures (including conflicts) are retried after the fixed
    /// interval; a record that cannot be built waits for the next change.
    pub(crate) fn failed(&self, error: ControllerError) -> ReconcileOutcome {
        match error {
            ControllerError::Construction(_) | ControllerError::InvalidConfig(_) => ReconcileOutcome::Fatal {
                reason: error.to_string(),
            },
            ControllerError::Store(_) | ControllerError::Kube(_) | ControllerError::Watch(_) => {
                ReconcileOutcome::Retry {
                    after: self.requeue_interval,
                    reason: error.to_string(),
                }
            }
        }
    }
}

/// Turns a not-found lookup into `None`
pub(crate) fn optional<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
