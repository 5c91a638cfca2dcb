//! Controller-specific error types.
//!
//! This module defines error types specific to the proxy controller
//! that are not covered by upstream library errors.

use cluster_store::StoreError;
use kube::Error as KubeError;
use thiserror::Error;

/// A record that cannot be turned into infrastructure objects.
///
/// Retrying does not help; the record has to be corrected.
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// Record lacks metadata.name or metadata.namespace
    #[error("{kind} is missing metadata.{field}")]
    MissingIdentity { kind: &'static str, field: &'static str },

    /// Port outside 1..=65535
    #[error("port {0} is not a valid TCP port")]
    InvalidPort(i32),

    /// Driver version that cannot be safely placed in the bootstrap script
    #[error("MySQL driver version {0:?} is not a valid version string")]
    InvalidDriverVersion(String),

    /// server.yaml rendering failed
    #[error("failed to render server.yaml: {0}")]
    Render(#[from] serde_yaml::Error),
}

/// Errors that can occur in the proxy controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes API error (client setup)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Desired objects could not be derived from the record
    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
