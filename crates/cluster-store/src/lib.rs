//! Cluster object store
//!
//! The object repository the ShardingSphere proxy controller reconciles
//! against: `get`, `create`, `update` and status updates keyed by
//! (kind, namespace, name), with absent objects reported as
//! `StoreError::NotFound` and everything retryable as
//! `StoreError::Transient` or `StoreError::Conflict`.
//!
//! # Example
//!
//! ```no_run
//! use cluster_store::{ClusterStore, ClusterStoreTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = ClusterStore::new(client);
//!
//! match store.get_config_map("default", "sharding-proxy").await {
//!     Ok(cm) => println!("found {:?}", cm.metadata.name),
//!     Err(e) if e.is_not_found() => println!("not created yet"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{ClusterStore, FIELD_MANAGER};
pub use error::StoreError;
pub use store_trait::ClusterStoreTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockClusterStore, StoreWrite, WriteOp};
