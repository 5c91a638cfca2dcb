//! ShardingSphere Proxy CRD Definitions
//!
//! Kubernetes Custom Resource Definitions reconciled by the proxy controller.

pub mod proxy;
pub mod proxy_config;

pub use proxy::*;
pub use proxy_config::*;
