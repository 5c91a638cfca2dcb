//! ClusterStore trait for mocking
//!
//! This trait abstracts the object repository the controller reads and writes
//! so reconcilers can be exercised without an API server. The kube-backed
//! `ClusterStore` implements it, and tests use `MockClusterStore`.

use crate::error::StoreError;
use crds::{Proxy, ProxyConfig, ProxyConfigStatus, ProxyStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

/// Object repository operations keyed by (kind, namespace, name)
///
/// Every method returns `StoreError::NotFound` for absent objects and
/// `StoreError::Transient` for failures worth retrying.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterStoreTrait: Send + Sync {
    // Records
    async fn get_proxy(&self, namespace: &str, name: &str) -> Result<Proxy, StoreError>;
    async fn update_proxy_status(&self, namespace: &str, name: &str, status: &ProxyStatus) -> Result<(), StoreError>;
    async fn get_proxy_config(&self, namespace: &str, name: &str) -> Result<ProxyConfig, StoreError>;
    async fn update_proxy_config_status(&self, namespace: &str, name: &str, status: &ProxyConfigStatus) -> Result<(), StoreError>;

    // Derived objects
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, StoreError>;
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError>;
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError>;
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError>;
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError>;
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError>;
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError>;
    async fn create_service(&self, service: &Service) -> Result<Service, StoreError>;
    async fn update_service(&self, service: &Service) -> Result<Service, StoreError>;
}
