//! Kubernetes-backed object store
//!
//! Thin wrapper over `kube::Api` that maps API responses onto `StoreError`
//! so callers can tell "absent" apart from "retry later".

use crate::error::StoreError;
use crate::store_trait::ClusterStoreTrait;
use crds::{Proxy, ProxyConfig, ProxyConfigStatus, ProxyStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "shardingsphere-proxy-controller";

/// Merge-patch parameters for status writes, owned by [`FIELD_MANAGER`]
fn status_patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Object store backed by the Kubernetes API server
#[derive(Clone)]
pub struct ClusterStore {
    client: Client,
}

impl std::fmt::Debug for ClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterStore").finish_non_exhaustive()
    }
}

fn object_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{} {}/{}", kind, namespace, name)
}

/// Namespace and name of an object about to be written
fn identity<K: Resource>(kind: &str, obj: &K) -> Result<(String, String), StoreError> {
    let name = obj.meta().name.clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} without metadata.name", kind)))?;
    let namespace = obj.namespace()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} {} without metadata.namespace", kind, name)))?;
    Ok((namespace, name))
}

impl ClusterStore {
    /// Creates a store over an existing kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, kind: &str, namespace: &str, name: &str) -> Result<K, StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(&object_key(kind, namespace, name), e))
    }

    async fn create<K>(&self, kind: &str, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + Serialize + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let (namespace, name) = identity(kind, obj)?;
        debug!(kind, %namespace, %name, "creating object");
        let pp = PostParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
        self.api::<K>(&namespace)
            .create(&pp, obj)
            .await
            .map_err(|e| StoreError::from_kube(&object_key(kind, &namespace, &name), e))
    }

    async fn replace<K>(&self, kind: &str, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + Serialize + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let (namespace, name) = identity(kind, obj)?;
        debug!(kind, %namespace, %name, "replacing object");
        let pp = PostParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
        self.api::<K>(&namespace)
            .replace(&name, &pp, obj)
            .await
            .map_err(|e| StoreError::from_kube(&object_key(kind, &namespace, &name), e))
    }

    async fn patch_status<K, S>(&self, kind: &str, namespace: &str, name: &str, status: &S) -> Result<(), StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
        S: Serialize,
    {
        let status_patch = serde_json::json!({
            "status": serde_json::to_value(status)?
        });
        let pp = status_patch_params();
        self.api::<K>(namespace)
            .patch_status(name, &pp, &Patch::Merge(&status_patch))
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube(&object_key(kind, namespace, name), e))
    }
}

#[async_trait::async_trait]
impl ClusterStoreTrait for ClusterStore {
    async fn get_proxy(&self, namespace: &str, name: &str) -> Result<Proxy, StoreError> {
        self.get("Proxy", namespace, name).await
    }

    async fn update_proxy_status(&self, namespace: &str, name: &str, status: &ProxyStatus) -> Result<(), StoreError> {
        self.patch_status::<Proxy, _>("Proxy", namespace, name, status).await
    }

    async fn get_proxy_config(&self, namespace: &str, name: &str) -> Result<ProxyConfig, StoreError> {
        self.get("ProxyConfig", namespace, name).await
    }

    async fn update_proxy_config_status(&self, namespace: &str, name: &str, status: &ProxyConfigStatus) -> Result<(), StoreError> {
        self.patch_status::<ProxyConfig, _>("ProxyConfig", namespace, name, status).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, StoreError> {
        self.get("ConfigMap", namespace, name).await
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        self.create("ConfigMap", config_map).await
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        self.replace("ConfigMap", config_map).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        self.get("Deployment", namespace, name).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        self.create("Deployment", deployment).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        self.replace("Deployment", deployment).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError> {
        self.get("Service", namespace, name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, StoreError> {
        self.create("Service", service).await
    }

    async fn update_service(&self, service: &Service) -> Result<Service, StoreError> {
        self.replace("Service", service).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_writes_carry_field_manager() {
        let pp = status_patch_params();
        assert_eq!(pp.field_manager.as_deref(), Some(FIELD_MANAGER));
        assert!(!pp.force);
    }
}
