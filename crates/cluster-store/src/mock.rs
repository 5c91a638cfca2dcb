//! Mock ClusterStore for unit testing
//!
//! Stores objects in memory, records every write so tests can assert on the
//! exact calls a reconciliation issued, and can be switched into failure
//! modes to exercise retry paths.

use crate::error::StoreError;
use crate::store_trait::ClusterStoreTrait;
use crds::{Proxy, ProxyConfig, ProxyConfigStatus, ProxyStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{Resource, ResourceExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

type Key = (String, String);

/// Kind of write issued against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    /// Object created
    Create,
    /// Object replaced
    Update,
    /// Status subresource patched
    UpdateStatus,
}

/// A recorded write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite {
    /// Kind of write
    pub op: WriteOp,
    /// Object kind, e.g. "Deployment"
    pub kind: &'static str,
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

/// Mock ClusterStore for testing
///
/// Clones share state, so a test can keep a handle while the reconciler owns another.
#[derive(Clone, Default)]
pub struct MockClusterStore {
    proxies: Arc<Mutex<HashMap<Key, Proxy>>>,
    proxy_configs: Arc<Mutex<HashMap<Key, ProxyConfig>>>,
    config_maps: Arc<Mutex<HashMap<Key, ConfigMap>>>,
    deployments: Arc<Mutex<HashMap<Key, Deployment>>>,
    services: Arc<Mutex<HashMap<Key, Service>>>,
    writes: Arc<Mutex<Vec<StoreWrite>>>,
    // Every call fails with a transient error while set
    unavailable: Arc<Mutex<bool>>,
    // Writes of these kinds fail with a transient error
    failing_kinds: Arc<Mutex<HashSet<&'static str>>>,
    next_resource_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterStore")
            .field("writes", &*lock(&self.writes))
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn key_of<K: Resource>(obj: &K) -> Result<Key, StoreError> {
    let name = obj.meta().name.clone()
        .ok_or_else(|| StoreError::InvalidObject("object without metadata.name".to_string()))?;
    let namespace = obj.namespace()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} without metadata.namespace", name)))?;
    Ok((namespace, name))
}

impl MockClusterStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Proxy record (for test setup)
    pub fn add_proxy(&self, proxy: Proxy) {
        if let Ok(key) = key_of(&proxy) {
            lock(&self.proxies).insert(key, proxy);
        }
    }

    /// Add a ProxyConfig record (for test setup)
    pub fn add_proxy_config(&self, config: ProxyConfig) {
        if let Ok(key) = key_of(&config) {
            lock(&self.proxy_configs).insert(key, config);
        }
    }

    /// Add an existing ConfigMap (for test setup)
    pub fn add_config_map(&self, config_map: ConfigMap) {
        if let Ok(key) = key_of(&config_map) {
            lock(&self.config_maps).insert(key, config_map);
        }
    }

    /// Add an existing Deployment (for test setup)
    pub fn add_deployment(&self, deployment: Deployment) {
        if let Ok(key) = key_of(&deployment) {
            lock(&self.deployments).insert(key, deployment);
        }
    }

    /// Add an existing Service (for test setup)
    pub fn add_service(&self, service: Service) {
        if let Ok(key) = key_of(&service) {
            lock(&self.services).insert(key, service);
        }
    }

    /// Remove a ProxyConfig record, as if it was deleted mid-flight
    pub fn remove_proxy_config(&self, namespace: &str, name: &str) {
        lock(&self.proxy_configs).remove(&(namespace.to_string(), name.to_string()));
    }

    /// Make every call fail with a transient error
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    /// Make writes of `kind` fail with a transient error
    pub fn fail_writes_of(&self, kind: &'static str) {
        lock(&self.failing_kinds).insert(kind);
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        *lock(&self.unavailable) = false;
        lock(&self.failing_kinds).clear();
    }

    /// All writes issued so far, in order
    pub fn writes(&self) -> Vec<StoreWrite> {
        lock(&self.writes).clone()
    }

    /// Writes of a given op and kind
    pub fn count_writes(&self, op: WriteOp, kind: &str) -> usize {
        lock(&self.writes).iter().filter(|w| w.op == op && w.kind == kind).count()
    }

    /// Forget recorded writes (stored objects are kept)
    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }

    /// Stored ConfigMap, if any
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        lock(&self.config_maps).get(&(namespace.to_string(), name.to_string())).cloned()
    }

    /// Stored Deployment, if any
    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        lock(&self.deployments).get(&(namespace.to_string(), name.to_string())).cloned()
    }

    /// Stored Service, if any
    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        lock(&self.services).get(&(namespace.to_string(), name.to_string())).cloned()
    }

    /// Stored Proxy, if any
    pub fn proxy(&self, namespace: &str, name: &str) -> Option<Proxy> {
        lock(&self.proxies).get(&(namespace.to_string(), name.to_string())).cloned()
    }

    /// Stored ProxyConfig, if any
    pub fn proxy_config(&self, namespace: &str, name: &str) -> Option<ProxyConfig> {
        lock(&self.proxy_configs).get(&(namespace.to_string(), name.to_string())).cloned()
    }

    fn check_available(&self, kind: &str, key: &Key) -> Result<(), StoreError> {
        if *lock(&self.unavailable) {
            return Err(StoreError::Transient(format!("{} {}/{}: store unavailable", kind, key.0, key.1)));
        }
        Ok(())
    }

    fn check_writable(&self, kind: &'static str, key: &Key) -> Result<(), StoreError> {
        self.check_available(kind, key)?;
        if lock(&self.failing_kinds).contains(kind) {
            return Err(StoreError::Transient(format!("{} {}/{}: injected write failure", kind, key.0, key.1)));
        }
        Ok(())
    }

    fn record(&self, op: WriteOp, kind: &'static str, key: &Key) {
        lock(&self.writes).push(StoreWrite {
            op,
            kind,
            namespace: key.0.clone(),
            name: key.1.clone(),
        });
    }

    fn bump_resource_version(&self) -> String {
        let mut rv = lock(&self.next_resource_version);
        *rv += 1;
        rv.to_string()
    }

    fn get_from<K: Clone>(&self, map: &Mutex<HashMap<Key, K>>, kind: &str, namespace: &str, name: &str) -> Result<K, StoreError> {
        let key = (namespace.to_string(), name.to_string());
        self.check_available(kind, &key)?;
        lock(map).get(&key).cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {}/{}", kind, namespace, name)))
    }

    fn create_in<K: Resource + Clone>(&self, map: &Mutex<HashMap<Key, K>>, kind: &'static str, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        self.check_writable(kind, &key)?;
        let mut objects = lock(map);
        if objects.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{} {}/{} already exists", kind, key.0, key.1)));
        }
        let mut stored = obj.clone();
        stored.meta_mut().resource_version = Some(self.bump_resource_version());
        objects.insert(key.clone(), stored.clone());
        drop(objects);
        self.record(WriteOp::Create, kind, &key);
        Ok(stored)
    }

    fn update_in<K: Resource + Clone>(&self, map: &Mutex<HashMap<Key, K>>, kind: &'static str, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        self.check_writable(kind, &key)?;
        let mut objects = lock(map);
        let Some(current) = objects.get(&key) else {
            return Err(StoreError::NotFound(format!("{} {}/{}", kind, key.0, key.1)));
        };
        // Optimistic concurrency: a stale resourceVersion loses
        if let Some(rv) = &obj.meta().resource_version {
            if current.meta().resource_version.as_ref() != Some(rv) {
                return Err(StoreError::Conflict(format!("{} {}/{} was modified", kind, key.0, key.1)));
            }
        }
        let mut stored = obj.clone();
        stored.meta_mut().resource_version = Some(self.bump_resource_version());
        objects.insert(key.clone(), stored.clone());
        drop(objects);
        self.record(WriteOp::Update, kind, &key);
        Ok(stored)
    }
}

#[async_trait::async_trait]
impl ClusterStoreTrait for MockClusterStore {
    async fn get_proxy(&self, namespace: &str, name: &str) -> Result<Proxy, StoreError> {
        self.get_from(&self.proxies, "Proxy", namespace, name)
    }

    async fn update_proxy_status(&self, namespace: &str, name: &str, status: &ProxyStatus) -> Result<(), StoreError> {
        let key = (namespace.to_string(), name.to_string());
        self.check_writable("Proxy", &key)?;
        let mut proxies = lock(&self.proxies);
        let proxy = proxies.get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("Proxy {}/{}", namespace, name)))?;
        proxy.status = Some(status.clone());
        drop(proxies);
        self.record(WriteOp::UpdateStatus, "Proxy", &key);
        Ok(())
    }

    async fn get_proxy_config(&self, namespace: &str, name: &str) -> Result<ProxyConfig, StoreError> {
        self.get_from(&self.proxy_configs, "ProxyConfig", namespace, name)
    }

    async fn update_proxy_config_status(&self, namespace: &str, name: &str, status: &ProxyConfigStatus) -> Result<(), StoreError> {
        let key = (namespace.to_string(), name.to_string());
        self.check_writable("ProxyConfig", &key)?;
        let mut configs = lock(&self.proxy_configs);
        let config = configs.get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("ProxyConfig {}/{}", namespace, name)))?;
        config.status = Some(status.clone());
        drop(configs);
        self.record(WriteOp::UpdateStatus, "ProxyConfig", &key);
        Ok(())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, StoreError> {
        self.get_from(&self.config_maps, "ConfigMap", namespace, name)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        self.create_in(&self.config_maps, "ConfigMap", config_map)
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        self.update_in(&self.config_maps, "ConfigMap", config_map)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        self.get_from(&self.deployments, "Deployment", namespace, name)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        self.create_in(&self.deployments, "Deployment", deployment)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        self.update_in(&self.deployments, "Deployment", deployment)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError> {
        self.get_from(&self.services, "Service", namespace, name)
    }

    async fn create_service(&self, service: &Service) -> Result<Service, StoreError> {
        self.create_in(&self.services, "Service", service)
    }

    async fn update_service(&self, service: &Service) -> Result<Service, StoreError> {
        self.update_in(&self.services, "Service", service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MockClusterStore::new();
        store.create_config_map(&config_map("cfg")).await.unwrap();

        let fetched = store.get_config_map("default", "cfg").await.unwrap();
        assert_eq!(fetched.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(store.count_writes(WriteOp::Create, "ConfigMap"), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MockClusterStore::new();
        let err = store.get_config_map("default", "absent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let store = MockClusterStore::new();
        store.create_config_map(&config_map("cfg")).await.unwrap();
        let err = store.create_config_map(&config_map("cfg")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.count_writes(WriteOp::Create, "ConfigMap"), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = MockClusterStore::new();
        let created = store.create_config_map(&config_map("cfg")).await.unwrap();
        store.update_config_map(&created).await.unwrap();

        // `created` still carries the first resourceVersion
        let err = store.update_config_map(&created).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MockClusterStore::new();
        store.fail_writes_of("ConfigMap");
        let err = store.create_config_map(&config_map("cfg")).await.unwrap_err();
        assert!(matches!(err, StoreError::Transient(_)));

        store.heal();
        store.set_unavailable(true);
        let err = store.get_config_map("default", "cfg").await.unwrap_err();
        assert!(matches!(err, StoreError::Transient(_)));
        assert!(store.writes().is_empty());
    }
}
