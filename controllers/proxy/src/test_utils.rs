//! Test utilities for unit testing builders, planners and reconcilers
//!
//! This module provides helpers for creating test records and a reconciler
//! wired to the in-memory store.

#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use cluster_store::MockClusterStore;
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use serde_json::json;
#[cfg(test)]
use std::time::Duration;

/// Retry interval used by test reconcilers
#[cfg(test)]
pub const TEST_REQUEUE: Duration = Duration::from_secs(10);

/// Helper to create a test Proxy in the "default" namespace.
///
/// Version 5.1.2, one replica, ClusterIP exposure, no driver and no
/// overrides. The referenced ProxyConfig is `<name>-config`.
#[cfg(test)]
pub fn create_test_proxy(name: &str, port: i32) -> Proxy {
    Proxy {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("{}-uid", name)),
            ..Default::default()
        },
        spec: ProxySpec {
            version: "5.1.2".to_string(),
            service_type: ProxyServiceType::default(),
            replicas: 1,
            proxy_config_name: format!("{}-config", name),
            port,
            mysql_driver: None,
            resources: None,
            liveness_probe: None,
            readiness_probe: None,
            startup_probe: None,
        },
        status: None,
    }
}

/// Helper to create a test ProxyConfig backed by ZooKeeper with a single
/// `root@%:root` user
#[cfg(test)]
pub fn create_test_proxy_config(name: &str, metadata_repository: Option<&str>) -> ProxyConfig {
    ProxyConfig {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("{}-uid", name)),
            ..Default::default()
        },
        spec: ProxyConfigSpec {
            cluster_config: ClusterConfig {
                type_: "Cluster".to_string(),
                repository: RepositoryConfig {
                    type_: RepositoryType::ZooKeeper,
                    props: Props::from([
                        ("namespace".to_string(), json!("governance_ds")),
                        ("server-lists".to_string(), json!("zk-0.zk:2181")),
                        ("retryIntervalMilliseconds".to_string(), json!(500)),
                        ("maxRetries".to_string(), json!(3)),
                        ("timeToLiveSeconds".to_string(), json!(60)),
                        ("operationTimeoutMilliseconds".to_string(), json!(500)),
                    ]),
                },
                overwrite: true,
            },
            authority: Authority {
                users: vec![AuthorityUser {
                    user: "root".to_string(),
                    host_name: "%".to_string(),
                    password: "root".to_string(),
                }],
                privilege: None,
            },
            props: None,
        },
        status: metadata_repository.map(|repo| ProxyConfigStatus {
            metadata_repository: repo.to_string(),
        }),
    }
}

/// Reconciler over a clone of the given mock store
#[cfg(test)]
pub fn create_test_reconciler(store: &MockClusterStore) -> Reconciler {
    Reconciler::new(Box::new(store.clone()), TEST_REQUEUE)
}
