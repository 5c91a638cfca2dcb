//! ProxyConfig CRD
//!
//! Holds the `server.yaml` content for a ShardingSphere-Proxy: cluster mode
//! and governance repository, authority users and proxy properties.
//! The controller renders it into a ConfigMap that `Proxy` workloads mount.

use kube::CustomResource;
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form properties, rendered into server.yaml with the keys exactly as
/// given (e.g. `sql-show`, `server-lists`, `retryIntervalMilliseconds`)
pub type Props = BTreeMap<String, serde_json::Value>;

/// Schema for a `Props` field: any object, pruning disabled
fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Desired `server.yaml` content shared by proxies
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "shardingsphere.apache.org",
    version = "v1alpha1",
    kind = "ProxyConfig",
    namespaced,
    derive = "PartialEq",
    status = "ProxyConfigStatus",
    shortname = "ssproxyconfig",
    printcolumn = r#"{"name":"MetadataRepository","type":"string","jsonPath":".status.metadataRepository"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfigSpec {
    /// Cluster mode configuration (`mode:` in server.yaml)
    #[serde(rename = "mode")]
    pub cluster_config: ClusterConfig,

    /// Users allowed to connect to the proxy
    pub authority: Authority,

    /// Proxy properties (`props:` in server.yaml)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub props: Option<Props>,
}

/// Cluster mode: how proxies share metadata
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Mode type, "Cluster" for governed deployments
    #[serde(rename = "type")]
    pub type_: String,

    /// Metadata repository backing the cluster
    pub repository: RepositoryConfig,

    /// Whether local configuration overwrites the repository content on start
    #[serde(default)]
    pub overwrite: bool,
}

/// Metadata repository the cluster registers in
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// Repository kind
    #[serde(rename = "type")]
    pub type_: RepositoryType,

    /// Repository connection properties (`namespace`, `server-lists`, ...)
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub props: Props,
}

/// Metadata repository kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum RepositoryType {
    /// Apache ZooKeeper
    ZooKeeper,
    /// etcd
    Etcd,
}

impl RepositoryType {
    /// Name as written in server.yaml and in `status.metadataRepository`
    pub fn as_str(self) -> &'static str {
        match self {
            RepositoryType::ZooKeeper => "ZooKeeper",
            RepositoryType::Etcd => "Etcd",
        }
    }
}

impl std::fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proxy login configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Authority {
    /// Authority users
    #[serde(default)]
    pub users: Vec<AuthorityUser>,

    /// Privilege provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privilege: Option<Privilege>,
}

/// A proxy login.
///
/// Rendered into server.yaml as a single `user@host:password` string.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityUser {
    /// User name
    pub user: String,

    /// Host the user may connect from ("%" for any)
    pub host_name: String,

    /// Plain-text password
    pub password: String,
}

/// Privilege provider selection
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Privilege {
    /// Provider kind
    #[serde(rename = "type")]
    pub type_: PrivilegeType,
}

/// Privilege provider kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivilegeType {
    /// Every user may access every database
    AllPermitted,
    /// Access limited to the databases granted per user
    DatabasePermitted,
}

/// Observed state of a ProxyConfig
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfigStatus {
    /// Metadata repository kind last applied to the generated configuration
    #[serde(default)]
    pub metadata_repository: String,
}

impl ProxyConfig {
    /// Whether the stored status lags behind the declared repository kind
    pub fn metadata_repository_is_stale(&self) -> bool {
        let declared = self.spec.cluster_config.repository.type_.as_str();
        match &self.status {
            None => true,
            Some(status) => {
                status.metadata_repository.is_empty() || status.metadata_repository != declared
            }
        }
    }
}
