//! Proxy CRD
//!
//! Declares a ShardingSphere-Proxy workload: image version, replica count,
//! listening port, exposure mode and the optional overrides the controller
//! otherwise fills with defaults.

use k8s_openapi::api::core::v1::{Probe, ResourceRequirements};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a ShardingSphere-Proxy workload
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "shardingsphere.apache.org",
    version = "v1alpha1",
    kind = "Proxy",
    namespaced,
    derive = "PartialEq",
    status = "ProxyStatus",
    shortname = "ssproxy",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"ReadyNodes","type":"integer","jsonPath":".status.readyNodes"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    /// ShardingSphere-Proxy image tag (e.g. "5.1.2")
    pub version: String,

    /// How the proxy is exposed to clients
    #[serde(default)]
    pub service_type: ProxyServiceType,

    /// Number of proxy replicas
    pub replicas: i32,

    /// Name of the ProxyConfig (and its generated ConfigMap) mounted as `conf/`
    pub proxy_config_name: String,

    /// Port the proxy listens on
    pub port: i32,

    /// MySQL JDBC driver to download before the proxy starts.
    /// Presence of this field enables the driver bootstrap step.
    #[serde(default, rename = "mySQLDriver", skip_serializing_if = "Option::is_none")]
    pub mysql_driver: Option<MySqlDriver>,

    /// Container resource requirements (defaults to small requests when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Liveness probe (defaults to a TCP check on `port`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,

    /// Readiness probe (defaults to a TCP check on `port`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,

    /// Startup probe (defaults to a TCP check on `port` allowing a minute to start)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_probe: Option<Probe>,
}

/// Service exposure of the proxy
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyServiceType {
    /// Exposure mode
    #[serde(default, rename = "type")]
    pub type_: ExposureMode,

    /// Fixed node port, only honoured in `NodePort` mode.
    /// When unset the cluster allocates one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,
}

/// Whether the proxy is reachable only inside the cluster or also on every node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum ExposureMode {
    /// Cluster-internal virtual IP
    #[default]
    #[serde(rename = "ClusterIP")]
    ClusterIp,

    /// Additionally exposed on a port of every node
    NodePort,
}

impl ExposureMode {
    /// Service `type` string understood by the API server
    pub fn as_service_type(self) -> &'static str {
        match self {
            ExposureMode::ClusterIp => "ClusterIP",
            ExposureMode::NodePort => "NodePort",
        }
    }
}

/// MySQL Connector/J descriptor
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MySqlDriver {
    /// Connector/J version published on Maven Central (e.g. "8.0.30")
    pub version: String,
}

/// Observed state of a proxy workload
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    /// Coarse availability of the proxy workload
    #[serde(default)]
    pub phase: ProxyPhase,

    /// Ready replicas observed on the proxy Deployment
    #[serde(default)]
    pub ready_nodes: i32,
}

/// Proxy availability phase
///
/// Serializes as PascalCase ("Ready", "NotReady").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ProxyPhase {
    /// No replica is ready yet
    #[default]
    NotReady,

    /// At least one replica is serving
    Ready,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_spec_deserializes_camel_case() {
        let spec: ProxySpec = serde_json::from_value(serde_json::json!({
            "version": "5.1.2",
            "serviceType": { "type": "NodePort", "nodePort": 30007 },
            "replicas": 2,
            "proxyConfigName": "sharding-proxy",
            "port": 3307,
            "mySQLDriver": { "version": "8.0.30" }
        }))
        .unwrap();

        assert_eq!(spec.service_type.type_, ExposureMode::NodePort);
        assert_eq!(spec.service_type.node_port, Some(30007));
        assert_eq!(spec.mysql_driver.unwrap().version, "8.0.30");
        assert!(spec.resources.is_none());
        assert!(spec.liveness_probe.is_none());
    }

    #[test]
    fn test_service_type_defaults_to_cluster_ip() {
        let spec: ProxySpec = serde_json::from_value(serde_json::json!({
            "version": "5.1.2",
            "replicas": 1,
            "proxyConfigName": "cfg",
            "port": 3307
        }))
        .unwrap();

        assert_eq!(spec.service_type.type_, ExposureMode::ClusterIp);
        assert_eq!(spec.service_type.type_.as_service_type(), "ClusterIP");
        assert!(spec.mysql_driver.is_none());
    }

    #[test]
    fn test_status_phase_is_pascal_case() {
        let status = ProxyStatus { phase: ProxyPhase::Ready, ready_nodes: 2 };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "Ready");
        assert_eq!(json["readyNodes"], 2);
    }
}
