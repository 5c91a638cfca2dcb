//! Resource builders
//!
//! Pure translation of `Proxy` and `ProxyConfig` records into the
//! Deployment, Service and ConfigMap that should exist for them.
//! Nothing here performs I/O; identical input yields identical output.
//!
//! - `deployment`: proxy workload (plus in-place updates of an observed one)
//! - `injector`: default-or-override features and the driver bootstrap step
//! - `service`: network exposure
//! - `configmap`: rendered `server.yaml`

pub mod configmap;
pub mod deployment;
pub mod injector;
pub mod service;

use crate::error::ConstructionError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Label put on the workload pods and used as the Service selector
pub const APP_LABEL: &str = "apps";

/// Name and namespace of a record, both required to derive child objects
pub(crate) fn identity<K: Resource>(obj: &K, kind: &'static str) -> Result<(String, String), ConstructionError> {
    let name = obj.meta().name.clone()
        .filter(|n| !n.is_empty())
        .ok_or(ConstructionError::MissingIdentity { kind, field: "name" })?;
    let namespace = obj.namespace()
        .filter(|ns| !ns.is_empty())
        .ok_or(ConstructionError::MissingIdentity { kind, field: "namespace" })?;
    Ok((namespace, name))
}

/// Controller owner reference back to the record.
///
/// The API server garbage-collects child objects through it when the record
/// is deleted.
pub fn owner_reference<K: Resource<DynamicType = ()>>(obj: &K) -> OwnerReference {
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: obj.name_any(),
        uid: obj.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Pod labels and Service selector for a proxy
pub fn selector_labels(proxy_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), proxy_name.to_string())])
}

/// Checks that a port fits in an unsigned 16-bit value and is not zero
pub(crate) fn validate_port(port: i32) -> Result<i32, ConstructionError> {
    if (1..=i32::from(u16::MAX)).contains(&port) {
        Ok(port)
    } else {
        Err(ConstructionError::InvalidPort(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_proxy;

    #[test]
    fn test_validate_port_bounds() {
        assert_eq!(validate_port(1).unwrap(), 1);
        assert_eq!(validate_port(65535).unwrap(), 65535);
        assert!(matches!(validate_port(0), Err(ConstructionError::InvalidPort(0))));
        assert!(matches!(validate_port(65536), Err(ConstructionError::InvalidPort(65536))));
        assert!(matches!(validate_port(-3307), Err(ConstructionError::InvalidPort(-3307))));
    }

    #[test]
    fn test_owner_reference_points_at_record() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.metadata.uid = Some("0b5c6e2a".to_string());

        let owner = owner_reference(&proxy);
        assert_eq!(owner.api_version, "shardingsphere.apache.org/v1alpha1");
        assert_eq!(owner.kind, "Proxy");
        assert_eq!(owner.name, "proxy-a");
        assert_eq!(owner.uid, "0b5c6e2a");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_identity_requires_namespace() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.metadata.namespace = None;
        assert!(matches!(
            identity(&proxy, "Proxy"),
            Err(ConstructionError::MissingIdentity { field: "namespace", .. })
        ));
    }
}
