//! Proxy Service

use super::{identity, owner_reference, selector_labels, validate_port};
use crate::error::ConstructionError;
use crds::{ExposureMode, Proxy};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Name of the single Service port
pub const SERVICE_PORT_NAME: &str = "proxy-port";

/// Single port binding, with `nodePort` only in `NodePort` mode.
///
/// An omitted node port and a zero one differ for the API server, so the
/// field stays `None` unless the record pins it.
fn service_port(proxy: &Proxy, port: i32) -> ServicePort {
    let node_port = match proxy.spec.service_type.type_ {
        ExposureMode::NodePort => proxy.spec.service_type.node_port,
        ExposureMode::ClusterIp => None,
    };
    ServicePort {
        name: Some(SERVICE_PORT_NAME.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        node_port,
        ..Default::default()
    }
}

/// Builds the Service that should exist for a proxy
pub fn build_service(proxy: &Proxy) -> Result<Service, ConstructionError> {
    let (namespace, name) = identity(proxy, "Proxy")?;
    let port = validate_port(proxy.spec.port)?;

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace),
            owner_references: Some(vec![owner_reference(proxy)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(proxy.spec.service_type.type_.as_service_type().to_string()),
            selector: Some(selector_labels(&name)),
            ports: Some(vec![service_port(proxy, port)]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Rewrites type, selector and ports of an observed Service.
///
/// A node port allocated by the cluster is carried over when the record
/// does not pin one, so switching nothing does not churn the allocation.
pub fn update_service(proxy: &Proxy, observed: &Service) -> Result<Service, ConstructionError> {
    let (_, name) = identity(proxy, "Proxy")?;
    let port = validate_port(proxy.spec.port)?;

    let mut updated = observed.clone();
    let spec = updated.spec.get_or_insert_with(Default::default);
    let allocated = spec.ports.as_ref()
        .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some(SERVICE_PORT_NAME)))
        .and_then(|p| p.node_port);

    let mut desired_port = service_port(proxy, port);
    if proxy.spec.service_type.type_ == ExposureMode::NodePort && desired_port.node_port.is_none() {
        desired_port.node_port = allocated;
    }

    spec.type_ = Some(proxy.spec.service_type.type_.as_service_type().to_string());
    spec.selector = Some(selector_labels(&name));
    spec.ports = Some(vec![desired_port]);
    Ok(updated)
}
