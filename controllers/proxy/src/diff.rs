//! Equality policy between derived and observed objects
//!
//! Observed objects come back from the API server with defaults filled in
//! and quantities normalized, so each comparison looks only at the fields
//! this controller manages and compares them semantically:
//! - ConfigMap data is decoded as YAML and compared as a value tree
//! - resource quantities are compared numerically (`0.2` equals `200m`)
//! - probes are compared with the server-side probe defaults applied
//! - only the driver init container is compared, others are not ours
//! - a Service node port is compared only when the record pins one

use crate::resources::deployment::{CONFIG_VOLUME, PORT_ENV, PROXY_CONTAINER};
use crate::resources::injector::{DRIVER_INIT_CONTAINER, DRIVER_VOLUME};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container, PodSpec, Probe, ResourceRequirements, Service};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Structural equality of ConfigMap data.
///
/// Keys must match exactly. Values that decode as YAML are compared as
/// decoded trees, anything else falls back to text.
pub fn config_map_data_equal(desired: &ConfigMap, observed: &ConfigMap) -> bool {
    let empty = BTreeMap::new();
    let desired = desired.data.as_ref().unwrap_or(&empty);
    let observed = observed.data.as_ref().unwrap_or(&empty);

    desired.len() == observed.len()
        && desired.iter().all(|(key, want)| match observed.get(key) {
            Some(have) => yaml_text_equal(want, have),
            None => false,
        })
}

fn yaml_text_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (
        serde_yaml::from_str::<serde_yaml::Value>(a),
        serde_yaml::from_str::<serde_yaml::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Parses a Kubernetes quantity into billionths of a unit.
///
/// Returns `None` for anything that is not a plain decimal with an
/// optional SI, binary or exponent suffix.
pub fn parse_quantity(quantity: &str) -> Option<i128> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);

    let (negative, number) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits: i128 = format!("{}{}", whole, fraction).parse().ok()?;

    // value = digits * 10^(decimal_exp) * 2^(binary_exp), expressed in nano units
    let mut decimal_exp: i32 = 9 - i32::try_from(fraction.len()).ok()?;
    let mut binary_exp: u32 = 0;
    match suffix {
        "" => {}
        "n" => decimal_exp -= 9,
        "u" => decimal_exp -= 6,
        "m" => decimal_exp -= 3,
        "k" => decimal_exp += 3,
        "M" => decimal_exp += 6,
        "G" => decimal_exp += 9,
        "T" => decimal_exp += 12,
        "P" => decimal_exp += 15,
        "E" => decimal_exp += 18,
        "Ki" => binary_exp = 10,
        "Mi" => binary_exp = 20,
        "Gi" => binary_exp = 30,
        "Ti" => binary_exp = 40,
        "Pi" => binary_exp = 50,
        "Ei" => binary_exp = 60,
        other => {
            let exponent = other.strip_prefix(['e', 'E'])?;
            decimal_exp += exponent.parse::<i32>().ok()?;
        }
    }

    let mut value = digits.checked_mul(1i128.checked_shl(binary_exp)?)?;
    if decimal_exp >= 0 {
        value = value.checked_mul(10i128.checked_pow(u32::try_from(decimal_exp).ok()?)?)?;
    } else {
        value /= 10i128.checked_pow(decimal_exp.unsigned_abs())?;
    }
    Some(if negative { -value } else { value })
}

fn quantity_equal(a: &Quantity, b: &Quantity) -> bool {
    match (parse_quantity(&a.0), parse_quantity(&b.0)) {
        (Some(a), Some(b)) => a == b,
        _ => a.0 == b.0,
    }
}

fn quantity_maps_equal(a: &BTreeMap<String, Quantity>, b: &BTreeMap<String, Quantity>) -> bool {
    a.len() == b.len()
        && a.iter().all(|(key, qa)| b.get(key).is_some_and(|qb| quantity_equal(qa, qb)))
}

/// Limits and requests with the API server rule applied: a request missing
/// for a resource that has a limit defaults to the limit.
fn normalized_resources(resources: Option<&ResourceRequirements>) -> (BTreeMap<String, Quantity>, BTreeMap<String, Quantity>) {
    let limits = resources.and_then(|r| r.limits.clone()).unwrap_or_default();
    let mut requests = resources.and_then(|r| r.requests.clone()).unwrap_or_default();
    for (key, limit) in &limits {
        requests.entry(key.clone()).or_insert_with(|| limit.clone());
    }
    (limits, requests)
}

/// Numeric comparison of limits and requests after request defaulting
pub fn resources_equal(a: Option<&ResourceRequirements>, b: Option<&ResourceRequirements>) -> bool {
    let (limits_a, requests_a) = normalized_resources(a);
    let (limits_b, requests_b) = normalized_resources(b);
    quantity_maps_equal(&limits_a, &limits_b) && quantity_maps_equal(&requests_a, &requests_b)
}

/// Probe with the API server defaults filled in
pub fn normalize_probe(probe: &Probe) -> Probe {
    let mut probe = probe.clone();
    probe.timeout_seconds.get_or_insert(1);
    probe.period_seconds.get_or_insert(10);
    probe.success_threshold.get_or_insert(1);
    probe.failure_threshold.get_or_insert(3);
    probe.initial_delay_seconds.get_or_insert(0);
    if let Some(http_get) = probe.http_get.as_mut() {
        http_get.scheme.get_or_insert_with(|| "HTTP".to_string());
    }
    if let Some(grpc) = probe.grpc.as_mut() {
        grpc.service.get_or_insert_with(String::new);
    }
    probe
}

fn probes_equal(a: Option<&Probe>, b: Option<&Probe>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => normalize_probe(a) == normalize_probe(b),
        _ => false,
    }
}

fn pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment.spec.as_ref()?.template.spec.as_ref()
}

fn proxy_container(pod: Option<&PodSpec>) -> Option<&Container> {
    pod?.containers.iter().find(|c| c.name == PROXY_CONTAINER)
}

fn port_env(container: &Container) -> Option<&str> {
    container.env.as_ref()?
        .iter()
        .find(|e| e.name == PORT_ENV)
        .and_then(|e| e.value.as_deref())
}

fn container_ports(container: &Container) -> Vec<i32> {
    container.ports.iter().flatten().map(|p| p.container_port).collect()
}

fn has_mount(container: &Container, volume: &str) -> bool {
    container.volume_mounts.iter().flatten().any(|m| m.name == volume)
}

fn config_map_source(pod: Option<&PodSpec>) -> Option<&str> {
    pod?.volumes.as_ref()?
        .iter()
        .find(|v| v.name == CONFIG_VOLUME)
        .and_then(|v| v.config_map.as_ref())
        .map(|c| c.name.as_str())
}

fn has_volume(pod: Option<&PodSpec>, volume: &str) -> bool {
    pod.and_then(|p| p.volumes.as_ref())
        .is_some_and(|volumes| volumes.iter().any(|v| v.name == volume))
}

fn driver_init_step(pod: Option<&PodSpec>) -> Option<(Option<&str>, Option<&Vec<String>>)> {
    pod?.init_containers.as_ref()?
        .iter()
        .find(|c| c.name == DRIVER_INIT_CONTAINER)
        .map(|c| (c.image.as_deref(), c.command.as_ref()))
}

fn containers_equal(desired: &Container, observed: &Container) -> bool {
    desired.image == observed.image
        && container_ports(desired) == container_ports(observed)
        && port_env(desired) == port_env(observed)
        && has_mount(desired, CONFIG_VOLUME) == has_mount(observed, CONFIG_VOLUME)
        && has_mount(desired, DRIVER_VOLUME) == has_mount(observed, DRIVER_VOLUME)
        && resources_equal(desired.resources.as_ref(), observed.resources.as_ref())
        && probes_equal(desired.liveness_probe.as_ref(), observed.liveness_probe.as_ref())
        && probes_equal(desired.readiness_probe.as_ref(), observed.readiness_probe.as_ref())
        && probes_equal(desired.startup_probe.as_ref(), observed.startup_probe.as_ref())
}

/// Whether any managed field of the observed Deployment differs
pub fn deployment_needs_update(desired: &Deployment, observed: &Deployment) -> bool {
    let replicas = |d: &Deployment| d.spec.as_ref().and_then(|s| s.replicas);
    let desired_pod = pod_spec(desired);
    let observed_pod = pod_spec(observed);

    let containers_match = match (proxy_container(desired_pod), proxy_container(observed_pod)) {
        (Some(d), Some(o)) => containers_equal(d, o),
        (None, None) => true,
        _ => false,
    };

    !(replicas(desired) == replicas(observed)
        && containers_match
        && config_map_source(desired_pod) == config_map_source(observed_pod)
        && has_volume(desired_pod, DRIVER_VOLUME) == has_volume(observed_pod, DRIVER_VOLUME)
        && driver_init_step(desired_pod) == driver_init_step(observed_pod))
}

/// Whether type, selector or the port binding of the observed Service differs
pub fn service_needs_update(desired: &Service, observed: &Service) -> bool {
    let (Some(want), Some(have)) = (desired.spec.as_ref(), observed.spec.as_ref()) else {
        return desired.spec.is_some() != observed.spec.is_some();
    };

    let service_type = |t: &Option<String>| t.clone().unwrap_or_else(|| "ClusterIP".to_string());
    if service_type(&want.type_) != service_type(&have.type_) || want.selector != have.selector {
        return true;
    }

    let want_ports = want.ports.as_deref().unwrap_or_default();
    let have_ports = have.ports.as_deref().unwrap_or_default();
    if want_ports.len() != have_ports.len() {
        return true;
    }
    !want_ports.iter().zip(have_ports).all(|(w, h)| {
        w.name == h.name
            && w.port == h.port
            && w.target_port == h.target_port
            && (w.node_port.is_none() || w.node_port == h.node_port)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::configmap::{build_config_map, CONFIG_MAP_KEY};
    use crate::resources::deployment::build_deployment;
    use crate::resources::service::build_service;
    use crate::test_utils::{create_test_proxy, create_test_proxy_config};
    use crds::{ExposureMode, MySqlDriver};
    use k8s_openapi::api::core::v1::{GRPCAction, HTTPGetAction};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn proxy_container_mut(deployment: &mut Deployment) -> &mut Container {
        &mut deployment.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0]
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0.2"), parse_quantity("200m"));
        assert_eq!(parse_quantity("1"), Some(1_000_000_000));
        assert_eq!(parse_quantity("1Ki"), parse_quantity("1024"));
        assert_eq!(parse_quantity("1.6Gi"), Some(1_717_986_918_400_000_000));
        assert_eq!(parse_quantity("1e3"), parse_quantity("1k"));
        assert_eq!(parse_quantity("129e6"), parse_quantity("129M"));
        assert_eq!(parse_quantity("-1"), Some(-1_000_000_000));
        assert_eq!(parse_quantity("abc"), None);
        assert_eq!(parse_quantity(""), None);
        assert_eq!(parse_quantity("1Zi"), None);
    }

    #[test]
    fn test_config_map_structural_equality() {
        let config = create_test_proxy_config("sharding-proxy", None);
        let desired = build_config_map(&config).unwrap();

        let mut reordered = desired.clone();
        reordered.data = Some(BTreeMap::from([(
            CONFIG_MAP_KEY.to_string(),
            "authority:\n  users:\n  - user: root@%:root\n\
             mode:\n  overwrite: true\n  repository:\n    props:\n      \
             maxRetries: 3\n      namespace: governance_ds\n      \
             operationTimeoutMilliseconds: 500\n      retryIntervalMilliseconds: 500\n      \
             server-lists: zk-0.zk:2181\n      timeToLiveSeconds: 60\n    \
             type: ZooKeeper\n  type: Cluster\n"
                .to_string(),
        )]));
        assert!(config_map_data_equal(&desired, &reordered));

        let mut changed = reordered.clone();
        changed.data.as_mut().unwrap().insert(
            CONFIG_MAP_KEY.to_string(),
            "authority:\n  users:\n  - user: admin@%:admin\n".to_string(),
        );
        assert!(!config_map_data_equal(&desired, &changed));
    }

    #[test]
    fn test_config_map_extra_key_differs() {
        let config = create_test_proxy_config("sharding-proxy", None);
        let desired = build_config_map(&config).unwrap();
        let mut observed = desired.clone();
        observed.data.as_mut().unwrap().insert("logback.xml".to_string(), "<configuration/>".to_string());
        assert!(!config_map_data_equal(&desired, &observed));
    }

    #[test]
    fn test_config_map_non_yaml_falls_back_to_text() {
        let a = ConfigMap {
            data: Some(BTreeMap::from([("k".to_string(), "key: [unterminated".to_string())])),
            ..Default::default()
        };
        let b = a.clone();
        assert!(config_map_data_equal(&a, &b));

        let mut c = a.clone();
        c.data = Some(BTreeMap::from([("k".to_string(), "key: [other".to_string())]));
        assert!(!config_map_data_equal(&a, &c));
    }

    #[test]
    fn test_identical_deployment_needs_no_update() {
        let proxy = create_test_proxy("proxy-a", 3307);
        let desired = build_deployment(&proxy).unwrap();
        assert!(!deployment_needs_update(&desired, &desired.clone()));
    }

    #[test]
    fn test_server_defaults_do_not_trigger_update() {
        let proxy = create_test_proxy("proxy-a", 3307);
        let desired = build_deployment(&proxy).unwrap();

        let mut observed = desired.clone();
        observed.metadata.resource_version = Some("5".to_string());
        let container = proxy_container_mut(&mut observed);
        container.termination_message_path = Some("/dev/termination-log".to_string());
        container.resources.as_mut().unwrap().requests.as_mut().unwrap()
            .insert("cpu".to_string(), Quantity("200m".to_string()));
        for probe in [
            container.liveness_probe.as_mut(),
            container.readiness_probe.as_mut(),
            container.startup_probe.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            *probe = normalize_probe(probe);
        }

        assert!(!deployment_needs_update(&desired, &observed));
    }

    #[test]
    fn test_deployment_field_changes_trigger_update() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        let observed = build_deployment(&proxy).unwrap();

        proxy.spec.version = "5.2.0".to_string();
        assert!(deployment_needs_update(&build_deployment(&proxy).unwrap(), &observed));

        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.replicas = 2;
        assert!(deployment_needs_update(&build_deployment(&proxy).unwrap(), &observed));

        let proxy = create_test_proxy("proxy-a", 3308);
        assert!(deployment_needs_update(&build_deployment(&proxy).unwrap(), &observed));

        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.proxy_config_name = "other".to_string();
        assert!(deployment_needs_update(&build_deployment(&proxy).unwrap(), &observed));
    }

    #[test]
    fn test_driver_version_change_triggers_update() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.28".to_string() });
        let observed = build_deployment(&proxy).unwrap();

        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.30".to_string() });
        assert!(deployment_needs_update(&build_deployment(&proxy).unwrap(), &observed));

        proxy.spec.mysql_driver = None;
        assert!(deployment_needs_update(&build_deployment(&proxy).unwrap(), &observed));
    }

    #[test]
    fn test_service_allocated_node_port_is_not_a_difference() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.service_type.type_ = ExposureMode::NodePort;
        let desired = build_service(&proxy).unwrap();

        let mut observed = desired.clone();
        observed.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].node_port = Some(31500);
        observed.spec.as_mut().unwrap().cluster_ip = Some("10.0.0.12".to_string());
        assert!(!service_needs_update(&desired, &observed));

        proxy.spec.service_type.node_port = Some(30007);
        let pinned = build_service(&proxy).unwrap();
        assert!(service_needs_update(&pinned, &observed));
    }

    #[test]
    fn test_service_type_and_port_changes() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        let observed = build_service(&proxy).unwrap();

        proxy.spec.service_type.type_ = ExposureMode::NodePort;
        assert!(service_needs_update(&build_service(&proxy).unwrap(), &observed));

        let proxy = create_test_proxy("proxy-a", 3308);
        assert!(service_needs_update(&build_service(&proxy).unwrap(), &observed));
    }

    #[test]
    fn test_http_check_override_with_server_defaults_needs_no_update() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.liveness_probe = Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/health".to_string()),
                port: IntOrString::Int(8080),
                ..Default::default()
            }),
            ..Default::default()
        });
        let desired = build_deployment(&proxy).unwrap();

        let mut observed = desired.clone();
        let container = proxy_container_mut(&mut observed);
        let liveness = container.liveness_probe.as_mut().unwrap();
        *liveness = normalize_probe(liveness);
        assert_eq!(liveness.http_get.as_ref().unwrap().scheme.as_deref(), Some("HTTP"));

        assert!(!deployment_needs_update(&desired, &observed));

        liveness_path_changed(&mut observed);
        assert!(deployment_needs_update(&desired, &observed));
    }

    fn liveness_path_changed(deployment: &mut Deployment) {
        let container = proxy_container_mut(deployment);
        container.liveness_probe.as_mut().unwrap().http_get.as_mut().unwrap().path = Some("/live".to_string());
    }

    #[test]
    fn test_grpc_check_service_default() {
        let probe = Probe {
            grpc: Some(GRPCAction { port: 9090, service: None }),
            ..Default::default()
        };
        let normalized = normalize_probe(&probe);
        assert_eq!(normalized.grpc.as_ref().unwrap().service.as_deref(), Some(""));
        assert!(probes_equal(Some(&probe), Some(&normalized)));
    }

    #[test]
    fn test_foreign_init_container_is_not_a_difference() {
        let proxy = create_test_proxy("proxy-a", 3307);
        let desired = build_deployment(&proxy).unwrap();

        let mut observed = desired.clone();
        observed.spec.as_mut().unwrap().template.spec.as_mut().unwrap().init_containers = Some(vec![Container {
            name: "istio-init".to_string(),
            image: Some("istio/proxyv2".to_string()),
            ..Default::default()
        }]);
        assert!(!deployment_needs_update(&desired, &observed));

        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.30".to_string() });
        let with_driver = build_deployment(&proxy).unwrap();
        let mut observed_with_foreign = with_driver.clone();
        observed_with_foreign.spec.as_mut().unwrap().template.spec.as_mut().unwrap()
            .init_containers.as_mut().unwrap()
            .insert(0, Container { name: "istio-init".to_string(), ..Default::default() });
        assert!(!deployment_needs_update(&with_driver, &observed_with_foreign));
    }
}
