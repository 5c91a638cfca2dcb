//! Proxy workload Deployment

use super::injector::{apply_overrides, inject_driver_bootstrap, remove_driver_bootstrap};
use super::{identity, owner_reference, selector_labels, validate_port};
use crate::error::ConstructionError;
use crds::{Proxy, ProxySpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

/// Name of the proxy container in the pod
pub const PROXY_CONTAINER: &str = "proxy";
/// Image repository, tagged with the record's version
pub const PROXY_IMAGE: &str = "apache/shardingsphere-proxy";
/// Volume backed by the ProxyConfig ConfigMap
pub const CONFIG_VOLUME: &str = "config";
/// Where the proxy reads server.yaml from
pub const CONFIG_MOUNT_PATH: &str = "/opt/shardingsphere-proxy/conf";
/// Environment variable carrying the listen port
pub const PORT_ENV: &str = "PORT";
const PULL_POLICY: &str = "IfNotPresent";
const RECREATE: &str = "Recreate";

/// Image reference for a proxy version
pub fn image(spec: &ProxySpec) -> String {
    format!("{}:{}", PROXY_IMAGE, spec.version)
}

fn port_env(port: i32) -> EnvVar {
    EnvVar {
        name: PORT_ENV.to_string(),
        value: Some(port.to_string()),
        ..Default::default()
    }
}

fn config_mount() -> VolumeMount {
    VolumeMount {
        name: CONFIG_VOLUME.to_string(),
        mount_path: CONFIG_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

fn config_volume(spec: &ProxySpec) -> Volume {
    Volume {
        name: CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: spec.proxy_config_name.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn proxy_container(spec: &ProxySpec, port: i32) -> Container {
    let mut container = Container {
        name: PROXY_CONTAINER.to_string(),
        image: Some(image(spec)),
        image_pull_policy: Some(PULL_POLICY.to_string()),
        ports: Some(vec![ContainerPort {
            container_port: port,
            ..Default::default()
        }]),
        env: Some(vec![port_env(port)]),
        volume_mounts: Some(vec![config_mount()]),
        ..Default::default()
    };
    apply_overrides(spec, &mut container);
    container
}

/// Replaces the first element matching `same`, or appends `item`
fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

fn apply_driver(spec: &ProxySpec, pod: &mut PodSpec) -> Result<(), ConstructionError> {
    match &spec.mysql_driver {
        Some(driver) => inject_driver_bootstrap(pod, PROXY_CONTAINER, driver),
        None => {
            remove_driver_bootstrap(pod);
            Ok(())
        }
    }
}

/// Builds the Deployment that should exist for a proxy.
///
/// One `proxy` container, rollout strategy `Recreate`, and the driver
/// bootstrap init container when `mySQLDriver` is set.
pub fn build_deployment(proxy: &Proxy) -> Result<Deployment, ConstructionError> {
    let (namespace, name) = identity(proxy, "Proxy")?;
    let port = validate_port(proxy.spec.port)?;
    let labels = selector_labels(&name);

    let mut pod = PodSpec {
        containers: vec![proxy_container(&proxy.spec, port)],
        volumes: Some(vec![config_volume(&proxy.spec)]),
        ..Default::default()
    };
    apply_driver(&proxy.spec, &mut pod)?;

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(proxy)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(proxy.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some(RECREATE.to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Rewrites the managed fields of an observed Deployment.
///
/// Starts from `observed` so its resourceVersion and any fields this
/// controller does not manage survive. The selector is immutable and is
/// left alone.
pub fn update_deployment(proxy: &Proxy, observed: &Deployment) -> Result<Deployment, ConstructionError> {
    let (_, name) = identity(proxy, "Proxy")?;
    let port = validate_port(proxy.spec.port)?;

    let mut updated = observed.clone();
    let spec = updated.spec.get_or_insert_with(Default::default);
    spec.replicas = Some(proxy.spec.replicas);
    spec.strategy = Some(DeploymentStrategy {
        type_: Some(RECREATE.to_string()),
        ..Default::default()
    });

    let template_meta = spec.template.metadata.get_or_insert_with(Default::default);
    template_meta.labels.get_or_insert_with(Default::default).extend(selector_labels(&name));

    let pod = spec.template.spec.get_or_insert_with(Default::default);
    match pod.containers.iter_mut().find(|c| c.name == PROXY_CONTAINER) {
        Some(container) => {
            container.image = Some(image(&proxy.spec));
            container.image_pull_policy = Some(PULL_POLICY.to_string());
            container.ports = Some(vec![ContainerPort {
                container_port: port,
                ..Default::default()
            }]);
            upsert(container.env.get_or_insert_with(Vec::new), port_env(port), |e| e.name == PORT_ENV);
            upsert(
                container.volume_mounts.get_or_insert_with(Vec::new),
                config_mount(),
                |m| m.name == CONFIG_VOLUME,
            );
            apply_overrides(&proxy.spec, container);
        }
        None => pod.containers.insert(0, proxy_container(&proxy.spec, port)),
    }
    upsert(
        pod.volumes.get_or_insert_with(Vec::new),
        config_volume(&proxy.spec),
        |v| v.name == CONFIG_VOLUME,
    );
    apply_driver(&proxy.spec, pod)?;

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::injector::{DRIVER_INIT_CONTAINER, DRIVER_VOLUME};
    use crate::test_utils::create_test_proxy;
    use crds::MySqlDriver;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn pod(deployment: &Deployment) -> &PodSpec {
        deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap()
    }

    #[test]
    fn test_build_deployment_defaults() {
        let proxy = create_test_proxy("proxy-a", 3307);
        let deployment = build_deployment(&proxy).unwrap();

        assert_eq!(deployment.metadata.name.as_deref(), Some("proxy-a"));
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(deployment.metadata.owner_references.as_ref().unwrap()[0].kind, "Proxy");

        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.strategy.as_ref().unwrap().type_.as_deref(), Some("Recreate"));
        assert_eq!(spec.selector.match_labels.as_ref().unwrap()["apps"], "proxy-a");

        let pod = pod(&deployment);
        assert_eq!(pod.containers.len(), 1);
        assert!(pod.init_containers.is_none());

        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("apache/shardingsphere-proxy:5.1.2"));
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 3307);
        let env = &container.env.as_ref().unwrap()[0];
        assert_eq!((env.name.as_str(), env.value.as_deref()), ("PORT", Some("3307")));
        assert_eq!(container.volume_mounts.as_ref().unwrap()[0].mount_path, CONFIG_MOUNT_PATH);

        let requests = container.resources.as_ref().unwrap().requests.as_ref().unwrap();
        assert_eq!(requests["cpu"], Quantity("0.2".to_string()));
        assert_eq!(requests["memory"], Quantity("1.6Gi".to_string()));
        assert!(container.liveness_probe.is_some());
        assert!(container.readiness_probe.is_some());
        assert_eq!(container.startup_probe.as_ref().unwrap().failure_threshold, Some(12));

        let volume = &pod.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.config_map.as_ref().unwrap().name, "proxy-a-config");
    }

    #[test]
    fn test_build_deployment_is_deterministic() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.30".to_string() });

        let first = serde_json::to_string(&build_deployment(&proxy).unwrap()).unwrap();
        let second = serde_json::to_string(&build_deployment(&proxy).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_deployment_with_driver() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.30".to_string() });

        let deployment = build_deployment(&proxy).unwrap();
        let pod = pod(&deployment);
        assert_eq!(pod.init_containers.as_ref().unwrap()[0].name, DRIVER_INIT_CONTAINER);
        assert_eq!(pod.volumes.as_ref().unwrap().len(), 2);
        let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
        assert!(mounts.iter().any(|m| m.name == DRIVER_VOLUME));
    }

    #[test]
    fn test_build_deployment_rejects_bad_input() {
        let proxy = create_test_proxy("proxy-a", 70000);
        assert!(matches!(build_deployment(&proxy), Err(ConstructionError::InvalidPort(70000))));

        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.30 && reboot".to_string() });
        assert!(matches!(build_deployment(&proxy), Err(ConstructionError::InvalidDriverVersion(_))));
    }

    #[test]
    fn test_update_deployment_keeps_resource_version_and_extras() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        let mut observed = build_deployment(&proxy).unwrap();
        observed.metadata.resource_version = Some("42".to_string());
        let env = pod(&observed).containers[0].env.clone().unwrap();
        let mut extra_env = env.clone();
        extra_env.push(EnvVar {
            name: "JVM_OPTS".to_string(),
            value: Some("-Xmx1g".to_string()),
            ..Default::default()
        });
        observed.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0].env = Some(extra_env);

        proxy.spec.version = "5.2.0".to_string();
        proxy.spec.replicas = 3;
        let updated = update_deployment(&proxy, &observed).unwrap();

        assert_eq!(updated.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(updated.spec.as_ref().unwrap().replicas, Some(3));
        let container = &pod(&updated).containers[0];
        assert_eq!(container.image.as_deref(), Some("apache/shardingsphere-proxy:5.2.0"));
        let env = container.env.as_ref().unwrap();
        assert_eq!(env.len(), 2);
        assert!(env.iter().any(|e| e.name == "JVM_OPTS"));
    }

    #[test]
    fn test_update_deployment_replaces_driver_init_container() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.28".to_string() });
        let observed = build_deployment(&proxy).unwrap();

        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.30".to_string() });
        let updated = update_deployment(&proxy, &observed).unwrap();

        let init = pod(&updated).init_containers.as_ref().unwrap();
        assert_eq!(init.len(), 1);
        assert!(init[0].command.as_ref().unwrap()[2].contains("8.0.30"));
        assert_eq!(pod(&updated).volumes.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_update_deployment_removes_driver() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.28".to_string() });
        let observed = build_deployment(&proxy).unwrap();

        proxy.spec.mysql_driver = None;
        let updated = update_deployment(&proxy, &observed).unwrap();
        let pod = pod(&updated);
        assert!(pod.init_containers.is_none());
        assert_eq!(pod.volumes.as_ref().unwrap().len(), 1);
        assert_eq!(pod.containers[0].volume_mounts.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_update_deployment_keeps_foreign_init_container() {
        let mut proxy = create_test_proxy("proxy-a", 3307);
        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.28".to_string() });
        let mut observed = build_deployment(&proxy).unwrap();
        observed.spec.as_mut().unwrap().template.spec.as_mut().unwrap()
            .init_containers.as_mut().unwrap()
            .insert(0, Container { name: "istio-init".to_string(), ..Default::default() });

        proxy.spec.mysql_driver = Some(MySqlDriver { version: "8.0.30".to_string() });
        let updated = update_deployment(&proxy, &observed).unwrap();
        let init = pod(&updated).init_containers.as_ref().unwrap();
        assert_eq!(init.len(), 2);
        assert_eq!(init[0].name, "istio-init");
        assert!(init[1].command.as_ref().unwrap()[2].contains("8.0.30"));

        proxy.spec.mysql_driver = None;
        let updated = update_deployment(&proxy, &updated).unwrap();
        let init = pod(&updated).init_containers.as_ref().unwrap();
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].name, "istio-init");
    }
}
