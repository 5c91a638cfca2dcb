//! Feature injection for the proxy workload.
//!
//! Every optional feature follows one policy: an explicit value on the
//! `Proxy` is copied verbatim, otherwise a conservative default is
//! synthesized. The MySQL driver bootstrap is conditional on the
//! `mySQLDriver` descriptor and is re-injected by replacement, never by
//! appending, so repeated application leaves exactly one driver init
//! container. Init containers with other names are left alone.

use crate::error::ConstructionError;
use crds::{MySqlDriver, ProxySpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, PodSpec, Probe, ResourceRequirements, TCPSocketAction, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// CPU request when the record sets no resources (0.2 cores)
pub const DEFAULT_CPU_REQUEST: &str = "0.2";
/// Memory request when the record sets no resources (1.6 GiB)
pub const DEFAULT_MEMORY_REQUEST: &str = "1.6Gi";

/// Period of the default liveness check
pub const LIVENESS_PERIOD_SECONDS: i32 = 10;
/// Period of the default readiness check
pub const READINESS_PERIOD_SECONDS: i32 = 10;
/// Period of the default startup check
pub const STARTUP_PERIOD_SECONDS: i32 = 5;
/// 12 x 5s gives the JVM a minute to start before the kubelet gives up
pub const STARTUP_FAILURE_THRESHOLD: i32 = 12;

/// Name of the init container that fetches Connector/J
pub const DRIVER_INIT_CONTAINER: &str = "download-mysql-connect";
/// Image running the download script
pub const DRIVER_INIT_IMAGE: &str = "busybox:1.35.0";
/// emptyDir shared between the init container and the proxy
pub const DRIVER_VOLUME: &str = "mysql-connect-jar";
/// Where the proxy loads extra jars from
pub const DRIVER_MOUNT_PATH: &str = "/opt/shardingsphere-proxy/ext-lib";
const MAVEN_REPOSITORY: &str = "https://repo1.maven.org/maven2/mysql/mysql-connector-java";

/// Resource requirements for the proxy container
pub fn resources(spec: &ProxySpec) -> ResourceRequirements {
    match &spec.resources {
        Some(resources) => resources.clone(),
        None => ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(DEFAULT_CPU_REQUEST.to_string())),
                ("memory".to_string(), Quantity(DEFAULT_MEMORY_REQUEST.to_string())),
            ])),
            ..Default::default()
        },
    }
}

fn tcp_probe(port: i32, period_seconds: i32, failure_threshold: Option<i32>) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        period_seconds: Some(period_seconds),
        failure_threshold,
        ..Default::default()
    }
}

/// Liveness check: the record's, or a TCP check on the proxy port
pub fn liveness_probe(spec: &ProxySpec) -> Probe {
    spec.liveness_probe.clone()
        .unwrap_or_else(|| tcp_probe(spec.port, LIVENESS_PERIOD_SECONDS, None))
}

/// Readiness check: the record's, or a TCP check on the proxy port
pub fn readiness_probe(spec: &ProxySpec) -> Probe {
    spec.readiness_probe.clone()
        .unwrap_or_else(|| tcp_probe(spec.port, READINESS_PERIOD_SECONDS, None))
}

/// Startup check: the record's, or a TCP check allowing a minute to start
pub fn startup_probe(spec: &ProxySpec) -> Probe {
    spec.startup_probe.clone()
        .unwrap_or_else(|| tcp_probe(spec.port, STARTUP_PERIOD_SECONDS, Some(STARTUP_FAILURE_THRESHOLD)))
}

/// Writes resources and the three probes onto the proxy container
pub fn apply_overrides(spec: &ProxySpec, container: &mut Container) {
    container.resources = Some(resources(spec));
    container.liveness_probe = Some(liveness_probe(spec));
    container.readiness_probe = Some(readiness_probe(spec));
    container.startup_probe = Some(startup_probe(spec));
}

/// Driver versions end up inside a shell script, so only version-like
/// strings are accepted.
fn validate_driver_version(version: &str) -> Result<&str, ConstructionError> {
    let valid = !version.is_empty()
        && version.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(version)
    } else {
        Err(ConstructionError::InvalidDriverVersion(version.to_string()))
    }
}

/// Shell script that downloads Connector/J and its checksum, verifies the
/// jar and moves it into the shared ext-lib volume. A checksum mismatch
/// exits 1, which keeps the pod from starting.
pub fn driver_bootstrap_script(driver: &MySqlDriver) -> Result<String, ConstructionError> {
    let version = validate_driver_version(&driver.version)?;
    let jar = format!("mysql-connector-java-{}.jar", version);
    let url = format!("{}/{}/{}", MAVEN_REPOSITORY, version, jar);
    Ok(format!(
        "wget {url};\n\
         wget {url}.md5;\n\
         if [ $(md5sum /{jar} | cut -d ' ' -f1) = $(cat /{jar}.md5) ];\n\
         then echo success;\n\
         else echo failed;exit 1;fi;mv /{jar} {dest}",
        url = url,
        jar = jar,
        dest = DRIVER_MOUNT_PATH,
    ))
}

fn driver_mount() -> VolumeMount {
    VolumeMount {
        name: DRIVER_VOLUME.to_string(),
        mount_path: DRIVER_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

/// Init container for the given driver version
pub fn driver_init_container(driver: &MySqlDriver) -> Result<Container, ConstructionError> {
    Ok(Container {
        name: DRIVER_INIT_CONTAINER.to_string(),
        image: Some(DRIVER_INIT_IMAGE.to_string()),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            driver_bootstrap_script(driver)?,
        ]),
        volume_mounts: Some(vec![driver_mount()]),
        ..Default::default()
    })
}

/// Adds the driver bootstrap step to a pod, or rebuilds it in place.
///
/// An init container named [`DRIVER_INIT_CONTAINER`] is replaced in place,
/// otherwise the rebuilt one is appended. Other init containers are kept.
/// The shared emptyDir volume and the mount on `main_container` are added
/// only when missing.
pub fn inject_driver_bootstrap(
    pod_spec: &mut PodSpec,
    main_container: &str,
    driver: &MySqlDriver,
) -> Result<(), ConstructionError> {
    let init = driver_init_container(driver)?;
    let init_containers = pod_spec.init_containers.get_or_insert_with(Vec::new);
    match init_containers.iter_mut().find(|c| c.name == DRIVER_INIT_CONTAINER) {
        Some(existing) => *existing = init,
        None => init_containers.push(init),
    }

    if let Some(container) = pod_spec.containers.iter_mut().find(|c| c.name == main_container) {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        if !mounts.iter().any(|m| m.name == DRIVER_VOLUME) {
            mounts.push(driver_mount());
        }
    }

    let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
    if !volumes.iter().any(|v| v.name == DRIVER_VOLUME) {
        volumes.push(Volume {
            name: DRIVER_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }
    Ok(())
}

/// Removes the driver bootstrap step, its volume and mounts
pub fn remove_driver_bootstrap(pod_spec: &mut PodSpec) {
    if let Some(init) = pod_spec.init_containers.as_mut() {
        init.retain(|c| c.name != DRIVER_INIT_CONTAINER);
        if init.is_empty() {
            pod_spec.init_containers = None;
        }
    }
    for container in &mut pod_spec.containers {
        if let Some(mounts) = container.volume_mounts.as_mut() {
            mounts.retain(|m| m.name != DRIVER_VOLUME);
        }
    }
    if let Some(volumes) = pod_spec.volumes.as_mut() {
        volumes.retain(|v| v.name != DRIVER_VOLUME);
    }
}
