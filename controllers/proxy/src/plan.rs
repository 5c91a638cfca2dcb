//! Pure convergence planning
//!
//! Turns a record plus the objects currently observed for it into the
//! list of corrective writes. The reconciler only fetches and executes;
//! every create/update/no-op decision is made here.

use crate::diff::{config_map_data_equal, deployment_needs_update, service_needs_update};
use crate::error::ConstructionError;
use crate::resources::configmap::build_config_map;
use crate::resources::deployment::{build_deployment, update_deployment};
use crate::resources::service::{build_service, update_service};
use crds::{Proxy, ProxyConfig, ProxyConfigStatus, ProxyPhase, ProxyStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

/// Corrective write for a ProxyConfig
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyConfigAction {
    /// Create the missing ConfigMap
    CreateConfigMap(ConfigMap),
    /// Replace the drifted ConfigMap
    UpdateConfigMap(ConfigMap),
    /// Write the ProxyConfig status
    UpdateStatus(ProxyConfigStatus),
}

impl ProxyConfigAction {
    /// Short label used when reporting what a pass applied
    pub fn describe(&self) -> &'static str {
        match self {
            ProxyConfigAction::CreateConfigMap(_) => "create ConfigMap",
            ProxyConfigAction::UpdateConfigMap(_) => "update ConfigMap",
            ProxyConfigAction::UpdateStatus(_) => "update ProxyConfig status",
        }
    }
}

/// Corrective write for a Proxy
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyAction {
    /// Create the missing Deployment
    CreateDeployment(Deployment),
    /// Replace the drifted Deployment
    UpdateDeployment(Deployment),
    /// Create the missing Service
    CreateService(Service),
    /// Replace the drifted Service
    UpdateService(Service),
    /// Write the Proxy status
    UpdateStatus(ProxyStatus),
}

impl ProxyAction {
    /// Short label used when reporting what a pass applied
    pub fn describe(&self) -> &'static str {
        match self {
            ProxyAction::CreateDeployment(_) => "create Deployment",
            ProxyAction::UpdateDeployment(_) => "update Deployment",
            ProxyAction::CreateService(_) => "create Service",
            ProxyAction::UpdateService(_) => "update Service",
            ProxyAction::UpdateStatus(_) => "update Proxy status",
        }
    }
}

/// Status a ProxyConfig should carry
pub fn desired_proxy_config_status(config: &ProxyConfig) -> ProxyConfigStatus {
    ProxyConfigStatus {
        metadata_repository: config.spec.cluster_config.repository.type_.to_string(),
    }
}

/// Plans one ProxyConfig pass.
///
/// - no ConfigMap: create it, then always refresh the status
/// - ConfigMap data differs structurally: update it in place
/// - status empty or naming another repository kind: update it
///
/// The last two are independent and can both happen in one pass.
pub fn plan_proxy_config(
    config: &ProxyConfig,
    observed: Option<&ConfigMap>,
) -> Result<Vec<ProxyConfigAction>, ConstructionError> {
    let desired = build_config_map(config)?;
    let status = desired_proxy_config_status(config);

    let Some(observed) = observed else {
        return Ok(vec![
            ProxyConfigAction::CreateConfigMap(desired),
            ProxyConfigAction::UpdateStatus(status),
        ]);
    };

    let mut actions = Vec::new();
    if !config_map_data_equal(&desired, observed) {
        let mut updated = observed.clone();
        updated.data = desired.data;
        actions.push(ProxyConfigAction::UpdateConfigMap(updated));
    }
    if config.metadata_repository_is_stale() {
        actions.push(ProxyConfigAction::UpdateStatus(status));
    }
    Ok(actions)
}

/// Status a Proxy should carry given its observed Deployment
pub fn desired_proxy_status(observed: Option<&Deployment>) -> ProxyStatus {
    let ready_nodes = observed
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ProxyStatus {
        phase: if ready_nodes > 0 { ProxyPhase::Ready } else { ProxyPhase::NotReady },
        ready_nodes,
    }
}

/// Plans one Proxy pass: create-or-update-or-skip for the Deployment and
/// the Service, then a status write only when it changed.
pub fn plan_proxy(
    proxy: &Proxy,
    deployment: Option<&Deployment>,
    service: Option<&Service>,
) -> Result<Vec<ProxyAction>, ConstructionError> {
    let desired_deployment = build_deployment(proxy)?;
    let desired_service = build_service(proxy)?;
    let mut actions = Vec::new();

    match deployment {
        None => actions.push(ProxyAction::CreateDeployment(desired_deployment)),
        Some(observed) if deployment_needs_update(&desired_deployment, observed) => {
            actions.push(ProxyAction::UpdateDeployment(update_deployment(proxy, observed)?));
        }
        Some(_) => {}
    }

    match service {
        None => actions.push(ProxyAction::CreateService(desired_service)),
        Some(observed) if service_needs_update(&desired_service, observed) => {
            actions.push(ProxyAction::UpdateService(update_service(proxy, observed)?));
        }
        Some(_) => {}
    }

    let status = desired_proxy_status(deployment);
    if proxy.status.as_ref() != Some(&status) {
        actions.push(ProxyAction::UpdateStatus(status));
    }
    Ok(actions)
}
