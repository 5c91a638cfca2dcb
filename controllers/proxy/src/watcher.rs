//! Kubernetes resource watchers.
//!
//! This module handles watching `Proxy` and `ProxyConfig` records (and the
//! objects they own) and triggering reconciliation using
//! kube_runtime::Controller.
//!
//! Both watchers go through the generic `watch_resource()` helper, which is
//! also the single place reconcile outcomes are logged and turned into
//! requeue decisions.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crds::{Proxy, ProxyConfig};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{Controller, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Logs a reconcile outcome and maps it to the next scheduling step.
///
/// Only `Retry` requeues; everything else waits for the next change of the
/// record or of an owned object.
pub(crate) fn report(kind: &'static str, namespace: &str, name: &str, outcome: &ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Converged { applied } if applied.is_empty() => {
            debug!(kind, namespace, name, "Already converged");
            Action::await_change()
        }
        ReconcileOutcome::Converged { applied } => {
            info!(kind, namespace, name, applied = ?applied, "Converged");
            Action::await_change()
        }
        ReconcileOutcome::Gone => {
            info!(kind, namespace, name, "Record deleted, nothing to do");
            Action::await_change()
        }
        ReconcileOutcome::Retry { after, reason } => {
            warn!(kind, namespace, name, retry_in = ?after, %reason, "Reconciliation failed, will retry");
            Action::requeue(*after)
        }
        ReconcileOutcome::Fatal { reason } => {
            error!(kind, namespace, name, %reason, "Reconciliation failed until the record changes");
            Action::await_change()
        }
    }
}

/// Generic watcher helper around kube_runtime::Controller.
///
/// `reconcile_fn` receives the namespace and name of the triggering record;
/// the record itself is fetched fresh inside the reconciler.
async fn watch_resource<K, F, Fut>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    config: &ControllerConfig,
    kind: &'static str,
    reconcile_fn: F,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    F: Fn(Arc<Reconciler>, String, String) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ReconcileOutcome> + Send + 'static,
{
    info!(kind, "Starting watcher");

    let requeue_interval = reconciler.requeue_interval();
    let error_policy = move |obj: Arc<K>, error: &ControllerError, _ctx: Arc<Reconciler>| {
        error!(kind, name = %obj.name_any(), %error, "Reconciliation error");
        Action::requeue(requeue_interval)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let name = obj.name_any();
            let namespace = obj.namespace().ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{} {} has no namespace", kind, name))
            })?;
            let outcome = reconcile_fn(ctx, namespace.clone(), name.clone()).await;
            Ok::<_, ControllerError>(report(kind, &namespace, &name, &outcome))
        }
    };

    let runtime_config = RuntimeConfig::default()
        .debounce(config.debounce)
        .concurrency(config.concurrency);

    controller
        .with_config(runtime_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(move |res| async move {
            if let Err(e) = res {
                warn!(kind, error = %e, "Controller error");
            }
        })
        .await;

    Ok(())
}

/// Watches the proxy CRDs and their owned objects.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    config: ControllerConfig,
}

impl Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, client: Client, config: ControllerConfig) -> Self {
        Self { reconciler, client, config }
    }

    /// Api scoped to the watched namespace, or to all namespaces
    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        match &self.config.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Watches Proxy records, their Deployments and Services.
    pub async fn watch_proxies(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.api::<Proxy>(), watcher::Config::default())
            .owns(self.api::<Deployment>(), watcher::Config::default())
            .owns(self.api::<Service>(), watcher::Config::default());

        watch_resource(controller, self.reconciler.clone(), &self.config, "Proxy", |reconciler, namespace, name| async move {
            reconciler.reconcile_proxy(&namespace, &name).await
        })
        .await
    }

    /// Watches ProxyConfig records and their ConfigMaps.
    pub async fn watch_proxy_configs(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.api::<ProxyConfig>(), watcher::Config::default())
            .owns(self.api::<ConfigMap>(), watcher::Config::default());

        watch_resource(controller, self.reconciler.clone(), &self.config, "ProxyConfig", |reconciler, namespace, name| async move {
            reconciler.reconcile_proxy_config(&namespace, &name).await
        })
        .await
    }
}
