//! Proxy reconciler
//!
//! Handles: Proxy -> Deployment + Service, and `status.phase` /
//! `status.readyNodes` from the observed Deployment

use super::{optional, ReconcileOutcome, Reconciler};
use crate::error::ControllerError;
use crate::plan::{plan_proxy, ProxyAction};
use tracing::debug;

impl Reconciler {
    /// Reconciles the Proxy `namespace/name`.
    pub async fn reconcile_proxy(&self, namespace: &str, name: &str) -> ReconcileOutcome {
        match self.converge_proxy(namespace, name).await {
            Ok(outcome) => outcome,
            Err(e) => self.failed(e),
        }
    }

    async fn converge_proxy(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome, ControllerError> {
        let Some(proxy) = optional(self.store.get_proxy(namespace, name).await)? else {
            return Ok(ReconcileOutcome::Gone);
        };
        let deployment = optional(self.store.get_deployment(namespace, name).await)?;
        let service = optional(self.store.get_service(namespace, name).await)?;

        let actions = plan_proxy(&proxy, deployment.as_ref(), service.as_ref())?;
        let mut applied = Vec::with_capacity(actions.len());
        for action in &actions {
            debug!(namespace, name, kind = "Proxy", action = action.describe(), "Applying");
            match action {
                ProxyAction::CreateDeployment(deployment) => {
                    self.store.create_deployment(deployment).await?;
                }
                ProxyAction::UpdateDeployment(deployment) => {
                    self.store.update_deployment(deployment).await?;
                }
                ProxyAction::CreateService(service) => {
                    self.store.create_service(service).await?;
                }
                ProxyAction::UpdateService(service) => {
                    self.store.update_service(service).await?;
                }
                ProxyAction::UpdateStatus(status) => {
                    self.store.update_proxy_status(namespace, name, status).await?;
                }
            }
            applied.push(action.describe());
        }
        Ok(ReconcileOutcome::Converged { applied })
    }
}
