//! ProxyConfig reconciler
//!
//! Handles: ProxyConfig -> ConfigMap (`server.yaml`) and
//! `status.metadataRepository`

use super::{optional, ReconcileOutcome, Reconciler};
use crate::error::ControllerError;
use crate::plan::{plan_proxy_config, ProxyConfigAction};
use tracing::debug;

impl Reconciler {
    /// Reconciles the ProxyConfig `namespace/name`.
    pub async fn reconcile_proxy_config(&self, namespace: &str, name: &str) -> ReconcileOutcome {
        match self.converge_proxy_config(namespace, name).await {
            Ok(outcome) => outcome,
            Err(e) => self.failed(e),
        }
    }

    async fn converge_proxy_config(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome, ControllerError> {
        let Some(config) = optional(self.store.get_proxy_config(namespace, name).await)? else {
            return Ok(ReconcileOutcome::Gone);
        };
        let observed = optional(self.store.get_config_map(namespace, name).await)?;

        let actions = plan_proxy_config(&config, observed.as_ref())?;
        let mut applied = Vec::with_capacity(actions.len());
        for action in &actions {
            debug!(namespace, name, kind = "ProxyConfig", action = action.describe(), "Applying");
            match action {
                ProxyConfigAction::CreateConfigMap(config_map) => {
                    self.store.create_config_map(config_map).await?;
                }
                ProxyConfigAction::UpdateConfigMap(config_map) => {
                    self.store.update_config_map(config_map).await?;
                }
                ProxyConfigAction::UpdateStatus(status) => {
                    self.store.update_proxy_config_status(namespace, name, status).await?;
                }
            }
            applied.push(action.describe());
        }
        Ok(ReconcileOutcome::Converged { applied })
    }
}
