//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the cluster
//! store, the reconciler and the two watchers together:
//! - Proxy: converges into a Deployment and a Service
//! - ProxyConfig: converges into a ConfigMap holding `server.yaml`

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_store::ClusterStore;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for ShardingSphere proxy workloads.
#[derive(Debug)]
pub struct Controller {
    proxy_watcher: JoinHandle<Result<(), ControllerError>>,
    proxy_config_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts both watchers.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing ShardingSphere Proxy Controller");

        let kube_client = Client::try_default().await?;
        let store = ClusterStore::new(kube_client.clone());
        let reconciler = Arc::new(Reconciler::new(Box::new(store), config.requeue_interval));
        let watcher_instance = Arc::new(Watcher::new(reconciler, kube_client, config));

        let proxy_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move {
                watcher.watch_proxies().await
            })
        };

        let proxy_config_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move {
                watcher.watch_proxy_configs().await
            })
        };

        Ok(Self {
            proxy_watcher,
            proxy_config_watcher,
        })
    }

    /// Runs until either watcher exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("ShardingSphere Proxy Controller running");

        tokio::select! {
            result = &mut self.proxy_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Proxy watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Proxy watcher error: {}", e)))?;
            }
            result = &mut self.proxy_config_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("ProxyConfig watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("ProxyConfig watcher error: {}", e)))?;
            }
        }

        Err(ControllerError::Watch("watcher stopped unexpectedly".to_string()))
    }
}
