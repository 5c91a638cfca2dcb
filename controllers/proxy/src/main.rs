//! ShardingSphere Proxy Controller
//!
//! Converges ShardingSphere-Proxy CRDs into cluster objects:
//! - Proxy: Deployment (with optional MySQL driver bootstrap) and Service
//! - ProxyConfig: ConfigMap with the rendered `server.yaml`
//!
//! Configuration comes from environment variables, see `ControllerConfig`.

mod config;
mod controller;
mod diff;
mod error;
mod plan;
mod reconciler;
mod resources;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::{ControllerConfig, LogFormat};
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube's rustls-tls needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        anyhow::bail!("failed to install the rustls crypto provider");
    }

    let config = ControllerConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting ShardingSphere Proxy Controller");
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Requeue interval: {:?}", config.requeue_interval);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Debounce: {:?}", config.debounce);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
