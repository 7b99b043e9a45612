//! GPU Provisioner
//!
//! Backs Karpenter NodeClaims with single-node agent pools on a managed
//! cluster (`aks`) or an Arc-connected provisioned cluster (`arc`).
//!
//! At startup the process reads and validates its configuration, builds the
//! instance provider for the configured backend and then runs the orphan
//! agent pool collector until it is interrupted.

mod controller;
mod error;

use anyhow::{Context, Result};
use controller::GarbageCollector;
use crds::NodeClaim;
use instance_provider::{NodeLister, ProviderConfig, ProviderFactory};
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting GPU Provisioner");

    let mut config = ProviderConfig::from_env();
    config.trim_space();
    if let Err(e) = config.validate() {
        error!("Configuration is invalid: {}", e);
        return Err(e).context("validating configuration");
    }

    info!("Configuration:");
    info!("  Provider type: {}", config.provider_type);
    info!("  Subscription: {}", config.subscription_id);
    info!("  Resource group: {}", config.resource_group);
    info!("  Cluster: {}", config.cluster_name);
    info!("  Location: {}", config.location);
    info!("  Deployment mode: {}", config.deployment_mode);

    let kube_client = Client::try_default()
        .await
        .context("creating Kubernetes client")?;
    let nodes: Arc<dyn NodeLister> = Arc::new(Api::<Node>::all(kube_client.clone()));

    let factory = ProviderFactory::new(config, nodes)?;
    let provider = factory
        .create_configured_provider()
        .context("creating instance provider")?;
    info!("✅ Instance provider ready");

    let node_claims: Api<NodeClaim> = Api::all(kube_client);
    let collector = GarbageCollector::new(provider, node_claims);

    tokio::select! {
        () = collector.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for shutdown signal")?;
            info!("Shutdown signal received, stopping");
        }
    }

    Ok(())
}
