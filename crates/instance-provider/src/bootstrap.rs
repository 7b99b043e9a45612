//! Authenticated agent pool clients from configuration

use crate::config::ProviderConfig;
use agentpool_client::connected::e2e_options;
use agentpool_client::{
    ArmError, ClientOptions, HybridAgentPoolsClient, ManagedAgentPoolsClient, ManagedIdentityCredential,
    TokenCredential, WorkloadIdentityCredential,
};
use std::sync::Arc;
use tracing::info;

/// Credential for the configured deployment mode
pub fn credential(config: &ProviderConfig) -> Result<Arc<dyn TokenCredential>, ArmError> {
    if config.uses_managed_identity() {
        info!("using managed identity for Resource Manager access");
        let client_id = Some(config.user_assigned_identity_id.clone()).filter(|id| !id.is_empty());
        return Ok(Arc::new(ManagedIdentityCredential::new(client_id)?));
    }

    info!("using workload identity for Resource Manager access");
    Ok(Arc::new(WorkloadIdentityCredential::new(
        config.tenant_id.clone(),
        config.user_assigned_identity_id.clone(),
        config.federated_token_file.clone(),
        config.authority_host.clone(),
    )?))
}

/// Managed cluster client against the public Resource Manager endpoint
pub fn managed_client(config: &ProviderConfig) -> Result<ManagedAgentPoolsClient, ArmError> {
    ManagedAgentPoolsClient::new(credential(config)?, ClientOptions::default())
}

/// Hybrid client, routed to the test RP in end-to-end mode
pub fn connected_client(config: &ProviderConfig) -> Result<HybridAgentPoolsClient, ArmError> {
    let options = if config.e2e_test_mode {
        info!("E2E test mode: routing Arc requests to the test resource provider");
        e2e_options()
    } else {
        ClientOptions::default()
    };
    HybridAgentPoolsClient::new(credential(config)?, options)
}
