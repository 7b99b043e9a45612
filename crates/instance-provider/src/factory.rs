//! Provider factory
//!
//! Selects and builds the one instance provider a process runs with.

use crate::bootstrap;
use crate::config::{ProviderConfig, ProviderType};
use crate::connected::ConnectedProvider;
use crate::error::ProviderError;
use crate::managed::ManagedProvider;
use crate::nodes::NodeLister;
use crate::provider::InstanceProvider;
use agentpool_client::{ConnectedClusterScope, ManagedClusterScope};
use std::sync::Arc;
use tracing::info;

/// Supported provider type names
pub fn supported_provider_types() -> [ProviderType; 2] {
    ProviderType::ALL
}

/// Builds instance providers from a validated configuration
pub struct ProviderFactory {
    config: ProviderConfig,
    nodes: Arc<dyn NodeLister>,
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProviderFactory {
    /// Validate `config` and prepare a factory
    pub fn new(config: ProviderConfig, nodes: Arc<dyn NodeLister>) -> Result<Self, ProviderError> {
        config.validate()?;
        Ok(Self { config, nodes })
    }

    /// Validated configuration the factory builds from
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Provider for the configured provider type
    pub fn create_configured_provider(&self) -> Result<Arc<dyn InstanceProvider>, ProviderError> {
        self.create_provider(&self.config.provider_type)
    }

    /// Provider for `provider_type` (`aks` or `arc`)
    pub fn create_provider(&self, provider_type: &str) -> Result<Arc<dyn InstanceProvider>, ProviderError> {
        let provider_type: ProviderType = provider_type.parse()?;
        info!(provider_type = %provider_type, cluster = %self.config.cluster_name, "creating instance provider");

        match provider_type {
            ProviderType::Aks => {
                let client = bootstrap::managed_client(&self.config).map_err(|source| {
                    ProviderError::ClientBootstrap {
                        backend: "AKS",
                        source,
                    }
                })?;
                let scope = ManagedClusterScope::new(
                    &self.config.subscription_id,
                    &self.config.resource_group,
                    &self.config.cluster_name,
                );
                Ok(Arc::new(
                    ManagedProvider::new(Arc::new(client), Arc::clone(&self.nodes), scope)
                        .with_vnet_subnet_id(self.config.vnet_subnet_id.clone()),
                ))
            }
            ProviderType::Arc => {
                let client = bootstrap::connected_client(&self.config).map_err(|source| {
                    ProviderError::ClientBootstrap {
                        backend: "Arc",
                        source,
                    }
                })?;
                let scope = ConnectedClusterScope::new(
                    &self.config.subscription_id,
                    &self.config.resource_group,
                    &self.config.cluster_name,
                );
                Ok(Arc::new(ConnectedProvider::new(
                    Arc::new(client),
                    Arc::clone(&self.nodes),
                    scope,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNodeLister;

    fn config(provider_type: &str) -> ProviderConfig {
        ProviderConfig {
            subscription_id: "test-subscription".to_string(),
            tenant_id: "test-tenant".to_string(),
            resource_group: "test-rg".to_string(),
            cluster_name: "test-cluster".to_string(),
            deployment_mode: "managed".to_string(),
            provider_type: provider_type.to_string(),
            ..Default::default()
        }
    }

    fn nodes() -> Arc<dyn NodeLister> {
        Arc::new(MockNodeLister::new())
    }

    #[test]
    fn test_invalid_provider_type_fails_validation() {
        let err = ProviderFactory::new(config("invalid"), nodes()).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidConfig(_)));
        assert!(err.to_string().contains("invalid provider type: invalid"));
    }

    #[test]
    fn test_create_both_providers() {
        let factory = ProviderFactory::new(config("aks"), nodes()).unwrap();
        assert!(factory.create_configured_provider().is_ok());
        assert!(factory.create_provider("aks").is_ok());
        assert!(factory.create_provider("arc").is_ok());
    }

    #[test]
    fn test_unsupported_provider_type() {
        let factory = ProviderFactory::new(config("arc"), nodes()).unwrap();
        let err = factory.create_provider("invalid").err().unwrap();
        assert!(err.to_string().contains("unsupported provider type: invalid"));
    }

    #[test]
    fn test_client_failure_names_backend() {
        let mut cfg = config("arc");
        cfg.deployment_mode = "self-hosted".to_string();
        let factory = ProviderFactory::new(cfg, nodes()).unwrap();

        let err = factory.create_provider("arc").err().unwrap();
        assert!(err.to_string().starts_with("creating Arc client:"), "{err}");
        let err = factory.create_provider("aks").err().unwrap();
        assert!(err.to_string().starts_with("creating AKS client:"), "{err}");
    }

    #[test]
    fn test_supported_provider_types() {
        let names: Vec<_> = supported_provider_types().iter().map(ProviderType::as_str).collect();
        assert_eq!(names, vec!["aks", "arc"]);
    }
}
