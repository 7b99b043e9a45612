//! Provider configuration
//!
//! Built once at startup from the environment and passed by reference to the
//! factory; provider code never reads the environment itself.

use crate::error::ProviderError;
use std::fmt;
use std::str::FromStr;

/// Environment variable for the Azure region
pub const ENV_LOCATION: &str = "LOCATION";
/// Environment variable for the cluster resource group
pub const ENV_RESOURCE_GROUP: &str = "ARM_RESOURCE_GROUP";
/// Environment variable for the Entra ID tenant
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Environment variable for the identity client ID
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable for the cluster name
pub const ENV_CLUSTER_NAME: &str = "AZURE_CLUSTER_NAME";
/// Environment variable for the cluster subscription
pub const ENV_SUBSCRIPTION_ID: &str = "ARM_SUBSCRIPTION_ID";
/// Environment variable for the deployment mode
pub const ENV_DEPLOYMENT_MODE: &str = "DEPLOYMENT_MODE";
/// Environment variable for the provider type
pub const ENV_PROVIDER_TYPE: &str = "AZURE_PROVIDER_TYPE";
/// Environment variable for the agent pool subnet
pub const ENV_VNET_SUBNET_ID: &str = "AZURE_VNET_SUBNET_ID";
/// Environment variable for the projected token path
pub const ENV_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
/// Environment variable for the authority host
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
/// Environment variable for the end-to-end test switch
pub const ENV_E2E_TEST_MODE: &str = "E2E_TEST_MODE";

/// Entra ID authority used when none is configured
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";

/// Deployment mode that authenticates with the node's managed identity
pub const DEPLOYMENT_MODE_MANAGED: &str = "managed";

/// Backend the provisioner talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderType {
    /// Managed clusters
    #[default]
    Aks,
    /// Arc-connected clusters
    Arc,
}

impl ProviderType {
    /// Every supported provider type
    pub const ALL: [ProviderType; 2] = [ProviderType::Aks, ProviderType::Arc];

    /// Name used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Aks => "aks",
            ProviderType::Arc => "arc",
        }
    }

    /// Whether `value` names a supported provider type (case-sensitive)
    pub fn is_valid(value: &str) -> bool {
        value.parse::<ProviderType>().is_ok()
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aks" => Ok(ProviderType::Aks),
            "arc" => Ok(ProviderType::Arc),
            other => Err(ProviderError::UnsupportedProviderType(other.to_string())),
        }
    }
}

/// Settings shared by both providers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderConfig {
    /// Azure region
    pub location: String,
    /// Resource group of the cluster
    pub resource_group: String,
    /// Entra ID tenant
    pub tenant_id: String,
    /// Client ID of the workload or user-assigned managed identity
    pub user_assigned_identity_id: String,
    /// Name of the cluster
    pub cluster_name: String,
    /// Subscription of the cluster
    pub subscription_id: String,
    /// `managed` for managed identity, anything else for workload identity
    pub deployment_mode: String,
    /// `aks` or `arc`
    pub provider_type: String,
    /// Subnet for new managed agent pools
    pub vnet_subnet_id: Option<String>,
    /// Projected service account token for workload identity
    pub federated_token_file: String,
    /// Entra ID authority host
    pub authority_host: String,
    /// Route connected-cluster requests to the end-to-end test RP
    pub e2e_test_mode: bool,
}

impl ProviderConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            location: var(ENV_LOCATION),
            resource_group: var(ENV_RESOURCE_GROUP),
            tenant_id: var(ENV_TENANT_ID),
            user_assigned_identity_id: var(ENV_CLIENT_ID),
            cluster_name: var(ENV_CLUSTER_NAME),
            subscription_id: var(ENV_SUBSCRIPTION_ID),
            deployment_mode: var(ENV_DEPLOYMENT_MODE),
            provider_type: non_empty(ENV_PROVIDER_TYPE).unwrap_or_else(|| ProviderType::Aks.to_string()),
            vnet_subnet_id: non_empty(ENV_VNET_SUBNET_ID),
            federated_token_file: var(ENV_FEDERATED_TOKEN_FILE),
            authority_host: non_empty(ENV_AUTHORITY_HOST).unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            e2e_test_mode: lookup(ENV_E2E_TEST_MODE)
                .and_then(|v| parse_bool(&v))
                .unwrap_or(false),
        }
    }

    /// Trim surrounding whitespace from the identifier fields
    pub fn trim_space(&mut self) {
        for field in [
            &mut self.location,
            &mut self.resource_group,
            &mut self.tenant_id,
            &mut self.user_assigned_identity_id,
            &mut self.cluster_name,
            &mut self.subscription_id,
            &mut self.deployment_mode,
            &mut self.provider_type,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
        if let Some(subnet) = self.vnet_subnet_id.as_mut() {
            *subnet = subnet.trim().to_string();
        }
    }

    /// Check the required fields and the provider type
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.subscription_id.is_empty() {
            return Err(ProviderError::InvalidConfig("subscription ID not set".to_string()));
        }
        if self.tenant_id.is_empty() {
            return Err(ProviderError::InvalidConfig("tenant ID not set".to_string()));
        }
        if !ProviderType::is_valid(&self.provider_type) {
            return Err(ProviderError::InvalidConfig(format!(
                "invalid provider type: {}, must be 'aks' or 'arc'",
                self.provider_type
            )));
        }
        Ok(())
    }

    /// Whether credentials come from the managed identity endpoint
    pub fn uses_managed_identity(&self) -> bool {
        self.deployment_mode == DEPLOYMENT_MODE_MANAGED
    }
}

/// Boolean parsing with the usual `1/t/true` and `0/f/false` spellings
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
