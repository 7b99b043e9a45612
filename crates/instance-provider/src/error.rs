//! Instance provider errors

use agentpool_client::ArmError;
use thiserror::Error;

/// Errors surfaced by the instance providers and the provider factory
#[derive(Debug, Error)]
pub enum ProviderError {
    /// NodeClaim name cannot be used as an agent pool name
    #[error("agentpool name({0}) is invalid, must match regex pattern: ^[a-z][a-z0-9]{{0,11}}$")]
    InvalidName(String),

    /// NodeClaim has no `node.kubernetes.io/instance-type` requirement
    #[error("nodeClaim spec has no requirement for instance type")]
    MissingInstanceType,

    /// NodeClaim content cannot be turned into an agent pool
    #[error("invalid nodeClaim {name}: {reason}")]
    InvalidNodeClaim { name: String, reason: String },

    /// Agent pool or instance does not exist
    #[error("nodeclaim not found: {0}")]
    NotFound(String),

    /// Backend request failed; `operation` names the call and the pool
    #[error("{operation} failed: {source}")]
    Backend {
        operation: String,
        #[source]
        source: ArmError,
    },

    /// Agent pool was accepted but its node never became ready
    #[error("agent pool {agent_pool} did not converge after {attempts} attempts: {reason}")]
    ConvergenceTimeout {
        agent_pool: String,
        attempts: u32,
        reason: String,
    },

    /// Provider type name is neither `aks` nor `arc`
    #[error("unsupported provider type: {0}")]
    UnsupportedProviderType(String),

    /// Authenticated backend client could not be constructed
    #[error("creating {backend} client: {source}")]
    ClientBootstrap {
        backend: &'static str,
        #[source]
        source: ArmError,
    },

    /// Required setting missing or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Provider ID does not identify an agent pool VM
    #[error("getting agentpool name, {0}")]
    InvalidId(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl ProviderError {
    /// Wrap a backend failure with the operation that produced it
    pub fn backend(operation: impl Into<String>, source: ArmError) -> Self {
        ProviderError::Backend {
            operation: operation.into(),
            source,
        }
    }

    /// Whether the error means "nothing there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

/// Turn a NotFound result into an empty success
pub fn ignore_not_found<T: Default>(result: Result<T, ProviderError>) -> Result<T, ProviderError> {
    match result {
        Err(e) if e.is_not_found() => Ok(T::default()),
        other => other,
    }
}
