//! Controller-specific error types.

use instance_provider::ProviderError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the GPU provisioner.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Instance provider error
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}
