//! Instance provider contract shared by both backends

use crate::backoff::Backoff;
use crate::error::ProviderError;
use crate::instance::Instance;
use agentpool_client::{ArmError, PollOptions};
use async_trait::async_trait;
use crds::{LABEL_INSTANCE_TYPE, NodeClaim};
use std::collections::BTreeSet;

/// Error text returned when a create for the same pool is already running.
///
/// Known fragility: this is an English message from the service, not an
/// error code, and matching breaks if the wording changes.
const CREATE_IN_PROGRESS: &str =
    "Operation is not allowed because there's an in progress create node pool operation";

/// Agent pool lifecycle operations for one cluster
#[async_trait]
pub trait InstanceProvider: Send + Sync {
    /// Create the agent pool for `node_claim` and wait for its node
    async fn create(&self, node_claim: &NodeClaim) -> Result<Instance, ProviderError>;

    /// Look up an instance by the provider ID of its node
    async fn get(&self, id: &str) -> Result<Instance, ProviderError>;

    /// Every agent pool owned by the provisioner.
    ///
    /// Returns `NotFound` when there is nothing to list; see
    /// [`ignore_not_found`](crate::error::ignore_not_found).
    async fn list(&self) -> Result<Vec<Instance>, ProviderError>;

    /// Delete an agent pool by name. Deleting an absent pool succeeds.
    async fn delete(&self, name: &str) -> Result<(), ProviderError>;
}

/// Polling and retry budgets used by the providers
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Long-running operation polling
    pub poll: PollOptions,
    /// Node convergence after create
    pub convergence: Backoff,
    /// Retries of each node list call
    pub node_list_retry: Backoff,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            poll: PollOptions::default(),
            convergence: Backoff::convergence(),
            node_list_retry: Backoff::node_list_retry(),
        }
    }
}

/// Whether a create failed because the same create is already in flight
///
/// This happens when the process restarts part-way through a create.
pub fn is_already_in_progress(err: &ArmError) -> bool {
    err.to_string().contains(CREATE_IN_PROGRESS)
}

/// VM size to request for `node_claim`
///
/// The first (sorted) instance type the NodeClaim's requirements allow.
pub fn select_instance_type(node_claim: &NodeClaim) -> Result<String, ProviderError> {
    let values: BTreeSet<&str> = node_claim
        .requirement_values(LABEL_INSTANCE_TYPE)
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect();
    values
        .into_iter()
        .next()
        .map(str::to_string)
        .ok_or(ProviderError::MissingInstanceType)
}

/// Name of the NodeClaim (empty when unset)
pub(crate) fn node_claim_name(node_claim: &NodeClaim) -> &str {
    node_claim.metadata.name.as_deref().unwrap_or_default()
}
