//! Kubernetes node lookup for agent pools
//!
//! Nodes are matched by agent pool name on either the generic `agentpool`
//! label or the `kubernetes.azure.com/agentpool` label.

use crate::backoff::{retry_on_error, Backoff};
use crate::error::ProviderError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use std::collections::BTreeMap;
use tracing::debug;

/// Node label keys holding the agent pool name
pub const AGENT_POOL_NODE_LABELS: [&str; 2] = ["agentpool", "kubernetes.azure.com/agentpool"];

/// Read-only node listing
#[async_trait]
pub trait NodeLister: Send + Sync {
    /// Nodes matching an equality label selector (`key=value`)
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ProviderError>;
}

#[async_trait]
impl NodeLister for Api<Node> {
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ProviderError> {
        let list = self.list(&ListParams::default().labels(label_selector)).await?;
        Ok(list.items)
    }
}

/// Nodes carrying `agent_pool` under any agent pool label, deduplicated by name
///
/// Each list is retried on any error according to `backoff`.
pub async fn nodes_for_agent_pool(
    lister: &dyn NodeLister,
    agent_pool: &str,
    backoff: &Backoff,
) -> Result<Vec<Node>, ProviderError> {
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();

    for key in AGENT_POOL_NODE_LABELS {
        let selector = format!("{}={}", key, agent_pool);
        let found = retry_on_error(backoff, "list nodes", || lister.list_nodes(&selector)).await?;
        for node in found {
            let name = node.metadata.name.clone().unwrap_or_default();
            nodes.entry(name).or_insert(node);
        }
    }

    debug!("found {} node(s) for agent pool {}", nodes.len(), agent_pool);
    Ok(nodes.into_values().collect())
}

/// Provider ID of a node, if bound
pub fn provider_id(node: &Node) -> Option<&str> {
    node.spec
        .as_ref()
        .and_then(|spec| spec.provider_id.as_deref())
        .filter(|id| !id.is_empty())
}
