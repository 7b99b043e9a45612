//! In-memory node lister and fixtures for provider tests

use crate::error::ProviderError;
use crate::nodes::NodeLister;
use async_trait::async_trait;
use crds::NodeClaim;
use k8s_openapi::api::core::v1::Node;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};

/// Node lister backed by a shared vector
///
/// Clones share state, so a test can add nodes while a provider is waiting.
#[derive(Debug, Clone, Default)]
pub struct MockNodeLister {
    nodes: Arc<Mutex<Vec<Node>>>,
    failures_left: Arc<Mutex<u32>>,
    calls: Arc<Mutex<u32>>,
    /// Add this node after the given number of list calls
    deferred: Arc<Mutex<Vec<(u32, Node)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MockNodeLister {
    /// Lister with no nodes
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `node` from now on
    pub fn add(&self, node: Node) {
        lock(&self.nodes).push(node);
    }

    /// Make `node` visible once `calls` list requests have been served
    pub fn add_after_calls(&self, calls: u32, node: Node) {
        lock(&self.deferred).push((calls, node));
    }

    /// Fail the next `count` list requests
    pub fn fail_next(&self, count: u32) {
        *lock(&self.failures_left) = count;
    }

    /// Number of list requests served so far, failures included
    pub fn calls(&self) -> u32 {
        *lock(&self.calls)
    }
}

#[async_trait]
impl NodeLister for MockNodeLister {
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ProviderError> {
        let calls = {
            let mut calls = lock(&self.calls);
            *calls += 1;
            *calls
        };

        {
            let mut failures = lock(&self.failures_left);
            if *failures > 0 {
                *failures -= 1;
                return Err(ProviderError::Kube(kube::Error::Service(Box::new(
                    std::io::Error::other("node list unavailable"),
                ))));
            }
        }

        {
            let mut deferred = lock(&self.deferred);
            let (ready, pending): (Vec<_>, Vec<_>) = deferred.drain(..).partition(|(after, _)| *after < calls);
            *deferred = pending;
            lock(&self.nodes).extend(ready.into_iter().map(|(_, node)| node));
        }

        let (key, value) = label_selector.split_once('=').unwrap_or((label_selector, ""));
        Ok(lock(&self.nodes)
            .iter()
            .filter(|node| {
                node.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(key))
                    .is_some_and(|v| v == value)
            })
            .cloned()
            .collect())
    }
}

/// Node fixture with `labels` and an optional provider ID
pub fn node(name: &str, labels: &[(&str, &str)], provider_id: Option<&str>) -> Node {
    let labels: serde_json::Map<String, serde_json::Value> = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), json!(v)))
        .collect();
    let mut spec = serde_json::Map::new();
    if let Some(id) = provider_id {
        spec.insert("providerID".to_string(), json!(id));
    }

    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": {"name": name, "labels": labels},
        "spec": spec,
    }))
    .unwrap_or_default()
}

/// NodeClaim fixture requesting `instance_types`
pub fn node_claim(name: &str, instance_types: &[&str], labels: &[(&str, &str)]) -> NodeClaim {
    let labels: serde_json::Map<String, serde_json::Value> = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), json!(v)))
        .collect();

    node_claim_from(json!({
        "metadata": {"name": name, "labels": labels, "creationTimestamp": "2024-05-01T10:20:30Z"},
        "spec": {
            "requirements": [
                {"key": crds::LABEL_INSTANCE_TYPE, "operator": "In", "values": instance_types}
            ]
        }
    }))
}

/// NodeClaim from a partial document (`metadata` and `spec`)
pub fn node_claim_from(mut doc: serde_json::Value) -> NodeClaim {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("apiVersion".to_string(), json!("karpenter.sh/v1"));
        obj.insert("kind".to_string(), json!("NodeClaim"));
        obj.entry("spec").or_insert_with(|| json!({}));
    }
    serde_json::from_value(doc).unwrap_or_else(|_| NodeClaim::new("invalid", Default::default()))
}
