//! Instance provider for Arc-connected clusters
//!
//! Hybrid agent pools report far less than managed ones: no tags, no subnet
//! and no image, and their state lives in `status.currentState`.

use crate::convergence::{classify, wait_for_node};
use crate::error::ProviderError;
use crate::instance::{flatten_labels, Instance};
use crate::labels::{agent_pool_labels, encode_taints, is_owned};
use crate::naming::{parse_agent_pool_name_from_id, validate_agent_pool_name};
use crate::nodes::{nodes_for_agent_pool, NodeLister};
use crate::provider::{
    is_already_in_progress, node_claim_name, select_instance_type, InstanceProvider, ProviderSettings,
};
use agentpool_client::{
    ops, AgentPoolsApi, ArmError, ConnectedClusterScope, HybridAgentPool, HybridAgentPoolProperties, OsType,
};
use async_trait::async_trait;
use chrono::Utc;
use crds::NodeClaim;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Hybrid agent pool client as a trait object
pub type HybridAgentPools = dyn AgentPoolsApi<Scope = ConnectedClusterScope, AgentPool = HybridAgentPool>;

/// Message of the hybrid RP's not-found responses, which do not always carry a 404
const AGENT_POOL_NOT_FOUND: &str = "Agent Pool not found";

/// Instance provider backed by Arc-connected cluster agent pools
pub struct ConnectedProvider {
    client: Arc<HybridAgentPools>,
    nodes: Arc<dyn NodeLister>,
    scope: ConnectedClusterScope,
    settings: ProviderSettings,
}

impl std::fmt::Debug for ConnectedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedProvider")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ConnectedProvider {
    /// Provider talking to `client` for the cluster at `scope`
    pub fn new(client: Arc<HybridAgentPools>, nodes: Arc<dyn NodeLister>, scope: ConnectedClusterScope) -> Self {
        Self {
            client,
            nodes,
            scope,
            settings: ProviderSettings::default(),
        }
    }

    /// Override polling and convergence budgets
    #[must_use]
    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Agent pool spec for `node_claim`
///
/// Hybrid pools take neither an OS disk size nor a pool type.
pub fn new_agent_pool(node_claim: &NodeClaim, vm_size: &str) -> HybridAgentPool {
    HybridAgentPool {
        properties: Some(HybridAgentPoolProperties {
            count: Some(1),
            vm_size: Some(vm_size.to_string()),
            os_type: Some(OsType::Linux),
            node_labels: Some(agent_pool_labels(node_claim, vm_size, Utc::now())),
            node_taints: Some(encode_taints(&node_claim.spec.taints)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Convert a hybrid agent pool into an [`Instance`]
pub fn to_instance(pool: &HybridAgentPool, id: Option<String>) -> Instance {
    let properties = pool.properties.as_ref();
    Instance {
        name: pool.name.clone(),
        id,
        instance_type: properties.and_then(|p| p.vm_size.clone()),
        state: properties
            .and_then(|p| p.status.as_ref())
            .and_then(|s| s.current_state.clone()),
        labels: flatten_labels(properties.and_then(|p| p.node_labels.as_ref())),
        image_id: None,
        capacity_type: None,
        subnet_id: None,
        tags: None,
    }
}

fn is_agent_pool_not_found(err: &ArmError) -> bool {
    err.is_not_found() || err.to_string().contains(AGENT_POOL_NOT_FOUND)
}

#[async_trait]
impl InstanceProvider for ConnectedProvider {
    async fn create(&self, node_claim: &NodeClaim) -> Result<Instance, ProviderError> {
        let name = node_claim_name(node_claim);
        info!(node_claim = %name, "connected.create");

        validate_agent_pool_name(name)?;
        let vm_size = select_instance_type(node_claim)?;
        let spec = new_agent_pool(node_claim, &vm_size);

        debug!("creating Arc agent pool {} ({})", name, vm_size);
        let pool = match ops::create_agent_pool(self.client.as_ref(), &self.scope, name, &spec, &self.settings.poll)
            .await
        {
            Ok(pool) => pool,
            Err(e) if is_already_in_progress(&e) => {
                info!(agent_pool = %name, "create already in progress, waiting for node");
                spec
            }
            Err(e) => {
                error!("failed to create arc agent pool for nodeclaim({}), {}", name, e);
                return Err(ProviderError::backend(
                    format!("hybridAgentPool.BeginCreateOrUpdate for {:?}", name),
                    e,
                ));
            }
        };

        let provider_id = wait_for_node(
            self.nodes.as_ref(),
            name,
            &self.settings.convergence,
            &self.settings.node_list_retry,
        )
        .await?;

        let mut instance = to_instance(&pool, Some(provider_id));
        instance.name.get_or_insert_with(|| name.to_string());
        Ok(instance)
    }

    async fn get(&self, id: &str) -> Result<Instance, ProviderError> {
        let name = parse_agent_pool_name_from_id(id)?;
        match ops::get_agent_pool(self.client.as_ref(), &self.scope, &name).await {
            Ok(pool) => Ok(to_instance(&pool, Some(id.to_string()))),
            Err(e) if is_agent_pool_not_found(&e) => Err(ProviderError::NotFound(e.to_string())),
            Err(e) => {
                error!("Get arc agentpool {:?} failed: {}", name, e);
                Err(ProviderError::backend(format!("hybridAgentPool.Get for {:?}", name), e))
            }
        }
    }

    async fn list(&self) -> Result<Vec<Instance>, ProviderError> {
        let pools = ops::list_agent_pools(self.client.as_ref(), &self.scope)
            .await
            .map_err(|e| {
                error!("Listing arc agentpools failed: {}", e);
                ProviderError::backend("hybridAgentPool.NewListPager", e)
            })?;

        let mut instances = Vec::new();
        for pool in &pools {
            if !is_owned(pool.properties.as_ref().and_then(|p| p.node_labels.as_ref())) {
                continue;
            }
            let name = pool.name.as_deref().unwrap_or_default();
            let nodes = nodes_for_agent_pool(self.nodes.as_ref(), name, &self.settings.node_list_retry).await?;
            instances.push(to_instance(pool, classify(&nodes).ok()));
        }

        if instances.is_empty() {
            return Err(ProviderError::NotFound("agentpools not found".to_string()));
        }
        Ok(instances)
    }

    async fn delete(&self, name: &str) -> Result<(), ProviderError> {
        info!(agent_pool = %name, "connected.delete");
        ops::delete_agent_pool(self.client.as_ref(), &self.scope, name, &self.settings.poll)
            .await
            .map_err(|e| {
                error!("Deleting arc agentpool {:?} failed: {}", name, e);
                ProviderError::backend(format!("hybridAgentPool.Delete for {:?}", name), e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Backoff;
    use crate::labels::LABEL_MACHINE_TYPE;
    use crate::mock::{node, node_claim, MockNodeLister};
    use agentpool_client::{HybridAgentPoolStatus, MockHybridAgentPools};
    use std::collections::HashMap;

    const GPU1_ID: &str = "azure:///subscriptions/sub/resourceGroups/mc_rg/providers/Microsoft.Compute/virtualMachineScaleSets/aks-gpu1-abcdef12-vmss/virtualMachines/3";

    fn scope() -> ConnectedClusterScope {
        ConnectedClusterScope::new("sub", "rg", "arc")
    }

    fn provider(client: &MockHybridAgentPools, nodes: &MockNodeLister) -> ConnectedProvider {
        ConnectedProvider::new(Arc::new(client.clone()), Arc::new(nodes.clone()), scope()).with_settings(
            ProviderSettings {
                convergence: Backoff::immediate(2),
                node_list_retry: Backoff::immediate(1),
                ..Default::default()
            },
        )
    }

    fn pool_with_labels(labels: &[(&str, &str)]) -> HybridAgentPool {
        HybridAgentPool {
            tags: Some(HashMap::from([("team".to_string(), Some("ml".to_string()))])),
            properties: Some(HybridAgentPoolProperties {
                vm_size: Some("Standard_NC4as_T4_v3".to_string()),
                node_labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), Some((*v).to_string())))
                        .collect(),
                ),
                status: Some(HybridAgentPoolStatus {
                    current_state: Some("Succeeded".to_string()),
                    error_message: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_submits_hybrid_spec() {
        let client = MockHybridAgentPools::new();
        let nodes = MockNodeLister::new();
        nodes.add_after_calls(
            2,
            node("moc-gpu1-0", &[("agentpool", "gpu1")], Some(GPU1_ID)),
        );

        let claim = node_claim("gpu1", &["Standard_NC4as_T4_v3"], &[("kaito.sh/ragengine", "rag")]);
        let instance = provider(&client, &nodes).create(&claim).await.unwrap();
        assert_eq!(instance.id.as_deref(), Some(GPU1_ID));

        let (_, spec) = &client.created()[0];
        let props = spec.properties.as_ref().unwrap();
        assert_eq!(props.count, Some(1));
        assert_eq!(props.os_type, Some(OsType::Linux));
        let labels = props.node_labels.as_ref().unwrap();
        assert_eq!(labels[LABEL_MACHINE_TYPE].as_deref(), Some("gpu"));
        assert_eq!(labels["kaito.sh/ragengine"].as_deref(), Some("rag"));
    }

    #[tokio::test]
    async fn test_create_recovers_in_progress_create() {
        let client = MockHybridAgentPools::new();
        client.fail_create(
            400,
            "BadRequest",
            "Operation is not allowed because there's an in progress create node pool operation",
        );
        let nodes = MockNodeLister::new();
        nodes.add(node("moc-gpu1-0", &[("kubernetes.azure.com/agentpool", "gpu1")], Some(GPU1_ID)));

        let claim = node_claim("gpu1", &["Standard_NC4as_T4_v3"], &[]);
        let instance = provider(&client, &nodes).create(&claim).await.unwrap();
        assert_eq!(instance.name.as_deref(), Some("gpu1"));
        assert_eq!(instance.instance_type.as_deref(), Some("Standard_NC4as_T4_v3"));
    }

    #[tokio::test]
    async fn test_conversion_leaves_unsupported_fields_unset() {
        let client = MockHybridAgentPools::new();
        client.insert(&scope(), "gpu1", pool_with_labels(&[("kaito.sh/workspace", "w")]));

        let instance = provider(&client, &MockNodeLister::new()).get(GPU1_ID).await.unwrap();
        assert_eq!(instance.state.as_deref(), Some("Succeeded"));
        assert_eq!(instance.instance_type.as_deref(), Some("Standard_NC4as_T4_v3"));
        assert!(instance.tags.is_none());
        assert!(instance.subnet_id.is_none());
        assert!(instance.image_id.is_none());
    }

    #[tokio::test]
    async fn test_get_maps_not_found_message() {
        let client = MockHybridAgentPools::new();
        client.fail_get(500, "InternalError", "Agent Pool not found: gpu1");
        let err = provider(&client, &MockNodeLister::new())
            .get(GPU1_ID)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        client.fail_get(500, "InternalError", "etcd timeout");
        let err = provider(&client, &MockNodeLister::new())
            .get(GPU1_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_by_ownership() {
        let client = MockHybridAgentPools::new();
        client.insert(
            &scope(),
            "gpu1",
            pool_with_labels(&[("kaito.sh/workspace", "w"), ("karpenter.sh/nodepool", "kaito")]),
        );
        client.insert(&scope(), "user", pool_with_labels(&[("karpenter.sh/nodepool", "kaito")]));
        client.insert(&scope(), "sys", HybridAgentPool::default());

        let nodes = MockNodeLister::new();
        nodes.add(node("moc-gpu1-0", &[("agentpool", "gpu1")], Some(GPU1_ID)));

        let instances = provider(&client, &nodes).list().await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name.as_deref(), Some("gpu1"));
        assert_eq!(instances[0].id.as_deref(), Some(GPU1_ID));
        assert!(instances[0].tags.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let client = MockHybridAgentPools::new();
        let provider = provider(&client, &MockNodeLister::new());
        provider.delete("gpu1").await.unwrap();
        provider.delete("gpu1").await.unwrap();
    }
}
