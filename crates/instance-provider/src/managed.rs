//! Instance provider for managed clusters

use crate::convergence::{classify, wait_for_node};
use crate::error::ProviderError;
use crate::instance::{flatten_labels, Instance};
use crate::labels::{agent_pool_labels, encode_taints, is_owned};
use crate::naming::{parse_agent_pool_name_from_id, validate_agent_pool_name};
use crate::nodes::{nodes_for_agent_pool, NodeLister};
use crate::provider::{
    is_already_in_progress, node_claim_name, select_instance_type, InstanceProvider, ProviderSettings,
};
use crate::quantity::parse_gib;
use agentpool_client::{
    ops, AgentPoolsApi, ManagedAgentPool, ManagedAgentPoolProperties, ManagedClusterScope, OsType,
    ScaleSetEvictionPolicy, ScaleSetPriority,
};
use async_trait::async_trait;
use chrono::Utc;
use crds::{CAPACITY_TYPE_ON_DEMAND, CAPACITY_TYPE_SPOT, LABEL_CAPACITY_TYPE, NodeClaim};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Managed cluster agent pool client as a trait object
pub type ManagedAgentPools = dyn AgentPoolsApi<Scope = ManagedClusterScope, AgentPool = ManagedAgentPool>;

const VMSS_POOL_TYPE: &str = "VirtualMachineScaleSets";

/// Instance provider backed by managed cluster agent pools
pub struct ManagedProvider {
    client: Arc<ManagedAgentPools>,
    nodes: Arc<dyn NodeLister>,
    scope: ManagedClusterScope,
    vnet_subnet_id: Option<String>,
    settings: ProviderSettings,
}

impl std::fmt::Debug for ManagedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProvider")
            .field("scope", &self.scope)
            .field("vnet_subnet_id", &self.vnet_subnet_id)
            .finish_non_exhaustive()
    }
}

impl ManagedProvider {
    /// Provider talking to `client` for the cluster at `scope`
    pub fn new(client: Arc<ManagedAgentPools>, nodes: Arc<dyn NodeLister>, scope: ManagedClusterScope) -> Self {
        Self {
            client,
            nodes,
            scope,
            vnet_subnet_id: None,
            settings: ProviderSettings::default(),
        }
    }

    /// Subnet new agent pools are placed in
    #[must_use]
    pub fn with_vnet_subnet_id(mut self, subnet_id: Option<String>) -> Self {
        self.vnet_subnet_id = subnet_id.filter(|s| !s.is_empty());
        self
    }

    /// Override polling and convergence budgets
    #[must_use]
    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn instance_for_listed_pool(&self, pool: &ManagedAgentPool) -> Result<Instance, ProviderError> {
        let name = pool.name.as_deref().unwrap_or_default();
        let nodes = nodes_for_agent_pool(self.nodes.as_ref(), name, &self.settings.node_list_retry).await?;
        Ok(to_instance(pool, classify(&nodes).ok()))
    }
}

/// Agent pool spec for `node_claim`
pub fn new_agent_pool(
    node_claim: &NodeClaim,
    vm_size: &str,
    vnet_subnet_id: Option<&str>,
) -> Result<ManagedAgentPool, ProviderError> {
    let mut properties = ManagedAgentPoolProperties {
        count: Some(1),
        vm_size: Some(vm_size.to_string()),
        os_type: Some(OsType::Linux),
        pool_type: Some(VMSS_POOL_TYPE.to_string()),
        node_labels: Some(agent_pool_labels(node_claim, vm_size, Utc::now())),
        node_taints: Some(encode_taints(&node_claim.spec.taints)),
        vnet_subnet_id: vnet_subnet_id.map(str::to_string),
        os_disk_size_gb: os_disk_size_gb(node_claim)?,
        ..Default::default()
    };

    if requires_spot(node_claim) {
        properties.scale_set_priority = Some(ScaleSetPriority::Spot);
        properties.scale_set_eviction_policy = Some(ScaleSetEvictionPolicy::Delete);
        properties.spot_max_price = Some(-1.0);
    }

    Ok(ManagedAgentPool {
        properties: Some(properties),
        ..Default::default()
    })
}

/// OS disk size from the `storage` request, in GiB
fn os_disk_size_gb(node_claim: &NodeClaim) -> Result<Option<i32>, ProviderError> {
    let Some(storage) = node_claim.spec.resources.requests.get("storage") else {
        return Ok(None);
    };

    let invalid = |reason: String| ProviderError::InvalidNodeClaim {
        name: node_claim_name(node_claim).to_string(),
        reason,
    };
    let gib = parse_gib(storage).ok_or_else(|| invalid(format!("invalid storage quantity {}", storage)))?;
    if gib == 0 {
        return Err(invalid(format!("storage size {} must be greater than 0Gi", storage)));
    }
    i32::try_from(gib)
        .map(Some)
        .map_err(|_| invalid(format!("storage size {} is too large", storage)))
}

/// Whether the capacity-type requirement allows nothing but spot
fn requires_spot(node_claim: &NodeClaim) -> bool {
    let values = node_claim.requirement_values(LABEL_CAPACITY_TYPE);
    !values.is_empty() && values.iter().all(|v| *v == CAPACITY_TYPE_SPOT)
}

/// Convert a managed agent pool into an [`Instance`]
pub fn to_instance(pool: &ManagedAgentPool, id: Option<String>) -> Instance {
    let properties = pool.properties.as_ref();
    Instance {
        name: pool.name.clone(),
        id,
        instance_type: properties.and_then(|p| p.vm_size.clone()),
        state: properties.and_then(|p| p.provisioning_state.clone()),
        image_id: properties.and_then(|p| p.node_image_version.clone()),
        capacity_type: properties.map(|p| {
            match p.scale_set_priority {
                Some(ScaleSetPriority::Spot) => CAPACITY_TYPE_SPOT,
                _ => CAPACITY_TYPE_ON_DEMAND,
            }
            .to_string()
        }),
        subnet_id: properties.and_then(|p| p.vnet_subnet_id.clone()),
        tags: properties.and_then(|p| p.tags.clone()),
        labels: flatten_labels(properties.and_then(|p| p.node_labels.as_ref())),
    }
}

#[async_trait]
impl InstanceProvider for ManagedProvider {
    async fn create(&self, node_claim: &NodeClaim) -> Result<Instance, ProviderError> {
        let name = node_claim_name(node_claim);
        info!(node_claim = %name, "managed.create");

        validate_agent_pool_name(name)?;
        let vm_size = select_instance_type(node_claim)?;
        let spec = new_agent_pool(node_claim, &vm_size, self.vnet_subnet_id.as_deref())?;

        debug!("creating agent pool {} ({})", name, vm_size);
        let pool = match ops::create_agent_pool(self.client.as_ref(), &self.scope, name, &spec, &self.settings.poll)
            .await
        {
            Ok(pool) => pool,
            Err(e) if is_already_in_progress(&e) => {
                info!(agent_pool = %name, "create already in progress, waiting for node");
                spec
            }
            Err(e) => {
                error!("failed to create agent pool for nodeclaim({}), {}", name, e);
                return Err(ProviderError::backend(
                    format!("agentPool.BeginCreateOrUpdate for {:?}", name),
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
            Err(e) if e.is_not_found() => Err(ProviderError::NotFound(e.to_string())),
            Err(e) => {
                error!("Get agentpool {:?} failed: {}", name, e);
                Err(ProviderError::backend(format!("agentPool.Get for {:?}", name), e))
            }
        }
    }

    async fn list(&self) -> Result<Vec<Instance>, ProviderError> {
        let pools = ops::list_agent_pools(self.client.as_ref(), &self.scope)
            .await
            .map_err(|e| {
                error!("Listing agentpools failed: {}", e);
                ProviderError::backend("agentPool.NewListPager", e)
            })?;

        let mut instances = Vec::new();
        for pool in pools
            .iter()
            .filter(|p| is_owned(p.properties.as_ref().and_then(|props| props.node_labels.as_ref())))
        {
            instances.push(self.instance_for_listed_pool(pool).await?);
        }

        if instances.is_empty() {
            return Err(ProviderError::NotFound("agentpools not found".to_string()));
        }
        Ok(instances)
    }

    async fn delete(&self, name: &str) -> Result<(), ProviderError> {
        info!(agent_pool = %name, "managed.delete");
        ops::delete_agent_pool(self.client.as_ref(), &self.scope, name, &self.settings.poll)
            .await
            .map_err(|e| {
                error!("Deleting agentpool {:?} failed: {}", name, e);
                ProviderError::backend(format!("agentPool.Delete for {:?}", name), e)
            })
    }
}
