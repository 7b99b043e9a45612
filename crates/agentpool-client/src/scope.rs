//! Parent resources that own agent pools

/// Addresses the agent pool collection of one cluster
pub trait AgentPoolScope {
    /// Path of the `agentPools` collection, relative to the ARM endpoint
    fn agent_pools_path(&self) -> String;

    /// Path of a single agent pool
    fn agent_pool_path(&self, name: &str) -> String {
        format!("{}/{}", self.agent_pools_path(), urlencoding::encode(name))
    }
}

/// A `Microsoft.ContainerService/managedClusters` cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedClusterScope {
    /// Subscription of the cluster
    pub subscription_id: String,
    /// Resource group of the cluster
    pub resource_group: String,
    /// Name of the `managedClusters` resource
    pub cluster_name: String,
}

impl ManagedClusterScope {
    /// Scope for the managed cluster `cluster_name`
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            cluster_name: cluster_name.into(),
        }
    }
}

impl AgentPoolScope for ManagedClusterScope {
    fn agent_pools_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}/agentPools",
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(&self.resource_group),
            urlencoding::encode(&self.cluster_name),
        )
    }
}

/// An Arc-connected cluster hosting a provisioned cluster instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedClusterScope {
    /// Subscription of the connected cluster
    pub subscription_id: String,
    /// Resource group of the connected cluster
    pub resource_group: String,
    /// Name of the `connectedClusters` resource
    pub cluster_name: String,
}

impl ConnectedClusterScope {
    /// Scope for the connected cluster `cluster_name`
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            cluster_name: cluster_name.into(),
        }
    }

    /// ARM resource URI of the connected cluster
    pub fn resource_uri(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Kubernetes/connectedClusters/{}",
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(&self.resource_group),
            urlencoding::encode(&self.cluster_name),
        )
    }
}

impl AgentPoolScope for ConnectedClusterScope {
    fn agent_pools_path(&self) -> String {
        format!(
            "{}/providers/Microsoft.HybridContainerService/provisionedClusterInstances/default/agentPools",
            self.resource_uri()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_cluster_paths() {
        let scope = ManagedClusterScope::new("sub-1", "rg-1", "aks-1");
        assert_eq!(
            scope.agent_pool_path("gpu1"),
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.ContainerService/managedClusters/aks-1/agentPools/gpu1"
        );
    }

    #[test]
    fn test_connected_cluster_paths() {
        let scope = ConnectedClusterScope::new("sub-1", "rg-1", "arc-1");
        assert_eq!(
            scope.resource_uri(),
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Kubernetes/connectedClusters/arc-1"
        );
        assert_eq!(
            scope.agent_pool_path("gpu1"),
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Kubernetes/connectedClusters/arc-1/providers/Microsoft.HybridContainerService/provisionedClusterInstances/default/agentPools/gpu1"
        );
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let managed = ManagedClusterScope::new("sub 1", "rg/1", "aks");
        let connected = ConnectedClusterScope::new("sub 1", "rg/1", "arc");
        assert!(managed.agent_pools_path().starts_with("/subscriptions/sub%201/resourceGroups/rg%2F1/"));
        assert_eq!(
            connected.resource_uri(),
            "/subscriptions/sub%201/resourceGroups/rg%2F1/providers/Microsoft.Kubernetes/connectedClusters/arc"
        );
    }
}
