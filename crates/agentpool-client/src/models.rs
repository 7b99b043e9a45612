//! Agent pool resource models
//!
//! Field names follow the ARM JSON wire format (camelCase, with a handful of
//! explicit renames such as `osDiskSizeGB` and `vnetSubnetID`).

use crate::common::decode_json;
use crate::common::poller::OperationOutput;
use crate::error::ArmError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Operating system of the pool's nodes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OsType {
    /// Linux nodes
    #[default]
    Linux,
    /// Windows nodes
    Windows,
}

/// VM scale set priority for managed pools
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ScaleSetPriority {
    /// Evictable spot capacity
    Spot,
    /// Regular capacity
    #[default]
    Regular,
}

/// Eviction policy for spot pools
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScaleSetEvictionPolicy {
    /// Delete evicted nodes
    Delete,
    /// Stop and deallocate evicted nodes
    Deallocate,
}

/// Agent pool of a managed cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagedAgentPool {
    /// Full ARM resource ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Agent pool name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ARM resource type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Agent pool settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<ManagedAgentPoolProperties>,
}

/// Settings of a managed agent pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagedAgentPoolProperties {
    /// Number of nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
    /// VM size of every node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
    /// OS disk size in GiB
    #[serde(rename = "osDiskSizeGB", skip_serializing_if = "Option::is_none")]
    pub os_disk_size_gb: Option<i32>,
    /// Subnet the nodes join
    #[serde(rename = "vnetSubnetID", skip_serializing_if = "Option::is_none")]
    pub vnet_subnet_id: Option<String>,
    /// Node operating system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_type: Option<OsType>,
    /// `VirtualMachineScaleSets` or `AvailabilitySet`
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub pool_type: Option<String>,
    /// `System` or `User`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Node image the pool runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_image_version: Option<String>,
    /// ARM provisioning state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    /// Spot or regular capacity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_set_priority: Option<ScaleSetPriority>,
    /// What happens to evicted spot nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_set_eviction_policy: Option<ScaleSetEvictionPolicy>,
    /// `-1` caps the price at the on-demand price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_max_price: Option<f64>,
    /// Azure resource tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, Option<String>>>,
    /// Labels applied to every node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_labels: Option<HashMap<String, Option<String>>>,
    /// Taints applied to every node, as `key=value:effect`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_taints: Option<Vec<String>>,
}

/// Agent pool of an Arc-connected provisioned cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HybridAgentPool {
    /// Full ARM resource ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Agent pool name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ARM resource type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Resource tags live at the top level for hybrid pools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, Option<String>>>,
    /// Agent pool settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HybridAgentPoolProperties>,
}

/// Settings of a hybrid agent pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HybridAgentPoolProperties {
    /// Number of nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
    /// VM size of every node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
    /// Node operating system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_type: Option<OsType>,
    /// OS SKU (`CBLMariner`, ...)
    #[serde(rename = "osSKU", skip_serializing_if = "Option::is_none")]
    pub os_sku: Option<String>,
    /// Labels applied to every node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_labels: Option<HashMap<String, Option<String>>>,
    /// Taints applied to every node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_taints: Option<Vec<String>>,
    /// ARM provisioning state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    /// Observed pool state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HybridAgentPoolStatus>,
}

/// Observed state of a hybrid agent pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HybridAgentPoolStatus {
    /// Current state reported by the cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,
    /// Last error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Identity fields shared by both agent pool kinds
pub trait AgentPoolResource {
    fn resource_name(&self) -> Option<&str>;

    /// Set the server-assigned `id` and `name`
    fn assign_identity(&mut self, id: String, name: String);
}

impl AgentPoolResource for ManagedAgentPool {
    fn resource_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn assign_identity(&mut self, id: String, name: String) {
        self.id = Some(id);
        self.name = Some(name);
    }
}

impl AgentPoolResource for HybridAgentPool {
    fn resource_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn assign_identity(&mut self, id: String, name: String) {
        self.id = Some(id);
        self.name = Some(name);
    }
}

impl OperationOutput for ManagedAgentPool {
    fn from_body(body: &str) -> Result<Self, ArmError> {
        decode_json(body)
    }

    fn provisioning_state(&self) -> Option<&str> {
        self.properties.as_ref()?.provisioning_state.as_deref()
    }
}

impl OperationOutput for HybridAgentPool {
    fn from_body(body: &str) -> Result<Self, ArmError> {
        decode_json(body)
    }

    fn provisioning_state(&self) -> Option<&str> {
        self.properties.as_ref()?.provisioning_state.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_managed_pool_wire_names() {
        let pool = ManagedAgentPool {
            properties: Some(ManagedAgentPoolProperties {
                count: Some(1),
                vm_size: Some("Standard_NC6s_v3".to_string()),
                os_disk_size_gb: Some(100),
                vnet_subnet_id: Some("/subnets/a".to_string()),
                pool_type: Some("VirtualMachineScaleSets".to_string()),
                scale_set_priority: Some(ScaleSetPriority::Spot),
                ..Default::default()
            }),
            ..Default::default()
        };

        let value = serde_json::to_value(&pool).unwrap();
        assert_eq!(
            value,
            json!({
                "properties": {
                    "count": 1,
                    "vmSize": "Standard_NC6s_v3",
                    "osDiskSizeGB": 100,
                    "vnetSubnetID": "/subnets/a",
                    "type": "VirtualMachineScaleSets",
                    "scaleSetPriority": "Spot"
                }
            })
        );
    }

    #[test]
    fn test_hybrid_pool_decodes_status() {
        let pool = HybridAgentPool::from_body(
            r#"{
                "id": "/x/agentPools/gpu1",
                "name": "gpu1",
                "tags": {"team": "ml", "empty": null},
                "properties": {
                    "count": 1,
                    "vmSize": "Standard_NC4as_T4_v3",
                    "osType": "Linux",
                    "status": {"currentState": "Succeeded"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(pool.resource_name(), Some("gpu1"));
        let tags = pool.tags.unwrap();
        assert_eq!(tags.get("empty"), Some(&None));
        let props = pool.properties.unwrap();
        assert_eq!(props.os_type, Some(OsType::Linux));
        assert_eq!(props.status.unwrap().current_state.as_deref(), Some("Succeeded"));
    }
}
