//! NodeClaim CRD
//!
//! Karpenter's request for a single node. The provisioner reads the name,
//! labels, requirements, taints and resource requests; the status fields
//! are written by Karpenter once the node registers.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Well-known label holding the VM size
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";

/// Karpenter label holding `spot` or `on-demand`
pub const LABEL_CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";

/// Karpenter label naming the owning NodePool
pub const LABEL_NODEPOOL: &str = "karpenter.sh/nodepool";

/// Capacity type value for spot VMs
pub const CAPACITY_TYPE_SPOT: &str = "spot";
/// Capacity type value for regular VMs
pub const CAPACITY_TYPE_ON_DEMAND: &str = "on-demand";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "karpenter.sh",
    version = "v1",
    kind = "NodeClaim",
    status = "NodeClaimStatus"
)]
/// Desired shape of the node
#[serde(rename_all = "camelCase")]
pub struct NodeClaimSpec {
    /// Scheduling requirements the launched node must satisfy
    #[serde(default)]
    pub requirements: Vec<NodeSelectorRequirementWithMinValues>,

    /// Minimum resources the node must provide
    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Taints applied to the node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,

    /// Taints removed by daemons once the node is initialized
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub startup_taints: Vec<Taint>,

    /// NodeClass holding provider-specific settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_class_ref: Option<NodeClassReference>,

    /// Lifetime after which Karpenter replaces the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<String>,

    /// Upper bound on node drain time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period: Option<String>,
}

/// A node selector requirement with an optional `minValues` flexibility bound
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorRequirementWithMinValues {
    /// Label key
    pub key: String,
    /// `In`, `NotIn`, `Exists`, `DoesNotExist`, `Gt` or `Lt`
    pub operator: String,
    /// Values the operator applies to
    #[serde(default)]
    pub values: Vec<String>,
    /// Minimum number of distinct values that must stay satisfiable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_values: Option<i32>,
}

impl NodeSelectorRequirementWithMinValues {
    /// Whether this is an `In` requirement on `key`
    pub fn is_in(&self, key: &str) -> bool {
        self.key == key && self.operator == "In"
    }
}

/// Resource requests for the node
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Quantities keyed by resource name (`cpu`, `memory`, `storage`, ...)
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

/// A taint placed on the node
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Taint {
    /// Taint key
    pub key: String,
    /// Taint value, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// `NoSchedule`, `PreferNoSchedule` or `NoExecute`
    pub effect: String,
}

/// Reference to the NodeClass object
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeClassReference {
    /// API group of the NodeClass
    pub group: String,
    /// Kind of the NodeClass
    pub kind: String,
    /// Name of the NodeClass
    pub name: String,
}

/// Observed state of the NodeClaim
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeClaimStatus {
    /// Cloud provider ID of the launched node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Name of the registered node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    /// Image the node booted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,

    /// Total node resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capacity: BTreeMap<String, String>,

    /// Resources available for pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocatable: BTreeMap<String, String>,

    /// Lifecycle conditions set by Karpenter
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// A status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (`Launched`, `Registered`, `Initialized`, ...)
    #[serde(rename = "type")]
    pub condition_type: String,
    /// `True`, `False` or `Unknown`
    pub status: String,
    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the status last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl NodeClaim {
    /// Values allowed for `key`, sorted
    ///
    /// `In` requirements on the same key intersect and `NotIn` values are
    /// removed. Empty when no `In` requirement constrains the key.
    pub fn requirement_values(&self, key: &str) -> Vec<&str> {
        let mut allowed: Option<BTreeSet<&str>> = None;
        for requirement in self.spec.requirements.iter().filter(|r| r.is_in(key)) {
            let values: BTreeSet<&str> = requirement.values.iter().map(String::as_str).collect();
            allowed = Some(match allowed {
                Some(current) => current.intersection(&values).copied().collect(),
                None => values,
            });
        }

        let mut allowed = allowed.unwrap_or_default();
        for requirement in self
            .spec
            .requirements
            .iter()
            .filter(|r| r.key == key && r.operator == "NotIn")
        {
            for value in &requirement.values {
                allowed.remove(value.as_str());
            }
        }
        allowed.into_iter().collect()
    }
}
