//! Provenance labels and taint encoding for agent pools
//!
//! Every agent pool created from a NodeClaim carries the NodeClaim's labels
//! plus a nodepool marker, a machine class and a creation timestamp. The
//! timestamp is read back by the orphan collector in the controller.

use chrono::{DateTime, NaiveDateTime, Utc};
use crds::{LABEL_NODEPOOL, NodeClaim, Taint};
use std::collections::HashMap;

/// `gpu` or `cpu`, derived from the VM size
pub const LABEL_MACHINE_TYPE: &str = "kaito.sh/machine-type";

/// Creation time of the NodeClaim the pool was built from
pub const LABEL_CREATION_TIMESTAMP: &str = "kaito.sh/creation-timestamp";

/// Label-safe timestamp layout (no colons)
pub const CREATION_TIMESTAMP_LAYOUT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Labels set by the workloads that own agent pools
pub const WORKLOAD_LABELS: [&str; 2] = ["kaito.sh/workspace", "kaito.sh/ragengine"];

/// Value of the nodepool marker on created pools
pub const NODEPOOL_VALUE: &str = "kaito";

/// VM size family marker for GPU SKUs
const GPU_FAMILY: &str = "Standard_N";

/// `gpu` for N-series VM sizes, `cpu` otherwise
pub fn machine_type(vm_size: &str) -> &'static str {
    if vm_size.contains(GPU_FAMILY) { "gpu" } else { "cpu" }
}

/// Label value for a creation time
pub fn format_creation_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(CREATION_TIMESTAMP_LAYOUT).to_string()
}

/// Inverse of [`format_creation_timestamp`]
pub fn parse_creation_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, CREATION_TIMESTAMP_LAYOUT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Creation timestamp of the NodeClaim, if the API server has set one
pub fn node_claim_created_at(claim: &NodeClaim) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(claim.metadata.creation_timestamp.as_ref()?).ok()?;
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Node labels for an agent pool built from `claim`
///
/// The nodepool marker goes in first so NodeClaim labels can override it;
/// machine class and creation timestamp are always set by the provisioner.
pub fn agent_pool_labels(
    claim: &NodeClaim,
    vm_size: &str,
    now: DateTime<Utc>,
) -> HashMap<String, Option<String>> {
    let mut labels = HashMap::new();
    labels.insert(LABEL_NODEPOOL.to_string(), Some(NODEPOOL_VALUE.to_string()));

    if let Some(claim_labels) = &claim.metadata.labels {
        for (k, v) in claim_labels {
            labels.insert(k.clone(), Some(v.clone()));
        }
    }

    labels.insert(
        LABEL_MACHINE_TYPE.to_string(),
        Some(machine_type(vm_size).to_string()),
    );
    let created_at = node_claim_created_at(claim).unwrap_or(now);
    labels.insert(
        LABEL_CREATION_TIMESTAMP.to_string(),
        Some(format_creation_timestamp(created_at)),
    );
    labels
}

/// `key=value:effect`, with an empty value when the taint has none
pub fn encode_taint(taint: &Taint) -> String {
    format!(
        "{}={}:{}",
        taint.key,
        taint.value.as_deref().unwrap_or_default(),
        taint.effect
    )
}

/// Encode every taint as `key=value:effect`
pub fn encode_taints(taints: &[Taint]) -> Vec<String> {
    taints.iter().map(encode_taint).collect()
}

/// Whether the pool was labeled by a workload and created from a NodeClaim
pub fn is_owned<V>(labels: Option<&HashMap<String, V>>) -> bool {
    let Some(labels) = labels else {
        return false;
    };
    WORKLOAD_LABELS.iter().any(|key| labels.contains_key(*key)) && labels.contains_key(LABEL_NODEPOOL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn claim(metadata: serde_json::Value) -> NodeClaim {
        serde_json::from_value(json!({
            "apiVersion": "karpenter.sh/v1",
            "kind": "NodeClaim",
            "metadata": metadata,
            "spec": {}
        }))
        .unwrap()
    }

    #[test]
    fn test_machine_type() {
        assert_eq!(machine_type("Standard_NC6s_v3"), "gpu");
        assert_eq!(machine_type("Standard_ND40rs_v2"), "gpu");
        assert_eq!(machine_type("Standard_NV36ads_A10_v5"), "gpu");
        assert_eq!(machine_type("Standard_D4s_v3"), "cpu");
        assert_eq!(machine_type("Standard_B2s"), "cpu");
    }

    #[test]
    fn test_creation_timestamp_layout() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let value = format_creation_timestamp(ts);
        assert_eq!(value, "2024-03-07T09-05-01Z");
        assert!(!value.contains(':'));
        assert_eq!(parse_creation_timestamp(&value), Some(ts));
        assert_eq!(parse_creation_timestamp("2024-03-07T09:05:01Z"), None);
    }

    #[test]
    fn test_labels_merge_claim_over_nodepool_marker() {
        let claim = claim(json!({
            "name": "gpu1",
            "creationTimestamp": "2024-01-02T03:04:05Z",
            "labels": {
                "kaito.sh/workspace": "falcon",
                "karpenter.sh/nodepool": "custom",
                "kaito.sh/machine-type": "overridden"
            }
        }));
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        let labels = agent_pool_labels(&claim, "Standard_NC6s_v3", now);
        assert_eq!(labels["karpenter.sh/nodepool"].as_deref(), Some("custom"));
        assert_eq!(labels["kaito.sh/workspace"].as_deref(), Some("falcon"));
        assert_eq!(labels[LABEL_MACHINE_TYPE].as_deref(), Some("gpu"));
        assert_eq!(
            labels[LABEL_CREATION_TIMESTAMP].as_deref(),
            Some("2024-01-02T03-04-05Z")
        );
    }

    #[test]
    fn test_labels_without_creation_timestamp_use_now() {
        let claim = claim(json!({"name": "cpu1"}));
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 30, 0).unwrap();

        let labels = agent_pool_labels(&claim, "Standard_D4s_v3", now);
        assert_eq!(labels["karpenter.sh/nodepool"].as_deref(), Some(NODEPOOL_VALUE));
        assert_eq!(labels[LABEL_MACHINE_TYPE].as_deref(), Some("cpu"));
        assert_eq!(
            labels[LABEL_CREATION_TIMESTAMP].as_deref(),
            Some("2030-01-01T12-30-00Z")
        );
    }

    #[test]
    fn test_encode_taints() {
        let taints = vec![
            Taint {
                key: "sku".to_string(),
                value: Some("gpu".to_string()),
                effect: "NoSchedule".to_string(),
            },
            Taint {
                key: "dedicated".to_string(),
                value: None,
                effect: "NoExecute".to_string(),
            },
        ];
        assert_eq!(
            encode_taints(&taints),
            vec!["sku=gpu:NoSchedule", "dedicated=:NoExecute"]
        );
    }

    #[test]
    fn test_ownership_requires_workload_and_nodepool_labels() {
        let mut labels: HashMap<String, Option<String>> = HashMap::new();
        assert!(!is_owned(Some(&labels)));
        assert!(!is_owned::<Option<String>>(None));

        labels.insert("kaito.sh/ragengine".to_string(), Some("rag".to_string()));
        assert!(!is_owned(Some(&labels)));

        labels.insert(LABEL_NODEPOOL.to_string(), Some("kaito".to_string()));
        assert!(is_owned(Some(&labels)));

        labels.remove("kaito.sh/ragengine");
        labels.insert("team".to_string(), Some("ml".to_string()));
        assert!(!is_owned(Some(&labels)));
    }
}
