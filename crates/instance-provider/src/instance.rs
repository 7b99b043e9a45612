//! Backend-neutral view of one provisioned agent pool node

use std::collections::HashMap;

/// A provisioned (or queried) compute resource
///
/// `None` means the backend does not report the field. Connected clusters
/// never report `tags`, `subnet_id` or `image_id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    /// Agent pool name
    pub name: Option<String>,
    /// Provider ID of the backing node, once bound
    pub id: Option<String>,
    /// VM size
    pub instance_type: Option<String>,
    /// Provisioning or current state
    pub state: Option<String>,
    /// Node image version
    pub image_id: Option<String>,
    /// `spot` or `on-demand`
    pub capacity_type: Option<String>,
    /// Subnet of the nodes
    pub subnet_id: Option<String>,
    /// Azure resource tags
    pub tags: Option<HashMap<String, Option<String>>>,
    /// Node labels of the agent pool
    pub labels: HashMap<String, String>,
}

/// Flatten ARM's nullable label values
pub(crate) fn flatten_labels(labels: Option<&HashMap<String, Option<String>>>) -> HashMap<String, String> {
    labels
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default()
}
