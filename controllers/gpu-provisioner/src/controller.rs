//! Orphan agent pool collection.
//!
//! An agent pool is orphaned when the provisioner created it but no NodeClaim
//! of the same name exists any more, for example after a crash between the
//! create call and the NodeClaim update. Pools younger than the TTL are left
//! alone so an in-flight create is never collected.

use crate::error::ControllerError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crds::NodeClaim;
use instance_provider::labels::{LABEL_CREATION_TIMESTAMP, parse_creation_timestamp};
use instance_provider::{Instance, InstanceProvider, ignore_not_found};
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default interval between collection passes
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);

/// Minimum age of an agent pool before it can be collected
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Periodically deletes agent pools that no NodeClaim refers to.
pub struct GarbageCollector {
    provider: Arc<dyn InstanceProvider>,
    node_claims: Api<NodeClaim>,
    interval: Duration,
    ttl: Duration,
}

impl GarbageCollector {
    /// Collector with the default interval and TTL
    pub fn new(provider: Arc<dyn InstanceProvider>, node_claims: Api<NodeClaim>) -> Self {
        Self {
            provider,
            node_claims,
            interval: DEFAULT_INTERVAL,
            ttl: DEFAULT_TTL,
        }
    }

    /// Run collection passes forever. Failed passes are logged and retried
    /// on the next tick.
    pub async fn run(&self) {
        info!(
            "Starting orphan agent pool collector (interval {:?}, ttl {:?})",
            self.interval, self.ttl
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.collect().await {
                Ok(deleted) if deleted.is_empty() => debug!("No orphan agent pools"),
                Ok(deleted) => info!("Deleted {} orphan agent pool(s): {:?}", deleted.len(), deleted),
                Err(e) => error!("Orphan agent pool collection failed: {}", e),
            }
        }
    }

    async fn collect(&self) -> Result<Vec<String>, ControllerError> {
        let claims = self.node_claims.list(&ListParams::default()).await?;
        let claim_names: HashSet<String> = claims.items.iter().map(ResourceExt::name_any).collect();
        collect_orphans(self.provider.as_ref(), &claim_names, Utc::now(), self.ttl).await
    }
}

/// Delete every orphan agent pool and return the names that were deleted.
///
/// A failed delete is logged and does not stop the pass.
pub async fn collect_orphans(
    provider: &dyn InstanceProvider,
    claim_names: &HashSet<String>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<Vec<String>, ControllerError> {
    let instances = ignore_not_found(provider.list().await)?;
    let mut deleted = Vec::new();

    for name in orphaned_instances(&instances, claim_names, now, ttl) {
        match provider.delete(&name).await {
            Ok(()) => deleted.push(name),
            Err(e) => warn!(agent_pool = %name, "Failed to delete orphan agent pool: {}", e),
        }
    }
    Ok(deleted)
}

/// Names of the instances with no NodeClaim that are older than `ttl`
///
/// Instances without a readable creation timestamp are never orphans.
pub fn orphaned_instances(
    instances: &[Instance],
    claim_names: &HashSet<String>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Vec<String> {
    let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);

    instances
        .iter()
        .filter_map(|instance| {
            let name = instance.name.as_deref()?;
            if claim_names.contains(name) {
                return None;
            }
            let Some(created) = instance
                .labels
                .get(LABEL_CREATION_TIMESTAMP)
                .and_then(|value| parse_creation_timestamp(value))
            else {
                debug!(agent_pool = %name, "Skipping agent pool without creation timestamp");
                return None;
            };
            (now.signed_duration_since(created) > ttl).then(|| name.to_string())
        })
        .collect()
}
