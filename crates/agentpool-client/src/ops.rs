//! Blocking-style helpers over [`AgentPoolsApi`]
//!
//! Each helper submits the operation and polls it to completion.

use crate::agentpool_trait::AgentPoolsApi;
use crate::common::poller::{OperationOutput, PollOptions};
use crate::error::ArmError;
use tracing::debug;

/// Create or update `name` and wait for the stored pool
pub async fn create_agent_pool<C>(
    client: &C,
    scope: &C::Scope,
    name: &str,
    pool: &C::AgentPool,
    options: &PollOptions,
) -> Result<C::AgentPool, ArmError>
where
    C: AgentPoolsApi + ?Sized,
    C::AgentPool: OperationOutput,
{
    let poller = client.begin_create_or_update(scope, name, pool).await?;
    poller.poll_until_done(options).await
}

/// Fetch one agent pool
pub async fn get_agent_pool<C>(client: &C, scope: &C::Scope, name: &str) -> Result<C::AgentPool, ArmError>
where
    C: AgentPoolsApi + ?Sized,
{
    client.get(scope, name).await
}

/// Delete `name` and wait for completion
///
/// A pool that is already gone counts as deleted.
pub async fn delete_agent_pool<C>(
    client: &C,
    scope: &C::Scope,
    name: &str,
    options: &PollOptions,
) -> Result<(), ArmError>
where
    C: AgentPoolsApi + ?Sized,
{
    let poller = match client.begin_delete(scope, name).await {
        Ok(poller) => poller,
        Err(e) if e.is_not_found() => {
            debug!("agent pool {} already deleted", name);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    match poller.poll_until_done(options).await {
        Err(e) if e.is_not_found() => Ok(()),
        result => result,
    }
}

/// Every pool in the cluster, across all pages
pub async fn list_agent_pools<C>(client: &C, scope: &C::Scope) -> Result<Vec<C::AgentPool>, ArmError>
where
    C: AgentPoolsApi + ?Sized,
    C::AgentPool: serde::de::DeserializeOwned,
{
    client.list_pager(scope).collect_all().await
}
