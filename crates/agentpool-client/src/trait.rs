//! AgentPoolsApi trait for mocking
//!
//! The concrete managed and connected clients implement this trait, and tests
//! substitute the in-memory mocks from the `mock` module.

use crate::common::pager::Pager;
use crate::common::poller::Poller;
use crate::error::ArmError;
use crate::scope::AgentPoolScope;

/// Agent pool operations against one ARM control plane
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait AgentPoolsApi: Send + Sync {
    /// Cluster the pools belong to
    type Scope: AgentPoolScope + Send + Sync;
    /// Agent pool resource representation
    type AgentPool: Send + Sync;

    /// Submit a create-or-update; the returned poller resolves to the stored pool
    async fn begin_create_or_update(
        &self,
        scope: &Self::Scope,
        name: &str,
        pool: &Self::AgentPool,
    ) -> Result<Poller<Self::AgentPool>, ArmError>;

    async fn get(&self, scope: &Self::Scope, name: &str) -> Result<Self::AgentPool, ArmError>;

    async fn begin_delete(&self, scope: &Self::Scope, name: &str) -> Result<Poller<()>, ArmError>;

    /// Paginated listing of every pool in the cluster
    fn list_pager(&self, scope: &Self::Scope) -> Pager<Self::AgentPool>;
}
