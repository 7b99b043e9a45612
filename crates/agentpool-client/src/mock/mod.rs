//! Mock agent pool clients for unit testing
//!
//! Stores pools in memory keyed by their full resource path and can be told to
//! fail individual operations, so provider code can be tested without ARM.

use crate::agentpool_trait::AgentPoolsApi;
use crate::common::pager::Pager;
use crate::common::poller::{OperationOutput, Poller};
use crate::error::ArmError;
use crate::models::{AgentPoolResource, HybridAgentPool, ManagedAgentPool};
use crate::scope::{AgentPoolScope, ConnectedClusterScope, ManagedClusterScope};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock managed cluster agent pools
pub type MockManagedAgentPools = MockAgentPools<ManagedClusterScope, ManagedAgentPool>;

/// Mock Arc-connected agent pools
pub type MockHybridAgentPools = MockAgentPools<ConnectedClusterScope, HybridAgentPool>;

/// Injected `(status, code, message)` failure
#[derive(Debug, Clone)]
struct Failure {
    status: u16,
    code: String,
    message: String,
}

impl Failure {
    fn to_error(&self) -> ArmError {
        ArmError::Response {
            status: self.status,
            code: self.code.clone(),
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Failures {
    create: Option<Failure>,
    get: Option<Failure>,
    delete: Option<Failure>,
    list: Option<Failure>,
}

/// In-memory agent pool client
pub struct MockAgentPools<S, P> {
    pools: Arc<Mutex<BTreeMap<String, P>>>,
    created: Arc<Mutex<Vec<(String, P)>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<Failures>>,
    page_size: Arc<Mutex<usize>>,
    _scope: PhantomData<fn() -> S>,
}

impl<S, P> Clone for MockAgentPools<S, P> {
    fn clone(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
            created: Arc::clone(&self.created),
            deleted: Arc::clone(&self.deleted),
            failures: Arc::clone(&self.failures),
            page_size: Arc::clone(&self.page_size),
            _scope: PhantomData,
        }
    }
}

impl<S, P> fmt::Debug for MockAgentPools<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockAgentPools")
            .field("pools", &lock(&self.pools).len())
            .finish_non_exhaustive()
    }
}

impl<S, P> Default for MockAgentPools<S, P> {
    fn default() -> Self {
        Self {
            pools: Arc::new(Mutex::new(BTreeMap::new())),
            created: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Failures::default())),
            page_size: Arc::new(Mutex::new(usize::MAX)),
            _scope: PhantomData,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn failure(status: u16, code: &str, message: &str) -> Option<Failure> {
    Some(Failure {
        status,
        code: code.to_string(),
        message: message.to_string(),
    })
}

impl<S: AgentPoolScope, P: AgentPoolResource + Clone> MockAgentPools<S, P> {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pool directly (for test setup)
    pub fn insert(&self, scope: &S, name: &str, mut pool: P) {
        let path = scope.agent_pool_path(name);
        pool.assign_identity(path.clone(), name.to_string());
        lock(&self.pools).insert(path, pool);
    }

    /// Pool stored under `name`, if any
    pub fn stored(&self, scope: &S, name: &str) -> Option<P> {
        lock(&self.pools).get(&scope.agent_pool_path(name)).cloned()
    }

    /// Every `(name, pool)` submitted through create-or-update, in order
    pub fn created(&self) -> Vec<(String, P)> {
        lock(&self.created).clone()
    }

    /// Names passed to delete, in order
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    /// Number of pools per list page
    pub fn set_page_size(&self, size: usize) {
        *lock(&self.page_size) = size.max(1);
    }

    /// Fail every `begin_create_or_update` with the given ARM error
    pub fn fail_create(&self, status: u16, code: &str, message: &str) {
        lock(&self.failures).create = failure(status, code, message);
    }

    /// Fail every `get` with the given ARM error
    pub fn fail_get(&self, status: u16, code: &str, message: &str) {
        lock(&self.failures).get = failure(status, code, message);
    }

    /// Fail every `begin_delete` with the given ARM error
    pub fn fail_delete(&self, status: u16, code: &str, message: &str) {
        lock(&self.failures).delete = failure(status, code, message);
    }

    /// Fail listing with the given ARM error
    pub fn fail_list(&self, status: u16, code: &str, message: &str) {
        lock(&self.failures).list = failure(status, code, message);
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        *lock(&self.failures) = Failures::default();
    }
}

#[async_trait::async_trait]
impl<S, P> AgentPoolsApi for MockAgentPools<S, P>
where
    S: AgentPoolScope + Send + Sync + 'static,
    P: AgentPoolResource + OperationOutput + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Scope = S;
    type AgentPool = P;

    async fn begin_create_or_update(&self, scope: &S, name: &str, pool: &P) -> Result<Poller<P>, ArmError> {
        lock(&self.created).push((name.to_string(), pool.clone()));
        if let Some(f) = &lock(&self.failures).create {
            return Err(f.to_error());
        }

        let path = scope.agent_pool_path(name);
        let mut stored = pool.clone();
        stored.assign_identity(path.clone(), name.to_string());
        lock(&self.pools).insert(path, stored.clone());
        Ok(Poller::done(stored))
    }

    async fn get(&self, scope: &S, name: &str) -> Result<P, ArmError> {
        if let Some(f) = &lock(&self.failures).get {
            return Err(f.to_error());
        }
        lock(&self.pools)
            .get(&scope.agent_pool_path(name))
            .cloned()
            .ok_or_else(|| ArmError::Response {
                status: 404,
                code: "NotFound".to_string(),
                message: format!("agent pool {} not found", name),
            })
    }

    async fn begin_delete(&self, scope: &S, name: &str) -> Result<Poller<()>, ArmError> {
        lock(&self.deleted).push(name.to_string());
        if let Some(f) = &lock(&self.failures).delete {
            return Err(f.to_error());
        }
        match lock(&self.pools).remove(&scope.agent_pool_path(name)) {
            Some(_) => Ok(Poller::done(())),
            None => Err(ArmError::Response {
                status: 404,
                code: "NotFound".to_string(),
                message: format!("agent pool {} not found", name),
            }),
        }
    }

    fn list_pager(&self, scope: &S) -> Pager<P> {
        if let Some(f) = &lock(&self.failures).list {
            return Pager::from_results(vec![Err(f.to_error())]);
        }

        let prefix = format!("{}/", scope.agent_pools_path());
        let pools: Vec<P> = lock(&self.pools)
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(_, pool)| pool.clone())
            .collect();
        let size = *lock(&self.page_size);
        Pager::from_pages(pools.chunks(size).map(<[P]>::to_vec).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_scoped_per_cluster() {
        let mock = MockManagedAgentPools::new();
        let a = ManagedClusterScope::new("sub", "rg", "a");
        let b = ManagedClusterScope::new("sub", "rg", "b");
        mock.insert(&a, "gpu1", ManagedAgentPool::default());
        mock.insert(&b, "gpu2", ManagedAgentPool::default());

        let pools = mock.list_pager(&a).collect_all().await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].name.as_deref(), Some("gpu1"));
    }

    #[tokio::test]
    async fn test_injected_create_failure_still_records_spec() {
        let mock = MockHybridAgentPools::new();
        mock.fail_create(400, "BadRequest", "invalid vm size");
        let scope = ConnectedClusterScope::new("sub", "rg", "arc");

        let err = mock
            .begin_create_or_update(&scope, "gpu1", &HybridAgentPool::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), Some("BadRequest"));
        assert_eq!(mock.created().len(), 1);
        assert!(mock.stored(&scope, "gpu1").is_none());
    }

    #[tokio::test]
    async fn test_clear_failures_restores_normal_behaviour() {
        let mock = MockManagedAgentPools::new();
        let scope = ManagedClusterScope::new("sub", "rg", "aks");
        mock.insert(&scope, "gpu1", ManagedAgentPool::default());
        mock.fail_get(500, "InternalServerError", "boom");
        assert!(mock.get(&scope, "gpu1").await.is_err());

        mock.clear_failures();
        assert!(mock.get(&scope, "gpu1").await.is_ok());
    }
}
