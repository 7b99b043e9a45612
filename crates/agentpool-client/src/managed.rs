//! Managed cluster agent pools (`Microsoft.ContainerService`)

use crate::agentpool_trait::AgentPoolsApi;
use crate::common::pager::Pager;
use crate::common::poller::Poller;
use crate::common::{ClientOptions, HttpClient};
use crate::credential::TokenCredential;
use crate::error::ArmError;
use crate::models::ManagedAgentPool;
use crate::scope::{AgentPoolScope, ManagedClusterScope};
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

/// API version of the managed agent pools surface
pub const MANAGED_API_VERSION: &str = "2024-02-01";

/// Client for agent pools of managed clusters
#[derive(Debug, Clone)]
pub struct ManagedAgentPoolsClient {
    http: HttpClient,
}

impl ManagedAgentPoolsClient {
    /// Client with the given credential and options
    pub fn new(credential: Arc<dyn TokenCredential>, options: ClientOptions) -> Result<Self, ArmError> {
        Ok(Self {
            http: HttpClient::new(credential, &options)?,
        })
    }

    /// Base Resource Manager endpoint
    pub fn endpoint(&self) -> &str {
        self.http.endpoint()
    }
}

#[async_trait::async_trait]
impl AgentPoolsApi for ManagedAgentPoolsClient {
    type Scope = ManagedClusterScope;
    type AgentPool = ManagedAgentPool;

    async fn begin_create_or_update(
        &self,
        scope: &ManagedClusterScope,
        name: &str,
        pool: &ManagedAgentPool,
    ) -> Result<Poller<ManagedAgentPool>, ArmError> {
        let url = self.http.build_url(&scope.agent_pool_path(name), MANAGED_API_VERSION);
        let body = serde_json::to_value(pool)?;
        debug!("creating managed agent pool {} in {}", name, scope.cluster_name);
        let response = self.http.send(Method::PUT, &url, Some(&body)).await?;
        Poller::from_response(&self.http, &Method::PUT, &url, response)
    }

    async fn get(&self, scope: &ManagedClusterScope, name: &str) -> Result<ManagedAgentPool, ArmError> {
        let url = self.http.build_url(&scope.agent_pool_path(name), MANAGED_API_VERSION);
        self.http.get(&url).await
    }

    async fn begin_delete(&self, scope: &ManagedClusterScope, name: &str) -> Result<Poller<()>, ArmError> {
        let url = self.http.build_url(&scope.agent_pool_path(name), MANAGED_API_VERSION);
        debug!("deleting managed agent pool {} in {}", name, scope.cluster_name);
        let response = self.http.send(Method::DELETE, &url, None).await?;
        Poller::from_response(&self.http, &Method::DELETE, &url, response)
    }

    fn list_pager(&self, scope: &ManagedClusterScope) -> Pager<ManagedAgentPool> {
        let url = self.http.build_url(&scope.agent_pools_path(), MANAGED_API_VERSION);
        Pager::remote(self.http.clone(), url)
    }
}
