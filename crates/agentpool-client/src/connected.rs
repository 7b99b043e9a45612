//! Arc-connected cluster agent pools (`Microsoft.HybridContainerService`)

use crate::agentpool_trait::AgentPoolsApi;
use crate::common::pager::Pager;
use crate::common::poller::Poller;
use crate::common::{ClientOptions, HttpClient};
use crate::credential::TokenCredential;
use crate::error::ArmError;
use crate::models::HybridAgentPool;
use crate::scope::{AgentPoolScope, ConnectedClusterScope};
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

/// API version of the hybrid agent pools surface
pub const HYBRID_API_VERSION: &str = "2024-01-01";

/// Resource provider host used by end-to-end test environments
pub const E2E_RP_REFERER: &str = "rp.e2e.ig.e2e-aks.azure.com";

/// Options that route requests to the end-to-end resource provider
///
/// The token audience stays the public Resource Manager. Every request
/// carries the `Referer` of the test RP and a fresh correlation ID.
pub fn e2e_options() -> ClientOptions {
    ClientOptions {
        endpoint: format!("https://{}", E2E_RP_REFERER),
        headers: vec![
            ("Referer".to_string(), E2E_RP_REFERER.to_string()),
            (
                "x-ms-correlation-request-id".to_string(),
                uuid::Uuid::new_v4().to_string(),
            ),
        ],
        ..Default::default()
    }
}

/// Client for agent pools of Arc-connected provisioned clusters
#[derive(Debug, Clone)]
pub struct HybridAgentPoolsClient {
    http: HttpClient,
}

impl HybridAgentPoolsClient {
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
impl AgentPoolsApi for HybridAgentPoolsClient {
    type Scope = ConnectedClusterScope;
    type AgentPool = HybridAgentPool;

    async fn begin_create_or_update(
        &self,
        scope: &ConnectedClusterScope,
        name: &str,
        pool: &HybridAgentPool,
    ) -> Result<Poller<HybridAgentPool>, ArmError> {
        let url = self.http.build_url(&scope.agent_pool_path(name), HYBRID_API_VERSION);
        let body = serde_json::to_value(pool)?;
        debug!("creating hybrid agent pool {} in {}", name, scope.cluster_name);
        let response = self.http.send(Method::PUT, &url, Some(&body)).await?;
        Poller::from_response(&self.http, &Method::PUT, &url, response)
    }

    async fn get(&self, scope: &ConnectedClusterScope, name: &str) -> Result<HybridAgentPool, ArmError> {
        let url = self.http.build_url(&scope.agent_pool_path(name), HYBRID_API_VERSION);
        self.http.get(&url).await
    }

    async fn begin_delete(&self, scope: &ConnectedClusterScope, name: &str) -> Result<Poller<()>, ArmError> {
        let url = self.http.build_url(&scope.agent_pool_path(name), HYBRID_API_VERSION);
        debug!("deleting hybrid agent pool {} in {}", name, scope.cluster_name);
        let response = self.http.send(Method::DELETE, &url, None).await?;
        Poller::from_response(&self.http, &Method::DELETE, &url, response)
    }

    fn list_pager(&self, scope: &ConnectedClusterScope) -> Pager<HybridAgentPool> {
        let url = self.http.build_url(&scope.agent_pools_path(), HYBRID_API_VERSION);
        Pager::remote(self.http.clone(), url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticTokenCredential;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const POOLS_PATH: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Kubernetes/connectedClusters/arc/providers/Microsoft.HybridContainerService/provisionedClusterInstances/default/agentPools";

    #[test]
    fn test_e2e_options() {
        let options = e2e_options();
        assert_eq!(options.endpoint, "https://rp.e2e.ig.e2e-aks.azure.com");
        assert_eq!(options.audience, crate::common::ARM_PUBLIC_ENDPOINT);
        assert!(options
            .headers
            .iter()
            .any(|(k, v)| k == "Referer" && v == E2E_RP_REFERER));
        let correlation = options
            .headers
            .iter()
            .find(|(k, _)| k == "x-ms-correlation-request-id")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(uuid::Uuid::parse_str(&correlation).is_ok());
    }

    #[tokio::test]
    async fn test_custom_headers_sent_on_every_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(POOLS_PATH))
            .and(query_param("api-version", HYBRID_API_VERSION))
            .and(header("Referer", E2E_RP_REFERER))
            .and(header_exists("x-ms-correlation-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "gpu1", "properties": {"status": {"currentState": "Succeeded"}}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let options = ClientOptions {
            endpoint: server.uri(),
            ..e2e_options()
        };
        let client =
            HybridAgentPoolsClient::new(Arc::new(StaticTokenCredential::new("t")), options).unwrap();
        let pools = client
            .list_pager(&ConnectedClusterScope::new("sub", "rg", "arc"))
            .collect_all()
            .await
            .unwrap();
        assert_eq!(pools.len(), 1);
    }

    #[tokio::test]
    async fn test_create_without_monitor_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/gpu1", POOLS_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "gpu1",
                "properties": {"vmSize": "Standard_NC4as_T4_v3"}
            })))
            .mount(&server)
            .await;

        let client = HybridAgentPoolsClient::new(
            Arc::new(StaticTokenCredential::new("t")),
            ClientOptions::with_endpoint(server.uri()),
        )
        .unwrap();
        let poller = client
            .begin_create_or_update(
                &ConnectedClusterScope::new("sub", "rg", "arc"),
                "gpu1",
                &HybridAgentPool::default(),
            )
            .await
            .unwrap();
        assert!(poller.is_done());
    }
}
