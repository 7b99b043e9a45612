//! Token credentials for Azure Resource Manager
//!
//! Two production credentials are provided: the instance metadata managed
//! identity endpoint and federated workload identity (a projected service
//! account token exchanged for an Entra ID access token). Tokens are cached
//! per scope and refreshed shortly before they expire.

use crate::error::ArmError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Refresh tokens this long before they expire
const REFRESH_MARGIN_SECS: i64 = 300;

/// Bearer token and its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Bearer token
    pub token: String,
    /// Expiry of the token
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_on - ChronoDuration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

/// Source of bearer tokens for a scope such as `https://management.azure.com/.default`
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, ArmError>;
}

/// Fixed token, for tests and pre-authenticated callers
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    /// Credential that always returns `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, ArmError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: Utc::now() + ChronoDuration::hours(1),
        })
    }
}

#[derive(Debug, Default)]
struct TokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl TokenCache {
    async fn get_or_fetch<F, Fut>(&self, scope: &str, fetch: F) -> Result<AccessToken, ArmError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AccessToken, ArmError>>,
    {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.get(scope)
            && token.is_fresh(Utc::now())
        {
            return Ok(token.clone());
        }

        let token = fetch().await?;
        tokens.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}

/// Managed identity via the instance metadata service
pub struct ManagedIdentityCredential {
    client: Client,
    endpoint: String,
    client_id: Option<String>,
    cache: TokenCache,
}

impl fmt::Debug for ManagedIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedIdentityCredential")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ImdsToken {
    access_token: String,
    expires_on: ExpiresOn,
}

/// IMDS reports `expires_on` as epoch seconds, usually encoded as a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresOn {
    Number(i64),
    Text(String),
}

impl ExpiresOn {
    fn to_datetime(&self) -> Result<DateTime<Utc>, ArmError> {
        let secs = match self {
            ExpiresOn::Number(n) => *n,
            ExpiresOn::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| ArmError::Authentication(format!("invalid expires_on {}: {}", s, e)))?,
        };
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| ArmError::Authentication(format!("expires_on out of range: {}", secs)))
    }
}

impl ManagedIdentityCredential {
    /// Credential for the system-assigned identity, or the user-assigned
    /// identity with `client_id`
    pub fn new(client_id: Option<String>) -> Result<Self, ArmError> {
        Self::with_endpoint(IMDS_ENDPOINT, client_id)
    }

    /// Credential against a non-default token endpoint
    pub fn with_endpoint(endpoint: impl Into<String>, client_id: Option<String>) -> Result<Self, ArmError> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: endpoint.into(),
            client_id: client_id.filter(|id| !id.is_empty()),
            cache: TokenCache::default(),
        })
    }

    async fn fetch(&self, scope: &str) -> Result<AccessToken, ArmError> {
        let resource = scope.trim_end_matches("/.default");
        let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        debug!("requesting managed identity token for {}", resource);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .header("Metadata", "true")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ArmError::Authentication(format!(
                "managed identity endpoint returned {}: {}",
                status, body
            )));
        }

        let token: ImdsToken = serde_json::from_str(&body)?;
        Ok(AccessToken {
            expires_on: token.expires_on.to_datetime()?,
            token: token.access_token,
        })
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, ArmError> {
        self.cache.get_or_fetch(scope, || self.fetch(scope)).await
    }
}

/// Federated workload identity
///
/// Exchanges the projected service account token in `token_file` for an
/// access token using the client credentials grant.
pub struct WorkloadIdentityCredential {
    client: Client,
    tenant_id: String,
    client_id: String,
    token_file: String,
    authority_host: String,
    cache: TokenCache,
}

impl fmt::Debug for WorkloadIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadIdentityCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("token_file", &self.token_file)
            .field("authority_host", &self.authority_host)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct EntraToken {
    access_token: String,
    expires_in: i64,
}

impl WorkloadIdentityCredential {
    /// Credential exchanging the projected token in `token_file`
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<String>,
        authority_host: impl Into<String>,
    ) -> Result<Self, ArmError> {
        let tenant_id = tenant_id.into();
        let client_id = client_id.into();
        let token_file = token_file.into();
        let authority_host = authority_host.into();

        for (value, what) in [
            (&tenant_id, "tenant ID"),
            (&client_id, "client ID"),
            (&token_file, "federated token file"),
            (&authority_host, "authority host"),
        ] {
            if value.is_empty() {
                return Err(ArmError::Authentication(format!("{} not set", what)));
            }
        }

        Ok(Self {
            client: Client::builder().build()?,
            tenant_id,
            client_id,
            token_file,
            authority_host,
            cache: TokenCache::default(),
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    async fn fetch(&self, scope: &str) -> Result<AccessToken, ArmError> {
        // The projected token rotates on disk, so read it per exchange.
        let assertion = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                ArmError::Authentication(format!("reading federated token {}: {}", self.token_file, e))
            })?;

        let form = [
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.trim()),
            ("client_id", self.client_id.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", scope),
        ];

        let url = self.token_url();
        debug!("exchanging federated token at {}", url);
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ArmError::Authentication(format!(
                "token exchange returned {}: {}",
                status, text
            )));
        }

        let token: EntraToken = serde_json::from_str(&text)?;
        Ok(AccessToken {
            token: token.access_token,
            expires_on: Utc::now() + ChronoDuration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, ArmError> {
        self.cache.get_or_fetch(scope, || self.fetch(scope)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_workload_identity_requires_inputs() {
        let err = WorkloadIdentityCredential::new("", "client", "/var/run/token", "https://login")
            .unwrap_err();
        assert!(err.to_string().contains("tenant ID not set"));

        let err = WorkloadIdentityCredential::new("tenant", "client", "", "https://login")
            .unwrap_err();
        assert!(err.to_string().contains("federated token file not set"));
    }

    #[test]
    fn test_expires_on_string_and_number() {
        let text: ImdsToken =
            serde_json::from_str(r#"{"access_token":"a","expires_on":"1700000000"}"#).unwrap();
        let number: ImdsToken =
            serde_json::from_str(r#"{"access_token":"a","expires_on":1700000000}"#).unwrap();
        assert_eq!(
            text.expires_on.to_datetime().unwrap(),
            number.expires_on.to_datetime().unwrap()
        );
    }

    #[tokio::test]
    async fn test_managed_identity_token_is_cached() {
        let server = MockServer::start().await;
        let expires = (Utc::now() + ChronoDuration::hours(1)).timestamp().to_string();
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("Metadata", "true"))
            .and(query_param("resource", "https://management.azure.com"))
            .and(query_param("client_id", "kubelet-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "imds-token",
                "expires_on": expires,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::with_endpoint(
            format!("{}/token", server.uri()),
            Some("kubelet-id".to_string()),
        )
        .unwrap();

        let scope = "https://management.azure.com/.default";
        assert_eq!(credential.get_token(scope).await.unwrap().token, "imds-token");
        assert_eq!(credential.get_token(scope).await.unwrap().token, "imds-token");
    }

    #[tokio::test]
    async fn test_workload_identity_exchanges_file_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("client_assertion=projected-jwt"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "entra-token",
                "expires_in": 3600,
                "token_type": "Bearer",
            })))
            .mount(&server)
            .await;

        let token_file = std::env::temp_dir().join(format!("wi-token-{}", uuid::Uuid::new_v4()));
        std::fs::write(&token_file, "projected-jwt\n").unwrap();

        let credential = WorkloadIdentityCredential::new(
            "tenant-1",
            "client-1",
            token_file.to_string_lossy(),
            server.uri(),
        )
        .unwrap();
        let token = credential
            .get_token("https://management.azure.com/.default")
            .await
            .unwrap();
        assert_eq!(token.token, "entra-token");

        let _ = std::fs::remove_file(token_file);
    }

    #[tokio::test]
    async fn test_workload_identity_rejected_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("AADSTS700024"))
            .mount(&server)
            .await;

        let token_file = std::env::temp_dir().join(format!("wi-token-{}", uuid::Uuid::new_v4()));
        std::fs::write(&token_file, "expired-jwt").unwrap();

        let credential =
            WorkloadIdentityCredential::new("t", "c", token_file.to_string_lossy(), server.uri()).unwrap();
        let err = credential.get_token("scope").await.unwrap_err();
        assert!(matches!(err, ArmError::Authentication(_)));
        assert!(err.to_string().contains("AADSTS700024"));

        let _ = std::fs::remove_file(token_file);
    }
}
