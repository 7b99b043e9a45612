//! Common utilities for ARM clients
//!
//! Provides the authenticated HTTP wrapper shared by the managed and
//! connected agent pool clients.

pub mod pager;
pub mod poller;

use crate::credential::TokenCredential;
use crate::error::ArmError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Public cloud Resource Manager endpoint
pub const ARM_PUBLIC_ENDPOINT: &str = "https://management.azure.com";

/// Options for constructing an ARM client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Resource Manager endpoint requests are sent to
    pub endpoint: String,
    /// Token audience; the credential is asked for `{audience}/.default`
    pub audience: String,
    /// Headers added to every request
    pub headers: Vec<(String, String)>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: ARM_PUBLIC_ENDPOINT.to_string(),
            audience: ARM_PUBLIC_ENDPOINT.to_string(),
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientOptions {
    /// Options pointing at a custom endpoint (test servers, sovereign clouds)
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

/// Status, headers and body of a successful ARM response
#[derive(Debug)]
pub struct RawResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as text
    pub body: String,
}

impl RawResponse {
    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP client wrapper with bearer authentication
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    endpoint: String,
    scope: String,
    credential: Arc<dyn TokenCredential>,
    headers: HeaderMap,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("endpoint", &self.endpoint)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(credential: Arc<dyn TokenCredential>, options: &ClientOptions) -> Result<Self, ArmError> {
        let client = Client::builder().timeout(options.timeout).build()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ArmError::InvalidRequest(format!("header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ArmError::InvalidRequest(format!("header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        Ok(Self {
            client,
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
            scope: format!("{}/.default", options.audience.trim_end_matches('/')),
            credential,
            headers,
        })
    }

    /// Get the endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build a full URL from a resource path and api-version
    ///
    /// Absolute URLs (`nextLink`, operation monitors) are returned unchanged.
    pub fn build_url(&self, path: &str, api_version: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}?api-version={}", self.endpoint, path, api_version)
        }
    }

    /// Send a request and return the raw response
    ///
    /// Non-success statuses are converted into [`ArmError::Response`].
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RawResponse, ArmError> {
        debug!("{} {}", method, url);

        let token = self.credential.get_token(&self.scope).await?;
        let mut request = self
            .client
            .request(method.clone(), url)
            .headers(self.headers.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token.token))
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            debug!("{} {} failed: {} - {}", method, url, status, body);
            return Err(ArmError::from_response(status, &body));
        }

        Ok(RawResponse { status, headers, body })
    }

    /// Make a GET request and decode the body
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ArmError> {
        let response = self.send(Method::GET, url, None).await?;
        decode_json(&response.body)
    }
}

/// Decode a JSON body, keeping the first 500 characters in the error
pub(crate) fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, ArmError> {
    serde_json::from_str(body).map_err(|e| {
        ArmError::Decode(format!(
            "error decoding response body: {} - Response (first 500 chars): {}",
            e,
            body.chars().take(500).collect::<String>()
        ))
    })
}
