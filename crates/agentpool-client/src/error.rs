//! Agent pool client errors

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when talking to Azure Resource Manager
#[derive(Debug, Error)]
pub enum ArmError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// ARM returned a non-success status code
    #[error("ARM request failed: {status} {code}: {message}")]
    Response {
        status: u16,
        code: String,
        message: String,
    },

    /// A long-running operation reached a terminal, unsuccessful status
    #[error("operation {status}: {code}: {message}")]
    OperationFailed {
        status: String,
        code: String,
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Token acquisition failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A long-running operation did not settle within the poll budget
    #[error("Polling timed out: {0}")]
    PollingTimeout(String),

    /// Invalid request (e.g., malformed header values)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

impl ArmError {
    /// Build an error from a failed ARM response.
    ///
    /// ARM wraps errors as `{"error": {"code", "message"}}`; some RPs return the
    /// fields at the top level. A body that is not JSON becomes the message.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => match envelope.error {
                Some(detail) => (detail.code, detail.message),
                None => (envelope.code, envelope.message),
            },
            Err(_) => (None, None),
        };

        ArmError::Response {
            status: status.as_u16(),
            code: code.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown")
                    .replace(' ', "")
            }),
            message: message.unwrap_or_else(|| body.to_string()),
        }
    }

    /// The ARM error code, when the error carries one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ArmError::Response { code, .. } | ArmError::OperationFailed { code, .. } => {
                Some(code.as_str())
            }
            _ => None,
        }
    }

    /// HTTP status of a failed response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ArmError::Response { status, .. } => Some(*status),
            ArmError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
            || matches!(self.error_code(), Some("NotFound" | "ResourceNotFound"))
    }
}
