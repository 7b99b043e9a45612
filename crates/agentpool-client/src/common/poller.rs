//! Long-running operation poller
//!
//! ARM answers PUT and DELETE on agent pools with either a final body or a
//! monitor URL. `Azure-AsyncOperation` monitors return a status document;
//! `Location` monitors answer 202 until the operation has finished. A PUT
//! answered without a monitor is followed through the resource's own
//! `provisioningState`.

use crate::common::{decode_json, HttpClient, RawResponse};
use crate::error::ArmError;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";
const LOCATION: &str = "location";
const RETRY_AFTER: &str = "retry-after";

/// Bounds for polling a long-running operation
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay between polls when the service sends no `Retry-After`
    pub frequency: Duration,
    /// Maximum number of status requests before giving up
    pub max_polls: u32,
    /// Upper bound applied to a service-provided `Retry-After`
    pub max_retry_after: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            frequency: Duration::from_secs(5),
            max_polls: 720,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

/// Result type a finished operation resolves to
///
/// Create operations resolve to the agent pool body, deletes to `()`.
pub trait OperationOutput: Sized {
    /// Build the output from a final response body (may be empty)
    fn from_body(body: &str) -> Result<Self, ArmError>;

    /// `provisioningState` reported in the body, if any
    fn provisioning_state(&self) -> Option<&str> {
        None
    }
}

/// Whether a `provisioningState` is final
fn is_terminal_state(state: &str) -> bool {
    matches!(state, "Succeeded" | "Failed" | "Canceled" | "Cancelled")
}

fn is_failed_state(state: &str) -> bool {
    matches!(state, "Failed" | "Canceled" | "Cancelled")
}

impl OperationOutput for () {
    fn from_body(_body: &str) -> Result<Self, ArmError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<OperationErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug)]
enum Monitor {
    AsyncOperation(String),
    Location(String),
    /// Re-GET the resource until its `provisioningState` is final
    Body(String),
}

#[derive(Debug)]
struct PendingOperation {
    http: HttpClient,
    monitor: Monitor,
    /// Resource to GET once the operation succeeds (PUT only)
    resource_url: Option<String>,
    retry_after: Option<Duration>,
}

#[derive(Debug)]
enum State<T> {
    Done(Result<T, ArmError>),
    Pending(PendingOperation),
}

/// Handle to a submitted long-running operation
#[derive(Debug)]
pub struct Poller<T> {
    state: State<T>,
}

impl<T: OperationOutput> Poller<T> {
    /// A poller that has already finished with `value`
    pub fn done(value: T) -> Self {
        Self {
            state: State::Done(Ok(value)),
        }
    }

    /// Build a poller from the response to the initial request.
    pub(crate) fn from_response(
        http: &HttpClient,
        method: &Method,
        request_url: &str,
        response: RawResponse,
    ) -> Result<Self, ArmError> {
        let resource_url = (*method == Method::PUT).then(|| request_url.to_string());
        let retry_after = response
            .header(RETRY_AFTER)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let monitor = if let Some(url) = response.header(AZURE_ASYNC_OPERATION) {
            Some(Monitor::AsyncOperation(url.to_string()))
        } else if response.status == StatusCode::ACCEPTED {
            response
                .header(LOCATION)
                .map(|url| Monitor::Location(url.to_string()))
        } else {
            None
        };

        let monitor = match monitor {
            Some(monitor) => monitor,
            None => {
                let value = T::from_body(&response.body)?;
                match (&resource_url, value.provisioning_state()) {
                    (Some(url), Some(state)) if !is_terminal_state(state) => Monitor::Body(url.clone()),
                    (_, Some(state)) if is_failed_state(state) => {
                        return Err(provisioning_failed(state));
                    }
                    _ => return Ok(Self::done(value)),
                }
            }
        };

        debug!("{} {} accepted, polling {:?}", method, request_url, monitor);
        Ok(Self {
            state: State::Pending(PendingOperation {
                http: http.clone(),
                monitor,
                resource_url,
                retry_after,
            }),
        })
    }

    /// Whether the operation has settled without further polling
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    /// Poll until the operation settles and return its output.
    ///
    /// Dropping the returned future stops local polling only; the operation
    /// keeps running on the service side.
    pub async fn poll_until_done(self, options: &PollOptions) -> Result<T, ArmError> {
        let op = match self.state {
            State::Done(result) => return result,
            State::Pending(op) => op,
        };

        let mut delay = op
            .retry_after
            .map_or(options.frequency, |d| d.min(options.max_retry_after));

        for attempt in 1..=options.max_polls {
            tokio::time::sleep(delay).await;

            match &op.monitor {
                Monitor::AsyncOperation(url) => {
                    let response = op.http.send(Method::GET, url, None).await?;
                    let status: OperationStatus = decode_json(&response.body)?;
                    debug!("operation {} poll {}: {}", url, attempt, status.status);

                    match status.status.as_str() {
                        "Succeeded" => return finish(&op).await,
                        "Failed" | "Canceled" | "Cancelled" => {
                            let detail = status.error.unwrap_or(OperationErrorDetail {
                                code: None,
                                message: None,
                            });
                            return Err(ArmError::OperationFailed {
                                status: status.status,
                                code: detail.code.unwrap_or_default(),
                                message: detail.message.unwrap_or_default(),
                            });
                        }
                        _ => {}
                    }
                    delay = next_delay(&response, options);
                }
                Monitor::Location(url) => {
                    let response = op.http.send(Method::GET, url, None).await?;
                    debug!("operation {} poll {}: {}", url, attempt, response.status);

                    if response.status != StatusCode::ACCEPTED {
                        return match op.resource_url {
                            Some(_) => finish(&op).await,
                            None => T::from_body(&response.body),
                        };
                    }
                    delay = next_delay(&response, options);
                }
                Monitor::Body(url) => {
                    let response = op.http.send(Method::GET, url, None).await?;
                    let value = T::from_body(&response.body)?;
                    let state = value.provisioning_state().unwrap_or("Succeeded");
                    debug!("resource {} poll {}: {}", url, attempt, state);

                    if is_failed_state(state) {
                        return Err(provisioning_failed(state));
                    }
                    if is_terminal_state(state) {
                        return Ok(value);
                    }
                    delay = next_delay(&response, options);
                }
            }
        }

        Err(ArmError::PollingTimeout(format!(
            "operation did not complete after {} polls",
            options.max_polls
        )))
    }
}

async fn finish<T: OperationOutput>(op: &PendingOperation) -> Result<T, ArmError> {
    match &op.resource_url {
        Some(url) => {
            let response = op.http.send(Method::GET, url, None).await?;
            T::from_body(&response.body)
        }
        None => T::from_body(""),
    }
}

fn provisioning_failed(state: &str) -> ArmError {
    ArmError::OperationFailed {
        status: state.to_string(),
        code: String::new(),
        message: format!("provisioningState is {}", state),
    }
}

fn next_delay(response: &RawResponse, options: &PollOptions) -> Duration {
    response
        .header(RETRY_AFTER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(options.frequency, |secs| {
            Duration::from_secs(secs).min(options.max_retry_after)
        })
}
