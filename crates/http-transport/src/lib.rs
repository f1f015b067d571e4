//! IssueBridge HTTP transport adapter.
//!
//! Implements [`protocol::Transport`] on top of `reqwest`: one POST of
//! `{query, variables}` per call, with the configured credential in the
//! `Authorization` header and the configured request timeout.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP client construction, request serialisation,
//! status-code mapping and `Retry-After` parsing live here. The `engine`
//! crate sees only [`protocol::Transport`] and never retries inside this
//! crate: every `send` is exactly one HTTP exchange.
//!
//! ## Status mapping
//!
//! | HTTP outcome | Result |
//! |--------------|--------|
//! | 2xx, valid JSON envelope | `Ok(Response)` (envelope `errors` untouched) |
//! | 2xx, unparseable body | `ToolkitError::Http` |
//! | 429 | `ToolkitError::RateLimited` (`Retry-After` seconds, default 60s) |
//! | 401 | `ToolkitError::Unauthorized` |
//! | other non-2xx | `ToolkitError::Http` |
//! | request deadline elapsed | `ToolkitError::Timeout` |
//! | no response | `ToolkitError::Network` |

use std::time::Duration;

use async_trait::async_trait;
use protocol::{
    ExecutorConfig, Request, Response, ToolkitError, Transport, DEFAULT_RETRY_AFTER, REDACTED,
};
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

/// Wire body of one GraphQL request.
#[derive(Debug, Serialize)]
struct GraphQlBody<'a> {
    query: &'a str,
    variables: &'a Value,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
}

/// [`Transport`] that talks to one GraphQL endpoint over HTTPS.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("endpoint", &self.endpoint)
            .field("api_key", &REDACTED)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Builds a transport with its own `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Configuration`] if the endpoint or key is
    /// empty, or if the HTTP client cannot be constructed.
    pub fn new(config: &ExecutorConfig) -> Result<Self, ToolkitError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                ToolkitError::configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Self::with_client(config, client)
    }

    /// Builds a transport around an existing client, e.g. one shared with
    /// other adapters. The client's own timeout is left as configured; the
    /// per-request timeout from `config` is applied on every call.
    pub fn with_client(config: &ExecutorConfig, client: Client) -> Result<Self, ToolkitError> {
        if config.endpoint.trim().is_empty() {
            return Err(ToolkitError::configuration("endpoint must not be empty"));
        }
        if config.api_key.trim().is_empty() {
            return Err(ToolkitError::configuration("api_key must not be empty"));
        }
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> ToolkitError {
        if err.is_timeout() {
            ToolkitError::Timeout {
                timeout: self.timeout,
            }
        } else {
            ToolkitError::Network {
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip_all, fields(operation = %request.operation_name()))]
    async fn send(&self, request: &Request) -> Result<Response, ToolkitError> {
        let operation_name = request.operation_name();
        let body = GraphQlBody {
            query: request.operation(),
            variables: request.variables(),
            operation_name: (!operation_name.is_anonymous()).then(|| operation_name.as_str()),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        let status = response.status();
        debug!(status = status.as_u16(), "response received");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ToolkitError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|err| self.map_send_error(err))?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ToolkitError::Unauthorized {
                message: if text.is_empty() {
                    "authentication failed".to_string()
                } else {
                    text
                },
            });
        }
        if !status.is_success() {
            return Err(ToolkitError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<Response>(&text).map_err(|err| ToolkitError::Http {
            status: status.as_u16(),
            body: format!("invalid GraphQL response: {err}"),
        })
    }
}

/// Reads `Retry-After` as whole seconds, falling back to
/// [`DEFAULT_RETRY_AFTER`] when absent or not a number.
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}
