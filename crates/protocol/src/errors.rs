//! Top-level error and retry-policy types for IssueBridge.
//!
//! [`ToolkitError`] is the single error taxonomy shared by every crate in the
//! workspace: transports map HTTP outcomes onto it, the executor decides
//! whether to retry from it, and batches capture it per item.
//!
//! [`RetryPolicy`] is a cross-cutting concern: every [`ToolkitError`] can
//! produce one, and the executor's retry loop is driven entirely by it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// ## Rules
///
/// - `Retryable { after: Some(_) }`: server-directed wait (HTTP 429). The
///   wait does not consume a bounded attempt.
/// - `Retryable { after: None }`: transient transport failure (network,
///   DNS, timeout). Consumes one bounded attempt and uses the executor's
///   back-off schedule.
/// - `NonRetryable`: authentication failures, business-level GraphQL errors,
///   other HTTP statuses, configuration and internal errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried; the error surfaces immediately.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Toolkit errors
// ---------------------------------------------------------------------------

/// Every failure the toolkit can surface.
///
/// Variants carry owned, serialisable data only, so errors can be cloned into
/// per-item batch results and persisted alongside them.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ToolkitError {
    /// The request never produced an HTTP response (connection refused, DNS
    /// failure, reset).
    #[error("Network error: {message}")]
    Network {
        /// Description of the underlying transport failure.
        message: String,
    },

    /// The request did not complete before its deadline.
    #[error("Request timed out after {timeout:?}")]
    Timeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The server answered HTTP 429.
    #[error("Rate limited; retry after {retry_after:?}")]
    RateLimited {
        /// Server-supplied wait (`Retry-After`), or the 60 second default.
        retry_after: Duration,
    },

    /// The server answered HTTP 401. Never retried.
    #[error("Authentication failed: {message}")]
    Unauthorized {
        /// Response body or reason phrase.
        message: String,
    },

    /// Any other non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code returned by the server.
        status: u16,
        /// Response body, possibly truncated by the transport.
        body: String,
    },

    /// A 2xx envelope carried a non-empty `errors` array.
    ///
    /// All messages are aggregated into one error, in server order.
    #[error("GraphQL error: {}", messages.join("; "))]
    GraphQl {
        /// Messages of every error in the envelope.
        messages: Vec<String>,
    },

    /// Invalid configuration: bad settings, missing module factory, or a
    /// cyclic module graph.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A module lifecycle hook failed or an unload was refused.
    #[error("Module '{module}': {message}")]
    Module {
        /// Name of the module involved.
        module: String,
        /// Description of the failure.
        message: String,
    },

    /// A session snapshot could not be written or read.
    #[error("Session persistence failed: {message}")]
    Persistence {
        /// Description of the storage failure.
        message: String,
    },

    /// The executor reached a state that should be unreachable.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the unexpected state.
        message: String,
    },
}

impl ToolkitError {
    /// Shorthand for [`ToolkitError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for [`ToolkitError::Persistence`].
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Returns how the executor should treat this error.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: Some(*retry_after),
            },
            Self::Network { .. } | Self::Timeout { .. } => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Returns `true` if this error may be retried in any form.
    pub fn is_retryable(&self) -> bool {
        matches!(self.retry_policy(), RetryPolicy::Retryable { .. })
    }
}
