//! Port traits implemented by adapter crates.
//!
//! The engine depends only on these traits; `http-transport` and
//! `session-store` supply the implementations, and tests supply scripted
//! fakes.

use std::time::Duration;

use async_trait::async_trait;

use crate::{Request, Response, SessionId, SessionSnapshot, ToolkitError};

/// Default wait when a 429 response carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Sends one GraphQL request and maps the HTTP outcome onto [`ToolkitError`].
///
/// ## Contract
///
/// - 2xx with a parseable envelope → `Ok(Response)`, even if the envelope
///   carries `errors` (the executor aggregates those).
/// - 429 → [`ToolkitError::RateLimited`] with the `Retry-After` seconds, or
///   [`DEFAULT_RETRY_AFTER`] when absent.
/// - 401 → [`ToolkitError::Unauthorized`].
/// - Other non-2xx → [`ToolkitError::Http`].
/// - No response (connect, DNS, reset) → [`ToolkitError::Network`].
/// - Deadline elapsed → [`ToolkitError::Timeout`].
///
/// Implementations perform exactly one HTTP exchange per call; retrying is
/// the executor's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one request/response exchange.
    async fn send(&self, request: &Request) -> Result<Response, ToolkitError>;
}

/// Durable storage for [`SessionSnapshot`]s keyed by [`SessionId`].
///
/// Failures are returned as [`ToolkitError::Persistence`] and must never be
/// swallowed by implementations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Writes `snapshot`, replacing any previous snapshot for the same id.
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), ToolkitError>;

    /// Reads the snapshot for `id`; `Ok(None)` if none was ever saved.
    async fn load(&self, id: SessionId) -> Result<Option<SessionSnapshot>, ToolkitError>;

    /// Removes the snapshot for `id`. Removing a missing snapshot succeeds.
    async fn delete(&self, id: SessionId) -> Result<(), ToolkitError>;
}
