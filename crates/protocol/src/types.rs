//! Shared value types for IssueBridge.
//!
//! These are the opaque request/response shapes the toolkit moves between
//! callers and the remote GraphQL endpoint. The toolkit never interprets
//! `data`; it only routes, caches and retries it.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{OperationName, SessionId, ToolkitError};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One GraphQL operation, immutable once handed to the executor.
///
/// Construct with [`Request::new`] and the `with_*` builders; mark reads that
/// may be served from the local cache with [`Request::cacheable`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    operation: String,
    variables: Value,
    operation_name: OperationName,
    cacheable: bool,
}

impl Request {
    /// Creates a non-cacheable request with no variables.
    ///
    /// The operation name is derived from the text (`query IssueById(...)`
    /// yields `IssueById`); unnamed operations are recorded as `anonymous`.
    pub fn new(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        let operation_name =
            derive_operation_name(&operation).unwrap_or_else(OperationName::anonymous);
        Self {
            operation,
            variables: Value::Object(serde_json::Map::new()),
            operation_name,
            cacheable: false,
        }
    }

    /// Sets the operation variables (expected to be a JSON object).
    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    /// Overrides the derived operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: OperationName) -> Self {
        self.operation_name = name;
        self
    }

    /// Marks this request as an idempotent read eligible for caching.
    #[must_use]
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Returns the GraphQL operation text.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the operation variables.
    pub fn variables(&self) -> &Value {
        &self.variables
    }

    /// Returns the operation name used for logging, history and cache keys.
    pub fn operation_name(&self) -> &OperationName {
        &self.operation_name
    }

    /// Returns `true` if the response may be served from the cache.
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Canonical cache key: operation name plus serialised variables.
    ///
    /// Unnamed operations key on their full text instead, so two different
    /// anonymous queries never share an entry. Object keys serialise in
    /// sorted order, which makes the key independent of insertion order.
    pub fn cache_key(&self) -> String {
        let prefix = if self.operation_name.is_anonymous() {
            self.operation.trim()
        } else {
            self.operation_name.as_str()
        };
        format!("{prefix}:{}", self.variables)
    }
}

/// Extracts `Name` from `query Name(...)`, `mutation Name {...}` or
/// `subscription Name`.
fn derive_operation_name(text: &str) -> Option<OperationName> {
    let rest = text.trim_start();
    let keyword_end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    if !matches!(&rest[..keyword_end], "query" | "mutation" | "subscription") {
        return None;
    }
    let after = rest[keyword_end..].trim_start();
    let name_end = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(after.len());
    OperationName::new(&after[..name_end])
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlErrorEntry {
    /// Human-readable message.
    pub message: String,

    /// Server-specific structured details, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// A GraphQL response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The `data` member; `None` when absent or `null`.
    #[serde(default)]
    pub data: Option<Value>,

    /// The `errors` member, in server order. Absent and `null` both read as
    /// empty.
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub errors: Vec<GraphQlErrorEntry>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Response {
    /// Creates a successful response carrying `data`.
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Returns `true` if the envelope carries at least one error.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Converts an envelope with errors into one aggregated
    /// [`ToolkitError::GraphQl`]; passes clean envelopes through.
    pub fn into_result(self) -> Result<Self, ToolkitError> {
        if self.has_errors() {
            Err(ToolkitError::GraphQl {
                messages: self.errors.into_iter().map(|e| e.message).collect(),
            })
        } else {
            Ok(self)
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Durable form of a session, one per [`SessionId`].
///
/// Serialised with camelCase keys: `{sessionId, context, lastActivity, createdAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Key under which the snapshot is stored.
    pub session_id: SessionId,
    /// Caller-owned context values.
    pub context: HashMap<String, Value>,
    /// Time of the last mutating call.
    pub last_activity: Timestamp,
    /// Time the session was first created.
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Time elapsed since this timestamp; zero if it lies in the future.
    pub fn elapsed(self) -> Duration {
        (Utc::now() - self.0).to_std().unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
