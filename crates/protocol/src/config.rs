//! Runtime configuration consumed by the toolkit.
//!
//! Configuration is plain data: it is deserialised by the caller (or read
//! from `ISSUEBRIDGE_*` environment variables via [`ToolkitConfig::from_env`])
//! and handed to each component's constructor. Nothing here performs I/O
//! beyond reading the process environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ToolkitError;

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of bounded retries after the first attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay of the exponential back-off schedule.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default lifetime of a cached read.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default idle time after which a session counts as expired.
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(3600);

/// Placeholder printed instead of credentials in `Debug` output.
pub const REDACTED: &str = "<redacted>";

/// Default number of items per concurrent batch chunk.
pub const DEFAULT_BATCH_SIZE: usize = 50;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Settings for the resilient query executor and its transport.
///
/// `Debug` output redacts `api_key`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Credential sent in the `Authorization` header.
    pub api_key: String,

    /// GraphQL endpoint URL.
    pub endpoint: String,

    /// Deadline applied to every transport call.
    #[serde(rename = "timeout_ms", with = "duration_ms", default = "default_timeout")]
    pub timeout: Duration,

    /// Bounded retries after the first attempt (`retry_attempts + 1` calls max).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base delay of the exponential back-off schedule.
    #[serde(rename = "retry_delay_ms", with = "duration_ms", default = "default_retry_delay")]
    pub retry_delay: Duration,
}

impl ExecutorConfig {
    /// Creates a config with default timing for `endpoint`.
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("api_key", &REDACTED)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

/// Settings for the response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of an entry stored without an explicit TTL.
    #[serde(rename = "ttl_ms", with = "duration_ms", default = "default_cache_ttl")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Where session snapshots are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Persistence {
    /// Snapshots live in process memory only.
    #[default]
    Memory,
    /// One JSON file per session id under `dir`.
    Disk {
        /// Directory holding `<session id>.json` files.
        dir: PathBuf,
    },
}

/// Settings for the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Snapshot storage backend.
    #[serde(default)]
    pub persistence: Persistence,

    /// Idle time after which the session is considered expired.
    #[serde(rename = "max_age_ms", with = "duration_ms", default = "default_session_max_age")]
    pub max_age: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persistence: Persistence::Memory,
            max_age: DEFAULT_SESSION_MAX_AGE,
        }
    }
}

/// Settings for the batch executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per concurrent chunk in parallel mode.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// All configuration consumed by the toolkit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolkitConfig {
    /// Executor and transport settings.
    pub executor: ExecutorConfig,
    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Batch settings.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl ToolkitConfig {
    /// Reads configuration from `ISSUEBRIDGE_*` environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ISSUEBRIDGE_API_KEY` | required |
    /// | `ISSUEBRIDGE_ENDPOINT` | required |
    /// | `ISSUEBRIDGE_TIMEOUT_MS` | 30000 |
    /// | `ISSUEBRIDGE_RETRY_ATTEMPTS` | 3 |
    /// | `ISSUEBRIDGE_RETRY_DELAY_MS` | 1000 |
    /// | `ISSUEBRIDGE_CACHE_TTL_SECS` | 300 |
    /// | `ISSUEBRIDGE_PERSISTENCE` | `memory` (`disk` needs `ISSUEBRIDGE_SESSION_DIR`) |
    /// | `ISSUEBRIDGE_SESSION_MAX_AGE_SECS` | 3600 |
    /// | `ISSUEBRIDGE_BATCH_SIZE` | 50 |
    pub fn from_env() -> Result<Self, ToolkitError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ToolkitConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ToolkitError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| ToolkitError::configuration(format!("{key} is not set")))
        };

        let executor = ExecutorConfig {
            api_key: required("ISSUEBRIDGE_API_KEY")?,
            endpoint: required("ISSUEBRIDGE_ENDPOINT")?,
            timeout: parse_or(&lookup, "ISSUEBRIDGE_TIMEOUT_MS", DEFAULT_TIMEOUT, |ms| {
                Duration::from_millis(ms)
            })?,
            retry_attempts: parse_or(
                &lookup,
                "ISSUEBRIDGE_RETRY_ATTEMPTS",
                DEFAULT_RETRY_ATTEMPTS,
                |n| n,
            )?,
            retry_delay: parse_or(
                &lookup,
                "ISSUEBRIDGE_RETRY_DELAY_MS",
                DEFAULT_RETRY_DELAY,
                Duration::from_millis,
            )?,
        };

        let cache = CacheConfig {
            ttl: parse_or(
                &lookup,
                "ISSUEBRIDGE_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL,
                Duration::from_secs,
            )?,
        };

        let persistence = match lookup("ISSUEBRIDGE_PERSISTENCE").as_deref() {
            None | Some("memory") => Persistence::Memory,
            Some("disk") => Persistence::Disk {
                dir: PathBuf::from(required("ISSUEBRIDGE_SESSION_DIR")?),
            },
            Some(other) => {
                return Err(ToolkitError::configuration(format!(
                    "ISSUEBRIDGE_PERSISTENCE must be 'memory' or 'disk', got '{other}'"
                )))
            }
        };
        let session = SessionConfig {
            persistence,
            max_age: parse_or(
                &lookup,
                "ISSUEBRIDGE_SESSION_MAX_AGE_SECS",
                DEFAULT_SESSION_MAX_AGE,
                Duration::from_secs,
            )?,
        };

        let batch = BatchConfig {
            batch_size: parse_or(&lookup, "ISSUEBRIDGE_BATCH_SIZE", DEFAULT_BATCH_SIZE, |n| n)?,
        };

        let config = Self {
            executor,
            cache,
            session,
            batch,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations no component can run with.
    pub fn validate(&self) -> Result<(), ToolkitError> {
        if self.executor.api_key.trim().is_empty() {
            return Err(ToolkitError::configuration("api_key must not be empty"));
        }
        if self.executor.endpoint.trim().is_empty() {
            return Err(ToolkitError::configuration("endpoint must not be empty"));
        }
        if self.executor.timeout.is_zero() {
            return Err(ToolkitError::configuration("timeout must be greater than zero"));
        }
        if self.batch.batch_size == 0 {
            return Err(ToolkitError::configuration("batch_size must be at least 1"));
        }
        Ok(())
    }
}

fn parse_or<F, T, R>(lookup: &F, key: &str, default: R, convert: impl Fn(T) -> R) -> Result<R, ToolkitError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(convert)
            .map_err(|_| ToolkitError::configuration(format!("{key} has invalid value '{raw}'"))),
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_session_max_age() -> Duration {
    DEFAULT_SESSION_MAX_AGE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Serialises a [`Duration`] as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
