//! Core domain for IssueBridge.
//!
//! This crate contains the request/response shapes, newtype identifiers,
//! error taxonomy, configuration, and port traits used throughout the
//! workspace. Adapter crates implement the traits defined here; they never
//! add orchestration rules.
//!
//! ## Architectural Layer
//!
//! **Domain types + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; `http-transport` and `session-store` define
//! *how* to supply it, and `engine` drives it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`SessionId`, `ModuleName`, etc.) |
//! | [`types`] | `Request`, `Response`, `SessionSnapshot`, `Timestamp` |
//! | [`errors`] | `ToolkitError` and `RetryPolicy` |
//! | [`config`] | `ToolkitConfig` and its sections |
//! | [`ports`] | `Transport` and `SessionStore` traits |

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{
    BatchConfig, CacheConfig, ExecutorConfig, Persistence, SessionConfig, ToolkitConfig, REDACTED,
};
pub use errors::{RetryPolicy, ToolkitError};
pub use identifiers::{BatchJobId, ModuleName, OperationName, SessionId};
pub use ports::{SessionStore, Transport, DEFAULT_RETRY_AFTER};
pub use types::{GraphQlErrorEntry, Request, Response, SessionSnapshot, Timestamp};
