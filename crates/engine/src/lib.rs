//! IssueBridge orchestration engine.
//!
//! This crate turns the port traits of [`protocol`] into a resilient client
//! for long-running callers: single requests go through [`QueryExecutor`],
//! bulk mutations through [`BatchExecutor`], capabilities are obtained from
//! [`ModuleLoader`], and outcomes are tracked by [`SessionManager`].
//!
//! ## Architectural Layer
//!
//! **Orchestration.** Components here sequence calls to the transport and
//! store ports. They never build domain request bodies and never interpret
//! response `data`.
//!
//! ## Composition
//!
//! Every component receives its collaborators through its constructor; there
//! is no global state. A typical composition root:
//!
//! ```ignore
//! let session = Arc::new(SessionManager::with_store(store));
//! let cache = Arc::new(ResponseCache::new(&config.cache));
//! let executor = Arc::new(
//!     QueryExecutor::new(&config.executor, transport)
//!         .with_cache(cache)
//!         .with_session(session),
//! );
//! let batches = BatchExecutor::new(Arc::clone(&executor), &config.batch);
//! ```
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`cache`] | `ResponseCache` |
//! | [`executor`] | `QueryExecutor` |
//! | [`session`] | `SessionManager`, `OperationRecord`, `OperationStats` |
//! | [`loader`] | `ModuleLoader`, `Module`, `ModuleState` |
//! | [`batch`] | `BatchExecutor`, `BatchOptions`, `BatchSummary`, `BatchProgress` |

pub mod batch;
pub mod cache;
pub mod executor;
pub mod loader;
pub mod session;

pub use batch::{
    BatchExecutor, BatchItemResult, BatchKind, BatchOptions, BatchProgress, BatchSummary,
};
pub use cache::{CacheStats, ResponseCache};
pub use executor::{QueryExecutor, MAX_BACKOFF};
pub use loader::{
    DependencyReport, IntoAnyModule, Module, ModuleDependencies, ModuleFactory, ModuleLoader,
    ModuleState,
};
pub use session::{OperationRecord, OperationStats, SessionManager, MAX_OPERATION_HISTORY};
