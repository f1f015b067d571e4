//! IssueBridge session persistence adapters.
//!
//! Implements [`protocol::SessionStore`] twice:
//!
//! - [`MemorySessionStore`]: snapshots in a process-local map. Survives
//!   `SessionManager` instances, not process restarts.
//! - [`DiskSessionStore`]: one JSON file per session, `<dir>/<session id>.json`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File-system access and snapshot encoding live here;
//! the `engine` crate sees only [`protocol::SessionStore`].

mod disk;
mod memory;

use std::sync::Arc;

use protocol::{Persistence, SessionStore};

pub use disk::DiskSessionStore;
pub use memory::MemorySessionStore;

/// Builds the store selected by `persistence`.
pub fn from_config(persistence: &Persistence) -> Arc<dyn SessionStore> {
    match persistence {
        Persistence::Memory => Arc::new(MemorySessionStore::new()),
        Persistence::Disk { dir } => Arc::new(DiskSessionStore::new(dir.clone())),
    }
}
