use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use protocol::{SessionId, SessionSnapshot, SessionStore, ToolkitError};

/// Process-local [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    snapshots: Mutex<HashMap<SessionId, SessionSnapshot>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.snapshots().is_empty()
    }

    fn snapshots(&self) -> MutexGuard<'_, HashMap<SessionId, SessionSnapshot>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), ToolkitError> {
        self.snapshots()
            .insert(snapshot.session_id, snapshot.clone());
        Ok(())
    }

    async fn load(&self, id: SessionId) -> Result<Option<SessionSnapshot>, ToolkitError> {
        Ok(self.snapshots().get(&id).cloned())
    }

    async fn delete(&self, id: SessionId) -> Result<(), ToolkitError> {
        self.snapshots().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Timestamp;
    use serde_json::json;

    fn snapshot(id: SessionId, team: &str) -> SessionSnapshot {
        let now = Timestamp::now();
        SessionSnapshot {
            session_id: id,
            context: HashMap::from([("team".to_string(), json!(team))]),
            last_activity: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let store = MemorySessionStore::new();
        let id = SessionId::new();

        store.save(&snapshot(id, "ENG")).await.unwrap();
        store.save(&snapshot(id, "OPS")).await.unwrap();

        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.context["team"], json!("OPS"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_and_deleted_snapshots_load_as_none() {
        let store = MemorySessionStore::new();
        let id = SessionId::new();
        assert!(store.load(id).await.unwrap().is_none());

        store.save(&snapshot(id, "ENG")).await.unwrap();
        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();

        assert!(store.load(id).await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
