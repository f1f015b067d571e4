//! Session-scoped operation tracking and caller context.
//!
//! A [`SessionManager`] keeps the last [`MAX_OPERATION_HISTORY`] operation
//! outcomes, an arbitrary JSON context map, and activity timestamps. It can
//! persist itself through an injected [`SessionStore`] and be rebuilt from a
//! stored snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use protocol::{OperationName, SessionId, SessionSnapshot, SessionStore, Timestamp, ToolkitError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Capacity of the operation ring buffer.
pub const MAX_OPERATION_HISTORY: usize = 100;

/// Outcome of one executed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Operation name (`IssueById`, `batch_update`, ...).
    pub name: OperationName,
    /// Completion time.
    pub timestamp: Timestamp,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Aggregates over the retained operation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    /// Records in the window.
    pub total: usize,
    /// Successful records.
    pub successful: usize,
    /// Failed records.
    pub failed: usize,
    /// `successful / total` as a percentage; `0.0` for an empty window.
    pub success_rate: f64,
    /// Mean duration in milliseconds; `0.0` for an empty window.
    pub avg_duration_ms: f64,
}

#[derive(Debug)]
struct SessionState {
    history: VecDeque<OperationRecord>,
    context: HashMap<String, Value>,
    last_activity: Timestamp,
}

/// Tracks one caller session.
pub struct SessionManager {
    id: SessionId,
    created_at: Timestamp,
    state: Mutex<SessionState>,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionManager {
    /// Creates a fresh session that is never persisted.
    pub fn new() -> Self {
        Self::build(SessionId::new(), Timestamp::now(), HashMap::new(), None)
    }

    /// Creates a fresh session persisted through `store`.
    pub fn with_store(store: Arc<dyn SessionStore>) -> Self {
        Self::build(SessionId::new(), Timestamp::now(), HashMap::new(), Some(store))
    }

    /// Rebuilds the session `id` from `store`.
    ///
    /// Returns `Ok(None)` if no snapshot exists. Operation history is not part
    /// of the snapshot and starts empty.
    pub async fn restore(
        id: SessionId,
        store: Arc<dyn SessionStore>,
    ) -> Result<Option<Self>, ToolkitError> {
        let Some(snapshot) = store.load(id).await? else {
            debug!(session_id = %id, "no stored snapshot");
            return Ok(None);
        };
        info!(session_id = %id, keys = snapshot.context.len(), "session restored");

        let manager = Self::build(
            snapshot.session_id,
            snapshot.created_at,
            snapshot.context,
            Some(store),
        );
        manager.lock().last_activity = snapshot.last_activity;
        Ok(Some(manager))
    }

    fn build(
        id: SessionId,
        created_at: Timestamp,
        context: HashMap<String, Value>,
        store: Option<Arc<dyn SessionStore>>,
    ) -> Self {
        Self {
            id,
            created_at,
            state: Mutex::new(SessionState {
                history: VecDeque::with_capacity(MAX_OPERATION_HISTORY),
                context,
                last_activity: Timestamp::now(),
            }),
            store,
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the creation time.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns the time of the last mutating call.
    pub fn last_activity(&self) -> Timestamp {
        self.lock().last_activity
    }

    /// Returns `true` once the session has been idle for at least `max_age`.
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.last_activity().elapsed() >= max_age
    }

    // -----------------------------------------------------------------------
    // Operation history
    // -----------------------------------------------------------------------

    /// Appends an outcome, evicting the oldest once the buffer holds
    /// [`MAX_OPERATION_HISTORY`] records.
    pub fn record_operation(&self, name: OperationName, success: bool, duration: Duration) {
        let mut state = self.lock();
        if state.history.len() == MAX_OPERATION_HISTORY {
            state.history.pop_front();
        }
        state.history.push_back(OperationRecord {
            name,
            timestamp: Timestamp::now(),
            success,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        });
        state.last_activity = Timestamp::now();
    }

    /// Aggregates the retained window.
    pub fn operation_stats(&self) -> OperationStats {
        let state = self.lock();
        let total = state.history.len();
        let successful = state.history.iter().filter(|r| r.success).count();
        let (success_rate, avg_duration_ms) = if total == 0 {
            (0.0, 0.0)
        } else {
            let total_ms: u64 = state.history.iter().map(|r| r.duration_ms).sum();
            (
                successful as f64 / total as f64 * 100.0,
                total_ms as f64 / total as f64,
            )
        };
        OperationStats {
            total,
            successful,
            failed: total - successful,
            success_rate,
            avg_duration_ms,
        }
    }

    /// Returns up to `limit` most recent records, oldest first.
    pub fn recent_operations(&self, limit: usize) -> Vec<OperationRecord> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Context
    // -----------------------------------------------------------------------

    /// Returns a copy of the context value for `key`.
    pub fn context_get(&self, key: &str) -> Option<Value> {
        self.lock().context.get(key).cloned()
    }

    /// Sets `key` to `value`, returning the previous value.
    pub fn context_set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        let mut state = self.lock();
        state.last_activity = Timestamp::now();
        state.context.insert(key.into(), value)
    }

    /// Merges `patch` into the value at `key`.
    ///
    /// When both the stored value and `patch` are JSON objects, the fields of
    /// `patch` overwrite or extend the stored object. In every other case
    /// `patch` replaces the stored value.
    pub fn context_update(&self, key: impl Into<String>, patch: Value) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.last_activity = Timestamp::now();
        let key = key.into();
        let replacement = match (state.context.get_mut(&key), patch) {
            (Some(Value::Object(existing)), Value::Object(fields)) => {
                existing.extend(fields);
                None
            }
            (_, other) => Some(other),
        };
        if let Some(value) = replacement {
            state.context.insert(key, value);
        }
    }

    /// Removes `key`, returning its value.
    pub fn context_delete(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        state.last_activity = Timestamp::now();
        state.context.remove(key)
    }

    /// Removes every context value.
    pub fn context_clear(&self) {
        let mut state = self.lock();
        state.last_activity = Timestamp::now();
        state.context.clear();
    }

    /// Returns a copy of the whole context map.
    pub fn context(&self) -> HashMap<String, Value> {
        self.lock().context.clone()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Returns the persisted form of this session.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            session_id: self.id,
            context: state.context.clone(),
            last_activity: state.last_activity,
            created_at: self.created_at,
        }
    }

    /// Writes the snapshot through the configured store.
    ///
    /// A session created without a store has nothing to persist and returns
    /// `Ok(())`. Store failures propagate unchanged.
    pub async fn persist(&self) -> Result<(), ToolkitError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let snapshot = self.snapshot();
        store.save(&snapshot).await?;
        debug!(session_id = %self.id, "session persisted");
        Ok(())
    }

    /// Deletes the stored snapshot, if any.
    pub async fn discard(&self) -> Result<(), ToolkitError> {
        match &self.store {
            Some(store) => store.delete(self.id).await,
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
