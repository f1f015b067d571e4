//! Session persistence across manager instances through the disk store.

use std::sync::Arc;
use std::time::Duration;

use engine::SessionManager;
use protocol::{OperationName, SessionId, SessionStore};
use serde_json::json;
use session_store::DiskSessionStore;
use tempfile::TempDir;

#[tokio::test]
async fn context_survives_a_restart_but_history_does_not() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(DiskSessionStore::new(temp.path()));

    let session = SessionManager::with_store(Arc::clone(&store));
    session.context_set("team", json!("ENG"));
    session.context_set("filters", json!({"state": "Todo", "assignee": "me"}));
    session.context_update("filters", json!({"state": "In Progress"}));
    session.record_operation(
        OperationName::new("IssueById").unwrap(),
        true,
        Duration::from_millis(40),
    );
    session.persist().await.unwrap();
    let id = session.id();
    drop(session);

    let reopened: Arc<dyn SessionStore> = Arc::new(DiskSessionStore::new(temp.path()));
    let restored = SessionManager::restore(id, reopened).await.unwrap().unwrap();

    assert_eq!(restored.id(), id);
    assert_eq!(restored.context_get("team"), Some(json!("ENG")));
    assert_eq!(
        restored.context_get("filters"),
        Some(json!({"state": "In Progress", "assignee": "me"}))
    );
    assert_eq!(restored.operation_stats().total, 0);
}

#[tokio::test]
async fn restoring_an_unknown_session_yields_none() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(DiskSessionStore::new(temp.path()));

    let restored = SessionManager::restore(SessionId::new(), store).await.unwrap();

    assert!(restored.is_none());
}

#[tokio::test]
async fn discarded_sessions_cannot_be_restored() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(DiskSessionStore::new(temp.path()));
    let session = SessionManager::with_store(Arc::clone(&store));
    session.context_set("team", json!("OPS"));
    session.persist().await.unwrap();

    session.discard().await.unwrap();

    assert!(SessionManager::restore(session.id(), store)
        .await
        .unwrap()
        .is_none());
}
