use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use protocol::{SessionId, SessionSnapshot, SessionStore, ToolkitError};
use tracing::debug;

/// [`SessionStore`] writing one JSON file per session under a directory.
///
/// The directory is created on first save. Writes go to a temporary sibling
/// file that is then renamed over `<dir>/<session id>.json`, so a reader never
/// observes a half-written snapshot.
#[derive(Debug, Clone)]
pub struct DiskSessionStore {
    dir: PathBuf,
}

impl DiskSessionStore {
    /// Creates a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the snapshot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `id`.
    pub fn path_for(&self, id: SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> ToolkitError {
    ToolkitError::persistence(format!("failed to {action} {}: {err}", path.display()))
}

#[async_trait]
impl SessionStore for DiskSessionStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), ToolkitError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| io_error("create", &self.dir, err))?;

        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|err| {
            ToolkitError::persistence(format!("failed to encode session snapshot: {err}"))
        })?;

        let path = self.path_for(snapshot.session_id);
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|err| io_error("write", &staging, err))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|err| io_error("replace", &path, err))?;

        debug!(session_id = %snapshot.session_id, path = %path.display(), "session snapshot saved");
        Ok(())
    }

    async fn load(&self, id: SessionId) -> Result<Option<SessionSnapshot>, ToolkitError> {
        let path = self.path_for(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error("read", &path, err)),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|err| {
            ToolkitError::persistence(format!(
                "corrupt session snapshot {}: {err}",
                path.display()
            ))
        })
    }

    async fn delete(&self, id: SessionId) -> Result<(), ToolkitError> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("delete", &path, err)),
        }
    }
}
