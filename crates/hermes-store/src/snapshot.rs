use std::path::{Path, PathBuf};
use std::sync::Arc;

use hermes_core::AppError;
use hermes_core::job_store::JobSnapshot;
use hermes_core::traits::SnapshotStore;
use tokio::sync::Mutex;

use crate::config::StoreConfig;

/// Stores the job table as one JSON document.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous snapshot intact. Clones share a
/// write lock.
#[derive(Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> AppError {
    AppError::PersistenceError(format!("Failed to {action} {}: {e}", path.display()))
}

impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &JobSnapshot) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create directory", parent, e))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error("replace", &self.path, e))?;

        tracing::debug!(path = %self.path.display(), jobs = snapshot.jobs.len(), "Job snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<JobSnapshot, AppError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No job snapshot yet, starting empty");
                return Ok(JobSnapshot::default());
            }
            Err(e) => return Err(io_error("read", &self.path, e)),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(JobSnapshot::default());
        }
        serde_json::from_slice(&raw).map_err(|e| {
            AppError::PersistenceError(format!(
                "Corrupt job snapshot {}: {e}",
                self.path.display()
            ))
        })
    }
}
