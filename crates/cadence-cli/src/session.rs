//! File-backed checkpoints: one JSON file per thread

use async_trait::async_trait;
use cadence_agent::{
    Checkpoint, CheckpointError, CheckpointInfo, Checkpointer, ConversationState, require_thread_id,
};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores each thread as `<dir>/<thread_id>.json`
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    /// Default threads directory
    pub fn threads_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence")
            .join("threads")
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        require_thread_id(thread_id)?;
        let valid = thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !thread_id.starts_with('.');
        if !valid {
            return Err(CheckpointError::Storage(format!(
                "invalid thread id '{}': use letters, digits, '-', '_' or '.'",
                thread_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", thread_id)))
    }

    async fn read(path: &Path) -> Result<Checkpoint, CheckpointError> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError> {
        let path = self.path_for(thread_id)?;
        fs::create_dir_all(&self.dir).await?;

        let checkpoint = Checkpoint::new(thread_id, state.clone());
        let content = serde_json::to_string_pretty(&checkpoint)?;

        // Write then rename so a crash never leaves a half-written thread
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(thread = thread_id, path = %path.display(), "Saved checkpoint");
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError> {
        let path = self.path_for(thread_id)?;
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(Self::read(&path).await?.state))
    }

    async fn list(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        if !fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut infos = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match Self::read(&path).await {
                    Ok(checkpoint) => infos.push(checkpoint.info()),
                    Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable checkpoint: {}", e),
                }
            }
        }

        infos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(infos)
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(thread_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CheckpointError::NotFound(thread_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
