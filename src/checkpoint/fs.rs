//! Filesystem-backed checkpoint provider: one JSON document per study.
//!
//! Saves go through a sidecar temp file followed by a rename, so a crash
//! mid-write leaves either the previous document or the new one on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::CheckpointStore;
use crate::error::UpdateError;
use crate::model::StudyUid;
use crate::saga::UpdateCheckpoint;

pub struct FsCheckpointStore {
    root: PathBuf,
    pretty: bool,
}

impl FsCheckpointStore {
    /// Create a store rooted at the given directory. If `reset_on_create` is
    /// true, delete any existing data under the root first.
    pub fn new(root: impl AsRef<Path>, reset_on_create: bool) -> Self {
        let path = root.as_ref().to_path_buf();
        if reset_on_create {
            let _ = std::fs::remove_dir_all(&path);
        }
        let _ = std::fs::create_dir_all(&path);
        Self { root: path, pretty: true }
    }

    /// Same, but with compact (single-line) JSON documents.
    pub fn new_compact(root: impl AsRef<Path>, reset_on_create: bool) -> Self {
        let mut store = Self::new(root, reset_on_create);
        store.pretty = false;
        store
    }

    fn doc_path(&self, study: &StudyUid) -> PathBuf {
        self.root.join(format!("{}.json", study.as_str()))
    }
}

#[async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn load(&self, study: &StudyUid) -> Result<Option<UpdateCheckpoint>, UpdateError> {
        let path = self.doc_path(study);
        match fs::read_to_string(&path).await {
            Ok(data) => {
                let checkpoint: UpdateCheckpoint = serde_json::from_str(&data)
                    .map_err(|e| UpdateError::Checkpoint(format!("corrupt checkpoint {}: {e}", path.display())))?;
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(UpdateError::Checkpoint(e.to_string())),
        }
    }

    async fn save(&self, checkpoint: &UpdateCheckpoint) -> Result<(), UpdateError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| UpdateError::Checkpoint(e.to_string()))?;
        let path = self.doc_path(&checkpoint.study);
        let tmp = path.with_extension("json.tmp");
        let data = if self.pretty {
            serde_json::to_vec_pretty(checkpoint)?
        } else {
            serde_json::to_vec(checkpoint)?
        };
        fs::write(&tmp, &data)
            .await
            .map_err(|e| UpdateError::Checkpoint(e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| UpdateError::Checkpoint(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, study: &StudyUid) -> Result<(), UpdateError> {
        match fs::remove_file(self.doc_path(study)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UpdateError::Checkpoint(e.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<StudyUid>, UpdateError> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(UpdateError::Checkpoint(e.to_string())),
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    out.push(StudyUid::new(stem));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}
