//! In-memory checkpoint provider for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::CheckpointStore;
use crate::error::UpdateError;
use crate::model::StudyUid;
use crate::saga::UpdateCheckpoint;

#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<HashMap<StudyUid, UpdateCheckpoint>>,
    saves: AtomicU64,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves observed; transitions persist one save each.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, study: &StudyUid) -> Result<Option<UpdateCheckpoint>, UpdateError> {
        Ok(self.inner.lock().await.get(study).cloned())
    }

    async fn save(&self, checkpoint: &UpdateCheckpoint) -> Result<(), UpdateError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lock()
            .await
            .insert(checkpoint.study.clone(), checkpoint.clone());
        Ok(())
    }

    async fn remove(&self, study: &StudyUid) -> Result<(), UpdateError> {
        self.inner.lock().await.remove(study);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StudyUid>, UpdateError> {
        let mut out: Vec<StudyUid> = self.inner.lock().await.keys().cloned().collect();
        out.sort();
        Ok(out)
    }
}
