//! Durable checkpoint persistence for in-flight update workflows.
//!
//! The coordinator writes the whole [`UpdateCheckpoint`] record atomically at
//! every state transition; on restart it reloads the record and resumes.
//! Providers are datastores only — scheduling stays with the coordinator.

use async_trait::async_trait;

use crate::error::UpdateError;
use crate::model::StudyUid;
use crate::saga::UpdateCheckpoint;

pub mod fs;
pub mod memory;

pub use fs::FsCheckpointStore;
pub use memory::MemoryCheckpointStore;

/// Storage abstraction for one checkpoint document per study update.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint for a study, if one exists.
    async fn load(&self, study: &StudyUid) -> Result<Option<UpdateCheckpoint>, UpdateError>;

    /// Persist a checkpoint. Must be atomic: a concurrent reader observes
    /// either the previous document or the new one, never a torn write.
    async fn save(&self, checkpoint: &UpdateCheckpoint) -> Result<(), UpdateError>;

    /// Discard the checkpoint for a study. Removing an absent checkpoint is
    /// success.
    async fn remove(&self, study: &StudyUid) -> Result<(), UpdateError>;

    /// Enumerate studies with a stored checkpoint.
    async fn list(&self) -> Result<Vec<StudyUid>, UpdateError>;
}
