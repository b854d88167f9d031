//! Delete the superseded version of an instance once the index points at the
//! new one.

use std::sync::Arc;

use tracing::debug;

use crate::error::UpdateError;
use crate::model::{InstanceUid, VersionTag};
use crate::stores::{FileStore, MetadataStore};

pub struct CleanupActivity {
    metadata: Arc<dyn MetadataStore>,
    files: Arc<dyn FileStore>,
}

impl CleanupActivity {
    pub fn new(metadata: Arc<dyn MetadataStore>, files: Arc<dyn FileStore>) -> Self {
        Self { metadata, files }
    }

    /// Delete the old metadata document and payload. Invoked only after
    /// reconciliation succeeded, so the index no longer references `old`.
    /// Both deletes treat "already absent" as success, making a retried
    /// cleanup after a crash a no-op. The new version is never touched:
    /// once reconciled, forward is the only direction.
    pub async fn run(&self, uid: &InstanceUid, old: &VersionTag) -> Result<(), UpdateError> {
        self.metadata.delete(uid, old).await?;
        self.files.delete(uid, old).await?;
        debug!(instance = %uid, version = %old, "superseded version removed");
        Ok(())
    }
}
