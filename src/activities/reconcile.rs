//! Commit a staged instance version as canonical in the index.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::UpdateError;
use crate::model::{InstanceUid, VersionTag};
use crate::stores::IndexStore;

pub struct ReconcileActivity {
    index: Arc<dyn IndexStore>,
}

impl ReconcileActivity {
    pub fn new(index: Arc<dyn IndexStore>) -> Self {
        Self { index }
    }

    /// Swing the index from `old` to `new` for `uid`. This is the commit
    /// point for the instance: after it returns, every index reader sees the
    /// new version.
    ///
    /// Compare-and-swap guards against an unrelated update racing the same
    /// instance; a mismatch surfaces as
    /// [`UpdateError::ConcurrentModification`], which the coordinator treats
    /// as a non-retryable per-instance failure.
    pub async fn run(
        &self,
        uid: &InstanceUid,
        old: &VersionTag,
        new: &VersionTag,
    ) -> Result<(), UpdateError> {
        match self.index.compare_and_swap_version(uid, old, new).await {
            Ok(()) => {}
            // A crash between the swap and the checkpoint write replays this
            // step; finding the index already at `new` means the previous
            // attempt committed.
            Err(UpdateError::ConcurrentModification { actual, .. }) if actual == new.as_str() => {
                debug!(instance = %uid, version = %new, "index already at the new version");
            }
            Err(e) => return Err(e),
        }
        info!(instance = %uid, version = %new, "instance reconciled");
        Ok(())
    }
}
