//! Rewrite one instance's metadata + payload and stage them under a new
//! version tag.

use std::sync::Arc;

use tracing::debug;

use crate::error::UpdateError;
use crate::model::{AttributeDelta, InstanceUid, VersionTag};
use crate::stores::{FileStore, IndexStore, MetadataStore};
use crate::updater::InstanceUpdater;

pub struct RewriteActivity {
    index: Arc<dyn IndexStore>,
    metadata: Arc<dyn MetadataStore>,
    files: Arc<dyn FileStore>,
    updater: Arc<dyn InstanceUpdater>,
}

impl RewriteActivity {
    pub fn new(
        index: Arc<dyn IndexStore>,
        metadata: Arc<dyn MetadataStore>,
        files: Arc<dyn FileStore>,
        updater: Arc<dyn InstanceUpdater>,
    ) -> Self {
        Self {
            index,
            metadata,
            files,
            updater,
        }
    }

    /// Stage a rewritten copy of `uid` under the successor of its current
    /// version. Returns `(old, new)` tags.
    ///
    /// Idempotent: the successor tag is derived from (current tag, delta), so
    /// a retry after a crash-before-acknowledgment re-stages the same tag with
    /// identical content instead of minting a second version. The index is not
    /// touched here — readers keep resolving the old version until
    /// reconciliation commits the new one.
    pub async fn run(
        &self,
        uid: &InstanceUid,
        delta: &AttributeDelta,
    ) -> Result<(VersionTag, VersionTag), UpdateError> {
        let old = self
            .index
            .current_version(uid)
            .await?
            .ok_or_else(|| UpdateError::StaleIndex(uid.to_string()))?;

        let attrs = self.metadata.get(uid, &old).await?;
        let payload = self.files.get(uid, &old).await?;

        let (new_attrs, new_payload) = self.updater.apply(&attrs, &payload, delta)?;
        let new = old.successor(delta);

        // Payload before metadata; both before any index change.
        self.files.put(uid, &new, &new_payload).await?;
        self.metadata.put(uid, &new, &new_attrs).await?;

        debug!(instance = %uid, old = %old, new = %new, "staged rewritten instance");
        Ok((old, new))
    }
}
