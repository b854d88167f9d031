//! Collaborator store interfaces consumed by the update workflow.
//!
//! Each subsystem gets exactly the operations the core needs, behind a narrow
//! trait; production deployments plug real backends in, tests and local runs
//! use the in-memory substitutes in [`memory`].
//!
//! The stores fail independently of each other. The workflow never assumes a
//! transaction spanning two of them: cross-store consistency comes from
//! ordering (stage blobs, then swing the index, then delete the old blobs)
//! plus idempotent writes.

use async_trait::async_trait;

use crate::error::UpdateError;
use crate::model::{AttributeDelta, AttributeSet, InstanceUid, StudyUid, VersionTag};

pub mod memory;

pub use memory::{
    FaultPlan, MemoryFileStore, MemoryIndexStore, MemoryInstanceStore, MemoryMetadataStore,
};

/// Durable catalog of studies/series/instances and their current versions.
///
/// `compare_and_swap_version` is the sole mutual-exclusion mechanism between
/// this workflow and any concurrent update touching the same instance.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Current committed version of an instance, or `None` if the index no
    /// longer knows the instance.
    async fn current_version(&self, uid: &InstanceUid) -> Result<Option<VersionTag>, UpdateError>;

    /// Point the index at `new` iff it still points at `expected`; errors
    /// with [`UpdateError::ConcurrentModification`] otherwise.
    async fn compare_and_swap_version(
        &self,
        uid: &InstanceUid,
        expected: &VersionTag,
        new: &VersionTag,
    ) -> Result<(), UpdateError>;

    /// Apply the delta to the study-level index entry. Only attributes named
    /// in the delta change; idempotent.
    async fn update_study_attributes(
        &self,
        study: &StudyUid,
        delta: &AttributeDelta,
    ) -> Result<(), UpdateError>;
}

/// Enumerates the instance identifiers belonging to a study.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn list_instances(&self, study: &StudyUid) -> Result<Vec<InstanceUid>, UpdateError>;
}

/// Per-instance structured attribute documents, keyed by identity + version.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, uid: &InstanceUid, version: &VersionTag) -> Result<AttributeSet, UpdateError>;

    /// Writes are idempotent: putting identical content under an existing key
    /// succeeds vacuously.
    async fn put(
        &self,
        uid: &InstanceUid,
        version: &VersionTag,
        doc: &AttributeSet,
    ) -> Result<(), UpdateError>;

    /// Deleting an absent key is success.
    async fn delete(&self, uid: &InstanceUid, version: &VersionTag) -> Result<(), UpdateError>;
}

/// Bulk binary payloads, keyed by identity + version. Same idempotency
/// contract as [`MetadataStore`].
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn get(&self, uid: &InstanceUid, version: &VersionTag) -> Result<Vec<u8>, UpdateError>;

    async fn put(
        &self,
        uid: &InstanceUid,
        version: &VersionTag,
        payload: &[u8],
    ) -> Result<(), UpdateError>;

    async fn delete(&self, uid: &InstanceUid, version: &VersionTag) -> Result<(), UpdateError>;
}
