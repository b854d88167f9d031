//! Durable attribute-update orchestration for immutable imaging object
//! stores.
//!
//! Stored instances are immutable per version: applying a study-level
//! attribute delta means staging a rewritten copy of every instance under a
//! new version tag, committing each new version in the index via
//! compare-and-swap, and deleting the superseded blobs — across four
//! independently-failing storage subsystems, with the whole workflow
//! resumable from a durable checkpoint after a crash at any point.
//!
//! Entry point is [`UpdateSaga::run`]; collaborating stores are injected as
//! trait objects (see [`stores`]), checkpoint persistence through a
//! [`checkpoint::CheckpointStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use restamp::checkpoint::MemoryCheckpointStore;
//! use restamp::stores::{MemoryFileStore, MemoryIndexStore, MemoryInstanceStore, MemoryMetadataStore};
//! use restamp::updater::AttributePatcher;
//! use restamp::{AttributeDelta, StudyUid, UpdateOptions, UpdateSaga};
//!
//! # async fn demo() -> Result<(), restamp::UpdateError> {
//! let saga = UpdateSaga::new(
//!     Arc::new(MemoryIndexStore::new()),
//!     Arc::new(MemoryInstanceStore::new()),
//!     Arc::new(MemoryMetadataStore::new()),
//!     Arc::new(MemoryFileStore::new()),
//!     Arc::new(AttributePatcher),
//!     Arc::new(MemoryCheckpointStore::new()),
//!     UpdateOptions::default(),
//! );
//! let delta = AttributeDelta::new().set("PatientName", "Doe^John");
//! let result = saga.run(&StudyUid::new("1.2.840.1"), &delta).await?;
//! # Ok(())
//! # }
//! ```

pub mod activities;
pub mod checkpoint;
pub mod error;
pub mod model;
pub mod planner;
pub mod retry;
pub mod saga;
pub mod stores;
pub mod updater;

pub use error::UpdateError;
pub use model::{AttributeDelta, AttributeSet, InstanceUid, SeriesUid, SopUid, StudyUid, VersionTag};
pub use retry::{RetryOptions, RetryPolicy};
pub use saga::{
    CancellationHandle, InstanceFailure, InstanceProgress, InstanceStatus, SagaStage,
    UpdateCheckpoint, UpdateOptions, UpdateSaga, WorkflowResult,
};
