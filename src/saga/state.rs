//! Serializable workflow state: per-instance progress records, the checkpoint
//! document, and the terminal result.
//!
//! The coordinator is the sole mutator of these records. Any in-memory
//! counter it needs (succeeded/failed tallies, remaining work) is rehydrated
//! from the checkpoint, never kept as independent mutable state.

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::model::{AttributeDelta, InstanceUid, StudyUid, VersionTag};

/// Per-instance progress. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    /// Planned, no new version staged yet.
    Pending,
    /// New version staged in metadata/file stores; index still old.
    Rewritten,
    /// Index points at the new version. The commit point.
    Reconciled,
    /// Superseded version deleted.
    CleanedUp,
    /// A step exhausted retries or hit a non-retryable error.
    Failed,
}

impl InstanceStatus {
    fn rank(self) -> u8 {
        match self {
            InstanceStatus::Pending => 0,
            InstanceStatus::Rewritten => 1,
            InstanceStatus::Reconciled => 2,
            InstanceStatus::CleanedUp => 3,
            InstanceStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::CleanedUp | InstanceStatus::Failed)
    }
}

/// Progress record for one planned instance, persisted as part of the
/// workflow checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceProgress {
    pub uid: InstanceUid,
    pub status: InstanceStatus,
    pub old_version: Option<VersionTag>,
    pub new_version: Option<VersionTag>,
    pub error: Option<String>,
    /// Set when cleanup failed after retries; the instance still counts as
    /// succeeded (the orphaned old version is reclaimable storage, not a
    /// correctness problem).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_warning: Option<String>,
}

impl InstanceProgress {
    pub fn new(uid: InstanceUid) -> Self {
        Self {
            uid,
            status: InstanceStatus::Pending,
            old_version: None,
            new_version: None,
            error: None,
            cleanup_warning: None,
        }
    }

    /// Move the record forward. Regressions and transitions out of a terminal
    /// status are checkpoint corruption, surfaced as errors.
    pub(crate) fn advance(&mut self, to: InstanceStatus) -> Result<(), UpdateError> {
        if self.status.is_terminal() || to.rank() <= self.status.rank() {
            return Err(UpdateError::Checkpoint(format!(
                "invalid status transition {:?} -> {:?} for {}",
                self.status, to, self.uid
            )));
        }
        self.status = to;
        Ok(())
    }

    /// Succeeded means the new version is committed in the index; cleanup
    /// outcome does not affect it.
    pub fn succeeded(&self) -> bool {
        matches!(self.status, InstanceStatus::CleanedUp | InstanceStatus::Reconciled)
    }
}

/// Study-level workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStage {
    Planning,
    Executing,
    Finalizing,
    Completed,
    PartiallyFailed,
}

impl SagaStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, SagaStage::Completed | SagaStage::PartiallyFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceFailure {
    pub uid: InstanceUid,
    pub reason: String,
}

/// Terminal record of one study update, consumed by the caller/reporting
/// layer. Created once, at completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub study: StudyUid,
    pub stage: SagaStage,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<InstanceFailure>,
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        self.stage == SagaStage::Completed
    }
}

/// The durable workflow record, written atomically at every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCheckpoint {
    pub study: StudyUid,
    pub delta: AttributeDelta,
    pub stage: SagaStage,
    pub instances: Vec<InstanceProgress>,
    pub result: Option<WorkflowResult>,
}

impl UpdateCheckpoint {
    pub fn new(study: StudyUid, delta: AttributeDelta) -> Self {
        Self {
            study,
            delta,
            stage: SagaStage::Planning,
            instances: Vec::new(),
            result: None,
        }
    }
}
