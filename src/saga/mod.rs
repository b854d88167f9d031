//! The saga coordinator: sequences rewrite → reconcile → cleanup across all
//! instances of a study, checkpointing progress at every transition.
//!
//! The coordinator task is logically single-threaded: it owns every status
//! mutation and persists the checkpoint before scheduling an instance's next
//! step. Per-instance steps run as independent futures with bounded fan-out;
//! the suspension points are exactly the activity-invocation boundaries.
//! Coordinator decision logic performs no wall-clock reads and mints no
//! random identifiers — successor versions are derived, and backoff sleeps
//! live inside the retry helper wrapping each activity call — so re-entering
//! from a checkpoint after a crash reproduces the same decisions.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tracing::{info, warn};

use crate::activities::{CleanupActivity, ReconcileActivity, RewriteActivity};
use crate::checkpoint::CheckpointStore;
use crate::error::UpdateError;
use crate::model::{AttributeDelta, StudyUid, VersionTag};
use crate::planner;
use crate::retry::{with_retry, RetryOptions};
use crate::stores::{FileStore, IndexStore, InstanceStore, MetadataStore};
use crate::updater::InstanceUpdater;

mod state;

pub use state::{
    InstanceFailure, InstanceProgress, InstanceStatus, SagaStage, UpdateCheckpoint, WorkflowResult,
};

/// Configuration for the update workflow.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Retry policy shared by all activity kinds, with per-kind overrides.
    pub retry: RetryOptions,
    /// Maximum simultaneous in-flight instance updates; bounds pressure on
    /// the storage subsystems.
    pub max_parallel_updates: usize,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            retry: RetryOptions::default(),
            max_parallel_updates: 4,
        }
    }
}

/// Operator-facing cancellation switch. Cancelling stops the coordinator from
/// scheduling further steps; already-started activities finish or fail
/// naturally and every unfinished instance is reported in the result.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct StepOutcome {
    idx: usize,
    step: StepResult,
}

enum StepResult {
    Rewritten { old: VersionTag, new: VersionTag },
    RewriteFailed(UpdateError),
    Reconciled,
    ReconcileFailed(UpdateError),
    CleanedUp,
    CleanupFailed(UpdateError),
}

type StepFuture = Pin<Box<dyn Future<Output = StepOutcome> + Send>>;

struct ActivitySet {
    rewrite: Arc<RewriteActivity>,
    reconcile: Arc<ReconcileActivity>,
    cleanup: Arc<CleanupActivity>,
    retry: RetryOptions,
}

/// Durable update orchestration over one study.
pub struct UpdateSaga {
    index: Arc<dyn IndexStore>,
    instances: Arc<dyn InstanceStore>,
    metadata: Arc<dyn MetadataStore>,
    files: Arc<dyn FileStore>,
    updater: Arc<dyn InstanceUpdater>,
    checkpoints: Arc<dyn CheckpointStore>,
    options: UpdateOptions,
    cancellation: CancellationHandle,
}

impl UpdateSaga {
    pub fn new(
        index: Arc<dyn IndexStore>,
        instances: Arc<dyn InstanceStore>,
        metadata: Arc<dyn MetadataStore>,
        files: Arc<dyn FileStore>,
        updater: Arc<dyn InstanceUpdater>,
        checkpoints: Arc<dyn CheckpointStore>,
        options: UpdateOptions,
    ) -> Self {
        // Install a default subscriber if none set (ok to call many times)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
            )
            .try_init();

        Self {
            index,
            instances,
            metadata,
            files,
            updater,
            checkpoints,
            options,
            cancellation: CancellationHandle::new(),
        }
    }

    /// Handle for cancelling this workflow from another task.
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    /// Run (or resume) the update workflow for `study`.
    ///
    /// Checkpoints are keyed by study: if a checkpoint already exists, the
    /// workflow resumes from it — already-terminal instances are not re-run,
    /// and a terminal checkpoint short-circuits to its recorded result. The
    /// delta is immutable once the workflow starts; on resume the
    /// checkpointed delta wins.
    pub async fn run(
        &self,
        study: &StudyUid,
        delta: &AttributeDelta,
    ) -> Result<WorkflowResult, UpdateError> {
        let mut cp = match self.checkpoints.load(study).await? {
            Some(cp) if cp.stage.is_terminal() => {
                info!(study = %study, stage = ?cp.stage, "update already finished; returning recorded result");
                return cp
                    .result
                    .ok_or_else(|| UpdateError::Checkpoint("terminal checkpoint missing its result".into()));
            }
            Some(cp) => {
                if cp.delta != *delta {
                    warn!(study = %study, "requested delta differs from the in-flight one; resuming with the checkpointed delta");
                }
                info!(study = %study, stage = ?cp.stage, "resuming update workflow");
                cp
            }
            None => UpdateCheckpoint::new(study.clone(), delta.clone()),
        };

        if cp.stage == SagaStage::Planning {
            let planned = planner::plan(self.instances.as_ref(), &cp.study).await?;
            info!(study = %study, instances = planned.len(), "update planned");
            cp.instances = planned.into_iter().map(InstanceProgress::new).collect();
            cp.stage = SagaStage::Executing;
            self.checkpoints.save(&cp).await?;
        }

        if cp.stage == SagaStage::Executing {
            self.execute(&mut cp).await?;
            cp.stage = SagaStage::Finalizing;
            self.checkpoints.save(&cp).await?;
        }

        self.finalize(&mut cp).await
    }

    /// Drive every live instance through its remaining steps with bounded
    /// fan-out. One instance failing never removes work for its siblings.
    async fn execute(&self, cp: &mut UpdateCheckpoint) -> Result<(), UpdateError> {
        let acts = ActivitySet {
            rewrite: Arc::new(RewriteActivity::new(
                self.index.clone(),
                self.metadata.clone(),
                self.files.clone(),
                self.updater.clone(),
            )),
            reconcile: Arc::new(ReconcileActivity::new(self.index.clone())),
            cleanup: Arc::new(CleanupActivity::new(self.metadata.clone(), self.files.clone())),
            retry: self.options.retry.clone(),
        };
        let delta = cp.delta.clone();
        let limit = self.options.max_parallel_updates.max(1);

        let mut queue: VecDeque<usize> = (0..cp.instances.len())
            .filter(|&i| {
                let p = &cp.instances[i];
                // Reconciled with a recorded cleanup warning already exhausted
                // its best-effort cleanup; everything else live is schedulable.
                !p.status.is_terminal()
                    && !(p.status == InstanceStatus::Reconciled && p.cleanup_warning.is_some())
            })
            .collect();
        let mut in_flight: FuturesUnordered<StepFuture> = FuturesUnordered::new();

        loop {
            if !self.cancellation.is_cancelled() {
                while in_flight.len() < limit {
                    let Some(idx) = queue.pop_front() else { break };
                    if let Some(fut) = next_step(&acts, idx, &cp.instances[idx], &delta) {
                        in_flight.push(fut);
                    }
                }
            }
            let Some(outcome) = in_flight.next().await else { break };
            let followup = self.apply_step(cp, outcome).await?;
            if self.cancellation.is_cancelled() {
                continue;
            }
            if let Some(idx) = followup {
                if let Some(fut) = next_step(&acts, idx, &cp.instances[idx], &delta) {
                    in_flight.push(fut);
                }
            }
        }

        if self.cancellation.is_cancelled() {
            let mut dirty = false;
            for p in cp.instances.iter_mut() {
                if p.status == InstanceStatus::Pending {
                    p.error = Some("update cancelled before this instance was scheduled".to_string());
                    p.advance(InstanceStatus::Failed)?;
                    dirty = true;
                }
            }
            if dirty {
                self.checkpoints.save(cp).await?;
            }
            warn!(study = %cp.study, "update cancelled; unfinished instances will be reported");
        }

        Ok(())
    }

    /// Apply one step outcome to the checkpoint and persist it. Returns the
    /// instance index if it has a next step to schedule. Sole mutation site
    /// for instance status.
    async fn apply_step(
        &self,
        cp: &mut UpdateCheckpoint,
        outcome: StepOutcome,
    ) -> Result<Option<usize>, UpdateError> {
        let idx = outcome.idx;
        let followup = {
            let progress = &mut cp.instances[idx];
            match outcome.step {
                StepResult::Rewritten { old, new } => {
                    progress.old_version = Some(old);
                    progress.new_version = Some(new);
                    progress.advance(InstanceStatus::Rewritten)?;
                    Some(idx)
                }
                StepResult::RewriteFailed(e) => {
                    warn!(instance = %progress.uid, error = %e, "instance rewrite failed");
                    progress.error = Some(e.to_string());
                    progress.advance(InstanceStatus::Failed)?;
                    None
                }
                StepResult::Reconciled => {
                    progress.advance(InstanceStatus::Reconciled)?;
                    Some(idx)
                }
                StepResult::ReconcileFailed(e) => {
                    warn!(
                        instance = %progress.uid,
                        error = %e,
                        "reconciliation failed; staged version stays uncommitted"
                    );
                    progress.error = Some(e.to_string());
                    progress.advance(InstanceStatus::Failed)?;
                    None
                }
                StepResult::CleanedUp => {
                    progress.advance(InstanceStatus::CleanedUp)?;
                    None
                }
                StepResult::CleanupFailed(e) => {
                    warn!(instance = %progress.uid, error = %e, "cleanup failed; old version left orphaned");
                    progress.cleanup_warning = Some(e.to_string());
                    None
                }
            }
        };
        self.checkpoints.save(cp).await?;
        Ok(followup)
    }

    /// Apply the study-level attribute change, compute the terminal result,
    /// and persist it in the checkpoint.
    async fn finalize(&self, cp: &mut UpdateCheckpoint) -> Result<WorkflowResult, UpdateError> {
        if self.cancellation.is_cancelled() {
            info!(study = %cp.study, "cancelled; leaving study-level attributes untouched");
        } else {
            // Applies at study scope regardless of per-instance failures.
            let study = cp.study.clone();
            let delta = cp.delta.clone();
            with_retry(&self.options.retry.default, "update-study-attributes", || {
                self.index.update_study_attributes(&study, &delta)
            })
            .await?;
        }

        let mut succeeded = 0usize;
        let mut failures = Vec::new();
        for p in &cp.instances {
            if p.succeeded() {
                succeeded += 1;
            } else {
                let reason = p
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("update stopped at status {:?}", p.status));
                failures.push(InstanceFailure {
                    uid: p.uid.clone(),
                    reason,
                });
            }
        }

        let failed = failures.len();
        cp.stage = if failed == 0 {
            SagaStage::Completed
        } else {
            SagaStage::PartiallyFailed
        };
        let result = WorkflowResult {
            study: cp.study.clone(),
            stage: cp.stage,
            succeeded,
            failed,
            failures,
        };
        cp.result = Some(result.clone());
        self.checkpoints.save(cp).await?;

        if result.is_success() {
            info!(study = %cp.study, succeeded, "study update completed");
        } else {
            warn!(study = %cp.study, succeeded, failed, "study update partially failed");
        }
        Ok(result)
    }
}

/// Build the next step future for an instance, or `None` if it has none.
/// Each future owns clones of what it needs; nothing borrows the checkpoint.
fn next_step(
    acts: &ActivitySet,
    idx: usize,
    progress: &InstanceProgress,
    delta: &AttributeDelta,
) -> Option<StepFuture> {
    match progress.status {
        InstanceStatus::Pending => {
            let act = acts.rewrite.clone();
            let policy = acts.retry.for_rewrite().clone();
            let uid = progress.uid.clone();
            let delta = delta.clone();
            Some(Box::pin(async move {
                let step = match with_retry(&policy, "rewrite-instance", || act.run(&uid, &delta)).await {
                    Ok((old, new)) => StepResult::Rewritten { old, new },
                    Err(e) => StepResult::RewriteFailed(e),
                };
                StepOutcome { idx, step }
            }))
        }
        InstanceStatus::Rewritten => {
            let (Some(old), Some(new)) = (progress.old_version.clone(), progress.new_version.clone())
            else {
                let uid = progress.uid.clone();
                return Some(Box::pin(async move {
                    StepOutcome {
                        idx,
                        step: StepResult::ReconcileFailed(UpdateError::Checkpoint(format!(
                            "rewritten instance {uid} has no recorded versions"
                        ))),
                    }
                }));
            };
            let act = acts.reconcile.clone();
            let policy = acts.retry.for_reconcile().clone();
            let uid = progress.uid.clone();
            Some(Box::pin(async move {
                let step = match with_retry(&policy, "reconcile-instance", || act.run(&uid, &old, &new)).await
                {
                    Ok(()) => StepResult::Reconciled,
                    Err(e) => StepResult::ReconcileFailed(e),
                };
                StepOutcome { idx, step }
            }))
        }
        InstanceStatus::Reconciled => {
            let old = progress.old_version.clone()?;
            let act = acts.cleanup.clone();
            let policy = acts.retry.for_cleanup().clone();
            let uid = progress.uid.clone();
            Some(Box::pin(async move {
                let step = match with_retry(&policy, "cleanup-instance", || act.run(&uid, &old)).await {
                    Ok(()) => StepResult::CleanedUp,
                    Err(e) => StepResult::CleanupFailed(UpdateError::Cleanup {
                        instance: uid.to_string(),
                        version: old.to_string(),
                        message: e.to_string(),
                    }),
                };
                StepOutcome { idx, step }
            }))
        }
        InstanceStatus::CleanedUp | InstanceStatus::Failed => None,
    }
}
