//! Update planning: discover the instances in scope for a study-level delta
//! and produce an ordered work list.

use tracing::debug;

use crate::error::UpdateError;
use crate::model::{InstanceUid, StudyUid};
use crate::stores::InstanceStore;

/// Enumerate the instances under `study`, sorted and deduplicated.
///
/// Ordering is irrelevant for correctness but deterministic so that retries
/// are reproducible. An empty study is a terminal planning failure. Read-only.
pub async fn plan(store: &dyn InstanceStore, study: &StudyUid) -> Result<Vec<InstanceUid>, UpdateError> {
    let mut uids = store.list_instances(study).await?;
    if uids.is_empty() {
        return Err(UpdateError::NotFound(format!("study {study} has no instances")));
    }
    uids.sort();
    uids.dedup();
    debug!(study = %study, count = uids.len(), "planned instance work list");
    Ok(uids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryInstanceStore;

    #[tokio::test]
    async fn plan_sorts_and_dedups() {
        let store = MemoryInstanceStore::new();
        let study = StudyUid::new("s1");
        for sop in ["i3", "i1", "i2", "i1"] {
            store.add(&InstanceUid::new("s1", "se1", sop)).await;
        }
        let planned = plan(&store, &study).await.unwrap();
        let sops: Vec<&str> = planned.iter().map(|u| u.sop.as_str()).collect();
        assert_eq!(sops, vec!["i1", "i2", "i3"]);
    }

    #[tokio::test]
    async fn empty_study_is_not_found() {
        let store = MemoryInstanceStore::new();
        let err = plan(&store, &StudyUid::new("missing")).await.unwrap_err();
        assert!(matches!(err, UpdateError::NotFound(_)));
    }
}
