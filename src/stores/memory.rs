//! In-memory store substitutes for tests and local runs.
//!
//! Each store carries a [`FaultPlan`] so tests can inject transient faults,
//! permanent faults, and latency per operation/instance without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{FileStore, IndexStore, InstanceStore, MetadataStore};
use crate::error::UpdateError;
use crate::model::{AttributeDelta, AttributeSet, InstanceUid, StudyUid, VersionTag};

enum Fault {
    Times(u32),
    Forever,
}

/// Injectable faults keyed by `"<op>:<key>"`, e.g. `"metadata.put:s/se/i"`.
#[derive(Default)]
pub struct FaultPlan {
    failures: Mutex<HashMap<String, Fault>>,
    delays: Mutex<HashMap<String, u64>>,
}

impl FaultPlan {
    fn slot(op: &str, key: &str) -> String {
        format!("{op}:{key}")
    }

    /// Fail the next `times` calls of `op` for `key` with a transient error.
    pub async fn fail_times(&self, op: &str, key: &str, times: u32) {
        self.failures
            .lock()
            .await
            .insert(Self::slot(op, key), Fault::Times(times));
    }

    /// Fail every call of `op` for `key` with a transient error.
    pub async fn fail_forever(&self, op: &str, key: &str) {
        self.failures.lock().await.insert(Self::slot(op, key), Fault::Forever);
    }

    /// Delay every call of `op` for `key` by `ms` milliseconds.
    pub async fn slow(&self, op: &str, key: &str, ms: u64) {
        self.delays.lock().await.insert(Self::slot(op, key), ms);
    }

    async fn check(&self, op: &str, key: &str) -> Result<(), UpdateError> {
        let slot = Self::slot(op, key);
        let delay = self.delays.lock().await.get(&slot).copied();
        if let Some(ms) = delay {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        let mut failures = self.failures.lock().await;
        let (fail, clear) = match failures.get_mut(&slot) {
            Some(Fault::Forever) => (true, false),
            Some(Fault::Times(n)) => {
                *n = n.saturating_sub(1);
                (true, *n == 0)
            }
            None => (false, false),
        };
        if clear {
            failures.remove(&slot);
        }
        if fail {
            return Err(UpdateError::TransientStore(format!("injected fault: {slot}")));
        }
        Ok(())
    }
}

/// In-memory index store: current version per instance plus study-level
/// attribute entries.
#[derive(Default)]
pub struct MemoryIndexStore {
    current: Mutex<HashMap<InstanceUid, VersionTag>>,
    studies: Mutex<HashMap<StudyUid, AttributeSet>>,
    cas_calls: AtomicU64,
    pub faults: FaultPlan,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance with its current version (test seeding).
    pub async fn seed(&self, uid: &InstanceUid, version: &VersionTag) {
        self.current.lock().await.insert(uid.clone(), version.clone());
    }

    /// Overwrite the current version unconditionally (simulates an external
    /// writer racing this workflow).
    pub async fn set_current(&self, uid: &InstanceUid, version: &VersionTag) {
        self.current.lock().await.insert(uid.clone(), version.clone());
    }

    /// Drop an instance from the index (simulates a concurrent delete).
    pub async fn forget(&self, uid: &InstanceUid) {
        self.current.lock().await.remove(uid);
    }

    pub async fn study_attributes(&self, study: &StudyUid) -> Option<AttributeSet> {
        self.studies.lock().await.get(study).cloned()
    }

    /// Number of compare-and-swap calls observed (duplicate-commit checks).
    pub fn cas_count(&self) -> u64 {
        self.cas_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn current_version(&self, uid: &InstanceUid) -> Result<Option<VersionTag>, UpdateError> {
        self.faults.check("index.current_version", &uid.to_string()).await?;
        Ok(self.current.lock().await.get(uid).cloned())
    }

    async fn compare_and_swap_version(
        &self,
        uid: &InstanceUid,
        expected: &VersionTag,
        new: &VersionTag,
    ) -> Result<(), UpdateError> {
        self.faults.check("index.cas", &uid.to_string()).await?;
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock().await;
        match current.get(uid) {
            Some(cur) if cur == expected => {
                current.insert(uid.clone(), new.clone());
                Ok(())
            }
            Some(cur) => Err(UpdateError::ConcurrentModification {
                instance: uid.to_string(),
                expected: expected.to_string(),
                actual: cur.to_string(),
            }),
            None => Err(UpdateError::ConcurrentModification {
                instance: uid.to_string(),
                expected: expected.to_string(),
                actual: "<none>".to_string(),
            }),
        }
    }

    async fn update_study_attributes(
        &self,
        study: &StudyUid,
        delta: &AttributeDelta,
    ) -> Result<(), UpdateError> {
        self.faults.check("index.update_study", study.as_str()).await?;
        let mut studies = self.studies.lock().await;
        let entry = studies.entry(study.clone()).or_default();
        delta.apply_to(entry);
        Ok(())
    }
}

/// In-memory instance listing per study. Listing order is insertion order;
/// the planner owns determinism.
#[derive(Default)]
pub struct MemoryInstanceStore {
    listing: Mutex<HashMap<StudyUid, Vec<InstanceUid>>>,
    pub faults: FaultPlan,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, uid: &InstanceUid) {
        self.listing
            .lock()
            .await
            .entry(uid.study.clone())
            .or_default()
            .push(uid.clone());
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn list_instances(&self, study: &StudyUid) -> Result<Vec<InstanceUid>, UpdateError> {
        self.faults.check("instances.list", study.as_str()).await?;
        Ok(self.listing.lock().await.get(study).cloned().unwrap_or_default())
    }
}

/// In-memory attribute-document store keyed by (instance, version).
#[derive(Default)]
pub struct MemoryMetadataStore {
    docs: Mutex<HashMap<(InstanceUid, VersionTag), AttributeSet>>,
    pub faults: FaultPlan,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, uid: &InstanceUid, version: &VersionTag) -> bool {
        self.docs
            .lock()
            .await
            .contains_key(&(uid.clone(), version.clone()))
    }

    pub async fn versions_of(&self, uid: &InstanceUid) -> Vec<VersionTag> {
        let mut out: Vec<VersionTag> = self
            .docs
            .lock()
            .await
            .keys()
            .filter(|(u, _)| u == uid)
            .map(|(_, v)| v.clone())
            .collect();
        out.sort();
        out
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, uid: &InstanceUid, version: &VersionTag) -> Result<AttributeSet, UpdateError> {
        self.faults.check("metadata.get", &uid.to_string()).await?;
        self.docs
            .lock()
            .await
            .get(&(uid.clone(), version.clone()))
            .cloned()
            .ok_or_else(|| UpdateError::NotFound(format!("metadata {uid}@{version}")))
    }

    async fn put(
        &self,
        uid: &InstanceUid,
        version: &VersionTag,
        doc: &AttributeSet,
    ) -> Result<(), UpdateError> {
        self.faults.check("metadata.put", &uid.to_string()).await?;
        self.docs
            .lock()
            .await
            .insert((uid.clone(), version.clone()), doc.clone());
        Ok(())
    }

    async fn delete(&self, uid: &InstanceUid, version: &VersionTag) -> Result<(), UpdateError> {
        self.faults.check("metadata.delete", &uid.to_string()).await?;
        self.docs.lock().await.remove(&(uid.clone(), version.clone()));
        Ok(())
    }
}

/// In-memory payload store keyed by (instance, version).
#[derive(Default)]
pub struct MemoryFileStore {
    blobs: Mutex<HashMap<(InstanceUid, VersionTag), Vec<u8>>>,
    pub faults: FaultPlan,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, uid: &InstanceUid, version: &VersionTag) -> bool {
        self.blobs
            .lock()
            .await
            .contains_key(&(uid.clone(), version.clone()))
    }

    pub async fn versions_of(&self, uid: &InstanceUid) -> Vec<VersionTag> {
        let mut out: Vec<VersionTag> = self
            .blobs
            .lock()
            .await
            .keys()
            .filter(|(u, _)| u == uid)
            .map(|(_, v)| v.clone())
            .collect();
        out.sort();
        out
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn get(&self, uid: &InstanceUid, version: &VersionTag) -> Result<Vec<u8>, UpdateError> {
        self.faults.check("files.get", &uid.to_string()).await?;
        self.blobs
            .lock()
            .await
            .get(&(uid.clone(), version.clone()))
            .cloned()
            .ok_or_else(|| UpdateError::NotFound(format!("payload {uid}@{version}")))
    }

    async fn put(
        &self,
        uid: &InstanceUid,
        version: &VersionTag,
        payload: &[u8],
    ) -> Result<(), UpdateError> {
        self.faults.check("files.put", &uid.to_string()).await?;
        self.blobs
            .lock()
            .await
            .insert((uid.clone(), version.clone()), payload.to_vec());
        Ok(())
    }

    async fn delete(&self, uid: &InstanceUid, version: &VersionTag) -> Result<(), UpdateError> {
        self.faults.check("files.delete", &uid.to_string()).await?;
        self.blobs.lock().await.remove(&(uid.clone(), version.clone()));
        Ok(())
    }
}
