//! Shared fixture for integration tests: in-memory stores seeded with a
//! study, plus saga factories.
#![allow(dead_code)]

use std::sync::Arc;

use restamp::checkpoint::MemoryCheckpointStore;
use restamp::stores::{
    FileStore, MemoryFileStore, MemoryIndexStore, MemoryInstanceStore, MemoryMetadataStore,
    MetadataStore,
};
use restamp::updater::AttributePatcher;
use restamp::{
    AttributeDelta, AttributeSet, InstanceUid, StudyUid, UpdateOptions, UpdateSaga, VersionTag,
};

pub struct Fixture {
    pub index: Arc<MemoryIndexStore>,
    pub instances: Arc<MemoryInstanceStore>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub files: Arc<MemoryFileStore>,
    pub checkpoints: Arc<MemoryCheckpointStore>,
}

impl Fixture {
    pub fn empty() -> Self {
        Self {
            index: Arc::new(MemoryIndexStore::new()),
            instances: Arc::new(MemoryInstanceStore::new()),
            metadata: Arc::new(MemoryMetadataStore::new()),
            files: Arc::new(MemoryFileStore::new()),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
        }
    }

    /// Seed one instance at the baseline version across all stores.
    pub async fn seed_instance(&self, uid: &InstanceUid) {
        let tag = baseline_tag();
        let attrs = baseline_attrs(uid);
        let payload = AttributePatcher::encode_payload(&attrs, frames_of(uid).as_bytes()).unwrap();
        self.instances.add(uid).await;
        self.index.seed(uid, &tag).await;
        self.metadata.put(uid, &tag, &attrs).await.unwrap();
        self.files.put(uid, &tag, &payload).await.unwrap();
    }

    pub fn saga(&self) -> UpdateSaga {
        self.saga_with(UpdateOptions::default())
    }

    pub fn saga_with(&self, options: UpdateOptions) -> UpdateSaga {
        UpdateSaga::new(
            self.index.clone(),
            self.instances.clone(),
            self.metadata.clone(),
            self.files.clone(),
            Arc::new(AttributePatcher),
            self.checkpoints.clone(),
            options,
        )
    }
}

pub fn baseline_tag() -> VersionTag {
    VersionTag::new("baseline")
}

pub fn baseline_attrs(uid: &InstanceUid) -> AttributeSet {
    let mut attrs = AttributeSet::new();
    attrs.insert("PatientName".into(), "Original^Name".into());
    attrs.insert("Modality".into(), "MR".into());
    attrs.insert("SopInstanceUid".into(), uid.sop.as_str().into());
    attrs
}

pub fn frames_of(uid: &InstanceUid) -> String {
    format!("frames-{}", uid.sop)
}

/// Build a fixture holding one study with the given sop identifiers in a
/// single series. Returns the seeded instance uids in sorted order.
pub async fn seeded_study(study: &str, sops: &[&str]) -> (Fixture, StudyUid, Vec<InstanceUid>) {
    let fixture = Fixture::empty();
    let study_uid = StudyUid::new(study);
    let mut uids = Vec::new();
    for sop in sops {
        let uid = InstanceUid::new(study, "se1", *sop);
        fixture.seed_instance(&uid).await;
        uids.push(uid);
    }
    uids.sort();
    (fixture, study_uid, uids)
}

pub fn patient_delta(name: &str) -> AttributeDelta {
    AttributeDelta::new().set("PatientName", name)
}
