//! Identity and versioning scheme for studies, series, and instances.
//!
//! Stored objects are immutable: an instance is addressed by its hierarchical
//! identifier plus a [`VersionTag`]. Updating an instance means staging a new
//! version under a *successor* tag and swinging the index pointer over to it;
//! the tag derivation is a pure function so a retried update always lands on
//! the same successor.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

macro_rules! uid_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

uid_newtype! {
    /// Opaque unique identifier of a study.
    StudyUid
}
uid_newtype! {
    /// Opaque unique identifier of a series within a study.
    SeriesUid
}
uid_newtype! {
    /// Opaque unique identifier of a single stored object within a series.
    SopUid
}

/// Fully-qualified instance identifier: every instance belongs to exactly one
/// series, which belongs to exactly one study. Ordering is lexicographic over
/// the three components, which makes planned work lists deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceUid {
    pub study: StudyUid,
    pub series: SeriesUid,
    pub sop: SopUid,
}

impl InstanceUid {
    pub fn new(study: impl Into<StudyUid>, series: impl Into<SeriesUid>, sop: impl Into<SopUid>) -> Self {
        Self {
            study: study.into(),
            series: series.into(),
            sop: sop.into(),
        }
    }
}

impl fmt::Display for InstanceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.study, self.series, self.sop)
    }
}

/// Identifier of one persisted copy of an instance's metadata + payload.
///
/// Exactly one tag is "current" per instance, visible through the index store.
/// The initial tag is assigned when the instance is first stored; successor
/// tags are derived, never generated, so that a rewrite retried after a crash
/// targets the same tag it targeted before the crash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the successor tag for this version under `delta`.
    ///
    /// Pure function of (self, delta): `sha256(tag ‖ delta-digest)` truncated
    /// to 16 bytes, hex-encoded. Retrying the same logical update can only
    /// ever mint this one tag.
    pub fn successor(&self, delta: &AttributeDelta) -> VersionTag {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hasher.update(delta.digest());
        let digest = hasher.finalize();
        VersionTag(hex::encode(&digest[..16]))
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionTag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Structured attribute document of one instance version.
pub type AttributeSet = BTreeMap<String, serde_json::Value>;

/// Requested set of attribute-name to new-value changes, scoped to one
/// study-level update request. Immutable once the workflow starts executing.
///
/// Backed by a `BTreeMap` so the serialized form is canonical and the digest
/// used in version-tag derivation is stable across processes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeDelta {
    changes: BTreeMap<String, serde_json::Value>,
}

impl AttributeDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: set one attribute to a new value.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.changes.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.changes.iter()
    }

    /// Overlay the delta onto an attribute set. Only attributes named in the
    /// delta are touched.
    pub fn apply_to(&self, attrs: &mut AttributeSet) {
        for (name, value) in &self.changes {
            attrs.insert(name.clone(), value.clone());
        }
    }

    /// Canonical digest of the delta (sorted keys via the BTreeMap encoding).
    pub fn digest(&self) -> [u8; 32] {
        let encoded = serde_json::to_vec(&self.changes).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        hasher.finalize().into()
    }
}
