//! The instance update service: a pure transformation from (attributes,
//! payload, delta) to (new attributes, new payload). No I/O, deterministic —
//! the rewrite activity depends on that to derive stable successor versions.

use crate::error::UpdateError;
use crate::model::{AttributeDelta, AttributeSet};

pub trait InstanceUpdater: Send + Sync {
    fn apply(
        &self,
        attrs: &AttributeSet,
        payload: &[u8],
        delta: &AttributeDelta,
    ) -> Result<(AttributeSet, Vec<u8>), UpdateError>;
}

/// Default updater for the in-tree payload layout: a length-prefixed JSON
/// attribute preamble followed by raw frame bytes. The patcher merges the
/// delta into the attribute set and rebuilds the preamble; frame bytes pass
/// through untouched.
///
/// Real deployments substitute an updater for their actual payload encoding;
/// that encoding is outside this crate's scope.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributePatcher;

impl AttributePatcher {
    /// Encode `attrs` + `frames` into a payload: 4-byte big-endian preamble
    /// length, JSON preamble, frames.
    pub fn encode_payload(attrs: &AttributeSet, frames: &[u8]) -> Result<Vec<u8>, UpdateError> {
        let preamble = serde_json::to_vec(attrs)?;
        let len = u32::try_from(preamble.len())
            .map_err(|_| UpdateError::Serialization("attribute preamble exceeds u32 length".into()))?;
        let mut out = Vec::with_capacity(4 + preamble.len() + frames.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&preamble);
        out.extend_from_slice(frames);
        Ok(out)
    }

    /// Split a payload into its attribute preamble and frame bytes.
    pub fn decode_payload(payload: &[u8]) -> Result<(AttributeSet, &[u8]), UpdateError> {
        if payload.len() < 4 {
            return Err(UpdateError::Serialization("payload shorter than preamble header".into()));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&payload[..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;
        let body = &payload[4..];
        if body.len() < len {
            return Err(UpdateError::Serialization(format!(
                "payload preamble truncated (declared {len}, have {})",
                body.len()
            )));
        }
        let attrs: AttributeSet = serde_json::from_slice(&body[..len])?;
        Ok((attrs, &body[len..]))
    }
}

impl InstanceUpdater for AttributePatcher {
    fn apply(
        &self,
        attrs: &AttributeSet,
        payload: &[u8],
        delta: &AttributeDelta,
    ) -> Result<(AttributeSet, Vec<u8>), UpdateError> {
        let (_, frames) = Self::decode_payload(payload)?;
        let mut new_attrs = attrs.clone();
        delta.apply_to(&mut new_attrs);
        let new_payload = Self::encode_payload(&new_attrs, frames)?;
        Ok((new_attrs, new_payload))
    }
}
