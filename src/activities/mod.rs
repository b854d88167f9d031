//! The retryable units of work the coordinator fans out: rewrite one
//! instance under a new version, commit that version in the index, delete the
//! superseded blobs. Within one instance the three run strictly in that
//! order; across instances they are causally independent.

pub mod cleanup;
pub mod reconcile;
pub mod rewrite;

pub use cleanup::CleanupActivity;
pub use reconcile::ReconcileActivity;
pub use rewrite::RewriteActivity;
