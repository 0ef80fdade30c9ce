use crate::store::StoreError;
use thiserror::Error as ThisError;

/// Reasons a whole pass is abandoned. Per resource failures are reported, never raised.
#[derive(ThisError, Debug)]
pub enum ReconcileError {
    #[error("Could not load the persisted manifest: {0}")]
    StoreUnavailable(#[source] StoreError),
}
