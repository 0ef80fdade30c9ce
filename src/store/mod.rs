//! Client side of the authoritative remote state store.

mod errors;
mod http;
mod memory;
mod retry;

pub use errors::StoreError;
pub use http::HttpStateStore;
pub use memory::InMemoryStateStore;

use crate::manifest::{ManifestDocument, ReconciliationRecord};
use async_trait::async_trait;

#[async_trait]
pub trait RemoteStateStore: Send + Sync {
    /// `Ok(None)` means nothing was ever persisted for this scope (first boot).
    /// Callers must keep that apart from `Err`, which means the store could not answer.
    async fn fetch_manifest(&self, scope_id: &str) -> Result<Option<ManifestDocument>, StoreError>;

    async fn upsert_resource(
        &self,
        scope_id: &str,
        resource_name: &str,
        record: &ReconciliationRecord,
    ) -> Result<(), StoreError>;

    /// Deleting a record that does not exist succeeds.
    async fn delete_resource(&self, scope_id: &str, resource_name: &str) -> Result<(), StoreError>;
}
