use super::errors::StoreError;
use super::RemoteStateStore;
use crate::manifest::{ManifestDocument, ReconciliationRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Process local state store. Used for `memory://` store URLs and in tests.
#[derive(Default)]
pub struct InMemoryStateStore {
    scopes: RwLock<BTreeMap<String, ManifestDocument>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
    mutations: AtomicUsize,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_document(self, scope_id: &str, document: ManifestDocument) -> Self {
        self.scopes
            .write()
            .await
            .insert(scope_id.to_string(), document);
        self
    }

    pub async fn document(&self, scope_id: &str) -> Option<ManifestDocument> {
        self.scopes.read().await.get(scope_id).cloned()
    }

    /// While set, every call fails as if the store could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of successful upserts and deletes.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn check_available(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                operation,
                attempts: 1,
                reason: String::from("in-memory store marked unavailable"),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteStateStore for InMemoryStateStore {
    async fn fetch_manifest(&self, scope_id: &str) -> Result<Option<ManifestDocument>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available("fetch_manifest")?;

        Ok(self.scopes.read().await.get(scope_id).cloned())
    }

    async fn upsert_resource(
        &self,
        scope_id: &str,
        resource_name: &str,
        record: &ReconciliationRecord,
    ) -> Result<(), StoreError> {
        self.check_available("upsert_resource")?;

        self.scopes
            .write()
            .await
            .entry(scope_id.to_string())
            .or_default()
            .resources
            .insert(resource_name.to_string(), record.clone());

        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_resource(&self, scope_id: &str, resource_name: &str) -> Result<(), StoreError> {
        self.check_available("delete_resource")?;

        if let Some(document) = self.scopes.write().await.get_mut(scope_id) {
            document.resources.remove(resource_name);
        }

        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
