//! Time bounded cache of the resource name -> endpoint address directory.
//!
//! The directory is published as one immutable [`DirectorySnapshot`] that is swapped
//! wholesale on refresh, so readers never see a half updated map. Refreshes are
//! single-flight: however many callers find the snapshot stale, one fetch runs and
//! every one of them gets its result. The fetch runs on its own task, so a caller
//! that gives up waiting does not cancel it for the others.

use crate::config::CacheSettings;
use crate::store::RemoteStateStore;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{trace_span, Instrument};

/// The directory could not be refreshed. Carries the reason only, so it can be
/// handed to every waiter of a shared refresh.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("Directory unavailable: {reason}")]
pub struct DiscoveryUnavailable {
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    /// Increases by one with every successful refresh.
    pub version: u64,
    pub loaded_at: Instant,
    pub entries: BTreeMap<String, String>,
}

impl DirectorySnapshot {
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() <= ttl
    }

    pub fn address_of(&self, resource_name: &str) -> Option<&str> {
        self.entries.get(resource_name).map(String::as_str)
    }
}

pub type RefreshResult = Result<Arc<DirectorySnapshot>, DiscoveryUnavailable>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

struct DirectoryCacheInner {
    store: Arc<dyn RemoteStateStore>,
    scope_id: String,
    ttl: Duration,
    /// Last published snapshot. Held only for the duration of a clone or a swap.
    snapshot: RwLock<Option<Arc<DirectorySnapshot>>>,
    /// The refresh currently running, if any.
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl DirectoryCacheInner {
    fn current(&self) -> Option<Arc<DirectorySnapshot>> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, snapshot: Arc<DirectorySnapshot>) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }

    fn fresh(&self) -> Option<Arc<DirectorySnapshot>> {
        self.current()
            .filter(|snapshot| snapshot.is_fresh(self.ttl))
    }

    async fn fetch(self: Arc<Self>) -> RefreshResult {
        let result = match self.store.fetch_manifest(&self.scope_id).await {
            Ok(document) => {
                let entries = document
                    .map(|document| document.directory_entries())
                    .unwrap_or_default();

                let version = self
                    .current()
                    .map(|snapshot| snapshot.version + 1)
                    .unwrap_or(1);

                let snapshot = Arc::new(DirectorySnapshot {
                    version,
                    loaded_at: Instant::now(),
                    entries,
                });

                self.publish(snapshot.clone());
                tracing::debug!(version, endpoints = snapshot.entries.len(), "Directory refreshed.");

                Ok(snapshot)
            }
            Err(error) => {
                tracing::warn!(%error, "Directory refresh failed. Keeping previous snapshot.");

                Err(DiscoveryUnavailable {
                    reason: error.to_string(),
                })
            }
        };

        // Published before clearing, so callers that find no refresh in flight see the new snapshot.
        *self.in_flight.lock().await = None;

        result
    }
}

/// Cheap to clone, clones share the snapshot and the in-flight refresh.
#[derive(Clone)]
pub struct DirectoryCache {
    inner: Arc<DirectoryCacheInner>,
}

impl DirectoryCache {
    pub fn new(
        store: Arc<dyn RemoteStateStore>,
        scope_id: impl Into<String>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            inner: Arc::new(DirectoryCacheInner {
                store,
                scope_id: scope_id.into(),
                ttl: settings.ttl,
                snapshot: RwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Last published snapshot, fresh or not.
    pub fn snapshot(&self) -> Option<Arc<DirectorySnapshot>> {
        self.inner.current()
    }

    /// Address of a resource, refreshing first when the snapshot is older than the TTL.
    ///
    /// A failed refresh falls back to the stale snapshot, or to `None` when there has
    /// never been one. Discovery failures never surface from here.
    pub async fn resolve(&self, resource_name: &str) -> Option<String> {
        if let Some(snapshot) = self.inner.fresh() {
            return snapshot.address_of(resource_name).map(str::to_string);
        }

        let snapshot = match self.refresh_if_stale().await {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                tracing::warn!(%error, resource = resource_name, "Resolving from stale directory.");
                self.inner.current()
            }
        };

        snapshot.and_then(|snapshot| snapshot.address_of(resource_name).map(str::to_string))
    }

    /// Refreshes unless the snapshot is fresh, joining a refresh that is already running.
    pub async fn refresh_if_stale(&self) -> RefreshResult {
        self.join_refresh(false).await
    }

    /// Refreshes regardless of age, joining a refresh that is already running.
    pub async fn refresh(&self) -> RefreshResult {
        self.join_refresh(true).await
    }

    async fn join_refresh(&self, force: bool) -> RefreshResult {
        let refresh = {
            let mut in_flight = self.inner.in_flight.lock().await;

            match in_flight.clone() {
                Some(refresh) => refresh,
                None => {
                    if !force {
                        if let Some(snapshot) = self.inner.fresh() {
                            return Ok(snapshot);
                        }
                    }

                    let refresh = self.spawn_refresh();
                    *in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    fn spawn_refresh(&self) -> SharedRefresh {
        let inner = self.inner.clone();
        let scope_id = inner.scope_id.clone();

        let task = tokio::spawn(
            inner
                .fetch()
                .instrument(trace_span!("RefreshDirectory", %scope_id)),
        );

        let inner = self.inner.clone();

        async move {
            match task.await {
                Ok(result) => result,
                Err(error) => {
                    // The task never reached its own cleanup, so the next caller must start over.
                    *inner.in_flight.lock().await = None;
                    tracing::error!(%error, "Directory refresh task failed.");

                    Err(DiscoveryUnavailable {
                        reason: format!("refresh task failed: {error}"),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }
}
