//! Converges deployed resources to the desired manifest.
//!
//! A pass loads the persisted state, diffs it against the manifest and applies the
//! difference one resource at a time. A resource that fails is recorded as failed and
//! the pass moves on; only an unreadable store aborts a pass.

mod errors;
mod plan;

pub use errors::*;
pub use plan::ReconcilePlan;

use crate::backend::DeploymentBackend;
use crate::config::RuntimeSettings;
use crate::directory::DirectoryCache;
use crate::fingerprint::Fingerprint;
use crate::manifest::{
    Manifest, ManifestDocument, ReconciliationRecord, ResourceKind, ResourceSpec, ResourceStatus,
};
use crate::store::RemoteStateStore;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{trace_span, Instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    Deployed { endpoint_url: String },
    Updated { endpoint_url: String },
    Removed,
    Unchanged,
    Skipped,
    Failed { error: String },
}

impl ResourceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ResourceOutcome::Failed { .. })
    }
}

impl fmt::Display for ResourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceOutcome::Deployed { endpoint_url } => write!(f, "deployed at {endpoint_url}"),
            ResourceOutcome::Updated { endpoint_url } => write!(f, "updated at {endpoint_url}"),
            ResourceOutcome::Removed => f.write_str("removed"),
            ResourceOutcome::Unchanged => f.write_str("unchanged"),
            ResourceOutcome::Skipped => f.write_str("skipped"),
            ResourceOutcome::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Completed,
    CompletedWithFailures,
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub state: PassState,
    pub outcomes: BTreeMap<String, ResourceOutcome>,
}

impl ReconcileReport {
    fn from_outcomes(outcomes: BTreeMap<String, ResourceOutcome>) -> Self {
        let state = if outcomes.values().any(ResourceOutcome::is_failure) {
            PassState::CompletedWithFailures
        } else {
            PassState::Completed
        };

        Self { state, outcomes }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                ResourceOutcome::Failed { error } => Some((name.as_str(), error.as_str())),
                _ => None,
            })
    }

    fn log_summary(&self) {
        let failed = self.failures().count();
        let changed = self
            .outcomes
            .values()
            .filter(|outcome| {
                matches!(
                    outcome,
                    ResourceOutcome::Deployed { .. }
                        | ResourceOutcome::Updated { .. }
                        | ResourceOutcome::Removed
                )
            })
            .count();

        match self.state {
            PassState::Completed => {
                tracing::info!(changed, "Reconciliation completed.")
            }
            PassState::CompletedWithFailures => {
                for (resource, error) in self.failures() {
                    tracing::error!(%resource, %error, "Resource failed to reconcile.");
                }
                tracing::warn!(changed, failed, "Reconciliation completed with failures.")
            }
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn RemoteStateStore>,
    backend: Arc<dyn DeploymentBackend>,
    scope_id: String,
    current_resource: Option<String>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RemoteStateStore>,
        backend: Arc<dyn DeploymentBackend>,
        settings: &RuntimeSettings,
    ) -> Self {
        Self {
            store,
            backend,
            scope_id: settings.scope_id.clone(),
            current_resource: settings.current_resource.clone(),
        }
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    async fn load_actual(&self) -> Result<ManifestDocument, ReconcileError> {
        match self.store.fetch_manifest(&self.scope_id).await {
            Ok(Some(document)) => Ok(document),
            Ok(None) => {
                tracing::info!("No persisted manifest for scope. Starting from empty state.");
                Ok(ManifestDocument::default())
            }
            Err(error) => Err(ReconcileError::StoreUnavailable(error)),
        }
    }

    /// Computes what a pass would do right now.
    pub async fn plan(&self, desired: &Manifest) -> Result<ReconcilePlan, ReconcileError> {
        let actual = self.load_actual().await?;

        Ok(ReconcilePlan::build(
            desired,
            &actual,
            self.current_resource.as_deref(),
        ))
    }

    /// Runs one reconciliation pass.
    pub async fn reconcile(&self, desired: &Manifest) -> Result<ReconcileReport, ReconcileError> {
        let scope_id = self.scope_id.clone();

        self.run_pass(desired)
            .instrument(trace_span!("ReconcilePass", %scope_id))
            .await
    }

    async fn run_pass(&self, desired: &Manifest) -> Result<ReconcileReport, ReconcileError> {
        let actual = self.load_actual().await?;
        let plan = ReconcilePlan::build(desired, &actual, self.current_resource.as_deref());

        tracing::info!(
            new = plan.new.len(),
            changed = plan.changed.len(),
            removed = plan.removed.len(),
            unchanged = plan.unchanged.len(),
            "Planned reconciliation."
        );

        let mut outcomes = BTreeMap::new();

        for name in plan.unchanged.iter() {
            outcomes.insert(name.clone(), ResourceOutcome::Unchanged);
        }
        for name in plan.skipped.iter() {
            outcomes.insert(name.clone(), ResourceOutcome::Skipped);
        }

        for (name, reason) in plan.invalid.iter() {
            let kind = desired.resource(name).map(|spec| spec.resource_type);
            self.record_failure(name, kind, actual.record(name), reason)
                .await;
            outcomes.insert(
                name.clone(),
                ResourceOutcome::Failed {
                    error: reason.clone(),
                },
            );
        }

        let to_apply = plan
            .new
            .iter()
            .map(|name| (name, ResourceStatus::Deployed))
            .chain(plan.changed.iter().map(|name| (name, ResourceStatus::Updated)));

        for (name, status) in to_apply {
            let (Some(spec), Some(fingerprint)) =
                (desired.resource(name), plan.fingerprints.get(name))
            else {
                continue;
            };

            let outcome = self
                .apply_resource(name, spec, fingerprint, actual.record(name), status)
                .instrument(trace_span!("ApplyResource", resource = %name))
                .await;

            outcomes.insert(name.clone(), outcome);
        }

        for name in plan.removed.iter() {
            let outcome = self
                .remove_resource(name, actual.record(name))
                .instrument(trace_span!("RemoveResource", resource = %name))
                .await;

            outcomes.insert(name.clone(), outcome);
        }

        Ok(ReconcileReport::from_outcomes(outcomes))
    }

    async fn apply_resource(
        &self,
        name: &str,
        spec: &ResourceSpec,
        fingerprint: &Fingerprint,
        previous: Option<&ReconciliationRecord>,
        status: ResourceStatus,
    ) -> ResourceOutcome {
        // Only an address that is serving right now stays routable while pending.
        let serving_endpoint = previous
            .filter(|record| record.status.is_routable())
            .and_then(|record| record.endpoint_url.clone());

        // No hash yet, an interrupted pass leaves this classified as changed.
        let pending = ReconciliationRecord {
            resource_type: Some(spec.resource_type),
            config_hash: None,
            endpoint_url: serving_endpoint,
            status: ResourceStatus::Pending,
            error: None,
        };
        if let Err(error) = self.store.upsert_resource(&self.scope_id, name, &pending).await {
            tracing::warn!(%error, "Could not mark resource as pending.");
        }

        tracing::info!(%status, "Deploying resource.");

        let endpoint_url = match self.backend.deploy_or_update(name, spec).await {
            Ok(endpoint_url) => endpoint_url,
            Err(error) => {
                let error = error.to_string();
                tracing::error!(%error, "Deployment failed.");
                self.record_failure(name, Some(spec.resource_type), previous, &error)
                    .await;

                return ResourceOutcome::Failed { error };
            }
        };

        let record = ReconciliationRecord {
            resource_type: Some(spec.resource_type),
            config_hash: Some(fingerprint.to_string()),
            endpoint_url: Some(endpoint_url.clone()),
            status,
            error: None,
        };

        if let Err(error) = self.store.upsert_resource(&self.scope_id, name, &record).await {
            tracing::error!(%error, "Deployed, but the record could not be persisted.");
            return ResourceOutcome::Failed {
                error: format!("deployed, but the record could not be persisted: {error}"),
            };
        }

        tracing::info!(%endpoint_url, "Resource reconciled.");

        match status {
            ResourceStatus::Updated => ResourceOutcome::Updated { endpoint_url },
            _ => ResourceOutcome::Deployed { endpoint_url },
        }
    }

    async fn remove_resource(
        &self,
        name: &str,
        previous: Option<&ReconciliationRecord>,
    ) -> ResourceOutcome {
        tracing::info!("Removing resource.");

        if let Err(error) = self.backend.undeploy(name).await {
            let error = error.to_string();
            tracing::error!(%error, "Undeploy failed.");
            let kind = previous.and_then(|record| record.resource_type);
            self.record_failure(name, kind, previous, &error).await;

            return ResourceOutcome::Failed { error };
        }

        if let Err(error) = self.store.delete_resource(&self.scope_id, name).await {
            tracing::error!(%error, "Undeployed, but the record could not be deleted.");
            return ResourceOutcome::Failed {
                error: format!("undeployed, but the record could not be deleted: {error}"),
            };
        }

        ResourceOutcome::Removed
    }

    /// Failed records carry no hash, so the next pass tries again.
    async fn record_failure(
        &self,
        name: &str,
        kind: Option<ResourceKind>,
        previous: Option<&ReconciliationRecord>,
        error: &str,
    ) {
        let record = ReconciliationRecord {
            resource_type: kind,
            config_hash: None,
            endpoint_url: previous.and_then(|record| record.endpoint_url.clone()),
            status: ResourceStatus::Failed,
            error: Some(error.to_string()),
        };

        if let Err(error) = self.store.upsert_resource(&self.scope_id, name, &record).await {
            tracing::warn!(resource = name, %error, "Could not record failure.");
        }
    }

    /// Runs reconciliation on its own task.
    ///
    /// Outcomes are only logged. With an `interval` the pass repeats until the task is
    /// aborted. The `directory`, if given, is refreshed after every pass so new
    /// endpoints become routable without waiting for the TTL.
    pub fn spawn(
        self: Arc<Self>,
        manifest: Arc<Manifest>,
        interval: Option<Duration>,
        directory: Option<DirectoryCache>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.reconcile(&manifest).await {
                    Ok(report) => report.log_summary(),
                    Err(error) => tracing::error!(%error, "Reconciliation pass aborted."),
                }

                if let Some(directory) = &directory {
                    if let Err(error) = directory.refresh().await {
                        tracing::debug!(%error, "Directory refresh after reconciliation failed.");
                    }
                }

                match interval {
                    Some(interval) => tokio::time::sleep(interval).await,
                    None => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeploymentError;
    use crate::config::CacheSettings;
    use crate::fingerprint::fingerprint;
    use crate::store::InMemoryStateStore;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        failing: BTreeSet<String>,
    }

    impl RecordingBackend {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|name| name.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeploymentBackend for RecordingBackend {
        async fn deploy_or_update(
            &self,
            resource_name: &str,
            _spec: &ResourceSpec,
        ) -> Result<String, DeploymentError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("deploy:{resource_name}"));

            if self.failing.contains(resource_name) {
                return Err(DeploymentError::MissingImage(resource_name.to_string()));
            }

            Ok(format!("http://{resource_name}.fn:8080"))
        }

        async fn undeploy(&self, resource_name: &str) -> Result<(), DeploymentError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("undeploy:{resource_name}"));

            if self.failing.contains(resource_name) {
                return Err(DeploymentError::MissingImage(resource_name.to_string()));
            }

            Ok(())
        }
    }

    fn manifest() -> Manifest {
        Manifest::from_json_str(
            r#"{
                "version": "1",
                "project_name": "p",
                "function_registry": {"f1": "rA", "f2": "rB", "f3": "rC"},
                "resources": {
                    "rA": {"resource_type": "ServerlessEndpoint", "config": {"image": "a:1"}},
                    "rB": {"resource_type": "ServerlessEndpoint", "config": {"image": "b:1"}},
                    "rC": {"resource_type": "CpuServerlessEndpoint", "config": {"image": "c:1"}},
                    "main": {"resource_type": "Coordinator"}
                }
            }"#,
        )
        .unwrap()
    }

    fn settings(current_resource: Option<&str>) -> RuntimeSettings {
        RuntimeSettings {
            scope_id: String::from("p"),
            current_resource: current_resource.map(str::to_string),
            is_coordinator: true,
        }
    }

    fn reconciler(
        store: &Arc<InMemoryStateStore>,
        backend: &Arc<RecordingBackend>,
        current_resource: Option<&str>,
    ) -> Reconciler {
        Reconciler::new(store.clone(), backend.clone(), &settings(current_resource))
    }

    #[tokio::test]
    async fn first_boot_deploys_every_managed_resource() {
        let store = Arc::new(InMemoryStateStore::new());
        let backend = Arc::new(RecordingBackend::default());
        let manifest = manifest();

        let report = reconciler(&store, &backend, None)
            .reconcile(&manifest)
            .await
            .unwrap();

        assert_eq!(report.state, PassState::Completed);
        assert_eq!(backend.calls(), vec!["deploy:rA", "deploy:rB", "deploy:rC"]);
        assert_eq!(report.outcomes["main"], ResourceOutcome::Skipped);

        let document = store.document("p").await.unwrap();
        let record = document.record("rA").unwrap();
        let expected = fingerprint(manifest.resource("rA").unwrap()).unwrap();
        assert_eq!(record.status, ResourceStatus::Deployed);
        assert_eq!(record.config_hash.as_deref(), Some(expected.as_str()));
        assert_eq!(record.endpoint_url.as_deref(), Some("http://rA.fn:8080"));
        assert_eq!(record.resource_type, Some(ResourceKind::ServerlessEndpoint));
        assert!(document.record("main").is_none());
    }

    #[tokio::test]
    async fn second_pass_without_changes_does_nothing() {
        let store = Arc::new(InMemoryStateStore::new());
        let backend = Arc::new(RecordingBackend::default());
        let reconciler = reconciler(&store, &backend, None);
        let manifest = manifest();

        reconciler.reconcile(&manifest).await.unwrap();
        let calls = backend.calls().len();
        let mutations = store.mutation_count();

        let report = reconciler.reconcile(&manifest).await.unwrap();

        assert_eq!(report.state, PassState::Completed);
        assert_eq!(backend.calls().len(), calls);
        assert_eq!(store.mutation_count(), mutations);
        assert!(report
            .outcomes
            .iter()
            .filter(|(name, _)| name.as_str() != "main")
            .all(|(_, outcome)| *outcome == ResourceOutcome::Unchanged));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_others() {
        let store = Arc::new(InMemoryStateStore::new());
        let backend = Arc::new(RecordingBackend::failing(&["rB"]));

        let report = reconciler(&store, &backend, None)
            .reconcile(&manifest())
            .await
            .unwrap();

        assert_eq!(report.state, PassState::CompletedWithFailures);
        assert!(matches!(report.outcomes["rA"], ResourceOutcome::Deployed { .. }));
        assert!(report.outcomes["rB"].is_failure());
        assert!(matches!(report.outcomes["rC"], ResourceOutcome::Deployed { .. }));
        assert_eq!(report.failures().count(), 1);

        let document = store.document("p").await.unwrap();
        let failed = document.record("rB").unwrap();
        assert_eq!(failed.status, ResourceStatus::Failed);
        assert!(failed.error.is_some());
        assert!(failed.config_hash.is_none());
        assert_eq!(document.record("rC").unwrap().status, ResourceStatus::Deployed);
    }

    #[tokio::test]
    async fn failed_resources_are_retried_next_pass() {
        let store = Arc::new(InMemoryStateStore::new());
        let failing = Arc::new(RecordingBackend::failing(&["rB"]));
        let manifest = manifest();

        reconciler(&store, &failing, None)
            .reconcile(&manifest)
            .await
            .unwrap();

        let healthy = Arc::new(RecordingBackend::default());
        let report = reconciler(&store, &healthy, None)
            .reconcile(&manifest)
            .await
            .unwrap();

        assert_eq!(report.state, PassState::Completed);
        assert_eq!(healthy.calls(), vec!["deploy:rB"]);
        assert!(matches!(report.outcomes["rB"], ResourceOutcome::Updated { .. }));
    }

    #[tokio::test]
    async fn unavailable_store_aborts_before_any_deployment() {
        let store = Arc::new(InMemoryStateStore::new());
        store.set_unavailable(true);
        let backend = Arc::new(RecordingBackend::default());

        let result = reconciler(&store, &backend, None)
            .reconcile(&manifest())
            .await;

        assert!(matches!(result, Err(ReconcileError::StoreUnavailable(_))));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn stale_hash_is_updated_and_matching_hash_is_left_alone() {
        let manifest = manifest();
        let hash_of = |name: &str| fingerprint(manifest.resource(name).unwrap()).unwrap();

        let mut document = ManifestDocument::default();
        document.resources.insert(
            String::from("rA"),
            ReconciliationRecord {
                config_hash: Some(String::from("X")),
                endpoint_url: Some(String::from("http://old")),
                status: ResourceStatus::Deployed,
                ..Default::default()
            },
        );
        for name in ["rB", "rC"] {
            document.resources.insert(
                name.to_string(),
                ReconciliationRecord {
                    config_hash: Some(hash_of(name).to_string()),
                    endpoint_url: Some(format!("http://{name}")),
                    status: ResourceStatus::Deployed,
                    ..Default::default()
                },
            );
        }

        let store = Arc::new(InMemoryStateStore::new().with_document("p", document).await);
        let backend = Arc::new(RecordingBackend::default());

        let report = reconciler(&store, &backend, None)
            .reconcile(&manifest)
            .await
            .unwrap();

        assert_eq!(backend.calls(), vec!["deploy:rA"]);
        assert_eq!(
            report.outcomes["rA"],
            ResourceOutcome::Updated {
                endpoint_url: String::from("http://rA.fn:8080")
            }
        );

        let record = store.document("p").await.unwrap().record("rA").cloned().unwrap();
        assert_eq!(record.status, ResourceStatus::Updated);
        assert_eq!(record.config_hash, Some(hash_of("rA").to_string()));
    }

    /// Backend that captures what the directory would hand out while it deploys.
    struct ObservingBackend {
        store: Arc<InMemoryStateStore>,
        seen: Mutex<Vec<BTreeMap<String, String>>>,
        fail: bool,
    }

    #[async_trait]
    impl DeploymentBackend for ObservingBackend {
        async fn deploy_or_update(
            &self,
            resource_name: &str,
            _spec: &ResourceSpec,
        ) -> Result<String, DeploymentError> {
            let entries = self
                .store
                .document("p")
                .await
                .map(|document| document.directory_entries())
                .unwrap_or_default();
            self.seen.lock().unwrap().push(entries);

            if self.fail {
                return Err(DeploymentError::MissingImage(resource_name.to_string()));
            }

            Ok(format!("http://{resource_name}.fn:8080"))
        }

        async fn undeploy(&self, _resource_name: &str) -> Result<(), DeploymentError> {
            Ok(())
        }
    }

    async fn deployed_store(manifest: &Manifest, stale: &str) -> Arc<InMemoryStateStore> {
        let mut document = ManifestDocument::default();
        for name in ["rA", "rB", "rC"] {
            let hash = if name == stale {
                String::from("X")
            } else {
                fingerprint(manifest.resource(name).unwrap()).unwrap().to_string()
            };
            document.resources.insert(
                name.to_string(),
                ReconciliationRecord {
                    config_hash: Some(hash),
                    endpoint_url: Some(format!("http://{name}.old")),
                    status: ResourceStatus::Deployed,
                    ..Default::default()
                },
            );
        }

        Arc::new(InMemoryStateStore::new().with_document("p", document).await)
    }

    #[tokio::test]
    async fn resource_stays_routable_while_its_update_runs() {
        let manifest = manifest();
        let store = deployed_store(&manifest, "rA").await;
        let backend = Arc::new(ObservingBackend {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
            fail: false,
        });

        Reconciler::new(store.clone(), backend.clone(), &settings(None))
            .reconcile(&manifest)
            .await
            .unwrap();

        let seen = backend.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["rA"], "http://rA.old");

        let entries = store.document("p").await.unwrap().directory_entries();
        assert_eq!(entries["rA"], "http://rA.fn:8080");
    }

    #[tokio::test]
    async fn failed_update_keeps_the_previous_address_on_record() {
        let manifest = manifest();
        let store = deployed_store(&manifest, "rA").await;
        let backend = Arc::new(ObservingBackend {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
            fail: true,
        });

        let report = Reconciler::new(store.clone(), backend.clone(), &settings(None))
            .reconcile(&manifest)
            .await
            .unwrap();

        assert_eq!(report.state, PassState::CompletedWithFailures);
        assert_eq!(backend.seen.lock().unwrap()[0]["rA"], "http://rA.old");

        let record = store.document("p").await.unwrap().record("rA").cloned().unwrap();
        assert_eq!(record.status, ResourceStatus::Failed);
        assert_eq!(record.endpoint_url.as_deref(), Some("http://rA.old"));
        assert!(record.config_hash.is_none());
    }

    #[tokio::test]
    async fn removed_resources_are_undeployed_and_forgotten() {
        let mut document = ManifestDocument::default();
        document.resources.insert(
            String::from("rOld"),
            ReconciliationRecord {
                config_hash: Some(String::from("Z")),
                status: ResourceStatus::Deployed,
                ..Default::default()
            },
        );
        let store = Arc::new(InMemoryStateStore::new().with_document("p", document).await);
        let backend = Arc::new(RecordingBackend::default());

        let report = reconciler(&store, &backend, None)
            .reconcile(&manifest())
            .await
            .unwrap();

        assert_eq!(report.outcomes["rOld"], ResourceOutcome::Removed);
        assert!(backend.calls().contains(&String::from("undeploy:rOld")));
        assert!(store.document("p").await.unwrap().record("rOld").is_none());
    }

    #[tokio::test]
    async fn failed_removal_keeps_a_failed_record() {
        let mut document = ManifestDocument::default();
        document.resources.insert(
            String::from("rOld"),
            ReconciliationRecord {
                config_hash: Some(String::from("Z")),
                endpoint_url: Some(String::from("http://old")),
                status: ResourceStatus::Deployed,
                ..Default::default()
            },
        );
        let store = Arc::new(InMemoryStateStore::new().with_document("p", document).await);
        let backend = Arc::new(RecordingBackend::failing(&["rOld"]));

        let report = reconciler(&store, &backend, None)
            .reconcile(&manifest())
            .await
            .unwrap();

        assert_eq!(report.state, PassState::CompletedWithFailures);

        let record = store.document("p").await.unwrap().record("rOld").cloned().unwrap();
        assert_eq!(record.status, ResourceStatus::Failed);
        assert_eq!(record.endpoint_url.as_deref(), Some("http://old"));
    }

    #[tokio::test]
    async fn own_resource_is_never_deployed() {
        let store = Arc::new(InMemoryStateStore::new());
        let backend = Arc::new(RecordingBackend::default());

        let report = reconciler(&store, &backend, Some("rA"))
            .reconcile(&manifest())
            .await
            .unwrap();

        assert_eq!(backend.calls(), vec!["deploy:rB", "deploy:rC"]);
        assert_eq!(report.outcomes["rA"], ResourceOutcome::Skipped);
    }

    #[tokio::test]
    async fn planning_mutates_nothing() {
        let store = Arc::new(InMemoryStateStore::new());
        let backend = Arc::new(RecordingBackend::default());

        let plan = reconciler(&store, &backend, None)
            .plan(&manifest())
            .await
            .unwrap();

        assert_eq!(plan.new, vec!["rA", "rB", "rC"]);
        assert!(backend.calls().is_empty());
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn background_pass_makes_endpoints_routable() {
        let store = Arc::new(InMemoryStateStore::new());
        let backend = Arc::new(RecordingBackend::default());
        let directory = DirectoryCache::new(store.clone(), "p", CacheSettings::default());

        assert_eq!(directory.resolve("rA").await, None);

        let reconciler = Arc::new(reconciler(&store, &backend, None));
        reconciler
            .spawn(Arc::new(manifest()), None, Some(directory.clone()))
            .await
            .unwrap();

        assert_eq!(
            directory.resolve("rA").await.as_deref(),
            Some("http://rA.fn:8080")
        );
    }
}
