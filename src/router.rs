use crate::directory::DirectoryCache;
use crate::manifest::Manifest;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Local,
    /// Endpoint address of the resource owning the function.
    Remote(String),
}

impl RoutingDecision {
    pub fn is_local(&self) -> bool {
        matches!(self, RoutingDecision::Local)
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingDecision::Local => f.write_str("local"),
            RoutingDecision::Remote(address) => write!(f, "remote({address})"),
        }
    }
}

/// Decides where a function call runs.
///
/// Every call is decided again, decisions are never cached beyond what the
/// directory caches, so directory changes show up within one TTL.
#[derive(Clone)]
pub struct Router {
    manifest: Arc<Manifest>,
    directory: DirectoryCache,
    current_resource: Option<String>,
}

impl Router {
    pub fn new(
        manifest: Arc<Manifest>,
        directory: DirectoryCache,
        current_resource: Option<String>,
    ) -> Self {
        Self {
            manifest,
            directory,
            current_resource,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn directory(&self) -> &DirectoryCache {
        &self.directory
    }

    pub async fn route(&self, function_name: &str) -> RoutingDecision {
        let Some(resource_name) = self.manifest.resource_for_function(function_name) else {
            tracing::trace!(function = function_name, "Function is not distributed. Running locally.");
            return RoutingDecision::Local;
        };

        if self.current_resource.as_deref() == Some(resource_name) {
            tracing::trace!(
                function = function_name,
                resource = resource_name,
                "Function belongs to this endpoint. Running locally."
            );
            return RoutingDecision::Local;
        }

        match self.directory.resolve(resource_name).await {
            Some(address) => {
                tracing::debug!(
                    function = function_name,
                    resource = resource_name,
                    %address,
                    "Routing remotely."
                );
                RoutingDecision::Remote(address)
            }
            None => {
                tracing::debug!(
                    function = function_name,
                    resource = resource_name,
                    "No endpoint known for resource. Falling back to local execution."
                );
                RoutingDecision::Local
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use crate::manifest::{ManifestDocument, ReconciliationRecord, ResourceStatus};
    use crate::store::InMemoryStateStore;

    fn manifest() -> Arc<Manifest> {
        let json = r#"{
            "version": "1.0",
            "project_name": "p",
            "function_registry": {"f1": "rA", "f2": null},
            "resources": {"rA": {"resource_type": "ServerlessEndpoint"}}
        }"#;

        Arc::new(Manifest::from_json_str(json).unwrap())
    }

    async fn store_with_directory(entries: &[(&str, &str)]) -> Arc<InMemoryStateStore> {
        let mut document = ManifestDocument::default();
        for (name, address) in entries {
            document.resources.insert(
                name.to_string(),
                ReconciliationRecord {
                    endpoint_url: Some(address.to_string()),
                    status: ResourceStatus::Deployed,
                    ..Default::default()
                },
            );
        }

        Arc::new(InMemoryStateStore::new().with_document("p", document).await)
    }

    fn router(store: Arc<InMemoryStateStore>, current_resource: Option<&str>) -> Router {
        let directory = DirectoryCache::new(store, "p", CacheSettings::default());
        Router::new(manifest(), directory, current_resource.map(str::to_string))
    }

    #[tokio::test]
    async fn empty_directory_routes_everything_locally() {
        let router = router(store_with_directory(&[]).await, None);

        assert_eq!(router.route("f1").await, RoutingDecision::Local);
        assert_eq!(router.route("f2").await, RoutingDecision::Local);
        assert_eq!(router.route("unknown").await, RoutingDecision::Local);
    }

    #[tokio::test]
    async fn known_endpoint_routes_remotely() {
        let router = router(store_with_directory(&[("rA", "10.0.0.1:9000")]).await, None);

        assert_eq!(
            router.route("f1").await,
            RoutingDecision::Remote(String::from("10.0.0.1:9000"))
        );
        assert_eq!(router.route("f2").await, RoutingDecision::Local);
    }

    #[tokio::test]
    async fn unlisted_functions_never_touch_the_directory() {
        let store = store_with_directory(&[("rA", "10.0.0.1:9000")]).await;
        let router = router(store.clone(), None);

        assert_eq!(router.route("f2").await, RoutingDecision::Local);
        assert_eq!(router.route("unknown").await, RoutingDecision::Local);
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_directory_degrades_to_local() {
        let store = store_with_directory(&[("rA", "10.0.0.1:9000")]).await;
        store.set_unavailable(true);
        let router = router(store, None);

        assert_eq!(router.route("f1").await, RoutingDecision::Local);
    }

    #[tokio::test]
    async fn own_resource_runs_locally() {
        let store = store_with_directory(&[("rA", "10.0.0.1:9000")]).await;
        let router = router(store, Some("rA"));

        assert_eq!(router.route("f1").await, RoutingDecision::Local);
    }
}
