use crate::cli::{BackendArgs, RuntimeArgs, StoreArgs};
use anyhow::{Context, Result as AnyResult};
use faas_router::{
    backend::{BackendKind, BasicAuth, DeploymentBackend, FaasClient, KubernetesBackend},
    config::{CacheSettings, RetryPolicy, RuntimeSettings, StoreSettings},
    directory::DirectoryCache,
    fingerprint::fingerprint,
    manifest::Manifest,
    reconciler::{PassState, ReconcilePlan, Reconciler},
    router::Router,
    store::{HttpStateStore, InMemoryStateStore, RemoteStateStore},
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{trace_span, Instrument};

const MEMORY_STORE_SCHEME: &str = "memory";

pub async fn load_manifest(path: &Path) -> AnyResult<Manifest> {
    Manifest::from_file(path)
        .await
        .with_context(|| format!("Failed to load manifest from {}", path.display()))
}

fn store_settings(args: &StoreArgs) -> StoreSettings {
    StoreSettings {
        base_url: args.store_url.to_string(),
        bearer_token: args.store_token.clone(),
        request_timeout: Duration::from_secs(args.request_timeout_seconds),
        retry: RetryPolicy {
            max_attempts: args.max_retry_attempts,
            initial_backoff: Duration::from_millis(args.retry_initial_backoff_ms),
            multiplier: args.retry_backoff_multiplier,
        },
    }
}

fn cache_settings(args: &StoreArgs) -> CacheSettings {
    CacheSettings {
        ttl: Duration::from_secs(args.cache_ttl_seconds),
    }
}

fn runtime_settings(args: &RuntimeArgs, manifest: &Manifest) -> RuntimeSettings {
    RuntimeSettings {
        scope_id: args
            .scope_id
            .clone()
            .unwrap_or_else(|| manifest.project_name.clone()),
        current_resource: args.current_resource.clone(),
        is_coordinator: args.is_coordinator,
    }
}

fn open_store(args: &StoreArgs) -> AnyResult<Arc<dyn RemoteStateStore>> {
    if args.store_url.scheme() == MEMORY_STORE_SCHEME {
        tracing::warn!("Using an in-memory state store. State is lost on exit.");
        return Ok(Arc::new(InMemoryStateStore::new()));
    }

    let store =
        HttpStateStore::new(store_settings(args)).context("Failed to create state store client")?;

    Ok(Arc::new(store))
}

async fn open_backend(args: &BackendArgs) -> AnyResult<Arc<dyn DeploymentBackend>> {
    match args.backend {
        BackendKind::Gateway => {
            let basic_auth = match (args.username.clone(), args.password.clone()) {
                (Some(username), Some(password)) => Some(BasicAuth::new(username, password)),
                _ => {
                    tracing::warn!("Gateway username or password not set. Sending no credentials.");
                    None
                }
            };

            let client = FaasClient::new(
                args.gateway_url.to_string(),
                basic_auth,
                Some(args.namespace.clone()),
            );

            Ok(Arc::new(client))
        }
        BackendKind::Kubernetes => {
            let backend = KubernetesBackend::try_default(args.namespace.clone())
                .await
                .context("Failed to create kubernetes client")?;

            Ok(Arc::new(backend))
        }
    }
}

pub async fn route(
    manifest_path: &Path,
    function: String,
    store_args: StoreArgs,
    runtime_args: RuntimeArgs,
) -> AnyResult<()> {
    let manifest = load_manifest(manifest_path).await?;
    let runtime = runtime_settings(&runtime_args, &manifest);

    let directory = DirectoryCache::new(
        open_store(&store_args)?,
        runtime.scope_id,
        cache_settings(&store_args),
    );
    let router = Router::new(Arc::new(manifest), directory, runtime.current_resource);

    let decision = router.route(&function).await;
    println!("{function}: {decision}");

    Ok(())
}

pub async fn plan(
    manifest_path: &Path,
    store_args: StoreArgs,
    runtime_args: RuntimeArgs,
) -> AnyResult<()> {
    let manifest = load_manifest(manifest_path).await?;
    let runtime = runtime_settings(&runtime_args, &manifest);

    let actual = open_store(&store_args)?
        .fetch_manifest(&runtime.scope_id)
        .await
        .context("Failed to load persisted manifest")?
        .unwrap_or_default();

    let plan = ReconcilePlan::build(&manifest, &actual, runtime.current_resource.as_deref());

    if plan.is_noop() {
        tracing::info!("Nothing to do.");
    }
    print!("{plan}");

    Ok(())
}

pub async fn reconcile(
    manifest_path: &Path,
    store_args: StoreArgs,
    runtime_args: RuntimeArgs,
    backend_args: BackendArgs,
) -> AnyResult<()> {
    let manifest = load_manifest(manifest_path).await?;
    let runtime = runtime_settings(&runtime_args, &manifest);

    let reconciler = Reconciler::new(
        open_store(&store_args)?,
        open_backend(&backend_args).await?,
        &runtime,
    );

    let report = reconciler
        .reconcile(&manifest)
        .await
        .context("Reconciliation pass aborted")?;

    for (resource, outcome) in report.outcomes.iter() {
        println!("{resource}: {outcome}");
    }

    if report.state == PassState::CompletedWithFailures {
        anyhow::bail!("{} resource(s) failed to reconcile", report.failures().count());
    }

    Ok(())
}

pub async fn print_fingerprint(manifest_path: &Path, resource: String) -> AnyResult<()> {
    let manifest = load_manifest(manifest_path).await?;

    let spec = manifest
        .resource(&resource)
        .with_context(|| format!("Resource {resource:?} is not declared in the manifest"))?;

    let fingerprint = fingerprint(spec)
        .with_context(|| format!("Failed to fingerprint resource {resource:?}"))?;

    println!("{fingerprint}");

    Ok(())
}

pub async fn validate_manifest(manifest_path: &Path) -> AnyResult<()> {
    let manifest = load_manifest(manifest_path).await?;

    tracing::info!(
        project = %manifest.project_name,
        resources = manifest.resources.len(),
        functions = manifest.function_registry.len(),
        "Manifest is valid."
    );

    Ok(())
}

pub async fn print_manifest(manifest_path: &Path) -> AnyResult<()> {
    let manifest = load_manifest(manifest_path).await?;

    let yaml = manifest
        .to_yaml_string()
        .context("Failed to serialize manifest")?;
    print!("{yaml}");

    Ok(())
}

/// Loads the directory, then hands over to background reconciliation when this
/// instance runs it. Routing works before the first pass, falling back to local.
async fn start_serving(
    router: &Router,
    reconciler: Option<Arc<Reconciler>>,
    manifest: Arc<Manifest>,
    interval: Option<Duration>,
) -> Option<JoinHandle<()>> {
    match router
        .directory()
        .refresh_if_stale()
        .instrument(trace_span!("PrewarmDirectory"))
        .await
    {
        Ok(snapshot) => {
            tracing::info!(endpoints = snapshot.entries.len(), "Directory loaded.")
        }
        Err(error) => {
            tracing::warn!(%error, "Directory not available yet. Routing locally until it is.")
        }
    }

    tracing::info!("Ready.");

    reconciler
        .map(|reconciler| reconciler.spawn(manifest, interval, Some(router.directory().clone())))
}

pub async fn run(
    manifest_path: &Path,
    store_args: StoreArgs,
    runtime_args: RuntimeArgs,
    backend_args: BackendArgs,
    reconcile_interval_seconds: Option<u64>,
) -> AnyResult<()> {
    let manifest = Arc::new(load_manifest(manifest_path).await?);
    let runtime = runtime_settings(&runtime_args, &manifest);
    let store = open_store(&store_args)?;

    tracing::info!(
        scope_id = %runtime.scope_id,
        current_resource = ?runtime.current_resource,
        is_coordinator = runtime.is_coordinator,
        "Running with current config."
    );

    let directory = DirectoryCache::new(
        store.clone(),
        runtime.scope_id.clone(),
        cache_settings(&store_args),
    );
    let router = Router::new(manifest.clone(), directory, runtime.current_resource.clone());

    let reconciler = if runtime.is_coordinator {
        Some(Arc::new(Reconciler::new(
            store,
            open_backend(&backend_args).await?,
            &runtime,
        )))
    } else {
        None
    };

    let interval = reconcile_interval_seconds.map(Duration::from_secs);
    let reconciliation = start_serving(&router, reconciler, manifest, interval).await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down.");

    if let Some(handle) = reconciliation {
        handle.abort();
    }

    Ok(())
}
