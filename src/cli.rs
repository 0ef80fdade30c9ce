use faas_router::{
    backend::BackendKind,
    consts::{
        BACKEND_ENV_VAR, CACHE_DEFAULT_TTL_SECONDS, CACHE_TTL_ENV_VAR, CURRENT_RESOURCE_ENV_VAR,
        DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MULTIPLIER,
        DEFAULT_RETRY_INITIAL_BACKOFF_MS, FUNCTIONS_DEFAULT_NAMESPACE, FUNCTIONS_NAMESPACE_ENV_VAR,
        GATEWAY_DEFAULT_URL, GATEWAY_PASSWORD_ENV_VAR, GATEWAY_URL_ENV_VAR,
        GATEWAY_USERNAME_ENV_VAR, IS_COORDINATOR_ENV_VAR, MANIFEST_DEFAULT_PATH, MANIFEST_ENV_VAR,
        MAX_RETRY_ATTEMPTS_ENV_VAR, RECONCILE_INTERVAL_ENV_VAR, REQUEST_DEFAULT_TIMEOUT_SECONDS,
        REQUEST_TIMEOUT_ENV_VAR, RETRY_BACKOFF_MULTIPLIER_ENV_VAR, RETRY_INITIAL_BACKOFF_ENV_VAR,
        SCOPE_ID_ENV_VAR, STORE_DEFAULT_URL, STORE_TOKEN_ENV_VAR, STORE_URL_ENV_VAR,
    },
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prints where a function call would run
    #[clap(visible_alias = "ro")]
    Route {
        /// Name of the function
        function: String,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Prints what a reconciliation pass would change, without changing anything
    #[clap(visible_alias = "p")]
    Plan {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Runs a single reconciliation pass in the foreground
    #[clap(visible_alias = "rec")]
    Reconcile {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        runtime: RuntimeArgs,

        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Prints the configuration fingerprint of a resource
    #[clap(visible_alias = "f")]
    Fingerprint {
        /// Name of the resource
        resource: String,
    },
    /// Manifest commands
    #[clap(visible_alias = "m")]
    Manifest {
        #[command(subcommand)]
        command: ManifestCommands,
    },
    /// Runs the router, reconciling in the background when this instance is the coordinator
    #[clap(visible_alias = "r")]
    Run {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        runtime: RuntimeArgs,

        #[command(flatten)]
        backend: BackendArgs,

        /// Seconds between reconciliation passes. Reconciles once on boot if not set
        #[clap(long, env = RECONCILE_INTERVAL_ENV_VAR)]
        reconcile_interval_seconds: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ManifestCommands {
    /// Validates the manifest
    #[clap(visible_alias = "v")]
    Validate {},
    /// Prints the manifest as YAML
    #[clap(visible_alias = "p")]
    Print {},
}

#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    /// Path to the manifest, JSON or YAML
    #[clap(short = 'm', long = "manifest", env = MANIFEST_ENV_VAR, default_value = MANIFEST_DEFAULT_PATH, global = true)]
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Base URL of the remote state store. `memory://` keeps state in this process
    #[clap(long, env = STORE_URL_ENV_VAR, default_value = STORE_DEFAULT_URL)]
    pub store_url: Url,
    /// Bearer token for the remote state store
    #[clap(long, env = STORE_TOKEN_ENV_VAR, hide_env_values = true)]
    pub store_token: Option<String>,
    /// Seconds a directory snapshot stays fresh
    #[clap(long, env = CACHE_TTL_ENV_VAR, default_value_t = CACHE_DEFAULT_TTL_SECONDS)]
    pub cache_ttl_seconds: u64,
    /// Timeout of a single store request in seconds
    #[clap(long, env = REQUEST_TIMEOUT_ENV_VAR, default_value_t = REQUEST_DEFAULT_TIMEOUT_SECONDS)]
    pub request_timeout_seconds: u64,
    /// Total attempts per store call, the first one included
    #[clap(long, env = MAX_RETRY_ATTEMPTS_ENV_VAR, default_value_t = DEFAULT_MAX_RETRY_ATTEMPTS)]
    pub max_retry_attempts: u32,
    /// Factor the backoff grows by after every failed attempt
    #[clap(long, env = RETRY_BACKOFF_MULTIPLIER_ENV_VAR, default_value_t = DEFAULT_RETRY_BACKOFF_MULTIPLIER, value_parser = parse_backoff_multiplier)]
    pub retry_backoff_multiplier: f64,
    /// Backoff after the first failed attempt in milliseconds
    #[clap(long, env = RETRY_INITIAL_BACKOFF_ENV_VAR, default_value_t = DEFAULT_RETRY_INITIAL_BACKOFF_MS)]
    pub retry_initial_backoff_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RuntimeArgs {
    /// Scope the manifest is persisted under. Defaults to the manifest's project name
    #[clap(long, env = SCOPE_ID_ENV_VAR)]
    pub scope_id: Option<String>,
    /// Resource this instance serves. Its functions always run locally
    #[clap(long, env = CURRENT_RESOURCE_ENV_VAR)]
    pub current_resource: Option<String>,
    /// Whether this instance runs reconciliation
    #[clap(long = "coordinator", env = IS_COORDINATOR_ENV_VAR)]
    pub is_coordinator: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Where resources are deployed to
    #[clap(long, env = BACKEND_ENV_VAR, value_enum, default_value_t = BackendKind::default())]
    pub backend: BackendKind,
    /// The URL of the OpenFaaS gateway
    #[clap(short, long, env = GATEWAY_URL_ENV_VAR, default_value = GATEWAY_DEFAULT_URL)]
    pub gateway_url: Url,
    /// The username for the OpenFaaS gateway
    #[clap(short, long, env = GATEWAY_USERNAME_ENV_VAR)]
    pub username: Option<String>,
    /// The password for the OpenFaaS gateway
    #[clap(long, env = GATEWAY_PASSWORD_ENV_VAR, hide_env_values = true)]
    pub password: Option<String>,
    /// The namespace for OpenFaaS functions
    #[clap(short = 'n', long, env = FUNCTIONS_NAMESPACE_ENV_VAR, default_value = FUNCTIONS_DEFAULT_NAMESPACE)]
    pub namespace: String,
}

fn parse_backoff_multiplier(value: &str) -> Result<f64, String> {
    let multiplier: f64 = value
        .parse()
        .map_err(|error| format!("{value:?} is not a number: {error}"))?;

    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(format!("{value:?} must be a finite number of at least 1"));
    }

    Ok(multiplier)
}

// https://docs.rs/clap/latest/clap/_derive/index.html#arg-attributes
