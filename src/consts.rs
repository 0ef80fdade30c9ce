use const_format::concatcp;

pub const ENV_PREFIX: &str = "FAAS_ROUTER_";

pub const MANIFEST_ENV_VAR: &str = concatcp!(ENV_PREFIX, "MANIFEST");
pub const MANIFEST_DEFAULT_PATH: &str = "flash_manifest.json";

pub const STORE_URL_ENV_VAR: &str = concatcp!(ENV_PREFIX, "STORE_URL");
pub const STORE_DEFAULT_URL: &str = "http://state-store:8080";
pub const STORE_TOKEN_ENV_VAR: &str = concatcp!(ENV_PREFIX, "STORE_TOKEN");
pub const SCOPE_ID_ENV_VAR: &str = concatcp!(ENV_PREFIX, "SCOPE_ID");

pub const CACHE_TTL_ENV_VAR: &str = concatcp!(ENV_PREFIX, "CACHE_TTL_SECONDS");
pub const CACHE_DEFAULT_TTL_SECONDS: u64 = 300;

pub const REQUEST_TIMEOUT_ENV_VAR: &str = concatcp!(ENV_PREFIX, "REQUEST_TIMEOUT_SECONDS");
pub const REQUEST_DEFAULT_TIMEOUT_SECONDS: u64 = 10;

pub const MAX_RETRY_ATTEMPTS_ENV_VAR: &str = concatcp!(ENV_PREFIX, "MAX_RETRY_ATTEMPTS");
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

pub const RETRY_BACKOFF_MULTIPLIER_ENV_VAR: &str =
    concatcp!(ENV_PREFIX, "RETRY_BACKOFF_MULTIPLIER");
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

pub const RETRY_INITIAL_BACKOFF_ENV_VAR: &str = concatcp!(ENV_PREFIX, "RETRY_INITIAL_BACKOFF_MS");
pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound of a single backoff, whatever the multiplier.
pub const MAX_RETRY_BACKOFF_SECONDS: u64 = 60;

pub const CURRENT_RESOURCE_ENV_VAR: &str = concatcp!(ENV_PREFIX, "CURRENT_RESOURCE");
pub const IS_COORDINATOR_ENV_VAR: &str = concatcp!(ENV_PREFIX, "IS_COORDINATOR");
pub const BACKEND_ENV_VAR: &str = concatcp!(ENV_PREFIX, "BACKEND");
pub const RECONCILE_INTERVAL_ENV_VAR: &str = concatcp!(ENV_PREFIX, "RECONCILE_INTERVAL_SECONDS");

pub const FUNCTIONS_NAMESPACE_ENV_VAR: &str = "OPENFAAS_FUNCTIONS_NAMESPACE";
pub const FUNCTIONS_DEFAULT_NAMESPACE: &str = "openfaas-fn";

pub const GATEWAY_URL_ENV_VAR: &str = "OPENFAAS_GATEWAY_URL";
pub const GATEWAY_DEFAULT_URL: &str = "http://gateway.openfaas:8080";
pub const GATEWAY_USERNAME_ENV_VAR: &str = "OPENFAAS_GATEWAY_USERNAME";
pub const GATEWAY_PASSWORD_ENV_VAR: &str = "OPENFAAS_GATEWAY_PASSWORD";

pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

pub const USER_AGENT: &str = concatcp!(PKG_NAME, "/", PKG_VERSION);

/// Manifest major version understood by this build.
pub const SUPPORTED_MANIFEST_MAJOR_VERSION: &str = "1";

/// Port every function workload listens on.
pub const FUNCTION_PORT: i32 = 8080;
