use crate::consts::{
    CACHE_DEFAULT_TTL_SECONDS, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MULTIPLIER,
    DEFAULT_RETRY_INITIAL_BACKOFF_MS, MAX_RETRY_BACKOFF_SECONDS, REQUEST_DEFAULT_TIMEOUT_SECONDS,
    STORE_DEFAULT_URL,
};
use std::time::Duration;

/// How the remote state store is reached.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// e.g. http://state-store:8080
    pub base_url: String,
    pub bearer_token: Option<String>,
    /// Applied to every single attempt, independent of the retry budget.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            base_url: STORE_DEFAULT_URL.to_string(),
            bearer_token: None,
            request_timeout: Duration::from_secs(REQUEST_DEFAULT_TIMEOUT_SECONDS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Exponential backoff for transient store failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based), capped at
    /// [`MAX_RETRY_BACKOFF_SECONDS`].
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }

        let max_backoff = Duration::from_secs(MAX_RETRY_BACKOFF_SECONDS);

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);

        Duration::try_from_secs_f64(self.initial_backoff.as_secs_f64() * factor)
            .map(|backoff| backoff.min(max_backoff))
            .unwrap_or(max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_RETRY_INITIAL_BACKOFF_MS),
            multiplier: DEFAULT_RETRY_BACKOFF_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(CACHE_DEFAULT_TTL_SECONDS),
        }
    }
}

/// Identity of this process within the deployment group.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    /// Scope the manifest is persisted under, usually the project name.
    pub scope_id: String,
    /// Resource this process instance serves, never routed to remotely.
    pub current_resource: Option<String>,
    /// Whether this instance runs reconciliation on boot.
    pub is_coordinator: bool,
}
