use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error as ThisError;
use url::ParseError as UrlParseError;

#[derive(ThisError, Debug)]
pub enum StoreError {
    #[error("State store unavailable: {operation} failed after {attempts} attempt(s): {reason}")]
    Unavailable {
        operation: &'static str,
        attempts: u32,
        reason: String,
    },
    #[error("State store rejected the credentials")]
    Unauthorized,
    #[error("State store rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("Serializing error: {0}")]
    Serializing(
        #[source]
        #[from]
        SerdeJsonError,
    ),
    #[error("Invalid response from state store: {0}")]
    InvalidResponse(String),
    #[error("Invalid state store URL: {0}")]
    InvalidBaseUrl(
        #[source]
        #[from]
        UrlParseError,
    ),
    #[error("State store URL cannot take a path: {0}")]
    InvalidUrl(String),
    #[error("Name cannot be used as a state store key: {0:?}")]
    InvalidKey(String),
    #[error("HTTP build error: {0}")]
    HttpBuilder(#[source] ReqwestError),
}

impl StoreError {
    /// Whether the store could not be reached at all, as opposed to refusing the call.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Outcome of a single attempt, before the retry policy has looked at it.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Timeouts, connection errors, 408, 429 and 5xx.
    Transient(String),
    /// Anything retrying cannot fix.
    Permanent(StoreError),
}
