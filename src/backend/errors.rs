use kube::Error as KubeError;
use reqwest::{Error as ReqwestError, StatusCode};
use serde_json::Error as SerdeJsonError;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum DeploymentError {
    #[error("Resource {0:?} has no image configured")]
    MissingImage(String),
    #[error("Gateway error: {0}")]
    Gateway(
        #[source]
        #[from]
        FaasError,
    ),
    #[error("Kubernetes error: {0}")]
    Kube(
        #[source]
        #[from]
        KubeError,
    ),
}

#[derive(ThisError, Debug)]
pub enum FaasError {
    #[error("Serializing error: {0}")]
    SerializingError(
        #[source]
        #[from]
        SerdeJsonError,
    ),
    #[error("HTTP build error: {0}")]
    HttpBuilderError(#[source] ReqwestError),
    #[error("HTTP error: {0}")]
    HttpError(#[source] ReqwestError),
    #[error("Faas: bad request")]
    BadRequest,
    #[error("Faas: unauthorized")]
    Unauthorized,
    #[error("Faas: not found")]
    NotFound,
    #[error("Faas: internal server error")]
    InternalServerError,
    #[error("Faas: unknown status code: {0}")]
    UnknownStatusCode(u16),
}

impl From<StatusCode> for FaasError {
    fn from(status_code: StatusCode) -> Self {
        match status_code {
            StatusCode::BAD_REQUEST => FaasError::BadRequest,
            StatusCode::UNAUTHORIZED => FaasError::Unauthorized,
            StatusCode::NOT_FOUND => FaasError::NotFound,
            StatusCode::INTERNAL_SERVER_ERROR => FaasError::InternalServerError,
            _ => FaasError::UnknownStatusCode(status_code.as_u16()),
        }
    }
}
