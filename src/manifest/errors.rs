use serde_json::Error as SerdeJsonError;
use serde_yaml::Error as SerdeYamlError;
use std::io::Error as IoError;
use std::path::PathBuf;
use thiserror::Error as ThisError;

/// A manifest that fails any of these checks is rejected as a whole.
#[derive(ThisError, Debug)]
pub enum ConfigError {
    #[error("Failed to read manifest {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: IoError,
    },
    #[error("Invalid JSON manifest: {0}")]
    Json(#[source] SerdeJsonError),
    #[error("Invalid YAML manifest: {0}")]
    Yaml(#[source] SerdeYamlError),
    #[error("Unsupported manifest version {0:?}")]
    UnsupportedVersion(String),
    #[error("Manifest contains an empty {0} name")]
    EmptyName(&'static str),
    #[error("Function {function:?} references unknown resource {resource:?}")]
    UnknownResource { function: String, resource: String },
    #[error("Function {function:?} is declared by both {first:?} and {second:?}")]
    DuplicateFunction {
        function: String,
        first: String,
        second: String,
    },
    #[error("Function {function:?} is declared by {declared_by:?} but registered to {registered_to:?}")]
    FunctionResourceMismatch {
        function: String,
        declared_by: String,
        registered_to: String,
    },
    #[error("Function {function:?} on load balanced resource {resource:?} has no http method and path")]
    MissingHttpRoute { function: String, resource: String },
    #[error("Resource {0:?} has no usable object name")]
    InvalidObjectName(String),
    #[error("Resources {first:?} and {second:?} would both be deployed as {label:?}")]
    ObjectNameCollision {
        label: String,
        first: String,
        second: String,
    },
    #[error("Invalid route {route:?} on resource {resource:?}: {reason}")]
    InvalidRoute {
        resource: String,
        route: String,
        reason: String,
    },
}

#[derive(ThisError, Debug, PartialEq, Eq, Clone)]
#[error("Unknown {kind} {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
