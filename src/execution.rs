//! Boundary to whatever actually runs a function.
//!
//! The router only decides where a call goes. Argument encoding and the transport to a
//! remote endpoint live behind [`ExecutionBoundary`]; their errors reach the caller untouched.

use crate::router::{Router, RoutingDecision};
use async_trait::async_trait;
use thiserror::Error as ThisError;
use tracing::{trace_span, Instrument};

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Remote execution of {function} on {address} failed: {message}")]
    RemoteExecution {
        function: String,
        address: String,
        message: String,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Local execution of {function} failed: {message}")]
    LocalExecution { function: String, message: String },
}

/// Payloads are already marshalled bytes.
#[async_trait]
pub trait ExecutionBoundary: Send + Sync {
    async fn invoke_local(&self, function: &str, payload: Vec<u8>)
        -> Result<Vec<u8>, ExecutionError>;

    async fn invoke_remote(
        &self,
        address: &str,
        function: &str,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, ExecutionError>;
}

pub struct Dispatcher<B> {
    router: Router,
    boundary: B,
}

impl<B: ExecutionBoundary> Dispatcher<B> {
    pub fn new(router: Router, boundary: B) -> Self {
        Self { router, boundary }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn call(&self, function: &str, payload: Vec<u8>) -> Result<Vec<u8>, ExecutionError> {
        let decision = self.router.route(function).await;

        match decision {
            RoutingDecision::Local => {
                self.boundary
                    .invoke_local(function, payload)
                    .instrument(trace_span!("InvokeLocal", function))
                    .await
            }
            RoutingDecision::Remote(address) => {
                self.boundary
                    .invoke_remote(&address, function, payload)
                    .instrument(trace_span!("InvokeRemote", function, %address))
                    .await
            }
        }
    }
}
