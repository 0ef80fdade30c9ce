//! Where reconciled resources get deployed.

mod errors;
mod gateway;
mod kubernetes;

pub use errors::*;
pub use gateway::{BasicAuth, FaasClient, FunctionDeployment};
pub use kubernetes::{FunctionWorkload, KubernetesBackend};

use crate::manifest::ResourceSpec;
use async_trait::async_trait;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum BackendKind {
    /// OpenFaaS gateway system API
    #[default]
    Gateway,
    /// Deployments and Services applied directly to the cluster
    Kubernetes,
}

#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Creates or updates the resource and returns the address it is reachable at.
    async fn deploy_or_update(
        &self,
        resource_name: &str,
        spec: &ResourceSpec,
    ) -> Result<String, DeploymentError>;

    /// Succeeds when the resource is already gone.
    async fn undeploy(&self, resource_name: &str) -> Result<(), DeploymentError>;
}
