use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired state of a deployment group.
///
/// Loaded once per process and treated as immutable afterwards.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Manifest {
    pub version: String,

    pub project_name: String,

    /// function name -> owning resource name, `None` means the function always runs locally
    #[serde(default)]
    pub function_registry: BTreeMap<String, Option<String>>,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,

    /// resource name -> "METHOD /path" -> function name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<BTreeMap<String, BTreeMap<String, String>>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ResourceSpec {
    #[serde(alias = "kind")]
    pub resource_type: ResourceKind,

    /// location of the generated handler for this endpoint
    #[serde(default)]
    pub handler_file: String,

    #[serde(default)]
    pub functions: Vec<FunctionDescriptor>,

    #[serde(default)]
    pub config: EndpointConfig,

    // The following are only present on persisted manifests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResourceStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct FunctionDescriptor {
    pub name: String,

    /// module the function is defined in
    pub module: String,

    #[serde(default)]
    pub is_async: bool,

    #[serde(default)]
    pub is_class: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<HttpMethod>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_path: Option<String>,
}

/// User intent and platform assigned configuration of an endpoint.
///
/// Which of these fields take part in drift detection is decided by
/// [`crate::fingerprint::FieldPolicy`], not by this struct.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct EndpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// fully-qualified container image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers_min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaler_type: Option<ScalerType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaler_value: Option<u32>,
    /// seconds a worker may stay idle before scaling down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// cpu instance types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_ids: Option<Vec<String>>,
    /// accelerator types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpus: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flashboot: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceKind {
    ServerlessEndpoint,
    LoadBalancedEndpoint,
    CpuServerlessEndpoint,
    CpuLoadBalancedEndpoint,
    /// The process that runs reconciliation. Never deployed as a managed child.
    Coordinator,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(try_from = "String", into = "String")]
pub enum ScalerType {
    QueueDelay,
    RequestCount,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    #[default]
    Pending,
    Deployed,
    Updated,
    Failed,
    Removed,
}

/// Per resource state kept in the remote store. Written only by the reconciler.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct ReconciliationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    #[serde(default)]
    pub status: ResourceStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The persisted manifest as returned by the remote store.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct ManifestDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default)]
    pub function_registry: BTreeMap<String, Option<String>>,

    #[serde(default)]
    pub resources: BTreeMap<String, ReconciliationRecord>,
}
