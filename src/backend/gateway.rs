use super::errors::{DeploymentError, FaasError};
use super::DeploymentBackend;
use crate::manifest::{ResourceSpec, ScalerType};
use crate::utils::remove_trailling_slash;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FUNCTIONS_ENDPOINT: &str = "/system/functions";
pub const FUNCTION_ENDPOINT: &str = "/system/function";
pub const INVOKE_ENDPOINT: &str = "/function";

const SCALE_MIN_LABEL: &str = "com.openfaas.scale.min";
const SCALE_MAX_LABEL: &str = "com.openfaas.scale.max";
const SCALE_TYPE_LABEL: &str = "com.openfaas.scale.type";
const SCALE_TARGET_LABEL: &str = "com.openfaas.scale.target";
const SCALE_ZERO_LABEL: &str = "com.openfaas.scale.zero";
const SCALE_ZERO_DURATION_ANNOTATION: &str = "com.openfaas.scale.zero-duration";
const RESOURCE_KIND_LABEL: &str = "faas-router/resource-kind";

pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

pub type FaasResult = Result<(), FaasError>;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeployment {
    /// service is the name of the function deployment
    pub service: String,

    /// image is a fully-qualified container image
    pub image: String,

    /// namespace for the function, if supported by the faas-provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// envVars can be provided to set environment variables for the function runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<BTreeMap<String, String>>,

    /// constraints are specific to the faas-provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,

    /// labels are metadata for functions which may be used by the
    /// faas-provider or the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// annotations are metadata for functions which may be used by the
    /// faas-provider or the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl FunctionDeployment {
    pub fn from_resource(
        name: &str,
        spec: &ResourceSpec,
        namespace: Option<String>,
    ) -> Result<Self, DeploymentError> {
        let config = &spec.config;

        let image = config
            .image
            .clone()
            .ok_or_else(|| DeploymentError::MissingImage(name.to_string()))?;

        let mut labels = BTreeMap::new();
        labels.insert(
            RESOURCE_KIND_LABEL.to_string(),
            spec.resource_type.as_str().to_string(),
        );
        if let Some(min) = config.workers_min {
            labels.insert(SCALE_MIN_LABEL.to_string(), min.to_string());
            if min == 0 {
                labels.insert(SCALE_ZERO_LABEL.to_string(), String::from("true"));
            }
        }
        if let Some(max) = config.workers_max {
            labels.insert(SCALE_MAX_LABEL.to_string(), max.to_string());
        }
        if let Some(scaler_type) = config.scaler_type {
            let scale_type = match scaler_type {
                ScalerType::QueueDelay => "capacity",
                ScalerType::RequestCount => "rps",
            };
            labels.insert(SCALE_TYPE_LABEL.to_string(), scale_type.to_string());
        }
        if let Some(target) = config.scaler_value {
            labels.insert(SCALE_TARGET_LABEL.to_string(), target.to_string());
        }

        let annotations = config.idle_timeout.map(|idle| {
            BTreeMap::from([(
                SCALE_ZERO_DURATION_ANNOTATION.to_string(),
                format!("{idle}s"),
            )])
        });

        let mut env_vars = config.env.clone().unwrap_or_default();
        if let Some(timeout) = config.execution_timeout_ms {
            for key in ["exec_timeout", "read_timeout", "write_timeout"] {
                env_vars.insert(key.to_string(), format!("{timeout}ms"));
            }
        }

        let mut constraints = Vec::new();
        if let Some(region) = &config.region {
            constraints.push(format!("topology.kubernetes.io/region={region}"));
        }
        if let Some(instance) = config.instance_ids.as_ref().and_then(|ids| ids.first()) {
            constraints.push(format!("node.kubernetes.io/instance-type={instance}"));
        }
        if !spec.resource_type.is_cpu_only() {
            if let Some(gpu) = config.gpus.as_ref().and_then(|gpus| gpus.first()) {
                constraints.push(format!("nvidia.com/gpu.product={gpu}"));
            }
        }

        Ok(Self {
            service: name.to_string(),
            image,
            namespace,
            env_vars: (!env_vars.is_empty()).then_some(env_vars),
            constraints: (!constraints.is_empty()).then_some(constraints),
            labels: Some(labels),
            annotations,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFunctionRequest {
    /// Name of deployed function
    function_name: String,
}

/// Deploys resources as OpenFaaS functions through the gateway's system API.
pub struct FaasClient {
    client: reqwest::Client,
    /// Base URL of the OpenFaaS gateway
    /// e.g. http://gateway.openfaas:8080
    base_url: String,
    basic_auth: Option<BasicAuth>,
    namespace: Option<String>,
}

impl FaasClient {
    pub fn new(base_url: String, basic_auth: Option<BasicAuth>, namespace: Option<String>) -> Self {
        let base_url = remove_trailling_slash(&base_url);
        Self {
            client: reqwest::Client::new(),
            base_url,
            basic_auth,
            namespace,
        }
    }

    fn get_functions_url(&self) -> String {
        format!("{}{}", self.base_url, FUNCTIONS_ENDPOINT)
    }

    /// The gateway resolves a missing namespace to its default one.
    fn get_namespaced_functions_url(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}?namespace={}", self.get_functions_url(), namespace),
            None => self.get_functions_url(),
        }
    }

    fn get_function_url(&self, name: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!(
                "{}{}/{}?namespace={}",
                self.base_url, FUNCTION_ENDPOINT, name, namespace
            ),
            None => format!("{}{}/{}", self.base_url, FUNCTION_ENDPOINT, name),
        }
    }

    /// Address callers use to invoke a deployed function.
    pub fn get_invoke_url(&self, name: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}{}/{}.{}", self.base_url, INVOKE_ENDPOINT, name, namespace),
            None => format!("{}{}/{}", self.base_url, INVOKE_ENDPOINT, name),
        }
    }

    fn status_code_into_faas_result(status_code: StatusCode) -> FaasResult {
        match status_code {
            StatusCode::OK => Ok(()),
            StatusCode::ACCEPTED => Ok(()),
            StatusCode::CREATED => Ok(()),
            status_code => Err(status_code.into()),
        }
    }

    fn with_auth(&self, mut builder: RequestBuilder) -> RequestBuilder {
        if let Some(basic_auth) = &self.basic_auth {
            builder = builder.basic_auth(&basic_auth.username, Some(&basic_auth.password));
        }

        builder
    }

    async fn send_json<T: Serialize>(&self, builder: RequestBuilder, body: &T) -> FaasResult {
        let body = serde_json::to_string(body)?;

        let req = self
            .with_auth(builder.header("Content-Type", "application/json"))
            .body(body)
            .build()
            .map_err(FaasError::HttpBuilderError)?;

        let resp = self
            .client
            .execute(req)
            .await
            .map_err(FaasError::HttpError)?;

        Self::status_code_into_faas_result(resp.status())
    }

    pub async fn function_exists(&self, name: &str) -> Result<bool, FaasError> {
        let req = self
            .with_auth(self.client.get(self.get_function_url(name)))
            .build()
            .map_err(FaasError::HttpBuilderError)?;

        let resp = self
            .client
            .execute(req)
            .await
            .map_err(FaasError::HttpError)?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status_code => Err(status_code.into()),
        }
    }

    pub async fn deploy_function(&self, function_deployment: &FunctionDeployment) -> FaasResult {
        let builder = self.client.post(self.get_functions_url());
        self.send_json(builder, function_deployment).await
    }

    pub async fn update_function(&self, function_deployment: &FunctionDeployment) -> FaasResult {
        let builder = self.client.put(self.get_functions_url());
        self.send_json(builder, function_deployment).await
    }

    pub async fn delete_function(&self, name: &str) -> FaasResult {
        let builder = self.client.delete(self.get_namespaced_functions_url());
        let delete_function_request = DeleteFunctionRequest {
            function_name: name.to_string(),
        };

        self.send_json(builder, &delete_function_request).await
    }
}

#[async_trait]
impl DeploymentBackend for FaasClient {
    async fn deploy_or_update(
        &self,
        resource_name: &str,
        spec: &ResourceSpec,
    ) -> Result<String, DeploymentError> {
        let function_deployment =
            FunctionDeployment::from_resource(resource_name, spec, self.namespace.clone())?;

        if self.function_exists(resource_name).await? {
            tracing::info!(resource = resource_name, "Function exists. Updating.");
            self.update_function(&function_deployment).await?;
        } else {
            tracing::info!(resource = resource_name, "Function does not exist. Deploying.");
            self.deploy_function(&function_deployment).await?;
        }

        Ok(self.get_invoke_url(resource_name))
    }

    async fn undeploy(&self, resource_name: &str) -> Result<(), DeploymentError> {
        match self.delete_function(resource_name).await {
            Ok(()) => Ok(()),
            Err(FaasError::NotFound) => {
                tracing::info!(resource = resource_name, "Function already gone.");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}
