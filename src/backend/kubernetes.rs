use super::errors::DeploymentError;
use super::DeploymentBackend;
use crate::consts::{FUNCTION_PORT, PKG_NAME};
use crate::manifest::{ResourceKind, ResourceSpec};
use crate::utils::to_dns_label;
use async_trait::async_trait;
use either::Either::{Left, Right};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Container, ContainerPort, EnvVar, HTTPGetAction, PersistentVolumeClaimVolumeSource,
            PodSpec, PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort,
            ServiceSpec, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity, apis::meta::v1::LabelSelector, util::intstr::IntOrString,
    },
};
use kube::{
    api::{DeleteParams, Patch, PatchParams},
    core::ObjectMeta,
    Api, Client as KubeClient,
};
use std::collections::BTreeMap;

const FUNCTION_LABEL: &str = "faas_function";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const RESOURCE_KIND_LABEL: &str = "faas-router/resource-kind";
const GPU_RESOURCE: &str = "nvidia.com/gpu";
const GPU_PRODUCT_LABEL: &str = "nvidia.com/gpu.product";
const REGION_LABEL: &str = "topology.kubernetes.io/region";
const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
const NETWORK_VOLUME_NAME: &str = "network-volume";
const NETWORK_VOLUME_MOUNT_PATH: &str = "/runpod-volume";

/// A resource rendered as the Deployment and Service pair that serves it.
#[derive(Debug, Clone)]
pub struct FunctionWorkload<'a> {
    name: String,
    namespace: String,
    image: String,
    spec: &'a ResourceSpec,
}

impl<'a> FunctionWorkload<'a> {
    pub fn new(
        resource_name: &str,
        namespace: &str,
        spec: &'a ResourceSpec,
    ) -> Result<Self, DeploymentError> {
        let image = spec
            .config
            .image
            .clone()
            .ok_or_else(|| DeploymentError::MissingImage(resource_name.to_string()))?;

        Ok(Self {
            name: to_dns_label(resource_name),
            namespace: namespace.to_string(),
            image,
            spec,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// In-cluster address of the workload's service.
    pub fn endpoint_url(&self) -> String {
        service_url(&self.name, &self.namespace)
    }

    fn to_meta_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(String::from(FUNCTION_LABEL), self.name.clone())])
    }

    fn to_object_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.to_meta_labels();
        labels.insert(String::from(MANAGED_BY_LABEL), String::from(PKG_NAME));
        labels.insert(
            String::from(RESOURCE_KIND_LABEL),
            to_dns_label(self.spec.resource_type.as_str()),
        );
        labels
    }

    fn to_meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.to_object_labels()),
            ..Default::default()
        }
    }

    fn to_replicas(&self) -> i32 {
        let min = self.spec.config.workers_min.unwrap_or(1).max(1);
        i32::try_from(min).unwrap_or(i32::MAX)
    }

    fn wants_gpu(&self) -> bool {
        !self.spec.resource_type.is_cpu_only() && self.spec.resource_type != ResourceKind::Coordinator
    }

    fn to_limits(&self) -> Option<BTreeMap<String, Quantity>> {
        if !self.wants_gpu() {
            return None;
        }

        let count = self.spec.config.gpu_count.unwrap_or(1);
        Some(BTreeMap::from([(
            String::from(GPU_RESOURCE),
            Quantity(count.to_string()),
        )]))
    }

    fn to_node_selector(&self) -> Option<BTreeMap<String, String>> {
        let config = &self.spec.config;
        let mut selector = BTreeMap::new();

        if let Some(region) = &config.region {
            selector.insert(String::from(REGION_LABEL), region.clone());
        }

        if self.wants_gpu() {
            if let Some(gpu) = config.gpus.as_ref().and_then(|gpus| gpus.first()) {
                selector.insert(String::from(GPU_PRODUCT_LABEL), gpu.clone());
            }
        } else if let Some(instance) = config.instance_ids.as_ref().and_then(|ids| ids.first()) {
            selector.insert(String::from(INSTANCE_TYPE_LABEL), instance.clone());
        }

        (!selector.is_empty()).then_some(selector)
    }

    fn to_env(&self) -> Option<Vec<EnvVar>> {
        let env = self.spec.config.env.as_ref()?;

        let env_vars: Vec<EnvVar> = env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect();

        (!env_vars.is_empty()).then_some(env_vars)
    }

    fn to_volumes(&self) -> Option<Vec<Volume>> {
        let claim = self.spec.config.network_volume.clone()?;

        Some(vec![Volume {
            name: String::from(NETWORK_VOLUME_NAME),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim,
                ..Default::default()
            }),
            ..Default::default()
        }])
    }

    fn to_volume_mounts(&self) -> Option<Vec<VolumeMount>> {
        self.spec.config.network_volume.as_ref()?;

        Some(vec![VolumeMount {
            name: String::from(NETWORK_VOLUME_NAME),
            mount_path: String::from(NETWORK_VOLUME_MOUNT_PATH),
            ..Default::default()
        }])
    }

    fn to_probe(&self) -> Probe {
        Probe {
            http_get: Some(HTTPGetAction {
                path: Some(String::from("/_/health")),
                port: IntOrString::Int(FUNCTION_PORT),
                scheme: Some(String::from("HTTP")),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn to_container(&self) -> Container {
        Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            ports: Some(vec![ContainerPort {
                name: Some(String::from("http")),
                container_port: FUNCTION_PORT,
                protocol: Some(String::from("TCP")),
                ..Default::default()
            }]),
            liveness_probe: Some(self.to_probe()),
            readiness_probe: Some(self.to_probe()),
            resources: self.to_limits().map(|limits| ResourceRequirements {
                limits: Some(limits),
                ..Default::default()
            }),
            env: self.to_env(),
            volume_mounts: self.to_volume_mounts(),
            ..Default::default()
        }
    }
}

impl From<&FunctionWorkload<'_>> for Deployment {
    fn from(value: &FunctionWorkload<'_>) -> Self {
        Deployment {
            metadata: value.to_meta(),
            spec: Some(DeploymentSpec {
                replicas: Some(value.to_replicas()),
                selector: LabelSelector {
                    match_labels: Some(value.to_meta_labels()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(value.to_object_labels()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![value.to_container()],
                        node_selector: value.to_node_selector(),
                        volumes: value.to_volumes(),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl From<&FunctionWorkload<'_>> for Service {
    fn from(value: &FunctionWorkload<'_>) -> Self {
        Service {
            metadata: value.to_meta(),
            spec: Some(ServiceSpec {
                selector: Some(value.to_meta_labels()),
                ports: Some(vec![ServicePort {
                    name: Some(String::from("http")),
                    port: FUNCTION_PORT,
                    target_port: Some(IntOrString::Int(FUNCTION_PORT)),
                    protocol: Some(String::from("TCP")),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn service_url(name: &str, namespace: &str) -> String {
    format!("http://{name}.{namespace}.svc.cluster.local:{FUNCTION_PORT}")
}

/// Deploys resources directly as Deployments and Services in one namespace.
pub struct KubernetesBackend {
    namespace: String,
    deployment_api: Api<Deployment>,
    service_api: Api<Service>,
}

impl KubernetesBackend {
    pub fn new(kubernetes_client: KubeClient, namespace: String) -> Self {
        let deployment_api = Api::namespaced(kubernetes_client.clone(), &namespace);
        let service_api = Api::namespaced(kubernetes_client, &namespace);

        Self {
            namespace,
            deployment_api,
            service_api,
        }
    }

    pub async fn try_default(namespace: String) -> Result<Self, DeploymentError> {
        let client = KubeClient::try_default().await?;
        Ok(Self::new(client, namespace))
    }

    fn is_not_found(error: &kube::Error) -> bool {
        matches!(error, kube::Error::Api(response) if response.code == 404)
    }
}

#[async_trait]
impl DeploymentBackend for KubernetesBackend {
    async fn deploy_or_update(
        &self,
        resource_name: &str,
        spec: &ResourceSpec,
    ) -> Result<String, DeploymentError> {
        let workload = FunctionWorkload::new(resource_name, &self.namespace, spec)?;
        let params = PatchParams::apply(PKG_NAME).force();

        tracing::info!(deployment = workload.name(), "Applying deployment.");
        let deployment = Deployment::from(&workload);
        self.deployment_api
            .patch(workload.name(), &params, &Patch::Apply(&deployment))
            .await?;

        tracing::info!(service = workload.name(), "Applying service.");
        let service = Service::from(&workload);
        self.service_api
            .patch(workload.name(), &params, &Patch::Apply(&service))
            .await?;

        Ok(workload.endpoint_url())
    }

    async fn undeploy(&self, resource_name: &str) -> Result<(), DeploymentError> {
        let name = to_dns_label(resource_name);

        match self.deployment_api.delete(&name, &DeleteParams::default()).await {
            Ok(Left(_)) => tracing::info!(deployment = %name, "Deleting deployment."),
            Ok(Right(_)) => tracing::info!(deployment = %name, "Deployment deleted."),
            Err(error) if Self::is_not_found(&error) => {
                tracing::info!(deployment = %name, "Deployment already gone.")
            }
            Err(error) => return Err(error.into()),
        }

        match self.service_api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => tracing::info!(service = %name, "Service deleted."),
            Err(error) if Self::is_not_found(&error) => {
                tracing::info!(service = %name, "Service already gone.")
            }
            Err(error) => return Err(error.into()),
        }

        Ok(())
    }
}
