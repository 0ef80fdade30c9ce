use super::defs::{
    HttpMethod, Manifest, ManifestDocument, ReconciliationRecord, ResourceKind, ResourceSpec,
    ResourceStatus, ScalerType,
};
use super::errors::{ConfigError, UnknownVariant};
use crate::consts::SUPPORTED_MANIFEST_MAJOR_VERSION;
use crate::utils::to_dns_label;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Reduces the spellings an enum value picks up on its way through other systems
/// (`QUEUE_DELAY`, `queue-delay`, `ScalerType.QUEUE_DELAY`, `QueueDelay`) to one token.
fn normalize_enum_token(value: &str) -> String {
    let value = value.rsplit('.').next().unwrap_or(value);

    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ServerlessEndpoint => "ServerlessEndpoint",
            ResourceKind::LoadBalancedEndpoint => "LoadBalancedEndpoint",
            ResourceKind::CpuServerlessEndpoint => "CpuServerlessEndpoint",
            ResourceKind::CpuLoadBalancedEndpoint => "CpuLoadBalancedEndpoint",
            ResourceKind::Coordinator => "Coordinator",
        }
    }

    pub fn is_load_balanced(&self) -> bool {
        matches!(
            self,
            ResourceKind::LoadBalancedEndpoint | ResourceKind::CpuLoadBalancedEndpoint
        )
    }

    pub fn is_cpu_only(&self) -> bool {
        matches!(
            self,
            ResourceKind::CpuServerlessEndpoint | ResourceKind::CpuLoadBalancedEndpoint
        )
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self, ResourceKind::Coordinator)
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_enum_token(value).as_str() {
            "SERVERLESSENDPOINT" => Ok(ResourceKind::ServerlessEndpoint),
            "LOADBALANCEDENDPOINT" => Ok(ResourceKind::LoadBalancedEndpoint),
            "CPUSERVERLESSENDPOINT" => Ok(ResourceKind::CpuServerlessEndpoint),
            "CPULOADBALANCEDENDPOINT" => Ok(ResourceKind::CpuLoadBalancedEndpoint),
            "COORDINATOR" => Ok(ResourceKind::Coordinator),
            _ => Err(UnknownVariant {
                kind: "resource kind",
                value: value.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(value: ResourceKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScalerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalerType::QueueDelay => "QUEUE_DELAY",
            ScalerType::RequestCount => "REQUEST_COUNT",
        }
    }
}

impl FromStr for ScalerType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_enum_token(value).as_str() {
            "QUEUEDELAY" => Ok(ScalerType::QueueDelay),
            "REQUESTCOUNT" => Ok(ScalerType::RequestCount),
            _ => Err(UnknownVariant {
                kind: "scaler type",
                value: value.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ScalerType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScalerType> for String {
    fn from(value: ScalerType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ScalerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(UnknownVariant {
                kind: "http method",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResourceStatus {
    /// Settled states whose endpoint the directory hands out. See
    /// [`ReconciliationRecord::routable_endpoint`] for pending records.
    pub fn is_routable(&self) -> bool {
        matches!(self, ResourceStatus::Deployed | ResourceStatus::Updated)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Deployed => "deployed",
            ResourceStatus::Updated => "updated",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Removed => "removed",
        };

        f.write_str(status)
    }
}

/// Splits a route key of the form `"GET /users/{id}"`.
fn parse_route_key(key: &str) -> Option<(HttpMethod, &str)> {
    let (method, path) = key.trim().split_once(char::is_whitespace)?;
    let method = method.parse().ok()?;

    Some((method, path.trim()))
}

impl Manifest {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = serde_json::from_str(json).map_err(ConfigError::Json)?;
        manifest.validate()?;

        Ok(manifest)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = serde_yaml::from_str(yaml).map_err(ConfigError::Yaml)?;
        manifest.validate()?;

        Ok(manifest)
    }

    /// Reads and validates a manifest. `.yaml`/`.yml` files are parsed as YAML, everything else as JSON.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|error| ConfigError::Io {
                path: path.to_path_buf(),
                error,
            })?;

        match path.extension().and_then(|extension| extension.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let major = self.version.trim().split('.').next().unwrap_or_default();
        if major != SUPPORTED_MANIFEST_MAJOR_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version.clone()));
        }

        for (function, resource) in self.function_registry.iter() {
            if function.trim().is_empty() {
                return Err(ConfigError::EmptyName("function"));
            }

            if let Some(resource) = resource {
                if !self.resources.contains_key(resource) {
                    return Err(ConfigError::UnknownResource {
                        function: function.clone(),
                        resource: resource.clone(),
                    });
                }
            }
        }

        let mut declared_by: BTreeMap<&str, &str> = BTreeMap::new();
        // Resources become kubernetes objects named after their DNS label.
        let mut labeled_by: BTreeMap<String, &str> = BTreeMap::new();

        for (resource_name, resource) in self.resources.iter() {
            if resource_name.trim().is_empty() {
                return Err(ConfigError::EmptyName("resource"));
            }

            let label = to_dns_label(resource_name);
            if label.is_empty() {
                return Err(ConfigError::InvalidObjectName(resource_name.clone()));
            }

            if let Some(first) = labeled_by.insert(label.clone(), resource_name) {
                return Err(ConfigError::ObjectNameCollision {
                    label,
                    first: first.to_string(),
                    second: resource_name.clone(),
                });
            }

            for function in resource.functions.iter() {
                if function.name.trim().is_empty() {
                    return Err(ConfigError::EmptyName("function"));
                }

                if let Some(first) = declared_by.insert(&function.name, resource_name) {
                    return Err(ConfigError::DuplicateFunction {
                        function: function.name.clone(),
                        first: first.to_string(),
                        second: resource_name.clone(),
                    });
                }

                if let Some(Some(registered_to)) = self.function_registry.get(&function.name) {
                    if registered_to != resource_name {
                        return Err(ConfigError::FunctionResourceMismatch {
                            function: function.name.clone(),
                            declared_by: resource_name.clone(),
                            registered_to: registered_to.clone(),
                        });
                    }
                }

                if resource.resource_type.is_load_balanced()
                    && (function.http_method.is_none() || function.http_path.is_none())
                {
                    return Err(ConfigError::MissingHttpRoute {
                        function: function.name.clone(),
                        resource: resource_name.clone(),
                    });
                }
            }
        }

        self.validate_routes()
    }

    fn validate_routes(&self) -> Result<(), ConfigError> {
        let Some(routes) = &self.routes else {
            return Ok(());
        };

        for (resource_name, table) in routes.iter() {
            let Some(resource) = self.resources.get(resource_name) else {
                return Err(ConfigError::InvalidRoute {
                    resource: resource_name.clone(),
                    route: String::new(),
                    reason: String::from("resource is not declared"),
                });
            };

            for (route, function) in table.iter() {
                let invalid = |reason: &str| ConfigError::InvalidRoute {
                    resource: resource_name.clone(),
                    route: route.clone(),
                    reason: reason.to_string(),
                };

                let Some((_, path)) = parse_route_key(route) else {
                    return Err(invalid("expected \"METHOD /path\""));
                };

                if !path.starts_with('/') {
                    return Err(invalid("path must start with '/'"));
                }

                if !resource.functions.iter().any(|f| &f.name == function) {
                    return Err(invalid(&format!(
                        "function {function:?} is not declared by this resource"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Owning resource of a function, `None` when the function runs locally or is unknown.
    pub fn resource_for_function(&self, function_name: &str) -> Option<&str> {
        self.function_registry
            .get(function_name)
            .and_then(|resource| resource.as_deref())
    }

    pub fn resource(&self, resource_name: &str) -> Option<&ResourceSpec> {
        self.resources.get(resource_name)
    }

    /// Looks a request up in the route table of a resource, falling back to the
    /// http method and path its function descriptors declare.
    pub fn function_for_route(
        &self,
        resource_name: &str,
        method: HttpMethod,
        path: &str,
    ) -> Option<&str> {
        let from_table = self
            .routes
            .as_ref()
            .and_then(|routes| routes.get(resource_name))
            .and_then(|table| {
                table.iter().find_map(|(route, function)| {
                    let (route_method, route_path) = parse_route_key(route)?;
                    (route_method == method && route_path == path).then_some(function.as_str())
                })
            });

        if from_table.is_some() {
            return from_table;
        }

        self.resources.get(resource_name).and_then(|resource| {
            resource
                .functions
                .iter()
                .find(|f| f.http_method == Some(method) && f.http_path.as_deref() == Some(path))
                .map(|f| f.name.as_str())
        })
    }
}

impl ReconciliationRecord {
    /// Address the directory hands out for this record.
    ///
    /// A pending record only carries an address while the previous deployment keeps
    /// serving during an update.
    pub fn routable_endpoint(&self) -> Option<&str> {
        let routable = self.status.is_routable() || self.status == ResourceStatus::Pending;

        self.endpoint_url.as_deref().filter(|_| routable)
    }
}

impl ManifestDocument {
    /// resource name -> endpoint address for every resource that can currently take traffic.
    pub fn directory_entries(&self) -> BTreeMap<String, String> {
        self.resources
            .iter()
            .filter_map(|(name, record)| {
                record
                    .routable_endpoint()
                    .map(|endpoint_url| (name.clone(), endpoint_url.to_string()))
            })
            .collect()
    }

    pub fn record(&self, resource_name: &str) -> Option<&ReconciliationRecord> {
        self.resources.get(resource_name)
    }
}
