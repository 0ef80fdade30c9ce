//! Drift detection fingerprints.
//!
//! A fingerprint is a SHA-256 digest over the canonical JSON of the fields of a
//! resource that express user intent. Identity fields and fields the platform
//! assigns after deployment never take part, so a redeploy is only triggered when
//! the user actually changed something.

use crate::manifest::{ResourceKind, ResourceSpec};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error as ThisError;

pub const IDENTITY_FIELDS: &[&str] = &["name", "id"];

pub const RUNTIME_FIELDS: &[&str] = &["template_id", "created_at", "build_id"];

pub const DEFAULT_HASHED_FIELDS: &[&str] = &[
    "image",
    "workers_min",
    "workers_max",
    "scaler_type",
    "scaler_value",
    "idle_timeout",
    "execution_timeout_ms",
    "region",
    "instance_ids",
    "gpus",
    "gpu_count",
    "env",
    "network_volume",
    "flashboot",
];

/// CPU endpoints have no accelerators, so `gpus` and `gpu_count` never cause drift for them.
pub const CPU_HASHED_FIELDS: &[&str] = &[
    "image",
    "workers_min",
    "workers_max",
    "scaler_type",
    "scaler_value",
    "idle_timeout",
    "execution_timeout_ms",
    "region",
    "instance_ids",
    "env",
    "network_volume",
    "flashboot",
];

#[derive(ThisError, Debug)]
pub enum InvalidConfigError {
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Configuration must serialize to an object, got {0}")]
    NotAnObject(&'static str),
}

/// Declares which configuration fields of a resource kind are hashed.
///
/// `hashed_fields` replaces the default set when overridden. Identity and runtime
/// fields are removed from whatever set is declared.
pub trait FieldPolicy {
    fn hashed_fields(&self) -> &'static [&'static str] {
        DEFAULT_HASHED_FIELDS
    }

    fn identity_fields(&self) -> &'static [&'static str] {
        IDENTITY_FIELDS
    }

    fn runtime_fields(&self) -> &'static [&'static str] {
        RUNTIME_FIELDS
    }

    fn is_hashed(&self, field: &str) -> bool {
        self.hashed_fields().contains(&field)
            && !self.identity_fields().contains(&field)
            && !self.runtime_fields().contains(&field)
    }
}

impl FieldPolicy for ResourceKind {
    fn hashed_fields(&self) -> &'static [&'static str] {
        if self.is_cpu_only() {
            CPU_HASHED_FIELDS
        } else {
            DEFAULT_HASHED_FIELDS
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, recorded: Option<&str>) -> bool {
        recorded == Some(self.0.as_str())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

pub fn fingerprint(resource: &ResourceSpec) -> Result<Fingerprint, InvalidConfigError> {
    fingerprint_config(
        &resource.resource_type,
        resource.resource_type.as_str(),
        &resource.config,
    )
}

/// Fingerprints any serializable configuration under the given field policy.
///
/// Fields that are absent or `null` are treated the same.
pub fn fingerprint_config<P, C>(
    policy: &P,
    kind: &str,
    config: &C,
) -> Result<Fingerprint, InvalidConfigError>
where
    P: FieldPolicy + ?Sized,
    C: Serialize + ?Sized,
{
    let value = serde_json::to_value(config).map_err(InvalidConfigError::Serialize)?;

    let Value::Object(fields) = value else {
        return Err(InvalidConfigError::NotAnObject(json_type_name(&value)));
    };

    let hashed: Map<String, Value> = fields
        .into_iter()
        .filter(|(field, value)| policy.is_hashed(field) && !value.is_null())
        .collect();

    let mut payload = Map::new();
    payload.insert(String::from("kind"), Value::String(kind.to_string()));
    payload.insert(String::from("config"), Value::Object(hashed));

    let mut canonical = String::new();
    write_canonical(&Value::Object(payload), &mut canonical)?;

    let digest = Sha256::digest(canonical.as_bytes());

    Ok(Fingerprint(hex::encode(digest)))
}

/// Writes JSON with object keys sorted at every level, independent of how the
/// map was built.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), InvalidConfigError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).map_err(InvalidConfigError::Serialize)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).map_err(InvalidConfigError::Serialize)?);
        }
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ScalerType;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn resource(json: Value) -> ResourceSpec {
        serde_json::from_value(json).unwrap()
    }

    fn gpu_resource() -> ResourceSpec {
        resource(json!({
            "resource_type": "ServerlessEndpoint",
            "config": {
                "name": "gpu-worker",
                "image": "repo/worker:1",
                "workers_min": 0,
                "workers_max": 3,
                "scaler_type": "QUEUE_DELAY",
                "gpus": ["A100"],
                "env": {"B": "2", "A": "1"}
            }
        }))
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let first = fingerprint(&gpu_resource()).unwrap();
        let second = fingerprint(&gpu_resource()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
    }

    #[test]
    fn key_order_does_not_matter() {
        let reordered = resource(json!({
            "config": {
                "env": {"A": "1", "B": "2"},
                "gpus": ["A100"],
                "scaler_type": "QUEUE_DELAY",
                "workers_max": 3,
                "workers_min": 0,
                "image": "repo/worker:1",
                "name": "gpu-worker"
            },
            "resource_type": "ServerlessEndpoint"
        }));

        assert_eq!(
            fingerprint(&gpu_resource()).unwrap(),
            fingerprint(&reordered).unwrap()
        );
    }

    #[test]
    fn canonical_writer_sorts_nested_keys() {
        let mut out = String::new();
        write_canonical(&json!({"b": {"y": 1, "x": [true, null]}, "a": "s"}), &mut out).unwrap();

        assert_eq!(out, r#"{"a":"s","b":{"x":[true,null],"y":1}}"#);
    }

    #[test]
    fn runtime_and_identity_fields_are_ignored() {
        let base = fingerprint(&gpu_resource()).unwrap();

        let mut deployed = gpu_resource();
        deployed.config.template_id = Some(String::from("tpl-123"));
        deployed.config.created_at = Some(String::from("2024-01-01T00:00:00Z"));
        deployed.config.build_id = Some(String::from("build-9"));
        deployed.config.id = Some(String::from("ep-42"));
        deployed.config.name = Some(String::from("renamed"));
        deployed.config_hash = Some(String::from("stale"));
        deployed.endpoint_url = Some(String::from("http://10.0.0.1:9000"));

        assert_eq!(base, fingerprint(&deployed).unwrap());
    }

    #[test]
    fn hashed_field_changes_are_detected() {
        let base = fingerprint(&gpu_resource()).unwrap();

        let mut changed = gpu_resource();
        changed.config.workers_max = Some(5);
        assert_ne!(base, fingerprint(&changed).unwrap());

        let mut changed = gpu_resource();
        changed.config.image = Some(String::from("repo/worker:2"));
        assert_ne!(base, fingerprint(&changed).unwrap());

        let mut changed = gpu_resource();
        changed
            .config
            .env
            .get_or_insert_with(BTreeMap::new)
            .insert(String::from("C"), String::from("3"));
        assert_ne!(base, fingerprint(&changed).unwrap());

        let mut changed = gpu_resource();
        changed.resource_type = ResourceKind::LoadBalancedEndpoint;
        assert_ne!(base, fingerprint(&changed).unwrap());
    }

    #[test]
    fn stringified_and_typed_enums_hash_identically() {
        let mut typed = gpu_resource();
        typed.config.scaler_type = Some(ScalerType::QueueDelay);

        let round_tripped = resource(json!({
            "resource_type": "ServerlessEndpoint",
            "config": {
                "name": "gpu-worker",
                "image": "repo/worker:1",
                "workers_min": 0,
                "workers_max": 3,
                "scaler_type": "ScalerType.QUEUE_DELAY",
                "gpus": ["A100"],
                "env": {"A": "1", "B": "2"}
            }
        }));

        assert_eq!(
            fingerprint(&typed).unwrap(),
            fingerprint(&round_tripped).unwrap()
        );
    }

    #[test]
    fn cpu_kinds_ignore_accelerator_fields() {
        let mut cpu = gpu_resource();
        cpu.resource_type = ResourceKind::CpuServerlessEndpoint;
        let base = fingerprint(&cpu).unwrap();

        cpu.config.gpus = Some(vec![String::from("H100")]);
        cpu.config.gpu_count = Some(8);
        assert_eq!(base, fingerprint(&cpu).unwrap());

        cpu.config.instance_ids = Some(vec![String::from("cpu3c-2-4")]);
        assert_ne!(base, fingerprint(&cpu).unwrap());
    }

    struct ImageOnly;

    impl FieldPolicy for ImageOnly {
        fn hashed_fields(&self) -> &'static [&'static str] {
            &["image", "created_at"]
        }
    }

    #[test]
    fn override_replaces_default_set_but_never_hashes_runtime_fields() {
        let config = json!({"image": "a", "workers_max": 1, "created_at": "t1"});
        let other = json!({"image": "a", "workers_max": 9, "created_at": "t2"});

        assert_eq!(
            fingerprint_config(&ImageOnly, "Custom", &config).unwrap(),
            fingerprint_config(&ImageOnly, "Custom", &other).unwrap()
        );
    }

    #[test]
    fn null_and_absent_fields_hash_identically() {
        let with_null = json!({"image": "a", "region": null});
        let without = json!({"image": "a"});
        let kind = ResourceKind::ServerlessEndpoint;

        assert_eq!(
            fingerprint_config(&kind, kind.as_str(), &with_null).unwrap(),
            fingerprint_config(&kind, kind.as_str(), &without).unwrap()
        );
    }

    #[test]
    fn non_object_configuration_is_invalid() {
        let kind = ResourceKind::ServerlessEndpoint;
        let error = fingerprint_config(&kind, kind.as_str(), &vec![1, 2]).unwrap_err();

        assert!(matches!(error, InvalidConfigError::NotAnObject("an array")));
    }

    #[test]
    fn unserializable_configuration_is_invalid() {
        let kind = ResourceKind::ServerlessEndpoint;
        let mut config = BTreeMap::new();
        config.insert(vec![1u8], "non string key");

        let error = fingerprint_config(&kind, kind.as_str(), &config).unwrap_err();
        assert!(matches!(error, InvalidConfigError::Serialize(_)));
    }
}
