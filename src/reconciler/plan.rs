use crate::fingerprint::{fingerprint, Fingerprint};
use crate::manifest::{Manifest, ManifestDocument, ResourceKind};
use std::collections::BTreeMap;
use std::fmt;

/// Desired state diffed against persisted state. Building one never mutates anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Desired, no record persisted yet.
    pub new: Vec<String>,
    /// Desired, recorded under a different (or no) fingerprint.
    pub changed: Vec<String>,
    /// Recorded, no longer desired.
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Coordinators and the resource this process serves.
    pub skipped: Vec<String>,
    /// resource name -> why its fingerprint could not be computed
    pub invalid: BTreeMap<String, String>,
    /// Fingerprints of every desired resource that is not skipped or invalid.
    pub fingerprints: BTreeMap<String, Fingerprint>,
}

impl ReconcilePlan {
    pub fn build(
        desired: &Manifest,
        actual: &ManifestDocument,
        current_resource: Option<&str>,
    ) -> Self {
        let is_excluded = |name: &str, kind: Option<ResourceKind>| {
            kind.map_or(false, |kind| kind.is_coordinator()) || current_resource == Some(name)
        };

        let mut plan = Self::default();

        for (name, spec) in desired.resources.iter() {
            if is_excluded(name, Some(spec.resource_type)) {
                plan.skipped.push(name.clone());
                continue;
            }

            let fingerprint = match fingerprint(spec) {
                Ok(fingerprint) => fingerprint,
                Err(error) => {
                    plan.invalid.insert(name.clone(), error.to_string());
                    continue;
                }
            };

            match actual.record(name) {
                None => plan.new.push(name.clone()),
                Some(record) if fingerprint.matches(record.config_hash.as_deref()) => {
                    plan.unchanged.push(name.clone())
                }
                Some(_) => plan.changed.push(name.clone()),
            }

            plan.fingerprints.insert(name.clone(), fingerprint);
        }

        for (name, record) in actual.resources.iter() {
            if desired.resources.contains_key(name) {
                continue;
            }

            if is_excluded(name, record.resource_type) {
                plan.skipped.push(name.clone());
            } else {
                plan.removed.push(name.clone());
            }
        }

        plan
    }

    /// Whether applying this plan would call the backend at all.
    pub fn is_noop(&self) -> bool {
        self.new.is_empty()
            && self.changed.is_empty()
            && self.removed.is_empty()
            && self.invalid.is_empty()
    }
}

impl fmt::Display for ReconcilePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.new.iter() {
            writeln!(f, "+ {name}")?;
        }
        for name in self.changed.iter() {
            writeln!(f, "~ {name}")?;
        }
        for name in self.removed.iter() {
            writeln!(f, "- {name}")?;
        }
        for (name, reason) in self.invalid.iter() {
            writeln!(f, "! {name}: {reason}")?;
        }
        for name in self.unchanged.iter() {
            writeln!(f, "= {name}")?;
        }
        for name in self.skipped.iter() {
            writeln!(f, "  {name} (skipped)")?;
        }

        Ok(())
    }
}
