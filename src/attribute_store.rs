/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/attribute_store.rs
 *
 * Small set of globally-visible metadata that, per the design notes,
 * is accessed independently of the git mutex: callers accept eventual
 * consistency here in exchange for not serializing behind every commit
 * and push. A real deployment would back this with a coordination
 * service (compare `secret_manager`'s external-store pattern); the
 * in-memory implementation here is a test double.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const VERSION_ATTRIBUTES_PATH: &str = "fabric/configs/versions";
pub const ENSEMBLES_PATH: &str = "fabric/configs/ensembles";
pub const ENSEMBLE_PATH_PREFIX: &str = "fabric/configs/ensemble";
pub const FABRIC_REQUIREMENTS_PATH: &str = "fabric/configs/requirements.json";
pub const DEFAULT_JVM_OPTIONS_PATH: &str = "fabric/configs/default-jvm-options";

/// Free-form, per-version metadata (e.g. a human-readable description),
/// distinct from the profile/configuration content stored in git.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionAttributes {
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Deserialized shape of `requirements.json`: sizing/placement hints
/// for fabric agents, keyed by profile id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FabricRequirements {
    #[serde(default)]
    pub minimum_instances: HashMap<String, u32>,
    #[serde(default)]
    pub maximum_instances: HashMap<String, u32>,
    #[serde(default)]
    pub sshing_hosts: Vec<String>,
}

/// Abstraction over the small attribute surface, kept separate from
/// [`crate::repo::RepoHandle`] so its reads and writes never need the
/// serializer's exclusive lock.
pub trait AttributeStore: Send + Sync {
    fn get_version_attributes(&self, version: &str) -> Result<VersionAttributes>;
    fn set_version_attributes(&self, version: &str, attributes: VersionAttributes) -> Result<()>;

    /// The id of the ensemble currently acting as coordination quorum,
    /// held at `/fabric/configs/ensembles`.
    fn ensemble_id(&self) -> Result<Option<String>>;
    fn set_ensemble_id(&self, id: &str) -> Result<()>;

    /// Comma-separated container names for ensemble `id`, held at
    /// `/fabric/configs/ensemble/<id>`.
    fn ensemble_containers(&self, id: &str) -> Result<Vec<String>>;
    fn set_ensemble_containers(&self, id: &str, containers: Vec<String>) -> Result<()>;

    fn fabric_requirements(&self) -> Result<FabricRequirements>;
    fn set_fabric_requirements(&self, requirements: FabricRequirements) -> Result<()>;

    fn default_jvm_options(&self) -> Result<String>;
    fn set_default_jvm_options(&self, options: String) -> Result<()>;
}

#[derive(Default)]
struct InMemoryState {
    version_attributes: HashMap<String, VersionAttributes>,
    ensemble_id: Option<String>,
    ensemble_containers: HashMap<String, Vec<String>>,
    requirements: FabricRequirements,
    default_jvm_options: String,
}

/// Process-local implementation used in tests and as a starting point
/// before a coordination-service-backed implementation is wired in.
#[derive(Default)]
pub struct InMemoryAttributeStore {
    state: RwLock<InMemoryState>,
}

impl InMemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttributeStore for InMemoryAttributeStore {
    fn get_version_attributes(&self, version: &str) -> Result<VersionAttributes> {
        let state = self.state.read().expect("attribute store lock poisoned");
        Ok(state.version_attributes.get(version).cloned().unwrap_or_default())
    }

    fn set_version_attributes(&self, version: &str, attributes: VersionAttributes) -> Result<()> {
        let mut state = self.state.write().expect("attribute store lock poisoned");
        state.version_attributes.insert(version.to_string(), attributes);
        Ok(())
    }

    fn ensemble_id(&self) -> Result<Option<String>> {
        let state = self.state.read().expect("attribute store lock poisoned");
        Ok(state.ensemble_id.clone())
    }

    fn set_ensemble_id(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().expect("attribute store lock poisoned");
        state.ensemble_id = Some(id.to_string());
        Ok(())
    }

    fn ensemble_containers(&self, id: &str) -> Result<Vec<String>> {
        let state = self.state.read().expect("attribute store lock poisoned");
        Ok(state.ensemble_containers.get(id).cloned().unwrap_or_default())
    }

    fn set_ensemble_containers(&self, id: &str, containers: Vec<String>) -> Result<()> {
        let mut state = self.state.write().expect("attribute store lock poisoned");
        state.ensemble_containers.insert(id.to_string(), containers);
        Ok(())
    }

    fn fabric_requirements(&self) -> Result<FabricRequirements> {
        let state = self.state.read().expect("attribute store lock poisoned");
        Ok(state.requirements.clone())
    }

    fn set_fabric_requirements(&self, requirements: FabricRequirements) -> Result<()> {
        let mut state = self.state.write().expect("attribute store lock poisoned");
        state.requirements = requirements;
        Ok(())
    }

    fn default_jvm_options(&self) -> Result<String> {
        let state = self.state.read().expect("attribute store lock poisoned");
        Ok(state.default_jvm_options.clone())
    }

    fn set_default_jvm_options(&self, options: String) -> Result<()> {
        let mut state = self.state.write().expect("attribute store lock poisoned");
        state.default_jvm_options = options;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_attributes_default_when_unset() {
        let store = InMemoryAttributeStore::new();
        assert_eq!(store.get_version_attributes("1.0").unwrap(), VersionAttributes::default());
    }

    #[test]
    fn set_then_get_version_attributes_round_trips() {
        let store = InMemoryAttributeStore::new();
        let mut attrs = VersionAttributes::default();
        attrs.attributes.insert("description".into(), "initial version".into());
        store.set_version_attributes("1.0", attrs.clone()).unwrap();
        assert_eq!(store.get_version_attributes("1.0").unwrap(), attrs);
    }

    #[test]
    fn fabric_requirements_round_trips_through_json() {
        let mut reqs = FabricRequirements::default();
        reqs.minimum_instances.insert("mq".into(), 1);
        let encoded = serde_json::to_string(&reqs).unwrap();
        let decoded: FabricRequirements = serde_json::from_str(&encoded).unwrap();
        assert_eq!(reqs, decoded);
    }
}
