//! Scenario save path: validation, persistence and index maintenance.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use super::descriptor::{ScenarioDescriptor, ScenarioKey};
use super::error::ScenarioError;
use super::key_index::KeyIndex;
use super::types::Scenario;
use super::validation::{validate_fixture_name, validate_scenario};
use crate::metrics;
use crate::storage::{ScenarioStore, StoreError};

/// Owns the store and keeps the key index in step with it.
pub struct ScenarioRepository {
    store: Arc<dyn ScenarioStore>,
    index: Arc<KeyIndex>,
    /// Serializes conflict check, persist and index update.
    save_lock: Mutex<()>,
}

impl ScenarioRepository {
    /// Wrap a store and build the index from its contents.
    pub fn open(store: Arc<dyn ScenarioStore>) -> Result<Self, ScenarioError> {
        let repository = Self {
            store,
            index: Arc::new(KeyIndex::new()),
            save_lock: Mutex::new(()),
        };
        repository.reload()?;
        Ok(repository)
    }

    /// Rebuild the index from storage. Returns the number of indexed scenarios.
    pub fn reload(&self) -> Result<usize, ScenarioError> {
        let _guard = self.save_lock.lock();
        let descriptors = self.store.list_all_descriptors()?;
        let skipped = self.index.rebuild(descriptors);
        let indexed = self.index.len();
        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), "some stored scenarios were not indexed");
        }
        metrics::INDEXED_SCENARIOS.set(indexed as i64);
        info!(scenarios = indexed, "scenario index built");
        Ok(indexed)
    }

    pub fn index(&self) -> &Arc<KeyIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn ScenarioStore> {
        &self.store
    }

    /// Validate, persist and index a scenario.
    ///
    /// The index is updated before this returns, so an immediate lookup sees
    /// the new scenario. Returns the stored (normalized) scenario.
    pub fn save(&self, mut scenario: Scenario) -> Result<Scenario, ScenarioError> {
        let matcher = validate_scenario(&mut scenario)?;
        let key = scenario.key();

        let _guard = self.save_lock.lock();
        self.index.check_conflict(&key)?;
        self.store.save_scenario(&scenario)?;
        let replaced = self.index.add_compiled(scenario.to_descriptor(), matcher)?;

        metrics::SCENARIOS_SAVED.inc();
        metrics::INDEXED_SCENARIOS.set(self.index.len() as i64);
        info!(scenario = %key, replaced, "saved scenario");
        Ok(scenario)
    }

    /// Parse a YAML or JSON document and save it.
    pub fn save_document(&self, document: &str) -> Result<Scenario, ScenarioError> {
        // YAML is a superset of JSON, so one parser covers both
        let scenario: Scenario = serde_yaml::from_str(document)
            .map_err(|e| ScenarioError::InvalidDescriptor(e.to_string()))?;
        self.save(scenario)
    }

    /// Remove a scenario from storage and the index.
    pub fn delete(&self, key: &ScenarioKey) -> Result<(), ScenarioError> {
        let _guard = self.save_lock.lock();
        match self.store.delete_scenario(key) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) if self.index.get(key).is_none() => {
                return Err(ScenarioError::NotFound(key.clone()));
            }
            Err(StoreError::NotFound(_)) => {
                warn!(scenario = %key, "indexed scenario was missing from storage");
            }
            Err(e) => return Err(e.into()),
        }
        self.index.remove(key);
        metrics::INDEXED_SCENARIOS.set(self.index.len() as i64);
        info!(scenario = %key, "deleted scenario");
        Ok(())
    }

    /// Full stored scenario.
    pub fn get(&self, key: &ScenarioKey) -> Result<Scenario, ScenarioError> {
        self.store.load_scenario(key).map_err(|e| match e {
            StoreError::NotFound(key) => ScenarioError::NotFound(key),
            other => other.into(),
        })
    }

    /// Indexed descriptor with live counters.
    pub fn descriptor(&self, key: &ScenarioKey) -> Option<ScenarioDescriptor> {
        self.index.get(key)
    }

    /// Descriptors, optionally restricted to one group.
    pub fn list(&self, group: Option<&str>) -> Vec<ScenarioDescriptor> {
        match group {
            Some(group) => self.index.all_by_group(group),
            None => self.index.all(),
        }
    }

    pub fn groups(&self) -> Vec<String> {
        self.index.groups()
    }

    pub fn save_fixture(&self, name: &str, contents: &[u8]) -> Result<(), ScenarioError> {
        validate_fixture_name(name)?;
        let _guard = self.save_lock.lock();
        self.store.save_fixture(name, contents)?;
        Ok(())
    }
}
