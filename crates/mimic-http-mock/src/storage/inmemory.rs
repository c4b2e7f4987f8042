use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use super::{ScenarioStore, StoreError};
use crate::scenario::{Scenario, ScenarioDescriptor, ScenarioKey};

/// In-memory implementation of ScenarioStore
///
/// Useful for tests, embedding and throwaway sessions where nothing should
/// touch disk.
#[derive(Default)]
pub struct InMemoryScenarioStore {
    scenarios: RwLock<BTreeMap<ScenarioKey, Scenario>>,
    fixtures: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scenarios.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.read().is_empty()
    }
}

impl ScenarioStore for InMemoryScenarioStore {
    fn list_all_descriptors(&self) -> Result<Vec<ScenarioDescriptor>, StoreError> {
        Ok(self
            .scenarios
            .read()
            .values()
            .map(Scenario::to_descriptor)
            .collect())
    }

    fn load_scenario(&self, key: &ScenarioKey) -> Result<Scenario, StoreError> {
        self.scenarios
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn save_scenario(&self, scenario: &Scenario) -> Result<(), StoreError> {
        self.scenarios
            .write()
            .insert(scenario.key(), scenario.clone());
        Ok(())
    }

    fn delete_scenario(&self, key: &ScenarioKey) -> Result<(), StoreError> {
        self.scenarios
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn load_fixture(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.fixtures
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::FixtureNotFound(name.to_string()))
    }

    fn save_fixture(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        self.fixtures
            .write()
            .insert(name.to_string(), contents.to_vec());
        Ok(())
    }
}
