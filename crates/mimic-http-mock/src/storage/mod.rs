//! Scenario persistence.
//!
//! The lookup engine only sees storage through [`ScenarioStore`]. The trait is
//! synchronous: lookups are synchronous and non-cancellable, and both bundled
//! backends answer from local disk or memory.

mod file;
mod inmemory;

pub use file::{scenario_relative_path, FileScenarioStore, FIXTURES_DIR, SCENARIO_EXTENSION};
pub use inmemory::InMemoryScenarioStore;

use crate::scenario::{Scenario, ScenarioDescriptor, ScenarioKey};

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("scenario {0} not found")]
    NotFound(ScenarioKey),

    #[error("fixture '{0}' not found")]
    FixtureNotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize scenario {key}: {source}")]
    Serialize {
        key: ScenarioKey,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Backend-agnostic scenario storage.
pub trait ScenarioStore: Send + Sync {
    /// Descriptors of every stored scenario, used to build the key index.
    fn list_all_descriptors(&self) -> Result<Vec<ScenarioDescriptor>, StoreError>;

    fn load_scenario(&self, key: &ScenarioKey) -> Result<Scenario, StoreError>;

    /// Insert or replace the scenario with the same identity.
    fn save_scenario(&self, scenario: &Scenario) -> Result<(), StoreError>;

    fn delete_scenario(&self, key: &ScenarioKey) -> Result<(), StoreError>;

    /// Raw bytes of a body fixture referenced by `response.contents_file`.
    fn load_fixture(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Store a body fixture.
    fn save_fixture(&self, name: &str, contents: &[u8]) -> Result<(), StoreError>;
}
