//! YAML file-backed scenario store.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/api/todos/{id}/GET/todo-ok.yaml   # GET /api/todos/:id, name todo-ok
//! <data_dir>/GET/index.yaml                    # GET /, name index
//! <data_dir>/_fixtures/todo.json               # fixture referenced by contents_file
//! ```
//!
//! Named segments are written as `{name}` whichever syntax the scenario
//! declares. The scenario document itself is authoritative for identity; the
//! directory layout only has to be deterministic.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{ScenarioStore, StoreError};
use crate::predicate::{PathTemplate, Segment};
use crate::scenario::{Scenario, ScenarioDescriptor, ScenarioKey};

pub const FIXTURES_DIR: &str = "_fixtures";
pub const SCENARIO_EXTENSION: &str = "yaml";

/// Location of a scenario file relative to the data directory.
pub fn scenario_relative_path(key: &ScenarioKey) -> PathBuf {
    let mut path = PathBuf::new();
    for segment in PathTemplate::parse(&key.path).segments() {
        match segment {
            Segment::Literal(literal) => path.push(literal),
            Segment::Named(name) => path.push(format!("{{{name}}}")),
        }
    }
    path.push(key.method.as_str());
    path.push(format!("{}.{SCENARIO_EXTENSION}", key.name));
    path
}

pub struct FileScenarioStore {
    root: PathBuf,
}

impl FileScenarioStore {
    /// Open (and create if missing) a data directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(FIXTURES_DIR)).map_err(|source| StoreError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the scenario with the given identity.
    pub fn scenario_path(&self, key: &ScenarioKey) -> PathBuf {
        self.root.join(scenario_relative_path(key))
    }

    fn fixture_path(&self, name: &str) -> PathBuf {
        self.root.join(FIXTURES_DIR).join(name)
    }

    /// Every scenario file below the data directory, skipping fixtures.
    pub fn scenario_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        collect_yaml_files(&self.root, &self.root.join(FIXTURES_DIR), &mut files)?;
        files.sort();
        Ok(files)
    }

    fn read_scenario(path: &Path) -> Result<Scenario, StoreError> {
        let text = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        serde_yaml::from_str(&text).map_err(|source| StoreError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Remove now-empty directories between `dir` and the data directory.
    fn prune_empty_dirs(&self, mut dir: &Path) {
        while dir != self.root && dir.starts_with(&self.root) {
            if fs::remove_dir(dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }
}

impl ScenarioStore for FileScenarioStore {
    fn list_all_descriptors(&self) -> Result<Vec<ScenarioDescriptor>, StoreError> {
        let mut descriptors = Vec::new();
        for file in self.scenario_files()? {
            match Self::read_scenario(&file) {
                Ok(scenario) if self.scenario_path(&scenario.key()) != file => {
                    warn!(
                        file = %file.display(),
                        expected = %self.scenario_path(&scenario.key()).display(),
                        "skipping misplaced scenario"
                    );
                }
                Ok(scenario) => descriptors.push(scenario.to_descriptor()),
                Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable scenario"),
            }
        }
        debug!(count = descriptors.len(), root = %self.root.display(), "listed scenarios");
        Ok(descriptors)
    }

    fn load_scenario(&self, key: &ScenarioKey) -> Result<Scenario, StoreError> {
        let path = self.scenario_path(key);
        if !path.is_file() {
            return Err(StoreError::NotFound(key.clone()));
        }
        let scenario = Self::read_scenario(&path)?;
        if scenario.key() != *key {
            return Err(StoreError::NotFound(key.clone()));
        }
        Ok(scenario)
    }

    fn save_scenario(&self, scenario: &Scenario) -> Result<(), StoreError> {
        let key = scenario.key();
        let path = self.scenario_path(&key);
        let yaml = serde_yaml::to_string(scenario).map_err(|source| StoreError::Serialize {
            key: key.clone(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        write_atomic(&path, yaml.as_bytes())
    }

    fn delete_scenario(&self, key: &ScenarioKey) -> Result<(), StoreError> {
        let path = self.scenario_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                if let Some(parent) = path.parent() {
                    self.prune_empty_dirs(parent);
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.clone()))
            }
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn load_fixture(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.fixture_path(name);
        fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::FixtureNotFound(name.to_string())
            } else {
                io_error(&path, source)
            }
        })
    }

    fn save_fixture(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        write_atomic(&self.fixture_path(name), contents)
    }
}

fn collect_yaml_files(dir: &Path, skip: &Path, out: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|source| io_error(dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| io_error(dir, source))?;
        let path = entry.path();
        if path.is_dir() {
            // Fixtures live directly under `_fixtures`; deeper entries are scenarios
            // whose path starts with that segment.
            collect_yaml_files(&path, skip, out)?;
        } else if path.parent() != Some(skip)
            && path.extension().and_then(|e| e.to_str()) == Some(SCENARIO_EXTENSION)
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Write through a uniquely named sibling and rename it into place, so no
/// other scenario or fixture file is ever touched.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".mimic-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|source| io_error(dir, source))?;
    tmp.write_all(contents)
        .map_err(|source| io_error(tmp.path(), source))?;
    tmp.persist(path)
        .map_err(|e| io_error(path, e.error))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
