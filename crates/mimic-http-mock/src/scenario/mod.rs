//! Scenario matching and selection engine.
//!
//! This module provides:
//! - `KeyIndex`: concurrent `(method, path prefix)` index of descriptors
//! - `SelectionPolicy`: picks one of several compatible candidates
//! - `LookupService`: evaluate, select, load and render for one request
//! - `ScenarioRepository`: validated save path that keeps the index current
//!
//! ## Module Structure
//!
//! - `types`: scenarios, match targets, lookup results
//! - `descriptor`: indexable key data and scenario identity
//! - `error`: lookup and save errors
//! - `validation`: save-time checks
//! - `key_index`: the bucketed index and usage counters
//! - `selection`: weights and selection policies
//! - `lookup`: the lookup service
//! - `repository`: persistence plus index maintenance

mod descriptor;
mod error;
mod key_index;
mod lookup;
mod repository;
mod selection;
mod types;
mod validation;


pub use descriptor::{ScenarioDescriptor, ScenarioKey};
pub use error::{LookupError, LookupErrorKind, ScenarioError};
pub use key_index::{BucketKey, Candidate, IndexedDescriptor, KeyIndex, WILDCARD_PREFIX};
pub use lookup::LookupService;
pub use repository::ScenarioRepository;
pub use selection::{
    select_and_record, LeastRecentlyUsedPolicy, Selection, SelectionPolicy, SelectionStrategy,
    Weight, WeightedFairPolicy,
};
pub use types::{
    BindingData, MatchTarget, MethodType, Overrides, ResolvedScenario, Scenario,
    ScenarioRequest, ScenarioResponse, REQUEST_COUNT_BINDING,
};
pub use validation::{validate_fixture_name, validate_scenario, MAX_NAME_LENGTH, MAX_PATH_LENGTH};
