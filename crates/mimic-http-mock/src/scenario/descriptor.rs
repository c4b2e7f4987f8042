//! Scenario descriptors: the indexable projection of a stored scenario.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::types::MethodType;
use crate::predicate::normalize_path;

/// Serializable key data of a scenario.
///
/// `request_count` and `last_usage_time` are snapshots taken from the index;
/// they are not read back when a descriptor is indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioDescriptor {
    pub method: MethodType,
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_query_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_post_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_contents: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_usage_time: Option<DateTime<Utc>>,
}

impl ScenarioDescriptor {
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey::new(self.method, &self.name, &self.path)
    }
}

/// Identity of a scenario: method, name and normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioKey {
    pub method: MethodType,
    pub name: String,
    pub path: String,
}

impl ScenarioKey {
    pub fn new(method: MethodType, name: &str, path: &str) -> Self {
        Self {
            method,
            name: name.to_string(),
            path: normalize_path(path),
        }
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.method, self.path, self.name)
    }
}
