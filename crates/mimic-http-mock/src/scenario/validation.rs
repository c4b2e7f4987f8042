//! Save-time validation of scenarios.
//!
//! Runs before anything is persisted: identifier syntax, path normalization,
//! weight parsing and compilation of every pattern-bearing field. A scenario
//! that passes here can always be indexed and matched.

use regex::Regex;
use std::sync::OnceLock;

use super::error::ScenarioError;
use super::selection::Weight;
use super::types::Scenario;
use crate::predicate::{normalize_path, path_segments, CompiledMatcher, PathTemplate};

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_PATH_LENGTH: usize = 200;

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w\-.]+$").expect("valid name regex"))
}

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.\-/:{}]+$").expect("valid path regex"))
}

/// Normalize the scenario in place and check it can be stored and indexed.
pub fn validate_scenario(scenario: &mut Scenario) -> Result<CompiledMatcher, ScenarioError> {
    scenario.name = scenario.name.trim().to_string();
    validate_identifier("name", &scenario.name)?;

    if let Some(group) = scenario.group.as_mut() {
        *group = group.trim().to_string();
    }
    if scenario.group.as_deref() == Some("") {
        scenario.group = None;
    }
    if let Some(group) = &scenario.group {
        validate_identifier("group", group)?;
    }

    scenario.path = normalize_path(&scenario.path);
    validate_path(&scenario.path)?;

    if let Some(raw) = &scenario.predicate {
        Weight::parse(raw)?;
    }

    if let Some(fixture) = &scenario.response.contents_file {
        validate_identifier("contents_file", fixture)?;
    }

    if !(100..=999).contains(&scenario.response.status) {
        return Err(ScenarioError::InvalidDescriptor(format!(
            "response status {} is out of range",
            scenario.response.status
        )));
    }

    CompiledMatcher::compile(&scenario.to_descriptor())
}

/// Fixture names become file names under the fixtures directory.
pub fn validate_fixture_name(name: &str) -> Result<(), ScenarioError> {
    validate_identifier("fixture name", name)
}

fn validate_identifier(field: &str, value: &str) -> Result<(), ScenarioError> {
    if value.is_empty() {
        return Err(ScenarioError::InvalidDescriptor(format!("{field} is required")));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(ScenarioError::InvalidDescriptor(format!(
            "{field} exceeds {MAX_NAME_LENGTH} characters"
        )));
    }
    if value == "." || value == ".." || !name_regex().is_match(value) {
        return Err(ScenarioError::InvalidDescriptor(format!(
            "{field} '{value}' contains invalid characters"
        )));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), ScenarioError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(ScenarioError::InvalidDescriptor(format!(
            "path exceeds {MAX_PATH_LENGTH} characters"
        )));
    }
    if path != "/" && !path_regex().is_match(path) {
        return Err(ScenarioError::InvalidDescriptor(format!(
            "path '{path}' contains invalid characters"
        )));
    }
    if path_segments(path).any(|s| s == "." || s == "..") {
        return Err(ScenarioError::InvalidDescriptor(format!(
            "path '{path}' must not contain relative segments"
        )));
    }
    let template = PathTemplate::parse(path);
    let mut seen = std::collections::HashSet::new();
    for name in template.named_segments() {
        if !seen.insert(name) {
            return Err(ScenarioError::InvalidDescriptor(format!(
                "path '{path}' declares segment '{name}' twice"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::MethodType;

    fn scenario(name: &str, path: &str) -> Scenario {
        Scenario::new(MethodType::Get, name, path)
    }

    #[test]
    fn test_valid_scenario_is_normalized() {
        let mut s = scenario(" todo-ok ", "api/todos/:id/");
        validate_scenario(&mut s).unwrap();
        assert_eq!(s.name, "todo-ok");
        assert_eq!(s.path, "/api/todos/:id");
    }

    #[test]
    fn test_rejects_bad_names() {
        let long = "x".repeat(201);
        for name in ["", "..", "a/b", "has space", long.as_str()] {
            let mut s = scenario(name, "/a");
            assert!(
                matches!(validate_scenario(&mut s), Err(ScenarioError::InvalidDescriptor(_))),
                "name {name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_bad_paths() {
        for path in ["/a/../b", "/a b", "/a%20", "/{id}/:id"] {
            let mut s = scenario("ok", path);
            assert!(
                validate_scenario(&mut s).is_err(),
                "path {path:?} should be rejected"
            );
        }

        let mut s = scenario("ok", "/a?b=c");
        validate_scenario(&mut s).unwrap();
        assert_eq!(s.path, "/a");
    }

    #[test]
    fn test_rejects_invalid_weight() {
        let mut s = scenario("ok", "/a").with_predicate("lots");
        assert!(matches!(
            validate_scenario(&mut s),
            Err(ScenarioError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_regex() {
        let mut s = scenario("ok", "/a").with_header("X-Version", "([0-9");
        let err = validate_scenario(&mut s).unwrap_err();
        match err {
            ScenarioError::InvalidPattern { field, pattern, .. } => {
                assert_eq!(field, "match_headers.X-Version");
                assert_eq!(pattern, "([0-9");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_empty_group_is_cleared() {
        let mut s = scenario("ok", "/a").with_group(" ");
        validate_scenario(&mut s).unwrap();
        assert!(s.group.is_none());
    }
}
