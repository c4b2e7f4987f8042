//! Scenario lookup: evaluate, select, load and render.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::error::LookupError;
use super::key_index::{Candidate, KeyIndex};
use super::selection::{select_and_record, SelectionPolicy};
use super::types::{BindingData, MatchTarget, Overrides, ResolvedScenario, REQUEST_COUNT_BINDING};
use crate::metrics;
use crate::predicate::{Evaluation, MismatchReason, PathParams};
use crate::storage::ScenarioStore;
use crate::template::BodyRenderer;

/// Resolves match targets to rendered scenarios.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct LookupService {
    index: Arc<KeyIndex>,
    store: Arc<dyn ScenarioStore>,
    renderer: Arc<dyn BodyRenderer>,
    policy: Arc<dyn SelectionPolicy>,
}

impl LookupService {
    pub fn new(
        index: Arc<KeyIndex>,
        store: Arc<dyn ScenarioStore>,
        renderer: Arc<dyn BodyRenderer>,
        policy: Arc<dyn SelectionPolicy>,
    ) -> Self {
        Self {
            index,
            store,
            renderer,
            policy,
        }
    }

    pub fn index(&self) -> &Arc<KeyIndex> {
        &self.index
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Find, select and render the scenario answering `target`.
    pub fn lookup(
        &self,
        target: &MatchTarget,
        overrides: &Overrides,
    ) -> Result<ResolvedScenario, LookupError> {
        let started = Instant::now();
        let result = self.resolve(target, overrides);
        metrics::record_lookup(
            match &result {
                Ok(_) => "matched",
                Err(e) => e.kind().as_str(),
            },
            started.elapsed(),
        );
        result
    }

    fn resolve(
        &self,
        target: &MatchTarget,
        overrides: &Overrides,
    ) -> Result<ResolvedScenario, LookupError> {
        let candidates = self
            .index
            .all_by_method_and_path_prefix(target.method, &target.path);

        let mut compatible: Vec<(&Candidate, PathParams)> = Vec::new();
        let mut mismatches: Vec<MismatchReason> = Vec::new();
        for candidate in &candidates {
            match candidate.entry.matcher().evaluate(target) {
                Evaluation::Compatible(params) => compatible.push((candidate, params)),
                Evaluation::Mismatch(reason) => mismatches.push(reason),
                Evaluation::Absent => {}
            }
        }
        debug!(
            method = %target.method,
            path = %target.path,
            candidates = candidates.len(),
            compatible = compatible.len(),
            mismatches = mismatches.len(),
            "evaluated candidates"
        );

        if compatible.is_empty() {
            if mismatches.is_empty() {
                return Err(LookupError::NoMatch {
                    method: target.method,
                    path: target.path.clone(),
                });
            }
            mismatches.sort_by(|a, b| a.scenario.cmp(&b.scenario));
            return Err(LookupError::ValidationMismatch {
                method: target.method,
                path: target.path.clone(),
                mismatches,
            });
        }

        // Deterministic order for the policy's tie-breaks
        compatible.sort_by(|a, b| a.0.entry.key().cmp(b.0.entry.key()));
        let refs: Vec<&Candidate> = compatible.iter().map(|(c, _)| *c).collect();
        let selection = select_and_record(self.policy.as_ref(), &refs);
        let (chosen, params) = &compatible[selection.index];
        let key = chosen.entry.key().clone();
        metrics::record_selection(chosen.bucket.method.as_str(), &chosen.bucket.prefix);
        info!(
            scenario = %key,
            request_count = chosen.entry.request_count(),
            aggregate = selection.aggregate_count,
            "selected scenario"
        );

        let scenario = self
            .store
            .load_scenario(&key)
            .map_err(|source| LookupError::StorageInconsistency {
                key: key.clone(),
                source,
            })?;

        let bindings = build_bindings(params, target, overrides, selection.aggregate_count);

        let template = match &scenario.response.contents_file {
            Some(fixture) => self.store.load_fixture(fixture).map_err(|source| {
                LookupError::StorageInconsistency {
                    key: key.clone(),
                    source,
                }
            })?,
            None => scenario
                .response
                .contents
                .clone()
                .unwrap_or_default()
                .into_bytes(),
        };
        let body = self
            .renderer
            .render(&template, &bindings)
            .map_err(|source| LookupError::Render {
                key: key.clone(),
                source,
            })?;

        Ok(ResolvedScenario {
            scenario,
            body,
            bindings,
            request_count: selection.aggregate_count,
        })
    }
}

/// Path params, then query params, then overrides; the request count last.
fn build_bindings(
    params: &PathParams,
    target: &MatchTarget,
    overrides: &Overrides,
    aggregate_count: u64,
) -> BindingData {
    let mut bindings = BindingData::new();
    for (name, value) in params {
        bindings.insert(name.clone(), serde_json::Value::String(value.clone()));
    }
    for (name, value) in &target.query_params {
        bindings.insert(name.clone(), serde_json::Value::String(value.clone()));
    }
    for (name, value) in overrides {
        bindings.insert(name.clone(), value.clone());
    }
    bindings.insert(
        REQUEST_COUNT_BINDING.to_string(),
        serde_json::Value::from(aggregate_count),
    );
    bindings
}
