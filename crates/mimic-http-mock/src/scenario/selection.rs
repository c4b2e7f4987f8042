//! Picking one scenario among several compatible candidates.
//!
//! The default policy is a fair weighted rotation: each candidate has a target
//! share of traffic, and every selection goes to the candidate furthest below
//! its share. Over N selections each candidate's count stays within one of
//! `share * N`, so a 70/30 split is exact to within a single request.

use chrono::Utc;
use parking_lot::MutexGuard;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::error::ScenarioError;
use super::key_index::{Candidate, IndexedDescriptor};

const EPSILON: f64 = 1e-9;

// ============================================================================
// Weight
// ============================================================================

/// Declared traffic share as a fraction in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Weight(f64);

impl Weight {
    /// Parse `0.7`, `70%` or `70`. Bare numbers above 1 are percentages.
    pub fn parse(raw: &str) -> Result<Self, ScenarioError> {
        let invalid = |reason: &str| ScenarioError::InvalidWeight {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };
        let text = raw.trim();
        if text.is_empty() {
            return Err(invalid("empty weight"));
        }
        let (number, percent) = match text.strip_suffix('%') {
            Some(n) => (n.trim(), true),
            None => (text, false),
        };
        let value: f64 = number.parse().map_err(|_| invalid("not a number"))?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid("must be a non-negative number"));
        }
        let fraction = if percent || value > 1.0 {
            value / 100.0
        } else {
            value
        };
        if fraction > 1.0 {
            return Err(invalid("exceeds 100%"));
        }
        Ok(Weight(fraction))
    }

    pub fn fraction(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 <= EPSILON
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0 * 100.0)
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Chooses one of several compatible candidates.
///
/// Called with at least one candidate while the candidates' selection locks
/// are held, so counters read here do not move until the choice is recorded.
pub trait SelectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Index into `candidates` of the chosen one.
    fn select(&self, candidates: &[&IndexedDescriptor]) -> usize;
}

/// Fair weighted rotation by largest deficit.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedFairPolicy;

impl WeightedFairPolicy {
    /// Normalized target shares for `candidates`, with zero-weight candidates
    /// already removed by the caller.
    fn shares(candidates: &[&IndexedDescriptor], honour_weights: bool) -> Vec<f64> {
        let n = candidates.len() as f64;
        if !honour_weights {
            return vec![1.0 / n; candidates.len()];
        }
        let declared: f64 = candidates
            .iter()
            .filter_map(|c| c.weight())
            .map(|w| w.fraction())
            .sum();
        let unset = candidates.iter().filter(|c| c.weight().is_none()).count();
        let remainder = if unset > 0 {
            (1.0 - declared).max(0.0) / unset as f64
        } else {
            0.0
        };
        let raw: Vec<f64> = candidates
            .iter()
            .map(|c| c.weight().map_or(remainder, |w| w.fraction()))
            .collect();
        let total: f64 = raw.iter().sum();
        if total <= EPSILON {
            return vec![1.0 / n; candidates.len()];
        }
        raw.into_iter().map(|s| s / total).collect()
    }
}

impl SelectionPolicy for WeightedFairPolicy {
    fn name(&self) -> &'static str {
        "weighted_fair"
    }

    fn select(&self, candidates: &[&IndexedDescriptor]) -> usize {
        if candidates.len() <= 1 {
            return 0;
        }

        let mut eligible: Vec<usize> = (0..candidates.len())
            .filter(|&i| !candidates[i].weight().is_some_and(|w| w.is_zero()))
            .collect();
        let honour_weights = !eligible.is_empty();
        if !honour_weights {
            eligible = (0..candidates.len()).collect();
        }

        let pool: Vec<&IndexedDescriptor> = eligible.iter().map(|&i| candidates[i]).collect();
        let shares = Self::shares(&pool, honour_weights);
        let total = pool.iter().map(|c| c.request_count()).sum::<u64>() as f64 + 1.0;

        let mut best = 0usize;
        let mut best_deficit = f64::NEG_INFINITY;
        for (pos, candidate) in pool.iter().enumerate() {
            let deficit = shares[pos] * total - candidate.request_count() as f64;
            let better = if (deficit - best_deficit).abs() <= EPSILON {
                earlier_then_name(candidate, pool[best])
            } else {
                deficit > best_deficit
            };
            if better {
                best = pos;
                best_deficit = deficit;
            }
        }
        eligible[best]
    }
}

/// Picks the candidate used least recently, never-used first.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastRecentlyUsedPolicy;

impl SelectionPolicy for LeastRecentlyUsedPolicy {
    fn name(&self) -> &'static str {
        "least_recently_used"
    }

    fn select(&self, candidates: &[&IndexedDescriptor]) -> usize {
        let mut best = 0usize;
        for (pos, candidate) in candidates.iter().enumerate().skip(1) {
            if earlier_then_name(candidate, candidates[best]) {
                best = pos;
            }
        }
        best
    }
}

/// Tie-break: earliest last use (never used first), then name.
fn earlier_then_name(a: &IndexedDescriptor, b: &IndexedDescriptor) -> bool {
    let a_used = a.last_usage_micros().unwrap_or(i64::MIN);
    let b_used = b.last_usage_micros().unwrap_or(i64::MIN);
    (a_used, a.name()) < (b_used, b.name())
}

/// Configured selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    WeightedFair,
    LeastRecentlyUsed,
}

impl SelectionStrategy {
    pub fn policy(&self) -> Arc<dyn SelectionPolicy> {
        match self {
            SelectionStrategy::WeightedFair => Arc::new(WeightedFairPolicy),
            SelectionStrategy::LeastRecentlyUsed => Arc::new(LeastRecentlyUsedPolicy),
        }
    }
}

impl std::str::FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_fair" => Ok(SelectionStrategy::WeightedFair),
            "least_recently_used" | "lru" => Ok(SelectionStrategy::LeastRecentlyUsed),
            other => Err(format!("unknown selection strategy '{other}'")),
        }
    }
}

// ============================================================================
// Locked selection
// ============================================================================

/// Outcome of [`select_and_record`].
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    /// Index into the candidate slice.
    pub index: usize,
    /// Sum of request counts across all candidates, including this selection.
    pub aggregate_count: u64,
}

/// Select one of `candidates` and record the usage atomically.
///
/// The selection locks of every bucket involved are taken in bucket-key
/// order, so concurrent lookups on overlapping buckets cannot deadlock and
/// read-then-increment is linearizable per bucket.
pub fn select_and_record(policy: &dyn SelectionPolicy, candidates: &[&Candidate]) -> Selection {
    let mut locks: Vec<&Candidate> = Vec::with_capacity(2);
    for candidate in candidates {
        if !locks.iter().any(|c| c.bucket == candidate.bucket) {
            locks.push(candidate);
        }
    }
    locks.sort_by(|a, b| a.bucket.cmp(&b.bucket));
    let _guards: Vec<MutexGuard<'_, ()>> = locks.iter().map(|c| c.selection_lock.lock()).collect();

    let entries: Vec<&IndexedDescriptor> = candidates.iter().map(|c| c.entry.as_ref()).collect();
    let index = if entries.len() == 1 {
        0
    } else {
        policy.select(&entries)
    };
    entries[index].record_usage(Utc::now());
    let aggregate_count = entries.iter().map(|e| e.request_count()).sum();

    Selection {
        index,
        aggregate_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{KeyIndex, MethodType, Scenario};

    #[test]
    fn test_weight_parse() {
        assert_eq!(Weight::parse("0.7").unwrap().fraction(), 0.7);
        assert_eq!(Weight::parse("70%").unwrap().fraction(), 0.7);
        assert_eq!(Weight::parse("70").unwrap().fraction(), 0.7);
        assert_eq!(Weight::parse(" 100 % ").unwrap().fraction(), 1.0);
        assert_eq!(Weight::parse("1").unwrap().fraction(), 1.0);
        assert!(Weight::parse("0").unwrap().is_zero());
        assert!(Weight::parse("").is_err());
        assert!(Weight::parse("-5").is_err());
        assert!(Weight::parse("150").is_err());
        assert!(Weight::parse("seventy").is_err());
    }

    fn index_with(weights: &[(&str, Option<&str>)]) -> KeyIndex {
        let index = KeyIndex::new();
        for (name, weight) in weights {
            let mut scenario = Scenario::new(MethodType::Get, *name, "/api/items");
            scenario.predicate = weight.map(str::to_string);
            index.add(scenario.to_descriptor()).unwrap();
        }
        index
    }

    fn run(index: &KeyIndex, policy: &dyn SelectionPolicy, n: usize) -> Vec<(String, u64)> {
        for _ in 0..n {
            let candidates = index.all_by_method_and_path_prefix(MethodType::Get, "/api/items");
            let refs: Vec<&Candidate> = candidates.iter().collect();
            select_and_record(policy, &refs);
        }
        index
            .all()
            .into_iter()
            .map(|d| (d.name, d.request_count))
            .collect()
    }

    #[test]
    fn test_weighted_fair_70_30() {
        let index = index_with(&[("a", Some("70%")), ("b", Some("0.3"))]);
        let counts = run(&index, &WeightedFairPolicy, 1000);
        let a = counts.iter().find(|(n, _)| n == "a").unwrap().1;
        let b = counts.iter().find(|(n, _)| n == "b").unwrap().1;
        assert_eq!(a + b, 1000);
        assert!((650..=750).contains(&a), "a={a}");
        assert!((a as i64 - 700).abs() <= 1, "a={a}");
    }

    #[test]
    fn test_weighted_fair_unset_weights_split_remainder() {
        let index = index_with(&[("a", Some("50")), ("b", None), ("c", None)]);
        let counts = run(&index, &WeightedFairPolicy, 400);
        let by_name: std::collections::HashMap<_, _> = counts.into_iter().collect();
        assert_eq!(by_name["a"], 200);
        assert_eq!(by_name["b"], 100);
        assert_eq!(by_name["c"], 100);
    }

    #[test]
    fn test_weighted_fair_equal_split_alternates() {
        let index = index_with(&[("b", None), ("a", None)]);
        let candidates = index.all_by_method_and_path_prefix(MethodType::Get, "/api/items");
        let refs: Vec<&Candidate> = candidates.iter().collect();
        let mut order = Vec::new();
        for _ in 0..4 {
            let selection = select_and_record(&WeightedFairPolicy, &refs);
            order.push(refs[selection.index].entry.name().to_string());
        }
        assert_eq!(order, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_zero_weight_filtered() {
        let index = index_with(&[("a", Some("0")), ("b", None)]);
        let counts = run(&index, &WeightedFairPolicy, 10);
        assert_eq!(counts, vec![("a".to_string(), 0), ("b".to_string(), 10)]);
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_equal_shares() {
        let index = index_with(&[("a", Some("0%")), ("b", Some("0"))]);
        let counts = run(&index, &WeightedFairPolicy, 10);
        assert_eq!(counts, vec![("a".to_string(), 5), ("b".to_string(), 5)]);
    }

    #[test]
    fn test_least_recently_used_rotates() {
        let index = index_with(&[("a", Some("90")), ("b", Some("10")), ("c", None)]);
        let counts = run(&index, &LeastRecentlyUsedPolicy, 9);
        assert!(counts.iter().all(|(_, c)| *c == 3), "{counts:?}");
    }

    #[test]
    fn test_aggregate_count() {
        let index = index_with(&[("a", None), ("b", None)]);
        let candidates = index.all_by_method_and_path_prefix(MethodType::Get, "/api/items");
        let refs: Vec<&Candidate> = candidates.iter().collect();
        select_and_record(&WeightedFairPolicy, &refs);
        let selection = select_and_record(&WeightedFairPolicy, &refs);
        assert_eq!(selection.aggregate_count, 2);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "least-recently-used".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::LeastRecentlyUsed
        );
        assert_eq!(SelectionStrategy::default().policy().name(), "weighted_fair");
        assert!("random".parse::<SelectionStrategy>().is_err());
    }
}
