//! In-memory key index of scenario descriptors.
//!
//! Descriptors are bucketed by method and first path segment so a lookup only
//! evaluates scenarios that could plausibly address the request:
//!
//! ```text
//! GET /api/todos/:id      -> (GET, "api")
//! GET /api/todos          -> (GET, "api")
//! GET /:tenant/orders     -> (GET, "*")     consulted for every GET
//! GET /                   -> (GET, "")
//! ```
//!
//! The bucket map sits behind one `RwLock`: lookups take the shared lock,
//! saves and deletes the exclusive one. Usage counters are atomics shared by
//! every version of a descriptor, so they are bumped without the exclusive
//! lock and survive a replace.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::descriptor::{ScenarioDescriptor, ScenarioKey};
use super::error::ScenarioError;
use super::selection::Weight;
use super::types::MethodType;
use crate::predicate::{path_segments, strip_query, CompiledMatcher, PathTemplate, Segment};

/// Prefix of the bucket holding patterns whose first segment is named.
pub const WILDCARD_PREFIX: &str = "*";

/// Bucket identity: method plus first-level path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub method: MethodType,
    pub prefix: String,
}

impl BucketKey {
    /// Bucket a declared pattern belongs to.
    pub fn for_pattern(method: MethodType, pattern: &str) -> Self {
        let template = PathTemplate::parse(pattern);
        let prefix = match template.segments().first() {
            None => String::new(),
            Some(Segment::Named(_)) => WILDCARD_PREFIX.to_string(),
            Some(Segment::Literal(literal)) => literal.clone(),
        };
        Self { method, prefix }
    }

    /// Literal bucket a concrete request path falls into.
    pub fn for_request(method: MethodType, path: &str) -> Self {
        let prefix = path_segments(strip_query(path))
            .next()
            .unwrap_or_default()
            .to_string();
        Self { method, prefix }
    }

    pub fn wildcard(method: MethodType) -> Self {
        Self {
            method,
            prefix: WILDCARD_PREFIX.to_string(),
        }
    }
}

/// Selection counters shared across replacements of one descriptor.
#[derive(Debug, Default)]
pub struct UsageCounters {
    request_count: AtomicU64,
    /// Microseconds since the epoch; 0 means never used.
    last_usage_micros: AtomicI64,
}

/// A descriptor as held by the index: compiled matcher, parsed weight and
/// live usage counters.
#[derive(Debug)]
pub struct IndexedDescriptor {
    descriptor: ScenarioDescriptor,
    key: ScenarioKey,
    matcher: CompiledMatcher,
    weight: Option<Weight>,
    usage: Arc<UsageCounters>,
}

impl IndexedDescriptor {
    pub fn key(&self) -> &ScenarioKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn group(&self) -> Option<&str> {
        self.descriptor.group.as_deref()
    }

    pub fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    pub fn weight(&self) -> Option<Weight> {
        self.weight
    }

    pub fn request_count(&self) -> u64 {
        self.usage.request_count.load(Ordering::Acquire)
    }

    /// Last selection time in microseconds since the epoch, `None` if never.
    pub fn last_usage_micros(&self) -> Option<i64> {
        match self.usage.last_usage_micros.load(Ordering::Acquire) {
            0 => None,
            micros => Some(micros),
        }
    }

    pub fn last_usage_time(&self) -> Option<DateTime<Utc>> {
        self.last_usage_micros()
            .and_then(DateTime::<Utc>::from_timestamp_micros)
    }

    /// Record one selection. Callers hold the bucket's selection lock.
    pub(crate) fn record_usage(&self, now: DateTime<Utc>) -> u64 {
        // Strictly increasing per descriptor, even within one microsecond
        let micros = now.timestamp_micros().max(1);
        let _ = self
            .usage
            .last_usage_micros
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(micros.max(prev.saturating_add(1)))
            });
        self.usage.request_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Descriptor with a snapshot of the live counters.
    pub fn snapshot(&self) -> ScenarioDescriptor {
        let mut descriptor = self.descriptor.clone();
        descriptor.request_count = self.request_count();
        descriptor.last_usage_time = self.last_usage_time();
        descriptor
    }
}

/// Compatible-candidate handle returned to the lookup path.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entry: Arc<IndexedDescriptor>,
    pub bucket: BucketKey,
    pub selection_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Default)]
struct Bucket {
    /// Keyed by scenario name, unique within the bucket.
    entries: HashMap<String, Arc<IndexedDescriptor>>,
    selection_lock: Arc<Mutex<()>>,
}

/// Concurrent index from bucket key to scenario descriptors.
#[derive(Debug, Default)]
pub struct KeyIndex {
    buckets: RwLock<HashMap<BucketKey, Bucket>>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole index with `descriptors`.
    ///
    /// Descriptors that fail to compile or conflict with an earlier one are
    /// skipped and returned alongside the error. Counters of descriptors that
    /// were already indexed carry over.
    pub fn rebuild(
        &self,
        descriptors: Vec<ScenarioDescriptor>,
    ) -> Vec<(ScenarioDescriptor, ScenarioError)> {
        let mut skipped = Vec::new();
        let mut fresh: HashMap<BucketKey, Bucket> = HashMap::new();
        let mut buckets = self.buckets.write();

        for descriptor in descriptors {
            let entry = match Self::prepare(&descriptor, None) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(scenario = %descriptor.key(), error = %e, "skipping scenario");
                    skipped.push((descriptor, e));
                    continue;
                }
            };
            let bucket_key = BucketKey::for_pattern(descriptor.method, &descriptor.path);
            let usage = buckets
                .get(&bucket_key)
                .and_then(|b| b.entries.get(&descriptor.name))
                .filter(|existing| existing.key == entry.key)
                .map(|existing| existing.usage.clone());

            // In-flight lookups may still hold the old bucket's lock
            let selection_lock = buckets
                .get(&bucket_key)
                .map(|b| b.selection_lock.clone())
                .unwrap_or_default();
            let bucket = fresh.entry(bucket_key).or_insert_with(|| Bucket {
                entries: HashMap::new(),
                selection_lock,
            });
            if let Some(existing) = bucket.entries.get(&descriptor.name) {
                let err = ScenarioError::NameConflict {
                    name: descriptor.name.clone(),
                    existing: existing.key.clone(),
                };
                warn!(scenario = %descriptor.key(), error = %err, "skipping scenario");
                skipped.push((descriptor, err));
                continue;
            }
            let entry = match usage {
                Some(usage) => IndexedDescriptor { usage, ..entry },
                None => entry,
            };
            bucket
                .entries
                .insert(descriptor.name.clone(), Arc::new(entry));
        }

        *buckets = fresh;
        let total: usize = buckets.values().map(|b| b.entries.len()).sum();
        debug!(descriptors = total, buckets = buckets.len(), "key index rebuilt");
        skipped
    }

    /// Compile and insert a descriptor, replacing one with the same identity.
    /// Returns `true` when an existing descriptor was replaced.
    pub fn add(&self, descriptor: ScenarioDescriptor) -> Result<bool, ScenarioError> {
        let matcher = CompiledMatcher::compile(&descriptor)?;
        self.add_compiled(descriptor, matcher)
    }

    /// Insert a descriptor whose matcher has already been compiled.
    pub fn add_compiled(
        &self,
        descriptor: ScenarioDescriptor,
        matcher: CompiledMatcher,
    ) -> Result<bool, ScenarioError> {
        let entry = Self::prepare(&descriptor, Some(matcher))?;
        let bucket_key = BucketKey::for_pattern(descriptor.method, &descriptor.path);

        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(bucket_key).or_default();
        let entry = match bucket.entries.get(&descriptor.name) {
            Some(existing) if existing.key != entry.key => {
                return Err(ScenarioError::NameConflict {
                    name: descriptor.name,
                    existing: existing.key.clone(),
                });
            }
            Some(existing) => IndexedDescriptor {
                usage: existing.usage.clone(),
                ..entry
            },
            None => entry,
        };
        let replaced = bucket
            .entries
            .insert(descriptor.name, Arc::new(entry))
            .is_some();
        Ok(replaced)
    }

    /// Fail with `NameConflict` if adding `key` would clash with another
    /// descriptor in its bucket.
    pub fn check_conflict(&self, key: &ScenarioKey) -> Result<(), ScenarioError> {
        let bucket_key = BucketKey::for_pattern(key.method, &key.path);
        let buckets = self.buckets.read();
        match buckets
            .get(&bucket_key)
            .and_then(|b| b.entries.get(&key.name))
        {
            Some(existing) if existing.key != *key => Err(ScenarioError::NameConflict {
                name: key.name.clone(),
                existing: existing.key.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Drop a descriptor. Returns `true` if it was indexed.
    pub fn remove(&self, key: &ScenarioKey) -> bool {
        let bucket_key = BucketKey::for_pattern(key.method, &key.path);
        let mut buckets = self.buckets.write();
        let Some(bucket) = buckets.get_mut(&bucket_key) else {
            return false;
        };
        let removed = match bucket.entries.get(&key.name) {
            Some(existing) if existing.key == *key => bucket.entries.remove(&key.name).is_some(),
            _ => false,
        };
        if bucket.entries.is_empty() {
            buckets.remove(&bucket_key);
        }
        removed
    }

    pub fn get(&self, key: &ScenarioKey) -> Option<ScenarioDescriptor> {
        let bucket_key = BucketKey::for_pattern(key.method, &key.path);
        let buckets = self.buckets.read();
        buckets
            .get(&bucket_key)
            .and_then(|b| b.entries.get(&key.name))
            .filter(|e| e.key == *key)
            .map(|e| e.snapshot())
    }

    /// Every descriptor that could address `method` + `path`: the literal
    /// bucket of the path's first segment plus the method's wildcard bucket.
    pub fn all_by_method_and_path_prefix(&self, method: MethodType, path: &str) -> Vec<Candidate> {
        let literal = BucketKey::for_request(method, path);
        let wildcard = BucketKey::wildcard(method);
        let buckets = self.buckets.read();

        let mut candidates = Vec::new();
        let keys = if literal == wildcard {
            vec![literal]
        } else {
            vec![literal, wildcard]
        };
        for key in keys {
            if let Some(bucket) = buckets.get(&key) {
                candidates.extend(bucket.entries.values().map(|entry| Candidate {
                    entry: entry.clone(),
                    bucket: key.clone(),
                    selection_lock: bucket.selection_lock.clone(),
                }));
            }
        }
        candidates
    }

    /// Descriptors in `group`, sorted by path, method, name.
    pub fn all_by_group(&self, group: &str) -> Vec<ScenarioDescriptor> {
        self.collect_sorted(|entry| entry.group() == Some(group))
    }

    /// Every descriptor, sorted by path, method, name.
    pub fn all(&self) -> Vec<ScenarioDescriptor> {
        self.collect_sorted(|_| true)
    }

    /// Distinct group labels, sorted.
    pub fn groups(&self) -> Vec<String> {
        let buckets = self.buckets.read();
        let groups: BTreeSet<String> = buckets
            .values()
            .flat_map(|b| b.entries.values())
            .filter_map(|e| e.group().map(str::to_string))
            .collect();
        groups.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.read().values().map(|b| b.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect_sorted(&self, keep: impl Fn(&IndexedDescriptor) -> bool) -> Vec<ScenarioDescriptor> {
        let buckets = self.buckets.read();
        let mut out: Vec<ScenarioDescriptor> = buckets
            .values()
            .flat_map(|b| b.entries.values())
            .filter(|e| keep(e))
            .map(|e| e.snapshot())
            .collect();
        drop(buckets);
        out.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then(a.method.cmp(&b.method))
                .then(a.name.cmp(&b.name))
        });
        out
    }

    fn prepare(
        descriptor: &ScenarioDescriptor,
        matcher: Option<CompiledMatcher>,
    ) -> Result<IndexedDescriptor, ScenarioError> {
        let matcher = match matcher {
            Some(m) => m,
            None => CompiledMatcher::compile(descriptor)?,
        };
        let weight = descriptor
            .predicate
            .as_deref()
            .map(Weight::parse)
            .transpose()?;
        let key = descriptor.key();
        let mut stored = descriptor.clone();
        stored.path = key.path.clone();
        Ok(IndexedDescriptor {
            usage: Arc::new(UsageCounters::default()),
            descriptor: stored,
            key,
            matcher,
            weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;

    fn descriptor(method: MethodType, name: &str, path: &str) -> ScenarioDescriptor {
        Scenario::new(method, name, path).to_descriptor()
    }

    #[test]
    fn test_bucket_keys() {
        assert_eq!(
            BucketKey::for_pattern(MethodType::Get, "/api/todos/:id"),
            BucketKey::for_pattern(MethodType::Get, "/api/todos/{other}")
        );
        assert_eq!(
            BucketKey::for_pattern(MethodType::Get, "/:tenant/x"),
            BucketKey::wildcard(MethodType::Get)
        );
        assert_eq!(
            BucketKey::for_request(MethodType::Get, "/api/todos/1?x=1").prefix,
            "api"
        );
        assert_eq!(BucketKey::for_request(MethodType::Get, "/").prefix, "");
    }

    #[test]
    fn test_candidates_include_wildcard_bucket() {
        let index = KeyIndex::new();
        index.add(descriptor(MethodType::Get, "todo", "/api/todos/:id")).unwrap();
        index.add(descriptor(MethodType::Get, "tenant", "/:tenant/todos/:id")).unwrap();
        index.add(descriptor(MethodType::Get, "other", "/other/x")).unwrap();
        index.add(descriptor(MethodType::Post, "post", "/api/todos/:id")).unwrap();

        let mut names: Vec<String> = index
            .all_by_method_and_path_prefix(MethodType::Get, "/api/todos/1")
            .into_iter()
            .map(|c| c.entry.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["tenant", "todo"]);
    }

    #[test]
    fn test_replace_keeps_counters() {
        let index = KeyIndex::new();
        index.add(descriptor(MethodType::Get, "ok", "/a")).unwrap();
        let candidate = index
            .all_by_method_and_path_prefix(MethodType::Get, "/a")
            .remove(0);
        candidate.entry.record_usage(Utc::now());
        candidate.entry.record_usage(Utc::now());

        let replaced = index.add(descriptor(MethodType::Get, "ok", "/a/")).unwrap();
        assert!(replaced);
        let key = ScenarioKey::new(MethodType::Get, "ok", "/a");
        assert_eq!(index.get(&key).unwrap().request_count, 2);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_snapshot_counters_are_not_read_back() {
        let index = KeyIndex::new();
        let mut stale = descriptor(MethodType::Get, "ok", "/a");
        stale.request_count = 42;
        stale.last_usage_time = Some(Utc::now());
        index.add(stale).unwrap();

        let indexed = index
            .get(&ScenarioKey::new(MethodType::Get, "ok", "/a"))
            .unwrap();
        assert_eq!(indexed.request_count, 0);
        assert_eq!(indexed.last_usage_time, None);
    }

    #[test]
    fn test_name_conflict_in_bucket() {
        let index = KeyIndex::new();
        index.add(descriptor(MethodType::Get, "dup", "/api/a")).unwrap();
        let err = index
            .add(descriptor(MethodType::Get, "dup", "/api/b"))
            .unwrap_err();
        assert!(matches!(err, ScenarioError::NameConflict { .. }));

        // Same name in another bucket is fine
        index.add(descriptor(MethodType::Get, "dup", "/web/a")).unwrap();
        index.add(descriptor(MethodType::Post, "dup", "/api/b")).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_remove() {
        let index = KeyIndex::new();
        index.add(descriptor(MethodType::Get, "ok", "/a")).unwrap();
        let wrong_path = ScenarioKey::new(MethodType::Get, "ok", "/a/b");
        assert!(!index.remove(&wrong_path));
        assert!(index.remove(&ScenarioKey::new(MethodType::Get, "ok", "/a")));
        assert!(index.is_empty());
    }

    #[test]
    fn test_all_sorted_and_groups() {
        let index = KeyIndex::new();
        let mut b = descriptor(MethodType::Post, "b", "/b");
        b.group = Some("beta".to_string());
        let mut a = descriptor(MethodType::Get, "a", "/b");
        a.group = Some("alpha".to_string());
        index.add(b).unwrap();
        index.add(a).unwrap();
        index.add(descriptor(MethodType::Get, "z", "/a")).unwrap();

        let all: Vec<String> = index.all().into_iter().map(|d| d.name).collect();
        assert_eq!(all, vec!["z", "a", "b"]);
        assert_eq!(index.groups(), vec!["alpha", "beta"]);
        assert_eq!(index.all_by_group("beta").len(), 1);
    }

    #[test]
    fn test_rebuild_skips_invalid_and_conflicting() {
        let index = KeyIndex::new();
        let mut bad = descriptor(MethodType::Get, "bad", "/a");
        bad.match_headers.insert("x".to_string(), "(".to_string());
        let skipped = index.rebuild(vec![
            descriptor(MethodType::Get, "ok", "/a"),
            bad,
            descriptor(MethodType::Get, "ok", "/a/other"),
        ]);
        assert_eq!(skipped.len(), 2);
        assert_eq!(index.len(), 1);
    }
}
