//! Path template matching with named segment extraction.
//!
//! Declared scenario paths may contain named segments written either as
//! `:name` or `{name}`. Both forms are equivalent and can be mixed within
//! one pattern:
//!
//! ```text
//! /api/todos/:id             matches /api/todos/202        -> {id: "202"}
//! /api/{org}/repos/:repo     matches /api/acme/repos/mimic -> {org: "acme", repo: "mimic"}
//! ```
//!
//! Matching is segment-count exact: a pattern with N segments only matches
//! paths with N segments.

use std::collections::HashMap;
use std::fmt;

/// Named segment values extracted from a concrete path.
pub type PathParams = HashMap<String, String>;

/// Placeholder used for named segments when building normalized keys.
pub const NAMED_SEGMENT_PLACEHOLDER: &str = ":";

/// One slash-delimited segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment exactly (case-sensitive).
    Literal(String),
    /// Matches any non-empty request segment and binds it to the name.
    Named(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix(':').filter(|n| !n.is_empty()) {
            return Segment::Named(name.to_string());
        }
        if let Some(name) = raw
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .filter(|n| !n.is_empty())
        {
            return Segment::Named(name.to_string());
        }
        Segment::Literal(raw.to_string())
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Segment::Named(_))
    }
}

/// Compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a declared path pattern. Query strings and trailing slashes are ignored.
    pub fn parse(pattern: &str) -> Self {
        let normalized = normalize_path(pattern);
        let segments = path_segments(&normalized).map(Segment::parse).collect();
        Self {
            raw: normalized,
            segments,
        }
    }

    /// Normalized pattern text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of all named segments, in declaration order.
    pub fn named_segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Named(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Test a concrete path and extract named segment values.
    ///
    /// Returns `None` when the path does not match. A template without named
    /// segments yields an empty map on success.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let path = strip_query(path);
        let mut params = PathParams::new();
        let mut concrete = path_segments(path);

        for segment in &self.segments {
            let value = concrete.next()?;
            match segment {
                Segment::Literal(literal) => {
                    if literal != value {
                        return None;
                    }
                }
                Segment::Named(name) => {
                    if value.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), value.to_string());
                }
            }
        }

        if concrete.next().is_some() {
            return None;
        }
        Some(params)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.matches(path).is_some()
    }

    /// Rebuild a concrete path by substituting named segment values.
    ///
    /// Returns `None` if a named segment has no value in `params`.
    pub fn substitute(&self, params: &PathParams) -> Option<String> {
        if self.segments.is_empty() {
            return Some("/".to_string());
        }
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Named(name) => out.push_str(params.get(name)?),
            }
        }
        Some(out)
    }

    /// Pattern with every named segment replaced by a placeholder, so that
    /// `/api/todos/:id` and `/api/todos/{other}` normalize identically.
    pub fn normalized_key(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(literal) => format!("/{literal}"),
                Segment::Named(_) => format!("/{NAMED_SEGMENT_PLACEHOLDER}"),
            })
            .collect()
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Drop any `?query` suffix.
pub fn strip_query(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Normalize a path: strip the query, collapse repeated slashes, ensure a
/// leading slash and drop any trailing slash (except for the root).
pub fn normalize_path(path: &str) -> String {
    let path = strip_query(path.trim());
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Iterate the non-empty segments of a path.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_colon_and_brace_syntax_are_equivalent() {
        let colon = PathTemplate::parse("/api/todos/:id");
        let brace = PathTemplate::parse("/api/todos/{id}");

        let a = colon.matches("/api/todos/202").unwrap();
        let b = brace.matches("/api/todos/202").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get("id"), Some(&"202".to_string()));
        assert_eq!(colon.normalized_key(), brace.normalized_key());
    }

    #[test]
    fn test_mixed_syntax_in_one_pattern() {
        let template = PathTemplate::parse("/orgs/{org}/repos/:repo");
        let params = template.matches("/orgs/acme/repos/mimic").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["org"], "acme");
        assert_eq!(params["repo"], "mimic");
    }

    #[test]
    fn test_segment_count_is_exact() {
        let template = PathTemplate::parse("/api/todos/:id");
        assert!(!template.is_match("/api/todos"));
        assert!(!template.is_match("/api/todos/1/comments"));
        assert!(template.is_match("/api/todos/1"));
    }

    #[test]
    fn test_literal_segments_are_case_sensitive() {
        let template = PathTemplate::parse("/api/Todos");
        assert!(template.is_match("/api/Todos"));
        assert!(!template.is_match("/api/todos"));
    }

    #[test]
    fn test_literal_only_pattern_yields_empty_params() {
        let template = PathTemplate::parse("/health");
        let params = template.matches("/health").unwrap();
        assert!(params.is_empty());
        assert!(template.matches("/healthz").is_none());
    }

    #[test]
    fn test_query_and_trailing_slash_ignored() {
        let template = PathTemplate::parse("/api/todos/:id/");
        assert_eq!(template.as_str(), "/api/todos/:id");
        let params = template.matches("/api/todos/7?a=1").unwrap();
        assert_eq!(params["id"], "7");
    }

    #[test]
    fn test_root_path() {
        let template = PathTemplate::parse("/");
        assert!(template.is_match("/"));
        assert!(template.is_match(""));
        assert!(!template.is_match("/a"));
        assert_eq!(template.substitute(&PathParams::new()).unwrap(), "/");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("api//todos/"), "/api/todos");
        assert_eq!(normalize_path("/api/todos?x=1"), "/api/todos");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_bare_colon_is_literal() {
        let template = PathTemplate::parse("/a/:/b");
        assert!(template.segments()[1] == Segment::Literal(":".to_string()));
        assert!(template.is_match("/a/:/b"));
    }

    fn segment_strategy() -> impl Strategy<Value = (bool, String)> {
        (any::<bool>(), "[a-z][a-z0-9_]{0,7}")
    }

    proptest! {
        #[test]
        fn prop_extraction_roundtrips(
            segments in proptest::collection::vec(segment_strategy(), 0..6),
            values in proptest::collection::vec("[A-Za-z0-9._~-]{1,10}", 6),
            brace in any::<bool>(),
        ) {
            let mut pattern = String::new();
            let mut concrete = String::new();
            let mut named = 0usize;
            for (i, (is_named, literal)) in segments.iter().enumerate() {
                if *is_named {
                    let name = format!("p{i}");
                    if brace {
                        pattern.push_str(&format!("/{{{name}}}"));
                    } else {
                        pattern.push_str(&format!("/:{name}"));
                    }
                    concrete.push('/');
                    concrete.push_str(&values[i]);
                    named += 1;
                } else {
                    pattern.push('/');
                    pattern.push_str(literal);
                    concrete.push('/');
                    concrete.push_str(literal);
                }
            }
            let template = PathTemplate::parse(&pattern);
            let params = template.matches(&concrete).expect("concrete path must match");
            prop_assert_eq!(params.len(), named);
            let rebuilt = template.substitute(&params).expect("all names bound");
            prop_assert_eq!(rebuilt, normalize_path(&concrete));
        }
    }
}
