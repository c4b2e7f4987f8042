//! Compiled value patterns for query parameters, headers and content types.
//!
//! A declared value is satisfied when the observed value equals it exactly,
//! or when the declared value, read as a regular expression, finds a match
//! anywhere in the observed value. Patterns are compiled once when a
//! descriptor is indexed so that matching never fails on a bad expression.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// A declared value compiled for matching.
#[derive(Debug, Clone)]
pub struct ValuePattern {
    raw: String,
    regex: Option<Arc<Regex>>,
}

impl ValuePattern {
    /// Compile a declared value. Fails when the value is not a valid regex.
    pub fn compile(raw: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(raw)?;
        Ok(Self {
            raw: raw.to_string(),
            regex: Some(Arc::new(regex)),
        })
    }

    /// Pattern that only matches by exact equality.
    pub fn literal(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            regex: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, value: &str) -> bool {
        self.raw == value || self.regex.as_ref().is_some_and(|re| re.is_match(value))
    }
}

impl PartialEq for ValuePattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for ValuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
