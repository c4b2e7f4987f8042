//! Error types for scenario lookup and save.

use serde::Serialize;
use std::fmt;

use super::descriptor::ScenarioKey;
use super::types::MethodType;
use crate::predicate::{MismatchReason, PatternError};
use crate::storage::StoreError;
use crate::template::RenderError;

/// Discriminant of [`LookupError`], for callers that map failures to
/// transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupErrorKind {
    NoMatch,
    ValidationMismatch,
    StorageInconsistency,
    Render,
}

impl LookupErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupErrorKind::NoMatch => "no_match",
            LookupErrorKind::ValidationMismatch => "validation_mismatch",
            LookupErrorKind::StorageInconsistency => "storage_inconsistency",
            LookupErrorKind::Render => "render",
        }
    }
}

impl fmt::Display for LookupErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// No scenario is structurally compatible with the request.
    #[error("no scenario matches {method} {path}")]
    NoMatch { method: MethodType, path: String },

    /// At least one scenario was structurally compatible but rejected the
    /// request's query, headers, content type or body.
    #[error("request to {method} {path} failed validation: {}", join_reasons(.mismatches))]
    ValidationMismatch {
        method: MethodType,
        path: String,
        mismatches: Vec<MismatchReason>,
    },

    /// The index selected a scenario the store could not produce.
    #[error("scenario {key} is indexed but could not be loaded: {source}")]
    StorageInconsistency {
        key: ScenarioKey,
        #[source]
        source: StoreError,
    },

    #[error("failed to render body of scenario {key}: {source}")]
    Render {
        key: ScenarioKey,
        #[source]
        source: RenderError,
    },
}

impl LookupError {
    pub fn kind(&self) -> LookupErrorKind {
        match self {
            LookupError::NoMatch { .. } => LookupErrorKind::NoMatch,
            LookupError::ValidationMismatch { .. } => LookupErrorKind::ValidationMismatch,
            LookupError::StorageInconsistency { .. } => LookupErrorKind::StorageInconsistency,
            LookupError::Render { .. } => LookupErrorKind::Render,
        }
    }

    /// Mismatch details, empty for every kind but `ValidationMismatch`.
    pub fn mismatches(&self) -> &[MismatchReason] {
        match self {
            LookupError::ValidationMismatch { mismatches, .. } => mismatches,
            _ => &[],
        }
    }
}

fn join_reasons(reasons: &[MismatchReason]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Save-time failures.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("invalid scenario: {0}")]
    InvalidDescriptor(String),

    #[error("invalid pattern for {field} '{pattern}': {source}")]
    InvalidPattern {
        field: String,
        pattern: String,
        #[source]
        source: PatternError,
    },

    #[error("invalid weight '{raw}': {reason}")]
    InvalidWeight { raw: String, reason: String },

    #[error("scenario name '{name}' is already used by {existing} in the same bucket")]
    NameConflict { name: String, existing: ScenarioKey },

    #[error("scenario {0} not found")]
    NotFound(ScenarioKey),

    #[error(transparent)]
    Store(#[from] StoreError),
}
