//! Request matching for scenario candidates.
//!
//! Patterns are compiled once, when a scenario is saved or indexed, so a
//! bad expression is rejected up front and matching itself cannot fail.
//!
//! # Module Structure
//!
//! - `path_template` - Declared paths with `:name` / `{name}` segments
//! - `value_pattern` - Exact-or-regex values for query params, headers, content type
//! - `contents` - Body patterns (text or JSON field map)
//! - `evaluator` - Ordered candidate evaluation with structural vs validation results

mod contents;
mod evaluator;
mod path_template;
mod value_pattern;

pub use contents::{ContentsMismatch, ContentsPattern, PatternError};
pub use evaluator::{CompiledMatcher, Evaluation, MatchField, MismatchReason};
pub use path_template::{
    normalize_path, path_segments, strip_query, PathParams, PathTemplate, Segment,
};
pub use value_pattern::ValuePattern;
