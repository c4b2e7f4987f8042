//! Admin REST API for scenario management.
//!
//! This module provides endpoints for:
//! - Creating, replacing, reading and deleting scenarios
//! - Listing scenarios and groups
//! - Uploading body fixtures
//! - Running a lookup without going through the playback listener
//! - Health, metrics and index reload
//!
//! The API listens on a configurable port (default: 9090).

mod handlers;
mod router;
mod server;
pub(crate) mod types;

pub use server::AdminApiServer;
pub use types::{LookupRequest, LookupResponse};
