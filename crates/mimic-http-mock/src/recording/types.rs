//! Types for record mode: the forwarded request, the captured response and
//! the errors forwarding can produce.

use bytes::Bytes;
use std::time::Duration;

use crate::scenario::{MethodType, ScenarioKey};

/// Inbound request as forwarded to the upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: MethodType,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Upstream response captured for replay.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Time from sending the request to receiving the full body.
    pub latency: Duration,
}

/// Result of one record-mode round trip.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub response: RecordedResponse,
    /// Key of the saved scenario, `None` if the exchange could not be stored.
    pub saved: Option<ScenarioKey>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record mode has no upstream; configure recording.upstream or send X-Mock-Url")]
    NoUpstream,

    #[error("invalid upstream URL '{url}': {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
}
