//! Record mode configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record mode: unmatched requests are forwarded upstream and saved as
/// new scenarios.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    /// Record every unmatched request. When false a request can still opt in
    /// with the `X-Mock-Record` header.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the real service, e.g. `http://localhost:3000`.
    /// A request's `X-Mock-Url` header takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,

    /// Store the observed upstream latency as the scenario's reply delay.
    #[serde(default)]
    pub capture_latency: bool,

    /// Upstream request timeout.
    #[serde(default = "default_timeout", with = "duration_text")]
    pub timeout: Duration,

    /// Group assigned to recorded scenarios when the request names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            upstream: None,
            capture_latency: false,
            timeout: default_timeout(),
            group: None,
        }
    }
}

/// `30s` / `1m 30s` style durations.
mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
