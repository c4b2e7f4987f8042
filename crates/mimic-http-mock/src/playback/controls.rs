//! `X-Mock-*` request and response headers.

use hyper::HeaderMap;
use std::time::Duration;
use tracing::warn;

/// Overrides the scenario's reply delay, e.g. `250ms` or `2s`. A bare number is milliseconds.
pub const WAIT_BEFORE_REPLY_HEADER: &str = "x-mock-wait-before-reply";
/// Overrides the scenario's response status.
pub const RESPONSE_STATUS_HEADER: &str = "x-mock-response-status";
/// Restricts candidates to one group.
pub const GROUP_HEADER: &str = "x-mock-group";
/// Opts a single request into record mode.
pub const RECORD_HEADER: &str = "x-mock-record";
/// Upstream base URL for record mode.
pub const URL_HEADER: &str = "x-mock-url";

/// Name of the scenario that answered.
pub const SCENARIO_HEADER: &str = "X-Mock-Scenario";
/// Path pattern of the scenario that answered.
pub const PATH_HEADER: &str = "X-Mock-Path";
/// Aggregate request count after this request.
pub const REQUEST_COUNT_HEADER: &str = "X-Mock-Request-Count";
/// Set on responses that came from the upstream in record mode.
pub const RECORDED_HEADER: &str = "X-Mock-Recorded";

/// Per-request playback controls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackControls {
    pub wait_before_reply: Option<Duration>,
    pub response_status: Option<u16>,
    pub group: Option<String>,
    pub record: bool,
    pub upstream_url: Option<String>,
}

impl PlaybackControls {
    /// Read the controls; malformed values are logged and ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let wait_before_reply = text(WAIT_BEFORE_REPLY_HEADER).and_then(|raw| {
            let parsed = parse_delay(raw);
            if parsed.is_none() {
                warn!(value = raw, "ignoring malformed {}", WAIT_BEFORE_REPLY_HEADER);
            }
            parsed
        });

        let response_status = text(RESPONSE_STATUS_HEADER).and_then(|raw| {
            let parsed = raw
                .parse::<u16>()
                .ok()
                .filter(|s| (100..=999).contains(s));
            if parsed.is_none() {
                warn!(value = raw, "ignoring malformed {}", RESPONSE_STATUS_HEADER);
            }
            parsed
        });

        Self {
            wait_before_reply,
            response_status,
            group: text(GROUP_HEADER).map(str::to_string),
            record: text(RECORD_HEADER)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            upstream_url: text(URL_HEADER).map(str::to_string),
        }
    }
}

fn parse_delay(raw: &str) -> Option<Duration> {
    if let Ok(millis) = raw.parse::<u64>() {
        return Some(Duration::from_millis(millis));
    }
    humantime::parse_duration(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_no_controls() {
        assert_eq!(
            PlaybackControls::from_headers(&HeaderMap::new()),
            PlaybackControls::default()
        );
    }

    #[test]
    fn test_all_controls() {
        let controls = PlaybackControls::from_headers(&headers(&[
            ("x-mock-wait-before-reply", "250ms"),
            ("x-mock-response-status", "503"),
            ("x-mock-group", "beta"),
            ("x-mock-record", "TRUE"),
            ("x-mock-url", "http://localhost:3000"),
        ]));
        assert_eq!(controls.wait_before_reply, Some(Duration::from_millis(250)));
        assert_eq!(controls.response_status, Some(503));
        assert_eq!(controls.group.as_deref(), Some("beta"));
        assert!(controls.record);
        assert_eq!(controls.upstream_url.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn test_bare_number_is_milliseconds() {
        let controls =
            PlaybackControls::from_headers(&headers(&[("x-mock-wait-before-reply", "40")]));
        assert_eq!(controls.wait_before_reply, Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_malformed_values_ignored() {
        let controls = PlaybackControls::from_headers(&headers(&[
            ("x-mock-wait-before-reply", "soon"),
            ("x-mock-response-status", "42"),
            ("x-mock-group", "  "),
            ("x-mock-record", "yes"),
        ]));
        assert_eq!(controls, PlaybackControls::default());
    }
}
