//! Upstream forwarding and scenario capture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::scenario_generator::{generate_scenario, GeneratorOptions};
use super::types::{RecordError, RecordOutcome, RecordedResponse, UpstreamRequest};
use crate::config::{validate_upstream_url, RecordingConfig};
use crate::metrics;
use crate::scenario::{MethodType, ScenarioRepository};

/// Request headers never forwarded upstream.
const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "transfer-encoding",
];

/// Prefix of the playback control headers, which stay local.
const CONTROL_HEADER_PREFIX: &str = "x-mock-";

/// Forwards unmatched requests to the real service and stores the exchange
/// as a new scenario.
pub struct Recorder {
    config: RecordingConfig,
    client: reqwest::Client,
    sequence: AtomicU64,
}

impl Recorder {
    pub fn new(config: RecordingConfig) -> Result<Self, RecordError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RecordError::Client)?;
        Ok(Self {
            config,
            client,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Whether a request should be recorded, given its `X-Mock-Record` opt-in.
    pub fn is_active(&self, requested: bool) -> bool {
        self.config.enabled || requested
    }

    /// Upstream for one request: the `X-Mock-Url` header, else the configured one.
    pub fn upstream_for<'a>(&'a self, header_url: Option<&'a str>) -> Option<&'a str> {
        header_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .or(self.config.upstream.as_deref())
    }

    /// Forward `request` to `upstream` and save the exchange.
    ///
    /// A failed save does not fail the round trip; the caller still gets the
    /// upstream response and `saved` is `None`.
    pub async fn record(
        &self,
        repository: &ScenarioRepository,
        upstream: &str,
        request: UpstreamRequest,
        group: Option<String>,
    ) -> Result<RecordOutcome, RecordError> {
        let response = match self.forward(upstream, &request).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_recording("upstream_error");
                return Err(e);
            }
        };

        let options = GeneratorOptions {
            name: self.next_name(response.status),
            group: group.or_else(|| self.config.group.clone()),
            capture_latency: self.config.capture_latency,
            source_url: Some(target_url(upstream, &request.path, None)),
        };
        let scenario = generate_scenario(&request, &response, options);

        let saved = match repository.save(scenario) {
            Ok(saved) => {
                metrics::record_recording("recorded");
                info!(
                    scenario = %saved.key(),
                    status = response.status,
                    latency_ms = response.latency.as_millis() as u64,
                    "recorded upstream response"
                );
                Some(saved.key())
            }
            Err(e) => {
                metrics::record_recording("save_error");
                warn!(error = %e, path = %request.path, "failed to save recorded scenario");
                None
            }
        };

        Ok(RecordOutcome { response, saved })
    }

    async fn forward(
        &self,
        upstream: &str,
        request: &UpstreamRequest,
    ) -> Result<RecordedResponse, RecordError> {
        validate_upstream_url(upstream).map_err(|e| RecordError::InvalidUpstream {
            url: upstream.to_string(),
            reason: e.to_string(),
        })?;
        let url = target_url(upstream, &request.path, request.query.as_deref());
        debug!(method = %request.method, url = %url, "forwarding to upstream");

        let mut builder = self.client.request(reqwest_method(request.method), &url);
        for (name, value) in &request.headers {
            let lower = name.to_ascii_lowercase();
            if SKIPPED_REQUEST_HEADERS.contains(&lower.as_str())
                || lower.starts_with(CONTROL_HEADER_PREFIX)
            {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let start = Instant::now();
        let upstream_error = |source| RecordError::Upstream {
            url: url.clone(),
            source,
        };
        let response = builder.send().await.map_err(upstream_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await.map_err(upstream_error)?;

        Ok(RecordedResponse {
            status,
            headers,
            body,
            latency: start.elapsed(),
        })
    }

    /// `recorded-<status>-<unix millis>-<sequence>`, unique per process.
    fn next_name(&self, status: u16) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!(
            "recorded-{}-{}-{}",
            status,
            chrono::Utc::now().timestamp_millis(),
            sequence
        )
    }
}

fn target_url(upstream: &str, path: &str, query: Option<&str>) -> String {
    format!(
        "{}{}{}",
        upstream.trim_end_matches('/'),
        path,
        query
            .filter(|q| !q.is_empty())
            .map(|q| format!("?{q}"))
            .unwrap_or_default()
    )
}

fn reqwest_method(method: MethodType) -> reqwest::Method {
    match method {
        MethodType::Get => reqwest::Method::GET,
        MethodType::Post => reqwest::Method::POST,
        MethodType::Put => reqwest::Method::PUT,
        MethodType::Delete => reqwest::Method::DELETE,
        MethodType::Patch => reqwest::Method::PATCH,
        MethodType::Head => reqwest::Method::HEAD,
        MethodType::Options => reqwest::Method::OPTIONS,
        MethodType::Connect => reqwest::Method::CONNECT,
        MethodType::Trace => reqwest::Method::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(config: RecordingConfig) -> Recorder {
        Recorder::new(config).unwrap()
    }

    #[test]
    fn test_upstream_header_takes_precedence() {
        let r = recorder(RecordingConfig {
            upstream: Some("http://configured:3000".to_string()),
            ..Default::default()
        });
        assert_eq!(r.upstream_for(Some("http://header:4000")), Some("http://header:4000"));
        assert_eq!(r.upstream_for(Some("  ")), Some("http://configured:3000"));
        assert_eq!(r.upstream_for(None), Some("http://configured:3000"));

        let bare = recorder(RecordingConfig::default());
        assert_eq!(bare.upstream_for(None), None);
    }

    #[test]
    fn test_activation() {
        let off = recorder(RecordingConfig::default());
        assert!(!off.is_active(false));
        assert!(off.is_active(true));

        let on = recorder(RecordingConfig {
            enabled: true,
            ..Default::default()
        });
        assert!(on.is_active(false));
    }

    #[test]
    fn test_names_are_unique() {
        let r = recorder(RecordingConfig::default());
        let a = r.next_name(200);
        let b = r.next_name(200);
        assert_ne!(a, b);
        assert!(a.starts_with("recorded-200-"));
        assert!(crate::scenario::validate_fixture_name(&a).is_ok());
    }

    #[test]
    fn test_target_url() {
        assert_eq!(
            target_url("http://up:3000/", "/a/b", Some("x=1")),
            "http://up:3000/a/b?x=1"
        );
        assert_eq!(target_url("http://up:3000", "/a", Some("")), "http://up:3000/a");
        assert_eq!(target_url("http://up:3000/base", "/a", None), "http://up:3000/base/a");
    }

    #[tokio::test]
    async fn test_invalid_upstream_is_rejected_before_sending() {
        let r = recorder(RecordingConfig::default());
        let request = UpstreamRequest {
            method: MethodType::Get,
            path: "/x".to_string(),
            query: None,
            headers: vec![],
            body: bytes::Bytes::new(),
        };
        let err = r.forward("not-a-url", &request).await.unwrap_err();
        assert!(matches!(err, RecordError::InvalidUpstream { .. }));
    }
}
