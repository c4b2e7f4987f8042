//! Configuration types for the Mimic server.

mod listen;
mod recording;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::scenario::SelectionStrategy;

pub use listen::{AdminConfig, ListenConfig};
pub use recording::RecordingConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `RUST_LOG`-style filter, e.g. `info` or `mimic_http_mock=debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    /// Root of the file-backed scenario store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Policy used when several scenarios answer the same request.
    #[serde(default)]
    pub selection: SelectionStrategy,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("mimic_data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            admin: AdminConfig::default(),
            data_dir: default_data_dir(),
            selection: SelectionStrategy::default(),
            recording: RecordingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, anyhow::Error> {
        // An empty document means "all defaults"
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.listen.socket_addr()?;
        if self.admin.enabled {
            self.admin.socket_addr()?;
            if self.listen.port != 0
                && self.listen.port == self.admin.port
                && self.listen.host == self.admin.host
            {
                anyhow::bail!(
                    "playback port {} cannot be the same as admin port {}",
                    self.listen.port,
                    self.admin.port
                );
            }
        }

        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir must not be empty");
        }

        if let Some(upstream) = &self.recording.upstream {
            validate_upstream_url(upstream)?;
        }
        if self.recording.timeout.is_zero() {
            anyhow::bail!("recording.timeout must be greater than zero");
        }

        Ok(())
    }
}

/// Upstream base URLs must be absolute http(s) URLs.
pub fn validate_upstream_url(url: &str) -> Result<(), anyhow::Error> {
    let parsed: hyper::Uri = url
        .parse()
        .with_context(|| format!("invalid upstream URL '{url}'"))?;
    match parsed.scheme_str() {
        Some("http") | Some("https") => {}
        _ => anyhow::bail!("upstream URL '{url}' must use http or https"),
    }
    if parsed.host().is_none() {
        anyhow::bail!("upstream URL '{url}' has no host");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
listen:
  port: 8081
admin:
  port: 9091
data_dir: /var/lib/mimic
selection: least_recently_used
recording:
  enabled: true
  upstream: http://localhost:3000
  capture_latency: true
  timeout: 5s
logging:
  level: debug
  format: json
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.listen.port, 8081);
        assert_eq!(config.admin.port, 9091);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/mimic"));
        assert_eq!(config.selection, SelectionStrategy::LeastRecentlyUsed);
        assert!(config.recording.enabled);
        assert_eq!(
            config.recording.upstream.as_deref(),
            Some("http://localhost:3000")
        );
        assert_eq!(config.recording.timeout, Duration::from_secs(5));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.admin.port, 9090);
        assert!(config.admin.enabled);
        assert_eq!(config.data_dir, PathBuf::from("mimic_data"));
        assert_eq!(config.selection, SelectionStrategy::WeightedFair);
        assert!(!config.recording.enabled);
        assert_eq!(config.recording.timeout, Duration::from_secs(30));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = Config::from_yaml_str("listen:\n  port: 7000\n").unwrap();
        assert_eq!(config.listen.port, 7000);
        assert_eq!(config.listen.host, "0.0.0.0");
        assert_eq!(config.admin.port, 9090);
    }

    #[test]
    fn test_same_ports_rejected() {
        let yaml = "listen:\n  port: 9000\nadmin:\n  port: 9000\n";
        assert!(Config::from_yaml_str(yaml).is_err());

        // Fine once the admin API is off
        let yaml = "listen:\n  port: 9000\nadmin:\n  enabled: false\n  port: 9000\n";
        assert!(Config::from_yaml_str(yaml).is_ok());
    }

    #[test]
    fn test_invalid_upstream_rejected() {
        assert!(Config::from_yaml_str("recording:\n  upstream: localhost:3000\n").is_err());
        assert!(Config::from_yaml_str("recording:\n  upstream: ftp://host\n").is_err());
        assert!(validate_upstream_url("https://api.example.com/base").is_ok());
    }

    #[test]
    fn test_invalid_host_rejected() {
        assert!(Config::from_yaml_str("listen:\n  host: not an ip\n").is_err());
    }

    #[test]
    fn test_unknown_selection_rejected() {
        assert!(Config::from_yaml_str("selection: random\n").is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mimic.yaml");
        std::fs::write(&path, "listen:\n  port: 8181\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().listen.port, 8181);
        assert!(Config::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
