use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mimic_http_mock::bootstrap::App;
use mimic_http_mock::config::{Config, LogFormat};
use mimic_http_mock::logging;
use mimic_http_mock::scenario::SelectionStrategy;

#[derive(Parser, Debug)]
#[command(name = "mimic", version, about = "HTTP mock and record/replay service")]
struct Args {
    /// YAML config file; flags override its values
    #[arg(short, long, env = "MIMIC_CONFIG")]
    config: Option<PathBuf>,

    /// Playback listener port
    #[arg(short, long, env = "MIMIC_PORT")]
    port: Option<u16>,

    /// Admin API port
    #[arg(long, env = "MIMIC_ADMIN_PORT")]
    admin_port: Option<u16>,

    /// Bind address for both listeners
    #[arg(long, env = "MIMIC_HOST")]
    host: Option<String>,

    /// Scenario data directory
    #[arg(short, long, env = "MIMIC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Record unmatched requests from the upstream
    #[arg(long, env = "MIMIC_RECORD")]
    record: bool,

    /// Upstream base URL for record mode
    #[arg(long, env = "MIMIC_UPSTREAM")]
    upstream: Option<String>,

    /// Selection strategy: weighted_fair or least_recently_used
    #[arg(long, env = "MIMIC_SELECTION")]
    selection: Option<SelectionStrategy>,

    /// Log filter, e.g. info or mimic_http_mock=debug
    #[arg(long, env = "MIMIC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: pretty or json
    #[arg(long, env = "MIMIC_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(Config, Option<String>, Option<LogFormat>)> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(port) = self.admin_port {
            config.admin.port = port;
        }
        if let Some(host) = self.host {
            config.listen.host = host.clone();
            config.admin.host = host;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if self.record {
            config.recording.enabled = true;
        }
        if let Some(upstream) = self.upstream {
            config.recording.upstream = Some(upstream);
        }
        if let Some(selection) = self.selection {
            config.selection = selection;
        }
        config.validate().context("invalid configuration")?;

        Ok((config, self.log_level, self.log_format))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (config, log_level, log_format) = args.into_config()?;
    logging::init(&config.logging, log_level.as_deref(), log_format)?;

    let app = App::build(&config).await?;
    app.run().await
}
