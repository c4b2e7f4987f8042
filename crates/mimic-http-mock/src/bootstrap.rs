//! Server lifecycle: open storage, build the index, bind, serve, shut down.

use anyhow::Context;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::admin_api::AdminApiServer;
use crate::config::Config;
use crate::playback::PlaybackServer;
use crate::state::AppState;
use crate::storage::{FileScenarioStore, ScenarioStore};

/// Bound but not yet serving.
pub struct App {
    state: Arc<AppState>,
    playback: PlaybackServer,
    admin: Option<AdminApiServer>,
}

impl App {
    /// Build against the file store under `config.data_dir`.
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let store = FileScenarioStore::open(&config.data_dir).with_context(|| {
            format!("failed to open data dir {}", config.data_dir.display())
        })?;
        Self::with_store(config, Arc::new(store)).await
    }

    /// Build against any store.
    pub async fn with_store(config: &Config, store: Arc<dyn ScenarioStore>) -> anyhow::Result<Self> {
        let state = Arc::new(AppState::new(
            store,
            config.selection,
            config.recording.clone(),
        )?);

        let playback = PlaybackServer::bind(config.listen.socket_addr()?, state.clone())
            .await
            .context("failed to bind playback listener")?;
        let admin = if config.admin.enabled {
            Some(
                AdminApiServer::bind(config.admin.socket_addr()?, state.clone())
                    .await
                    .context("failed to bind admin listener")?,
            )
        } else {
            None
        };

        info!(
            scenarios = state.repository.index().len(),
            selection = state.lookup.policy_name(),
            recording = config.recording.enabled,
            data_dir = %config.data_dir.display(),
            "mimic initialised"
        );
        Ok(Self {
            state,
            playback,
            admin,
        })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn playback_addr(&self) -> anyhow::Result<SocketAddr> {
        self.playback.local_addr()
    }

    pub fn admin_addr(&self) -> anyhow::Result<Option<SocketAddr>> {
        self.admin.as_ref().map(AdminApiServer::local_addr).transpose()
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `shutdown` resolves or a listener fails.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let App { playback, admin, .. } = self;
        let admin = async move {
            match admin {
                Some(admin) => admin.run().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = playback.run() => result.context("playback listener stopped"),
            result = admin => result.context("admin listener stopped"),
            _ = shutdown => {
                info!("shutdown signal received");
                Ok(())
            }
        }
    }
}
