//! Shared state handed to the playback and admin servers.

use std::sync::Arc;
use std::time::Instant;

use crate::config::RecordingConfig;
use crate::recording::{RecordError, Recorder};
use crate::scenario::{LookupService, ScenarioError, ScenarioRepository, SelectionStrategy};
use crate::storage::ScenarioStore;
use crate::template::PlaceholderRenderer;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to load scenarios: {0}")]
    Scenarios(#[from] ScenarioError),
    #[error(transparent)]
    Recorder(#[from] RecordError),
}

pub struct AppState {
    pub repository: Arc<ScenarioRepository>,
    pub lookup: Arc<LookupService>,
    pub recorder: Recorder,
    pub started_at: Instant,
}

impl AppState {
    /// Index `store` and wire the lookup service over it.
    pub fn new(
        store: Arc<dyn ScenarioStore>,
        selection: SelectionStrategy,
        recording: RecordingConfig,
    ) -> Result<Self, StateError> {
        let repository = Arc::new(ScenarioRepository::open(store.clone())?);
        let lookup = Arc::new(LookupService::new(
            repository.index().clone(),
            store,
            Arc::new(PlaceholderRenderer::new()),
            selection.policy(),
        ));
        Ok(Self {
            repository,
            lookup,
            recorder: Recorder::new(recording)?,
            started_at: Instant::now(),
        })
    }
}
