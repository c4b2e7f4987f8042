// Library exports for the server binary, the lint tool, benchmarks and tests

// ===== Scenario engine =====
pub mod predicate;
pub mod scenario;
pub mod storage;
pub mod template;

// ===== Server surfaces =====
pub mod admin_api;
pub mod bootstrap;
pub mod playback;
pub mod recording;
pub mod state;

// ===== Ambient =====
pub mod config;
pub mod logging;
pub mod metrics;
