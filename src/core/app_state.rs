use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config;
use crate::core::types::HarvestRequest;
use crate::harvest::runner::{HarvestConfig, RunReport};

/// Shared service state: env-derived defaults plus the registry of completed
/// run snapshots (keyed by run id) that backs the download endpoint.
///
/// Each harvest invocation owns its RunState exclusively; only the finished
/// snapshot is registered here, so concurrent runs never share an
/// accumulator.
#[derive(Clone)]
pub struct AppState {
    pub results_dir: PathBuf,
    pub defaults: HarvestConfig,
    pub runs: Arc<tokio::sync::RwLock<HashMap<String, RunReport>>>,
    // Each run holds a dedicated browser process; cap how many run at once.
    pub run_limit: Arc<tokio::sync::Semaphore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("results_dir", &self.results_dir)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            results_dir: config::results_dir(),
            defaults: HarvestConfig::default(),
            runs: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            run_limit: Arc::new(tokio::sync::Semaphore::new(config::run_limit())),
        }
    }

    /// Per-run config: env defaults overridden by the request's fields.
    pub fn config_for(&self, request: &HarvestRequest) -> HarvestConfig {
        let mut config = self.defaults.clone();
        if let Some(secs) = request.timeout_secs {
            config.timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = request.max_duration_secs {
            config.max_run_duration = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = request.inactivity_secs {
            config.inactivity_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(headless) = request.headless {
            config.headless = headless;
        }
        if let Some(steps) = request.scroll_steps {
            config.scroll_steps = steps;
        }
        config
    }

    /// Register a finished run's snapshot for later download.
    pub async fn register(&self, report: RunReport) {
        self.runs
            .write()
            .await
            .insert(report.run_id.clone(), report);
    }

    pub async fn get_run(&self, run_id: &str) -> Option<RunReport> {
        self.runs.read().await.get(run_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> HarvestRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn request_overrides_only_what_it_sets() {
        let state = AppState::new();
        let config = state.config_for(&request(
            r#"{"post_url": "https://example.com/p", "max_duration_secs": 30, "headless": false}"#,
        ));
        assert_eq!(config.max_run_duration, std::time::Duration::from_secs(30));
        assert!(!config.headless);
        assert_eq!(config.inactivity_timeout, state.defaults.inactivity_timeout);
        assert_eq!(config.timeout, state.defaults.timeout);
    }

    #[test]
    fn register_and_fetch_round_trip() {
        let state = AppState::new();
        let report: RunReport = serde_json::from_str(
            r#"{"run_id": "r1", "identifiers_found": 0, "elapsed_seconds": 0.0,
                "result_location": "results/r1.txt",
                "finished_at": "2026-01-01T00:00:00+00:00", "records": []}"#,
        )
        .unwrap();
        tokio_test::block_on(async {
            state.register(report).await;
            assert!(state.get_run("r1").await.is_some());
            assert!(state.get_run("missing").await.is_none());
        });
    }
}
