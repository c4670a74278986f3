//! Application state wiring: one set of capability clients and one job
//! service, constructed at process start and shared across requests.

use std::sync::Arc;

use snapact::pipeline::JobPipeline;
use snapact::providers;
use snapact::service::JobService;
use snapact::{Config, Database, QuotaGuard, SnapactError};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
}

impl AppState {
    /// Builds the full component graph from configuration and runs the
    /// startup orphan sweep before any traffic is accepted.
    pub fn from_config(config: &Config) -> Result<Self, SnapactError> {
        let db = Database::open(&config.database.path)?;

        let (extractor, classifier) = providers::build_http_providers(&config.providers);
        let pipeline = Arc::new(JobPipeline::new(
            db.clone(),
            extractor,
            classifier,
            config.preprocess.clone(),
            config.thumbnail.clone(),
        ));
        let quota = QuotaGuard::new(db.clone(), &config.quota);
        let service = JobService::new(db, pipeline, quota, config.maintenance_mode);

        service.recover_orphans()?;

        Ok(Self {
            service: Arc::new(service),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapact::load_config;

    #[test]
    fn test_state_builds_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state-test.db");
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            format!(
                r#"{{"version": "1.0", "database": {{"path": "{}"}}}}"#,
                db_path.display()
            ),
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        let state = AppState::from_config(&config).unwrap();

        // The service is live: an unknown job reads as not found.
        assert!(state.service.get("nope", "owner").is_err());
    }
}
