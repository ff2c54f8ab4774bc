//! Application state and service initialization
//!
//! Centralizes configuration loading and the service dependency graph so
//! the entry point only wires a run together.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::alert::{AlertSink, FileAlertSink, LogAlertSink};
use crate::db::ScoreStore;
use crate::export::Exporter;
use crate::gateway::cache::ContentCache;
use crate::gateway::EvidenceGateway;
use crate::llm::OpenAiScoringModel;
use crate::model::{Config, ConfigError};
use crate::pipeline::Pipeline;
use crate::scoring::financial::FinancialScorer;

const SECONDS_PER_HOUR: u64 = 3600;

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database initialization failed: {0}")]
    DatabaseInit(String),

    #[error("Filesystem initialization failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state: the pipeline and the run exporter.
pub struct AppState {
    pub config: Config,
    pub pipeline: Pipeline,
    pub exporter: Exporter,
}

impl AppState {
    /// Initialize all services and build application state
    ///
    /// This performs:
    /// 1. Configuration loading and validation (fatal on invalid values)
    /// 2. Score store connection (PostgreSQL, SQLite fallback)
    /// 3. Evidence gateway with its file cache
    /// 4. Scoring model initialization (skipped without OPENAI_API_KEY)
    /// 5. Alert sink selection
    pub async fn new() -> Result<Self, AppError> {
        let config = Config::from_env()?;

        let store: Arc<dyn ScoreStore> = crate::db::connect()
            .await
            .map_err(|e| AppError::DatabaseInit(e.to_string()))?;

        let cache = ContentCache::new(
            &config.pipeline.cache_dir,
            Duration::from_secs(config.pipeline.cache_ttl_hours * SECONDS_PER_HOUR),
        )?;
        let gateway = Arc::new(EvidenceGateway::new(config.allowlist.clone(), cache));

        // Without an API key every supplier scores INDETERMINATE; the run
        // still produces internal and aggregate scores.
        let model = match std::env::var("OPENAI_API_KEY") {
            Ok(api_key) => match OpenAiScoringModel::new(&api_key) {
                Ok(model) => Some(Arc::new(model) as Arc<dyn crate::llm::ScoringModel>),
                Err(e) => {
                    tracing::warn!(error = %e, "Scoring model unavailable");
                    None
                }
            },
            Err(_) => {
                tracing::warn!("OPENAI_API_KEY not set, financial scoring disabled");
                None
            }
        };
        let scorer = Arc::new(FinancialScorer::new(model, config.pipeline.max_llm_retries));

        // File alerts live in their own subdirectory so they never mix
        // with the per-date exports.
        let sink: Arc<dyn AlertSink> = match config.pipeline.alert_mode.as_str() {
            "file" => {
                let alert_dir = Path::new(&config.pipeline.output_dir).join("alerts");
                Arc::new(FileAlertSink::new(alert_dir)?)
            }
            _ => Arc::new(LogAlertSink),
        };

        let exporter = Exporter::new(&config.pipeline.output_dir)?;
        let pipeline = Pipeline::new(config.clone(), store, gateway, scorer, sink);

        Ok(Self {
            config,
            pipeline,
            exporter,
        })
    }
}
