use std::process::ExitCode;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod alert;
mod app;
mod db;
mod export;
mod gateway;
mod llm;
mod model;
mod normalize;
mod pipeline;
mod scoring;

use model::{load_suppliers, RunStatus};

const ENV_SUPPLIERS_PATH: &str = "SUPPLIER_RISK_SUPPLIERS_PATH";
const DEFAULT_SUPPLIERS_PATH: &str = "suppliers.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore if missing)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = match app::AppState::new().await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Initialization failed");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        output_dir = %state.config.pipeline.output_dir,
        alert_mode = %state.config.pipeline.alert_mode,
        allowed_domains = state.config.allowlist.domains.len(),
        "Initialized"
    );

    let suppliers_path =
        std::env::var(ENV_SUPPLIERS_PATH).unwrap_or_else(|_| DEFAULT_SUPPLIERS_PATH.to_string());
    let suppliers = match load_suppliers(&suppliers_path) {
        Ok(suppliers) => suppliers,
        Err(e) => {
            tracing::error!(error = %e, path = %suppliers_path, "Failed to load supplier roster");
            return ExitCode::FAILURE;
        }
    };

    let run_id = uuid::Uuid::new_v4().to_string();
    let as_of_date = Utc::now().date_naive();

    let summary = match state.pipeline.run_daily(&run_id, &suppliers, as_of_date).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "Run aborted");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = state.exporter.export(&summary, as_of_date) {
        tracing::error!(run_id = %run_id, error = %e, "Export failed");
    }

    match summary.status {
        RunStatus::Failed => {
            tracing::error!(run_id = %run_id, "Run failed: no supplier was scored");
            ExitCode::FAILURE
        }
        status => {
            tracing::info!(
                run_id = %run_id,
                status = %status,
                scored = summary.counts.suppliers_scored,
                alerts = summary.counts.alerts_sent,
                "Run complete"
            );
            ExitCode::SUCCESS
        }
    }
}
