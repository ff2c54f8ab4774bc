//! Persistence for scores, assessments and run audits
//!
//! Core logic only sees the `ScoreStore` trait; the factory picks the
//! PostgreSQL backend when reachable and falls back to embedded SQLite.

pub mod postgres;
pub mod sqlite;

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{
    AggregateScore, FinancialAssessment, GlobalRiskLevel, InternalScores, RunAudit,
};

// Environment variable names
const ENV_POSTGRES_HOST: &str = "SUPPLIER_RISK_POSTGRES_HOST";
const ENV_POSTGRES_PORT: &str = "SUPPLIER_RISK_POSTGRES_PORT";
const ENV_POSTGRES_USER: &str = "SUPPLIER_RISK_POSTGRES_USER";
const ENV_POSTGRES_PASSWORD: &str = "SUPPLIER_RISK_POSTGRES_PASSWORD";
const ENV_POSTGRES_DB: &str = "SUPPLIER_RISK_POSTGRES_DB";
const ENV_SQLITE_PATH: &str = "SUPPLIER_RISK_SQLITE_PATH";

// Default values
const DEFAULT_POSTGRES_HOST: &str = "127.0.0.1";
const DEFAULT_POSTGRES_PORT: &str = "5432";
const DEFAULT_POSTGRES_USER: &str = "supplier_risk";
const DEFAULT_POSTGRES_PASSWORD: &str = "supplier_risk";
const DEFAULT_POSTGRES_DB: &str = "supplier_risk";
const DEFAULT_SQLITE_PATH: &str = "./supplier_risk.db";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Score persistence operations needed by the pipeline.
///
/// All writes are upserts keyed by (date, supplier) or run id so a rerun
/// for the same date overwrites its own rows.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn upsert_internal_scores(
        &self,
        as_of_date: NaiveDate,
        supplier_id: &str,
        scores: &InternalScores,
    ) -> Result<(), DbError>;

    async fn upsert_financial_assessment(
        &self,
        assessment: &FinancialAssessment,
    ) -> Result<(), DbError>;

    async fn upsert_aggregate(&self, score: &AggregateScore) -> Result<(), DbError>;

    async fn upsert_run_audit(&self, audit: &RunAudit) -> Result<(), DbError>;

    /// Most recent aggregate strictly before the given date.
    async fn latest_aggregate_before(
        &self,
        supplier_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AggregateScore>, DbError>;

    /// Aggregate recorded exactly `days` days before the given date, if any.
    async fn aggregate_days_before(
        &self,
        supplier_id: &str,
        date: NaiveDate,
        days: i64,
    ) -> Result<Option<AggregateScore>, DbError>;
}

/// Row shape shared by both backends for the aggregate_scores table.
#[derive(Debug, sqlx::FromRow)]
struct AggregateScoreRow {
    as_of_date: NaiveDate,
    supplier_id: String,
    c1: i32,
    c2: i32,
    c3: i32,
    financial_score: Option<i32>,
    global_score: i32,
    risk_level: String,
}

impl AggregateScoreRow {
    fn into_domain(self) -> Result<AggregateScore, DbError> {
        let risk_level = match self.risk_level.as_str() {
            "LOW" => GlobalRiskLevel::Low,
            "MEDIUM" => GlobalRiskLevel::Medium,
            "HIGH" => GlobalRiskLevel::High,
            other => {
                return Err(DbError::Serialization(format!(
                    "Unknown risk level in aggregate_scores: {}",
                    other
                )))
            }
        };
        Ok(AggregateScore {
            as_of_date: self.as_of_date,
            supplier_id: self.supplier_id,
            c1: self.c1,
            c2: self.c2,
            c3: self.c3,
            financial_score: self.financial_score,
            global_score: self.global_score,
            risk_level,
        })
    }
}

/// Connect to the configured backend.
///
/// PostgreSQL is tried first from its environment variables; when the
/// connection fails the embedded SQLite store takes over so a run can
/// proceed on a workstation without a database server.
pub async fn connect() -> Result<Arc<dyn ScoreStore>, DbError> {
    let host = env::var(ENV_POSTGRES_HOST).unwrap_or_else(|_| DEFAULT_POSTGRES_HOST.to_string());
    let port = env::var(ENV_POSTGRES_PORT).unwrap_or_else(|_| DEFAULT_POSTGRES_PORT.to_string());
    let user = env::var(ENV_POSTGRES_USER).unwrap_or_else(|_| DEFAULT_POSTGRES_USER.to_string());
    let password =
        env::var(ENV_POSTGRES_PASSWORD).unwrap_or_else(|_| DEFAULT_POSTGRES_PASSWORD.to_string());
    let database = env::var(ENV_POSTGRES_DB).unwrap_or_else(|_| DEFAULT_POSTGRES_DB.to_string());

    let database_url = format!(
        "postgres://{}:{}@{}:{}/{}",
        user, password, host, port, database
    );

    match postgres::PgScoreStore::connect(&database_url).await {
        Ok(store) => {
            tracing::info!(host = %host, port = %port, database = %database, "Using PostgreSQL score store");
            Ok(Arc::new(store))
        }
        Err(e) => {
            let path =
                env::var(ENV_SQLITE_PATH).unwrap_or_else(|_| DEFAULT_SQLITE_PATH.to_string());
            tracing::warn!(
                error = %e,
                path = %path,
                "PostgreSQL unavailable, falling back to embedded SQLite"
            );
            let store = sqlite::SqliteScoreStore::connect(&path).await?;
            Ok(Arc::new(store))
        }
    }
}
