//! PostgreSQL score store

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{AggregateScoreRow, DbError, ScoreStore};
use crate::model::{AggregateScore, FinancialAssessment, InternalScores, RunAudit};

pub struct PgScoreStore {
    pool: PgPool,
}

impl PgScoreStore {
    /// Connect and initialize the schema.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS internal_scores (
                as_of_date DATE NOT NULL,
                supplier_id VARCHAR(64) NOT NULL,
                c1 INTEGER NOT NULL,
                c2 INTEGER NOT NULL,
                c3 INTEGER NOT NULL,
                PRIMARY KEY (as_of_date, supplier_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS financial_assessments (
                as_of_date DATE NOT NULL,
                supplier_id VARCHAR(64) NOT NULL,
                financial_risk_score INTEGER NOT NULL,
                financial_risk_level VARCHAR(16) NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (as_of_date, supplier_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS aggregate_scores (
                as_of_date DATE NOT NULL,
                supplier_id VARCHAR(64) NOT NULL,
                c1 INTEGER NOT NULL,
                c2 INTEGER NOT NULL,
                c3 INTEGER NOT NULL,
                financial_score INTEGER,
                global_score INTEGER NOT NULL,
                risk_level VARCHAR(16) NOT NULL,
                PRIMARY KEY (as_of_date, supplier_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_audits (
                run_id VARCHAR(64) PRIMARY KEY,
                started_at TIMESTAMPTZ NOT NULL,
                finished_at TIMESTAMPTZ,
                status VARCHAR(16) NOT NULL,
                errors TEXT NOT NULL,
                counts TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_aggregate_scores_supplier_date ON aggregate_scores(supplier_id, as_of_date)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database schema initialized");
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for PgScoreStore {
    async fn upsert_internal_scores(
        &self,
        as_of_date: NaiveDate,
        supplier_id: &str,
        scores: &InternalScores,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO internal_scores (as_of_date, supplier_id, c1, c2, c3)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (as_of_date, supplier_id) DO UPDATE SET
                c1 = EXCLUDED.c1,
                c2 = EXCLUDED.c2,
                c3 = EXCLUDED.c3
            "#,
        )
        .bind(as_of_date)
        .bind(supplier_id)
        .bind(scores.c1)
        .bind(scores.c2)
        .bind(scores.c3)
        .execute(&self.pool)
        .await?;

        tracing::debug!(supplier_id = %supplier_id, "Upserted internal scores");
        Ok(())
    }

    async fn upsert_financial_assessment(
        &self,
        assessment: &FinancialAssessment,
    ) -> Result<(), DbError> {
        let payload = serde_json::to_string(assessment)
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO financial_assessments (
                as_of_date, supplier_id, financial_risk_score,
                financial_risk_level, confidence, payload
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (as_of_date, supplier_id) DO UPDATE SET
                financial_risk_score = EXCLUDED.financial_risk_score,
                financial_risk_level = EXCLUDED.financial_risk_level,
                confidence = EXCLUDED.confidence,
                payload = EXCLUDED.payload
            "#,
        )
        .bind(assessment.as_of_date)
        .bind(&assessment.supplier_id)
        .bind(assessment.financial_risk_score)
        .bind(assessment.financial_risk_level.to_string())
        .bind(assessment.confidence)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        tracing::debug!(supplier_id = %assessment.supplier_id, "Upserted financial assessment");
        Ok(())
    }

    async fn upsert_aggregate(&self, score: &AggregateScore) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO aggregate_scores (
                as_of_date, supplier_id, c1, c2, c3,
                financial_score, global_score, risk_level
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (as_of_date, supplier_id) DO UPDATE SET
                c1 = EXCLUDED.c1,
                c2 = EXCLUDED.c2,
                c3 = EXCLUDED.c3,
                financial_score = EXCLUDED.financial_score,
                global_score = EXCLUDED.global_score,
                risk_level = EXCLUDED.risk_level
            "#,
        )
        .bind(score.as_of_date)
        .bind(&score.supplier_id)
        .bind(score.c1)
        .bind(score.c2)
        .bind(score.c3)
        .bind(score.financial_score)
        .bind(score.global_score)
        .bind(score.risk_level.to_string())
        .execute(&self.pool)
        .await?;

        tracing::debug!(supplier_id = %score.supplier_id, "Upserted aggregate score");
        Ok(())
    }

    async fn upsert_run_audit(&self, audit: &RunAudit) -> Result<(), DbError> {
        let errors = serde_json::to_string(&audit.errors)
            .map_err(|e| DbError::Serialization(e.to_string()))?;
        let counts = serde_json::to_string(&audit.counts)
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO run_audits (run_id, started_at, finished_at, status, errors, counts)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (run_id) DO UPDATE SET
                finished_at = EXCLUDED.finished_at,
                status = EXCLUDED.status,
                errors = EXCLUDED.errors,
                counts = EXCLUDED.counts
            "#,
        )
        .bind(&audit.run_id)
        .bind(audit.started_at)
        .bind(audit.finished_at)
        .bind(audit.status.to_string())
        .bind(&errors)
        .bind(&counts)
        .execute(&self.pool)
        .await?;

        tracing::debug!(run_id = %audit.run_id, status = %audit.status, "Upserted run audit");
        Ok(())
    }

    async fn latest_aggregate_before(
        &self,
        supplier_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AggregateScore>, DbError> {
        let row: Option<AggregateScoreRow> = sqlx::query_as(
            r#"
            SELECT * FROM aggregate_scores
            WHERE supplier_id = $1 AND as_of_date < $2
            ORDER BY as_of_date DESC
            LIMIT 1
            "#,
        )
        .bind(supplier_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AggregateScoreRow::into_domain).transpose()
    }

    async fn aggregate_days_before(
        &self,
        supplier_id: &str,
        date: NaiveDate,
        days: i64,
    ) -> Result<Option<AggregateScore>, DbError> {
        let target = date - Duration::days(days);
        let row: Option<AggregateScoreRow> = sqlx::query_as(
            r#"
            SELECT * FROM aggregate_scores
            WHERE supplier_id = $1 AND as_of_date = $2
            "#,
        )
        .bind(supplier_id)
        .bind(target)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AggregateScoreRow::into_domain).transpose()
    }
}
