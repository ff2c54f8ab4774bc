//! Daily scoring run orchestration
//!
//! Each supplier is processed independently: a failure or timeout is
//! recorded against that supplier and the run carries on. The run audit
//! is upserted at start (RUNNING) and again with the final status.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};

use crate::alert::{evaluate_alert, AlertSink};
use crate::db::ScoreStore;
use crate::gateway::golden::GoldenEvidence;
use crate::gateway::EvidenceGateway;
use crate::model::{
    AggregateScore, AlertPayload, Config, EvidenceDocument, FinancialAssessment, RiskLevel,
    RunAudit, RunCounts, RunStatus, Supplier, SupplierError,
};
use crate::normalize::normalize_documents;
use crate::scoring::aggregate::{aggregate_global_score, classify_risk};
use crate::scoring::financial::FinancialScorer;
use crate::scoring::internal::compute_internal_scores;

/// Everything produced for one successfully scored supplier.
#[derive(Debug, Clone)]
pub struct SupplierResult {
    pub supplier_id: String,
    pub aggregate: AggregateScore,
    pub assessment: FinancialAssessment,
    pub alert: Option<AlertPayload>,
    pub alert_sent: bool,
}

/// Final report for one run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub errors: Vec<SupplierError>,
    pub results: Vec<SupplierResult>,
}

pub struct Pipeline {
    config: Config,
    store: Arc<dyn ScoreStore>,
    gateway: Arc<EvidenceGateway>,
    golden: GoldenEvidence,
    scorer: Arc<FinancialScorer>,
    sink: Arc<dyn AlertSink>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        store: Arc<dyn ScoreStore>,
        gateway: Arc<EvidenceGateway>,
        scorer: Arc<FinancialScorer>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let golden = GoldenEvidence::new(&config.pipeline.golden_dir);
        Self {
            config,
            store,
            gateway,
            golden,
            scorer,
            sink,
        }
    }

    /// Score every supplier for the given date and deliver any alerts.
    ///
    /// Returns an error only when the run audit itself cannot be written;
    /// per-supplier failures are collected into the summary.
    pub async fn run_daily(
        &self,
        run_id: &str,
        suppliers: &[Supplier],
        as_of_date: NaiveDate,
    ) -> Result<RunSummary, crate::db::DbError> {
        let audit = RunAudit::start(run_id.to_string());
        self.store.upsert_run_audit(&audit).await?;

        tracing::info!(
            run_id = %run_id,
            as_of_date = %as_of_date,
            suppliers = suppliers.len(),
            concurrency = self.config.pipeline.concurrency,
            "Starting scoring run"
        );

        let outcomes: Vec<Result<SupplierResult, SupplierError>> =
            stream::iter(suppliers.iter().cloned())
                .map(|supplier| self.process_guarded(supplier, as_of_date))
                .buffer_unordered(self.config.pipeline.concurrency)
                .collect()
                .await;

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(error) => {
                    tracing::error!(
                        supplier_id = %error.supplier_id,
                        stage = %error.stage,
                        error = %error.error,
                        "Supplier failed"
                    );
                    errors.push(error);
                }
            }
        }

        let counts = RunCounts {
            suppliers_total: suppliers.len(),
            suppliers_scored: results.len(),
            suppliers_failed: errors.len(),
            alerts_sent: results.iter().filter(|r| r.alert_sent).count(),
        };
        let status = classify_run(&counts);

        let finished = audit.finalize(status, errors.clone(), counts.clone());
        self.store.upsert_run_audit(&finished).await?;

        tracing::info!(
            run_id = %run_id,
            status = %status,
            scored = counts.suppliers_scored,
            failed = counts.suppliers_failed,
            alerts = counts.alerts_sent,
            "Scoring run finished"
        );

        Ok(RunSummary {
            run_id: run_id.to_string(),
            status,
            counts,
            errors,
            results,
        })
    }

    /// One supplier under the wall-clock budget; expiry becomes a failure
    /// entry for this supplier only.
    async fn process_guarded(
        &self,
        supplier: Supplier,
        as_of_date: NaiveDate,
    ) -> Result<SupplierResult, SupplierError> {
        let budget = Duration::from_secs(self.config.pipeline.supplier_timeout_seconds);
        match tokio::time::timeout(budget, self.process_supplier(&supplier, as_of_date)).await {
            Ok(result) => result,
            Err(_) => Err(SupplierError {
                supplier_id: supplier.supplier_id.clone(),
                stage: "timeout".to_string(),
                error: format!("Supplier processing exceeded {}s", budget.as_secs()),
            }),
        }
    }

    async fn process_supplier(
        &self,
        supplier: &Supplier,
        as_of_date: NaiveDate,
    ) -> Result<SupplierResult, SupplierError> {
        let supplier_id = &supplier.supplier_id;
        let fail = |stage: &str, error: String| SupplierError {
            supplier_id: supplier_id.clone(),
            stage: stage.to_string(),
            error,
        };

        let internal = compute_internal_scores(&supplier.internal_signals, &self.config.thresholds);
        self.store
            .upsert_internal_scores(as_of_date, supplier_id, &internal)
            .await
            .map_err(|e| fail("persist_internal_scores", e.to_string()))?;

        let documents = self.collect_evidence(supplier).await;
        let normalized = normalize_documents(&documents);
        tracing::info!(
            supplier_id = %supplier_id,
            documents = documents.len(),
            usable = normalized.len(),
            "Evidence collected"
        );

        let assessment = self.scorer.score(supplier, &normalized, as_of_date).await;
        self.store
            .upsert_financial_assessment(&assessment)
            .await
            .map_err(|e| fail("persist_financial_assessment", e.to_string()))?;

        // An indeterminate assessment contributes no financial score; its
        // weight is redistributed over the internal criteria.
        let financial_score = if assessment.financial_risk_level == RiskLevel::Indeterminate {
            None
        } else {
            Some(assessment.financial_risk_score)
        };

        let global_score = aggregate_global_score(
            internal.c1,
            internal.c2,
            internal.c3,
            financial_score,
            &self.config.weights,
        );
        let risk_level = classify_risk(global_score, &self.config.thresholds.risk_levels);
        let aggregate = AggregateScore {
            as_of_date,
            supplier_id: supplier_id.clone(),
            c1: internal.c1,
            c2: internal.c2,
            c3: internal.c3,
            financial_score,
            global_score,
            risk_level,
        };

        let previous = self
            .store
            .latest_aggregate_before(supplier_id, as_of_date)
            .await
            .map_err(|e| fail("read_previous_aggregate", e.to_string()))?;
        let lookback = self
            .store
            .aggregate_days_before(
                supplier_id,
                as_of_date,
                i64::from(self.config.alerting.lookback_days),
            )
            .await
            .map_err(|e| fail("read_lookback_aggregate", e.to_string()))?;

        self.store
            .upsert_aggregate(&aggregate)
            .await
            .map_err(|e| fail("persist_aggregate", e.to_string()))?;

        let alert = evaluate_alert(
            supplier,
            &aggregate,
            &assessment,
            previous.as_ref(),
            lookback.map(|a| a.global_score),
            &self.config.alerting,
        );

        let mut alert_sent = false;
        if let Some(payload) = &alert {
            match self.sink.deliver(payload).await {
                Ok(delivered) => alert_sent = delivered,
                Err(e) => {
                    // Delivery failures never fail the supplier.
                    tracing::error!(
                        supplier_id = %supplier_id,
                        error = %e,
                        "Alert delivery failed"
                    );
                }
            }
        }

        tracing::info!(
            supplier_id = %supplier_id,
            global_score = global_score,
            risk_level = %risk_level,
            alerted = alert_sent,
            "Supplier scored"
        );

        Ok(SupplierResult {
            supplier_id: supplier_id.clone(),
            aggregate,
            assessment,
            alert,
            alert_sent,
        })
    }

    /// Fetch the supplier's evidence URLs. Blocked, rate-limited and
    /// failed fetches reduce the evidence set instead of failing the
    /// supplier. In golden mode the web is never touched: evidence comes
    /// from the local fixture set.
    async fn collect_evidence(&self, supplier: &Supplier) -> Vec<EvidenceDocument> {
        if self.config.pipeline.golden_mode {
            return self.golden.load(&supplier.supplier_id);
        }

        let mut documents = Vec::new();
        for url in &supplier.evidence_urls {
            let outcome = self.gateway.fetch(url).await;
            if let Some(doc) = outcome.into_document() {
                documents.push(doc);
            } else {
                tracing::warn!(
                    supplier_id = %supplier.supplier_id,
                    url = %url,
                    "Evidence URL yielded no document"
                );
            }
        }
        documents
    }
}

/// SUCCESS when nothing failed, FAILED when nothing scored, PARTIAL
/// otherwise.
fn classify_run(counts: &RunCounts) -> RunStatus {
    if counts.suppliers_total > 0 && counts.suppliers_scored == 0 {
        RunStatus::Failed
    } else if counts.suppliers_failed > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSinkError;
    use crate::db::DbError;
    use crate::gateway::cache::ContentCache;
    use crate::llm::{ModelError, ScoringModel};
    use crate::model::{
        Criticality, EvidenceSource, GlobalRiskLevel, InternalScores, InternalSignals,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory store keyed like the SQL backends.
    #[derive(Default)]
    struct MemoryStore {
        aggregates: Mutex<HashMap<(String, NaiveDate), AggregateScore>>,
        assessments: Mutex<HashMap<(String, NaiveDate), FinancialAssessment>>,
        audits: Mutex<Vec<RunAudit>>,
        fail_internal_for: Option<String>,
    }

    impl MemoryStore {
        fn failing_internal_for(supplier_id: &str) -> Self {
            Self {
                fail_internal_for: Some(supplier_id.to_string()),
                ..Self::default()
            }
        }

        fn seed_aggregate(&self, score: AggregateScore) {
            self.aggregates
                .lock()
                .unwrap()
                .insert((score.supplier_id.clone(), score.as_of_date), score);
        }

        fn last_audit(&self) -> RunAudit {
            self.audits.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScoreStore for MemoryStore {
        async fn upsert_internal_scores(
            &self,
            _as_of_date: NaiveDate,
            supplier_id: &str,
            _scores: &InternalScores,
        ) -> Result<(), DbError> {
            if self.fail_internal_for.as_deref() == Some(supplier_id) {
                return Err(DbError::Serialization("injected failure".to_string()));
            }
            Ok(())
        }

        async fn upsert_financial_assessment(
            &self,
            assessment: &FinancialAssessment,
        ) -> Result<(), DbError> {
            self.assessments.lock().unwrap().insert(
                (assessment.supplier_id.clone(), assessment.as_of_date),
                assessment.clone(),
            );
            Ok(())
        }

        async fn upsert_aggregate(&self, score: &AggregateScore) -> Result<(), DbError> {
            self.seed_aggregate(score.clone());
            Ok(())
        }

        async fn upsert_run_audit(&self, audit: &RunAudit) -> Result<(), DbError> {
            self.audits.lock().unwrap().push(audit.clone());
            Ok(())
        }

        async fn latest_aggregate_before(
            &self,
            supplier_id: &str,
            date: NaiveDate,
        ) -> Result<Option<AggregateScore>, DbError> {
            Ok(self
                .aggregates
                .lock()
                .unwrap()
                .values()
                .filter(|a| a.supplier_id == supplier_id && a.as_of_date < date)
                .max_by_key(|a| a.as_of_date)
                .cloned())
        }

        async fn aggregate_days_before(
            &self,
            supplier_id: &str,
            date: NaiveDate,
            days: i64,
        ) -> Result<Option<AggregateScore>, DbError> {
            let target = date - chrono::Duration::days(days);
            Ok(self
                .aggregates
                .lock()
                .unwrap()
                .get(&(supplier_id.to_string(), target))
                .cloned())
        }
    }

    /// Always returns the same response; counts calls.
    struct StaticModel {
        response: String,
        calls: AtomicU32,
    }

    impl StaticModel {
        fn new(response: String) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScoringModel for StaticModel {
        async fn complete(&self, _: &str, _: &str, _: &str) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<AlertPayload>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, alert: &AlertPayload) -> Result<bool, AlertSinkError> {
            self.delivered.lock().unwrap().push(alert.clone());
            Ok(true)
        }
    }

    fn supplier(id: &str, signals: InternalSignals) -> Supplier {
        Supplier {
            supplier_id: id.to_string(),
            name: format!("Supplier {}", id),
            country: "FR".to_string(),
            tier: "1".to_string(),
            category: "electronics".to_string(),
            evidence_urls: Vec::new(),
            internal_signals: signals,
        }
    }

    fn worst_signals() -> InternalSignals {
        InternalSignals {
            delivery_delays_last_12m: 12,
            avg_delay_days: 10.0,
            quality_incidents_last_12m: 8,
            is_monosource: true,
            criticality: Criticality::Critical,
            contract_years: 0.5,
            litigation_count: 5,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()
    }

    fn pipeline_with(
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        dir: &TempDir,
    ) -> Pipeline {
        let config = Config::default();
        let cache = ContentCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let gateway = Arc::new(EvidenceGateway::new(config.allowlist.clone(), cache));
        let scorer = Arc::new(FinancialScorer::new(None, 0));
        Pipeline::new(config, store, gateway, scorer, sink)
    }

    #[tokio::test]
    async fn zero_evidence_supplier_scores_indeterminate_with_redistribution() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(store.clone(), sink, &dir);

        let suppliers = vec![supplier("SUP-001", InternalSignals::default())];
        let summary = pipeline.run_daily("run-1", &suppliers, date()).await.unwrap();

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.counts.suppliers_scored, 1);
        let result = &summary.results[0];
        assert_eq!(
            result.assessment.financial_risk_level,
            RiskLevel::Indeterminate
        );
        assert!(result.assessment.confidence <= 0.4);
        assert!(!result.assessment.data_gaps.is_empty());
        assert!(result.aggregate.financial_score.is_none());
        // Default signals: c1=0, c2=5, c3=40 redistributed over 0.2/0.15/0.15.
        assert_eq!(result.aggregate.global_score, 14);
        assert_eq!(result.aggregate.risk_level, GlobalRiskLevel::Low);

        let persisted = store.assessments.lock().unwrap();
        assert!(persisted.contains_key(&("SUP-001".to_string(), date())));
    }

    #[tokio::test]
    async fn medium_to_high_escalation_raises_exactly_one_alert() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.seed_aggregate(AggregateScore {
            as_of_date: date() - chrono::Duration::days(1),
            supplier_id: "SUP-001".to_string(),
            c1: 60,
            c2: 60,
            c3: 60,
            financial_score: Some(60),
            global_score: 60,
            risk_level: GlobalRiskLevel::Medium,
        });
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(store, sink.clone(), &dir);

        // Worst-case internals score 87 after redistribution: HIGH.
        let suppliers = vec![supplier("SUP-001", worst_signals())];
        let summary = pipeline.run_daily("run-2", &suppliers, date()).await.unwrap();

        assert_eq!(summary.counts.alerts_sent, 1);
        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].trigger_reason.contains("escalation"));
        assert_eq!(delivered[0].previous_risk_level, Some(GlobalRiskLevel::Medium));
        assert_eq!(delivered[0].current_risk_level, GlobalRiskLevel::High);
    }

    #[tokio::test]
    async fn one_failed_supplier_yields_partial_run() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::failing_internal_for("SUP-BAD"));
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(store.clone(), sink, &dir);

        let suppliers = vec![
            supplier("SUP-001", InternalSignals::default()),
            supplier("SUP-BAD", InternalSignals::default()),
        ];
        let summary = pipeline.run_daily("run-3", &suppliers, date()).await.unwrap();

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.counts.suppliers_scored, 1);
        assert_eq!(summary.counts.suppliers_failed, 1);
        assert_eq!(summary.errors[0].supplier_id, "SUP-BAD");
        assert_eq!(summary.errors[0].stage, "persist_internal_scores");

        let audit = store.last_audit();
        assert_eq!(audit.status, RunStatus::Partial);
        assert!(audit.finished_at.is_some());
        assert_eq!(audit.counts.suppliers_total, 2);
    }

    #[tokio::test]
    async fn all_suppliers_failing_yields_failed_run() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::failing_internal_for("SUP-BAD"));
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(store.clone(), sink, &dir);

        let suppliers = vec![supplier("SUP-BAD", InternalSignals::default())];
        let summary = pipeline.run_daily("run-4", &suppliers, date()).await.unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(store.last_audit().status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn golden_mode_scores_from_local_fixtures_without_the_web() {
        let golden_dir = TempDir::new().unwrap();
        let cases = golden_dir.path().join("cases");
        std::fs::create_dir_all(&cases).unwrap();
        std::fs::write(
            cases.join("SUP-001_annual_report.txt"),
            "Net income declined 30% in 2025 and refinancing talks stalled.",
        )
        .unwrap();

        let mut config = Config::default();
        config.pipeline.golden_mode = true;
        config.pipeline.golden_dir = golden_dir.path().to_string_lossy().into_owned();

        let cache_dir = TempDir::new().unwrap();
        let cache = ContentCache::new(cache_dir.path(), Duration::from_secs(3600)).unwrap();
        let gateway = Arc::new(EvidenceGateway::new(config.allowlist.clone(), cache));
        let model = StaticModel::new(
            r#"{
                "supplier_id": "SUP-001",
                "as_of_date": "2026-08-28",
                "financial_risk_score": 65,
                "financial_risk_level": "MEDIUM",
                "confidence": 0.6,
                "risk_drivers": ["DEBT_STRESS"],
                "recommended_actions": ["Monitor quarterly results"],
                "data_gaps": [],
                "evidence_items": [{
                    "source": "INTERNAL_GOLDEN",
                    "url": "file:///golden/cases/SUP-001_annual_report.txt",
                    "doc_id": "d1",
                    "field": "net_income",
                    "excerpt": "Net income declined 30% in 2025.",
                    "content_hash": "hash1",
                    "observed_at": "2026-08-20"
                }],
                "notes": ""
            }"#
            .to_string(),
        );
        let scorer = Arc::new(FinancialScorer::new(Some(model.clone()), 0));
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(RecordingSink::default());
        let pipeline = Pipeline::new(config, store, gateway, scorer, sink);

        let suppliers = vec![supplier("SUP-001", InternalSignals::default())];
        let summary = pipeline.run_daily("run-6", &suppliers, date()).await.unwrap();

        // The fixture reached the scorer: the model was called once and the
        // assessment contributed a financial score to the aggregate.
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(model.call_count(), 1);
        let result = &summary.results[0];
        assert_eq!(result.assessment.financial_risk_level, RiskLevel::Medium);
        assert_eq!(
            result.assessment.evidence_items[0].source,
            EvidenceSource::InternalGolden
        );
        assert_eq!(result.aggregate.financial_score, Some(65));
    }

    #[tokio::test]
    async fn empty_roster_is_a_successful_run() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(store, sink, &dir);

        let summary = pipeline.run_daily("run-5", &[], date()).await.unwrap();
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.counts.suppliers_total, 0);
    }

    #[test]
    fn run_classification_covers_all_cases() {
        let counts = |total, scored, failed| RunCounts {
            suppliers_total: total,
            suppliers_scored: scored,
            suppliers_failed: failed,
            alerts_sent: 0,
        };
        assert_eq!(classify_run(&counts(3, 3, 0)), RunStatus::Success);
        assert_eq!(classify_run(&counts(3, 2, 1)), RunStatus::Partial);
        assert_eq!(classify_run(&counts(3, 0, 3)), RunStatus::Failed);
        assert_eq!(classify_run(&counts(0, 0, 0)), RunStatus::Success);
    }
}
