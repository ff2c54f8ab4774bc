//! Alert evaluation and delivery
//!
//! Conditions are checked in fixed priority order and the first match
//! wins, so a supplier raises at most one alert per run.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::model::{
    AggregateScore, AlertPayload, AlertPolicy, FinancialAssessment, GlobalRiskLevel, Supplier,
};

/// Evidence items carried on an alert.
const TOP_EVIDENCE_COUNT: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum AlertSinkError {
    #[error("Failed to write alert file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize alert: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Evaluate the alert conditions for one supplier.
///
/// Priority order: level escalation, then score velocity, then critical
/// drivers. Returns None when nothing fires.
pub fn evaluate_alert(
    supplier: &Supplier,
    current: &AggregateScore,
    assessment: &FinancialAssessment,
    previous: Option<&AggregateScore>,
    lookback_score: Option<i32>,
    policy: &AlertPolicy,
) -> Option<AlertPayload> {
    let previous_level = previous.map(|p| p.risk_level);

    // 1. Escalation MEDIUM -> HIGH against the prior day's level.
    if previous_level == Some(GlobalRiskLevel::Medium)
        && current.risk_level == GlobalRiskLevel::High
    {
        return Some(build_alert(
            supplier,
            current,
            assessment,
            previous_level,
            "Risk level escalation from MEDIUM to HIGH".to_string(),
        ));
    }

    // 2. Score velocity over the lookback window.
    if let Some(past_score) = lookback_score {
        let delta = current.global_score - past_score;
        if delta >= policy.score_delta_threshold {
            return Some(build_alert(
                supplier,
                current,
                assessment,
                previous_level,
                format!(
                    "Score increased by {} points over {} days",
                    delta, policy.lookback_days
                ),
            ));
        }
    }

    // 3. Critical financial drivers.
    let found: Vec<&str> = assessment
        .risk_drivers
        .iter()
        .filter(|d| policy.critical_drivers.iter().any(|c| c == *d))
        .map(String::as_str)
        .collect();
    if !found.is_empty() {
        return Some(build_alert(
            supplier,
            current,
            assessment,
            previous_level,
            format!("Critical drivers detected: {}", found.join(", ")),
        ));
    }

    None
}

fn build_alert(
    supplier: &Supplier,
    current: &AggregateScore,
    assessment: &FinancialAssessment,
    previous_level: Option<GlobalRiskLevel>,
    trigger_reason: String,
) -> AlertPayload {
    AlertPayload {
        supplier_id: supplier.supplier_id.clone(),
        supplier_name: supplier.name.clone(),
        as_of_date: current.as_of_date,
        global_score: current.global_score,
        financial_score: current.financial_score,
        previous_risk_level: previous_level,
        current_risk_level: current.risk_level,
        risk_drivers: assessment.risk_drivers.clone(),
        top_evidences: assessment
            .evidence_items
            .iter()
            .take(TOP_EVIDENCE_COUNT)
            .cloned()
            .collect(),
        recommended_actions: assessment.recommended_actions.clone(),
        trigger_reason,
    }
}

/// Outbound alert delivery. Failures are reported to the caller for
/// logging, never treated as fatal to the run.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver the alert; Ok(true) means it went out.
    async fn deliver(&self, alert: &AlertPayload) -> Result<bool, AlertSinkError>;
}

/// Sink that records alerts in the structured log only.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, alert: &AlertPayload) -> Result<bool, AlertSinkError> {
        tracing::warn!(
            supplier_id = %alert.supplier_id,
            supplier_name = %alert.supplier_name,
            global_score = alert.global_score,
            current_level = %alert.current_risk_level,
            trigger = %alert.trigger_reason,
            "ALERT"
        );
        Ok(true)
    }
}

/// Sink that writes one JSON file per alert.
pub struct FileAlertSink {
    dir: PathBuf,
}

impl FileAlertSink {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl AlertSink for FileAlertSink {
    async fn deliver(&self, alert: &AlertPayload) -> Result<bool, AlertSinkError> {
        let path = self.dir.join(format!(
            "alert_{}_{}.json",
            alert.supplier_id, alert.as_of_date
        ));
        let json = serde_json::to_string_pretty(alert)?;
        fs::write(&path, json)?;
        tracing::info!(
            supplier_id = %alert.supplier_id,
            path = %path.display(),
            "Alert written"
        );
        Ok(true)
    }
}
