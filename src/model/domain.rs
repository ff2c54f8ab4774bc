use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Supplier roster entry with its internal signal bag.
///
/// Immutable for the duration of a run; supplied by the roster file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub supplier_id: String,
    pub name: String,
    pub country: String,
    pub tier: String,
    pub category: String,
    /// Fixed set of evidence URLs to fetch for this supplier.
    #[serde(default)]
    pub evidence_urls: Vec<Url>,
    #[serde(default)]
    pub internal_signals: InternalSignals,
}

/// Component criticality tier used by the C2 lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Criticality {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Criticality {
    fn default() -> Self {
        Criticality::Low
    }
}

// Every field defaults to the risk-free extreme so that a sparse signal
// bag scores instead of failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalSignals {
    pub delivery_delays_last_12m: u32,
    pub avg_delay_days: f64,
    pub quality_incidents_last_12m: u32,
    pub is_monosource: bool,
    pub criticality: Criticality,
    pub contract_years: f64,
    pub litigation_count: u32,
}

/// Document retrieved by the evidence gateway. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceDocument {
    pub url: Url,
    pub domain: String,
    pub content: String,
    /// SHA-256 of the content, used for cache keys and citation integrity.
    pub content_hash: String,
    pub http_status: u16,
    pub retrieved_at: DateTime<Utc>,
    pub from_cache: bool,
    pub source: EvidenceSource,
}

/// Bounded snippet set derived from one evidence document.
///
/// Snippets reference their parent document hash for traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub doc_id: String,
    pub url: String,
    pub content_hash: String,
    pub snippets: Vec<String>,
    pub source: EvidenceSource,
}

/// The three deterministic internal risk criteria, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalScores {
    pub c1: i32,
    pub c2: i32,
    pub c3: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Indeterminate,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Indeterminate => "INDETERMINATE",
        };
        write!(f, "{}", s)
    }
}

/// Risk level for the aggregated global score. Never indeterminate: an
/// absent financial score is redistributed, not surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GlobalRiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for GlobalRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GlobalRiskLevel::Low => "LOW",
            GlobalRiskLevel::Medium => "MEDIUM",
            GlobalRiskLevel::High => "HIGH",
        };
        write!(f, "{}", s)
    }
}

/// Where an evidence document came from: the guarded web gateway or the
/// local golden fixture set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceSource {
    OfficialWeb,
    InternalGolden,
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvidenceSource::OfficialWeb => "OFFICIAL_WEB",
            EvidenceSource::InternalGolden => "INTERNAL_GOLDEN",
        };
        write!(f, "{}", s)
    }
}

/// A cited, hash-traceable excerpt backing a claim in the financial
/// assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub source: EvidenceSource,
    pub url: String,
    pub doc_id: String,
    pub field: String,
    pub excerpt: String,
    pub content_hash: String,
    pub observed_at: NaiveDate,
}

/// LLM-produced financial risk assessment, post-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialAssessment {
    pub supplier_id: String,
    pub as_of_date: NaiveDate,
    pub financial_risk_score: i32,
    pub financial_risk_level: RiskLevel,
    pub confidence: f64,
    #[serde(default)]
    pub risk_drivers: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub data_gaps: Vec<String>,
    #[serde(default)]
    pub evidence_items: Vec<EvidenceItem>,
    #[serde(default)]
    pub notes: String,
}

/// Durable record of one supplier's scores for one assessment date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateScore {
    pub as_of_date: NaiveDate,
    pub supplier_id: String,
    pub c1: i32,
    pub c2: i32,
    pub c3: i32,
    /// Absent when the financial assessment came back indeterminate.
    pub financial_score: Option<i32>,
    pub global_score: i32,
    pub risk_level: GlobalRiskLevel,
}

/// Payload handed to the alert sink when an alert condition fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub supplier_id: String,
    pub supplier_name: String,
    pub as_of_date: NaiveDate,
    pub global_score: i32,
    pub financial_score: Option<i32>,
    pub previous_risk_level: Option<GlobalRiskLevel>,
    pub current_risk_level: GlobalRiskLevel,
    pub risk_drivers: Vec<String>,
    /// First 3 evidence items from the assessment, in original order.
    pub top_evidences: Vec<EvidenceItem>,
    pub recommended_actions: Vec<String>,
    pub trigger_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Structured entry for a supplier that failed during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierError {
    pub supplier_id: String,
    pub stage: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub suppliers_total: usize,
    pub suppliers_scored: usize,
    pub suppliers_failed: usize,
    pub alerts_sent: usize,
}

/// Audit record for one pipeline run, upserted by run id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAudit {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub errors: Vec<SupplierError>,
    pub counts: RunCounts,
}

impl RunAudit {
    pub fn start(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            errors: Vec::new(),
            counts: RunCounts::default(),
        }
    }

    pub fn finalize(mut self, status: RunStatus, errors: Vec<SupplierError>, counts: RunCounts) -> Self {
        self.finished_at = Some(Utc::now());
        self.status = status;
        self.errors = errors;
        self.counts = counts;
        self
    }
}
