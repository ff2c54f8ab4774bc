//! Parsing and contract validation for model output, plus the
//! anti-hallucination closing rule and the INDETERMINATE fallback

use chrono::NaiveDate;

use crate::model::{FinancialAssessment, RiskLevel};

/// Maximum evidence items per assessment.
pub const MAX_EVIDENCE_ITEMS: usize = 7;
/// Maximum characters per evidence excerpt.
pub const MAX_EXCERPT_LENGTH: usize = 240;
/// Maximum characters for the free-text notes field.
pub const MAX_NOTES_LENGTH: usize = 400;
/// Bound on the driver/action/gap lists.
const MAX_LIST_ITEMS: usize = 16;

/// Confidence cap applied when no evidence items are present.
const NO_EVIDENCE_CONFIDENCE_CAP: f64 = 0.4;

/// Parse the model's raw response into a JSON value.
///
/// Markdown code fences are stripped first; failing that, the outermost
/// `{...}` span is tried.
pub fn parse_model_response(raw: &str) -> Option<serde_json::Value> {
    let content = strip_code_fences(raw.trim());

    if let Ok(value) = serde_json::from_str(&content) {
        return Some(value);
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

fn strip_code_fences(content: &str) -> String {
    if !content.starts_with("```") {
        return content.to_string();
    }
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Validate a parsed value against the assessment contract.
///
/// Returns the assessment with the anti-hallucination rule applied, or the
/// list of contract violations.
pub fn validate_assessment(value: serde_json::Value) -> Result<FinancialAssessment, Vec<String>> {
    let assessment: FinancialAssessment = match serde_json::from_value(value) {
        Ok(a) => a,
        Err(e) => return Err(vec![format!("schema: {}", e)]),
    };

    let mut errors = Vec::new();

    if assessment.supplier_id.trim().is_empty() {
        errors.push("supplier_id: must be non-empty".to_string());
    }
    if !(0..=100).contains(&assessment.financial_risk_score) {
        errors.push(format!(
            "financial_risk_score: {} out of [0, 100]",
            assessment.financial_risk_score
        ));
    }
    if !(0.0..=1.0).contains(&assessment.confidence) || !assessment.confidence.is_finite() {
        errors.push(format!(
            "confidence: {} out of [0.0, 1.0]",
            assessment.confidence
        ));
    }
    if assessment.evidence_items.len() > MAX_EVIDENCE_ITEMS {
        errors.push(format!(
            "evidence_items: {} exceeds maximum of {}",
            assessment.evidence_items.len(),
            MAX_EVIDENCE_ITEMS
        ));
    }
    if assessment.notes.chars().count() > MAX_NOTES_LENGTH {
        errors.push(format!(
            "notes: {} chars exceeds maximum of {}",
            assessment.notes.chars().count(),
            MAX_NOTES_LENGTH
        ));
    }
    for (name, list) in [
        ("risk_drivers", &assessment.risk_drivers),
        ("recommended_actions", &assessment.recommended_actions),
        ("data_gaps", &assessment.data_gaps),
    ] {
        if list.len() > MAX_LIST_ITEMS {
            errors.push(format!(
                "{}: {} entries exceeds maximum of {}",
                name,
                list.len(),
                MAX_LIST_ITEMS
            ));
        }
    }
    for (i, item) in assessment.evidence_items.iter().enumerate() {
        if item.excerpt.trim().is_empty() {
            errors.push(format!("evidence_items[{}].excerpt: must be non-empty", i));
        }
        if item.excerpt.chars().count() > MAX_EXCERPT_LENGTH {
            errors.push(format!(
                "evidence_items[{}].excerpt: {} chars exceeds maximum of {}",
                i,
                item.excerpt.chars().count(),
                MAX_EXCERPT_LENGTH
            ));
        }
        if item.content_hash.trim().is_empty() {
            errors.push(format!("evidence_items[{}].content_hash: must be non-empty", i));
        }
    }

    if errors.is_empty() {
        Ok(enforce_evidence_grounding(assessment))
    } else {
        Err(errors)
    }
}

/// Anti-hallucination closing rule: with zero evidence items the level is
/// forced to INDETERMINATE, confidence is capped at 0.4 and the data-gap
/// list is made non-empty. Idempotent: re-applying is a no-op.
pub fn enforce_evidence_grounding(mut assessment: FinancialAssessment) -> FinancialAssessment {
    if !assessment.evidence_items.is_empty() {
        return assessment;
    }
    assessment.financial_risk_level = RiskLevel::Indeterminate;
    assessment.confidence = assessment.confidence.min(NO_EVIDENCE_CONFIDENCE_CAP);
    if assessment.data_gaps.is_empty() {
        assessment.data_gaps = vec!["No evidence items available".to_string()];
    }
    assessment
}

/// Safe INDETERMINATE assessment used when no evidence exists, no model is
/// configured, or every attempt failed.
pub fn indeterminate_fallback(
    supplier_id: &str,
    as_of_date: NaiveDate,
    reason: &str,
) -> FinancialAssessment {
    let notes: String = format!("Automatic INDETERMINATE: {}", reason)
        .chars()
        .take(MAX_NOTES_LENGTH)
        .collect();
    FinancialAssessment {
        supplier_id: supplier_id.to_string(),
        as_of_date,
        financial_risk_score: 50,
        financial_risk_level: RiskLevel::Indeterminate,
        confidence: 0.2,
        risk_drivers: Vec::new(),
        recommended_actions: vec!["Manual review required due to insufficient data".to_string()],
        data_gaps: vec![reason.to_string()],
        evidence_items: Vec::new(),
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvidenceItem, EvidenceSource};
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()
    }

    fn valid_payload() -> serde_json::Value {
        json!({
            "supplier_id": "SUP-001",
            "as_of_date": "2026-08-28",
            "financial_risk_score": 72,
            "financial_risk_level": "HIGH",
            "confidence": 0.8,
            "risk_drivers": ["DEBT_STRESS"],
            "recommended_actions": ["Request audited statements"],
            "data_gaps": [],
            "evidence_items": [{
                "source": "OFFICIAL_WEB",
                "url": "https://registry.example/sup-001",
                "doc_id": "doc-1",
                "field": "net_debt",
                "excerpt": "Net debt rose 40% year over year.",
                "content_hash": "deadbeef",
                "observed_at": "2026-08-20"
            }],
            "notes": "Debt load is the dominant signal."
        })
    }

    #[test]
    fn plain_json_parses() {
        let value = parse_model_response(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn fenced_json_parses() {
        let raw = "```json\n{\"a\": 1}\n```";
        let value = parse_model_response(raw).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn json_embedded_in_prose_parses_via_outermost_braces() {
        let raw = "Here is the assessment you asked for: {\"a\": {\"b\": 2}} hope it helps";
        let value = parse_model_response(raw).unwrap();
        assert_eq!(value["a"]["b"], 2);
    }

    #[test]
    fn garbage_fails_to_parse() {
        assert!(parse_model_response("no json here at all").is_none());
        assert!(parse_model_response("{ broken").is_none());
    }

    #[test]
    fn valid_payload_validates() {
        let assessment = validate_assessment(valid_payload()).unwrap();
        assert_eq!(assessment.supplier_id, "SUP-001");
        assert_eq!(assessment.financial_risk_level, RiskLevel::High);
        assert_eq!(assessment.evidence_items.len(), 1);
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let mut payload = valid_payload();
        payload["financial_risk_score"] = json!(150);
        let errors = validate_assessment(payload).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("financial_risk_score")));
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let mut payload = valid_payload();
        payload["confidence"] = json!(1.5);
        let errors = validate_assessment(payload).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("confidence")));
    }

    #[test]
    fn oversized_excerpt_is_rejected() {
        let mut payload = valid_payload();
        payload["evidence_items"][0]["excerpt"] = json!("x".repeat(300));
        let errors = validate_assessment(payload).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("excerpt")));
    }

    #[test]
    fn whitespace_excerpt_is_rejected() {
        let mut payload = valid_payload();
        payload["evidence_items"][0]["excerpt"] = json!("   ");
        assert!(validate_assessment(payload).is_err());
    }

    #[test]
    fn too_many_evidence_items_are_rejected() {
        let mut payload = valid_payload();
        let item = payload["evidence_items"][0].clone();
        payload["evidence_items"] = json!(vec![item; 8]);
        let errors = validate_assessment(payload).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("evidence_items")));
    }

    #[test]
    fn missing_required_field_is_a_schema_error() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("financial_risk_level");
        let errors = validate_assessment(payload).unwrap_err();
        assert!(errors[0].starts_with("schema:"));
    }

    #[test]
    fn validation_applies_evidence_grounding() {
        let mut payload = valid_payload();
        payload["evidence_items"] = json!([]);
        payload["financial_risk_level"] = json!("HIGH");
        payload["confidence"] = json!(0.9);
        let assessment = validate_assessment(payload).unwrap();
        assert_eq!(assessment.financial_risk_level, RiskLevel::Indeterminate);
        assert!(assessment.confidence <= 0.4);
        assert!(!assessment.data_gaps.is_empty());
    }

    #[test]
    fn grounding_enforcement_is_idempotent() {
        let assessment = FinancialAssessment {
            supplier_id: "SUP-001".to_string(),
            as_of_date: date(),
            financial_risk_score: 80,
            financial_risk_level: RiskLevel::High,
            confidence: 0.9,
            risk_drivers: vec!["INSOLVENCY".to_string()],
            recommended_actions: Vec::new(),
            data_gaps: Vec::new(),
            evidence_items: Vec::new(),
            notes: String::new(),
        };
        let once = enforce_evidence_grounding(assessment);
        let twice = enforce_evidence_grounding(once.clone());
        assert_eq!(once.financial_risk_level, twice.financial_risk_level);
        assert_eq!(once.confidence, twice.confidence);
        assert_eq!(once.data_gaps, twice.data_gaps);
    }

    #[test]
    fn grounding_leaves_evidenced_assessments_alone() {
        let assessment = FinancialAssessment {
            supplier_id: "SUP-001".to_string(),
            as_of_date: date(),
            financial_risk_score: 80,
            financial_risk_level: RiskLevel::High,
            confidence: 0.9,
            risk_drivers: Vec::new(),
            recommended_actions: Vec::new(),
            data_gaps: Vec::new(),
            evidence_items: vec![EvidenceItem {
                source: EvidenceSource::OfficialWeb,
                url: "https://registry.example".to_string(),
                doc_id: "d".to_string(),
                field: "f".to_string(),
                excerpt: "evidence".to_string(),
                content_hash: "hash".to_string(),
                observed_at: date(),
            }],
            notes: String::new(),
        };
        let closed = enforce_evidence_grounding(assessment.clone());
        assert_eq!(closed.financial_risk_level, RiskLevel::High);
        assert_eq!(closed.confidence, 0.9);
    }

    #[test]
    fn fallback_is_indeterminate_with_gap_and_capped_notes() {
        let long_reason = "r".repeat(600);
        let fallback = indeterminate_fallback("SUP-001", date(), &long_reason);
        assert_eq!(fallback.financial_risk_level, RiskLevel::Indeterminate);
        assert_eq!(fallback.financial_risk_score, 50);
        assert!(fallback.confidence <= 0.4);
        assert!(!fallback.data_gaps.is_empty());
        assert!(fallback.notes.chars().count() <= MAX_NOTES_LENGTH);
    }
}
