//! Fixed prompts for the financial scoring model

use chrono::NaiveDate;

use crate::model::{NormalizedDocument, Supplier};

/// System prompt: the output contract and the anti-fabrication rules.
pub const SCORING_SYSTEM_PROMPT: &str = r#"You are a financial risk assessment engine. Your sole function is to analyze provided evidence about a supplier and produce a structured JSON risk score.

ABSOLUTE RULES:
1. Output ONLY valid JSON matching the required schema. No prose, no markdown.
2. NEVER invent, fabricate, or hallucinate any source, fact, URL, or data point.
3. Every claim in risk_drivers MUST be supported by at least one evidence item.
4. If you cannot find sufficient evidence, set financial_risk_level to INDETERMINATE, confidence <= 0.4, and list specific data_gaps.
5. evidence_items MUST contain 1 to 7 items. Each excerpt max 240 chars.
6. notes field max 400 chars.
7. financial_risk_score MUST be an integer in [0, 100].
8. confidence MUST be a float in [0.0, 1.0].
9. Use ONLY the evidence provided in the USER message. Do not access external data.
10. Do not include any text outside the JSON object."#;

/// Scoring-policy prompt: base score, additive adjustments, canonical
/// driver vocabulary and the output shape.
pub const SCORING_POLICY_PROMPT: &str = r#"SCORING POLICY:
- Base score: 50
- Adjustments (cumulative):
  - Payment default / insolvency / collective proceedings: +30 to +50
  - Liquidity stress / excessive debt / difficult refinancing: +10 to +25
  - Recent significant downgrade (rating/outlook): +10 to +25
  - Notable improvement / confirmed multi-period stability: -5 to -15
- Contradictions or weak data => financial_risk_level = INDETERMINATE

CONFIDENCE SCORING:
- confidence reflects quality, quantity, recency, and coherence of evidence
- 3+ recent, coherent official sources: confidence >= 0.7
- 1-2 sources or older data: confidence 0.4-0.7
- No usable evidence: confidence <= 0.4

CANONICAL RISK DRIVERS (use these exact strings when applicable):
- PAYMENT_DEFAULT
- INSOLVENCY
- PROCEEDING
- BANKRUPTCY
- LIQUIDATION
- DEBT_STRESS
- LIQUIDITY_RISK
- RATING_DOWNGRADE
- REGULATORY_ACTION
- GEOPOLITICAL_RISK
- ENVIRONMENTAL_RISK
- OPERATIONAL_DISRUPTION
- STABLE_POSITIVE

OUTPUT FORMAT:
{
  "supplier_id": "<from input>",
  "as_of_date": "<from input>",
  "financial_risk_score": <int 0-100>,
  "financial_risk_level": "<LOW|MEDIUM|HIGH|INDETERMINATE>",
  "confidence": <float 0.0-1.0>,
  "risk_drivers": ["<CANONICAL_DRIVER>"],
  "recommended_actions": ["<action string>"],
  "data_gaps": ["<gap description>"],
  "evidence_items": [
    {
      "source": "<OFFICIAL_WEB|INTERNAL_GOLDEN>",
      "url": "<source url>",
      "doc_id": "<document identifier>",
      "field": "<data field name>",
      "excerpt": "<max 240 chars>",
      "content_hash": "<sha256>",
      "observed_at": "<YYYY-MM-DD>"
    }
  ],
  "notes": "<max 400 chars>"
}

INDETERMINATE RULE:
If evidence_items is empty or all sources are unreliable:
- financial_risk_level = "INDETERMINATE"
- confidence <= 0.4
- data_gaps MUST be non-empty
- financial_risk_score = 50 (base, no adjustment)"#;

/// Build the evidence transcript: each snippet tagged with its source URL.
pub fn build_evidence_transcript(documents: &[NormalizedDocument]) -> String {
    let mut parts = Vec::new();
    for doc in documents {
        for snippet in &doc.snippets {
            parts.push(format!("[Source: {}] {}", doc.url, snippet));
        }
    }
    parts.join("\n")
}

/// Build the per-supplier user prompt from identity fields and the
/// evidence transcript.
pub fn build_user_prompt(
    supplier: &Supplier,
    as_of_date: NaiveDate,
    evidence_transcript: &str,
) -> String {
    format!(
        "Analyze the following supplier for financial risk.\n\n\
         SUPPLIER:\n\
         - supplier_id: {}\n\
         - name: {}\n\
         - country: {}\n\
         - sector/category: {}\n\
         - as_of_date: {}\n\n\
         COLLECTED EVIDENCE (official web extracts):\n\
         {}\n\n\
         Produce the JSON risk assessment now.",
        supplier.supplier_id,
        supplier.name,
        supplier.country,
        supplier.category,
        as_of_date,
        evidence_transcript,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvidenceSource;

    #[test]
    fn transcript_tags_every_snippet_with_its_source() {
        let docs = vec![
            NormalizedDocument {
                doc_id: "d1".to_string(),
                url: "https://a.example/x".to_string(),
                content_hash: "h1".to_string(),
                snippets: vec!["first".to_string(), "second".to_string()],
                source: EvidenceSource::OfficialWeb,
            },
            NormalizedDocument {
                doc_id: "d2".to_string(),
                url: "https://b.example/y".to_string(),
                content_hash: "h2".to_string(),
                snippets: vec!["third".to_string()],
                source: EvidenceSource::OfficialWeb,
            },
        ];
        let transcript = build_evidence_transcript(&docs);
        let lines: Vec<&str> = transcript.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[Source: https://a.example/x] first");
        assert_eq!(lines[2], "[Source: https://b.example/y] third");
    }

    #[test]
    fn empty_documents_yield_empty_transcript() {
        assert!(build_evidence_transcript(&[]).is_empty());
    }
}
