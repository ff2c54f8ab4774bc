//! LLM-backed financial risk scoring with bounded, fully independent
//! retry attempts

pub mod prompts;
pub mod validation;

use std::sync::Arc;

use chrono::NaiveDate;

use crate::llm::ScoringModel;
use crate::model::{FinancialAssessment, NormalizedDocument, Supplier};
use prompts::{build_evidence_transcript, build_user_prompt, SCORING_POLICY_PROMPT, SCORING_SYSTEM_PROMPT};
use validation::{indeterminate_fallback, parse_model_response, validate_assessment};

/// Outcome of a single scoring attempt. Every failure mode counts as one
/// attempt against the retry budget.
enum AttemptOutcome {
    Success(FinancialAssessment),
    ModelFailure(String),
    ParseFailure,
    ValidationFailure(Vec<String>),
}

/// Scores suppliers against their normalized evidence via the model
/// boundary. Always produces an assessment; never returns an error.
pub struct FinancialScorer {
    model: Option<Arc<dyn ScoringModel>>,
    /// Additional attempts after the first failure.
    max_retries: u32,
}

impl FinancialScorer {
    pub fn new(model: Option<Arc<dyn ScoringModel>>, max_retries: u32) -> Self {
        Self { model, max_retries }
    }

    /// Produce a financial assessment for one supplier.
    ///
    /// With no snippets or no configured model this is terminal without a
    /// model call; otherwise up to `1 + max_retries` independent attempts
    /// run, and exhaustion yields a synthesized INDETERMINATE result.
    pub async fn score(
        &self,
        supplier: &Supplier,
        documents: &[NormalizedDocument],
        as_of_date: NaiveDate,
    ) -> FinancialAssessment {
        let supplier_id = &supplier.supplier_id;

        let Some(model) = &self.model else {
            tracing::warn!(supplier_id = %supplier_id, "No scoring model configured");
            return indeterminate_fallback(supplier_id, as_of_date, "Scoring model not available");
        };

        if documents.iter().all(|d| d.snippets.is_empty()) {
            tracing::info!(supplier_id = %supplier_id, "No evidence available for scoring");
            return indeterminate_fallback(
                supplier_id,
                as_of_date,
                "No evidence collected from official sources",
            );
        }

        let transcript = build_evidence_transcript(documents);
        let user_prompt = build_user_prompt(supplier, as_of_date, &transcript);
        let total_attempts = self.max_retries + 1;

        for attempt in 1..=total_attempts {
            match self.attempt(model.as_ref(), &user_prompt).await {
                AttemptOutcome::Success(assessment) => {
                    tracing::info!(
                        supplier_id = %supplier_id,
                        score = assessment.financial_risk_score,
                        level = %assessment.financial_risk_level,
                        attempt = attempt,
                        "Financial scoring succeeded"
                    );
                    return assessment;
                }
                AttemptOutcome::ModelFailure(error) => {
                    tracing::warn!(
                        supplier_id = %supplier_id,
                        attempt = attempt,
                        error = %error,
                        "Model call failed"
                    );
                }
                AttemptOutcome::ParseFailure => {
                    tracing::warn!(
                        supplier_id = %supplier_id,
                        attempt = attempt,
                        "Model response was not parseable JSON"
                    );
                }
                AttemptOutcome::ValidationFailure(errors) => {
                    tracing::warn!(
                        supplier_id = %supplier_id,
                        attempt = attempt,
                        errors = ?errors,
                        "Model response failed contract validation"
                    );
                }
            }
        }

        indeterminate_fallback(
            supplier_id,
            as_of_date,
            &format!("LLM validation failed after {} attempts", total_attempts),
        )
    }

    /// One fully independent attempt: call, parse, validate.
    async fn attempt(&self, model: &dyn ScoringModel, user_prompt: &str) -> AttemptOutcome {
        let raw = match model
            .complete(SCORING_SYSTEM_PROMPT, SCORING_POLICY_PROMPT, user_prompt)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return AttemptOutcome::ModelFailure(e.to_string()),
        };

        let Some(value) = parse_model_response(&raw) else {
            return AttemptOutcome::ParseFailure;
        };

        match validate_assessment(value) {
            Ok(assessment) => AttemptOutcome::Success(assessment),
            Err(errors) => AttemptOutcome::ValidationFailure(errors),
        }
    }
}
