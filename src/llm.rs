//! LLM boundary for financial scoring
//!
//! A single raw-text completion call behind a trait so the scorer can be
//! exercised without a network. Boundary failures are retry-countable,
//! never propagated past the scorer.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

/// Environment variable for the scoring model (defaults to gpt-4o-mini)
const ENV_SCORING_MODEL: &str = "SCORING_MODEL";

const DEFAULT_MODEL: &str = openai::GPT_4O_MINI;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model client initialization failed: {0}")]
    Init(String),

    #[error("Model completion failed: {0}")]
    Completion(String),
}

/// One-shot completion boundary: fixed system and scoring-policy prompts
/// plus a per-supplier user prompt, returning the raw response text.
#[async_trait]
pub trait ScoringModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        policy_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ModelError>;
}

/// OpenAI-backed scoring model.
pub struct OpenAiScoringModel {
    client: openai::Client,
    model: String,
}

impl OpenAiScoringModel {
    /// Create a client from the provided API key; the model name comes
    /// from SCORING_MODEL when set.
    pub fn new(api_key: &str) -> Result<Self, ModelError> {
        let client = openai::Client::new(api_key);
        let model = std::env::var(ENV_SCORING_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        tracing::info!(model = %model, "Scoring model initialized");
        Ok(Self { client, model })
    }
}

#[async_trait]
impl ScoringModel for OpenAiScoringModel {
    async fn complete(
        &self,
        system_prompt: &str,
        policy_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ModelError> {
        let start_time = std::time::Instant::now();
        let preamble = format!("{}\n\n{}", system_prompt, policy_prompt);

        let agent = self
            .client
            .agent(&self.model)
            .preamble(&preamble)
            .temperature(0.1)
            .build();

        match agent.prompt(user_prompt).await {
            Ok(response) => {
                tracing::info!(
                    model = %self.model,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    response_length = response.len(),
                    "Model completion succeeded"
                );
                Ok(response)
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    error = %e,
                    "Model completion failed"
                );
                Err(ModelError::Completion(e.to_string()))
            }
        }
    }
}
