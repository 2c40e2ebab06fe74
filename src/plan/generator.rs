//! Plan generation via rig-core.
//!
//! Supports:
//! - **OpenAI**: Direct API access via rig-core
//! - **Anthropic**: Direct API access via rig-core
//!
//! The model is asked for strict JSON; `parse_plan` strips markdown fences,
//! deserializes, and runs schema validation so malformed output surfaces as
//! `GenerationError` instead of a half-usable plan.

use std::sync::Arc;

use async_trait::async_trait;
use rig::agent::{Agent, AgentBuilder};
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, Prompt};
use secrecy::ExposeSecret;

use crate::config::AnalysisConfig;
use crate::error::GenerationError;

use super::model::PersonalizedPlan;
use super::prompts::{AnalysisContext, analysis_prompt};

/// Turns a transcript plus user context into a personalized plan.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(
        &self,
        ctx: AnalysisContext<'_>,
    ) -> Result<PersonalizedPlan, GenerationError>;
}

/// Create a plan generator from configuration.
pub fn create_generator(config: &AnalysisConfig) -> Result<Arc<dyn PlanGenerator>, GenerationError> {
    match config.backend.as_str() {
        "openai" => create_openai_generator(config),
        "anthropic" => create_anthropic_generator(config),
        other => Err(GenerationError::RequestFailed {
            provider: other.to_string(),
            reason: "unknown analysis backend".to_string(),
        }),
    }
}

fn create_openai_generator(
    config: &AnalysisConfig,
) -> Result<Arc<dyn PlanGenerator>, GenerationError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            GenerationError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Analysis via OpenAI (model: {})", config.model);
    Ok(Arc::new(RigPlanGenerator::new(model, "openai")))
}

fn create_anthropic_generator(
    config: &AnalysisConfig,
) -> Result<Arc<dyn PlanGenerator>, GenerationError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            GenerationError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Analysis via Anthropic (model: {})", config.model);
    Ok(Arc::new(RigPlanGenerator::new(model, "anthropic")))
}

/// rig-backed [`PlanGenerator`] over any completion model.
pub struct RigPlanGenerator<M: CompletionModel> {
    agent: Agent<M>,
    provider: &'static str,
}

impl<M: CompletionModel> RigPlanGenerator<M> {
    pub fn new(model: M, provider: &'static str) -> Self {
        Self {
            agent: AgentBuilder::new(model).build(),
            provider,
        }
    }
}

#[async_trait]
impl<M: CompletionModel> PlanGenerator for RigPlanGenerator<M> {
    async fn generate(
        &self,
        ctx: AnalysisContext<'_>,
    ) -> Result<PersonalizedPlan, GenerationError> {
        let prompt = analysis_prompt(&ctx);
        let raw = self
            .agent
            .prompt(prompt)
            .await
            .map_err(|e| GenerationError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })?;
        parse_plan(&raw)
    }
}

/// Parse the model's answer into a validated plan.
///
/// Tolerates markdown code fences and prose around the object by cutting to
/// the outermost brace pair before deserializing.
pub fn parse_plan(raw: &str) -> Result<PersonalizedPlan, GenerationError> {
    let start = raw
        .find('{')
        .ok_or_else(|| GenerationError::InvalidResponse("no JSON object in output".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| GenerationError::InvalidResponse("unterminated JSON object".to_string()))?;
    if end < start {
        return Err(GenerationError::InvalidResponse(
            "unterminated JSON object".to_string(),
        ));
    }

    let plan: PersonalizedPlan = serde_json::from_str(&raw[start..=end])
        .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
    plan.validate()?;
    Ok(plan)
}
