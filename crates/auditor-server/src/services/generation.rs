use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use common::config::GenerationSettings;
use common::{ConfigurationError, StrategyConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::services::context::render_result;
use crate::services::retrieval::Orchestrator;

pub const NO_RECORDS_MESSAGE: &str = "Sorry, no relevant transaction records were found for your question. \
Try rephrasing it or check whether the data has been loaded.";

pub const SYSTEM_PROMPT: &str = "You are an impartial citizen auditor.

Your job is to analyse public expense records and answer citizens' questions objectively and clearly.

Answer using only the transaction records provided. Always cite:
- the specific amounts
- the counterparty (supplier) names
- the transaction dates
- the subjects involved

If you notice suspicious patterns, point them out objectively:
- very high amounts for generic services
- many transactions with the same counterparty
- vague descriptions attached to large amounts
- unusual spending patterns

Be factual and impartial, and base every observation on the records shown.";

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("generation failed: {0}")]
    Generation(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub records: usize,
    pub generated: bool,
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> anyhow::Result<String>;
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Transaction records:\n{context}\n\nCitizen question:\n{question}\n\nAuditor answer:")
}

/// Retrieves, renders and generates. A missing generator is a configuration
/// error raised before any adapter runs; an empty retrieval short-circuits to
/// [`NO_RECORDS_MESSAGE`] without calling the generator.
pub async fn answer(
    orchestrator: &Orchestrator,
    generator: Option<&dyn AnswerGenerator>,
    question: &str,
    strategy: &StrategyConfig,
) -> Result<Answer, AnswerError> {
    let generator = generator.ok_or(ConfigurationError::Missing {
        component: "generation",
        key: "generation.api_key",
    })?;

    let result = orchestrator.retrieve(question, strategy).await?;
    if result.is_no_data() {
        return Ok(Answer {
            text: NO_RECORDS_MESSAGE.to_string(),
            records: 0,
            generated: false,
        });
    }

    let prompt = build_prompt(&render_result(&result), question);
    let text = generator
        .generate(SYSTEM_PROMPT, &prompt)
        .await
        .map_err(|err| AnswerError::Generation(format!("{err:#}")))?;
    info!(records = result.records().len(), "answer_generated");
    Ok(Answer {
        text,
        records: result.records().len(),
        generated: true,
    })
}

/// OpenAI-compatible `/v1/chat/completions` client.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn from_settings(settings: &GenerationSettings) -> anyhow::Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigurationError::Missing {
                component: "generation",
                key: "generation.api_key",
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("failed to build generation http client")?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl AnswerGenerator for ChatCompletionsClient {
    async fn generate(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let body = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("generation request to {} failed", self.endpoint))?
            .error_for_status()
            .context("generation service rejected the request")?
            .text()
            .await
            .context("failed reading generation response body")?;
        decode_reply(&body)
    }
}

fn decode_reply(body: &str) -> anyhow::Result<String> {
    let parsed = serde_json::from_str::<ChatResponse>(body)
        .context("generation response is not valid json")?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow!("generation response carried no answer"))
}
