use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EmbeddingConfig;

pub struct EmbeddingEngine {
    config: EmbeddingConfig,
    backend: EmbeddingBackend,
}

enum EmbeddingBackend {
    Http(HttpBackend),
    Pseudo,
    Unavailable(String),
}

struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingEngine {
    pub fn new(config: EmbeddingConfig) -> Self {
        let backend = match build_backend(&config) {
            Ok(backend) => backend,
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(error = %reason, "embedding backend unavailable");
                EmbeddingBackend::Unavailable(reason)
            }
        };
        Self { config, backend }
    }

    pub const fn backend_name(&self) -> &'static str {
        match self.backend {
            EmbeddingBackend::Http(_) => "http",
            EmbeddingBackend::Pseudo => "pseudo",
            EmbeddingBackend::Unavailable(_) => "unavailable",
        }
    }

    pub const fn vector_dim(&self) -> usize {
        self.config.vector_dim
    }

    pub async fn embed_query(&self, input: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("embedding service returned no vector for the query"))
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        match &self.backend {
            EmbeddingBackend::Http(backend) => backend.embed_batch(inputs, &self.config).await,
            EmbeddingBackend::Pseudo => Ok(inputs
                .iter()
                .map(|input| pseudo_embed(input, self.config.vector_dim))
                .collect::<Vec<_>>()),
            EmbeddingBackend::Unavailable(msg) => Err(anyhow!(
                "embedding unavailable: {msg}. set embedding.allow_pseudo=true only for local test scaffolding"
            )),
        }
    }
}

impl HttpBackend {
    async fn embed_batch(&self, inputs: &[String], cfg: &EmbeddingConfig) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &cfg.model,
            input: inputs,
            dimensions: custom_dimensions(&cfg.model, cfg.vector_dim),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("embedding request to {} failed", self.endpoint))?
            .error_for_status()
            .context("embedding service rejected the request")?;
        let body = response
            .text()
            .await
            .context("failed reading embedding response body")?;
        decode_response(&body, inputs.len())
    }
}

fn build_backend(config: &EmbeddingConfig) -> Result<EmbeddingBackend> {
    if config.allow_pseudo_fallback {
        return Ok(EmbeddingBackend::Pseudo);
    }
    let endpoint = config
        .endpoint
        .clone()
        .ok_or_else(|| anyhow!("no embedding endpoint configured"))?;
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("no embedding api key configured"))?;
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .context("failed to build embedding http client")?;
    Ok(EmbeddingBackend::Http(HttpBackend {
        client,
        endpoint,
        api_key,
    }))
}

/// Only the `text-embedding-3-*` family accepts a `dimensions` override.
fn custom_dimensions(model: &str, vector_dim: usize) -> Option<usize> {
    if model.starts_with("text-embedding-3-") {
        Some(vector_dim)
    } else {
        None
    }
}

fn decode_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut parsed = serde_json::from_str::<EmbeddingResponse>(body)
        .context("embedding response is not valid json")?;
    if parsed.data.len() != expected {
        return Err(anyhow!(
            "embedding response carried {} vectors for {} inputs",
            parsed.data.len(),
            expected
        ));
    }
    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

fn pseudo_embed(input: &str, dim: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; dim.max(1)];
    let n = out.len();
    for (idx, b) in input.to_lowercase().as_bytes().iter().enumerate() {
        out[idx % n] += f32::from(*b) / 255.0;
    }
    out
}
