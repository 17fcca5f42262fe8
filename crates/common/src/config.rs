use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

pub const DEFAULT_CONFIG_FILE: &str = "auditor.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub retrieval: RetrievalSettings,
    pub relational: Option<RelationalSettings>,
    pub graph: Option<GraphSettings>,
    pub vector: Option<VectorSettings>,
    pub embedding: Option<EmbeddingSettings>,
    pub generation: Option<GenerationSettings>,
    pub server: ServerSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalSettings::default(),
            relational: Some(RelationalSettings::default()),
            graph: Some(GraphSettings::default()),
            vector: None,
            embedding: None,
            generation: None,
            server: ServerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_n: usize,
    pub rrf_k: usize,
    pub adapter_limit: usize,
    pub adapter_timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_n: 15,
            rrf_k: 60,
            adapter_limit: 10,
            adapter_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelationalSettings {
    pub index_dir: String,
}

impl Default for RelationalSettings {
    fn default() -> Self {
        Self {
            index_dir: ".auditor/ledger/tantivy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GraphSettings {
    pub snapshot_path: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            snapshot_path: ".auditor/ledger/records.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorSettings {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection: "ledger_transactions".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub timeout_ms: u64,
    pub allow_pseudo: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: Some("https://api.openai.com/v1/embeddings".to_string()),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            timeout_ms: 10_000,
            allow_pseudo: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub port: u16,
    pub allow_non_local: bool,
    pub api_token: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 38090,
            allow_non_local: false,
            api_token: None,
        }
    }
}

impl AppConfig {
    /// Reads `path` (defaults when the file is absent), applies process
    /// environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading config file: {}", path.display()))?;
            toml::from_str::<Self>(&raw)
                .with_context(|| format!("failed parsing config file: {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("AUDITOR_INDEX_DIR") {
            self.relational = Some(RelationalSettings { index_dir: dir });
        }
        if let Some(path) = lookup("AUDITOR_GRAPH_SNAPSHOT") {
            self.graph = Some(GraphSettings {
                snapshot_path: path,
            });
        }
        if let Some(url) = lookup("QDRANT_URL") {
            self.vector.get_or_insert_with(VectorSettings::default).url = url;
        }
        if let Some(key) = lookup("QDRANT_API_KEY")
            && let Some(vector) = self.vector.as_mut()
        {
            vector.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("AUDITOR_EMBEDDING_ENDPOINT") {
            self.embedding
                .get_or_insert_with(EmbeddingSettings::default)
                .endpoint = Some(endpoint);
        }
        if let Some(endpoint) = lookup("AUDITOR_GENERATION_ENDPOINT") {
            self.generation
                .get_or_insert_with(GenerationSettings::default)
                .endpoint = endpoint;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            if self.vector.is_some() && self.embedding.is_none() {
                self.embedding = Some(EmbeddingSettings::default());
            }
            if let Some(embedding) = self.embedding.as_mut()
                && embedding.api_key.is_none()
            {
                embedding.api_key = Some(key.clone());
            }
            let generation = self
                .generation
                .get_or_insert_with(GenerationSettings::default);
            if generation.api_key.is_none() {
                generation.api_key = Some(key);
            }
        }
        if let Some(top_n) = lookup("AUDITOR_TOP_N") {
            self.retrieval.top_n = top_n.parse().unwrap_or(self.retrieval.top_n);
        }
        if let Some(k) = lookup("AUDITOR_RRF_K") {
            self.retrieval.rrf_k = k.parse().unwrap_or(self.retrieval.rrf_k);
        }
        if let Some(timeout) = lookup("AUDITOR_ADAPTER_TIMEOUT_MS") {
            self.retrieval.adapter_timeout_ms =
                timeout.parse().unwrap_or(self.retrieval.adapter_timeout_ms);
        }
        if let Some(port) = lookup("AUDITOR_PORT") {
            self.server.port = port.parse().unwrap_or(self.server.port);
        }
        if let Some(token) = lookup("AUDITOR_API_TOKEN") {
            self.server.api_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.retrieval.top_n == 0 {
            return Err(ConfigurationError::Invalid {
                key: "retrieval.top_n",
                message: "must be at least 1".to_string(),
            });
        }
        if self.retrieval.adapter_limit == 0 {
            return Err(ConfigurationError::Invalid {
                key: "retrieval.adapter_limit",
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(vector) = &self.vector {
            if vector.url.trim().is_empty() {
                return Err(ConfigurationError::Missing {
                    component: "vector index",
                    key: "vector.url",
                });
            }
            if self.embedding.is_none() {
                return Err(ConfigurationError::Missing {
                    component: "semantic search",
                    key: "embedding",
                });
            }
        }
        if let Some(embedding) = &self.embedding {
            if embedding.dimension == 0 {
                return Err(ConfigurationError::Invalid {
                    key: "embedding.dimension",
                    message: "must be at least 1".to_string(),
                });
            }
            if !embedding.allow_pseudo {
                if embedding.endpoint.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigurationError::Missing {
                        component: "embedding service",
                        key: "embedding.endpoint",
                    });
                }
                if embedding.api_key.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigurationError::Missing {
                        component: "embedding service",
                        key: "embedding.api_key",
                    });
                }
            }
        }
        if let Some(generation) = &self.generation
            && generation.api_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigurationError::Missing {
                component: "generation",
                key: "generation.api_key",
            });
        }
        Ok(())
    }
}
