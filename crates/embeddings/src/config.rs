use std::time::Duration;

use common::config::EmbeddingSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub vector_dim: usize,
    pub timeout: Duration,
    pub allow_pseudo_fallback: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from(&EmbeddingSettings::default())
    }
}

impl From<&EmbeddingSettings> for EmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone().filter(|e| !e.trim().is_empty()),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: settings.model.clone(),
            vector_dim: settings.dimension,
            timeout: Duration::from_millis(settings.timeout_ms.max(1)),
            allow_pseudo_fallback: settings.allow_pseudo,
        }
    }
}

impl EmbeddingConfig {
    /// Deterministic byte-folding vectors, for tests and offline development.
    pub fn pseudo(vector_dim: usize) -> Self {
        Self {
            vector_dim,
            allow_pseudo_fallback: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use common::config::EmbeddingSettings;

    use super::EmbeddingConfig;

    #[test]
    fn defaults_match_openai_small_model() {
        let cfg = EmbeddingConfig::default();
        assert_eq!(cfg.vector_dim, 1536);
        assert_eq!(cfg.model, "text-embedding-3-small");
        assert!(cfg.api_key.is_none());
        assert!(!cfg.allow_pseudo_fallback);
    }

    #[test]
    fn blank_credentials_are_treated_as_absent() {
        let cfg = EmbeddingConfig::from(&EmbeddingSettings {
            endpoint: Some("  ".to_string()),
            api_key: Some(String::new()),
            ..EmbeddingSettings::default()
        });
        assert!(cfg.endpoint.is_none());
        assert!(cfg.api_key.is_none());
    }
}
