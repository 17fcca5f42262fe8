use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Raised before any backend is touched. Crosses the retrieval boundary as a hard failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("missing required setting `{key}` for {component}")]
    Missing {
        component: &'static str,
        key: &'static str,
    },
    #[error("invalid setting `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("strategy `{strategy}` requested but no {component} backend is configured")]
    StrategyUnavailable {
        strategy: &'static str,
        component: &'static str,
    },
    #[error("invalid strategy: {message}")]
    InvalidStrategy { message: String },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Relational,
    Vector,
    Graph,
    Embedding,
}

impl Backend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::Embedding => "embedding",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single backend failed. The orchestrator absorbs these and treats the
/// adapter's contribution as empty.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("{backend} backend unreachable: {message}")]
    Unreachable { backend: Backend, message: String },
    #[error("{backend} backend returned malformed data: {message}")]
    Malformed { backend: Backend, message: String },
    #[error("{backend} backend timed out after {timeout_ms}ms")]
    Timeout { backend: Backend, timeout_ms: u64 },
    #[error("embedding service failed: {0}")]
    Embedding(String),
}

impl AdapterError {
    pub fn unreachable(backend: Backend, err: &anyhow::Error) -> Self {
        Self::Unreachable {
            backend,
            message: format!("{err:#}"),
        }
    }

    pub fn malformed(backend: Backend, message: impl Into<String>) -> Self {
        Self::Malformed {
            backend,
            message: message.into(),
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{AdapterError, Backend, ConfigurationError};

    #[test]
    fn adapter_error_names_backend() {
        let err = AdapterError::unreachable(Backend::Graph, &anyhow::anyhow!("connection refused"));
        assert_eq!(
            err.to_string(),
            "graph backend unreachable: connection refused"
        );
        assert!(!err.is_timeout());
    }

    #[test]
    fn configuration_error_names_missing_key() {
        let err = ConfigurationError::Missing {
            component: "embedding",
            key: "api_key",
        };
        assert!(err.to_string().contains("`api_key`"));
    }
}
