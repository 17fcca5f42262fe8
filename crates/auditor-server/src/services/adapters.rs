use std::sync::Arc;

use common::{AdapterError, Backend, GraphPattern, TransactionRecord};
use embeddings::EmbeddingEngine;
use search_core::{GraphStore, MalformedPayload, TransactionStore, VectorIndex};

/// Subject and counterparty lookups against the relational ledger.
pub struct LexicalAdapter {
    store: Arc<dyn TransactionStore>,
    limit: usize,
}

impl LexicalAdapter {
    pub fn new(store: Arc<dyn TransactionStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub async fn by_subject(&self, subject: &str) -> Result<Vec<TransactionRecord>, AdapterError> {
        self.store
            .find_by_subject(subject, self.limit)
            .await
            .map_err(|err| backend_error(Backend::Relational, &err))
    }

    pub async fn by_counterparty(
        &self,
        counterparty_id: &str,
    ) -> Result<Vec<TransactionRecord>, AdapterError> {
        self.store
            .find_by_counterparty(counterparty_id, self.limit)
            .await
            .map_err(|err| backend_error(Backend::Relational, &err))
    }
}

/// Embeds the question, then asks the vector index for its nearest records.
pub struct SemanticAdapter {
    embedder: Arc<EmbeddingEngine>,
    index: Arc<dyn VectorIndex>,
    limit: usize,
}

impl SemanticAdapter {
    pub fn new(embedder: Arc<EmbeddingEngine>, index: Arc<dyn VectorIndex>, limit: usize) -> Self {
        Self {
            embedder,
            index,
            limit,
        }
    }

    pub async fn search(&self, question: &str) -> Result<Vec<TransactionRecord>, AdapterError> {
        let query = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|err| AdapterError::Embedding(format!("{err:#}")))?;
        let expected = self.embedder.vector_dim();
        if query.len() != expected {
            return Err(AdapterError::malformed(
                Backend::Embedding,
                format!("expected a {expected}-dimension vector, got {}", query.len()),
            ));
        }

        let hits = self
            .index
            .nearest(&query, self.limit)
            .await
            .map_err(|err| backend_error(Backend::Vector, &err))?;
        Ok(hits.into_iter().map(|hit| hit.record).collect())
    }
}

pub struct GraphPatternAdapter {
    store: Arc<dyn GraphStore>,
    limit: usize,
}

impl GraphPatternAdapter {
    pub fn new(store: Arc<dyn GraphStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub async fn search(
        &self,
        pattern: &GraphPattern,
    ) -> Result<Vec<TransactionRecord>, AdapterError> {
        self.store
            .match_pattern(pattern.mode, &pattern.param, self.limit)
            .await
            .map_err(|err| backend_error(Backend::Graph, &err))
    }
}

/// Undecodable rows are `Malformed`; anything else means the backend could
/// not be reached or refused the query.
fn backend_error(backend: Backend, err: &anyhow::Error) -> AdapterError {
    match err.downcast_ref::<MalformedPayload>() {
        Some(malformed) => AdapterError::malformed(backend, malformed.to_string()),
        None => AdapterError::unreachable(backend, err),
    }
}
