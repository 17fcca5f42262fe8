use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use anyhow::Context;
use common::{
    AdapterError, AppConfig, Backend, ConfigurationError, GraphPatternMode, RetrievalReport,
    RetrievalResult, SourceReport, SourceStatus, Strategy, StrategyConfig, TransactionRecord,
};
use embeddings::{EmbeddingConfig, EmbeddingEngine};
use search_core::{
    Fingerprint, GraphStore, LedgerGraph, QdrantVectorStore, RetrievalDefaults, TantivyLedgerIndex,
    TransactionStore, VectorIndex, fingerprint, rrf_fuse,
};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::services::adapters::{GraphPatternAdapter, LexicalAdapter, SemanticAdapter};

#[derive(Clone, Default)]
struct Adapters {
    lexical: Option<Arc<LexicalAdapter>>,
    semantic: Option<Arc<SemanticAdapter>>,
    graph: Option<Arc<GraphPatternAdapter>>,
}

/// Fans one question out to the configured adapters, deduplicates what comes
/// back by fingerprint and fuses the per-adapter rankings.
#[derive(Clone)]
pub struct Orchestrator {
    adapters: Adapters,
    defaults: RetrievalDefaults,
}

type Outcome = Result<Vec<TransactionRecord>, AdapterError>;

impl Orchestrator {
    pub fn new(defaults: RetrievalDefaults) -> Self {
        Self {
            adapters: Adapters::default(),
            defaults,
        }
    }

    #[must_use]
    pub fn with_lexical(mut self, store: Arc<dyn TransactionStore>) -> Self {
        self.adapters.lexical = Some(Arc::new(LexicalAdapter::new(
            store,
            self.defaults.adapter_limit,
        )));
        self
    }

    #[must_use]
    pub fn with_semantic(
        mut self,
        embedder: Arc<EmbeddingEngine>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        self.adapters.semantic = Some(Arc::new(SemanticAdapter::new(
            embedder,
            index,
            self.defaults.adapter_limit,
        )));
        self
    }

    #[must_use]
    pub fn with_graph(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.adapters.graph = Some(Arc::new(GraphPatternAdapter::new(
            store,
            self.defaults.adapter_limit,
        )));
        self
    }

    /// Wires every backend the configuration names. Absent sections leave the
    /// matching strategy unavailable; they are not an error until requested.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let mut orchestrator = Self::new(RetrievalDefaults::from(&config.retrieval));

        if let Some(relational) = &config.relational {
            let index = TantivyLedgerIndex::open_for_search(Path::new(&relational.index_dir))
                .with_context(|| format!("failed opening ledger index {}", relational.index_dir))?;
            orchestrator = orchestrator.with_lexical(Arc::new(index));
        }
        if let Some(graph) = &config.graph {
            let ledger = LedgerGraph::load_snapshot(Path::new(&graph.snapshot_path))?;
            orchestrator = orchestrator.with_graph(Arc::new(ledger));
        }
        if let (Some(vector), Some(embedding)) = (&config.vector, &config.embedding) {
            let engine = EmbeddingEngine::new(EmbeddingConfig::from(embedding));
            let store = QdrantVectorStore::from_settings(vector, engine.vector_dim())?;
            orchestrator = orchestrator.with_semantic(Arc::new(engine), Arc::new(store));
        }
        Ok(orchestrator)
    }

    pub const fn defaults(&self) -> &RetrievalDefaults {
        &self.defaults
    }

    pub async fn retrieve(
        &self,
        question: &str,
        strategy: &StrategyConfig,
    ) -> Result<RetrievalResult, ConfigurationError> {
        Ok(self.retrieve_with_report(question, strategy).await?.result)
    }

    /// Dropping the returned future aborts every in-flight adapter call.
    pub async fn retrieve_with_report(
        &self,
        question: &str,
        strategy: &StrategyConfig,
    ) -> Result<RetrievalReport, ConfigurationError> {
        let plan = self.validate(question, strategy)?;
        let started = Instant::now();
        let outcomes = self.fan_out(question, &plan).await;

        let mut registry: Vec<Option<TransactionRecord>> = Vec::new();
        let mut position: AHashMap<Fingerprint, usize> = AHashMap::new();
        let mut ranked: Vec<Vec<Fingerprint>> = Vec::new();
        let mut sources = Vec::with_capacity(plan.len());

        for (step, outcome) in plan.iter().zip(outcomes) {
            match outcome {
                Ok(records) => {
                    sources.push(SourceReport {
                        strategy: step.label().to_string(),
                        status: SourceStatus::Ok,
                        records: records.len(),
                        error: None,
                    });
                    let mut list = Vec::with_capacity(records.len());
                    let mut seen = AHashSet::with_capacity(records.len());
                    for record in records {
                        let key = fingerprint(&record);
                        if !seen.insert(key) {
                            continue;
                        }
                        list.push(key);
                        position.entry(key).or_insert_with(|| {
                            registry.push(Some(record));
                            registry.len() - 1
                        });
                    }
                    if !list.is_empty() {
                        ranked.push(list);
                    }
                }
                Err(err) => {
                    warn!(
                        adapter = backend_for(step).as_str(),
                        strategy = step.label(),
                        error = %err,
                        "adapter failed, continuing without its results"
                    );
                    metrics::counter!("auditor_adapter_failures_total", "adapter" => step.label())
                        .increment(1);
                    sources.push(SourceReport {
                        strategy: step.label().to_string(),
                        status: if err.is_timeout() {
                            SourceStatus::TimedOut
                        } else {
                            SourceStatus::Failed
                        },
                        records: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let fused = ranked.len() > 1;
        let mut order = if fused {
            rrf_fuse(&ranked, self.defaults.rrf_k)
                .into_iter()
                .map(|scored| scored.id)
                .collect::<Vec<_>>()
        } else {
            ranked.pop().unwrap_or_default()
        };
        order.truncate(self.defaults.top_n);

        let records = order
            .iter()
            .filter_map(|key| position.get(key).and_then(|&idx| registry[idx].take()))
            .collect::<Vec<_>>();
        let result = RetrievalResult::from_records(records);
        if result.is_no_data() {
            metrics::counter!("auditor_retrieval_no_data_total").increment(1);
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        metrics::histogram!("auditor_retrieve_latency_ms").record(elapsed_ms);
        info!(
            sources = sources.len(),
            fused,
            records = result.records().len(),
            elapsed_ms,
            "retrieval_complete"
        );

        Ok(RetrievalReport {
            result,
            sources,
            fused,
        })
    }

    fn validate(
        &self,
        question: &str,
        strategy: &StrategyConfig,
    ) -> Result<Vec<Strategy>, ConfigurationError> {
        let plan = strategy.plan();
        for step in &plan {
            let available = match step {
                Strategy::LexicalBySubject(subject) => {
                    require_text(subject, "lexical_by_subject needs a subject name")?;
                    self.adapters.lexical.is_some()
                }
                Strategy::LexicalByCounterparty(id) => {
                    require_text(id, "lexical_by_counterparty needs a counterparty id")?;
                    self.adapters.lexical.is_some()
                }
                Strategy::Semantic => {
                    require_text(question, "semantic search needs a non-empty question")?;
                    self.adapters.semantic.is_some()
                }
                Strategy::GraphPattern(pattern) => {
                    match pattern.mode {
                        GraphPatternMode::AmountThreshold => {
                            if pattern.param.as_amount().is_none() {
                                return Err(ConfigurationError::InvalidStrategy {
                                    message: format!(
                                        "amount_threshold needs a numeric parameter, got `{}`",
                                        pattern.param.as_text()
                                    ),
                                });
                            }
                        }
                        GraphPatternMode::CounterpartyFanin | GraphPatternMode::SubjectFanout => {
                            require_text(
                                &pattern.param.as_text(),
                                "graph pattern needs a non-empty parameter",
                            )?;
                        }
                    }
                    self.adapters.graph.is_some()
                }
            };
            if !available {
                return Err(ConfigurationError::StrategyUnavailable {
                    strategy: step.label(),
                    component: backend_for(step).as_str(),
                });
            }
        }
        Ok(plan)
    }

    /// Runs every step concurrently, each under its own timeout, and returns
    /// outcomes in plan order regardless of completion order.
    async fn fan_out(&self, question: &str, plan: &[Strategy]) -> Vec<Outcome> {
        let timeout = self.defaults.adapter_timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let question: Arc<str> = Arc::from(question);

        let mut tasks = JoinSet::new();
        for (slot, step) in plan.iter().cloned().enumerate() {
            let adapters = self.adapters.clone();
            let question = Arc::clone(&question);
            tasks.spawn(async move {
                let backend = backend_for(&step);
                let outcome = tokio::time::timeout(timeout, adapters.run(&step, &question))
                    .await
                    .unwrap_or(Err(AdapterError::Timeout {
                        backend,
                        timeout_ms,
                    }));
                (slot, outcome)
            });
        }

        let mut outcomes: Vec<Option<Outcome>> = vec![None; plan.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => outcomes[slot] = Some(outcome),
                Err(err) => warn!(error = %err, "adapter task did not complete"),
            }
        }

        outcomes
            .into_iter()
            .zip(plan)
            .map(|(outcome, step)| {
                outcome.unwrap_or_else(|| {
                    Err(AdapterError::Unreachable {
                        backend: backend_for(step),
                        message: "adapter task aborted".to_string(),
                    })
                })
            })
            .collect()
    }
}

impl Adapters {
    async fn run(&self, step: &Strategy, question: &str) -> Outcome {
        match step {
            Strategy::LexicalBySubject(subject) => match &self.lexical {
                Some(adapter) => adapter.by_subject(subject).await,
                None => Err(not_configured(Backend::Relational)),
            },
            Strategy::LexicalByCounterparty(id) => match &self.lexical {
                Some(adapter) => adapter.by_counterparty(id).await,
                None => Err(not_configured(Backend::Relational)),
            },
            Strategy::Semantic => match &self.semantic {
                Some(adapter) => adapter.search(question).await,
                None => Err(not_configured(Backend::Vector)),
            },
            Strategy::GraphPattern(pattern) => match &self.graph {
                Some(adapter) => adapter.search(pattern).await,
                None => Err(not_configured(Backend::Graph)),
            },
        }
    }
}

const fn backend_for(step: &Strategy) -> Backend {
    match step {
        Strategy::LexicalBySubject(_) | Strategy::LexicalByCounterparty(_) => Backend::Relational,
        Strategy::Semantic => Backend::Vector,
        Strategy::GraphPattern(_) => Backend::Graph,
    }
}

fn not_configured(backend: Backend) -> AdapterError {
    AdapterError::Unreachable {
        backend,
        message: "backend not configured".to_string(),
    }
}

fn require_text(value: &str, message: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::InvalidStrategy {
            message: message.to_string(),
        });
    }
    Ok(())
}
