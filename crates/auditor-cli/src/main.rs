use std::path::{Path, PathBuf};

use anyhow::Context;
use auditor_server::services::context::render_result;
use auditor_server::services::generation::{self, AnswerGenerator, ChatCompletionsClient};
use auditor_server::services::retrieval::Orchestrator;
use clap::{Args, Parser, Subcommand};
use common::config::DEFAULT_CONFIG_FILE;
use common::{
    AppConfig, GraphPattern, GraphPatternMode, PatternParam, RetrieveResponse, StrategyConfig,
    TransactionRecord,
};
use embeddings::{EmbeddingConfig, EmbeddingEngine};
use search_core::{LedgerGraph, QdrantVectorStore, TantivyLedgerIndex};
use tracing::{info, warn};

const EMBED_BATCH: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "ledger-auditor")]
#[command(about = "Load a transaction ledger and question it across lexical, semantic and graph retrieval")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Index a JSON array of transaction records into every configured backend.
    Load {
        records: PathBuf,
        #[arg(long)]
        skip_vectors: bool,
    },
    /// Print the fused context for a question.
    Retrieve {
        question: String,
        #[command(flatten)]
        strategy: StrategyArgs,
        #[arg(long)]
        json: bool,
    },
    /// Retrieve and generate an auditor answer.
    Ask {
        question: String,
        #[command(flatten)]
        strategy: StrategyArgs,
    },
}

#[derive(Debug, Args)]
struct StrategyArgs {
    /// Substring of the subject name.
    #[arg(long)]
    subject: Option<String>,
    /// Counterparty identifier, punctuation optional.
    #[arg(long)]
    counterparty: Option<String>,
    /// Run semantic search alongside the other strategies.
    #[arg(long)]
    semantic: bool,
    #[arg(long, requires = "graph_param")]
    graph_mode: Option<GraphPatternMode>,
    #[arg(long, requires = "graph_mode")]
    graph_param: Option<String>,
}

impl StrategyArgs {
    fn into_config(self) -> StrategyConfig {
        let graph_pattern = match (self.graph_mode, self.graph_param) {
            (Some(mode), Some(param)) => Some(GraphPattern {
                mode,
                param: PatternParam::Text(param),
            }),
            _ => None,
        };
        StrategyConfig {
            lexical_by_subject: self.subject,
            lexical_by_counterparty: self.counterparty,
            semantic: self.semantic,
            graph_pattern,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Load {
            records,
            skip_vectors,
        } => load(&config, &records, skip_vectors).await,
        Commands::Retrieve {
            question,
            strategy,
            json,
        } => retrieve(&config, &question, &strategy.into_config(), json).await,
        Commands::Ask { question, strategy } => {
            ask(&config, &question, &strategy.into_config()).await
        }
    }
}

async fn load(config: &AppConfig, path: &Path, skip_vectors: bool) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading records file {}", path.display()))?;
    let records = serde_json::from_str::<Vec<TransactionRecord>>(&raw)
        .with_context(|| format!("records file {} is not a JSON array of transactions", path.display()))?;

    if let Some(relational) = &config.relational {
        let mut index = TantivyLedgerIndex::open_or_create_on_disk(Path::new(&relational.index_dir))?;
        index.reset()?;
        for record in &records {
            index.add_record(record)?;
        }
        index.commit()?;
        info!(records = index.num_records(), dir = %relational.index_dir, "ledger_index_written");
    }

    if let Some(graph) = &config.graph {
        LedgerGraph::save_snapshot(&records, Path::new(&graph.snapshot_path))?;
        let ledger = LedgerGraph::from_records(&records);
        info!(
            subjects = ledger.subject_count(),
            counterparties = ledger.counterparty_count(),
            payments = ledger.payment_count(),
            "graph_snapshot_written"
        );
    }

    let vectors = match (&config.vector, &config.embedding) {
        (Some(vector), Some(embedding)) if !skip_vectors => {
            let engine = EmbeddingEngine::new(EmbeddingConfig::from(embedding));
            let store = QdrantVectorStore::from_settings(vector, engine.vector_dim())?;
            store.ensure_collection().await?;
            let mut upserted = 0;
            for batch in records.chunks(EMBED_BATCH) {
                let inputs = batch.iter().map(embedding_text).collect::<Vec<_>>();
                let embedded = engine.embed_batch(&inputs).await?;
                upserted += store.upsert_records(batch, &embedded).await?;
            }
            upserted
        }
        (Some(_), None) if !skip_vectors => {
            warn!("vector store configured without [embedding], skipping vectors");
            0
        }
        _ => 0,
    };

    println!(
        "loaded {} records (vectors={vectors}) from {}",
        records.len(),
        path.display()
    );
    Ok(())
}

async fn retrieve(
    config: &AppConfig,
    question: &str,
    strategy: &StrategyConfig,
    json: bool,
) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let report = orchestrator.retrieve_with_report(question, strategy).await?;
    let context = render_result(&report.result);
    if json {
        let response = RetrieveResponse {
            result: report.result,
            context,
            sources: report.sources,
            fused: report.fused,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{context}");
    }
    Ok(())
}

async fn ask(config: &AppConfig, question: &str, strategy: &StrategyConfig) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let client = config
        .generation
        .as_ref()
        .map(ChatCompletionsClient::from_settings)
        .transpose()?;
    let answer = generation::answer(
        &orchestrator,
        client.as_ref().map(|c| c as &dyn AnswerGenerator),
        question,
        strategy,
    )
    .await?;
    println!("{}", answer.text);
    Ok(())
}

fn embedding_text(record: &TransactionRecord) -> String {
    match record.description.as_deref() {
        Some(description) if !description.trim().is_empty() => description.to_string(),
        _ => [
            record.subject_name.as_deref(),
            record.counterparty_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use common::{GraphPatternMode, PatternParam, TransactionRecord};

    use super::{StrategyArgs, embedding_text};

    #[test]
    fn strategy_flags_map_to_config() {
        let args = StrategyArgs {
            subject: Some("ana".to_string()),
            counterparty: None,
            semantic: false,
            graph_mode: Some(GraphPatternMode::AmountThreshold),
            graph_param: Some("1000".to_string()),
        };
        let config = args.into_config();
        assert_eq!(config.lexical_by_subject.as_deref(), Some("ana"));
        let pattern = config.graph_pattern.expect("graph pattern");
        assert_eq!(pattern.mode, GraphPatternMode::AmountThreshold);
        assert_eq!(pattern.param, PatternParam::Text("1000".to_string()));
    }

    #[test]
    fn embedding_text_falls_back_to_names() {
        let record = TransactionRecord {
            subject_name: Some("Ana Lima".to_string()),
            counterparty_name: Some("Posto Sol".to_string()),
            description: Some("  ".to_string()),
            ..TransactionRecord::default()
        };
        assert_eq!(embedding_text(&record), "Ana Lima Posto Sol");
    }
}
