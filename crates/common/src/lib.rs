pub mod config;
pub mod error;

use chrono::NaiveDate;
use schemars::JsonSchema;
use schemars::Schema;
use serde::{Deserialize, Serialize};

pub use config::AppConfig;
pub use error::{AdapterError, Backend, ConfigurationError};

/// One expense/payment event, or an aggregate of several when it comes from a
/// graph fan-in/fan-out pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TransactionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_transactions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
}

impl TransactionRecord {
    pub fn payment(
        subject_name: &str,
        counterparty_id: &str,
        counterparty_name: &str,
        description: &str,
        amount: f64,
        occurred_on: NaiveDate,
    ) -> Self {
        Self {
            subject_name: Some(subject_name.to_string()),
            counterparty_id: Some(counterparty_id.to_string()),
            counterparty_name: Some(counterparty_name.to_string()),
            description: Some(description.to_string()),
            amount: Some(amount),
            occurred_on: Some(occurred_on),
            num_transactions: None,
            total_amount: None,
        }
    }

    pub const fn is_aggregate(&self) -> bool {
        self.num_transactions.is_some() || self.total_amount.is_some()
    }
}

/// Counterparty identifiers are compared digits-only ("12.345.678/0001-90"
/// and "12345678000190" are the same company). Identifiers without any digit
/// are kept as trimmed text.
pub fn normalize_counterparty_id(raw: &str) -> String {
    let digits = raw
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.is_empty() {
        raw.trim().to_string()
    } else {
        digits
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GraphPatternMode {
    CounterpartyFanin,
    SubjectFanout,
    AmountThreshold,
}

impl GraphPatternMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CounterpartyFanin => "counterparty_fanin",
            Self::SubjectFanout => "subject_fanout",
            Self::AmountThreshold => "amount_threshold",
        }
    }
}

impl std::str::FromStr for GraphPatternMode {
    type Err = ConfigurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "counterparty_fanin" => Ok(Self::CounterpartyFanin),
            "subject_fanout" => Ok(Self::SubjectFanout),
            "amount_threshold" => Ok(Self::AmountThreshold),
            other => Err(ConfigurationError::InvalidStrategy {
                message: format!(
                    "unknown graph pattern mode `{other}`; expected counterparty_fanin, subject_fanout or amount_threshold"
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum PatternParam {
    Number(f64),
    Text(String),
}

impl PatternParam {
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.trim().to_string(),
        }
    }

    pub fn as_amount(&self) -> Option<f64> {
        let amount = match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<f64>().ok(),
        };
        amount.filter(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GraphPattern {
    pub mode: GraphPatternMode,
    pub param: PatternParam,
}

/// Which adapters a request runs. Every block is independently optional; an
/// empty config means semantic search alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct StrategyConfig {
    #[serde(default, alias = "lexicalBySubject")]
    pub lexical_by_subject: Option<String>,
    #[serde(default, alias = "lexicalByCounterparty")]
    pub lexical_by_counterparty: Option<String>,
    #[serde(default)]
    pub semantic: bool,
    #[serde(default, alias = "graphPattern")]
    pub graph_pattern: Option<GraphPattern>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    LexicalBySubject(String),
    LexicalByCounterparty(String),
    Semantic,
    GraphPattern(GraphPattern),
}

impl Strategy {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::LexicalBySubject(_) => "lexical_by_subject",
            Self::LexicalByCounterparty(_) => "lexical_by_counterparty",
            Self::Semantic => "semantic",
            Self::GraphPattern(_) => "graph_pattern",
        }
    }
}

impl StrategyConfig {
    pub fn semantic_only() -> Self {
        Self {
            semantic: true,
            ..Self::default()
        }
    }

    /// Strategies in invocation order. This order decides which adapter's
    /// record wins when two adapters return the same transaction.
    pub fn plan(&self) -> Vec<Strategy> {
        let mut plan = Vec::new();
        if let Some(subject) = &self.lexical_by_subject {
            plan.push(Strategy::LexicalBySubject(subject.clone()));
        }
        if let Some(counterparty) = &self.lexical_by_counterparty {
            plan.push(Strategy::LexicalByCounterparty(counterparty.clone()));
        }
        if self.semantic {
            plan.push(Strategy::Semantic);
        }
        if let Some(pattern) = &self.graph_pattern {
            plan.push(Strategy::GraphPattern(pattern.clone()));
        }
        if plan.is_empty() {
            plan.push(Strategy::Semantic);
        }
        plan
    }
}

/// Up to `top_n` records in relevance order, or the explicit no-data sentinel.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum RetrievalResult {
    NoData,
    Records(Vec<TransactionRecord>),
}

impl RetrievalResult {
    pub fn from_records(records: Vec<TransactionRecord>) -> Self {
        if records.is_empty() {
            Self::NoData
        } else {
            Self::Records(records)
        }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        match self {
            Self::NoData => &[],
            Self::Records(records) => records,
        }
    }

    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SourceReport {
    pub strategy: String,
    pub status: SourceStatus,
    pub records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RetrievalReport {
    pub result: RetrievalResult,
    pub sources: Vec<SourceReport>,
    pub fused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QuestionRequest {
    pub question: String,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RetrieveResponse {
    pub result: RetrievalResult,
    pub context: String,
    pub sources: Vec<SourceReport>,
    pub fused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AskResponse {
    pub answer: String,
    pub records: usize,
    pub generated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SchemaBundle {
    pub question_request: Schema,
    pub retrieve_response: Schema,
    pub ask_response: Schema,
}

pub fn schema_bundle() -> SchemaBundle {
    SchemaBundle {
        question_request: schemars::schema_for!(QuestionRequest),
        retrieve_response: schemars::schema_for!(RetrieveResponse),
        ask_response: schemars::schema_for!(AskResponse),
    }
}
