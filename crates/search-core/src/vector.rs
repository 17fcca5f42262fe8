use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use common::TransactionRecord;
use common::config::VectorSettings;
use qdrant_client::{
    Payload, Qdrant,
    qdrant::{
        CreateCollection, CreateCollectionBuilder, Distance, HnswConfigDiffBuilder, PointStruct,
        QuantizationType, QueryPointsBuilder, ScalarQuantizationBuilder, UpsertPointsBuilder,
        Value as QdrantValue, VectorParamsBuilder, value::Kind,
    },
};

use crate::error::MalformedPayload;
use crate::fingerprint::fingerprint;

/// A record returned by nearest-neighbour search with its cosine distance
/// (0 is identical, 2 is opposite).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: TransactionRecord,
    pub distance: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `limit` records, ascending by cosine distance to `query`.
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSearchConfig {
    pub collection: String,
    pub distance: Distance,
    pub hnsw_m: u64,
    pub hnsw_ef_construct: u64,
    pub vector_dim: usize,
}

impl Default for VectorSearchConfig {
    fn default() -> Self {
        Self {
            collection: "ledger_transactions".to_string(),
            distance: Distance::Cosine,
            hnsw_m: 16,
            hnsw_ef_construct: 100,
            vector_dim: 1536,
        }
    }
}

impl VectorSearchConfig {
    pub fn for_collection(collection: &str, vector_dim: usize) -> Self {
        Self {
            collection: collection.to_string(),
            vector_dim,
            ..Self::default()
        }
    }

    /// Collection with the configured HNSW graph and int8 scalar quantization.
    pub fn create_collection_request(&self) -> CreateCollection {
        CreateCollectionBuilder::new(self.collection.clone())
            .vectors_config(VectorParamsBuilder::new(self.vector_dim as u64, self.distance))
            .hnsw_config(
                HnswConfigDiffBuilder::default()
                    .m(self.hnsw_m)
                    .ef_construct(self.hnsw_ef_construct),
            )
            .quantization_config(
                ScalarQuantizationBuilder::default().r#type(QuantizationType::Int8.into()),
            )
            .into()
    }
}

pub struct QdrantVectorStore {
    client: Qdrant,
    config: VectorSearchConfig,
}

impl QdrantVectorStore {
    pub fn new(client: Qdrant, config: VectorSearchConfig) -> Self {
        Self { client, config }
    }

    pub fn from_settings(settings: &VectorSettings, vector_dim: usize) -> Result<Self> {
        let client = Qdrant::from_url(&settings.url)
            .api_key(settings.api_key.clone())
            .build()
            .with_context(|| format!("failed to build qdrant client for {}", settings.url))?;
        Ok(Self::new(
            client,
            VectorSearchConfig::for_collection(&settings.collection, vector_dim),
        ))
    }

    pub const fn config(&self) -> &VectorSearchConfig {
        &self.config
    }

    pub async fn ensure_collection(&self) -> Result<()> {
        let request = self.config.create_collection_request();
        if let Err(err) = self.client.create_collection(request).await {
            let msg = err.to_string().to_lowercase();
            if !msg.contains("already exists") {
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Upserts records keyed by fingerprint, so reloading the same ledger
    /// overwrites points instead of duplicating them.
    pub async fn upsert_records(
        &self,
        records: &[TransactionRecord],
        vectors: &[Vec<f32>],
    ) -> Result<usize> {
        if records.len() != vectors.len() {
            return Err(anyhow!(
                "{} records but {} vectors to upsert",
                records.len(),
                vectors.len()
            ));
        }
        let mut points = Vec::with_capacity(records.len());
        for (record, vector) in records.iter().zip(vectors) {
            let payload = Payload::try_from(serde_json::to_value(record)?)
                .context("transaction record is not a valid qdrant payload")?;
            points.push(PointStruct::new(
                fingerprint(record).as_u64(),
                vector.clone(),
                payload,
            ));
        }
        let count = points.len();
        if count == 0 {
            return Ok(0);
        }

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(self.config.collection.clone(), points).wait(true),
            )
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorStore {
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let response = self
            .client
            .query(
                QueryPointsBuilder::new(self.config.collection.clone())
                    .query(query.to_vec())
                    .limit(limit as u64)
                    .with_payload(true),
            )
            .await?;

        let mut out = Vec::with_capacity(response.result.len());
        for point in response.result {
            let record = record_from_payload(point.payload)?;
            out.push(ScoredRecord {
                record,
                distance: 1.0 - point.score,
            });
        }
        Ok(out)
    }
}

fn record_from_payload(payload: HashMap<String, QdrantValue>) -> Result<TransactionRecord> {
    let object = payload
        .into_iter()
        .map(|(key, value)| (key, value_to_json(value)))
        .collect::<serde_json::Map<_, _>>();
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|err| {
        MalformedPayload(format!("qdrant payload does not describe a transaction record: {err}"))
            .into()
    })
}

fn value_to_json(value: QdrantValue) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(v)) => serde_json::Value::Bool(v),
        Some(Kind::IntegerValue(v)) => serde_json::Value::from(v),
        Some(Kind::DoubleValue(v)) => serde_json::Number::from_f64(v)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Kind::StringValue(v)) => serde_json::Value::String(v),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields
                .into_iter()
                .map(|(key, value)| (key, value_to_json(value)))
                .collect(),
        ),
    }
}

/// Brute-force index for offline runs and tests.
#[derive(Default)]
pub struct MemoryVectorIndex {
    entries: Vec<(TransactionRecord, Vec<f32>)>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: TransactionRecord, vector: Vec<f32>) {
        self.entries.push((record, vector));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let mut scored = self
            .entries
            .iter()
            .map(|(record, vector)| ScoredRecord {
                record: record.clone(),
                distance: cosine_distance(query, vector),
            })
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
