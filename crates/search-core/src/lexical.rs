use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use common::{TransactionRecord, normalize_counterparty_id};
use tantivy::schema::Value;
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter, TantivyDocument, Term,
    collector::TopDocs,
    query::{Query, RegexQuery, TermQuery},
    schema::{Field, IndexRecordOption, STORED, STRING, Schema},
};

use crate::error::MalformedPayload;

/// Exact/substring lookups over the transaction ledger, newest first.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Case-insensitive substring match on the subject name.
    async fn find_by_subject(&self, needle: &str, limit: usize) -> Result<Vec<TransactionRecord>>;

    /// Exact match on the normalized counterparty identifier.
    async fn find_by_counterparty(
        &self,
        counterparty_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>>;
}

pub struct TantivyLedgerIndex {
    reader: IndexReader,
    writer: Option<IndexWriter>,
    fields: LedgerFields,
}

#[derive(Clone, Copy)]
struct LedgerFields {
    subject: Field,
    counterparty: Field,
    payload: Field,
}

impl TantivyLedgerIndex {
    pub fn new_in_memory() -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        from_index(&index, true)
    }

    /// Opens (creating when absent) an on-disk index with a writer attached.
    pub fn open_or_create_on_disk(index_dir: &Path) -> Result<Self> {
        from_index(&open_dir(index_dir)?, true)
    }

    /// Opens an on-disk index for searching only; no writer lock is taken.
    pub fn open_for_search(index_dir: &Path) -> Result<Self> {
        from_index(&open_dir(index_dir)?, false)
    }

    pub fn reset(&mut self) -> Result<()> {
        let writer = self.writer_mut()?;
        writer.delete_all_documents()?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn add_record(&mut self, record: &TransactionRecord) -> Result<()> {
        let fields = self.fields;
        let payload = serde_json::to_string(record)?;
        let mut doc = TantivyDocument::default();
        doc.add_text(
            fields.subject,
            record
                .subject_name
                .as_deref()
                .unwrap_or_default()
                .to_lowercase(),
        );
        doc.add_text(
            fields.counterparty,
            normalize_counterparty_id(record.counterparty_id.as_deref().unwrap_or_default()),
        );
        doc.add_text(fields.payload, payload);
        self.writer_mut()?.add_document(doc)?;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.writer_mut()?.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn search_subject(&self, needle: &str, limit: usize) -> Result<Vec<TransactionRecord>> {
        let pattern = format!(".*{}.*", regex::escape(&needle.trim().to_lowercase()));
        let query = RegexQuery::from_pattern(&pattern, self.fields.subject)
            .with_context(|| format!("invalid subject pattern: {needle}"))?;
        self.newest_first(&query, limit)
    }

    pub fn search_counterparty(
        &self,
        counterparty_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let term = Term::from_field_text(
            self.fields.counterparty,
            &normalize_counterparty_id(counterparty_id),
        );
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        self.newest_first(&query, limit)
    }

    pub fn num_records(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn newest_first(&self, query: &dyn Query, limit: usize) -> Result<Vec<TransactionRecord>> {
        let searcher = self.reader.searcher();
        let cap = usize::try_from(searcher.num_docs())
            .unwrap_or(usize::MAX)
            .max(1);
        let docs = searcher.search(query, &TopDocs::with_limit(cap))?;

        let mut rows: Vec<(DocAddress, TransactionRecord)> = Vec::with_capacity(docs.len());
        for (_, address) in docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let raw = doc
                .get_first(self.fields.payload)
                .and_then(|value| value.as_value().as_str().map(ToOwned::to_owned))
                .ok_or_else(|| {
                    MalformedPayload(format!("ledger document {address:?} has no payload"))
                })?;
            let record = serde_json::from_str::<TransactionRecord>(&raw).map_err(|err| {
                MalformedPayload(format!("ledger document {address:?} payload is malformed: {err}"))
            })?;
            rows.push((address, record));
        }

        rows.sort_by(|a, b| {
            b.1.occurred_on
                .cmp(&a.1.occurred_on)
                .then_with(|| a.0.cmp(&b.0))
        });
        rows.truncate(limit);
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }

    fn writer_mut(&mut self) -> Result<&mut IndexWriter> {
        self.writer
            .as_mut()
            .ok_or_else(|| anyhow!("ledger index was opened read-only"))
    }
}

#[async_trait]
impl TransactionStore for TantivyLedgerIndex {
    async fn find_by_subject(&self, needle: &str, limit: usize) -> Result<Vec<TransactionRecord>> {
        self.search_subject(needle, limit)
    }

    async fn find_by_counterparty(
        &self,
        counterparty_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        self.search_counterparty(counterparty_id, limit)
    }
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let _ = schema_builder.add_text_field("subject", STRING);
    let _ = schema_builder.add_text_field("counterparty", STRING);
    let _ = schema_builder.add_text_field("payload", STORED);
    schema_builder.build()
}

fn open_dir(index_dir: &Path) -> Result<Index> {
    std::fs::create_dir_all(index_dir)
        .with_context(|| format!("failed creating ledger index dir {}", index_dir.display()))?;
    let meta = index_dir.join("meta.json");
    let index = if meta.exists() {
        Index::open_in_dir(index_dir)?
    } else {
        Index::create_in_dir(index_dir, build_schema())?
    };
    Ok(index)
}

fn from_index(index: &Index, writable: bool) -> Result<TantivyLedgerIndex> {
    let schema = index.schema();
    let subject = schema.get_field("subject")?;
    let counterparty = schema.get_field("counterparty")?;
    let payload = schema.get_field("payload")?;

    let writer = if writable {
        Some(index.writer(50_000_000)?)
    } else {
        None
    };
    let reader = index.reader()?;
    Ok(TantivyLedgerIndex {
        reader,
        writer,
        fields: LedgerFields {
            subject,
            counterparty,
            payload,
        },
    })
}
