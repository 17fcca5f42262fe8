use std::path::Path;

use ahash::AHashMap;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use common::{GraphPatternMode, PatternParam, TransactionRecord, normalize_counterparty_id};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::{debug, warn};

/// Relationship queries over who paid whom.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn match_pattern(
        &self,
        mode: GraphPatternMode,
        param: &PatternParam,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerNode {
    Subject { name: String },
    Counterparty { id: String, name: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub occurred_on: Option<NaiveDate>,
}

/// Subjects and counterparties as nodes, one `Payment` edge per transaction
/// (subject -> counterparty).
#[derive(Debug, Default)]
pub struct LedgerGraph {
    graph: DiGraph<LedgerNode, Payment>,
    subjects: AHashMap<String, NodeIndex>,
    counterparties: AHashMap<String, NodeIndex>,
}

#[derive(Default)]
struct Tally {
    count: u64,
    total: f64,
}

impl LedgerGraph {
    pub fn from_records(records: &[TransactionRecord]) -> Self {
        let mut graph = Self::default();
        let mut skipped = 0usize;
        for record in records {
            if !graph.add_record(record) {
                skipped += 1;
            }
        }
        if skipped > 0 {
            debug!(skipped, "records without subject or counterparty left out of the graph");
        }
        graph
    }

    /// Builds the graph from a JSON array of records. A missing snapshot is an
    /// empty graph, not an error.
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "graph snapshot not found, starting with an empty graph");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading graph snapshot {}", path.display()))?;
        let records = serde_json::from_str::<Vec<TransactionRecord>>(&raw)
            .with_context(|| format!("graph snapshot {} is malformed", path.display()))?;
        Ok(Self::from_records(&records))
    }

    pub fn save_snapshot(records: &[TransactionRecord], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(records)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed writing graph snapshot {}", path.display()))
    }

    pub fn add_record(&mut self, record: &TransactionRecord) -> bool {
        let (Some(subject), Some(raw_id)) = (
            record.subject_name.as_deref(),
            record.counterparty_id.as_deref(),
        ) else {
            return false;
        };
        let counterparty_id = normalize_counterparty_id(raw_id);
        if subject.trim().is_empty() || counterparty_id.is_empty() {
            return false;
        }

        let from = *self
            .subjects
            .entry(subject.to_string())
            .or_insert_with(|| {
                self.graph.add_node(LedgerNode::Subject {
                    name: subject.to_string(),
                })
            });
        let to = *self
            .counterparties
            .entry(counterparty_id.clone())
            .or_insert_with(|| {
                self.graph.add_node(LedgerNode::Counterparty {
                    id: counterparty_id.clone(),
                    name: record.counterparty_name.clone(),
                })
            });
        if let (Some(name), Some(LedgerNode::Counterparty { name: slot, .. })) =
            (&record.counterparty_name, self.graph.node_weight_mut(to))
            && slot.is_none()
        {
            *slot = Some(name.clone());
        }

        self.graph.add_edge(
            from,
            to,
            Payment {
                description: record.description.clone(),
                amount: record.amount,
                occurred_on: record.occurred_on,
            },
        );
        true
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn counterparty_count(&self) -> usize {
        self.counterparties.len()
    }

    pub fn payment_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Every subject that paid `counterparty_id`, aggregated per subject,
    /// largest total first.
    pub fn counterparty_fanin(&self, counterparty_id: &str, limit: usize) -> Vec<TransactionRecord> {
        let Some(&target) = self
            .counterparties
            .get(&normalize_counterparty_id(counterparty_id))
        else {
            return Vec::new();
        };

        let mut tallies: AHashMap<NodeIndex, Tally> = AHashMap::new();
        for edge in self.graph.edges_directed(target, Direction::Incoming) {
            let tally = tallies.entry(edge.source()).or_default();
            tally.count += 1;
            tally.total += edge.weight().amount.unwrap_or_default();
        }

        let rows = tallies
            .into_iter()
            .map(|(subject, tally)| self.aggregate(subject, target, &tally))
            .collect();
        by_total_desc(rows, limit)
    }

    /// Counterparties paid by any subject whose name contains `needle`
    /// (case-insensitive), aggregated per (subject, counterparty).
    pub fn subject_fanout(&self, needle: &str, limit: usize) -> Vec<TransactionRecord> {
        let needle = needle.trim().to_lowercase();
        let mut tallies: AHashMap<(NodeIndex, NodeIndex), Tally> = AHashMap::new();
        for (name, &subject) in &self.subjects {
            if !name.to_lowercase().contains(&needle) {
                continue;
            }
            for edge in self.graph.edges_directed(subject, Direction::Outgoing) {
                let tally = tallies.entry((subject, edge.target())).or_default();
                tally.count += 1;
                tally.total += edge.weight().amount.unwrap_or_default();
            }
        }

        let rows = tallies
            .into_iter()
            .map(|((subject, counterparty), tally)| self.aggregate(subject, counterparty, &tally))
            .collect();
        by_total_desc(rows, limit)
    }

    /// Individual payments at or above `min_amount`, largest first.
    pub fn amount_threshold(&self, min_amount: f64, limit: usize) -> Vec<TransactionRecord> {
        let mut rows = self
            .graph
            .edge_references()
            .filter(|edge| edge.weight().amount.is_some_and(|amount| amount >= min_amount))
            .map(|edge| {
                let mut record = self.endpoints(edge.source(), edge.target());
                let payment = edge.weight();
                record.description.clone_from(&payment.description);
                record.amount = payment.amount;
                record.occurred_on = payment.occurred_on;
                record
            })
            .collect::<Vec<_>>();

        rows.sort_by(|a, b| {
            b.amount
                .unwrap_or_default()
                .total_cmp(&a.amount.unwrap_or_default())
                .then_with(|| b.occurred_on.cmp(&a.occurred_on))
                .then_with(|| a.subject_name.cmp(&b.subject_name))
                .then_with(|| a.counterparty_id.cmp(&b.counterparty_id))
        });
        rows.truncate(limit);
        rows
    }

    fn endpoints(&self, subject: NodeIndex, counterparty: NodeIndex) -> TransactionRecord {
        let mut record = TransactionRecord::default();
        if let Some(LedgerNode::Subject { name }) = self.graph.node_weight(subject) {
            record.subject_name = Some(name.clone());
        }
        if let Some(LedgerNode::Counterparty { id, name }) = self.graph.node_weight(counterparty) {
            record.counterparty_id = Some(id.clone());
            record.counterparty_name.clone_from(name);
        }
        record
    }

    fn aggregate(&self, subject: NodeIndex, counterparty: NodeIndex, tally: &Tally) -> TransactionRecord {
        let mut record = self.endpoints(subject, counterparty);
        record.num_transactions = Some(tally.count);
        record.total_amount = Some(tally.total);
        record
    }
}

fn by_total_desc(mut rows: Vec<TransactionRecord>, limit: usize) -> Vec<TransactionRecord> {
    rows.sort_by(|a, b| {
        b.total_amount
            .unwrap_or_default()
            .total_cmp(&a.total_amount.unwrap_or_default())
            .then_with(|| a.subject_name.cmp(&b.subject_name))
            .then_with(|| a.counterparty_id.cmp(&b.counterparty_id))
    });
    rows.truncate(limit);
    rows
}

#[async_trait]
impl GraphStore for LedgerGraph {
    async fn match_pattern(
        &self,
        mode: GraphPatternMode,
        param: &PatternParam,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = match mode {
            GraphPatternMode::CounterpartyFanin => self.counterparty_fanin(&param.as_text(), limit),
            GraphPatternMode::SubjectFanout => self.subject_fanout(&param.as_text(), limit),
            GraphPatternMode::AmountThreshold => {
                let min_amount = param
                    .as_amount()
                    .ok_or_else(|| anyhow!("amount_threshold needs a numeric parameter"))?;
                self.amount_threshold(min_amount, limit)
            }
        };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use common::{GraphPatternMode, PatternParam, TransactionRecord};

    use super::{GraphStore, LedgerGraph};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).expect("valid date")
    }

    fn ledger() -> LedgerGraph {
        LedgerGraph::from_records(&[
            TransactionRecord::payment("Ana Lima", "11.111.111/0001-11", "Posto Sol", "fuel", 300.0, day(1)),
            TransactionRecord::payment("Ana Lima", "11111111000111", "Posto Sol", "fuel", 200.0, day(2)),
            TransactionRecord::payment("Bruno Reis", "11111111000111", "Posto Sol", "fuel", 900.0, day(3)),
            TransactionRecord::payment("Ana Lima", "22222222000122", "Hotel Mar", "lodging", 1200.0, day(4)),
            TransactionRecord::payment("Carla Dias", "22222222000122", "Hotel Mar", "lodging", 1200.0, day(5)),
        ])
    }

    #[test]
    fn builds_nodes_per_subject_and_normalized_counterparty() {
        let graph = ledger();
        assert_eq!(graph.subject_count(), 3);
        assert_eq!(graph.counterparty_count(), 2);
        assert_eq!(graph.payment_count(), 5);
    }

    #[test]
    fn fanin_aggregates_per_subject_by_total_desc() {
        let rows = ledger().counterparty_fanin("11111111000111", 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].subject_name.as_deref(), Some("Bruno Reis"));
        assert_eq!(rows[0].total_amount, Some(900.0));
        assert_eq!(rows[0].num_transactions, Some(1));
        assert_eq!(rows[1].subject_name.as_deref(), Some("Ana Lima"));
        assert_eq!(rows[1].total_amount, Some(500.0));
        assert_eq!(rows[1].num_transactions, Some(2));
        assert_eq!(rows[1].counterparty_name.as_deref(), Some("Posto Sol"));
        assert!(rows.iter().all(TransactionRecord::is_aggregate));
    }

    #[test]
    fn fanout_matches_subject_substring_case_insensitively() {
        let rows = ledger().subject_fanout("ana", 10);
        let counterparties = rows
            .iter()
            .map(|r| r.counterparty_id.clone().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(counterparties, vec!["22222222000122", "11111111000111"]);
    }

    #[test]
    fn threshold_returns_individual_payments_largest_first() {
        let rows = ledger().amount_threshold(900.0, 10);
        let view = rows
            .iter()
            .map(|r| (r.subject_name.clone().unwrap_or_default(), r.amount))
            .collect::<Vec<_>>();
        assert_eq!(
            view,
            vec![
                ("Carla Dias".to_string(), Some(1200.0)),
                ("Ana Lima".to_string(), Some(1200.0)),
                ("Bruno Reis".to_string(), Some(900.0)),
            ]
        );
        assert!(rows.iter().all(|r| !r.is_aggregate()));
    }

    #[test]
    fn unknown_counterparty_yields_empty() {
        assert!(ledger().counterparty_fanin("999", 10).is_empty());
    }

    #[tokio::test]
    async fn match_pattern_rejects_non_numeric_threshold() {
        let graph = ledger();
        let err = graph
            .match_pattern(
                GraphPatternMode::AmountThreshold,
                &PatternParam::Text("a lot".to_string()),
                10,
            )
            .await;
        assert!(err.is_err());
        let ok = graph
            .match_pattern(GraphPatternMode::AmountThreshold, &PatternParam::Number(1000.0), 1)
            .await
            .expect("rows");
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn snapshot_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("records.json");
        assert_eq!(LedgerGraph::load_snapshot(&path).expect("empty").payment_count(), 0);

        let records = vec![TransactionRecord::payment("Ana", "1", "X", "y", 5.0, day(1))];
        LedgerGraph::save_snapshot(&records, &path).expect("save");
        let graph = LedgerGraph::load_snapshot(&path).expect("load");
        assert_eq!(graph.payment_count(), 1);
    }
}
