use common::{RetrievalResult, TransactionRecord};

pub const NO_DATA_CONTEXT: &str = "no data found";
const UNKNOWN: &str = "unknown";

/// One numbered block per record. Identity and payment fields are always
/// printed (missing ones as `unknown`); aggregate lines only when present.
pub fn render(records: &[TransactionRecord]) -> String {
    if records.is_empty() {
        return NO_DATA_CONTEXT.to_string();
    }

    records
        .iter()
        .enumerate()
        .map(|(idx, record)| render_block(idx + 1, record))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_result(result: &RetrievalResult) -> String {
    render(result.records())
}

fn render_block(position: usize, record: &TransactionRecord) -> String {
    let date = record
        .occurred_on
        .map_or_else(|| UNKNOWN.to_string(), |d| d.format("%Y-%m-%d").to_string());
    let mut block = format!(
        "Transaction {position}:\n\
         - Subject: {}\n\
         - Counterparty: {}\n\
         - Counterparty ID: {}\n\
         - Description: {}\n\
         - Amount: {}\n\
         - Date: {date}\n",
        text(record.subject_name.as_deref()),
        text(record.counterparty_name.as_deref()),
        text(record.counterparty_id.as_deref()),
        text(record.description.as_deref()),
        money(record.amount),
    );
    if let Some(count) = record.num_transactions {
        block.push_str(&format!("- Transactions: {count}\n"));
    }
    if let Some(total) = record.total_amount {
        block.push_str(&format!("- Total amount: {total:.2}\n"));
    }
    block
}

fn text(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN,
    }
}

fn money(value: Option<f64>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |v| format!("{v:.2}"))
}
