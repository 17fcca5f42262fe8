use std::fmt;

use common::{TransactionRecord, normalize_counterparty_id};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest. 64 bits: collisions are
/// possible on large ledgers and are not disambiguated.
pub const FINGERPRINT_HEX_LEN: usize = 16;

/// Identity of a transaction across backends that share no primary key.
///
/// Derived from subject name, counterparty id, amount and date only, so two
/// backends returning the same payment with different descriptions (or one of
/// them without a description) still collapse to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        u64::from_str_radix(&value, 16).map(Self)
    }
}

/// Canonical `subject|counterparty_id|amount|date` key. Missing fields become
/// empty strings, amounts always carry two decimals and the counterparty id is
/// compared digits-only.
pub fn canonical_key(record: &TransactionRecord) -> String {
    let counterparty = record
        .counterparty_id
        .as_deref()
        .map(normalize_counterparty_id)
        .unwrap_or_default();
    let amount = record
        .amount
        .map(|value| format!("{value:.2}"))
        .unwrap_or_default();
    let date = record
        .occurred_on
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    [
        record.subject_name.as_deref().unwrap_or_default(),
        counterparty.as_str(),
        amount.as_str(),
        date.as_str(),
    ]
    .join("|")
}

pub fn fingerprint(record: &TransactionRecord) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_key(record).as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..FINGERPRINT_HEX_LEN / 2]);
    Fingerprint(u64::from_be_bytes(prefix))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use common::TransactionRecord;
    use sha2::{Digest, Sha256};

    use super::{FINGERPRINT_HEX_LEN, Fingerprint, canonical_key, fingerprint};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn sample() -> TransactionRecord {
        TransactionRecord::payment(
            "Ana Souza",
            "12345678000190",
            "Locadora Premium",
            "car rental",
            1500.0,
            day(2024, 3, 5),
        )
    }

    #[test]
    fn fingerprint_is_stable_hex_prefix_of_sha256() {
        let record = sample();
        assert_eq!(
            canonical_key(&record),
            "Ana Souza|12345678000190|1500.00|2024-03-05"
        );
        let mut hasher = Sha256::new();
        hasher.update(b"Ana Souza|12345678000190|1500.00|2024-03-05");
        let full = format!("{:x}", hasher.finalize());
        assert_eq!(
            fingerprint(&record).to_string(),
            full[..FINGERPRINT_HEX_LEN].to_string()
        );
    }

    #[test]
    fn description_and_names_do_not_change_identity() {
        let a = sample();
        let mut b = sample();
        b.description = None;
        b.counterparty_name = Some("LOCADORA PREMIUM LTDA".to_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn amount_or_date_changes_identity() {
        let base = sample();
        let mut other_amount = sample();
        other_amount.amount = Some(1500.01);
        let mut other_date = sample();
        other_date.occurred_on = Some(day(2024, 3, 6));
        assert_ne!(fingerprint(&base), fingerprint(&other_amount));
        assert_ne!(fingerprint(&base), fingerprint(&other_date));
    }

    #[test]
    fn formatted_counterparty_id_matches_digits_only() {
        let mut formatted = sample();
        formatted.counterparty_id = Some("12.345.678/0001-90".to_string());
        assert_eq!(fingerprint(&formatted), fingerprint(&sample()));
    }

    #[test]
    fn missing_fields_are_coerced_not_rejected() {
        let empty = TransactionRecord::default();
        assert_eq!(canonical_key(&empty), "|||");
        assert_eq!(fingerprint(&empty), fingerprint(&TransactionRecord::default()));
    }

    #[test]
    fn serializes_as_fixed_width_hex() {
        let fp = fingerprint(&sample());
        let json = serde_json::to_string(&fp).expect("serialize");
        assert_eq!(json.len(), FINGERPRINT_HEX_LEN + 2);
        let back: Fingerprint = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, fp);
    }
}
