use std::collections::HashSet;

use chrono::NaiveDate;
use common::TransactionRecord;
use proptest::prelude::*;
use search_core::{fingerprint, rrf_fuse};

fn ranked_lists() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(0u8..24, 0..12), 0..5)
}

fn record() -> impl Strategy<Value = TransactionRecord> {
    (
        "[A-Za-z ]{0,20}",
        "[0-9]{0,14}",
        0u32..5_000_000,
        0i64..3_000,
    )
        .prop_map(|(subject, cnpj, cents, days)| TransactionRecord {
            subject_name: Some(subject),
            counterparty_id: Some(cnpj),
            amount: Some(f64::from(cents) / 100.0),
            occurred_on: NaiveDate::from_ymd_opt(2018, 1, 1)
                .and_then(|d| d.checked_add_signed(chrono::Duration::days(days))),
            ..TransactionRecord::default()
        })
}

proptest! {
    #[test]
    fn fusion_is_a_pure_function(lists in ranked_lists(), k in 1usize..100) {
        prop_assert_eq!(rrf_fuse(&lists, k), rrf_fuse(&lists, k));
    }

    #[test]
    fn every_input_id_appears_exactly_once(lists in ranked_lists()) {
        let fused = rrf_fuse(&lists, 60);
        let expected = lists.iter().flatten().copied().collect::<HashSet<_>>();
        let got = fused.iter().map(|s| s.id).collect::<Vec<_>>();
        prop_assert_eq!(got.len(), expected.len());
        prop_assert_eq!(got.into_iter().collect::<HashSet<_>>(), expected);
    }

    #[test]
    fn scores_are_non_increasing_and_bounded(lists in ranked_lists(), k in 0usize..100) {
        let fused = rrf_fuse(&lists, k);
        let ceiling = lists.len() as f64 / (k as f64 + 1.0);
        for pair in fused.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
        for item in &fused {
            prop_assert!(item.score > 0.0);
            prop_assert!(item.score <= ceiling + 1e-12);
        }
    }

    #[test]
    fn another_list_containing_an_id_raises_its_score(
        lists in ranked_lists(),
        extra in prop::collection::vec(0u8..24, 1..12),
    ) {
        let target = extra[0];
        let before = rrf_fuse(&lists, 60)
            .into_iter()
            .find(|s| s.id == target)
            .map_or(0.0, |s| s.score);
        let mut grown = lists.clone();
        grown.push(extra);
        let after = rrf_fuse(&grown, 60)
            .into_iter()
            .find(|s| s.id == target)
            .map_or(0.0, |s| s.score);
        prop_assert!(after > before);
    }

    #[test]
    fn fingerprint_depends_only_on_identity_fields(mut rec in record(), note in ".{0,40}") {
        let first = fingerprint(&rec);
        rec.description = Some(note);
        rec.counterparty_name = None;
        prop_assert_eq!(first, fingerprint(&rec));
        prop_assert_eq!(first.to_string().len(), 16);
    }
}
