//! Property tests for the reconciliation engine.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use tributo_shared::types::Period;

use crate::cfdi::{Direction, DocumentType};

use super::engine::reconcile;
use super::types::{EntryKind, LedgerKey, LedgerRecord, Regime};

fn vat_strategy() -> impl Strategy<Value = Decimal> {
    (-50_000i64..200_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    // Spread accruals across three months so the period filter matters.
    (1u32..=3, 1u32..=28)
        .prop_map(|(m, d)| NaiveDate::from_ymd_opt(2025, m, d).expect("valid date"))
}

fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Issued), Just(Direction::Received)]
}

fn record_strategy() -> impl Strategy<Value = LedgerRecord> {
    (
        any::<u128>(),
        proptest::bool::ANY,
        direction_strategy(),
        date_strategy(),
        vat_strategy(),
    )
        .prop_map(|(id, deferred, direction, accrual_date, vat)| {
            let uuid = Uuid::from_u128(id);
            if deferred {
                // A settlement against some document outside the ledger:
                // still classifiable, accrues on its payment date.
                LedgerRecord {
                    key: LedgerKey { uuid, entry: 1 },
                    kind: EntryKind::Settlement,
                    direction,
                    doc_type: DocumentType::Pago,
                    regime: Some(Regime::Deferred),
                    accrual_date,
                    amount: vat,
                    vat,
                    related_uuid: Some(Uuid::from_u128(id.wrapping_add(1))),
                }
            } else {
                LedgerRecord {
                    key: LedgerKey { uuid, entry: 0 },
                    kind: EntryKind::Issuance,
                    direction,
                    doc_type: DocumentType::Ingreso,
                    regime: Some(Regime::Immediate),
                    accrual_date,
                    amount: vat,
                    vat,
                    related_uuid: None,
                }
            }
        })
}

fn ledger_strategy() -> impl Strategy<Value = Vec<LedgerRecord>> {
    proptest::collection::vec(record_strategy(), 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Permuting the input records yields an identical balance.
    #[test]
    fn prop_reconciliation_is_order_independent(
        (original, shuffled) in ledger_strategy()
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let period = Period::new(2025, 2).expect("valid period");
        let a = reconcile(&original, period).expect("classifiable ledger");
        let b = reconcile(&shuffled, period).expect("classifiable ledger");
        prop_assert_eq!(a.balance, b.balance);
        prop_assert_eq!(a.counted, b.counted);
        prop_assert_eq!(a.out_of_period, b.out_of_period);
    }

    /// Reconciling twice over the same input yields the same balance.
    #[test]
    fn prop_reconciliation_is_deterministic(records in ledger_strategy()) {
        let period = Period::new(2025, 1).expect("valid period");
        let a = reconcile(&records, period).expect("classifiable ledger");
        let b = reconcile(&records, period).expect("classifiable ledger");
        prop_assert_eq!(a.balance, b.balance);
    }

    /// The four sums account for exactly the in-period VAT, no more.
    #[test]
    fn prop_buckets_conserve_in_period_vat(records in ledger_strategy()) {
        let period = Period::new(2025, 2).expect("valid period");
        let outcome = reconcile(&records, period).expect("classifiable ledger");

        let expected_owed: Decimal = records
            .iter()
            .filter(|r| r.direction == Direction::Issued)
            .filter(|r| period.contains_date(r.accrual_date))
            .map(|r| r.vat)
            .sum();
        let expected_creditable: Decimal = records
            .iter()
            .filter(|r| r.direction == Direction::Received)
            .filter(|r| period.contains_date(r.accrual_date))
            .map(|r| r.vat)
            .sum();

        prop_assert_eq!(outcome.balance.owed(), expected_owed);
        prop_assert_eq!(outcome.balance.creditable(), expected_creditable);
    }

    /// Records accruing outside the target period never leak in.
    #[test]
    fn prop_out_of_period_records_do_not_accrue(records in ledger_strategy()) {
        // Reconcile against a period no generated date falls into.
        let period = Period::new(2026, 6).expect("valid period");
        let outcome = reconcile(&records, period).expect("classifiable ledger");
        prop_assert_eq!(outcome.balance.net(), Decimal::ZERO);
        prop_assert_eq!(outcome.counted, 0);
    }
}
