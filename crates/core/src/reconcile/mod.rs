//! Reconciliation engine: from the unified ledger to a VAT balance.
//!
//! [`ledger::build_ledger`] merges flattened documents with their tax totals
//! into [`types::LedgerRecord`]s - the sole input to reconciliation - and
//! [`engine::reconcile`] partitions them by direction and settlement regime
//! to produce the period's [`types::Balance`]. Both are pure functions:
//! every run recomputes the balance wholesale, so a failed run can never
//! corrupt a previously committed result.

pub mod engine;
pub mod error;
pub mod ledger;
pub mod types;

pub use engine::{ReconcileOutcome, reconcile};
pub use error::ReconcileError;
pub use ledger::{LedgerInputs, build_ledger};
pub use types::{Balance, EntryKind, LedgerKey, LedgerRecord, ReconcileWarning, Regime};


#[cfg(test)]
mod engine_props;
