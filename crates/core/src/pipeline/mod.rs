//! Pipeline coordinator: retrieval, flattening, reconciliation in sequence.
//!
//! The coordinator splits the configured date range into sub-ranges, drives
//! each as an independent retrieval task, streams raw documents into the
//! flattening pool, upserts the rows through a [`sink::TableSink`], and
//! reconciles the merged ledger into the period balance. Partial failures
//! never abort sibling work; everything is surfaced in the
//! [`report::PipelineReport`].

pub mod coordinator;
pub mod error;
pub mod report;
pub mod sink;

pub use coordinator::{Coordinator, RunParams};
pub use error::PipelineError;
pub use report::PipelineReport;
pub use sink::{TableSink, TableSnapshot};
