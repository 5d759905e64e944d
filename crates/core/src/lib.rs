//! Core pipeline logic for Tributo.
//!
//! This crate contains pure pipeline logic with ZERO web or database
//! dependencies. All domain types, the flattening engine, the retrieval
//! state machine, the reconciliation engine, and the pipeline coordinator
//! live here.
//!
//! # Modules
//!
//! - `cfdi` - Closed domain vocabularies (document types, payment methods, versions)
//! - `flatten` - Hierarchical document to relational row conversion
//! - `retrieval` - Bulk-export request state machine and registry boundary
//! - `reconcile` - Ledger construction and VAT balance computation
//! - `pipeline` - Stage sequencing, chunked date ranges, run reports

pub mod cfdi;
pub mod flatten;
pub mod pipeline;
pub mod reconcile;
pub mod retrieval;
