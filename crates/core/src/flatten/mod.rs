//! Flattening engine: hierarchical fiscal documents to relational rows.
//!
//! One raw document in, one [`FlatDocument`] out - a fixed set of rows, each
//! carrying the originating document UUID plus every ordinal index needed to
//! reconstruct the source hierarchy. The engine is stateless per document,
//! which is what lets [`engine::flatten_batch`] fan work out across a rayon
//! worker pool with no shared mutable state.

pub mod engine;
pub mod error;
pub mod parser;
pub mod rows;

pub use engine::{BatchOutcome, ConsistencyWarning, FlattenFailure, flatten_batch};
pub use error::FlattenError;
pub use parser::parse_document;
pub use rows::{
    ConceptRow, ConceptTaxRow, DocTaxRow, DocumentRow, FlatDocument, LocalTaxRow, PaymentRow,
    RelatedDocRow,
};
