//! HTTP client for the SAT bulk-download service.
//!
//! Implements the [`tributo_core::retrieval::client::RegistryClient`]
//! boundary over the three service endpoints (submit, verify, download).
//! Credential handling and request signing live with the authentication
//! collaborator: this crate only attaches the opaque session token it is
//! given to every call.

pub mod client;
pub mod envelope;
pub mod token;

pub use client::HttpRegistryClient;
pub use token::{StaticTokenProvider, TokenProvider};
