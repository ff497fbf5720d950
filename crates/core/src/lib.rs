//! # LedgerBridge Core
//!
//! Domain types, collaborator traits, and error definitions shared by every
//! LedgerBridge crate. Nothing here performs I/O: the two upstream systems
//! (operational records and the accounting service) are described as traits
//! and implemented elsewhere.
//!
//! ## Crate map
//!
//! - `ledgerbridge-memory` — per-session key/value store with TTL
//! - `ledgerbridge-cache` — TTL cache in front of the accounting service
//! - `ledgerbridge-context` — routing, extraction, truncation, assembly
//! - `ledgerbridge-sources` — fixture and in-memory collaborators

pub mod domain;
pub mod error;
pub mod record;
pub mod source;

// Re-export key types at crate root for ergonomics
pub use domain::{Domain, DomainSet, EntityType, RecordKind};
pub use error::{Error, Result, SessionError, UpstreamError};
pub use record::{Filter, Record};
pub use source::{AccountingClient, RecordSource};
