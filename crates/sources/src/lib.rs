//! Upstream collaborator implementations for LedgerBridge.
//!
//! - [`InMemoryRecordSource`] / [`InMemoryAccounting`]: test doubles with
//!   call counting, failure injection, and artificial latency
//! - [`FileRecordSource`] / [`FileAccounting`]: JSON fixture directories,
//!   used by the CLI for offline runs

pub mod file_backend;
pub mod in_memory;
mod mutation;

pub use file_backend::{FileAccounting, FileRecordSource};
pub use in_memory::{InMemoryAccounting, InMemoryRecordSource};
