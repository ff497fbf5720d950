//! Per-turn context assembly for LedgerBridge.
//!
//! Each chat turn is turned into a small, bounded block of business data:
//!
//! - [`router`] decides which upstream domains the message needs
//! - [`extractor`] pulls record ids, known names, and date phrases out of it
//! - [`truncate`] cuts each record list down while keeping full-list totals
//! - [`assembler`] runs the whole turn and persists follow-up state
//!
//! Everything except fetching is synchronous and deterministic.

pub mod assembler;
pub mod extractor;
pub mod router;
pub mod session_keys;
pub mod token;
pub mod truncate;

pub use assembler::{
    AssembledContext, AssemblyMetadata, ContextAssembler, DomainFailure, DomainSection, DropInfo,
};
pub use extractor::{EntityExtractor, ExtractedEntities};
pub use router::{DomainRouter, RouteDecision, RouteRule};
pub use session_keys::{ConversationTurn, TurnRole};
pub use truncate::{TruncationSummary, Truncated, truncate};
