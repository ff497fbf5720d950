//! Conversational memory for LedgerBridge.
//!
//! The session store remembers what each chat session loaded last, which
//! entities it talked about, and a short tail of the conversation.

pub mod session;

pub use session::{DEFAULT_SESSION_TTL, MAX_SESSION_TTL, SessionInfo, SessionStats, SessionStore};
