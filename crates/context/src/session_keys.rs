//! Session memory keys and the conversation tail record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domains loaded on the previous turn (array of domain names).
pub const LAST_DOMAINS_LOADED: &str = "last-domains-loaded";
/// Entities the previous turn referred to.
pub const LAST_ENTITIES: &str = "last-entities";
/// Capped conversation tail.
pub const CONVERSATION: &str = "conversation";
/// RFC 3339 timestamp of the session's first completed turn.
pub const CREATED_AT: &str = "created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One entry of the conversation tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Append turns, dropping the oldest so at most `cap` remain.
pub fn append_capped(tail: &mut Vec<ConversationTurn>, turns: Vec<ConversationTurn>, cap: usize) {
    tail.extend(turns);
    if tail.len() > cap {
        tail.drain(..tail.len() - cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_newest() {
        let mut tail: Vec<ConversationTurn> =
            (0..19).map(|i| ConversationTurn::user(format!("m{i}"))).collect();
        append_capped(
            &mut tail,
            vec![ConversationTurn::user("m19"), ConversationTurn::assistant("r19")],
            20,
        );
        assert_eq!(tail.len(), 20);
        assert_eq!(tail[0].content, "m1");
        assert_eq!(tail[19].content, "r19");
        assert_eq!(tail[19].role, TurnRole::Assistant);
    }

    #[test]
    fn turn_serializes_role_lowercase() {
        let json = serde_json::to_string(&ConversationTurn::user("hi")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }
}
