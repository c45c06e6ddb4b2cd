//! Internal messaging: immutable messages and the denormalized conversation
//! view the backend derives from them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub sender: UserRef,
    pub recipient: UserRef,
    pub content: String,
    /// Missing timestamps sort as the epoch.
    pub sent_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    pub fn sort_key(&self) -> (NaiveDateTime, i64) {
        (
            self.sent_at.unwrap_or(NaiveDateTime::UNIX_EPOCH),
            self.id,
        )
    }
}

/// The backend keys a conversation by the counterpart user's id. Records
/// occasionally arrive without one; those get a process-local placeholder
/// that is typed so it can never be sent back in a request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Server(i64),
    Local(Uuid),
}

impl ConversationKey {
    pub fn server_id(&self) -> Option<i64> {
        match self {
            ConversationKey::Server(id) => Some(*id),
            ConversationKey::Local(_) => None,
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationKey::Server(id) => write!(f, "{}", id),
            ConversationKey::Local(u) => write!(f, "local-{}", u),
        }
    }
}

/// Sanitized conversation list entry. Built by the messaging manager from
/// the raw response; not deserialized directly.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub key: ConversationKey,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub participants: Vec<UserRef>,
    pub last_message: Option<String>,
    pub last_message_time: Option<NaiveDateTime>,
    pub unread_count: i64,
}

impl Conversation {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("(unknown)")
    }
}
