//! Messaging subsystem.
//!
//! The conversations endpoint is the least reliable surface of the backend:
//! entries arrive as nulls, partial objects, or objects missing ids. The
//! sanitization pass here turns that into well-typed `Conversation` values
//! instead of letting one bad entry take down the whole inbox.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use mentorpay_core::error::ValidationError;
use mentorpay_core::models::{Conversation, ConversationKey, Message, UserRef};

use crate::auth::AuthSession;
use crate::gateway::{decode_records, extract_records_lenient, GatewayError};

// ============================================================================
// PUBLIC API
// ============================================================================

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Clone)]
pub struct MessagingManager {
    auth: AuthSession,
}

impl MessagingManager {
    pub fn new(auth: AuthSession) -> Self {
        Self { auth }
    }

    /// Conversation summaries, sanitized. Null entries and entries that fail
    /// to parse are dropped with a warning; entries missing a counterpart id
    /// get a locally generated key so the UI can still render them.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, GatewayError> {
        let client = self.auth.client().clone();
        let value = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                async move { client.get("/api/messages/conversations").await }
            })
            .await?;

        Ok(sanitize_conversations(extract_records_lenient(&value)))
    }

    /// Full thread with one counterpart, deduplicated by message id
    /// (last occurrence wins) and ordered by send time then id.
    pub async fn load_thread(&self, user_id: i64) -> Result<Vec<Message>, GatewayError> {
        let client = self.auth.client().clone();
        let value = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                async move {
                    client
                        .get(&format!("/api/messages/conversation/{}", user_id))
                        .await
                }
            })
            .await?;

        let messages: Vec<Message> = decode_records(extract_records_lenient(&value));
        let mut by_id: HashMap<i64, Message> = HashMap::with_capacity(messages.len());
        for message in messages {
            by_id.insert(message.id, message);
        }
        let mut thread: Vec<Message> = by_id.into_values().collect();
        thread.sort_by_key(Message::sort_key);
        Ok(thread)
    }

    /// Sends a message. Whitespace-only content is rejected locally without
    /// touching the network.
    pub async fn send(
        &self,
        recipient_id: i64,
        content: &str,
    ) -> Result<Message, MessagingError> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let client = self.auth.client().clone();
        let body = json!({
            "recipientId": recipient_id,
            "content": content,
        });
        let value = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                let body = body.clone();
                async move { client.post("/api/messages", Some(&body)).await }
            })
            .await?;

        let message = serde_json::from_value(value).map_err(|e| GatewayError::Api {
            status: 200,
            message: format!("unreadable sent-message response: {e}"),
        })?;
        Ok(message)
    }

    pub async fn mark_read(&self, message_id: i64) -> Result<(), GatewayError> {
        let client = self.auth.client().clone();
        self.auth
            .with_auth_retry(|| {
                let client = client.clone();
                async move {
                    client
                        .put(&format!("/api/messages/{}/read", message_id), None)
                        .await
                }
            })
            .await?;
        Ok(())
    }
}

/// Background loop keeping the conversation list current. Same cadence and
/// shutdown discipline as the main reconciliation loop.
pub async fn run_conversation_refresh(
    manager: MessagingManager,
    sink: Arc<RwLock<Vec<Conversation>>>,
    interval_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match manager.list_conversations().await {
                    Ok(conversations) => {
                        *sink.write().unwrap_or_else(|e| e.into_inner()) = conversations;
                    }
                    Err(e) => tracing::warn!(error = %e, "conversation refresh failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("conversation refresh shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

/// Wire shape of one conversation entry, with every field optional so a
/// partial object still parses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConversation {
    #[serde(default, alias = "userId")]
    id: Option<i64>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    participants: Option<Vec<UserRef>>,
    #[serde(default)]
    last_message: Option<String>,
    #[serde(default)]
    last_message_time: Option<chrono::NaiveDateTime>,
    #[serde(default)]
    unread_count: Option<i64>,
}

fn sanitize_conversations(records: Vec<Value>) -> Vec<Conversation> {
    records
        .into_iter()
        .filter_map(|entry| {
            if entry.is_null() {
                tracing::warn!("dropping null conversation entry");
                return None;
            }
            match serde_json::from_value::<RawConversation>(entry) {
                Ok(raw) => Some(raw.into_conversation()),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unreadable conversation entry");
                    None
                }
            }
        })
        .collect()
}

impl RawConversation {
    fn into_conversation(self) -> Conversation {
        let key = match self.id {
            Some(id) => ConversationKey::Server(id),
            None => ConversationKey::Local(Uuid::new_v4()),
        };
        Conversation {
            key,
            username: self.username,
            full_name: self.full_name,
            participants: self.participants.unwrap_or_default(),
            last_message: self.last_message,
            last_message_time: self.last_message_time,
            unread_count: self.unread_count.unwrap_or(0),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
