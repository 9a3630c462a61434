//! Durable conversation persistence seam.
//!
//! One record per (user, machine); the dispatcher keeps at most one live
//! record per user. Events for a user are processed strictly sequentially,
//! so single-writer semantics per key are sufficient.

use crate::errors::AppResult;
use async_trait::async_trait;

/// A persisted conversation: which machine is live for the user, where it
/// stands, and its encoded scratch.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationRecord {
    pub user_id: i64,
    pub machine: String,
    pub state: String,
    /// Encoded [`Scratch`](crate::dialogue::Scratch).
    pub scratch_json: String,
    /// Version the scratch was written under; mismatches are dropped on
    /// contact rather than migrated.
    pub schema_version: i32,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, user: i64, machine: &str) -> AppResult<Option<ConversationRecord>>;

    /// The user's live conversation, whichever machine owns it.
    async fn active_for_user(&self, user: i64) -> AppResult<Option<ConversationRecord>>;

    /// Insert or replace the record for (user, machine).
    async fn save(&self, record: &ConversationRecord) -> AppResult<()>;

    async fn clear(&self, user: i64, machine: &str) -> AppResult<()>;
}
