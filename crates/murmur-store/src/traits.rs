//! Store trait: the message log and contact book the syncer runs against.
//!
//! Implementations include SQLite (persistent) and in-memory (tests and
//! ephemeral nodes).

use async_trait::async_trait;
use murmur_core::{Contact, Message, MessageId, PeerId};

use crate::error::Result;

/// A message at its position in the local log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Log position. Starts at 1 and strictly increases.
    pub seq: u64,
    pub message: Message,
    /// Local Unix milliseconds when the message was appended.
    pub stored_at: i64,
}

/// Async interface for message and contact persistence.
///
/// All methods are async so blocking backends can move work off the
/// runtime (SQLite uses `spawn_blocking`). Readers never observe a
/// half-written entry.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Message Log
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a message to the end of the log and return its position.
    ///
    /// No de-duplication happens here; callers check [`has_message`]
    /// first when they need it.
    ///
    /// [`has_message`]: Store::has_message
    async fn append_message(&self, message: &Message) -> Result<u64>;

    /// Get the entry at `seq`.
    async fn get_message(&self, seq: u64) -> Result<Option<StoredMessage>>;

    /// Up to `limit` entries with `seq > after`, in log order.
    async fn messages_after(&self, after: u64, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Whether any entry carries this id.
    async fn has_message(&self, id: &MessageId) -> Result<bool>;

    async fn message_count(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Contact Book
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace the contact keyed by its peer id.
    async fn upsert_contact(&self, contact: &Contact) -> Result<()>;

    async fn get_contact(&self, peer_id: &PeerId) -> Result<Option<Contact>>;

    async fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Remove a contact. Returns whether it existed.
    async fn remove_contact(&self, peer_id: &PeerId) -> Result<bool>;

    /// Set `last_sync` of an existing contact. Unknown peers are ignored.
    async fn record_sync(&self, peer_id: &PeerId, at: i64) -> Result<()>;
}
