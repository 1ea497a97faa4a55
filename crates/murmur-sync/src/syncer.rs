//! Replaying the local log to a connected peer.

use std::sync::Arc;

use murmur_core::clock::now_millis;
use murmur_core::Message;
use murmur_store::Store;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::connection::ConnectionGuard;
use crate::error::{Result, SyncError};

/// Which log entries a round sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Everything.
    Full,
    /// Only messages addressed to the connected peer. Needs an
    /// authenticated contact.
    Direct,
}

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Log entries fetched from the store per page.
    pub batch_size: usize,
    /// In `Full` rounds, skip entries stored before the contact's last
    /// successful `Full` round.
    pub skip_already_synced: bool,
    /// Largest payload accepted from a peer.
    pub max_message_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            skip_already_synced: true,
            max_message_size: 1024 * 1024,
        }
    }
}

impl SyncConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_skip_already_synced(mut self, skip: bool) -> Self {
        self.skip_already_synced = skip;
        self
    }

    pub fn with_max_message_size(mut self, max: u32) -> Self {
        self.max_message_size = max;
        self
    }
}

/// Outcome of one sync round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Unix milliseconds when the round started.
    pub started_at: i64,
    /// Messages written to the peer.
    pub sent: usize,
    /// Entries not eligible for this peer or already synced.
    pub skipped: usize,
}

/// Owns the local message log and sends it to peers.
pub struct Syncer<S: ?Sized> {
    store: Arc<S>,
    config: SyncConfig,
    /// Serializes the check-then-append in [`Syncer::ingest`].
    ingest: Mutex<()>,
}

impl<S: Store + ?Sized> Syncer<S> {
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            ingest: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Append to the log. No de-duplication.
    pub async fn add_message(&self, message: &Message) -> Result<u64> {
        Ok(self.store.append_message(message).await?)
    }

    /// Append a message received from a peer unless the log already has
    /// it. Returns the new log position, or `None` for a duplicate.
    pub async fn ingest(&self, message: &Message) -> Result<Option<u64>> {
        let _guard = self.ingest.lock().await;
        if self.store.has_message(&message.id()).await? {
            return Ok(None);
        }
        Ok(Some(self.store.append_message(message).await?))
    }

    /// Send every eligible log entry over the guarded connection, in log
    /// order.
    ///
    /// A write failure ends the round; the log is untouched and the
    /// contact's `last_sync` keeps its old value. After a complete `Full`
    /// round `last_sync` becomes the round's start time, in memory and in
    /// the store. `Direct` rounds neither read nor move `last_sync`: they
    /// send a subset of the log, so entries they pass over still need a
    /// later `Full` round.
    pub async fn sync(&self, conn: &mut ConnectionGuard<'_>, mode: SyncMode) -> Result<SyncReport> {
        let started_at = now_millis();
        let peer = conn.connection().peer_id();

        let recipient = match (mode, conn.contact()) {
            (SyncMode::Direct, None) => {
                return Err(SyncError::InvalidArgument(format!(
                    "direct sync needs an authenticated contact for {peer}"
                )))
            }
            (SyncMode::Direct, Some(contact)) => Some(contact.pubkey),
            (SyncMode::Full, _) => None,
        };
        let synced_before = match (mode, conn.contact()) {
            (SyncMode::Full, Some(contact)) if self.config.skip_already_synced => contact.last_sync,
            _ => i64::MIN,
        };

        let mut report = SyncReport {
            started_at,
            ..Default::default()
        };
        let mut after = 0;

        loop {
            let page = self.store.messages_after(after, self.config.batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.seq;

            for entry in page {
                let eligible = entry.stored_at >= synced_before
                    && recipient.map_or(true, |pk| entry.message.is_addressed_to(&pk));
                if !eligible {
                    report.skipped += 1;
                    continue;
                }

                conn.send_message(&entry.message).await?;
                trace!(peer = %peer, seq = entry.seq, size = entry.message.len(), "sent message");
                report.sent += 1;
            }
        }

        if mode == SyncMode::Full {
            if let Some(contact) = conn.contact_mut() {
                contact.last_sync = started_at;
                self.store.record_sync(&contact.peer_id(), started_at).await?;
            }
        }

        debug!(peer = %peer, ?mode, sent = report.sent, skipped = report.skipped, "sync round complete");
        Ok(report)
    }
}
