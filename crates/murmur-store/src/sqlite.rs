//! SQLite implementation of the Store trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension, Row};

use murmur_core::clock::now_millis;
use murmur_core::crypto::PUBKEY_SIZE;
use murmur_core::{Contact, Message, MessageHeader, MessageId, Multiaddr, PeerId, Pubkey};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Store, StoredMessage};

/// SQLite-based store implementation.
///
/// One connection behind a mutex; every query runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, creating and migrating it
    /// as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await?
    }
}

const MESSAGE_COLUMNS: &str =
    "seq, timestamp, checksum, size, data, recipients, stored_at";

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok(RawMessage {
        seq: row.get(0)?,
        timestamp: row.get(1)?,
        checksum: row.get(2)?,
        size: row.get(3)?,
        data: row.get(4)?,
        recipients: row.get(5)?,
        stored_at: row.get(6)?,
    })
}

/// A `messages` row before validation.
struct RawMessage {
    seq: i64,
    timestamp: i64,
    checksum: i64,
    size: i64,
    data: Vec<u8>,
    recipients: Vec<u8>,
    stored_at: i64,
}

impl RawMessage {
    fn into_stored(self) -> Result<StoredMessage> {
        if self.recipients.len() % PUBKEY_SIZE != 0 {
            return Err(StoreError::InvalidData(format!(
                "recipients blob of {} bytes at seq {}",
                self.recipients.len(),
                self.seq
            )));
        }
        let recipients = self
            .recipients
            .chunks_exact(PUBKEY_SIZE)
            .map(Pubkey::from_slice)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let size = u32::try_from(self.size)
            .map_err(|_| StoreError::InvalidData(format!("size {} at seq {}", self.size, self.seq)))?;

        let header = MessageHeader {
            timestamp: self.timestamp as u64,
            checksum: self.checksum as u64,
            size,
        };
        Ok(StoredMessage {
            seq: self.seq as u64,
            message: Message {
                header,
                data: Bytes::from(self.data),
                recipients,
            },
            stored_at: self.stored_at,
        })
    }
}

fn encode_recipients(recipients: &[Pubkey]) -> Vec<u8> {
    recipients
        .iter()
        .flat_map(|pk| pk.as_bytes().iter().copied())
        .collect()
}

fn encode_addrs(addrs: &[Multiaddr]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(addrs, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// A `contacts` row before validation.
struct RawContact {
    pubkey: Vec<u8>,
    name: Option<String>,
    known_addrs: Vec<u8>,
    last_sync: i64,
}

fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<RawContact> {
    Ok(RawContact {
        pubkey: row.get(0)?,
        name: row.get(1)?,
        known_addrs: row.get(2)?,
        last_sync: row.get(3)?,
    })
}

impl RawContact {
    fn into_contact(self) -> Result<Contact> {
        let pubkey =
            Pubkey::from_slice(&self.pubkey).map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let known_addrs: Vec<Multiaddr> = ciborium::from_reader(self.known_addrs.as_slice())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut contact = Contact::new(pubkey);
        contact.name = self.name;
        contact.known_addrs = known_addrs;
        contact.last_sync = self.last_sync;
        Ok(contact)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn append_message(&self, message: &Message) -> Result<u64> {
        let message = message.clone();
        let id = message.id();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO messages (
                    message_id, timestamp, checksum, size, data, recipients, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_bytes().as_slice(),
                    message.header.timestamp as i64,
                    message.header.checksum as i64,
                    message.header.size,
                    message.data.as_ref(),
                    encode_recipients(&message.recipients),
                    now_millis(),
                ],
            )?;
            Ok(conn.last_insert_rowid() as u64)
        })
        .await
    }

    async fn get_message(&self, seq: u64) -> Result<Option<StoredMessage>> {
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE seq = ?1"),
                params![seq as i64],
                row_to_stored,
            )
            .optional()?
            .map(RawMessage::into_stored)
            .transpose()
        })
        .await
    }

    async fn messages_after(&self, after: u64, limit: usize) -> Result<Vec<StoredMessage>> {
        // Positions never exceed i64::MAX.
        let after = i64::try_from(after).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.run(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE seq > ?1 ORDER BY seq LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![after, limit], row_to_stored)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(RawMessage::into_stored).collect()
        })
        .await
    }

    async fn has_message(&self, id: &MessageId) -> Result<bool> {
        let id = *id;
        self.run(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM messages WHERE message_id = ?1 LIMIT 1",
                    params![id.as_bytes().as_slice()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn message_count(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        let contact = contact.clone();
        let addrs = encode_addrs(&contact.known_addrs)?;

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO contacts (peer_id, pubkey, name, known_addrs, last_sync)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(peer_id) DO UPDATE SET
                    pubkey = excluded.pubkey,
                    name = excluded.name,
                    known_addrs = excluded.known_addrs,
                    last_sync = excluded.last_sync",
                params![
                    contact.peer_id().as_bytes().as_slice(),
                    contact.pubkey.as_bytes().as_slice(),
                    contact.name,
                    addrs,
                    contact.last_sync,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_contact(&self, peer_id: &PeerId) -> Result<Option<Contact>> {
        let peer_id = *peer_id;
        self.run(move |conn| {
            conn.query_row(
                "SELECT pubkey, name, known_addrs, last_sync FROM contacts WHERE peer_id = ?1",
                params![peer_id.as_bytes().as_slice()],
                row_to_contact,
            )
            .optional()?
            .map(RawContact::into_contact)
            .transpose()
        })
        .await
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.run(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT pubkey, name, known_addrs, last_sync FROM contacts ORDER BY peer_id",
            )?;
            let rows = stmt
                .query_map([], row_to_contact)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(RawContact::into_contact).collect()
        })
        .await
    }

    async fn remove_contact(&self, peer_id: &PeerId) -> Result<bool> {
        let peer_id = *peer_id;
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM contacts WHERE peer_id = ?1",
                params![peer_id.as_bytes().as_slice()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn record_sync(&self, peer_id: &PeerId, at: i64) -> Result<()> {
        let peer_id = *peer_id;
        self.run(move |conn| {
            conn.execute(
                "UPDATE contacts SET last_sync = ?1 WHERE peer_id = ?2",
                params![at, peer_id.as_bytes().as_slice()],
            )?;
            Ok(())
        })
        .await
    }
}
