//! # Murmur Store
//!
//! Storage for a murmur node: the append-only message log the syncer
//! replays to peers, and the contact book of known peers.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`StoredMessage`] - A message with its log position and arrival time
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage
//!
//! ## Usage
//!
//! ```rust,no_run
//! use murmur_core::Message;
//! use murmur_store::{SqliteStore, Store};
//!
//! async fn example() -> murmur_store::Result<()> {
//!     let store = SqliteStore::open("murmur.db")?;
//!
//!     let seq = store.append_message(&Message::new(b"hi".to_vec(), vec![], 0)).await?;
//!     let page = store.messages_after(seq - 1, 64).await?;
//!     assert_eq!(page.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Append-only log**: positions start at 1 and never get reused
//! - **No de-duplication on append**: callers check `has_message` first
//! - **Contacts keyed by peer id**: `upsert_contact` replaces the whole record

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Store, StoredMessage};
