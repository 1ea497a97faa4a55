//! # Murmur
//!
//! Store-and-forward messaging between nearby peers.
//!
//! ## Overview
//!
//! Every node keeps an append-only log of messages. Whenever two nodes
//! meet they authenticate each other and replay their logs, so a message
//! travels hop by hop until it reaches its recipients. Payloads can be
//! sealed to a recipient's public key; relays only see ciphertext.
//!
//! ## Key Concepts
//!
//! - **Peer id**: SHA-256 of an Ed25519 public key
//! - **Message**: payload, CRC-64 checksum, size and timestamp
//! - **Contact**: a known peer and when we last completed a sync round with it
//! - **Sealed box**: anonymous-sender public-key encryption of a payload
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use murmur::{Keypair, MemoryNetwork, Node, NodeConfig, SqliteStore};
//!
//! async fn example() -> murmur::Result<()> {
//!     let store = SqliteStore::open("murmur.db")?;
//!     let node = Node::start(Keypair::generate(), Arc::new(store), NodeConfig::default());
//!
//!     let network = MemoryNetwork::new();
//!     node.attach_transport(Arc::new(network.create_transport()));
//!
//!     let bob = Keypair::generate().pubkey();
//!     node.post_sealed(bob, b"meet at noon").await?;
//!
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `murmur::core` - Identity, crypto, wire codecs and the message model
//! - `murmur::store` - Storage abstraction, in-memory and SQLite
//! - `murmur::sync` - Handshake, sync rounds, multiplexer and transports

pub mod error;
pub mod node;

pub use murmur_core as core;
pub use murmur_store as store;
pub use murmur_sync as sync;

pub use error::{NodeError, Result};
pub use node::{Node, NodeConfig};

pub use murmur_core::{Contact, Keypair, Message, MessageId, Multiaddr, PeerId, Pubkey};
pub use murmur_store::{MemoryStore, SqliteStore, Store, StoredMessage};
pub use murmur_sync::{
    Advertisement, MemoryNetwork, MemoryTransport, Stream, SyncMode, SyncReport, Transport,
    TransportEvent,
};
