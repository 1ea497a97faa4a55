//! # Murmur Sync
//!
//! Moving messages between peers: stream framing, the signed handshake,
//! per-connection sync rounds and the multiplexer that runs them all.
//!
//! ## Overview
//!
//! Every stream starts with a handshake. Each side sends one signed frame
//! carrying its public key (or, when anonymous, only its peer id) and a
//! timestamp; the other side checks the checksum, the clock drift and the
//! signature before any message moves. After that each side replays its
//! log over the stream and stores whatever the other side sends that it
//! did not already have.
//!
//! ## Key Properties
//!
//! - **Store-and-forward**: every node relays its whole log, not just its own messages
//! - **Idempotent receive**: a message already in the log is ignored
//! - **Ordered rounds**: one round writes entries in log order under the connection lock
//! - **Cooperative shutdown**: every loop watches the same signal
//!
//! ## Message Flow
//!
//! ```text
//! Node A                                   Node B
//!   |-------- [len][handshake] ------------->|
//!   |<------- [len][handshake] --------------|
//!   |-------- [len][header] [payload] ------>|   sync round
//!   |-------- [len][header] [payload] ------>|
//!   |<------- [len][header] [payload] -------|   B's round
//!   ...                                     ...
//! ```

pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod multiplexer;
pub mod stream;
pub mod syncer;
pub mod transport;

pub use connection::{Connection, ConnectionGuard, MAX_HEADER_SIZE};
pub use error::{HandshakeError, Result, StreamError, SyncError, TransportError};
pub use handshake::{HandshakeConfig, HandshakeMessage, IdentityClaim, PROTOCOL_VERSION};
pub use multiplexer::{ConnectionMultiplexer, Context, MultiplexerConfig, MultiplexerHandle, Shutdown};
pub use stream::{IoStream, Stream};
pub use syncer::{SyncConfig, SyncMode, SyncReport, Syncer};
pub use transport::{
    memory::MemoryNetwork, memory::MemoryTransport, Advertisement, Transport, TransportEvent,
};
