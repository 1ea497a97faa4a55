//! Authenticated connections.
//!
//! [`Connection::negotiate`] runs the handshake over a raw stream and
//! either returns a connection or fails without exposing partial state.
//! After that the connection owns the stream: the receive loop reads
//! through [`Connection::read_message`], and writers go through the
//! [`ConnectionGuard`] returned by [`Connection::lock`], one at a time.

use std::fmt;

use murmur_core::clock::now_secs;
use murmur_core::{Contact, Keypair, Message, MessageHeader, PeerId};
use murmur_store::Store;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{HandshakeError, StreamError, SyncError};
use crate::frame::{self, FrameError};
use crate::handshake::{HandshakeConfig, HandshakeMessage, IdentityClaim};
use crate::stream::Stream;

/// Largest encoded message header accepted. Headers are three integers.
pub const MAX_HEADER_SIZE: usize = 64;

/// A stream whose remote end passed the handshake.
pub struct Connection {
    stream: Box<dyn Stream>,
    remote: IdentityClaim,
    peer_id: PeerId,
    contact: Mutex<Option<Contact>>,
}

impl Connection {
    /// Exchange handshakes over `stream` and validate the peer's.
    ///
    /// On any failure the stream is closed and dropped.
    pub async fn negotiate<S: Store + ?Sized>(
        stream: Box<dyn Stream>,
        keypair: &Keypair,
        config: &HandshakeConfig,
        store: &S,
    ) -> Result<Self, HandshakeError> {
        let exchange = tokio::time::timeout(config.timeout, exchange(stream.as_ref(), keypair, config));

        let remote = match exchange.await {
            Ok(Ok(msg)) => msg,
            Ok(Err(err)) => {
                stream.close().await;
                return Err(err);
            }
            Err(_) => {
                debug!("handshake timed out");
                stream.close().await;
                return Err(HandshakeError::InvalidFormat);
            }
        };

        let identity = remote.identity;
        let peer_id = identity.peer_id();
        let contact = match identity.pubkey() {
            Some(pubkey) => match store.get_contact(&peer_id).await {
                Ok(Some(known)) if known.pubkey == pubkey => Some(known),
                Ok(_) => Some(Contact::new(pubkey)),
                Err(err) => {
                    warn!(peer = %peer_id, error = %err, "contact lookup failed");
                    Some(Contact::new(pubkey))
                }
            },
            None => None,
        };

        debug!(peer = %peer_id, authenticated = contact.is_some(), "handshake complete");
        Ok(Self {
            stream,
            remote: identity,
            peer_id,
            contact: Mutex::new(contact),
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The identity the peer claimed.
    pub fn remote(&self) -> &IdentityClaim {
        &self.remote
    }

    /// Whether the peer proved ownership of a public key.
    pub fn is_authenticated(&self) -> bool {
        self.remote.pubkey().is_some()
    }

    /// A copy of the contact. Waits for any running sync round.
    pub async fn contact(&self) -> Option<Contact> {
        self.contact.lock().await.clone()
    }

    /// Take exclusive write access for the duration of the guard.
    pub async fn lock(&self) -> ConnectionGuard<'_> {
        ConnectionGuard {
            connection: self,
            contact: self.contact.lock().await,
        }
    }

    /// Read one message: a header frame, then exactly `size` payload bytes.
    ///
    /// The checksum is not checked here; see [`Message::is_intact`].
    pub async fn read_message(&self, max_size: u32) -> Result<Message, SyncError> {
        let header = frame::read_frame(self.stream.as_ref(), MAX_HEADER_SIZE)
            .await
            .map_err(|err| match err {
                FrameError::TooLarge { size, .. } => SyncError::MessageTooLarge {
                    size: u32::try_from(size).unwrap_or(u32::MAX),
                    max: MAX_HEADER_SIZE as u32,
                },
                FrameError::Stream(err) => SyncError::Stream(err),
            })?;
        let header = MessageHeader::decode(&header)?;

        if header.size > max_size {
            return Err(SyncError::MessageTooLarge {
                size: header.size,
                max: max_size,
            });
        }

        let mut data = vec![0u8; header.size as usize];
        self.stream.read(&mut data).await?;
        Ok(Message::from_parts(header, data))
    }

    pub fn is_valid(&self) -> bool {
        self.stream.is_valid()
    }

    pub async fn close(&self) {
        self.stream.close().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_id", &self.peer_id)
            .field("authenticated", &self.is_authenticated())
            .field("valid", &self.is_valid())
            .finish()
    }
}

async fn exchange(
    stream: &dyn Stream,
    keypair: &Keypair,
    config: &HandshakeConfig,
) -> Result<HandshakeMessage, HandshakeError> {
    let ours = if config.anonymous {
        let ephemeral = Keypair::generate();
        HandshakeMessage::anonymous(PeerId::from_pubkey(&ephemeral.pubkey()), 0, now_secs())
    } else {
        HandshakeMessage::signed(keypair, 0, now_secs())
    };

    frame::write_frame(stream, &ours.encode())
        .await
        .map_err(|_| HandshakeError::InvalidFormat)?;

    let bytes = frame::read_frame(stream, config.max_frame_size)
        .await
        .map_err(|err| {
            if let FrameError::TooLarge { size, max } = err {
                debug!(size, max, "oversized handshake frame");
            }
            HandshakeError::InvalidFormat
        })?;

    let theirs = HandshakeMessage::decode(&bytes)?;
    theirs.validate(config, now_secs())?;
    Ok(theirs)
}

/// Exclusive access to a connection's write side and contact.
pub struct ConnectionGuard<'a> {
    connection: &'a Connection,
    contact: MutexGuard<'a, Option<Contact>>,
}

impl ConnectionGuard<'_> {
    pub fn connection(&self) -> &Connection {
        self.connection
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    pub fn contact_mut(&mut self) -> Option<&mut Contact> {
        self.contact.as_mut()
    }

    /// Write the header frame, then the payload, as two writes.
    pub async fn send_message(&mut self, message: &Message) -> Result<(), StreamError> {
        let stream = self.connection.stream.as_ref();
        frame::write_frame(stream, &message.header.encode()).await?;
        stream.write(&message.data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{flags, MAX_HANDSHAKE_SIZE};
    use crate::stream::memory;
    use murmur_store::MemoryStore;
    use std::time::Duration;

    async fn negotiate_pair(
        a: &Keypair,
        b: &Keypair,
        store_a: &MemoryStore,
        store_b: &MemoryStore,
    ) -> (Result<Connection, HandshakeError>, Result<Connection, HandshakeError>) {
        let (sa, sb) = memory::pair();
        let config = HandshakeConfig::default();
        tokio::join!(
            Connection::negotiate(Box::new(sa), a, &config, store_a),
            Connection::negotiate(Box::new(sb), b, &config, store_b),
        )
    }

    #[tokio::test]
    async fn test_honest_peers_authenticate_symmetrically() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let (a, b) =
            negotiate_pair(&alice, &bob, &MemoryStore::new(), &MemoryStore::new()).await;
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.contact().await.unwrap().pubkey, bob.pubkey());
        assert_eq!(b.contact().await.unwrap().pubkey, alice.pubkey());
        assert_eq!(a.peer_id(), PeerId::from_pubkey(&bob.pubkey()));
        assert!(a.is_authenticated() && b.is_authenticated());
    }

    #[tokio::test]
    async fn test_known_contact_is_reused() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let store_a = MemoryStore::new();
        let known = Contact::new(bob.pubkey()).with_name("bob");
        store_a.upsert_contact(&known).await.unwrap();

        let (a, _b) = negotiate_pair(&alice, &bob, &store_a, &MemoryStore::new()).await;
        assert_eq!(a.unwrap().contact().await, Some(known));
    }

    #[tokio::test]
    async fn test_anonymous_peer_has_no_contact() {
        let (sa, sb) = memory::pair();
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let anon = HandshakeConfig::default().with_anonymous(true);
        let store = MemoryStore::new();
        let open = HandshakeConfig::default();

        let (a, b) = tokio::join!(
            Connection::negotiate(Box::new(sa), &alice, &open, &store),
            Connection::negotiate(Box::new(sb), &bob, &anon, &store),
        );
        let a = a.unwrap();
        assert!(!a.is_authenticated());
        assert!(a.contact().await.is_none());
        assert_ne!(a.peer_id(), PeerId::from_pubkey(&bob.pubkey()));

        // The anonymous side still authenticated alice.
        assert_eq!(b.unwrap().contact().await.unwrap().pubkey, alice.pubkey());
    }

    #[tokio::test]
    async fn test_require_authenticated_rejects_anonymous() {
        let (sa, sb) = memory::pair();
        let strict = HandshakeConfig::default().with_require_authenticated(true);
        let anon = HandshakeConfig::default().with_anonymous(true);
        let store = MemoryStore::new();
        let (alice, bob) = (Keypair::generate(), Keypair::generate());

        let (a, _b) = tokio::join!(
            Connection::negotiate(Box::new(sa), &alice, &strict, &store),
            Connection::negotiate(Box::new(sb), &bob, &anon, &store),
        );
        assert_eq!(a.unwrap_err(), HandshakeError::InvalidPubkey);
    }

    /// Drive one side of a handshake by hand: send `frame`, read the
    /// honest side's handshake, and return the honest side's result.
    async fn against_raw(frame: Vec<u8>) -> Result<Connection, HandshakeError> {
        let (honest, raw) = memory::pair();
        let store = MemoryStore::new();
        let keypair = Keypair::generate();
        let config = HandshakeConfig::default().with_timeout(Duration::from_secs(2));

        let peer = async move {
            raw.write(&frame).await.ok();
            let _ = frame::read_frame(&raw, MAX_HANDSHAKE_SIZE).await;
            raw
        };
        let (result, _raw) = tokio::join!(
            Connection::negotiate(Box::new(honest), &keypair, &config, &store),
            peer
        );
        result
    }

    fn framed(msg: &HandshakeMessage) -> Vec<u8> {
        let body = msg.encode();
        let mut buf = (body.len() as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(&body);
        buf
    }

    #[tokio::test]
    async fn test_corrupt_checksum_rejected() {
        let mut msg = HandshakeMessage::signed(&Keypair::generate(), 0, now_secs());
        msg.checksum = msg.checksum.wrapping_add(1);
        assert_eq!(
            against_raw(framed(&msg)).await.unwrap_err(),
            HandshakeError::InvalidChecksum
        );
    }

    #[tokio::test]
    async fn test_replayed_handshake_rejected() {
        let msg = HandshakeMessage::signed(&Keypair::generate(), 0, now_secs() - 3600);
        assert_eq!(
            against_raw(framed(&msg)).await.unwrap_err(),
            HandshakeError::InvalidTimestamp
        );
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut frame = ((MAX_HANDSHAKE_SIZE + 1) as u32).to_be_bytes().to_vec();
        frame.extend(std::iter::repeat(0).take(MAX_HANDSHAKE_SIZE + 1));
        assert_eq!(against_raw(frame).await.unwrap_err(), HandshakeError::InvalidFormat);
    }

    #[tokio::test]
    async fn test_garbage_frame_rejected() {
        let mut frame = 3u32.to_be_bytes().to_vec();
        frame.extend_from_slice(&[0xde, 0xad, 0xbe]);
        assert_eq!(against_raw(frame).await.unwrap_err(), HandshakeError::InvalidFormat);
    }

    #[tokio::test]
    async fn test_unsigned_pubkey_claim_rejected() {
        let mut msg = HandshakeMessage::signed(&Keypair::generate(), flags::PUBKEY, now_secs());
        msg.signature = None;
        assert_eq!(
            against_raw(framed(&msg)).await.unwrap_err(),
            HandshakeError::InvalidSignature
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let (honest, _silent) = memory::pair();
        let config = HandshakeConfig::default().with_timeout(Duration::from_secs(10));
        let result = Connection::negotiate(
            Box::new(honest),
            &Keypair::generate(),
            &config,
            &MemoryStore::new(),
        )
        .await;
        assert_eq!(result.unwrap_err(), HandshakeError::InvalidFormat);
    }

    #[tokio::test]
    async fn test_message_exchange() {
        let (alice, bob) = (Keypair::generate(), Keypair::generate());
        let (a, b) =
            negotiate_pair(&alice, &bob, &MemoryStore::new(), &MemoryStore::new()).await;
        let (a, b) = (a.unwrap(), b.unwrap());

        let msg = Message::new(b"over the air".to_vec(), vec![bob.pubkey()], 1_000);
        a.lock().await.send_message(&msg).await.unwrap();

        let received = b.read_message(1024).await.unwrap();
        assert!(received.is_intact());
        assert_eq!(received.data, msg.data);
        assert_eq!(received.id(), msg.id());
        assert!(received.recipients.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (alice, bob) = (Keypair::generate(), Keypair::generate());
        let (a, b) =
            negotiate_pair(&alice, &bob, &MemoryStore::new(), &MemoryStore::new()).await;
        let (a, b) = (a.unwrap(), b.unwrap());

        let msg = Message::new(vec![0u8; 100], vec![], 1_000);
        a.lock().await.send_message(&msg).await.unwrap();

        assert!(matches!(
            b.read_message(99).await,
            Err(SyncError::MessageTooLarge { size: 100, max: 99 })
        ));
    }

    #[tokio::test]
    async fn test_close_ends_reads() {
        let (alice, bob) = (Keypair::generate(), Keypair::generate());
        let (a, b) =
            negotiate_pair(&alice, &bob, &MemoryStore::new(), &MemoryStore::new()).await;
        let (a, b) = (a.unwrap(), b.unwrap());

        a.close().await;
        assert!(!a.is_valid());
        assert!(matches!(
            b.read_message(1024).await,
            Err(SyncError::Stream(StreamError::Closed))
        ));
    }
}
