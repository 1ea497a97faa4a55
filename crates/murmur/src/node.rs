//! The Node: one murmur identity with its log, contacts and connections.
//!
//! A node owns a [`ConnectionMultiplexer`] task and any number of
//! transport tasks. Everything it starts stops on [`Node::shutdown`] or
//! when the node is dropped.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use murmur_core::clock::now_millis;
use murmur_core::{seal, Contact, Keypair, Message, MessageId, Multiaddr, PeerId, Pubkey};
use murmur_store::{Store, StoredMessage};
use murmur_sync::{
    ConnectionMultiplexer, Context, HandshakeConfig, MultiplexerConfig, MultiplexerHandle,
    Shutdown, Stream, SyncConfig, SyncMode, SyncReport, Syncer, Transport, TransportEvent,
};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::error::{NodeError, Result};

/// Configuration for a [`Node`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub handshake: HandshakeConfig,
    pub sync: SyncConfig,
    pub multiplexer: MultiplexerConfig,
    /// Open a stream to peers found while scanning.
    pub auto_connect: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            sync: SyncConfig::default(),
            multiplexer: MultiplexerConfig::default(),
            auto_connect: true,
        }
    }
}

impl NodeConfig {
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_multiplexer(mut self, multiplexer: MultiplexerConfig) -> Self {
        self.multiplexer = multiplexer;
        self
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }
}

/// A running murmur node.
///
/// Provides a unified API for:
/// - Posting plain and sealed messages
/// - Reading the local log
/// - Managing contacts
/// - Accepting streams and driving transports
pub struct Node {
    ctx: Context<dyn Store>,
    handle: MultiplexerHandle<dyn Store>,
    peer_id: PeerId,
    auto_connect: bool,
    shutdown: Shutdown,
    tasks: Mutex<JoinSet<()>>,
}

impl Node {
    /// Start a node. Must be called from within a tokio runtime.
    pub fn start(keypair: Keypair, store: Arc<dyn Store>, config: NodeConfig) -> Self {
        let peer_id = PeerId::from_pubkey(&keypair.pubkey());
        let syncer = Arc::new(Syncer::new(store, config.sync));
        let (ctx, shutdown) = Context::new(
            Arc::new(keypair),
            syncer,
            config.handshake,
            config.multiplexer,
        );

        let (mux, handle) = ConnectionMultiplexer::new(ctx.clone());
        let mut tasks = JoinSet::new();
        tasks.spawn(mux.run());
        info!(peer = %peer_id, "node started");

        Self {
            ctx,
            handle,
            peer_id,
            auto_connect: config.auto_connect,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn public_key(&self) -> Pubkey {
        self.ctx.keypair.pubkey()
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.ctx.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a message to the log.
    ///
    /// Connected recipients get a direct sync round right away; the rest
    /// receive it on a later periodic round, possibly through other peers.
    pub async fn post(&self, data: impl Into<Bytes>, recipients: Vec<Pubkey>) -> Result<MessageId> {
        let timestamp = u64::try_from(now_millis()).unwrap_or(0);
        let message = Message::new(data, recipients, timestamp);
        let id = message.id();
        let seq = self.ctx.syncer.add_message(&message).await?;
        debug!(id = %id, seq, recipients = message.recipients.len(), "posted message");

        let peers: BTreeSet<PeerId> = message
            .recipients
            .iter()
            .map(PeerId::from_pubkey)
            .filter(|peer| *peer != self.peer_id)
            .collect();
        for peer in peers {
            if !self.handle.is_connected(&peer).await {
                continue;
            }
            if let Err(err) = self.handle.sync_peer(&peer, SyncMode::Direct).await {
                warn!(peer = %peer, error = %err, "immediate sync failed");
            }
        }

        Ok(id)
    }

    /// Seal `plaintext` to `recipient` and post it addressed to them.
    pub async fn post_sealed(&self, recipient: Pubkey, plaintext: &[u8]) -> Result<MessageId> {
        let sealed = seal::seal(&recipient, plaintext)?;
        self.post(sealed, vec![recipient]).await
    }

    /// Open a message sealed to this node. `None` if it was not sealed to
    /// us or was tampered with.
    pub fn open(&self, message: &Message) -> Option<Vec<u8>> {
        self.ctx.keypair.privkey().decrypt(&message.data)
    }

    /// The whole log, oldest first.
    pub async fn messages(&self) -> Result<Vec<StoredMessage>> {
        let limit = self.ctx.syncer.config().batch_size;
        let mut out = Vec::new();
        let mut after = 0;
        loop {
            let page = self.ctx.store.messages_after(after, limit).await?;
            match page.last() {
                Some(last) => after = last.seq,
                None => return Ok(out),
            }
            out.extend(page);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Contacts
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_contact(&self, contact: Contact) -> Result<()> {
        self.ctx.store.upsert_contact(&contact).await?;
        Ok(())
    }

    /// Returns whether the contact existed.
    pub async fn remove_contact(&self, peer: &PeerId) -> Result<bool> {
        Ok(self.ctx.store.remove_contact(peer).await?)
    }

    pub async fn contacts(&self) -> Result<Vec<Contact>> {
        Ok(self.ctx.store.list_contacts().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connections
    // ─────────────────────────────────────────────────────────────────────────

    /// Hand a stream a remote peer opened to the multiplexer for
    /// negotiation.
    pub async fn accept(&self, stream: Box<dyn Stream>) -> Result<()> {
        self.handle.accept(stream).await.map_err(|_| NodeError::Stopped)
    }

    /// Open a stream to `address` and negotiate it.
    pub async fn connect(&self, transport: &dyn Transport, address: &Multiaddr) -> Result<()> {
        let stream = transport.connect(address).await?;
        self.handle
            .accept_outbound(stream)
            .await
            .map_err(|_| NodeError::Stopped)
    }

    /// Consume `transport`'s events until it ends or the node stops.
    ///
    /// Incoming streams are accepted. Discovered peers are connected to when
    /// `auto_connect` is set; of two peers that find each other only the
    /// one with the lower address dials.
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        let task = drive_transport(
            self.ctx.clone(),
            self.handle.clone(),
            transport,
            self.auto_connect,
        );
        self.tasks().spawn(task);
    }

    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.handle.peers().await
    }

    /// Run a sync round with a connected peer now.
    pub async fn sync_with(&self, peer: &PeerId, mode: SyncMode) -> Result<SyncReport> {
        Ok(self.handle.sync_peer(peer, mode).await?)
    }

    /// Stop every task the node started and wait for them.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let mut tasks = std::mem::take(&mut *self.tasks());
        while let Some(done) = tasks.join_next().await {
            if let Err(err) = done {
                if err.is_panic() {
                    warn!(error = %err, "node task panicked");
                }
            }
        }
        info!(peer = %self.peer_id, "node stopped");
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn drive_transport(
    ctx: Context<dyn Store>,
    handle: MultiplexerHandle<dyn Store>,
    transport: Arc<dyn Transport>,
    auto_connect: bool,
) {
    let local = transport.local_address();
    debug!(address = %local, "transport attached");

    loop {
        let event = tokio::select! {
            _ = ctx.shutdown_requested() => return,
            event = transport.next_event() => match event {
                Some(event) => event,
                None => {
                    debug!(address = %local, "transport ended");
                    return;
                }
            },
        };

        match event {
            TransportEvent::Discovered {
                address,
                advertisement,
            } => {
                debug!(address = %address, name = ?advertisement.local_name, "discovered peer");
                if !auto_connect || !dials(&local, &address) {
                    continue;
                }
                match transport.connect(&address).await {
                    Ok(stream) => {
                        if handle.accept_outbound(stream).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => warn!(address = %address, error = %err, "connect failed"),
                }
            }
            TransportEvent::Connected { address, stream } => {
                debug!(address = %address, "incoming stream");
                if handle.accept(stream).await.is_err() {
                    return;
                }
            }
            TransportEvent::Disconnected { address } => {
                debug!(address = %address, "transport peer gone");
            }
            TransportEvent::Data { address, bytes } => {
                trace!(address = %address, len = bytes.len(), "ignoring out-of-band data");
            }
        }
    }
}

/// Tie-break so two peers discovering each other open one stream, not two.
fn dials(local: &Multiaddr, remote: &Multiaddr) -> bool {
    local.to_bytes() < remote.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::Uuid;
    use murmur_store::MemoryStore;

    fn start() -> Node {
        Node::start(
            Keypair::generate(),
            Arc::new(MemoryStore::new()),
            NodeConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_post_appends_to_log() {
        let node = start();
        let bob = Keypair::generate().pubkey();

        let id = node.post(b"hello".to_vec(), vec![bob]).await.unwrap();

        let log = node.messages().await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message.id(), id);
        assert!(log[0].message.is_addressed_to(&bob));
        assert!(log[0].message.is_intact());
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_messages_pages_through_log() {
        let node = Node::start(
            Keypair::generate(),
            Arc::new(MemoryStore::new()),
            NodeConfig::default().with_sync(SyncConfig::default().with_batch_size(2)),
        );
        for n in 0..5u8 {
            node.post(vec![n], vec![]).await.unwrap();
        }

        let seqs: Vec<u64> = node.messages().await.unwrap().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_sealed_message_opens_only_for_recipient() {
        let alice = start();
        let bob = start();

        alice.post_sealed(bob.public_key(), b"secret").await.unwrap();
        let stored = alice.messages().await.unwrap().remove(0).message;

        assert_eq!(bob.open(&stored).as_deref(), Some(&b"secret"[..]));
        assert!(alice.open(&stored).is_none());
        assert!(stored.is_addressed_to(&bob.public_key()));
    }

    #[tokio::test]
    async fn test_contacts() {
        let node = start();
        let bob = Contact::new(Keypair::generate().pubkey()).with_name("bob");

        node.add_contact(bob.clone()).await.unwrap();
        assert_eq!(node.contacts().await.unwrap(), vec![bob.clone()]);

        assert!(node.remove_contact(&bob.peer_id()).await.unwrap());
        assert!(!node.remove_contact(&bob.peer_id()).await.unwrap());
        assert!(node.contacts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_after_shutdown() {
        let node = start();
        node.shutdown().await;

        let (stream, _peer) = murmur_sync::stream::memory::pair();
        assert!(matches!(
            node.accept(Box::new(stream)).await,
            Err(NodeError::Stopped)
        ));
    }

    #[test]
    fn test_exactly_one_side_dials() {
        let a = Multiaddr::bluetooth(Uuid::from_bytes([1; 16]));
        let b = Multiaddr::bluetooth(Uuid::from_bytes([2; 16]));
        assert!(dials(&a, &b));
        assert!(!dials(&b, &a));
        assert!(!dials(&a, &a));
    }
}
