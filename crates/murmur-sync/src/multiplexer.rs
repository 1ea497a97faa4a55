//! Running many connections at once.
//!
//! The [`ConnectionMultiplexer`] takes raw streams from a channel, runs the
//! handshake for each in its own task, and for every negotiated peer
//! starts two tasks: a receive loop feeding the log and a periodic sync
//! loop replaying it. When either loop ends the other is aborted, the
//! stream is closed and the peer is unregistered.
//!
//! A peer has at most one registered connection. When a second one
//! negotiates, both ends keep the stream dialed by the lower peer id and
//! close the other, so two peers dialing each other at once still end up
//! sharing one stream.
//!
//! Everything a task needs travels in an explicit [`Context`], including
//! the shutdown signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use murmur_core::{Keypair, PeerId};
use murmur_store::Store;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::connection::Connection;
use crate::error::{Result, SyncError};
use crate::handshake::HandshakeConfig;
use crate::stream::Stream;
use crate::syncer::{SyncMode, SyncReport, Syncer};

/// Multiplexer settings.
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Time between periodic sync rounds. The first round runs right after
    /// the handshake.
    pub sync_interval: Duration,
    /// Streams that may wait for a handshake slot.
    pub incoming_queue: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(120),
            incoming_queue: 64,
        }
    }
}

impl MultiplexerConfig {
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_incoming_queue(mut self, size: usize) -> Self {
        self.incoming_queue = size.max(1);
        self
    }
}

/// Trigger for a [`Context`]'s shutdown signal. Dropping it also shuts
/// down.
#[derive(Debug)]
pub struct Shutdown(watch::Sender<bool>);

impl Shutdown {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}

/// Shared state handed to every multiplexer task.
pub struct Context<S: ?Sized> {
    pub keypair: Arc<Keypair>,
    pub store: Arc<S>,
    pub syncer: Arc<Syncer<S>>,
    pub handshake: HandshakeConfig,
    pub config: MultiplexerConfig,
    shutdown: watch::Receiver<bool>,
}

impl<S: Store + ?Sized> Context<S> {
    pub fn new(
        keypair: Arc<Keypair>,
        syncer: Arc<Syncer<S>>,
        handshake: HandshakeConfig,
        config: MultiplexerConfig,
    ) -> (Self, Shutdown) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            keypair,
            store: syncer.store().clone(),
            syncer,
            handshake,
            config,
            shutdown: rx,
        };
        (ctx, Shutdown(tx))
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown is triggered or its trigger is dropped.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown.clone();
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

impl<S: ?Sized> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            keypair: self.keypair.clone(),
            store: self.store.clone(),
            syncer: self.syncer.clone(),
            handshake: self.handshake.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Which end opened a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Inbound,
    Outbound,
}

struct Registered {
    conn: Arc<Connection>,
    direction: Direction,
}

type Registry = Arc<RwLock<HashMap<PeerId, Registered>>>;
type Incoming = (Box<dyn Stream>, Direction);

/// Whether a stream to `remote` was dialed by the lower of the two peer
/// ids. Both ends compute the same answer for the same stream.
fn dialed_by_lower(local: &PeerId, remote: &PeerId, direction: Direction) -> bool {
    match direction {
        Direction::Outbound => local < remote,
        Direction::Inbound => remote < local,
    }
}

/// Accepts streams and runs their connections. See the module docs.
pub struct ConnectionMultiplexer<S: ?Sized> {
    ctx: Context<S>,
    incoming: mpsc::Receiver<Incoming>,
    registry: Registry,
}

/// Cloneable handle to a running [`ConnectionMultiplexer`].
pub struct MultiplexerHandle<S: ?Sized> {
    incoming: mpsc::Sender<Incoming>,
    registry: Registry,
    syncer: Arc<Syncer<S>>,
}

impl<S: ?Sized> Clone for MultiplexerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            incoming: self.incoming.clone(),
            registry: self.registry.clone(),
            syncer: self.syncer.clone(),
        }
    }
}

impl<S: Store + ?Sized + 'static> ConnectionMultiplexer<S> {
    pub fn new(ctx: Context<S>) -> (Self, MultiplexerHandle<S>) {
        let (tx, rx) = mpsc::channel(ctx.config.incoming_queue.max(1));
        let registry = Registry::default();
        let handle = MultiplexerHandle {
            incoming: tx,
            registry: registry.clone(),
            syncer: ctx.syncer.clone(),
        };
        let mux = Self {
            ctx,
            incoming: rx,
            registry,
        };
        (mux, handle)
    }

    /// Accept streams until shutdown or until every handle is dropped,
    /// then wait for all connections to wind down.
    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.ctx.shutdown_requested() => break,
                stream = self.incoming.recv() => match stream {
                    Some((stream, direction)) => {
                        tasks.spawn(serve(self.ctx.clone(), self.registry.clone(), stream, direction));
                    }
                    None => break,
                },
                Some(done) = tasks.join_next(), if !tasks.is_empty() => log_join(done),
            }
        }

        debug!(active = tasks.len(), "multiplexer stopping");
        self.incoming.close();
        while let Some(done) = tasks.join_next().await {
            log_join(done);
        }
    }
}

fn log_join(done: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = done {
        if err.is_panic() {
            warn!(error = %err, "connection task panicked");
        }
    }
}

/// Negotiate one stream and, if the handshake passes, run it to completion.
async fn serve<S: Store + ?Sized + 'static>(
    ctx: Context<S>,
    registry: Registry,
    stream: Box<dyn Stream>,
    direction: Direction,
) {
    let negotiated = tokio::select! {
        _ = ctx.shutdown_requested() => return,
        result = Connection::negotiate(stream, &ctx.keypair, &ctx.handshake, ctx.store.as_ref()) => result,
    };
    let conn = match negotiated {
        Ok(conn) => Arc::new(conn),
        Err(err) => {
            warn!(error = %err, "handshake failed");
            return;
        }
    };
    let peer = conn.peer_id();
    let local = PeerId::from_pubkey(&ctx.keypair.pubkey());
    let new_wins = dialed_by_lower(&local, &peer, direction);

    let mut peers = registry.write().await;
    let keep_existing = peers
        .get(&peer)
        .map_or(false, |existing| !new_wins || dialed_by_lower(&local, &peer, existing.direction));
    if keep_existing {
        drop(peers);
        debug!(peer = %peer, ?direction, "already connected, dropping new stream");
        conn.close().await;
        return;
    }
    let replaced = peers.insert(
        peer,
        Registered {
            conn: conn.clone(),
            direction,
        },
    );
    drop(peers);
    if let Some(old) = replaced {
        debug!(peer = %peer, "replacing stream dialed by the higher peer id");
        old.conn.close().await;
    }
    info!(peer = %peer, authenticated = conn.is_authenticated(), "peer connected");

    if let Some(contact) = conn.contact().await {
        match ctx.store.get_contact(&peer).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(err) = ctx.store.upsert_contact(&contact).await {
                    warn!(peer = %peer, error = %err, "failed to save contact");
                }
            }
            Err(err) => warn!(peer = %peer, error = %err, "contact lookup failed"),
        }
    }

    let mut receive = tokio::spawn(receive_loop(ctx.clone(), conn.clone()));
    let mut sync = tokio::spawn(sync_loop(ctx.clone(), conn.clone()));
    tokio::select! {
        _ = &mut receive => sync.abort(),
        _ = &mut sync => receive.abort(),
    }

    {
        let mut peers = registry.write().await;
        if peers.get(&peer).map_or(false, |current| Arc::ptr_eq(&current.conn, &conn)) {
            peers.remove(&peer);
        }
    }
    conn.close().await;
    info!(peer = %peer, "peer disconnected");
}

async fn receive_loop<S: Store + ?Sized>(ctx: Context<S>, conn: Arc<Connection>) {
    let peer = conn.peer_id();
    let max_size = ctx.syncer.config().max_message_size;

    loop {
        let message = tokio::select! {
            _ = ctx.shutdown_requested() => return,
            result = conn.read_message(max_size) => match result {
                Ok(message) => message,
                Err(err) => {
                    debug!(peer = %peer, error = %err, "receive loop ended");
                    return;
                }
            },
        };

        if !message.is_intact() {
            warn!(peer = %peer, size = message.header.size, "dropping corrupt message");
            continue;
        }

        let id = message.id();
        match ctx.syncer.ingest(&message).await {
            Ok(Some(seq)) => trace!(peer = %peer, id = %id, seq, "stored message"),
            Ok(None) => trace!(peer = %peer, id = %id, "already have message"),
            Err(err) => {
                warn!(peer = %peer, error = %err, "failed to store message");
                return;
            }
        }
    }
}

async fn sync_loop<S: Store + ?Sized>(ctx: Context<S>, conn: Arc<Connection>) {
    let peer = conn.peer_id();
    let mut ticker = tokio::time::interval(ctx.config.sync_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.shutdown_requested() => return,
            _ = ticker.tick() => {}
        }
        if !conn.is_valid() {
            return;
        }

        let mut guard = conn.lock().await;
        match ctx.syncer.sync(&mut guard, SyncMode::Full).await {
            Ok(report) => trace!(peer = %peer, sent = report.sent, "periodic sync"),
            Err(SyncError::Stream(err)) => {
                debug!(peer = %peer, error = %err, "sync loop ended");
                return;
            }
            Err(err) => warn!(peer = %peer, error = %err, "sync round failed"),
        }
    }
}

impl<S: Store + ?Sized + 'static> MultiplexerHandle<S> {
    /// Queue a stream a remote peer opened to us.
    pub async fn accept(&self, stream: Box<dyn Stream>) -> Result<()> {
        self.queue(stream, Direction::Inbound).await
    }

    /// Queue a stream this node dialed.
    pub async fn accept_outbound(&self, stream: Box<dyn Stream>) -> Result<()> {
        self.queue(stream, Direction::Outbound).await
    }

    async fn queue(&self, stream: Box<dyn Stream>, direction: Direction) -> Result<()> {
        self.incoming
            .send((stream, direction))
            .await
            .map_err(|_| SyncError::Stopped)
    }

    pub async fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.registry.read().await.keys().copied().collect();
        peers.sort();
        peers
    }

    pub async fn connection(&self, peer: &PeerId) -> Option<Arc<Connection>> {
        self.registry.read().await.get(peer).map(|entry| entry.conn.clone())
    }

    pub async fn is_connected(&self, peer: &PeerId) -> bool {
        self.registry.read().await.contains_key(peer)
    }

    /// Run one sync round with `peer` now, under its connection lock.
    pub async fn sync_peer(&self, peer: &PeerId, mode: SyncMode) -> Result<SyncReport> {
        let conn = self
            .connection(peer)
            .await
            .ok_or(SyncError::NotConnected(*peer))?;
        let mut guard = conn.lock().await;
        self.syncer.sync(&mut guard, mode).await
    }
}
