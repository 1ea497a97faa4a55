//! Transport abstraction.
//!
//! A transport finds peers and opens [`Stream`]s to them. Everything it
//! observes arrives through one event stream, [`Transport::next_event`],
//! which ends with `None` and is not restarted.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use murmur_core::{Multiaddr, Uuid};

use crate::error::TransportError;
use crate::stream::Stream;

/// What a peer announces while advertising.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: Option<String>,
    pub service_uuids: Vec<Uuid>,
}

/// Something the transport observed.
pub enum TransportEvent {
    /// An advertising peer was seen during a scan.
    Discovered {
        address: Multiaddr,
        advertisement: Advertisement,
    },
    /// A remote peer opened a stream to us.
    Connected {
        address: Multiaddr,
        stream: Box<dyn Stream>,
    },
    Disconnected { address: Multiaddr },
    /// Out-of-band bytes not tied to a stream.
    Data { address: Multiaddr, bytes: Bytes },
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered {
                address,
                advertisement,
            } => f
                .debug_struct("Discovered")
                .field("address", address)
                .field("advertisement", advertisement)
                .finish(),
            Self::Connected { address, .. } => f
                .debug_struct("Connected")
                .field("address", address)
                .finish_non_exhaustive(),
            Self::Disconnected { address } => f
                .debug_struct("Disconnected")
                .field("address", address)
                .finish(),
            Self::Data { address, bytes } => f
                .debug_struct("Data")
                .field("address", address)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// A way of reaching peers.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Our own address on this transport.
    fn local_address(&self) -> Multiaddr;

    /// Start (or replace) our advertisement.
    async fn advertise(&self, advertisement: Advertisement) -> Result<(), TransportError>;

    /// Look for advertising peers. Results arrive as
    /// [`TransportEvent::Discovered`].
    async fn scan(&self) -> Result<(), TransportError>;

    /// Open a stream to `address`.
    async fn connect(&self, address: &Multiaddr) -> Result<Box<dyn Stream>, TransportError>;

    /// The next event, or `None` once the transport is gone.
    async fn next_event(&self) -> Option<TransportEvent>;
}

/// A simple in-memory transport for testing.
///
/// Every transport on a [`MemoryNetwork`] gets a random bluetooth address.
/// Connecting creates an in-memory stream pair and hands the far end to
/// the target as a [`TransportEvent::Connected`].
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use tokio::sync::mpsc;

    use crate::stream::memory::pair;

    struct Endpoint {
        address: Multiaddr,
        events: mpsc::UnboundedSender<TransportEvent>,
        advertisement: Option<Advertisement>,
    }

    /// Shared state for the memory transport network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        endpoints: Mutex<HashMap<Uuid, Endpoint>>,
    }

    impl MemoryNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport attached to this network.
        pub fn create_transport(self: &Arc<Self>) -> MemoryTransport {
            let id = Uuid::new_v4();
            let address = Multiaddr::bluetooth(id);
            let (tx, rx) = mpsc::unbounded_channel();

            self.endpoints().insert(
                id,
                Endpoint {
                    address: address.clone(),
                    events: tx,
                    advertisement: None,
                },
            );

            MemoryTransport {
                id,
                address,
                network: Arc::clone(self),
                events: tokio::sync::Mutex::new(rx),
            }
        }

        /// Number of live transports.
        pub fn len(&self) -> usize {
            self.endpoints().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        fn endpoints(&self) -> MutexGuard<'_, HashMap<Uuid, Endpoint>> {
            // The map stays consistent across a panic in another holder.
            self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        id: Uuid,
        address: Multiaddr,
        network: Arc<MemoryNetwork>,
        events: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        fn local_address(&self) -> Multiaddr {
            self.address.clone()
        }

        async fn advertise(&self, advertisement: Advertisement) -> Result<(), TransportError> {
            let mut endpoints = self.network.endpoints();
            let endpoint = endpoints.get_mut(&self.id).ok_or(TransportError::Closed)?;
            endpoint.advertisement = Some(advertisement);
            Ok(())
        }

        async fn scan(&self) -> Result<(), TransportError> {
            let endpoints = self.network.endpoints();
            let me = endpoints.get(&self.id).ok_or(TransportError::Closed)?;

            for (id, endpoint) in endpoints.iter() {
                if *id == self.id {
                    continue;
                }
                if let Some(advertisement) = &endpoint.advertisement {
                    let _ = me.events.send(TransportEvent::Discovered {
                        address: endpoint.address.clone(),
                        advertisement: advertisement.clone(),
                    });
                }
            }
            Ok(())
        }

        async fn connect(&self, address: &Multiaddr) -> Result<Box<dyn Stream>, TransportError> {
            let target = address
                .bluetooth_uuid()
                .ok_or_else(|| TransportError::Unreachable(address.to_string()))?;
            if target == self.id {
                return Err(TransportError::Unreachable(format!("{address} (self)")));
            }

            let endpoints = self.network.endpoints();
            let endpoint = endpoints
                .get(&target)
                .ok_or_else(|| TransportError::Unreachable(address.to_string()))?;

            let (ours, theirs) = pair();
            endpoint
                .events
                .send(TransportEvent::Connected {
                    address: self.address.clone(),
                    stream: Box::new(theirs),
                })
                .map_err(|_| TransportError::Unreachable(address.to_string()))?;
            Ok(Box::new(ours))
        }

        async fn next_event(&self) -> Option<TransportEvent> {
            self.events.lock().await.recv().await
        }
    }

    impl Drop for MemoryTransport {
        fn drop(&mut self) {
            let mut endpoints = self.network.endpoints();
            endpoints.remove(&self.id);
            for endpoint in endpoints.values() {
                let _ = endpoint.events.send(TransportEvent::Disconnected {
                    address: self.address.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;

    #[tokio::test]
    async fn test_scan_finds_advertisers_only() {
        let network = MemoryNetwork::new();
        let a = network.create_transport();
        let b = network.create_transport();
        let _quiet = network.create_transport();

        let ad = Advertisement {
            local_name: Some("bob".into()),
            service_uuids: vec![Uuid::nil()],
        };
        b.advertise(ad.clone()).await.unwrap();
        a.scan().await.unwrap();

        match a.next_event().await {
            Some(TransportEvent::Discovered {
                address,
                advertisement,
            }) => {
                assert_eq!(address, b.local_address());
                assert_eq!(advertisement, ad);
            }
            other => panic!("expected Discovered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_delivers_stream() {
        let network = MemoryNetwork::new();
        let a = network.create_transport();
        let b = network.create_transport();

        let ours = a.connect(&b.local_address()).await.unwrap();
        let theirs = match b.next_event().await {
            Some(TransportEvent::Connected { address, stream }) => {
                assert_eq!(address, a.local_address());
                stream
            }
            other => panic!("expected Connected, got {other:?}"),
        };

        ours.write(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        theirs.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_connect_unknown_address() {
        let network = MemoryNetwork::new();
        let a = network.create_transport();
        let nowhere = Multiaddr::bluetooth(Uuid::new_v4());

        assert!(matches!(
            a.connect(&nowhere).await,
            Err(TransportError::Unreachable(_))
        ));
        assert!(matches!(
            a.connect(&a.local_address()).await,
            Err(TransportError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_drop_notifies_peers() {
        let network = MemoryNetwork::new();
        let a = network.create_transport();
        let b = network.create_transport();
        let b_address = b.local_address();
        assert_eq!(network.len(), 2);

        drop(b);

        assert_eq!(network.len(), 1);
        match a.next_event().await {
            Some(TransportEvent::Disconnected { address }) => assert_eq!(address, b_address),
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }
}
