//! Known peers.

use serde::{Deserialize, Serialize};

use crate::crypto::Pubkey;
use crate::multiaddr::Multiaddr;
use crate::peer_id::PeerId;

/// A peer this node has authenticated or been told about.
///
/// `last_sync` is Unix milliseconds of the start of the last successful
/// sync round with this peer, 0 if there was none.
///
/// The peer id is derived from `pubkey`. It is not serialized and is
/// recomputed on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ContactFields")]
pub struct Contact {
    pub name: Option<String>,
    pub known_addrs: Vec<Multiaddr>,
    pub last_sync: i64,
    pub pubkey: Pubkey,
    #[serde(skip)]
    peer_id: PeerId,
}

#[derive(Deserialize)]
struct ContactFields {
    name: Option<String>,
    known_addrs: Vec<Multiaddr>,
    last_sync: i64,
    pubkey: Pubkey,
}

impl From<ContactFields> for Contact {
    fn from(fields: ContactFields) -> Self {
        Self {
            name: fields.name,
            known_addrs: fields.known_addrs,
            last_sync: fields.last_sync,
            peer_id: PeerId::from_pubkey(&fields.pubkey),
            pubkey: fields.pubkey,
        }
    }
}

impl Contact {
    pub fn new(pubkey: Pubkey) -> Self {
        Self {
            name: None,
            known_addrs: Vec::new(),
            last_sync: 0,
            peer_id: PeerId::from_pubkey(&pubkey),
            pubkey,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Remember `addr`, ignoring duplicates.
    pub fn with_address(mut self, addr: Multiaddr) -> Self {
        self.add_address(addr);
        self
    }

    pub fn add_address(&mut self, addr: Multiaddr) {
        if !self.known_addrs.contains(&addr) {
            self.known_addrs.push(addr);
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn has_synced(&self) -> bool {
        self.last_sync > 0
    }
}
