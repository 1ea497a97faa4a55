//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite, nothing persisted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use murmur_core::clock::now_millis;
use murmur_core::{Contact, Message, MessageId, PeerId};

use crate::error::{Result, StoreError};
use crate::traits::{Store, StoredMessage};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Log entries by position.
    log: BTreeMap<u64, StoredMessage>,

    /// Ids of everything in the log.
    ids: HashSet<MessageId>,

    contacts: HashMap<PeerId, Contact>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_message(&self, message: &Message) -> Result<u64> {
        let mut inner = self.write()?;

        let seq = inner.log.keys().next_back().map_or(1, |last| last + 1);
        inner.ids.insert(message.id());
        inner.log.insert(
            seq,
            StoredMessage {
                seq,
                message: message.clone(),
                stored_at: now_millis(),
            },
        );

        Ok(seq)
    }

    async fn get_message(&self, seq: u64) -> Result<Option<StoredMessage>> {
        Ok(self.read()?.log.get(&seq).cloned())
    }

    async fn messages_after(&self, after: u64, limit: usize) -> Result<Vec<StoredMessage>> {
        let inner = self.read()?;
        Ok(inner
            .log
            .range(after.saturating_add(1)..)
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn has_message(&self, id: &MessageId) -> Result<bool> {
        Ok(self.read()?.ids.contains(id))
    }

    async fn message_count(&self) -> Result<u64> {
        Ok(self.read()?.log.len() as u64)
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        self.write()?
            .contacts
            .insert(contact.peer_id(), contact.clone());
        Ok(())
    }

    async fn get_contact(&self, peer_id: &PeerId) -> Result<Option<Contact>> {
        Ok(self.read()?.contacts.get(peer_id).cloned())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        let inner = self.read()?;
        let mut contacts: Vec<Contact> = inner.contacts.values().cloned().collect();
        contacts.sort_by_key(|c| c.peer_id());
        Ok(contacts)
    }

    async fn remove_contact(&self, peer_id: &PeerId) -> Result<bool> {
        Ok(self.write()?.contacts.remove(peer_id).is_some())
    }

    async fn record_sync(&self, peer_id: &PeerId, at: i64) -> Result<()> {
        if let Some(contact) = self.write()?.contacts.get_mut(peer_id) {
            contact.last_sync = at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::Keypair;

    fn message(n: u8) -> Message {
        Message::new(vec![n; 8], vec![], 1_000 + n as u64)
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_seq() {
        let store = MemoryStore::new();
        assert_eq!(store.append_message(&message(1)).await.unwrap(), 1);
        assert_eq!(store.append_message(&message(2)).await.unwrap(), 2);
        assert_eq!(store.message_count().await.unwrap(), 2);

        let entry = store.get_message(2).await.unwrap().unwrap();
        assert_eq!(entry.message, message(2));
        assert!(store.get_message(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_does_not_dedupe() {
        let store = MemoryStore::new();
        store.append_message(&message(1)).await.unwrap();
        store.append_message(&message(1)).await.unwrap();

        assert_eq!(store.message_count().await.unwrap(), 2);
        assert!(store.has_message(&message(1).id()).await.unwrap());
        assert!(!store.has_message(&message(9).id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_messages_after_pages_in_order() {
        let store = MemoryStore::new();
        for n in 1..=5 {
            store.append_message(&message(n)).await.unwrap();
        }

        let page = store.messages_after(0, 2).await.unwrap();
        assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);

        let page = store.messages_after(2, 10).await.unwrap();
        assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4, 5]);

        assert!(store.messages_after(5, 10).await.unwrap().is_empty());
        assert!(store.messages_after(u64::MAX, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contacts() {
        let store = MemoryStore::new();
        let contact = Contact::new(Keypair::generate().pubkey()).with_name("carol");
        let peer = contact.peer_id();

        store.upsert_contact(&contact).await.unwrap();
        assert_eq!(store.get_contact(&peer).await.unwrap(), Some(contact.clone()));

        store.record_sync(&peer, 42).await.unwrap();
        assert_eq!(store.get_contact(&peer).await.unwrap().unwrap().last_sync, 42);

        assert_eq!(store.list_contacts().await.unwrap().len(), 1);
        assert!(store.remove_contact(&peer).await.unwrap());
        assert!(!store.remove_contact(&peer).await.unwrap());
        assert!(store.get_contact(&peer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_sync_ignores_unknown_peer() {
        let store = MemoryStore::new();
        let peer = PeerId::from_pubkey(&Keypair::generate().pubkey());
        store.record_sync(&peer, 7).await.unwrap();
        assert!(store.list_contacts().await.unwrap().is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn paging_visits_every_entry_once(count in 0usize..40, limit in 1usize..10) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                rt.block_on(async {
                    let store = MemoryStore::new();
                    for n in 0..count {
                        store.append_message(&message(n as u8)).await.unwrap();
                    }

                    let mut seen = Vec::new();
                    let mut after = 0;
                    loop {
                        let page = store.messages_after(after, limit).await.unwrap();
                        assert!(page.len() <= limit);
                        match page.last() {
                            Some(last) => after = last.seq,
                            None => break,
                        }
                        seen.extend(page.into_iter().map(|m| m.seq));
                    }
                    assert_eq!(seen, (1..=count as u64).collect::<Vec<_>>());
                });
            }
        }
    }
}
