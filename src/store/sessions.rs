//! Write-through cache of client records.
//!
//! Loaded in full from the persistence layer at startup. Every mutation writes the
//! store first and only touches the cache once the store accepted it, so a failed
//! write leaves both sides unchanged.
//!
//! Not synchronized: the cache is owned by the dispatcher and mutated from the
//! single server task only.

use super::{ClientRecord, Persistence};
use crate::core::frame::{ClientId, NAME_SIZE};
use crate::error::{ProtocolError, Result};
use crate::utils::crypto::SymmetricKey;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::HashMap;
use tracing::debug;

/// Registration name rule: non-empty, at most 255 bytes, alphanumerics and spaces only,
/// with at least one alphanumeric.
pub fn is_valid_name(name: &str) -> bool {
    name.len() <= NAME_SIZE
        && name.chars().any(char::is_alphanumeric)
        && name.chars().all(|c| c == ' ' || c.is_alphanumeric())
}

pub struct ClientSessions<P: Persistence> {
    store: P,
    clients: HashMap<ClientId, ClientRecord>,
}

impl<P: Persistence> ClientSessions<P> {
    /// Build the cache from every client row in `store`.
    pub fn load(store: P) -> Result<Self> {
        let clients = store
            .load_all_clients()?
            .into_iter()
            .map(|record| (record.id, record))
            .collect::<HashMap<_, _>>();
        debug!(clients = clients.len(), "Client session cache loaded");
        Ok(Self { store, clients })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, id: &ClientId) -> Option<&ClientRecord> {
        self.clients.get(id)
    }

    pub fn exists_by_name(&self, name: &str) -> bool {
        self.clients.values().any(|record| record.name == name)
    }

    pub fn exists_by_id(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn has_public_key(&self, id: &ClientId) -> bool {
        self.clients
            .get(id)
            .is_some_and(|record| record.public_key.is_some())
    }

    pub fn public_key(&self, id: &ClientId) -> Option<&[u8]> {
        self.clients.get(id)?.public_key.as_deref()
    }

    pub fn aes_key(&self, id: &ClientId) -> Option<SymmetricKey> {
        self.clients.get(id)?.aes_key
    }

    /// Random id not held by any known client (rejection sampling).
    pub fn generate_id(&self) -> ClientId {
        let mut rng = rand::rng();
        loop {
            let mut id = ClientId::default();
            rng.fill_bytes(&mut id.0);
            if !id.is_zero() && !self.clients.contains_key(&id) {
                return id;
            }
        }
    }

    /// Create a client under a fresh id. `None` if the name is already taken.
    pub fn register(&mut self, name: &str) -> Result<Option<ClientRecord>> {
        if self.exists_by_name(name) {
            return Ok(None);
        }
        let record = ClientRecord::new(self.generate_id(), name);
        self.store.insert_client(&record)?;
        self.clients.insert(record.id, record.clone());
        Ok(Some(record))
    }

    pub fn set_public_key(&mut self, id: &ClientId, key: &[u8]) -> Result<()> {
        self.require(id)?;
        self.store.set_public_key(id, key)?;
        if let Some(record) = self.clients.get_mut(id) {
            record.public_key = Some(key.to_vec());
        }
        Ok(())
    }

    pub fn set_aes_key(&mut self, id: &ClientId, key: SymmetricKey) -> Result<()> {
        self.require(id)?;
        self.store.set_aes_key(id, &key)?;
        if let Some(record) = self.clients.get_mut(id) {
            record.aes_key = Some(key);
        }
        Ok(())
    }

    /// Record activity for `id`; unknown ids are ignored.
    pub fn touch(&mut self, id: &ClientId, at: DateTime<Utc>) -> Result<()> {
        if !self.clients.contains_key(id) {
            return Ok(());
        }
        self.store.update_last_seen(id, at)?;
        if let Some(record) = self.clients.get_mut(id) {
            record.last_seen = at;
        }
        Ok(())
    }

    /// The backing store, for file metadata which is not cached
    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut P {
        &mut self.store
    }

    fn require(&self, id: &ClientId) -> Result<()> {
        if self.clients.contains_key(id) {
            Ok(())
        } else {
            Err(ProtocolError::UnknownClient(id.to_hex()))
        }
    }
}
