//! # Storage
//!
//! Client and file state behind the dispatcher.
//!
//! ## Components
//! - **Persistence**: the metadata collaborator interface, implemented by [`SqliteStore`]
//! - **Sessions**: [`ClientSessions`], the write-through in-memory cache of client records
//! - **Vault**: [`FileVault`], where received file contents are written
//!
//! Files are never cached; every file operation goes straight to the persistence layer.

pub mod sessions;
pub mod sqlite;
pub mod vault;

use crate::core::frame::ClientId;
use crate::error::Result;
use crate::utils::crypto::SymmetricKey;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

pub use sessions::{is_valid_name, ClientSessions};
pub use sqlite::SqliteStore;
pub use vault::FileVault;

/// A registered client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    /// DER public key, set once by PUBLIC_KEY
    pub public_key: Option<Vec<u8>>,
    /// Replaced on every successful key exchange
    pub aes_key: Option<SymmetricKey>,
    pub last_seen: DateTime<Utc>,
}

impl ClientRecord {
    /// A freshly registered client: no keys yet, seen now
    pub fn new(id: ClientId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            public_key: None,
            aes_key: None,
            last_seen: Utc::now(),
        }
    }
}

/// A received file, keyed by `(client_id, filename)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub client_id: ClientId,
    pub filename: String,
    pub path: PathBuf,
    pub verified: bool,
}

/// Metadata store consumed by the session cache and the dispatcher.
///
/// Mutators return `UnknownClient` when they target a client row that does not
/// exist, except `update_last_seen`, which ignores unknown ids.
pub trait Persistence {
    fn load_all_clients(&self) -> Result<Vec<ClientRecord>>;
    fn insert_client(&mut self, record: &ClientRecord) -> Result<()>;
    fn exists_by_name(&self, name: &str) -> Result<bool>;
    fn exists_by_id(&self, id: &ClientId) -> Result<bool>;
    fn has_public_key(&self, id: &ClientId) -> Result<bool>;
    fn set_public_key(&mut self, id: &ClientId, key: &[u8]) -> Result<()>;
    fn set_aes_key(&mut self, id: &ClientId, key: &SymmetricKey) -> Result<()>;
    fn get_aes_key(&self, id: &ClientId) -> Result<Option<SymmetricKey>>;
    fn get_public_key(&self, id: &ClientId) -> Result<Option<Vec<u8>>>;
    fn update_last_seen(&mut self, id: &ClientId, at: DateTime<Utc>) -> Result<()>;

    fn file_exists(&self, id: &ClientId, filename: &str) -> Result<bool>;
    fn delete_file(&mut self, id: &ClientId, filename: &str) -> Result<()>;
    /// Insert a new, unverified file row
    fn insert_file(&mut self, id: &ClientId, filename: &str, path: &std::path::Path) -> Result<()>;
    /// Drop any row for `(id, filename)` and insert a new, unverified one, atomically.
    ///
    /// On failure the previous row, if any, is left untouched.
    fn replace_file(&mut self, id: &ClientId, filename: &str, path: &std::path::Path) -> Result<()>;
    /// Idempotent; a missing row is not an error
    fn mark_file_verified(&mut self, id: &ClientId, filename: &str) -> Result<()>;
    fn file_record(&self, id: &ClientId, filename: &str) -> Result<Option<FileRecord>>;
}
