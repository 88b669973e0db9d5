//! SQLite implementation of [`Persistence`].

use super::{ClientRecord, FileRecord, Persistence};
use crate::core::frame::ClientId;
use crate::error::{ProtocolError, Result};
use crate::utils::crypto::SymmetricKey;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS clients (
        ID BLOB(16) NOT NULL PRIMARY KEY,
        Name VARCHAR(255) NOT NULL UNIQUE,
        PublicKey BLOB(160),
        LastSeen TIMESTAMP NOT NULL,
        AESKey BLOB(16)
    );
    CREATE TABLE IF NOT EXISTS files (
        ID BLOB(16) NOT NULL,
        Filename VARCHAR(255) NOT NULL,
        Path VARCHAR(255) NOT NULL UNIQUE,
        Verified BIT NOT NULL DEFAULT 0,
        PRIMARY KEY (ID, Filename),
        FOREIGN KEY (ID) REFERENCES clients(ID)
    );
"#;

/// Client and file metadata in one SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the database at `path`, creating the schema if the file is new.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            conn: Connection::open(path)?,
        };
        store.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if is_new {
            info!(path = %path.display(), "Creating metadata database");
            store.create_tables()?;
        }
        Ok(store)
    }

    /// In-memory database with the schema applied
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        store.create_tables()?;
        Ok(store)
    }

    pub fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn map_client(row: &Row<'_>) -> rusqlite::Result<ClientRecord> {
        let id: Vec<u8> = row.get("ID")?;
        let aes_key: Option<Vec<u8>> = row.get("AESKey")?;
        Ok(ClientRecord {
            id: ClientId::from_slice(&id)
                .ok_or_else(|| rusqlite::Error::InvalidColumnType(0, "ID".into(), Type::Blob))?,
            name: row.get("Name")?,
            public_key: row.get("PublicKey")?,
            aes_key: aes_key.and_then(|key| key.try_into().ok()),
            last_seen: row.get("LastSeen")?,
        })
    }

    fn expect_client_row(changed: usize, id: &ClientId) -> Result<()> {
        if changed == 0 {
            return Err(ProtocolError::UnknownClient(id.to_hex()));
        }
        Ok(())
    }
}

impl Persistence for SqliteStore {
    fn load_all_clients(&self) -> Result<Vec<ClientRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT ID, Name, PublicKey, LastSeen, AESKey FROM clients")?;
        let rows = stmt.query_map([], Self::map_client)?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        debug!(count = clients.len(), "Loaded client records");
        Ok(clients)
    }

    fn insert_client(&mut self, record: &ClientRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO clients (ID, Name, PublicKey, LastSeen, AESKey)
            VALUES (:id, :name, :public_key, :last_seen, :aes_key)
        "#,
            named_params! {
                ":id": record.id.as_bytes().as_slice(),
                ":name": &record.name,
                ":public_key": record.public_key.as_deref(),
                ":last_seen": record.last_seen,
                ":aes_key": record.aes_key.as_ref().map(|k| k.as_slice()),
            },
        )?;
        Ok(())
    }

    fn exists_by_name(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM clients WHERE Name = ?1", params![name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn exists_by_id(&self, id: &ClientId) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM clients WHERE ID = ?1",
                params![id.as_bytes().as_slice()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn has_public_key(&self, id: &ClientId) -> Result<bool> {
        Ok(self.get_public_key(id)?.is_some())
    }

    fn set_public_key(&mut self, id: &ClientId, key: &[u8]) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE clients SET PublicKey = ?1 WHERE ID = ?2",
            params![key, id.as_bytes().as_slice()],
        )?;
        Self::expect_client_row(changed, id)
    }

    fn set_aes_key(&mut self, id: &ClientId, key: &SymmetricKey) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE clients SET AESKey = ?1 WHERE ID = ?2",
            params![key.as_slice(), id.as_bytes().as_slice()],
        )?;
        Self::expect_client_row(changed, id)
    }

    fn get_aes_key(&self, id: &ClientId) -> Result<Option<SymmetricKey>> {
        let key: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                "SELECT AESKey FROM clients WHERE ID = ?1",
                params![id.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key.flatten().and_then(|k| k.try_into().ok()))
    }

    fn get_public_key(&self, id: &ClientId) -> Result<Option<Vec<u8>>> {
        let key: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                "SELECT PublicKey FROM clients WHERE ID = ?1",
                params![id.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key.flatten())
    }

    fn update_last_seen(&mut self, id: &ClientId, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE clients SET LastSeen = ?1 WHERE ID = ?2",
            params![at, id.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    fn file_exists(&self, id: &ClientId, filename: &str) -> Result<bool> {
        Ok(self.file_record(id, filename)?.is_some())
    }

    fn delete_file(&mut self, id: &ClientId, filename: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM files WHERE ID = ?1 AND Filename = ?2",
            params![id.as_bytes().as_slice(), filename],
        )?;
        Ok(())
    }

    fn insert_file(&mut self, id: &ClientId, filename: &str, path: &Path) -> Result<()> {
        self.conn.execute(
            "INSERT INTO files (ID, Filename, Path, Verified) VALUES (?1, ?2, ?3, 0)",
            params![
                id.as_bytes().as_slice(),
                filename,
                path.to_string_lossy().as_ref()
            ],
        )?;
        Ok(())
    }

    fn replace_file(&mut self, id: &ClientId, filename: &str, path: &Path) -> Result<()> {
        let tx = self.conn.transaction()?;
        let replaced = tx.execute(
            "DELETE FROM files WHERE ID = ?1 AND Filename = ?2",
            params![id.as_bytes().as_slice(), filename],
        )?;
        tx.execute(
            "INSERT INTO files (ID, Filename, Path, Verified) VALUES (?1, ?2, ?3, 0)",
            params![
                id.as_bytes().as_slice(),
                filename,
                path.to_string_lossy().as_ref()
            ],
        )?;
        tx.commit()?;
        debug!(filename, replaced = replaced > 0, "Stored file row");
        Ok(())
    }

    fn mark_file_verified(&mut self, id: &ClientId, filename: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET Verified = 1 WHERE ID = ?1 AND Filename = ?2",
            params![id.as_bytes().as_slice(), filename],
        )?;
        Ok(())
    }

    fn file_record(&self, id: &ClientId, filename: &str) -> Result<Option<FileRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT Path, Verified FROM files WHERE ID = ?1 AND Filename = ?2",
                params![id.as_bytes().as_slice(), filename],
                |row| {
                    let path: String = row.get(0)?;
                    let verified: bool = row.get(1)?;
                    Ok(FileRecord {
                        client_id: *id,
                        filename: filename.to_string(),
                        path: PathBuf::from(path),
                        verified,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}
