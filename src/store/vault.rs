//! File vault: received contents land at `<base>/<client id hex>/<filename>`.

use crate::core::frame::ClientId;
use crate::error::{ProtocolError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FileVault {
    base: PathBuf,
}

/// Reject names that could leave the client's directory.
pub fn validate_filename(filename: &str) -> Result<()> {
    let unsafe_name = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(ProtocolError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

impl FileVault {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn path_for(&self, client_id: &ClientId, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.base.join(client_id.to_hex()).join(filename))
    }

    /// Write `contents`, replacing any previous file of that name. Returns the path written.
    pub fn save(&self, client_id: &ClientId, filename: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(client_id, filename)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), bytes = contents.len(), "Stored file");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_uses_hex_directory() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path());
        assert_eq!(vault.base(), dir.path());
        let id = ClientId([0xAB; 16]);

        let path = vault.save(&id, "hello.txt", b"hello world").unwrap();
        assert_eq!(path, dir.path().join("ab".repeat(16)).join("hello.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");

        vault.save(&id, "hello.txt", b"v2").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"v2");
    }

    #[test]
    fn traversal_names_are_refused() {
        let vault = FileVault::new("backups");
        let id = ClientId([1; 16]);
        for name in ["", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(matches!(
                vault.path_for(&id, name),
                Err(ProtocolError::InvalidFilename(_))
            ));
        }
        assert!(vault.path_for(&id, "report 2024.pdf").is_ok());
    }
}
