//! On-disk mirror of the permission document.
//!
//! The cache file is exclusively written by the sync engine and read
//! back for load and cancel. Every write goes to a temp sibling first
//! and is renamed into place, so a failed or partial write can never
//! clobber the last good copy.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::table::PermissionTable;

pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create the cache directory if it does not exist yet.
    pub fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Strict parse of the cached document. A malformed file yields a
    /// parse error carrying the decoder message; the caller's
    /// in-memory table is only ever replaced on success.
    pub fn read(&self) -> Result<PermissionTable> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let table = serde_json::from_reader(reader)?;
        Ok(table)
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    pub fn write(&self, table: &PermissionTable) -> Result<()> {
        let bytes = table.to_json_bytes()?;
        self.write_bytes_atomic(&bytes)
    }

    /// Write through a temp sibling and rename into place.
    pub fn write_bytes_atomic(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_parent()?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &self.path)?;
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "cache file replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::table::PermissionRecord;

    fn cache_in(dir: &tempfile::TempDir) -> LocalCache {
        LocalCache::new(dir.path().join("cache").join("permissions.json"))
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        let mut table = PermissionTable::new();
        table
            .insert(PermissionRecord::new("Upload", true, vec!["SW".into()]).unwrap())
            .unwrap();
        cache.write(&table).unwrap();

        assert!(cache.exists());
        assert_eq!(cache.read().unwrap(), table);
    }

    #[test]
    fn read_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        assert!(matches!(cache.read(), Err(SyncError::Io(_))));
    }

    #[test]
    fn malformed_document_surfaces_the_decoder_message() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.write_bytes_atomic(b"{\"Permissions\": not json").unwrap();

        let err = cache.read().unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.write_bytes_atomic(b"{}").unwrap();

        let entries: Vec<_> = fs::read_dir(cache.path().parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("permissions.json")]);
    }
}
