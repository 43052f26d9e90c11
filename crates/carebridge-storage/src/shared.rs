use crate::checksum::Digest;
use crate::encrypted::{EncryptedDatabase, OpenMode, ReadTx, WriteTx};
use crate::{Result, StorageError};
use carebridge_crypto::EnvelopeCipher;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Process-wide handle around the live database file.
///
/// Ordinary reads and writes share the guard. [`snapshot`](Self::snapshot)
/// and [`with_exclusive_swap`](Self::with_exclusive_swap) take it exclusively,
/// so the file is never read for export or replaced while a transaction runs.
pub struct SharedStore {
    path: PathBuf,
    cipher: Arc<EnvelopeCipher>,
    mode: OpenMode,
    buckets: Vec<String>,
    live: RwLock<Option<EncryptedDatabase>>,
}

impl SharedStore {
    pub fn open(
        path: impl AsRef<Path>,
        cipher: EnvelopeCipher,
        mode: OpenMode,
        buckets: &[&str],
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cipher = Arc::new(cipher);
        let db = EncryptedDatabase::open(&path, Arc::clone(&cipher), mode, buckets)?;
        Ok(Self {
            path,
            cipher,
            mode,
            buckets: buckets.iter().map(|b| b.to_string()).collect(),
            live: RwLock::new(Some(db)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn cipher(&self) -> Arc<EnvelopeCipher> {
        Arc::clone(&self.cipher)
    }

    pub fn view<T, E>(&self, f: impl FnOnce(&ReadTx<'_>) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let guard = self.live.read();
        let db = guard.as_ref().ok_or(StorageError::Closed)?;
        db.view(f)
    }

    pub fn update<T, E>(&self, f: impl FnOnce(&WriteTx<'_>) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let guard = self.live.read();
        let db = guard.as_ref().ok_or(StorageError::Closed)?;
        db.update(f)
    }

    pub fn checksum(&self) -> Result<Digest> {
        let guard = self.live.read();
        guard.as_ref().ok_or(StorageError::Closed)?.checksum()
    }

    /// Checksum and raw file bytes taken under one exclusive hold, so the two
    /// always describe the same state.
    pub fn snapshot(&self) -> Result<(Digest, Vec<u8>)> {
        let guard = self.live.write();
        let db = guard.as_ref().ok_or(StorageError::Closed)?;
        let digest = db.checksum()?;
        let bytes = std::fs::read(&self.path)?;
        Ok((digest, bytes))
    }

    /// Raw bytes of the database file, read while no transaction is open.
    pub fn export(&self) -> Result<Vec<u8>> {
        let guard = self.live.write();
        guard.as_ref().ok_or(StorageError::Closed)?;
        Ok(std::fs::read(&self.path)?)
    }

    /// Closes the live handle, renames `replacement` over the live path and
    /// reopens in the original mode, all while holding the guard exclusively.
    ///
    /// If the rename fails the original file is reopened and the rename error
    /// returned. If the rename succeeds but the new file cannot be opened, the
    /// handle stays closed: every later call fails with
    /// [`StorageError::Closed`] until the process opens the store again.
    /// `replacement` should live in the same directory so the rename stays
    /// atomic.
    pub fn with_exclusive_swap(&self, replacement: &Path) -> Result<()> {
        let mut guard = self.live.write();
        // redb holds a file lock; drop before touching the path.
        drop(guard.take());

        let bucket_refs = self.buckets.iter().map(String::as_str).collect::<Vec<_>>();
        if let Err(err) = std::fs::rename(replacement, &self.path) {
            error!(error = %err, path = %self.path.display(), "database swap rename failed");
            *guard = Some(EncryptedDatabase::open(
                &self.path,
                Arc::clone(&self.cipher),
                self.mode,
                &bucket_refs,
            )?);
            return Err(err.into());
        }

        let reopened = match EncryptedDatabase::open(
            &self.path,
            Arc::clone(&self.cipher),
            self.mode,
            &bucket_refs,
        ) {
            Ok(db) => db,
            Err(err) => {
                error!(
                    error = %err,
                    path = %self.path.display(),
                    "reopen after database swap failed; store is closed"
                );
                return Err(err);
            }
        };
        *guard = Some(reopened);
        info!(path = %self.path.display(), mode = ?self.mode, "database file swapped");
        Ok(())
    }

    /// Drops the live handle. Subsequent calls fail with [`StorageError::Closed`].
    pub fn close(&self) {
        drop(self.live.write().take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;
    use carebridge_crypto::EncryptionKey;
    use tempfile::TempDir;

    const BUCKETS: &[&str] = &["users"];

    #[test]
    fn swap_replaces_contents_and_keeps_mode() {
        let dir = TempDir::new().expect("tempdir");
        let key = EncryptionKey::generate();

        let source = SharedStore::open(
            dir.path().join("source.db"),
            EnvelopeCipher::new(&key),
            OpenMode::ReadWrite,
            BUCKETS,
        )
        .expect("source");
        source
            .update(|tx| tx.put("users", b"alice", b"1"))
            .expect("seed");
        let (digest, bytes) = source.snapshot().expect("snapshot");

        let live = SharedStore::open(
            dir.path().join("live.db"),
            EnvelopeCipher::new(&key),
            OpenMode::ReadWrite,
            BUCKETS,
        )
        .expect("live");
        assert_ne!(live.checksum().expect("checksum"), digest);

        let staged = dir.path().join("live.db.incoming");
        std::fs::write(&staged, &bytes).expect("stage");
        live.with_exclusive_swap(&staged).expect("swap");

        assert_eq!(live.checksum().expect("checksum"), digest);
        assert_eq!(live.mode(), OpenMode::ReadWrite);
        assert_eq!(
            live.view(|tx| tx.get("users", b"alice")).expect("view"),
            Some(b"1".to_vec())
        );
        assert!(!staged.exists());
        live.update(|tx| tx.put("users", b"bob", b"2"))
            .expect("still writable");
    }

    #[test]
    fn failed_rename_reopens_original() {
        let dir = TempDir::new().expect("tempdir");
        let store = SharedStore::open(
            dir.path().join("live.db"),
            EnvelopeCipher::new(&EncryptionKey::generate()),
            OpenMode::ReadWrite,
            BUCKETS,
        )
        .expect("open");
        store
            .update(|tx| tx.put("users", b"keep", b"me"))
            .expect("seed");

        let err = store
            .with_exclusive_swap(&dir.path().join("missing.db"))
            .expect_err("rename");
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(
            store.view(|tx| tx.get("users", b"keep")).expect("view"),
            Some(b"me".to_vec())
        );
    }

    #[test]
    fn unreadable_replacement_leaves_the_store_closed() {
        let dir = TempDir::new().expect("tempdir");
        let store = SharedStore::open(
            dir.path().join("live.db"),
            EnvelopeCipher::new(&EncryptionKey::generate()),
            OpenMode::ReadWrite,
            BUCKETS,
        )
        .expect("open");

        let staged = dir.path().join("live.db.incoming");
        std::fs::write(&staged, vec![0xAB; 8192]).expect("stage");
        assert!(store.with_exclusive_swap(&staged).is_err());
        assert!(!staged.exists());
        assert!(matches!(store.checksum(), Err(StorageError::Closed)));
        assert!(matches!(
            store.update(|tx| tx.put("users", b"a", b"1")),
            Err(StorageError::Closed)
        ));
    }

    #[test]
    fn closed_store_rejects_access() {
        let dir = TempDir::new().expect("tempdir");
        let store = SharedStore::open(
            dir.path().join("live.db"),
            EnvelopeCipher::new(&EncryptionKey::generate()),
            OpenMode::ReadWrite,
            BUCKETS,
        )
        .expect("open");
        store.close();
        assert!(matches!(store.checksum(), Err(StorageError::Closed)));
        assert!(matches!(
            store.view(|tx| tx.len("users")),
            Err(StorageError::Closed)
        ));
    }
}
