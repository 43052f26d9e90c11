use crate::checksum::{self, Digest};
use crate::{Result, StorageError};
use carebridge_crypto::EnvelopeCipher;
use redb::{
    Database, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition, TableError,
    WriteTransaction,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A decrypted `(key, value)` pair in key order.
pub type Entry = (Vec<u8>, Vec<u8>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    ReadOnly,
}

impl OpenMode {
    pub fn is_read_only(self) -> bool {
        matches!(self, OpenMode::ReadOnly)
    }
}

fn definition(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

/// A single open `redb` file whose values are sealed with one cipher.
pub struct EncryptedDatabase {
    db: Database,
    cipher: Arc<EnvelopeCipher>,
    mode: OpenMode,
    path: PathBuf,
}

impl EncryptedDatabase {
    /// Opens `path`. In read-write mode the file is created if absent and
    /// every name in `buckets` is created if missing. Read-only mode requires
    /// an existing file and never creates anything.
    pub fn open(
        path: impl AsRef<Path>,
        cipher: Arc<EnvelopeCipher>,
        mode: OpenMode,
        buckets: &[&str],
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = match mode {
            OpenMode::ReadWrite => Database::create(&path)?,
            OpenMode::ReadOnly => Database::open(&path)?,
        };
        if mode == OpenMode::ReadWrite {
            let txn = db.begin_write()?;
            for bucket in buckets {
                txn.open_table(definition(bucket))?;
            }
            txn.commit()?;
        }
        debug!(path = %path.display(), ?mode, "opened encrypted database");
        Ok(Self {
            db,
            cipher,
            mode,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn begin_read(&self) -> Result<ReadTx<'_>> {
        Ok(ReadTx {
            txn: self.db.begin_read()?,
            cipher: &self.cipher,
        })
    }

    pub fn begin_write(&self) -> Result<WriteTx<'_>> {
        if self.mode.is_read_only() {
            return Err(StorageError::ReadOnly);
        }
        Ok(WriteTx {
            txn: self.db.begin_write()?,
            cipher: &self.cipher,
        })
    }

    /// Runs `f` against one read snapshot.
    pub fn view<T, E>(&self, f: impl FnOnce(&ReadTx<'_>) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let tx = self.begin_read()?;
        f(&tx)
    }

    /// Runs `f` inside one write transaction. `Ok` commits, `Err` aborts and
    /// leaves the database untouched.
    pub fn update<T, E>(&self, f: impl FnOnce(&WriteTx<'_>) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let tx = self.begin_write()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = tx.abort() {
                    warn!(error = %abort_err, "write transaction abort failed");
                }
                Err(err)
            }
        }
    }

    /// Logical SHA-256 over every bucket in name order.
    pub fn checksum(&self) -> Result<Digest> {
        let txn = self.db.begin_read()?;
        checksum::compute(&txn)
    }
}

/// Read operations shared by both transaction kinds.
pub trait Transaction {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Vec<Entry>>;

    fn len(&self, bucket: &str) -> Result<u64>;

    fn scan(&self, bucket: &str) -> Result<Vec<Entry>> {
        self.scan_prefix(bucket, &[])
    }

    fn contains(&self, bucket: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get(bucket, key)?.is_some())
    }

    fn bucket<'t>(&'t self, name: &'t str) -> Bucket<'t, Self>
    where
        Self: Sized,
    {
        Bucket { tx: self, name }
    }
}

fn get_in<T>(table: &T, cipher: &EnvelopeCipher, key: &[u8]) -> Result<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    match table.get(key)? {
        Some(sealed) => Ok(Some(cipher.open(sealed.value())?)),
        None => Ok(None),
    }
}

fn scan_in<T>(table: &T, cipher: &EnvelopeCipher, prefix: &[u8]) -> Result<Vec<Entry>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut entries = Vec::new();
    let start: &[u8] = prefix;
    for item in table.range(start..)? {
        let (key, sealed) = item?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        entries.push((key.to_vec(), cipher.open(sealed.value())?));
    }
    Ok(entries)
}

/// Snapshot read transaction.
pub struct ReadTx<'db> {
    txn: ReadTransaction,
    cipher: &'db EnvelopeCipher,
}

impl ReadTx<'_> {
    /// Missing buckets read as empty; read-only replicas may predate a bucket.
    fn table(&self, bucket: &str) -> Result<Option<redb::ReadOnlyTable<&'static [u8], &'static [u8]>>> {
        match self.txn.open_table(definition(bucket)) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl Transaction for ReadTx<'_> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.table(bucket)? {
            Some(table) => get_in(&table, self.cipher, key),
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Vec<Entry>> {
        match self.table(bucket)? {
            Some(table) => scan_in(&table, self.cipher, prefix),
            None => Ok(Vec::new()),
        }
    }

    fn len(&self, bucket: &str) -> Result<u64> {
        match self.table(bucket)? {
            Some(table) => Ok(table.len()?),
            None => Ok(0),
        }
    }
}

/// Exclusive write transaction. Reads inside it see its own writes.
pub struct WriteTx<'db> {
    txn: WriteTransaction,
    cipher: &'db EnvelopeCipher,
}

impl WriteTx<'_> {
    pub fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let sealed = self.cipher.seal(value)?;
        let mut table = self.txn.open_table(definition(bucket))?;
        table.insert(key, sealed.as_slice())?;
        Ok(())
    }

    /// Returns whether the key was present.
    pub fn delete(&self, bucket: &str, key: &[u8]) -> Result<bool> {
        let mut table = self.txn.open_table(definition(bucket))?;
        let removed = table.remove(key)?.is_some();
        Ok(removed)
    }

    fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    fn abort(self) -> Result<()> {
        self.txn.abort()?;
        Ok(())
    }
}

impl Transaction for WriteTx<'_> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.txn.open_table(definition(bucket))?;
        get_in(&table, self.cipher, key)
    }

    fn scan_prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Vec<Entry>> {
        let table = self.txn.open_table(definition(bucket))?;
        scan_in(&table, self.cipher, prefix)
    }

    fn len(&self, bucket: &str) -> Result<u64> {
        let table = self.txn.open_table(definition(bucket))?;
        Ok(table.len()?)
    }
}

/// A transaction narrowed to one bucket.
pub struct Bucket<'t, T> {
    tx: &'t T,
    name: &'t str,
}

impl<T: Transaction> Bucket<'_, T> {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.tx.get(self.name, key)
    }

    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
        self.tx.scan_prefix(self.name, prefix)
    }

    pub fn scan(&self) -> Result<Vec<Entry>> {
        self.tx.scan(self.name)
    }

    pub fn len(&self) -> Result<u64> {
        self.tx.len(self.name)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Bucket<'_, WriteTx<'_>> {
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tx.put(self.name, key, value)
    }

    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.tx.delete(self.name, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carebridge_crypto::EncryptionKey;
    use tempfile::TempDir;

    const BUCKETS: &[&str] = &["users", "usernames"];

    fn open(dir: &TempDir, cipher: &Arc<EnvelopeCipher>, mode: OpenMode) -> EncryptedDatabase {
        EncryptedDatabase::open(dir.path().join("auth.db"), Arc::clone(cipher), mode, BUCKETS)
            .expect("open")
    }

    fn cipher() -> Arc<EnvelopeCipher> {
        Arc::new(EnvelopeCipher::new(&EncryptionKey::generate()))
    }

    #[test]
    fn put_get_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let db = open(&dir, &cipher(), OpenMode::ReadWrite);
        db.update(|tx| -> Result<()> {
            tx.put("users", b"a", b"alpha")?;
            tx.put("users", b"b", b"")?;
            Ok(())
        })
        .expect("update");

        db.view(|tx| -> Result<()> {
            assert_eq!(tx.get("users", b"a")?, Some(b"alpha".to_vec()));
            assert_eq!(tx.get("users", b"b")?, Some(Vec::new()));
            assert_eq!(tx.get("users", b"c")?, None);
            assert_eq!(tx.bucket("users").len()?, 2);
            Ok(())
        })
        .expect("view");
    }

    #[test]
    fn values_are_sealed_on_disk() {
        let dir = TempDir::new().expect("tempdir");
        let db = open(&dir, &cipher(), OpenMode::ReadWrite);
        db.update(|tx| tx.put("users", b"k", b"plaintext-marker"))
            .expect("update");
        let txn = db.db.begin_read().expect("read");
        let table = txn.open_table(definition("users")).expect("table");
        let raw = table.get(b"k".as_slice()).expect("get").expect("present");
        assert!(!raw
            .value()
            .windows(b"plaintext-marker".len())
            .any(|w| w == b"plaintext-marker"));
    }

    #[test]
    fn prefix_scan_stops_at_boundary() {
        let dir = TempDir::new().expect("tempdir");
        let db = open(&dir, &cipher(), OpenMode::ReadWrite);
        db.update(|tx| -> Result<()> {
            let users = tx.bucket("users");
            users.put(b"u1.a", b"1")?;
            users.put(b"u1.b", b"2")?;
            users.put(b"u10.a", b"3")?;
            users.put(b"u2.a", b"4")?;
            Ok(())
        })
        .expect("update");

        let keys = db
            .view(|tx| tx.scan_prefix("users", b"u1."))
            .expect("scan")
            .into_iter()
            .map(|(k, _)| k)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![b"u1.a".to_vec(), b"u1.b".to_vec()]);
        assert_eq!(db.view(|tx| tx.scan("users")).expect("scan").len(), 4);
    }

    #[test]
    fn failed_update_rolls_back() {
        let dir = TempDir::new().expect("tempdir");
        let db = open(&dir, &cipher(), OpenMode::ReadWrite);
        let result: Result<()> = db.update(|tx| {
            tx.put("users", b"a", b"1")?;
            Err(StorageError::Closed)
        });
        assert!(result.is_err());
        assert_eq!(db.view(|tx| tx.get("users", b"a")).expect("view"), None);
    }

    #[test]
    fn delete_reports_presence_and_leaves_siblings() {
        let dir = TempDir::new().expect("tempdir");
        let db = open(&dir, &cipher(), OpenMode::ReadWrite);
        let (first, second) = db
            .update(|tx| -> Result<(bool, bool)> {
                let users = tx.bucket("users");
                users.put(b"x.1", b"")?;
                users.put(b"x.2", b"")?;
                Ok((users.delete(b"x.1")?, users.delete(b"x.1")?))
            })
            .expect("update");
        assert!(first);
        assert!(!second);
        assert_eq!(
            db.view(|tx| tx.scan("users")).expect("scan"),
            vec![(b"x.2".to_vec(), Vec::new())]
        );
    }

    #[test]
    fn read_only_rejects_writes_and_tolerates_missing_buckets() {
        let dir = TempDir::new().expect("tempdir");
        let cipher = cipher();
        drop(open(&dir, &cipher, OpenMode::ReadWrite));
        let db = open(&dir, &cipher, OpenMode::ReadOnly);
        assert!(matches!(db.begin_write(), Err(StorageError::ReadOnly)));
        db.view(|tx| -> Result<()> {
            assert_eq!(tx.get("never-created", b"k")?, None);
            assert!(tx.scan("never-created")?.is_empty());
            Ok(())
        })
        .expect("view");
    }

    #[test]
    fn wrong_key_surfaces_decrypt_error() {
        let dir = TempDir::new().expect("tempdir");
        let db = open(&dir, &cipher(), OpenMode::ReadWrite);
        db.update(|tx| tx.put("users", b"a", b"1")).expect("update");
        drop(db);
        let db = open(&dir, &cipher(), OpenMode::ReadOnly);
        let err = db.view(|tx| tx.get("users", b"a")).expect_err("decrypt");
        assert!(matches!(err, StorageError::Decrypt(_)));
    }
}
