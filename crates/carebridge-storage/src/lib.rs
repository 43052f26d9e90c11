//! Encrypted embedded storage for the Carebridge authorization database.
//!
//! # Purpose
//! Wraps a `redb` file (ACID, one writer plus many snapshot readers, ordered
//! byte keys) so that every value is envelope-encrypted on the way in and
//! opened on the way out. Buckets map one-to-one onto `redb` tables; keys and
//! bucket names stay in the clear so prefix scans keep working.
//!
//! # How it fits
//! Repositories in the `authdb` service run all of their reads and writes
//! through [`SharedStore::view`] and [`SharedStore::update`]. The sync
//! protocol uses [`SharedStore::snapshot`] on the serving side and
//! [`SharedStore::with_exclusive_swap`] on the pulling side.
//!
//! # Key invariants
//! - A value read back is byte-identical to the value written.
//! - The checksum covers stored ciphertext only; it never decrypts.
//! - Readers never observe a handle that is mid-swap.
//!
//! # Common pitfalls
//! - Calling [`SharedStore::snapshot`] or [`SharedStore::with_exclusive_swap`]
//!   from inside a `view`/`update` closure deadlocks: the guard is not
//!   reentrant.
mod checksum;
mod encrypted;
mod shared;

pub use checksum::{DIGEST_LEN, Digest};
pub use encrypted::{Bucket, EncryptedDatabase, Entry, OpenMode, ReadTx, Transaction, WriteTx};
pub use shared::SharedStore;

use carebridge_crypto::CryptoError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("decrypt failed: {0}")]
    Decrypt(String),
    #[error("store is opened read-only")]
    ReadOnly,
    #[error("store handle is closed")]
    Closed,
    #[error("crypto error: {0}")]
    Crypto(CryptoError),
    #[error("backend error: {0}")]
    Backend(#[from] redb::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<CryptoError> for StorageError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decrypt(reason) => StorageError::Decrypt(reason.to_string()),
            other => StorageError::Crypto(other),
        }
    }
}

macro_rules! from_redb_error {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for StorageError {
                fn from(err: $ty) -> Self {
                    StorageError::Backend(redb::Error::from(err))
                }
            }
        )+
    };
}

from_redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);
