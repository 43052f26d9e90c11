#![allow(dead_code)]

use carebridge_authdb::model::NewUser;
use carebridge_authdb::policy::{InlineReload, PolicyEnforcer};
use carebridge_authdb::store::BUCKETS;
use carebridge_authdb::{AuthStore, PolicyStore};
use carebridge_crypto::{EncryptionKey, EnvelopeCipher};
use carebridge_storage::{OpenMode, SharedStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Lowest cost bcrypt accepts; keeps the suite fast.
pub const TEST_BCRYPT_COST: u32 = 4;

pub struct TestDb {
    pub db: Arc<SharedStore>,
    pub enforcer: Arc<PolicyEnforcer>,
    pub reload: Arc<dyn PolicyStore>,
    pub store: AuthStore,
}

impl TestDb {
    pub fn open(path: &Path, key: &EncryptionKey, mode: OpenMode) -> Self {
        let db = Arc::new(
            SharedStore::open(path, EnvelopeCipher::new(key), mode, BUCKETS).expect("open store"),
        );
        let enforcer = Arc::new(PolicyEnforcer::new(Arc::clone(&db)));
        let reload: Arc<dyn PolicyStore> = Arc::new(InlineReload::new(Arc::clone(&enforcer)));
        let store = AuthStore::open(Arc::clone(&db), Arc::clone(&reload), TEST_BCRYPT_COST)
            .expect("auth store");
        Self {
            db,
            enforcer,
            reload,
            store,
        }
    }

    pub fn user(&self, username: &str) -> carebridge_authdb::model::User {
        self.store
            .add_user(NewUser::new(username, format!("{username}@example.org"), "pw"))
            .expect("add user")
    }
}

pub fn db_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

/// Fresh read-write store in a new temp dir. Keep the dir alive as long as
/// the store.
pub fn fresh() -> (TempDir, TestDb) {
    let dir = tempfile::tempdir().expect("tempdir");
    let key = EncryptionKey::generate();
    let db = TestDb::open(&db_path(&dir, "auth.redb"), &key, OpenMode::ReadWrite);
    (dir, db)
}
