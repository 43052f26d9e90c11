//! Carebridge authorization store.
//!
//! # Purpose
//! Multi-tenant, domain-scoped RBAC storage for the Carebridge healthcare
//! platform: encrypted entity repositories, a triple-indexed role assignment
//! engine, a cached policy enforcer and checksum-verified replication.
//!
//! # Notes
//! [`AuthDb`] wires the pieces together from an [`AuthDbConfig`]; tests and
//! embedders that need a different reload strategy can assemble them by hand.
pub mod config;
pub mod error;
pub mod model;
pub mod observability;
pub mod policy;
pub mod store;
pub mod sync;

pub use config::AuthDbConfig;
pub use error::{AuthDbError, AuthDbResult};
pub use policy::{PolicyEnforcer, PolicyStore};
pub use store::AuthStore;
pub use sync::{ChecksumToken, PullOutcome, SyncClient, SyncSource};

use carebridge_crypto::EnvelopeCipher;
use carebridge_storage::{OpenMode, SharedStore};
use policy::BackgroundReload;
use std::sync::Arc;
use sync::HttpSyncRemote;
use tracing::info;

/// Everything one process needs to serve and enforce authorization.
pub struct AuthDb {
    pub db: Arc<SharedStore>,
    pub store: AuthStore,
    pub enforcer: Arc<PolicyEnforcer>,
    pub source: SyncSource,
    /// Present when a primary URL is configured.
    pub sync: Option<SyncClient>,
}

impl AuthDb {
    /// Opens the database and builds the store, enforcer and sync endpoints.
    /// Must be called from within a tokio runtime; policy reloads run on its
    /// blocking pool.
    pub fn open(config: &AuthDbConfig) -> AuthDbResult<Self> {
        let mode = if config.read_only {
            OpenMode::ReadOnly
        } else {
            OpenMode::ReadWrite
        };
        let db = Arc::new(SharedStore::open(
            &config.db_path,
            EnvelopeCipher::new(&config.db_key),
            mode,
            store::BUCKETS,
        )?);
        let enforcer = Arc::new(PolicyEnforcer::new(Arc::clone(&db)));
        let reload: Arc<dyn PolicyStore> =
            Arc::new(BackgroundReload::current(Arc::clone(&enforcer))?);
        let store = AuthStore::open(Arc::clone(&db), Arc::clone(&reload), config.bcrypt_cost)?;
        let source = SyncSource::new(Arc::clone(&db));
        let sync = match &config.sync_url {
            Some(url) => {
                let remote = HttpSyncRemote::new(url.clone(), config.sync_timeout)?;
                Some(SyncClient::new(Arc::clone(&db), Arc::new(remote), reload))
            }
            None => None,
        };
        info!(
            path = %config.db_path.display(),
            ?mode,
            replica = sync.is_some(),
            "authdb opened"
        );
        Ok(Self {
            db,
            store,
            enforcer,
            source,
            sync,
        })
    }
}
