use super::{ChecksumToken, PullOutcome, RemoteSnapshot, SyncRemote};
use crate::error::{AuthDbError, AuthDbResult};
use crate::policy::PolicyStore;
use carebridge_storage::{EncryptedDatabase, OpenMode, SharedStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Replica side of replication: polls a [`SyncRemote`] and swaps in verified
/// copies of the primary's database.
pub struct SyncClient {
    db: Arc<SharedStore>,
    remote: Arc<dyn SyncRemote>,
    policy: Arc<dyn PolicyStore>,
}

impl SyncClient {
    pub fn new(
        db: Arc<SharedStore>,
        remote: Arc<dyn SyncRemote>,
        policy: Arc<dyn PolicyStore>,
    ) -> Self {
        Self { db, remote, policy }
    }

    /// One replication round.
    ///
    /// # What it does
    /// Sends the local token to the remote. `NotModified` ends the round;
    /// `Changed` is handed to [`replace_with_verified_copy`](Self::replace_with_verified_copy).
    ///
    /// # Errors
    /// - Transport failures and non-200/304 answers are `Internal`.
    /// - A body whose checksum does not match its token is `Internal` and the
    ///   live store is left untouched.
    pub async fn pull(&self) -> AuthDbResult<PullOutcome> {
        let result = self.pull_inner().await;
        let outcome = match &result {
            Ok(PullOutcome::Unchanged) => "unchanged",
            Ok(PullOutcome::Replaced { .. }) => "replaced",
            Err(_) => "error",
        };
        metrics::counter!("carebridge_sync_pulls_total", "outcome" => outcome).increment(1);
        if let Err(err) = &result {
            warn!(error = %err, "sync pull failed");
        }
        result
    }

    async fn pull_inner(&self) -> AuthDbResult<PullOutcome> {
        let db = Arc::clone(&self.db);
        let local = tokio::task::spawn_blocking(move || db.checksum())
            .await
            .map_err(join_error)??;
        let local = ChecksumToken::from_digest(&local);

        let (token, body) = match self.remote.fetch(&local).await? {
            RemoteSnapshot::NotModified => return Ok(PullOutcome::Unchanged),
            RemoteSnapshot::Changed { token, .. } if token == local => {
                return Ok(PullOutcome::Unchanged);
            }
            RemoteSnapshot::Changed { token, body } => (token, body),
        };

        let client = self.clone_parts();
        tokio::task::spawn_blocking(move || client.replace_with_verified_copy(&token, &body))
            .await
            .map_err(join_error)?
    }

    fn clone_parts(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            remote: Arc::clone(&self.remote),
            policy: Arc::clone(&self.policy),
        }
    }

    /// Verifies `body` against `token` and, on a match, swaps it in as the
    /// live database and reloads the policy. Blocking.
    pub fn replace_with_verified_copy(
        &self,
        token: &ChecksumToken,
        body: &[u8],
    ) -> AuthDbResult<PullOutcome> {
        let incoming = incoming_path(self.db.path());
        let result = self.verify_and_swap(&incoming, token, body);
        if result.is_err() && incoming.exists() {
            if let Err(err) = std::fs::remove_file(&incoming) {
                warn!(error = %err, path = %incoming.display(), "failed to remove incoming copy");
            }
        }
        result?;
        self.policy.reload();
        info!(%token, bytes = body.len(), "replaced database from primary");
        Ok(PullOutcome::Replaced {
            token: token.clone(),
        })
    }

    fn verify_and_swap(&self, incoming: &Path, token: &ChecksumToken, body: &[u8]) -> AuthDbResult<()> {
        std::fs::write(incoming, body).map_err(|err| {
            AuthDbError::Internal(anyhow::Error::new(err).context("write incoming copy"))
        })?;
        let actual = {
            let copy = EncryptedDatabase::open(incoming, self.db.cipher(), OpenMode::ReadOnly, &[])?;
            ChecksumToken::from_digest(&copy.checksum()?)
        };
        if actual != *token {
            return Err(AuthDbError::Internal(anyhow::anyhow!(
                "checksum mismatch: primary claimed {token}, copy hashes to {actual}"
            )));
        }
        self.db.with_exclusive_swap(incoming)?;
        Ok(())
    }
}

/// `<live>.incoming-<uuid>` in the live file's directory, so the swap is a
/// same-filesystem rename.
fn incoming_path(live: &Path) -> PathBuf {
    let name = live
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "authdb".to_string());
    live.with_file_name(format!("{name}.incoming-{}", Uuid::new_v4().simple()))
}

fn join_error(err: tokio::task::JoinError) -> AuthDbError {
    AuthDbError::Internal(anyhow::Error::new(err).context("sync task"))
}
