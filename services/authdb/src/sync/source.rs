use super::{ChecksumToken, RemoteSnapshot, SyncRemote};
use crate::error::{AuthDbError, AuthDbResult};
use async_trait::async_trait;
use bytes::Bytes;
use carebridge_storage::SharedStore;
use std::sync::Arc;
use tracing::debug;

/// Serving side of replication. Transport layers wrap [`serve`](Self::serve)
/// in whatever request handling they use.
#[derive(Clone)]
pub struct SyncSource {
    db: Arc<SharedStore>,
}

impl SyncSource {
    pub fn new(db: Arc<SharedStore>) -> Self {
        Self { db }
    }

    pub fn checksum(&self) -> AuthDbResult<ChecksumToken> {
        Ok(ChecksumToken::from_digest(&self.db.checksum()?))
    }

    /// Raw bytes of the live database file.
    pub fn export(&self) -> AuthDbResult<Bytes> {
        Ok(Bytes::from(self.db.export()?))
    }

    /// Conditional read: `NotModified` when `if_none_match` equals the current
    /// token, otherwise the token and the file that produced it.
    ///
    /// The token check shares the guard with ordinary transactions; only a
    /// changed answer takes the exclusive hold to read the file.
    pub fn serve(&self, if_none_match: Option<&ChecksumToken>) -> AuthDbResult<RemoteSnapshot> {
        if let Some(presented) = if_none_match {
            let current = ChecksumToken::from_digest(&self.db.checksum()?);
            if &current == presented {
                debug!(token = %current, "sync request not modified");
                return Ok(RemoteSnapshot::NotModified);
            }
        }
        let (digest, body) = self.db.snapshot()?;
        let token = ChecksumToken::from_digest(&digest);
        // A write may have landed between the two reads.
        if if_none_match == Some(&token) {
            debug!(%token, "sync request not modified");
            return Ok(RemoteSnapshot::NotModified);
        }
        debug!(%token, bytes = body.len(), "serving database snapshot");
        Ok(RemoteSnapshot::Changed {
            token,
            body: Bytes::from(body),
        })
    }
}

#[async_trait]
impl SyncRemote for SyncSource {
    async fn fetch(&self, token: &ChecksumToken) -> AuthDbResult<RemoteSnapshot> {
        let source = self.clone();
        let token = token.clone();
        tokio::task::spawn_blocking(move || source.serve(Some(&token)))
            .await
            .map_err(|err| AuthDbError::Internal(anyhow::Error::new(err).context("sync serve task")))?
    }
}
