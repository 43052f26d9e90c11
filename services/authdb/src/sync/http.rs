use super::{ChecksumToken, RemoteSnapshot, SyncRemote};
use crate::error::{AuthDbError, AuthDbResult};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use std::time::Duration;
use tracing::debug;

/// Fetches a primary's database over HTTP with a conditional GET.
///
/// The primary answers `304 Not Modified` when the replica's token is current,
/// or `200 OK` with the file as the body and its token in `ETag`.
pub struct HttpSyncRemote {
    client: reqwest::Client,
    url: String,
}

impl HttpSyncRemote {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AuthDbResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build sync http client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SyncRemote for HttpSyncRemote {
    async fn fetch(&self, token: &ChecksumToken) -> AuthDbResult<RemoteSnapshot> {
        let response = self
            .client
            .get(&self.url)
            .header(IF_NONE_MATCH, token.as_str())
            .send()
            .await
            .context("sync request")?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                debug!(url = %self.url, "primary not modified");
                Ok(RemoteSnapshot::NotModified)
            }
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| AuthDbError::Internal(anyhow::anyhow!("sync response missing ETag")))?;
                let token = etag.parse::<ChecksumToken>().map_err(|err| {
                    AuthDbError::Internal(anyhow::anyhow!("sync response ETag: {err}"))
                })?;
                let body = response.bytes().await.context("sync body")?;
                debug!(url = %self.url, %token, bytes = body.len(), "primary changed");
                Ok(RemoteSnapshot::Changed { token, body })
            }
            status => Err(AuthDbError::Internal(anyhow::anyhow!(
                "sync request to {} returned {status}",
                self.url
            ))),
        }
    }
}
