//! Whole-database pull replication.
//!
//! # Purpose
//! A primary serves its database file together with a checksum token; a
//! replica polls with its own token and, when the primary reports a change,
//! verifies the downloaded copy before swapping it in.
//!
//! # Key invariants
//! - A token always describes the exact body it is sent with; the serving side
//!   computes both under the store's exclusive guard.
//! - The live replica file is only replaced by a copy whose recomputed
//!   checksum equals the token the primary claimed.
//! - Tokens are derived from stored, sealed bytes. Primary and replica must
//!   share the encryption key, but nothing is decrypted to compare them.
mod client;
mod http;
mod source;

pub use client::SyncClient;
pub use http::HttpSyncRemote;
pub use source::SyncSource;

use crate::error::{AuthDbError, AuthDbResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use carebridge_storage::{DIGEST_LEN, Digest};
use std::fmt;
use std::str::FromStr;

/// Opaque, URL-safe form of a database [`Digest`]. Used as the HTTP entity tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChecksumToken(String);

impl ChecksumToken {
    pub fn from_digest(digest: &Digest) -> Self {
        Self(URL_SAFE_NO_PAD.encode(digest.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChecksumToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Digest> for ChecksumToken {
    fn from(digest: Digest) -> Self {
        Self::from_digest(&digest)
    }
}

impl FromStr for ChecksumToken {
    type Err = AuthDbError;

    /// Accepts the bare token or a quoted entity tag.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_matches('"');
        let decoded = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|_| AuthDbError::bad_request(format!("malformed checksum token: {value:?}")))?;
        if decoded.len() != DIGEST_LEN {
            return Err(AuthDbError::bad_request(format!(
                "checksum token must encode {DIGEST_LEN} bytes, got {}",
                decoded.len()
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Answer to a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSnapshot {
    NotModified,
    Changed { token: ChecksumToken, body: Bytes },
}

/// Result of one [`SyncClient::pull`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Unchanged,
    Replaced { token: ChecksumToken },
}

/// A primary the replica can fetch from.
#[async_trait]
pub trait SyncRemote: Send + Sync {
    /// Fetch the primary's database unless its token equals `token`.
    async fn fetch(&self, token: &ChecksumToken) -> AuthDbResult<RemoteSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parses_bare_and_quoted_forms() {
        let token = ChecksumToken::from_digest(&Digest::from_bytes([7; DIGEST_LEN]));
        assert_eq!(token.as_str().len(), 43);
        assert_eq!(token.as_str().parse::<ChecksumToken>().expect("bare"), token);
        assert_eq!(
            format!("\"{token}\"").parse::<ChecksumToken>().expect("quoted"),
            token
        );
    }

    #[test]
    fn token_rejects_wrong_lengths_and_alphabet() {
        assert!(matches!(
            "AAAA".parse::<ChecksumToken>(),
            Err(AuthDbError::BadRequest(_))
        ));
        assert!("not a token!".parse::<ChecksumToken>().is_err());
    }
}
