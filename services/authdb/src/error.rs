//! Error kinds surfaced by the authdb repositories, enforcer and sync.
//!
//! # Key invariants
//! - Every storage failure maps to exactly one kind; decrypt failures stay
//!   distinguishable from other internal faults.
//! - Writes against a read-only store are the caller's mistake, so they map to
//!   `BadRequest`.
use crate::model::{CodecError, InvalidDomainType};
use carebridge_authz::AuthzError;
use carebridge_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthDbError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("decrypt failed: {0}")]
    Decrypt(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AuthDbResult<T> = Result<T, AuthDbError>;

impl AuthDbError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AuthDbError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AuthDbError::NotFound(message.into())
    }

    /// Stable code for transport layers to map onto responses.
    pub fn code(&self) -> &'static str {
        match self {
            AuthDbError::BadRequest(_) => "bad_request",
            AuthDbError::NotFound(_) => "not_found",
            AuthDbError::Decrypt(_) => "decrypt",
            AuthDbError::Internal(_) => "internal",
        }
    }
}

impl From<StorageError> for AuthDbError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Decrypt(reason) => AuthDbError::Decrypt(reason),
            StorageError::ReadOnly => AuthDbError::BadRequest("store is read-only".to_string()),
            other => AuthDbError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<CodecError> for AuthDbError {
    fn from(err: CodecError) -> Self {
        AuthDbError::Internal(anyhow::Error::new(err).context("decode stored record"))
    }
}

impl From<AuthzError> for AuthDbError {
    fn from(err: AuthzError) -> Self {
        AuthDbError::BadRequest(err.to_string())
    }
}

impl From<InvalidDomainType> for AuthDbError {
    fn from(err: InvalidDomainType) -> Self {
        AuthDbError::BadRequest(err.to_string())
    }
}
