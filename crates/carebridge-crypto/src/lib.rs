//! Envelope encryption for values at rest.
//!
//! # Purpose
//! Seals every value written to the authorization store with AES-256-GCM
//! under a single process-wide key. Each seal draws a fresh 12-byte nonce and
//! prepends it to the ciphertext, so equal plaintexts never produce equal
//! payloads.
//!
//! # Key invariants
//! - `open(seal(v)) == v` for every `v`, including the empty slice.
//! - A payload shorter than the nonce, or one that fails authentication,
//!   yields [`CryptoError::Decrypt`].
//!
//! # Important configuration
//! - The 32-byte key is supplied out of band. There is no rotation: opening a
//!   store with a different key makes every stored value undecodable.
//!
//! # Examples
//! ```
//! use carebridge_crypto::{EncryptionKey, EnvelopeCipher};
//!
//! let cipher = EnvelopeCipher::new(&EncryptionKey::generate());
//! let sealed = cipher.seal(b"hello").expect("seal");
//! assert_eq!(cipher.open(&sealed).expect("open"), b"hello");
//! ```
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const ALGORITHM: &str = "AES-256-GCM";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("decrypt failed: {0}")]
    Decrypt(&'static str),
    #[error("encrypt failed")]
    Encrypt,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Symmetric data key. `Debug` never prints key material.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(key))
    }

    /// Parse a standard-alphabet base64 key, as supplied through config.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| CryptoError::InvalidKey(format!("base64: {err}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self(key.into())
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// AES-256-GCM cipher producing `nonce || ciphertext` payloads.
#[derive(Clone)]
pub struct EnvelopeCipher {
    aead: Aes256Gcm,
}

impl EnvelopeCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            aead: Aes256Gcm::new(&key.0.into()),
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        // GCM only rejects plaintexts beyond ~64 GiB.
        let ciphertext = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;
        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    pub fn open(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt("payload shorter than nonce"));
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt("authentication failed"))
    }
}

impl fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeCipher")
            .field("algorithm", &ALGORITHM)
            .finish()
    }
}
