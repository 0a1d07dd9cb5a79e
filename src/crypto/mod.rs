//! Sealing of stored connection secrets.
//!
//! AES-256-GCM through `ring`. A sealed value is base64 of
//! `nonce (12 bytes) || ciphertext || tag`, so every value carries its own
//! random nonce and the same secret never seals to the same text twice.
//!
//! ```rust
//! use quarry::crypto::Sealer;
//!
//! let sealer = Sealer::ephemeral().unwrap();
//! let sealed = sealer.seal("hunter2").unwrap();
//! assert_eq!(sealer.open(&sealed).unwrap(), "hunter2");
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use tracing::warn;

/// The length of an AES-256 key in bytes.
pub const KEY_LENGTH: usize = 32;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("random number generator failed")]
    Random,

    #[error("encryption failed")]
    EncryptionFailed,

    /// Wrong key or tampered data.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid key: expected {KEY_LENGTH} base64-encoded bytes")]
    InvalidKey,

    #[error("invalid sealed value")]
    InvalidCiphertext,
}

/// Seals and opens secrets under one master key.
pub struct Sealer {
    key: LessSafeKey,
    rng: SystemRandom,
    persistent: bool,
}

impl Sealer {
    fn from_bytes(bytes: &[u8], persistent: bool) -> CryptoResult<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
            persistent,
        })
    }

    /// Sealer over a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey)?;
        if bytes.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKey);
        }
        Self::from_bytes(&bytes, true)
    }

    /// Sealer over a fresh random key. Values sealed by it cannot be
    /// opened after the process exits.
    pub fn ephemeral() -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_LENGTH];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| CryptoError::Random)?;
        Self::from_bytes(&bytes, false)
    }

    /// Configured key if one is given, otherwise an ephemeral one.
    pub fn from_config(master_key: Option<&str>) -> CryptoResult<Self> {
        match master_key {
            Some(encoded) => Self::from_base64_key(encoded),
            None => {
                warn!("no store.master_key configured, stored secrets will not survive a restart");
                Self::ephemeral()
            }
        }
    }

    /// Whether the key outlives the process.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn seal(&self, plaintext: &str) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Random)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(BASE64.encode(&sealed))
    }

    pub fn open(&self, sealed: &str) -> CryptoResult<String> {
        let data = BASE64
            .decode(sealed)
            .map_err(|_| CryptoError::InvalidCiphertext)?;
        if data.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CryptoError::InvalidCiphertext);
        }

        let (nonce_bytes, encrypted) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CryptoError::InvalidCiphertext)?;

        let mut in_out = encrypted.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidCiphertext)
    }

    /// Seal an optional secret.
    pub fn seal_opt(&self, plaintext: Option<&str>) -> CryptoResult<Option<String>> {
        plaintext.map(|p| self.seal(p)).transpose()
    }

    /// Open an optional sealed value.
    pub fn open_opt(&self, sealed: Option<&str>) -> CryptoResult<Option<String>> {
        sealed.map(|s| self.open(s)).transpose()
    }
}

impl fmt::Debug for Sealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sealer")
            .field("persistent", &self.persistent)
            .finish_non_exhaustive()
    }
}
