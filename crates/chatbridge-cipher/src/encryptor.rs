// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field encryptor for data at rest.
//!
//! Two keys are derived from one secret: the AEAD key (primary salt) and the
//! lookup key (lookup salt). Three transforms are offered:
//!
//! - [`Encryptor::encrypt`]: AES-256-GCM with a random nonce.
//! - [`Encryptor::encrypt_for_lookup`]: AES-256-GCM with a nonce derived from
//!   the plaintext, so equal plaintexts produce equal ciphertexts. This leaks
//!   equality to anyone who can read the database and is only used for
//!   columns that act as lookup keys.
//! - [`Encryptor::lookup_hash`]: hex HMAC-SHA256 under the lookup key, stored
//!   in `*_hash` columns and used in WHERE clauses.
//!
//! Stored ciphertext is `base64(nonce || ciphertext || tag)`. Empty
//! plaintext maps to empty ciphertext and back.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chatbridge_core::CryptoError;
use ring::hmac;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;
use zeroize::Zeroizing;

use crate::crypto::{self, NONCE_SIZE};
use crate::kdf;

/// Minimum accepted secret length, in characters.
pub const MIN_SECRET_LEN: usize = 32;

/// Minimum accepted salt length, in bytes. Shorter overrides fall back to the defaults.
pub const MIN_SALT_LEN: usize = 16;

const DEFAULT_SALT: &str = "chatbridge-field-encryption-salt-v1";
const DEFAULT_LOOKUP_SALT: &str = "chatbridge-lookup-hash-salt-v1";

/// Tunables for [`Encryptor::new`].
#[derive(Debug, Clone)]
pub struct CipherSettings {
    /// Override for the AEAD key salt.
    pub salt: Option<String>,
    /// Override for the lookup key salt.
    pub lookup_salt: Option<String>,
    pub kdf_iterations: u32,
}

impl Default for CipherSettings {
    fn default() -> Self {
        Self {
            salt: None,
            lookup_salt: None,
            kdf_iterations: kdf::DEFAULT_ITERATIONS,
        }
    }
}

/// Immutable field encryptor. Safe to share across tasks behind an `Arc`.
pub struct Encryptor {
    key: Zeroizing<[u8; 32]>,
    lookup_key: Zeroizing<[u8; 32]>,
    lookup_salt: Vec<u8>,
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("key", &"[REDACTED]")
            .field("lookup_key", &"[REDACTED]")
            .finish()
    }
}

/// Pick the configured salt if long enough, else the built-in default.
fn resolve_salt(configured: Option<&str>, default: &str, which: &str) -> Vec<u8> {
    match configured {
        Some(salt) if salt.len() >= MIN_SALT_LEN => salt.as_bytes().to_vec(),
        Some(salt) => {
            warn!(
                salt = which,
                len = salt.len(),
                min = MIN_SALT_LEN,
                "configured salt too short, using built-in default"
            );
            default.as_bytes().to_vec()
        }
        None => default.as_bytes().to_vec(),
    }
}

impl Encryptor {
    /// Derive both keys from `secret`.
    ///
    /// Fails with [`CryptoError::InvalidSecret`] if the secret is shorter than
    /// [`MIN_SECRET_LEN`] characters.
    pub fn new(secret: &SecretString, settings: &CipherSettings) -> Result<Self, CryptoError> {
        let secret = secret.expose_secret();
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(CryptoError::InvalidSecret {
                min_len: MIN_SECRET_LEN,
            });
        }

        let salt = resolve_salt(settings.salt.as_deref(), DEFAULT_SALT, "salt");
        let lookup_salt =
            resolve_salt(settings.lookup_salt.as_deref(), DEFAULT_LOOKUP_SALT, "lookup_salt");

        let key = kdf::derive_key(secret.as_bytes(), &salt, settings.kdf_iterations)?;
        let lookup_key = kdf::derive_key(secret.as_bytes(), &lookup_salt, settings.kdf_iterations)?;

        Ok(Self {
            key,
            lookup_key,
            lookup_salt,
        })
    }

    /// Encrypt with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let nonce = crypto::random_nonce()?;
        let sealed = crypto::seal(&self.key, nonce, plaintext.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }

    /// Encrypt deterministically: the same plaintext always yields the same ciphertext.
    pub fn encrypt_for_lookup(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let nonce = self.lookup_nonce(plaintext);
        let sealed = crypto::seal(&self.key, nonce, plaintext.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt output of either [`encrypt`](Self::encrypt) or
    /// [`encrypt_for_lookup`](Self::encrypt_for_lookup).
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let sealed = STANDARD
            .decode(ciphertext)
            .map_err(|e| CryptoError::Decode(e.to_string()))?;
        let plaintext = crypto::open(&self.key, &sealed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    /// Keyed hash used for indexed equality lookups. Always 64 hex characters.
    pub fn lookup_hash(&self, plaintext: &str) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.lookup_key[..]);
        hex::encode(hmac::sign(&key, plaintext.as_bytes()).as_ref())
    }

    /// Encrypt an optional field; `None` is stored as empty.
    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> Result<String, CryptoError> {
        self.encrypt(plaintext.unwrap_or_default())
    }

    /// Decrypt an optional field; empty becomes `None`.
    pub fn decrypt_optional(&self, ciphertext: Option<&str>) -> Result<Option<String>, CryptoError> {
        let plaintext = self.decrypt(ciphertext.unwrap_or_default())?;
        Ok(if plaintext.is_empty() {
            None
        } else {
            Some(plaintext)
        })
    }

    /// Nonce for deterministic encryption: a prefix of HMAC(lookup key, plaintext || lookup salt).
    fn lookup_nonce(&self, plaintext: &str) -> [u8; NONCE_SIZE] {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.lookup_key[..]);
        let mut ctx = hmac::Context::with_key(&key);
        ctx.update(plaintext.as_bytes());
        ctx.update(&self.lookup_salt);
        let tag = ctx.sign();

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&tag.as_ref()[..NONCE_SIZE]);
        nonce
    }
}
