// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level AES-256-GCM seal/open operations.
//!
//! Sealed payloads are laid out as `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use chatbridge_core::CryptoError;
use ring::aead::{Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

/// Size of the nonce prepended to every sealed payload.
pub const NONCE_SIZE: usize = NONCE_LEN;

fn aead_key(key: &[u8; 32]) -> Result<LessSafeKey, CryptoError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| CryptoError::KeyDerivation)?;
    Ok(LessSafeKey::new(unbound))
}

/// Generate a random 96-bit nonce from the system CSPRNG.
pub fn random_nonce() -> Result<[u8; NONCE_SIZE], CryptoError> {
    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill(&mut nonce)
        .map_err(|_| CryptoError::NonceGeneration)?;
    Ok(nonce)
}

/// Encrypt `plaintext` under `key` with the given nonce.
///
/// Returns the nonce followed by the ciphertext and authentication tag.
/// Callers must never reuse a nonce for different plaintexts under one key.
pub fn seal(
    key: &[u8; 32],
    nonce_bytes: [u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = aead_key(key)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + in_out.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&in_out);
    Ok(sealed)
}

/// Decrypt a payload produced by [`seal`].
pub fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_SIZE {
        return Err(CryptoError::ShortCiphertext { len: sealed.len() });
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| CryptoError::ShortCiphertext { len: sealed.len() })?;

    let key = aead_key(key)?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Authentication)?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn seal_open_roundtrip() {
        let nonce = random_nonce().unwrap();
        let sealed = seal(&KEY, nonce, b"hello bridge").unwrap();
        assert_eq!(&sealed[..NONCE_SIZE], &nonce);
        assert_eq!(open(&KEY, &sealed).unwrap(), b"hello bridge");
    }

    #[test]
    fn sealed_payload_carries_nonce_and_tag() {
        let sealed = seal(&KEY, [0u8; NONCE_SIZE], b"hello").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 5 + 16);
    }

    #[test]
    fn random_nonces_differ() {
        assert_ne!(random_nonce().unwrap(), random_nonce().unwrap());
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal(&KEY, random_nonce().unwrap(), b"secret").unwrap();
        assert_eq!(open(&[9u8; 32], &sealed), Err(CryptoError::Authentication));
    }

    #[test]
    fn open_rejects_payload_shorter_than_nonce() {
        assert_eq!(
            open(&KEY, &[1, 2, 3]),
            Err(CryptoError::ShortCiphertext { len: 3 })
        );
    }

    #[test]
    fn open_rejects_truncated_tag() {
        let sealed = seal(&KEY, random_nonce().unwrap(), b"secret").unwrap();
        assert_eq!(
            open(&KEY, &sealed[..NONCE_SIZE + 4]),
            Err(CryptoError::Authentication)
        );
    }
}
