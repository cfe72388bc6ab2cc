// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PBKDF2-HMAC-SHA256 key derivation from the configured secret.

use std::num::NonZeroU32;

use chatbridge_core::CryptoError;
use ring::pbkdf2;
use zeroize::Zeroizing;

/// Production iteration count. Config validation rejects anything lower.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Derive a 32-byte key from `secret` and `salt`.
///
/// The returned key is wrapped in [`Zeroizing`] for automatic memory zeroing
/// on drop.
pub fn derive_key(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let iterations = NonZeroU32::new(iterations).ok_or(CryptoError::KeyDerivation)?;

    let mut output = Zeroizing::new([0u8; 32]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        secret,
        output.as_mut(),
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low cost for fast tests.
    const ITERATIONS: u32 = 1_000;

    #[test]
    fn derive_key_produces_consistent_output() {
        let key1 = derive_key(b"secret", b"salt-salt-salt-1", ITERATIONS).unwrap();
        let key2 = derive_key(b"secret", b"salt-salt-salt-1", ITERATIONS).unwrap();
        assert_eq!(*key1, *key2);
    }

    #[test]
    fn derive_key_different_secret_produces_different_output() {
        let key1 = derive_key(b"secret one", b"salt-salt-salt-1", ITERATIONS).unwrap();
        let key2 = derive_key(b"secret two", b"salt-salt-salt-1", ITERATIONS).unwrap();
        assert_ne!(*key1, *key2);
    }

    #[test]
    fn derive_key_different_salt_produces_different_output() {
        let key1 = derive_key(b"secret", b"salt-salt-salt-1", ITERATIONS).unwrap();
        let key2 = derive_key(b"secret", b"salt-salt-salt-2", ITERATIONS).unwrap();
        assert_ne!(*key1, *key2);
    }

    #[test]
    fn zero_iterations_is_rejected() {
        assert_eq!(
            derive_key(b"secret", b"salt", 0).unwrap_err(),
            CryptoError::KeyDerivation
        );
    }
}
