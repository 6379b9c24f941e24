// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM seal/open for access tokens at rest.
//!
//! Every call to [`seal_hex`] generates a fresh random 96-bit nonce via the
//! system CSPRNG. The stored form is `hex(nonce || ciphertext_with_tag)` in a
//! single column. Nonce reuse would be catastrophic for GCM security.

use drydock_core::DrydockError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

const NONCE_LEN: usize = 12;

/// A 32-byte AES-256-GCM key, parsed once from the configured hex string.
#[derive(Clone)]
pub struct TokenKey([u8; 32]);

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKey").field("key", &"[redacted]").finish()
    }
}

impl TokenKey {
    /// Parse a key from 64 hex characters.
    pub fn from_hex(hex_key: &str) -> Result<Self, DrydockError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| DrydockError::Config(format!("token_encryption_key is not hex: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            DrydockError::Config("token_encryption_key must be 32 bytes (64 hex chars)".to_string())
        })?;
        Ok(Self(key))
    }

    /// Generate a random key (test and provisioning helper).
    pub fn generate() -> Result<Self, DrydockError> {
        let rng = SystemRandom::new();
        let mut key = [0u8; 32];
        rng.fill(&mut key)
            .map_err(|_| DrydockError::Crypto("failed to generate random key".to_string()))?;
        Ok(Self(key))
    }
}

/// Encrypt plaintext, returning `hex(nonce || ciphertext_with_tag)`.
pub fn seal_hex(key: &TokenKey, plaintext: &str) -> Result<String, DrydockError> {
    let unbound = UnboundKey::new(&AES_256_GCM, &key.0)
        .map_err(|_| DrydockError::Crypto("failed to create AES-256-GCM key".to_string()))?;
    let less_safe = LessSafeKey::new(unbound);

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| DrydockError::Crypto("failed to generate random nonce".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.as_bytes().to_vec();
    less_safe
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| DrydockError::Crypto("AES-256-GCM encryption failed".to_string()))?;

    let mut packed = Vec::with_capacity(NONCE_LEN + in_out.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(&in_out);
    Ok(hex::encode(packed))
}

/// Decrypt a value produced by [`seal_hex`].
pub fn open_hex(key: &TokenKey, sealed_hex: &str) -> Result<String, DrydockError> {
    let packed = hex::decode(sealed_hex)
        .map_err(|_| DrydockError::Crypto("sealed token is not valid hex".to_string()))?;
    if packed.len() <= NONCE_LEN {
        return Err(DrydockError::Crypto("sealed token too short".to_string()));
    }

    let unbound = UnboundKey::new(&AES_256_GCM, &key.0)
        .map_err(|_| DrydockError::Crypto("failed to create AES-256-GCM key".to_string()))?;
    let less_safe = LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&packed[..NONCE_LEN]);
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = packed[NONCE_LEN..].to_vec();
    let plaintext = less_safe
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| {
            DrydockError::Crypto(
                "AES-256-GCM decryption failed -- wrong key or corrupted data".to_string(),
            )
        })?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| DrydockError::Crypto("decrypted token is not UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = TokenKey::generate().unwrap();
        let sealed = seal_hex(&key, "gho_user_access_token").unwrap();
        let opened = open_hex(&key, &sealed).unwrap();
        assert_eq!(opened, "gho_user_access_token");
    }

    #[test]
    fn seal_produces_different_ciphertext_for_same_plaintext() {
        let key = TokenKey::generate().unwrap();
        let a = seal_hex(&key, "same input twice").unwrap();
        let b = seal_hex(&key, "same input twice").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let key1 = TokenKey::generate().unwrap();
        let key2 = TokenKey::generate().unwrap();
        let sealed = seal_hex(&key1, "secret").unwrap();
        assert!(open_hex(&key2, &sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let key = TokenKey::generate().unwrap();
        let sealed = seal_hex(&key, "do not tamper").unwrap();
        // Flip a nibble past the nonce.
        let mut chars: Vec<char> = sealed.chars().collect();
        let idx = NONCE_LEN * 2 + 1;
        chars[idx] = if chars[idx] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();
        assert!(open_hex(&key, &tampered).is_err());
    }

    #[test]
    fn key_from_hex_validates_length() {
        assert!(TokenKey::from_hex("deadbeef").is_err());
        let hex_key = "00".repeat(32);
        assert!(TokenKey::from_hex(&hex_key).is_ok());
    }

    #[test]
    fn garbage_sealed_value_fails_cleanly() {
        let key = TokenKey::generate().unwrap();
        assert!(open_hex(&key, "not hex at all!").is_err());
        assert!(open_hex(&key, "abcd").is_err());
    }
}
