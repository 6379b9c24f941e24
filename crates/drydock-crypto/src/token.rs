// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Random token minting and token hashing.
//!
//! Ids are 128-bit random values, auth tokens 256-bit, both rendered as
//! lowercase hex. Client WebSocket tokens are stored only as their SHA-256.

use drydock_core::DrydockError;
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

/// Generate `n_bytes` of CSPRNG output rendered as lowercase hex.
pub fn random_hex(n_bytes: usize) -> Result<String, DrydockError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; n_bytes];
    rng.fill(&mut bytes)
        .map_err(|_| DrydockError::Crypto("failed to generate random bytes".to_string()))?;
    Ok(hex::encode(bytes))
}

/// SHA-256 of the input, rendered as lowercase hex.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(digest(&SHA256, input.as_bytes()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_requested_length() {
        let id = random_hex(16).unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn random_hex_values_differ() {
        let a = random_hex(16).unwrap();
        let b = random_hex(16).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex("token"), sha256_hex("token"));
        assert_ne!(sha256_hex("token"), sha256_hex("token2"));
    }
}
