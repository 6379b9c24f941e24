// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-bounded HMAC tokens for service-to-service calls.
//!
//! Wire format: `<ms-ts>.<hex-sig>` where `<ms-ts>` is the minting time in
//! milliseconds and `<hex-sig> = hex(HMAC-SHA-256(secret, ms-ts))`. Tokens
//! validate within a plus/minus five minute window. Verification goes through
//! `ring::hmac::verify`, which compares in constant time.

use ring::hmac;

/// Accepted clock skew: five minutes either side of the timestamp.
pub const SERVICE_TOKEN_MAX_SKEW_MS: i64 = 5 * 60 * 1000;

/// Mint a service token for the given millisecond timestamp.
pub fn mint_service_token(secret: &str, now_ms: i64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let ts = now_ms.to_string();
    let sig = hmac::sign(&key, ts.as_bytes());
    format!("{}.{}", ts, hex::encode(sig.as_ref()))
}

/// Verify a service token against the current time.
///
/// Returns `false` for malformed tokens, signatures that do not verify, and
/// timestamps outside the skew window. Never panics on attacker input.
pub fn verify_service_token(secret: &str, token: &str, now_ms: i64) -> bool {
    let Some((ts_str, sig_hex)) = token.split_once('.') else {
        return false;
    };
    let Ok(ts) = ts_str.parse::<i64>() else {
        return false;
    };
    if (now_ms - ts).abs() > SERVICE_TOKEN_MAX_SKEW_MS {
        return false;
    }
    let Ok(sig) = hex::decode(sig_hex) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, ts_str.as_bytes(), &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-shared-secret";

    #[test]
    fn minted_token_verifies_at_mint_time() {
        let now = 1_760_000_000_000;
        let token = mint_service_token(SECRET, now);
        assert!(verify_service_token(SECRET, &token, now));
    }

    #[test]
    fn token_verifies_inside_window_and_not_outside() {
        let minted_at = 1_760_000_000_000;
        let token = mint_service_token(SECRET, minted_at);

        assert!(verify_service_token(
            SECRET,
            &token,
            minted_at + SERVICE_TOKEN_MAX_SKEW_MS
        ));
        assert!(verify_service_token(
            SECRET,
            &token,
            minted_at - SERVICE_TOKEN_MAX_SKEW_MS
        ));
        assert!(!verify_service_token(
            SECRET,
            &token,
            minted_at + SERVICE_TOKEN_MAX_SKEW_MS + 1
        ));
        assert!(!verify_service_token(
            SECRET,
            &token,
            minted_at - SERVICE_TOKEN_MAX_SKEW_MS - 1
        ));
    }

    #[test]
    fn wrong_secret_fails() {
        let now = 1_760_000_000_000;
        let token = mint_service_token(SECRET, now);
        assert!(!verify_service_token("other-secret", &token, now));
    }

    #[test]
    fn malformed_tokens_fail_without_panicking() {
        let now = 1_760_000_000_000;
        for bad in ["", "no-dot", "123.", ".abcdef", "notanum.abcdef", "123.zzzz"] {
            assert!(!verify_service_token(SECRET, bad, now), "accepted: {bad}");
        }
    }

    #[test]
    fn tampered_signature_fails() {
        let now = 1_760_000_000_000;
        let token = mint_service_token(SECRET, now);
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(!verify_service_token(SECRET, &tampered, now));
    }

    #[test]
    fn tampered_timestamp_fails() {
        let now = 1_760_000_000_000;
        let token = mint_service_token(SECRET, now);
        let (_, sig) = token.split_once('.').unwrap();
        let forged = format!("{}.{}", now + 1000, sig);
        assert!(!verify_service_token(SECRET, &forged, now));
    }
}
