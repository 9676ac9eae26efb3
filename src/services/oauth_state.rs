// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed OAuth `state` values.
//!
//! Format before encoding: `user_id|nonce_hex|timestamp_hex|signature_hex`,
//! where the signature is HMAC-SHA256 over everything before it. The whole
//! string is base64url encoded without padding.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How long a state value stays valid after it was issued.
pub const STATE_MAX_AGE_MILLIS: u128 = 10 * 60 * 1000;

/// Why a returned `state` was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("state is not valid base64url/utf-8")]
    Encoding,
    #[error("state has the wrong shape")]
    Malformed,
    #[error("state signature mismatch")]
    BadSignature,
    #[error("state was issued for another user")]
    WrongUser,
    #[error("state expired")]
    Expired,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn sign(payload: &str, secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Issue a state value for `user_id` at `issued_at_millis`.
pub fn issue_state_at(user_id: &str, secret: &[u8], issued_at_millis: u128) -> Option<String> {
    let mut nonce = [0u8; 16];
    SystemRandom::new().fill(&mut nonce).ok()?;

    let payload = format!("{}|{}|{:x}", user_id, hex::encode(nonce), issued_at_millis);
    let signature = sign(&payload, secret)?;

    Some(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Issue a state value for `user_id` now.
pub fn issue_state(user_id: &str, secret: &[u8]) -> Option<String> {
    issue_state_at(user_id, secret, now_millis())
}

/// Check signature, owner and age of a returned state value.
pub fn verify_state(state: &str, user_id: &str, secret: &[u8]) -> Result<(), StateError> {
    verify_state_at(state, user_id, secret, now_millis())
}

pub fn verify_state_at(
    state: &str,
    user_id: &str,
    secret: &[u8],
    now_millis: u128,
) -> Result<(), StateError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(state)
        .map_err(|_| StateError::Encoding)?;
    let decoded = String::from_utf8(bytes).map_err(|_| StateError::Encoding)?;

    // The user id is the only field that may itself contain '|'.
    let mut parts = decoded.rsplitn(4, '|');
    let (Some(signature), Some(timestamp_hex), Some(nonce_hex), Some(owner)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(StateError::Malformed);
    };

    let payload = format!("{}|{}|{}", owner, nonce_hex, timestamp_hex);
    let expected = sign(&payload, secret).ok_or(StateError::BadSignature)?;

    if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return Err(StateError::BadSignature);
    }

    if owner != user_id {
        return Err(StateError::WrongUser);
    }

    let issued_at = u128::from_str_radix(timestamp_hex, 16).map_err(|_| StateError::Malformed)?;
    if now_millis.saturating_sub(issued_at) > STATE_MAX_AGE_MILLIS {
        return Err(StateError::Expired);
    }

    Ok(())
}
