// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Encryption of stored Reddit OAuth tokens.
//!
//! AES-256-GCM under a key derived with HKDF-SHA256 from the configured
//! secret. Every ciphertext is bound to its account via AAD, so a token
//! copied onto another account record will not decrypt.
//!
//! Stored format: base64(nonce || ciphertext || tag).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::sync::Arc;

const HKDF_SALT: &[u8] = b"subpirate-token-cipher-v1";
const HKDF_INFO: &[u8] = b"reddit-oauth-tokens";

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("random source failed")]
    Random,
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
    #[error("decryption failed (wrong key or AAD)")]
    Decrypt,
}

impl From<CipherError> for crate::error::AppError {
    fn from(err: CipherError) -> Self {
        crate::error::AppError::Internal(anyhow::anyhow!("Token cipher: {}", err))
    }
}

/// Symmetric cipher for OAuth tokens at rest.
#[derive(Clone)]
pub struct TokenCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl TokenCipher {
    /// Derive the cipher key from configured key material.
    pub fn new(key_material: &[u8]) -> Result<Self, CipherError> {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), key_material);
        let mut okm = [0u8; 32];
        hk.expand(HKDF_INFO, &mut okm)
            .map_err(|_| CipherError::KeyDerivation)?;

        let unbound =
            UnboundKey::new(&AES_256_GCM, &okm).map_err(|_| CipherError::KeyDerivation)?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext`, binding it to `aad`.
    pub fn encrypt(&self, plaintext: &str, aad: &[u8]) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::Random)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad),
                &mut in_out,
            )
            .map_err(|_| CipherError::Malformed("seal failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(BASE64.encode(out))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt) with the same AAD.
    pub fn decrypt(&self, ciphertext_b64: &str, aad: &[u8]) -> Result<String, CipherError> {
        let data = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| CipherError::Malformed(e.to_string()))?;

        if data.len() < NONCE_LEN {
            return Err(CipherError::Malformed("too short".to_string()));
        }

        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CipherError::Malformed("bad nonce".to_string()))?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext.to_vec()).map_err(|e| CipherError::Malformed(e.to_string()))
    }
}

/// Encrypt an access/refresh token pair for one account.
pub fn encrypt_tokens(
    cipher: &TokenCipher,
    access_token: &str,
    refresh_token: &str,
    aad: &str,
) -> Result<(String, String), CipherError> {
    let encrypted_access = cipher.encrypt(access_token, aad.as_bytes())?;
    let encrypted_refresh = cipher.encrypt(refresh_token, aad.as_bytes())?;
    Ok((encrypted_access, encrypted_refresh))
}
