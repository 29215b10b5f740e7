//! Authenticated encryption (AES-256-GCM) and one-way hashing (SHA-256).
//!
//! Ciphertexts are laid out as `nonce || ciphertext || tag`. The nonce is
//! random per call, so encrypting the same plaintext twice yields different
//! bytes.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::key_material::KeyMaterial;

/// AES-GCM nonce size (96 bits).
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encrypt failed: {0}")]
    Encrypt(String),
    #[error("ciphertext too short: {len} bytes")]
    Truncated { len: usize },
    /// Integrity tag did not verify. Wrong key or modified bytes.
    #[error("authentication failed")]
    Authentication,
}

pub fn encrypt(plaintext: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    encrypt_with_aad(plaintext, &[], key)
}

pub fn decrypt(ciphertext: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    decrypt_with_aad(ciphertext, &[], key)
}

/// Encrypt and bind `aad` into the tag without encrypting it.
pub fn encrypt_with_aad(
    plaintext: &[u8],
    aad: &[u8],
    key: &KeyMaterial,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Verify and decrypt. Never returns bytes whose tag failed to verify.
pub fn decrypt_with_aad(
    ciphertext: &[u8],
    aad: &[u8],
    key: &KeyMaterial,
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Truncated {
            len: ciphertext.len(),
        });
    }

    let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_SIZE);
    let cipher = build_cipher(key);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), Payload { msg: sealed, aad })
        .map_err(|_| CryptoError::Authentication)
}

/// Hex SHA-256 digest. Deterministic; use for comparisons without plaintext.
pub fn hash(value: &[u8]) -> String {
    hex::encode(Sha256::digest(value))
}

fn build_cipher(key: &KeyMaterial) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}
