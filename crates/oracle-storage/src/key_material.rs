use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto;

pub const KEY_LENGTH: usize = 32;

/// Key material used for encryption at rest. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: [u8; KEY_LENGTH],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("decode error: {0}")]
    Decode(String),
}

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Fresh random 256-bit key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.bytes
    }

    /// Parse the base64 form used in configuration.
    pub fn from_base64(secret: &str) -> Result<Self, KeyError> {
        let mut decoded = general_purpose::STANDARD
            .decode(secret.trim())
            .map_err(|e| KeyError::Decode(e.to_string()))?;

        if decoded.len() != KEY_LENGTH {
            let len = decoded.len();
            decoded.zeroize();
            return Err(KeyError::Decode(format!(
                "expected {KEY_LENGTH} bytes, got {len}"
            )));
        }

        let mut bytes = [0u8; KEY_LENGTH];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.bytes)
    }

    /// Short, non-reversible identifier safe to log.
    pub fn fingerprint(&self) -> String {
        crypto::hash(&self.bytes)[..8].to_string()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Resolve the configured key, if any. A present but malformed key is an
/// error, never silently treated as "not configured".
pub fn resolve_configured_key(secret: Option<&str>) -> Result<Option<KeyMaterial>, KeyError> {
    match secret.map(str::trim) {
        None | Some("") => Ok(None),
        Some(secret) => KeyMaterial::from_base64(secret).map(Some),
    }
}
