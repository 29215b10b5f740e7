//! On-disk container: every profile in one authenticated, encrypted blob.
//!
//! Layout: `b"ORPC" || 0x01 || nonce || ciphertext || tag`. The 5-byte
//! header is bound as associated data, so a change to any byte of the file
//! fails authentication. The decrypted body is JSON:
//! `{"format_version": 1, "profiles": {key: StoredProfile}}`.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use oracle_core::{
    keys::validate_key,
    profile::{next_version, normalize_birthdate, ConsentFlags, ProfilePatch, ProfileRecord},
    storage::ProfileStoreError,
};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{self, CryptoError},
    key_material::KeyMaterial,
};

/// Version of the decrypted body layout.
pub const FORMAT_VERSION: u32 = 1;

const HEADER: &[u8; 5] = b"ORPC\x01";

/// A profile as persisted inside the container. The birthdate is sealed a
/// second time at field level and never stored in the clear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredProfile {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate_ciphertext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate_digest: Option<String>,
    #[serde(default)]
    pub consent: ConsentFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl StoredProfile {
    fn empty(key: &str, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            birthdate_ciphertext: None,
            birthdate_digest: None,
            consent: ConsentFlags::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Field-level merge: only what the patch carries is overwritten.
    fn apply(
        &mut self,
        patch: &ProfilePatch,
        key: &KeyMaterial,
        now: DateTime<Utc>,
    ) -> Result<(), ProfileStoreError> {
        if let Some(birthdate) = patch.normalized_birthdate()? {
            let sealed = crypto::encrypt(birthdate.as_bytes(), key)
                .map_err(|e| corruption(format!("seal birthdate field: {e}")))?;
            self.birthdate_digest = Some(birthdate_digest(&self.key, &birthdate));
            self.birthdate_ciphertext = Some(URL_SAFE_NO_PAD.encode(sealed));
        }
        self.consent.merge(&patch.consent);
        self.updated_at = now;
        self.version = next_version(self.version)?;
        Ok(())
    }

    /// Caller-facing view with the birthdate decrypted.
    pub fn to_record(&self, key: &KeyMaterial) -> Result<ProfileRecord, ProfileStoreError> {
        let birthdate = match &self.birthdate_ciphertext {
            None => None,
            Some(encoded) => {
                let sealed = URL_SAFE_NO_PAD
                    .decode(encoded)
                    .map_err(|e| corruption(format!("birthdate field decode failed: {e}")))?;
                let plain = crypto::decrypt(&sealed, key).map_err(decryption)?;
                Some(
                    String::from_utf8(plain)
                        .map_err(|_| corruption("birthdate field is not utf-8".to_string()))?,
                )
            }
        };

        Ok(ProfileRecord {
            key: self.key.clone(),
            birthdate,
            consent: self.consent.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }

    /// Compare a candidate birthdate against the stored digest without
    /// decrypting the field.
    pub fn birthdate_matches(&self, candidate: &str) -> Result<bool, ProfileStoreError> {
        let candidate = normalize_birthdate(candidate)?;
        Ok(self.birthdate_digest.as_deref() == Some(birthdate_digest(&self.key, &candidate).as_str()))
    }
}

/// Decrypted container body: format tag plus the key → profile map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Container {
    pub format_version: u32,
    pub profiles: BTreeMap<String, StoredProfile>,
}

impl Default for Container {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            profiles: BTreeMap::new(),
        }
    }
}

impl Container {
    /// Merge `patch` into `key`'s profile, creating it at version 1 if absent.
    pub fn upsert(
        &mut self,
        key: &str,
        patch: &ProfilePatch,
        material: &KeyMaterial,
        now: DateTime<Utc>,
    ) -> Result<&StoredProfile, ProfileStoreError> {
        let mut profile = self
            .profiles
            .get(key)
            .cloned()
            .unwrap_or_else(|| StoredProfile::empty(key, now));
        profile.apply(patch, material, now)?;
        self.profiles.insert(key.to_string(), profile);
        Ok(&self.profiles[key])
    }

    /// Returns whether anything was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.profiles.remove(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&StoredProfile> {
        self.profiles.get(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Serialize and encrypt the whole container.
    pub fn seal(&self, key: &KeyMaterial) -> Result<Vec<u8>, ProfileStoreError> {
        let body = serde_json::to_vec(self)
            .map_err(|e| corruption(format!("serialize container: {e}")))?;
        let sealed = crypto::encrypt_with_aad(&body, HEADER, key)
            .map_err(|e| corruption(format!("seal container: {e}")))?;

        let mut out = Vec::with_capacity(HEADER.len() + sealed.len());
        out.extend_from_slice(HEADER);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Authenticate, decrypt and validate container bytes.
    pub fn open(bytes: &[u8], key: &KeyMaterial) -> Result<Self, ProfileStoreError> {
        let sealed = bytes
            .strip_prefix(HEADER.as_slice())
            .ok_or_else(|| ProfileStoreError::Decryption {
                reason: "unrecognized container header".to_string(),
            })?;
        let body = crypto::decrypt_with_aad(sealed, HEADER, key).map_err(decryption)?;

        let container: Container = serde_json::from_slice(&body)
            .map_err(|e| corruption(format!("container body: {e}")))?;
        container.validate()?;
        Ok(container)
    }

    fn validate(&self) -> Result<(), ProfileStoreError> {
        if self.format_version != FORMAT_VERSION {
            return Err(corruption(format!(
                "unsupported container format {}",
                self.format_version
            )));
        }
        for (map_key, profile) in &self.profiles {
            validate_key(map_key)
                .map_err(|_| corruption("container holds an invalid key".to_string()))?;
            if profile.key != *map_key {
                return Err(corruption(format!("record under {map_key} names another key")));
            }
            if profile.version == 0 {
                return Err(corruption(format!("record {map_key} has version 0")));
            }
        }
        Ok(())
    }
}

/// Salted with the profile key so equal birthdates differ across users.
fn birthdate_digest(profile_key: &str, birthdate: &str) -> String {
    crypto::hash(format!("{profile_key}\0{birthdate}").as_bytes())
}

fn decryption(err: CryptoError) -> ProfileStoreError {
    ProfileStoreError::Decryption {
        reason: err.to_string(),
    }
}

fn corruption(reason: String) -> ProfileStoreError {
    ProfileStoreError::Corruption { reason }
}
