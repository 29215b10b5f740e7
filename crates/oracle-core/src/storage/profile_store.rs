use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::{
    keys::validate_key,
    profile::{normalize_birthdate, ProfilePatch, ProfileRecord},
};

/// Every way a profile store operation can fail. Closed so callers can map
/// each kind to a response exhaustively.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileStoreError {
    /// Encryption key material is missing or unusable.
    #[error("encryption not configured: {reason}")]
    Configuration { reason: String },
    /// Caller input (key, birthdate) failed validation.
    #[error("invalid input: {reason}")]
    Validation { reason: String },
    /// Ciphertext did not authenticate: wrong key or tampered bytes.
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },
    /// Container authenticated but its contents are not a valid profile map.
    #[error("container corrupt: {reason}")]
    Corruption { reason: String },
    /// Disk or permission failure while reading or writing.
    #[error("io failure: {reason}")]
    Io { reason: String },
    /// Named lock was not acquired in time.
    #[error("timed out after {waited_ms}ms waiting for lock on {resource}")]
    LockTimeout { resource: String, waited_ms: u64 },
    /// Requested key does not exist.
    #[error("profile not found for key: {key}")]
    NotFound { key: String },
}

impl ProfileStoreError {
    /// Stable tag for mapping to external responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Validation { .. } => "validation",
            Self::Decryption { .. } => "decryption",
            Self::Corruption { .. } => "corruption",
            Self::Io { .. } => "io",
            Self::LockTimeout { .. } => "lock_timeout",
            Self::NotFound { .. } => "not_found",
        }
    }
}

/// Contract for per-user profile persistence.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Latest committed record for `key`.
    async fn get_profile(&self, key: &str) -> Result<ProfileRecord, ProfileStoreError>;

    /// Merge `patch` into the record for `key`, creating it if absent.
    async fn set_profile(
        &self,
        key: &str,
        patch: ProfilePatch,
    ) -> Result<ProfileRecord, ProfileStoreError>;

    /// Remove the record for `key` (idempotent).
    async fn delete_profile(&self, key: &str) -> Result<(), ProfileStoreError>;

    /// All stored keys in ascending order.
    async fn list_keys(&self) -> Result<Vec<String>, ProfileStoreError>;

    /// Whether `candidate` matches the stored birthdate for `key`.
    async fn verify_birthdate(&self, key: &str, candidate: &str)
        -> Result<bool, ProfileStoreError>;
}

/// In-memory profile store for tests and smoke runs.
/// Nothing is encrypted; production code must use the file-backed store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProfileStore {
    inner: Arc<Mutex<BTreeMap<String, ProfileRecord>>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, ProfileRecord>>, ProfileStoreError>
    {
        self.inner.lock().map_err(|err| ProfileStoreError::Io {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(&self, key: &str) -> Result<ProfileRecord, ProfileStoreError> {
        let key = validate_key(key)?;
        let map = self.lock()?;
        map.get(key)
            .cloned()
            .ok_or_else(|| ProfileStoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn set_profile(
        &self,
        key: &str,
        patch: ProfilePatch,
    ) -> Result<ProfileRecord, ProfileStoreError> {
        let key = validate_key(key)?;
        let now = Utc::now();
        let mut map = self.lock()?;
        let mut record = map
            .get(key)
            .cloned()
            .unwrap_or_else(|| ProfileRecord::empty(key, now));
        record.apply(&patch, now)?;
        map.insert(key.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_profile(&self, key: &str) -> Result<(), ProfileStoreError> {
        let key = validate_key(key)?;
        self.lock()?.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, ProfileStoreError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn verify_birthdate(
        &self,
        key: &str,
        candidate: &str,
    ) -> Result<bool, ProfileStoreError> {
        let record = self.get_profile(key).await?;
        let candidate = normalize_birthdate(candidate)?;
        Ok(record.birthdate.as_deref() == Some(candidate.as_str()))
    }
}
