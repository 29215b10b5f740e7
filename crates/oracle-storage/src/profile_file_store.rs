use std::{
    fs,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use oracle_core::{
    keys::validate_key,
    profile::{ProfilePatch, ProfileRecord},
    storage::{ProfileStore, ProfileStoreError},
};
use tracing::{debug, instrument, warn};

use crate::{
    atomic_file::write_atomic, container::Container, key_material::KeyMaterial,
    named_mutex::NamedMutexRegistry,
};

/// AES-GCM encrypted, single-container profile store implementing the shared
/// `ProfileStore` contract.
///
/// Writers serialize on a named mutex keyed by the container path and replace
/// the file atomically. Readers take no lock: every read decrypts the file as
/// it is on disk, which atomic replacement keeps whole.
pub struct EncryptedProfileStore {
    path: PathBuf,
    key: Option<KeyMaterial>,
    locks: NamedMutexRegistry,
    lock_timeout: Option<Duration>,
}

impl EncryptedProfileStore {
    /// `key` of `None` leaves the store unconfigured: every operation then
    /// fails with `Configuration` before touching disk.
    pub fn new(path: impl Into<PathBuf>, key: Option<KeyMaterial>, locks: NamedMutexRegistry) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        debug!(path = %path.display(), configured = key.is_some(), "initializing profile store");
        Self {
            path,
            key,
            locks,
            lock_timeout: None,
        }
    }

    /// Bound how long writers wait for the container lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encryption_configured(&self) -> bool {
        self.key.is_some()
    }

    fn key_material(&self) -> Result<&KeyMaterial, ProfileStoreError> {
        self.key
            .as_ref()
            .ok_or_else(|| ProfileStoreError::Configuration {
                reason: "no encryption key material configured".to_string(),
            })
    }

    fn resource_name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Current container on disk; a missing file is an empty container.
    fn load(&self, material: &KeyMaterial) -> Result<Container, ProfileStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Container::default()),
            Err(err) => return Err(io_err(err)),
        };
        Container::open(&bytes, material).inspect_err(|err| {
            warn!(path = %self.path.display(), kind = err.kind(), "container failed to load");
        })
    }

    /// Run one read-modify-write cycle under the container lock. `apply`
    /// returns its result and whether the container changed; unchanged
    /// containers are not rewritten.
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Container, &KeyMaterial) -> Result<(T, bool), ProfileStoreError>,
    ) -> Result<T, ProfileStoreError> {
        let material = self.key_material()?;
        let _lock = self
            .locks
            .acquire(&self.resource_name(), self.lock_timeout)
            .await?;

        // No await below: a cancelled writer can only be dropped while
        // waiting for the lock, never between load and commit.
        let mut container = self.load(material)?;
        let (out, changed) = apply(&mut container, material)?;
        if changed {
            let sealed = container.seal(material)?;
            write_atomic(&self.path, &sealed).map_err(io_err)?;
        }
        Ok(out)
    }
}

#[async_trait]
impl ProfileStore for EncryptedProfileStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn get_profile(&self, key: &str) -> Result<ProfileRecord, ProfileStoreError> {
        let key = validate_key(key)?;
        let material = self.key_material()?;
        let container = self.load(material)?;
        container
            .get(key)
            .ok_or_else(|| ProfileStoreError::NotFound {
                key: key.to_string(),
            })?
            .to_record(material)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set_profile(
        &self,
        key: &str,
        patch: ProfilePatch,
    ) -> Result<ProfileRecord, ProfileStoreError> {
        let key = validate_key(key)?;
        // Reject a bad birthdate before waiting on the lock.
        patch.normalized_birthdate()?;

        let record = self
            .mutate(|container, material| {
                let stored = container.upsert(key, &patch, material, Utc::now())?;
                Ok((stored.to_record(material)?, true))
            })
            .await?;
        debug!(version = record.version, "profile written");
        Ok(record)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn delete_profile(&self, key: &str) -> Result<(), ProfileStoreError> {
        let key = validate_key(key)?;
        let removed = self
            .mutate(|container, _| {
                let removed = container.remove(key);
                Ok((removed, removed))
            })
            .await?;
        debug!(removed, "profile delete");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_keys(&self) -> Result<Vec<String>, ProfileStoreError> {
        let material = self.key_material()?;
        Ok(self.load(material)?.keys())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn verify_birthdate(
        &self,
        key: &str,
        candidate: &str,
    ) -> Result<bool, ProfileStoreError> {
        let key = validate_key(key)?;
        let material = self.key_material()?;
        let container = self.load(material)?;
        container
            .get(key)
            .ok_or_else(|| ProfileStoreError::NotFound {
                key: key.to_string(),
            })?
            .birthdate_matches(candidate)
    }
}

fn io_err(err: io::Error) -> ProfileStoreError {
    ProfileStoreError::Io {
        reason: err.to_string(),
    }
}
