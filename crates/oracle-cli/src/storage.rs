use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use oracle_storage::{key_material::resolve_configured_key, EncryptedProfileStore, NamedMutexRegistry};
#[cfg(test)]
use oracle_storage::KeyMaterial;
use tracing::{debug, warn};

/// File name of the encrypted container inside the data directory.
pub const CONTAINER_FILE: &str = "profiles.bin";

/// Resolve the default data directory for Oracle.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("oracle"))
}

/// Container path, honoring the config's data dir override.
pub fn container_path(config: &Config) -> Result<PathBuf> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    Ok(root.join(CONTAINER_FILE))
}

/// Build the encrypted store from config. Key material is read here, once;
/// a malformed key is an error rather than "unconfigured".
pub fn store_from_config(config: &Config, locks: NamedMutexRegistry) -> Result<EncryptedProfileStore> {
    let path = container_path(config)?;
    let secret = config.encryption_secret();
    let key = resolve_configured_key(secret.as_deref())
        .map_err(|e| color_eyre::eyre::eyre!("invalid encryption key: {e}"))?;
    match &key {
        Some(key) => debug!(?path, fingerprint = %key.fingerprint(), "initializing encrypted store"),
        None => warn!(?path, "encryption key not configured; profile operations will be refused"),
    }

    let store = EncryptedProfileStore::new(path, key, locks);
    Ok(match config.lock_timeout() {
        Some(timeout) => store.with_lock_timeout(timeout),
        None => store,
    })
}

/// Helper for tests to construct a store rooted at a temp dir with a fresh key.
#[cfg(test)]
pub fn test_store(root: impl Into<PathBuf>) -> EncryptedProfileStore {
    EncryptedProfileStore::new(
        root.into().join(CONTAINER_FILE),
        Some(KeyMaterial::generate()),
        NamedMutexRegistry::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_override_places_container() {
        let config = Config {
            data_dir: Some(PathBuf::from("/srv/oracle")),
            ..Config::default()
        };
        assert_eq!(
            container_path(&config).expect("path"),
            PathBuf::from("/srv/oracle").join(CONTAINER_FILE)
        );
    }

    #[test]
    fn configured_key_enables_encryption() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            encryption_key: Some(KeyMaterial::generate().to_base64()),
            lock_timeout_ms: Some(250),
        };
        let store = store_from_config(&config, NamedMutexRegistry::new()).expect("store");
        assert!(store.is_encryption_configured());
        assert!(store.path().ends_with(CONTAINER_FILE));
    }

    #[test]
    fn malformed_key_is_rejected() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/unused")),
            encryption_key: Some("definitely-not-a-key".into()),
            lock_timeout_ms: None,
        };
        assert!(store_from_config(&config, NamedMutexRegistry::new()).is_err());
    }
}
