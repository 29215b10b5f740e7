use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `encryption_key` from the file.
pub const ENCRYPTION_KEY_ENV: &str = "ORACLE_ENCRYPTION_KEY";

/// User-level configuration loaded from `~/.config/oracle/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for data directory (encrypted container lives here).
    pub data_dir: Option<PathBuf>,
    /// Base64 256-bit key. Without it, profile operations are refused.
    pub encryption_key: Option<String>,
    /// How long writers wait for the container lock; unbounded when unset.
    pub lock_timeout_ms: Option<u64>,
}

impl Config {
    /// Key secret with the environment taking precedence over the file.
    pub fn encryption_secret(&self) -> Option<String> {
        resolve_secret(self, std::env::var(ENCRYPTION_KEY_ENV).ok())
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

fn resolve_secret(config: &Config, env: Option<String>) -> Option<String> {
    env.filter(|s| !s.trim().is_empty())
        .or_else(|| config.encryption_key.clone())
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("oracle").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

/// Never clobbers an existing file, to avoid losing user edits.
pub fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/oracle-data"
            encryption_key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
            lock_timeout_ms = 1500
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/oracle-data")),
                encryption_key: Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".into()),
                lock_timeout_ms: Some(1500),
            }
        );
        assert_eq!(cfg.lock_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn environment_key_wins_over_file() {
        let cfg = Config {
            encryption_key: Some("from-file".into()),
            ..Config::default()
        };
        assert_eq!(
            resolve_secret(&cfg, Some("from-env".into())).as_deref(),
            Some("from-env")
        );
        assert_eq!(resolve_secret(&cfg, Some("  ".into())).as_deref(), Some("from-file"));
        assert_eq!(resolve_secret(&Config::default(), None), None);
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/oracle-data")),
            ..Config::default()
        };

        write_to_path_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config {
            lock_timeout_ms: Some(5),
            ..Config::default()
        };
        let second = write_to_path_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);
        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, cfg);
    }
}
