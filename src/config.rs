//! Configuration types for mass-download

use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Batch log behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    /// fsync the batch file after every appended record (default: false)
    ///
    /// Records are always flushed to the OS after each append; this adds a
    /// durability barrier at the cost of one sync per lifecycle event.
    #[serde(default)]
    pub sync_on_append: bool,

    /// Write pass begin/end comment markers (default: true)
    #[serde(default = "default_true")]
    pub pass_markers: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sync_on_append: false,
            pass_markers: true,
        }
    }
}

/// Where and how fetched packages are stored
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root directory; packages go to `<root>/<account>/<package>.<extension>`
    /// (default: "./packages")
    #[serde(default = "default_repository_root")]
    pub root: PathBuf,

    /// Base64-decode payloads before writing (default: true)
    #[serde(default = "default_true")]
    pub decode_payload: bool,

    /// File collision handling (default: overwrite, so a replay-driven re-save
    /// replaces the earlier copy)
    #[serde(default = "default_collision")]
    pub file_collision: FileCollisionAction,

    /// File extension of stored packages (default: "zip")
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: default_repository_root(),
            decode_payload: true,
            file_collision: default_collision(),
            extension: default_extension(),
        }
    }
}

/// Pass behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PassConfig {
    /// Re-authenticate when a token expires within this margin (default: 30 seconds)
    #[serde(default = "default_token_margin", with = "duration_serde")]
    pub token_refresh_margin: Duration,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            token_refresh_margin: default_token_margin(),
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename
    Rename,
    /// Overwrite existing file (default)
    #[default]
    Overwrite,
    /// Keep the existing file
    Skip,
}

/// Main configuration
///
/// Fields are organized into sub-configs:
/// - [`log`](LogConfig) — batch log durability and markers
/// - [`repository`](RepositoryConfig) — package storage
/// - [`pass`](PassConfig) — per-pass protocol behavior
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Batch log behavior
    #[serde(default)]
    pub log: LogConfig,

    /// Package storage
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Pass behavior
    #[serde(default)]
    pub pass: PassConfig,
}

impl Config {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.repository.root.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "repository root must not be empty".to_string(),
                key: Some("repository.root".to_string()),
            });
        }
        if self.repository.extension.contains(['/', '\\', '.']) {
            return Err(Error::Config {
                message: format!(
                    "extension '{}' must be a bare extension without dots or separators",
                    self.repository.extension
                ),
                key: Some("repository.extension".to_string()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_repository_root() -> PathBuf {
    PathBuf::from("packages")
}

fn default_collision() -> FileCollisionAction {
    FileCollisionAction::Overwrite
}

fn default_extension() -> String {
    "zip".to_string()
}

fn default_token_margin() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");
        assert!(!config.log.sync_on_append);
        assert!(config.log.pass_markers);
        assert_eq!(config.repository.root, PathBuf::from("packages"));
        assert_eq!(config.repository.file_collision, FileCollisionAction::Overwrite);
        assert_eq!(config.repository.extension, "zip");
        assert_eq!(config.pass.token_refresh_margin, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_overrides() {
        let json = r#"{
            "log": { "sync_on_append": true },
            "repository": { "root": "/data/pkg", "file_collision": "skip" },
            "pass": { "token_refresh_margin": 90 }
        }"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");
        assert!(config.log.sync_on_append);
        assert!(config.log.pass_markers);
        assert_eq!(config.repository.root, PathBuf::from("/data/pkg"));
        assert_eq!(config.repository.file_collision, FileCollisionAction::Skip);
        assert!(config.repository.decode_payload);
        assert_eq!(config.pass.token_refresh_margin, Duration::from_secs(90));
    }

    #[test]
    fn test_from_json_file_validates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"repository": {"extension": "tar.gz"}}"#).unwrap();

        match Config::from_json_file(&path) {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("repository.extension"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_json_file_missing() {
        let dir = tempdir().unwrap();
        let err = Config::from_json_file(dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.error_code(), "config_error");
    }
}
