//! Start-up configuration for the notes store.
//!
//! # Invariants
//! - `data_dir`, when set, is absolute.
//! - The backend variant is read from here once, by `open_backend`.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Requested storage variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Indexed when it can be opened, otherwise flat map.
    #[default]
    Auto,
    Indexed,
    FlatMap,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Indexed => "indexed",
            Self::FlatMap => "flat_map",
        }
    }
}

/// Store configuration, usually decoded from a JSON document.
///
/// ```json
/// { "backend": "indexed", "data_dir": "/var/lib/notes" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Directory for on-disk state; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Per-blob size cap for the flat map variant.
    pub flat_map_quota_bytes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    RelativeDataDir(PathBuf),
    ZeroQuota,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid store config: {message}"),
            Self::RelativeDataDir(path) => {
                write!(f, "data_dir must be absolute, got `{}`", path.display())
            }
            Self::ZeroQuota => write!(f, "flat_map_quota_bytes must be greater than zero"),
        }
    }
}

impl Error for ConfigError {}

impl StoreConfig {
    pub fn in_memory(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn on_disk(backend: BackendKind, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            data_dir: Some(data_dir.into()),
            flat_map_quota_bytes: None,
        }
    }

    /// Decodes and validates a JSON config document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dir) = self.data_dir.as_ref() {
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeDataDir(dir.clone()));
            }
        }
        if self.flat_map_quota_bytes == Some(0) {
            return Err(ConfigError::ZeroQuota);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendKind, ConfigError, StoreConfig};

    #[test]
    fn empty_document_means_auto_in_memory() {
        let config = StoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StoreConfig::in_memory(BackendKind::Auto));
    }

    #[test]
    fn parses_backend_and_quota() {
        let config = StoreConfig::from_json_str(
            r#"{ "backend": "flat_map", "data_dir": "/tmp/notes", "flat_map_quota_bytes": 4096 }"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::FlatMap);
        assert_eq!(config.flat_map_quota_bytes, Some(4096));
    }

    #[test]
    fn rejects_relative_dir_unknown_keys_and_zero_quota() {
        assert!(matches!(
            StoreConfig::from_json_str(r#"{ "data_dir": "notes" }"#),
            Err(ConfigError::RelativeDataDir(_))
        ));
        assert!(matches!(
            StoreConfig::from_json_str(r#"{ "backnd": "indexed" }"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            StoreConfig::from_json_str(r#"{ "flat_map_quota_bytes": 0 }"#),
            Err(ConfigError::ZeroQuota)
        ));
    }
}
