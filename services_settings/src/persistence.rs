//! Settings persistence layer
//!
//! Overrides are stored as versioned, pretty-printed JSON. Loading is
//! forgiving: a missing or corrupt file yields no overrides.

use crate::{SettingKey, SettingValue, SettingsRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Serializable container for settings overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsOverridesData {
    /// Version of the settings format
    pub version: u32,
    pub overrides: BTreeMap<String, SettingValue>,
}

impl SettingsOverridesData {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            overrides: BTreeMap::new(),
        }
    }

    pub fn from_registry(registry: &SettingsRegistry) -> Self {
        let mut data = Self::new();
        for (key, value) in registry.export_overrides() {
            data.overrides.insert(key.as_str().to_string(), value);
        }
        data
    }

    pub fn to_overrides(&self) -> BTreeMap<SettingKey, SettingValue> {
        self.overrides
            .iter()
            .map(|(key, value)| (SettingKey::new(key.as_str()), value.clone()))
            .collect()
    }
}

impl Default for SettingsOverridesData {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during persistence operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to serialize settings: {0}")]
    SerializationFailed(#[source] serde_json::Error),

    #[error("Failed to deserialize settings: {0}")]
    DeserializationFailed(#[source] serde_json::Error),

    #[error("Unsupported settings version: {0}")]
    UnsupportedVersion(u32),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

pub fn serialize_overrides(data: &SettingsOverridesData) -> PersistenceResult<Vec<u8>> {
    serde_json::to_vec_pretty(data).map_err(PersistenceError::SerializationFailed)
}

pub fn deserialize_overrides(bytes: &[u8]) -> PersistenceResult<SettingsOverridesData> {
    let data: SettingsOverridesData =
        serde_json::from_slice(bytes).map_err(PersistenceError::DeserializationFailed)?;
    if data.version != SettingsOverridesData::CURRENT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(data.version));
    }
    Ok(data)
}

/// Loads overrides from bytes, falling back to none on error
pub fn load_overrides_safe(bytes: &[u8]) -> SettingsOverridesData {
    match deserialize_overrides(bytes) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(error = %err, "discarding unreadable settings overrides");
            SettingsOverridesData::new()
        }
    }
}

/// Reads overrides from a file; a missing file means no overrides
pub fn load_overrides_file(path: &Path) -> PersistenceResult<SettingsOverridesData> {
    match fs::read(path) {
        Ok(bytes) => Ok(load_overrides_safe(&bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(SettingsOverridesData::new()),
        Err(source) => Err(PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes the registry's overrides to a file
pub fn save_overrides_file(path: &Path, registry: &SettingsRegistry) -> PersistenceResult<()> {
    let bytes = serialize_overrides(&SettingsOverridesData::from_registry(registry))?;
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, bytes).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_default_registry, keys};

    #[test]
    fn test_from_registry_keeps_only_overrides() {
        let mut registry = create_default_registry();
        registry
            .set_override(keys::SNAPSHOT_MAX_BACKUPS, SettingValue::Integer(2))
            .unwrap();

        let data = SettingsOverridesData::from_registry(&registry);
        assert_eq!(data.version, SettingsOverridesData::CURRENT_VERSION);
        assert_eq!(data.overrides.len(), 1);
        assert_eq!(
            data.to_overrides().get(&SettingKey::new(keys::SNAPSHOT_MAX_BACKUPS)),
            Some(&SettingValue::Integer(2))
        );
    }

    #[test]
    fn test_serialized_form_is_stable() {
        let mut data = SettingsOverridesData::new();
        data.overrides.insert("b".to_string(), SettingValue::Boolean(true));
        data.overrides.insert("a".to_string(), SettingValue::Integer(1));

        let first = serialize_overrides(&data).unwrap();
        let second = serialize_overrides(&data).unwrap();
        assert_eq!(first, second);

        let text = String::from_utf8(first).unwrap();
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let bytes = br#"{"version": 99, "overrides": {}}"#;
        assert!(matches!(
            deserialize_overrides(bytes),
            Err(PersistenceError::UnsupportedVersion(99))
        ));
        assert!(load_overrides_safe(bytes).overrides.is_empty());
    }

    #[test]
    fn test_corrupt_bytes_fall_back() {
        assert_eq!(load_overrides_safe(b"{not json"), SettingsOverridesData::new());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config").join("settings.json");
        assert!(load_overrides_file(&path).unwrap().overrides.is_empty());

        let mut registry = create_default_registry();
        registry
            .set_override(keys::SNAPSHOT_SAVE_ON_SWITCH, SettingValue::Boolean(true))
            .unwrap();
        save_overrides_file(&path, &registry).unwrap();

        let mut reloaded = create_default_registry();
        let rejected = reloaded.apply_overrides(load_overrides_file(&path).unwrap().to_overrides());
        assert!(rejected.is_empty());
        assert_eq!(reloaded.get_boolean(keys::SNAPSHOT_SAVE_ON_SWITCH), Ok(true));
    }
}
