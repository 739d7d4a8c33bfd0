//! # Settings Registry Service
//!
//! Typed configuration for the shell.
//!
//! ## Philosophy
//!
//! - **Typed settings**: every setting has an explicit type, checked on read
//! - **Layered**: read-only defaults plus persisted overrides
//! - **Deterministic**: ordering is stable and serialization reproducible
//! - **Explicit**: the registry is constructed and handed to whoever needs it;
//!   there is no process-wide instance
//!
//! ## Example
//!
//! ```ignore
//! use services_settings::{create_default_registry, keys, SettingValue};
//!
//! let mut registry = create_default_registry();
//! registry.set_override(keys::SNAPSHOT_MAX_BACKUPS, SettingValue::Integer(3))?;
//! let limit = registry.get_integer(keys::SNAPSHOT_MAX_BACKUPS)?;
//! ```

pub mod persistence;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Setting key (path-like identifier)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingKey(String);

impl SettingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks if this key starts with the given prefix
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SettingKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Setting value (strongly typed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    StringList(Vec<String>),
}

impl SettingValue {
    /// Name of the variant, used in type mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Boolean(_) => "boolean",
            SettingValue::Integer(_) => "integer",
            SettingValue::Float(_) => "float",
            SettingValue::String(_) => "string",
            SettingValue::StringList(_) => "string list",
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            SettingValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            SettingValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            SettingValue::StringList(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn same_type(&self, other: &SettingValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Boolean(v) => write!(f, "{}", v),
            SettingValue::Integer(v) => write!(f, "{}", v),
            SettingValue::Float(v) => write!(f, "{}", v),
            SettingValue::String(v) => write!(f, "{}", v),
            SettingValue::StringList(v) => write!(f, "{:?}", v),
        }
    }
}

/// Settings errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("Unknown setting: {0}")]
    UnknownKey(SettingKey),

    #[error("Setting {key} expects a {expected} value, found {found}")]
    TypeMismatch {
        key: SettingKey,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Setting {key} is out of range: {value}")]
    OutOfRange { key: SettingKey, value: String },
}

/// Settings registry
///
/// Overrides may only name keys that have a default, and must carry the
/// default's type.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    defaults: BTreeMap<SettingKey, SettingValue>,
    overrides: BTreeMap<SettingKey, SettingValue>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a default setting
    pub fn register_default(&mut self, key: impl Into<SettingKey>, value: SettingValue) {
        self.defaults.insert(key.into(), value);
    }

    /// Sets an override, checking it against the default's type
    pub fn set_override(
        &mut self,
        key: impl Into<SettingKey>,
        value: SettingValue,
    ) -> Result<(), SettingsError> {
        let key = key.into();
        let default = self
            .defaults
            .get(&key)
            .ok_or_else(|| SettingsError::UnknownKey(key.clone()))?;
        if !default.same_type(&value) {
            return Err(SettingsError::TypeMismatch {
                expected: default.type_name(),
                found: value.type_name(),
                key,
            });
        }
        tracing::debug!(key = %key, value = %value, "setting override");
        self.overrides.insert(key, value);
        Ok(())
    }

    /// Removes an override, returning to the default
    pub fn reset_to_default(&mut self, key: &SettingKey) -> bool {
        self.overrides.remove(key).is_some()
    }

    /// Gets the effective value (override or default)
    pub fn get(&self, key: &SettingKey) -> Option<&SettingValue> {
        self.overrides.get(key).or_else(|| self.defaults.get(key))
    }

    pub fn get_default(&self, key: &SettingKey) -> Option<&SettingValue> {
        self.defaults.get(key)
    }

    pub fn get_override(&self, key: &SettingKey) -> Option<&SettingValue> {
        self.overrides.get(key)
    }

    pub fn get_boolean(&self, key: &str) -> Result<bool, SettingsError> {
        self.typed(key, "boolean", SettingValue::as_boolean)
    }

    pub fn get_integer(&self, key: &str) -> Result<i64, SettingsError> {
        self.typed(key, "integer", SettingValue::as_integer)
    }

    pub fn get_float(&self, key: &str) -> Result<f64, SettingsError> {
        self.typed(key, "float", SettingValue::as_float)
    }

    pub fn get_string(&self, key: &str) -> Result<String, SettingsError> {
        self.typed(key, "string", |v| v.as_string().map(str::to_string))
    }

    /// Reads a non-negative integer setting as `usize`
    pub fn get_count(&self, key: &str) -> Result<usize, SettingsError> {
        let value = self.get_integer(key)?;
        usize::try_from(value).map_err(|_| SettingsError::OutOfRange {
            key: SettingKey::new(key),
            value: value.to_string(),
        })
    }

    pub fn list_defaults(&self) -> Vec<SettingKey> {
        self.defaults.keys().cloned().collect()
    }

    pub fn list_overrides(&self) -> Vec<SettingKey> {
        self.overrides.keys().cloned().collect()
    }

    /// Returns effective settings under a prefix, in key order
    pub fn list_with_prefix(&self, prefix: &str) -> Vec<(SettingKey, SettingValue)> {
        self.defaults
            .keys()
            .chain(self.overrides.keys())
            .filter(|key| key.starts_with(prefix))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .filter_map(|key| self.get(key).map(|value| (key.clone(), value.clone())))
            .collect()
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Exports overrides for persistence
    pub fn export_overrides(&self) -> BTreeMap<SettingKey, SettingValue> {
        self.overrides.clone()
    }

    /// Applies persisted overrides, skipping entries that fail validation
    ///
    /// Returns the rejected keys with their errors.
    pub fn apply_overrides(
        &mut self,
        overrides: BTreeMap<SettingKey, SettingValue>,
    ) -> Vec<SettingsError> {
        let mut rejected = Vec::new();
        for (key, value) in overrides {
            if let Err(err) = self.set_override(key, value) {
                tracing::warn!(error = %err, "ignoring persisted setting");
                rejected.push(err);
            }
        }
        rejected
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &'static str,
        read: impl Fn(&SettingValue) -> Option<T>,
    ) -> Result<T, SettingsError> {
        let key = SettingKey::new(key);
        let value = self
            .get(&key)
            .ok_or_else(|| SettingsError::UnknownKey(key.clone()))?;
        read(value).ok_or_else(|| SettingsError::TypeMismatch {
            expected,
            found: value.type_name(),
            key,
        })
    }
}

/// Setting keys read by the shell
pub mod keys {
    pub const SNAPSHOT_PATH: &str = "snapshot.path";
    pub const SNAPSHOT_BACKUP_DIR: &str = "snapshot.backup_dir";
    pub const SNAPSHOT_MAX_BACKUPS: &str = "snapshot.max_backups";
    pub const SNAPSHOT_SAVE_ON_SWITCH: &str = "snapshot.save_on_switch";
    pub const SHUTDOWN_SAVE_TIMEOUT_MS: &str = "shutdown.save_timeout_ms";
    pub const FOCUS_SESSION_HISTORY_LIMIT: &str = "focus.session_history_limit";
    pub const DISPATCHER_HISTORY_LIMIT: &str = "dispatcher.history_limit";
    pub const LOGGING_LEVEL: &str = "logging.level";
}

/// Creates a settings registry with the shell's defaults
pub fn create_default_registry() -> SettingsRegistry {
    let mut registry = SettingsRegistry::new();

    registry.register_default(
        keys::SNAPSHOT_PATH,
        SettingValue::String("state/snapshot.json".to_string()),
    );
    registry.register_default(
        keys::SNAPSHOT_BACKUP_DIR,
        SettingValue::String("state/backups".to_string()),
    );
    registry.register_default(keys::SNAPSHOT_MAX_BACKUPS, SettingValue::Integer(10));
    registry.register_default(keys::SNAPSHOT_SAVE_ON_SWITCH, SettingValue::Boolean(false));

    registry.register_default(keys::SHUTDOWN_SAVE_TIMEOUT_MS, SettingValue::Integer(3000));
    registry.register_default(keys::FOCUS_SESSION_HISTORY_LIMIT, SettingValue::Integer(64));
    registry.register_default(keys::DISPATCHER_HISTORY_LIMIT, SettingValue::Integer(256));
    registry.register_default(keys::LOGGING_LEVEL, SettingValue::String("info".to_string()));

    registry
}
