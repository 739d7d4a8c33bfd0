//! Typed shell configuration

use services_settings::{keys, SettingsError, SettingsRegistry};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shell configuration, read once from the settings registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub snapshot_path: PathBuf,
    pub backup_dir: PathBuf,
    pub max_backups: usize,
    /// Save a snapshot after every workspace switch
    pub save_on_switch: bool,
    /// Longest wait for the shutdown save before giving up
    pub shutdown_save_timeout: Duration,
    pub session_history_limit: usize,
    pub dispatcher_history_limit: usize,
    pub log_level: String,
}

impl ShellConfig {
    /// Builds the config from effective settings
    ///
    /// Fails on a wrongly typed or negative value rather than guessing.
    pub fn from_settings(settings: &SettingsRegistry) -> Result<Self, SettingsError> {
        Ok(Self {
            snapshot_path: PathBuf::from(settings.get_string(keys::SNAPSHOT_PATH)?),
            backup_dir: PathBuf::from(settings.get_string(keys::SNAPSHOT_BACKUP_DIR)?),
            max_backups: settings.get_count(keys::SNAPSHOT_MAX_BACKUPS)?,
            save_on_switch: settings.get_boolean(keys::SNAPSHOT_SAVE_ON_SWITCH)?,
            shutdown_save_timeout: Duration::from_millis(
                settings.get_count(keys::SHUTDOWN_SAVE_TIMEOUT_MS)? as u64,
            ),
            session_history_limit: settings.get_count(keys::FOCUS_SESSION_HISTORY_LIMIT)?,
            dispatcher_history_limit: settings.get_count(keys::DISPATCHER_HISTORY_LIMIT)?,
            log_level: settings.get_string(keys::LOGGING_LEVEL)?,
        })
    }

    /// Places the snapshot and its backups under one directory
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.snapshot_path = dir.join("snapshot.json");
        self.backup_dir = dir.join("backups");
        self
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("state/snapshot.json"),
            backup_dir: PathBuf::from("state/backups"),
            max_backups: 10,
            save_on_switch: false,
            shutdown_save_timeout: Duration::from_millis(3000),
            session_history_limit: 64,
            dispatcher_history_limit: 256,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use services_settings::{create_default_registry, SettingValue};

    #[test]
    fn test_default_matches_default_settings() {
        let config = ShellConfig::from_settings(&create_default_registry()).unwrap();
        assert_eq!(config, ShellConfig::default());
    }

    #[test]
    fn test_overrides_flow_through() {
        let mut settings = create_default_registry();
        settings
            .set_override(keys::SHUTDOWN_SAVE_TIMEOUT_MS, SettingValue::Integer(50))
            .unwrap();
        settings
            .set_override(keys::SNAPSHOT_SAVE_ON_SWITCH, SettingValue::Boolean(true))
            .unwrap();

        let config = ShellConfig::from_settings(&settings).unwrap();
        assert_eq!(config.shutdown_save_timeout, Duration::from_millis(50));
        assert!(config.save_on_switch);
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut settings = create_default_registry();
        settings
            .set_override(keys::SNAPSHOT_MAX_BACKUPS, SettingValue::Integer(-2))
            .unwrap();
        assert!(matches!(
            ShellConfig::from_settings(&settings),
            Err(SettingsError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_in_dir() {
        let config = ShellConfig::default().in_dir(Path::new("/tmp/shell"));
        assert_eq!(config.snapshot_path, PathBuf::from("/tmp/shell/snapshot.json"));
        assert_eq!(config.backup_dir, PathBuf::from("/tmp/shell/backups"));
    }
}
