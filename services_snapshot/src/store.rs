//! Snapshot file storage
//!
//! Owns one snapshot path plus a directory of pre-migration backups. Writes
//! go to a sibling temp file first and are renamed into place, so the live
//! file is never left half-written.

use crate::SnapshotError;
use core_types::SchemaVersion;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default number of backups kept per snapshot path
pub const DEFAULT_MAX_BACKUPS: usize = 10;

const BACKUP_MARKER: &str = ".backup-v";

/// A backup copy of the snapshot file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: PathBuf,
    /// Schema version of the backed-up document
    pub version: SchemaVersion,
    pub timestamp: u64,
    /// First eight hex digits of the content's SHA-256
    pub digest: String,
}

/// Snapshot file plus backup directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
}

impl SnapshotStore {
    /// Creates a store whose backups live next to the snapshot file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path,
            backup_dir,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    /// Sets how many backups survive pruning; zero keeps every backup
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Reads the snapshot file, returning `None` when it does not exist
    pub fn read_raw(&self) -> Result<Option<String>, SnapshotError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SnapshotError::io(&self.path, source)),
        }
    }

    /// Replaces the snapshot file atomically
    pub fn write_atomic(&self, contents: &str) -> Result<(), SnapshotError> {
        write_file_atomic(&self.path, contents)
    }

    /// Copies the given document into the backup directory
    ///
    /// Writing the same content twice at the same timestamp yields the same
    /// name, so a repeated backup overwrites instead of duplicating.
    pub fn create_backup(
        &self,
        raw: &str,
        version: SchemaVersion,
        timestamp: u64,
    ) -> Result<BackupInfo, SnapshotError> {
        let digest = short_digest(raw);
        let name = format!(
            "{}{}{}-{}-{}.json",
            self.stem(),
            BACKUP_MARKER,
            version,
            timestamp,
            digest
        );
        let path = self.backup_dir.join(name);
        write_file_atomic(&path, raw)?;
        tracing::info!(path = %path.display(), %version, "created snapshot backup");

        let info = BackupInfo {
            path,
            version,
            timestamp,
            digest,
        };
        self.prune()?;
        Ok(info)
    }

    /// Lists backups for this snapshot, oldest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, SnapshotError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(SnapshotError::io(&self.backup_dir, source)),
        };

        let prefix = format!("{}{}", self.stem(), BACKUP_MARKER);
        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SnapshotError::io(&self.backup_dir, source))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(info) = parse_backup_name(name, &prefix) {
                backups.push(BackupInfo { path, ..info });
            }
        }
        backups.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(backups)
    }

    /// Removes the oldest backups beyond the retention limit
    pub fn prune(&self) -> Result<usize, SnapshotError> {
        if self.max_backups == 0 {
            return Ok(0);
        }
        let backups = self.list_backups()?;
        let excess = backups.len().saturating_sub(self.max_backups);
        for backup in backups.iter().take(excess) {
            fs::remove_file(&backup.path).map_err(|source| SnapshotError::io(&backup.path, source))?;
            tracing::debug!(path = %backup.path.display(), "pruned snapshot backup");
        }
        Ok(excess)
    }

    /// Copies a backup over the live snapshot file
    pub fn restore_backup(&self, backup: &BackupInfo) -> Result<(), SnapshotError> {
        let raw = fs::read_to_string(&backup.path)
            .map_err(|source| SnapshotError::io(&backup.path, source))?;
        self.write_atomic(&raw)?;
        tracing::warn!(path = %backup.path.display(), "restored snapshot from backup");
        Ok(())
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("snapshot")
            .to_string()
    }
}

/// Writes a file through a temp sibling and a rename
pub(crate) fn write_file_atomic(path: &Path, contents: &str) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SnapshotError::io(parent, source))?;
    }
    let temp = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&temp, contents).map_err(|source| SnapshotError::io(&temp, source))?;
    if let Err(source) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(SnapshotError::io(path, source));
    }
    Ok(())
}

fn short_digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(4)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Parses `{stem}.backup-v{major}.{minor}-{timestamp}-{digest}.json`
fn parse_backup_name(name: &str, prefix: &str) -> Option<BackupInfo> {
    let rest = name.strip_prefix(prefix)?.strip_suffix(".json")?;
    let mut parts = rest.rsplitn(3, '-');
    let digest = parts.next()?;
    let timestamp = parts.next()?.parse::<u64>().ok()?;
    let version = SchemaVersion::parse(parts.next()?).ok()?;
    Some(BackupInfo {
        path: PathBuf::from(name),
        version,
        timestamp,
        digest: digest.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SnapshotStore {
        SnapshotStore::new(dir.path().join("shell.json")).with_backup_dir(dir.path().join("backups"))
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).read_raw().unwrap(), None);
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.write_atomic("{\"a\":1}").unwrap();
        store.write_atomic("{\"a\":2}").unwrap();

        assert_eq!(store.read_raw().unwrap().as_deref(), Some("{\"a\":2}"));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_backup_name_carries_version_and_digest() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let info = store
            .create_backup("{}", SchemaVersion::new(1, 0), 1234)
            .unwrap();

        let name = info.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("shell.backup-v1.0-1234-"));
        assert!(name.ends_with(".json"));
        assert_eq!(info.digest.len(), 8);
        assert_eq!(fs::read_to_string(&info.path).unwrap(), "{}");

        let listed = store.list_backups().unwrap();
        assert_eq!(listed, vec![info]);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).with_max_backups(2);

        for ts in 1..=4u64 {
            store
                .create_backup(&format!("{{\"n\":{}}}", ts), SchemaVersion::new(1, 1), ts)
                .unwrap();
        }

        let timestamps: Vec<u64> = store.list_backups().unwrap().iter().map(|b| b.timestamp).collect();
        assert_eq!(timestamps, vec![3, 4]);
    }

    #[test]
    fn test_unrelated_files_ignored() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.backup_dir()).unwrap();
        fs::write(store.backup_dir().join("notes.txt"), "x").unwrap();
        fs::write(store.backup_dir().join("other.backup-v1.0-5-abcd1234.json"), "{}").unwrap();
        fs::write(store.backup_dir().join("shell.backup-vX-5-abcd1234.json"), "{}").unwrap();

        assert!(store.list_backups().unwrap().is_empty());
    }

    #[test]
    fn test_restore_backup_overwrites_live_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write_atomic("old").unwrap();
        let backup = store.create_backup("old", SchemaVersion::new(1, 0), 7).unwrap();
        store.write_atomic("new").unwrap();

        store.restore_backup(&backup).unwrap();
        assert_eq!(store.read_raw().unwrap().as_deref(), Some("old"));
    }
}
