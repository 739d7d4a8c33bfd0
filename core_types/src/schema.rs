//! Snapshot schema version types
//!
//! These types enable disciplined evolution of the persisted shell state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a schema version string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid schema version {0:?}: expected \"major.minor\"")]
pub struct SchemaVersionError(pub String);

/// Version of the persisted document schema
///
/// Written as the string `"major.minor"`. Ordering is lexicographic on
/// (major, minor), so `1.10 > 1.9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    /// Major version (breaking changes)
    pub major: u32,
    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl SchemaVersion {
    /// Creates a new schema version
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses `"major.minor"`
    pub fn parse(s: &str) -> Result<Self, SchemaVersionError> {
        let invalid = || SchemaVersionError(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        let major = major.parse::<u32>().map_err(|_| invalid())?;
        let minor = minor.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self { major, minor })
    }

    /// Checks if this version is older than another
    pub fn is_older_than(&self, other: &SchemaVersion) -> bool {
        self < other
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = SchemaVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}

/// Record of how a document was migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationLineage {
    /// Original schema version
    pub from_version: SchemaVersion,
    /// Target schema version
    pub to_version: SchemaVersion,
    /// Every version the document passed through, starting with `from_version`
    pub path: Vec<SchemaVersion>,
    /// Optional timestamp when migration occurred
    pub migrated_at: Option<u64>,
}

impl MigrationLineage {
    /// Creates a lineage that has not moved yet
    pub fn new(from: SchemaVersion) -> Self {
        Self {
            from_version: from,
            to_version: from,
            path: vec![from],
            migrated_at: None,
        }
    }

    /// Appends a step to the lineage
    pub fn push(&mut self, to: SchemaVersion) {
        self.to_version = to;
        self.path.push(to);
    }

    /// Sets the migration timestamp
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.migrated_at = Some(timestamp);
        self
    }

    /// Returns true if no migration step was applied
    pub fn is_noop(&self) -> bool {
        self.path.len() == 1
    }
}
