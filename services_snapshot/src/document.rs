//! Persisted document types
//!
//! The on-disk shape is camelCase JSON:
//! `{schemaVersion, timestamp, applicationState, workspaces: [{name, index, widgetStates}], userData}`.

use core_types::{SchemaVersion, StateMap};
use serde::{Deserialize, Serialize};

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 2);

/// Version assumed for documents that carry no `schemaVersion` field
pub const LEGACY_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0);

/// `applicationState` key holding the current workspace index
pub const CURRENT_WORKSPACE_KEY: &str = "currentWorkspace";

/// `applicationState` key holding the exported focus history map
pub const FOCUS_HISTORY_KEY: &str = "focusHistory";

/// `applicationState` key holding each workspace's focus owner
pub const FOCUSED_WIDGETS_KEY: &str = "focusedWidgets";

/// A captured snapshot of the shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub schema_version: SchemaVersion,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    #[serde(default)]
    pub application_state: StateMap,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceState>,
    #[serde(default)]
    pub user_data: StateMap,
}

impl StateSnapshot {
    /// Creates an empty snapshot at the current schema version
    pub fn new(timestamp: u64) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            timestamp,
            application_state: StateMap::new(),
            workspaces: Vec::new(),
            user_data: StateMap::new(),
        }
    }

    /// Looks up a workspace state by index
    pub fn workspace(&self, index: usize) -> Option<&WorkspaceState> {
        self.workspaces.iter().find(|ws| ws.index == index)
    }

    /// Total number of widget-state records
    pub fn widget_count(&self) -> usize {
        self.workspaces.iter().map(|ws| ws.widget_states.len()).sum()
    }
}

/// Persisted state of one workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    pub name: String,
    pub index: usize,
    /// One map per widget, in navigation order
    #[serde(default)]
    pub widget_states: Vec<StateMap>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_is_camel_case() {
        let mut snapshot = StateSnapshot::new(1_700_000_000_000);
        let mut widget = StateMap::new();
        widget.insert("widgetId".to_string(), json!(2));
        snapshot.workspaces.push(WorkspaceState {
            name: "main".to_string(),
            index: 0,
            widget_states: vec![widget],
        });

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["schemaVersion"], json!("1.2"));
        assert_eq!(value["workspaces"][0]["widgetStates"][0]["widgetId"], json!(2));
        assert!(value.get("applicationState").is_some());
        assert!(value.get("userData").is_some());
    }

    #[test]
    fn test_missing_optional_sections_default() {
        let snapshot: StateSnapshot = serde_json::from_value(json!({
            "schemaVersion": "1.2",
            "timestamp": 5,
            "workspaces": [{"name": "main", "index": 0}]
        }))
        .unwrap();
        assert!(snapshot.application_state.is_empty());
        assert!(snapshot.user_data.is_empty());
        assert_eq!(snapshot.widget_count(), 0);
        assert_eq!(snapshot.workspace(0).map(|ws| ws.name.as_str()), Some("main"));
    }

    #[test]
    fn test_malformed_version_rejected() {
        let result: Result<StateSnapshot, _> = serde_json::from_value(json!({
            "schemaVersion": "one",
            "timestamp": 5
        }));
        assert!(result.is_err());
    }
}
