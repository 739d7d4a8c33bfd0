//! Capture, persistence, and restore of shell state

use crate::document::{
    StateSnapshot, WorkspaceState, CURRENT_WORKSPACE_KEY, FOCUSED_WIDGETS_KEY,
    LEGACY_SCHEMA_VERSION,
};
use crate::migration::MigrationRegistry;
use crate::store::{BackupInfo, SnapshotStore};
use crate::SnapshotError;
use core_types::{
    is_reserved_key, widget_id_of, Clock, MigrationLineage, SchemaVersion, StateMap, WidgetId,
    WIDGET_ID_KEY, WIDGET_TYPE_KEY,
};
use lifecycle::LifecyclePhase;
use serde_json::{json, Value};
use services_fault_boundary::LifecycleOutcome;
use services_workspace_manager::WorkspaceManager;

/// Result of a successful load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSnapshot {
    pub snapshot: StateSnapshot,
    /// How the document got to the current version
    pub lineage: MigrationLineage,
    /// Pre-migration copy, present only when a migration ran
    pub backup: Option<BackupInfo>,
}

impl LoadedSnapshot {
    pub fn was_migrated(&self) -> bool {
        !self.lineage.is_noop()
    }
}

/// Position of a widget-state record inside a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLocation {
    pub workspace: usize,
    pub position: usize,
}

/// What happened to each widget-state record during restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Widgets whose state was applied
    pub restored: Vec<WidgetId>,
    /// Records whose id matches no live widget in the same workspace
    pub unmatched: Vec<WidgetId>,
    /// Records without a usable `widgetId`
    pub legacy: Vec<RecordLocation>,
    /// Widgets that faulted in restore or were not live
    pub failed: Vec<WidgetId>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.unmatched.is_empty() && self.legacy.is_empty() && self.failed.is_empty()
    }
}

/// State Snapshot Engine
pub struct SnapshotEngine {
    registry: MigrationRegistry,
    store: SnapshotStore,
    clock: Box<dyn Clock>,
}

impl SnapshotEngine {
    pub fn new(registry: MigrationRegistry, store: SnapshotStore, clock: Box<dyn Clock>) -> Self {
        Self {
            registry,
            store,
            clock,
        }
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Walks every workspace and produces a document
    ///
    /// Each widget record carries its id and kind. A faulted widget keeps an
    /// id-only record so its slot survives the round trip; a widget that
    /// faults while saving is reported to the manager. The caller's
    /// `application_state` entries are kept, with the current workspace and
    /// per-workspace focus owners added on top.
    pub fn capture(
        &self,
        manager: &mut WorkspaceManager,
        application_state: StateMap,
        user_data: StateMap,
    ) -> StateSnapshot {
        let mut snapshot = StateSnapshot::new(self.clock.now_millis());
        snapshot.application_state = application_state;
        snapshot.user_data = user_data;

        let mut newly_faulted = Vec::new();
        let mut focused_widgets = serde_json::Map::new();
        for index in 0..manager.workspace_count() {
            let Some(workspace) = manager.workspace_mut(index) else {
                continue;
            };
            if let Some(focused) = workspace.focused() {
                focused_widgets.insert(index.to_string(), json!(focused));
            }

            let mut widget_states = Vec::with_capacity(workspace.len());
            for id in workspace.widget_ids() {
                let Some(slot) = workspace.slot_mut(id) else {
                    continue;
                };
                let boundary = &mut slot.boundary;
                let was_faulted = boundary.is_faulted();
                let mut record = boundary.safe_save_state().unwrap_or_default();
                if !was_faulted && boundary.is_faulted() {
                    newly_faulted.push(id);
                }
                record.insert(WIDGET_ID_KEY.to_string(), json!(id));
                record.insert(WIDGET_TYPE_KEY.to_string(), json!(boundary.kind()));
                widget_states.push(record);
            }

            snapshot.workspaces.push(WorkspaceState {
                name: workspace.name().to_string(),
                index: workspace.index(),
                widget_states,
            });
        }

        for id in newly_faulted {
            manager.note_fault(id, LifecyclePhase::SaveState);
        }
        if let Some(current) = manager.current_index() {
            snapshot
                .application_state
                .insert(CURRENT_WORKSPACE_KEY.to_string(), json!(current));
        }
        snapshot
            .application_state
            .insert(FOCUSED_WIDGETS_KEY.to_string(), Value::Object(focused_widgets));

        tracing::debug!(
            workspaces = snapshot.workspaces.len(),
            widgets = snapshot.widget_count(),
            "captured snapshot"
        );
        snapshot
    }

    /// Serializes a snapshot the way it is written to disk
    pub fn to_json(snapshot: &StateSnapshot) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(snapshot)?)
    }

    /// Writes a snapshot atomically
    pub fn save(&self, snapshot: &StateSnapshot) -> Result<(), SnapshotError> {
        let raw = Self::to_json(snapshot)?;
        self.store.write_atomic(&raw)?;
        tracing::info!(path = %self.store.path().display(), "saved snapshot");
        Ok(())
    }

    /// Reads the snapshot file, migrating it when it is older than current
    ///
    /// Returns `Ok(None)` when no snapshot exists yet. A migrated document is
    /// backed up first and written back before this returns. Any migration
    /// failure aborts the load and leaves the file untouched.
    pub fn load(&self) -> Result<Option<LoadedSnapshot>, SnapshotError> {
        let Some(raw) = self.store.read_raw()? else {
            return Ok(None);
        };
        let document: Value = serde_json::from_str(&raw)?;
        if !document.is_object() {
            return Err(SnapshotError::InvalidDocument(
                "snapshot root is not an object".to_string(),
            ));
        }
        let version = document_version(&document)?;

        let path = self.registry.plan(version)?;
        if path.len() == 1 {
            let snapshot: StateSnapshot = serde_json::from_value(document)?;
            return Ok(Some(LoadedSnapshot {
                snapshot,
                lineage: MigrationLineage::new(version),
                backup: None,
            }));
        }

        let now = self.clock.now_millis();
        let backup = self.store.create_backup(&raw, version, now)?;
        let (migrated, lineage) = self.registry.migrate(document, version)?;
        let snapshot: StateSnapshot = serde_json::from_value(migrated)?;
        self.store.write_atomic(&Self::to_json(&snapshot)?)?;
        tracing::info!(
            from = %lineage.from_version,
            to = %lineage.to_version,
            backup = %backup.path.display(),
            "migrated snapshot"
        );

        Ok(Some(LoadedSnapshot {
            snapshot,
            lineage: lineage.with_timestamp(now),
            backup: Some(backup),
        }))
    }

    /// Applies widget-state records to live widgets
    ///
    /// A record is matched only by `widgetId`, and only against widgets in
    /// the workspace with the same index. Records without an id are legacy
    /// and skipped. Reserved keys are stripped before the widget sees the map.
    pub fn restore(&self, snapshot: &StateSnapshot, manager: &mut WorkspaceManager) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut faulted = Vec::new();

        for workspace_state in &snapshot.workspaces {
            for (position, record) in workspace_state.widget_states.iter().enumerate() {
                let Some(id) = widget_id_of(record) else {
                    tracing::warn!(
                        workspace = workspace_state.index,
                        position,
                        "skipping widget state without a widgetId"
                    );
                    report.legacy.push(RecordLocation {
                        workspace: workspace_state.index,
                        position,
                    });
                    continue;
                };

                let slot = manager
                    .workspace_mut(workspace_state.index)
                    .and_then(|ws| ws.slot_mut(id));
                let Some(slot) = slot else {
                    tracing::debug!(widget_id = %id, workspace = workspace_state.index, "no live widget for record");
                    report.unmatched.push(id);
                    continue;
                };

                let state: StateMap = record
                    .iter()
                    .filter(|(key, _)| !is_reserved_key(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                match slot.boundary.safe_restore_state(&state) {
                    LifecycleOutcome::Completed => report.restored.push(id),
                    LifecycleOutcome::Faulted => {
                        faulted.push(id);
                        report.failed.push(id);
                    }
                    LifecycleOutcome::Skipped => report.failed.push(id),
                }
            }
        }

        for id in faulted {
            manager.note_fault(id, LifecyclePhase::RestoreState);
        }
        report
    }
}

impl std::fmt::Debug for SnapshotEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotEngine")
            .field("registry", &self.registry)
            .field("store", &self.store)
            .finish()
    }
}

/// Reads `schemaVersion`; documents without one are the oldest format
fn document_version(document: &Value) -> Result<SchemaVersion, SnapshotError> {
    match document.get("schemaVersion") {
        None | Some(Value::Null) => Ok(LEGACY_SCHEMA_VERSION),
        Some(Value::String(raw)) => Ok(SchemaVersion::parse(raw)?),
        Some(other) => Err(SnapshotError::InvalidDocument(format!(
            "schemaVersion must be a string, found {}",
            other
        ))),
    }
}
