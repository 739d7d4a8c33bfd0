//! # Shell
//!
//! This crate is the composition root: it owns every service, wires them
//! together, and drives the cooperative event loop.
//!
//! ## Philosophy
//!
//! - **One owner**: services are constructed here and passed down by
//!   reference; nothing is global
//! - **Load once, before anything is shown**: startup restores widgets, state,
//!   and focus history before the first focus transfer
//! - **Shutdown never hangs**: the final save runs off the event loop with a
//!   bounded wait
//!
//! ## Responsibilities
//!
//! The shell:
//! - Creates workspaces and attaches widgets to the visual tree
//! - Routes focus requests and focus events to the coordinator and recorder
//! - Captures, saves, and restores snapshots
//!
//! ## Non-Responsibilities
//!
//! The shell does NOT:
//! - Lay out or render anything
//! - Match persisted state by display name

pub mod config;
pub mod error;
pub mod factory;
pub mod host;
pub mod telemetry;

pub use config::ShellConfig;
pub use error::ShellError;
pub use factory::{WidgetFactory, WidgetFactoryRegistry};
pub use host::ShellCore;

use core_types::{
    widget_id_of, widget_type_of, Clock, ContainerId, ElementId, MigrationLineage, StateMap,
    WidgetId,
};
use lifecycle::Widget;
use serde_json::Value;
use services_dispatcher::Dispatcher;
use services_fault_boundary::LifecycleOutcome;
use services_focus_history::FocusHistoryRecorder;
use services_focus_manager::FocusCoordinator;
use services_snapshot::{
    BackupInfo, LoadedSnapshot, MigrationRegistry, RestoreReport, SnapshotEngine, SnapshotError,
    SnapshotStore, StateSnapshot, CURRENT_WORKSPACE_KEY, FOCUSED_WIDGETS_KEY, FOCUS_HISTORY_KEY,
};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use view_types::VisualTree;

/// Name of the workspace created when there is nothing to load
pub const DEFAULT_WORKSPACE_NAME: &str = "main";

const MAX_TICKS_PER_ROUND: usize = 1024;
const MAX_PUMP_ROUNDS: usize = 32;

/// What startup found and did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupReport {
    /// A snapshot file existed and was read
    pub loaded: bool,
    pub lineage: Option<MigrationLineage>,
    /// Pre-migration backup, if the snapshot was migrated
    pub backup: Option<BackupInfo>,
    /// Widgets re-created from their persisted kind
    pub materialised: Vec<WidgetId>,
    /// Persisted widgets whose kind has no registered factory
    pub missing_factory: Vec<WidgetId>,
    pub restore: RestoreReport,
}

/// Outcome of the shutdown save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReport {
    Saved,
    /// The save was still running when the wait ended
    TimedOut { waited: Duration },
    Failed { error: String },
}

/// Destination of the shutdown save, written from a background thread
pub trait SnapshotSink: Send + 'static {
    fn write_snapshot(&self, raw: &str) -> Result<(), SnapshotError>;
}

impl SnapshotSink for SnapshotStore {
    fn write_snapshot(&self, raw: &str) -> Result<(), SnapshotError> {
        self.write_atomic(raw)
    }
}

/// The shell
pub struct Shell<T: VisualTree + 'static> {
    core: ShellCore<T>,
    dispatcher: Dispatcher<ShellCore<T>>,
    engine: SnapshotEngine,
    factories: WidgetFactoryRegistry,
    config: ShellConfig,
    user_data: StateMap,
    started: bool,
    shut_down: bool,
}

impl<T: VisualTree + 'static> Shell<T> {
    /// Creates a shell; nothing is loaded until [`Shell::startup`]
    pub fn new(config: ShellConfig, tree: T, clock: Box<dyn Clock>) -> Self {
        let store = SnapshotStore::new(config.snapshot_path.clone())
            .with_backup_dir(config.backup_dir.clone())
            .with_max_backups(config.max_backups);
        let engine = SnapshotEngine::new(MigrationRegistry::builtin(), store, clock);
        let history = FocusHistoryRecorder::with_session_limit(config.session_history_limit);

        Self {
            core: ShellCore::new(tree, history),
            dispatcher: Dispatcher::with_history_limit(config.dispatcher_history_limit),
            engine,
            factories: WidgetFactoryRegistry::new(),
            config,
            user_data: StateMap::new(),
            started: false,
            shut_down: false,
        }
    }

    /// Registers how to re-create widgets of a kind at startup
    pub fn register_factory<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(WidgetId) -> Box<dyn Widget> + 'static,
    {
        self.factories.register(kind, factory);
    }

    /// Loads the snapshot and brings the shell to its persisted state
    ///
    /// Order: load (migrating if needed), re-create missing widgets, restore
    /// widget state, reinstate focus owners and focus history, then activate
    /// the persisted workspace and restore its focus. A migration failure
    /// aborts startup; the pre-migration backup is left on disk.
    pub fn startup(&mut self) -> Result<StartupReport, ShellError> {
        if self.started {
            return Err(ShellError::AlreadyStarted);
        }
        self.started = true;

        let mut report = StartupReport::default();
        let Some(loaded) = self.engine.load()? else {
            if self.core.workspaces.workspace_count() == 0 {
                self.core.workspaces.create_workspace(DEFAULT_WORKSPACE_NAME);
            }
            tracing::info!("no snapshot found; starting fresh");
            return Ok(report);
        };
        let LoadedSnapshot {
            snapshot,
            lineage,
            backup,
        } = loaded;
        report.loaded = true;
        report.lineage = Some(lineage);
        report.backup = backup;

        let mut states: Vec<_> = snapshot.workspaces.iter().collect();
        states.sort_by_key(|ws| ws.index);
        for state in states {
            self.ensure_workspace(state.index, &state.name)?;
            for record in &state.widget_states {
                let (Some(id), Some(kind)) = (widget_id_of(record), widget_type_of(record)) else {
                    continue;
                };
                if self.core.workspaces.find_widget(id).is_some() {
                    continue;
                }
                let Some(widget) = self.factories.create(kind, id) else {
                    tracing::warn!(widget_id = %id, kind, "no factory for persisted widget");
                    report.missing_factory.push(id);
                    continue;
                };
                self.core.workspaces.reserve_widget_id(id);
                self.insert_widget(state.index, widget)?;
                report.materialised.push(id);
            }
        }
        if self.core.workspaces.workspace_count() == 0 {
            self.core.workspaces.create_workspace(DEFAULT_WORKSPACE_NAME);
        }

        report.restore = self.engine.restore(&snapshot, &mut self.core.workspaces);
        self.restore_focus_owners(&snapshot.application_state);
        if let Some(value) = snapshot.application_state.get(FOCUS_HISTORY_KEY) {
            match self.core.history.import_value(value) {
                Ok(count) => tracing::debug!(count, "imported focus history"),
                Err(err) => tracing::warn!(error = %err, "ignoring unreadable focus history"),
            }
        }
        self.core.history.clear_session();
        self.user_data = snapshot.user_data;

        let persisted_current = snapshot
            .application_state
            .get(CURRENT_WORKSPACE_KEY)
            .and_then(Value::as_u64)
            .and_then(|raw| usize::try_from(raw).ok())
            .filter(|index| self.core.workspaces.workspace(*index).is_some());
        match (persisted_current, self.core.workspaces.current_index()) {
            (Some(target), Some(current)) if target != current => {
                FocusCoordinator::switch_workspace(&mut self.core, &mut self.dispatcher, target)?;
            }
            (_, Some(current)) => {
                FocusCoordinator::restore_focus(&mut self.core, &mut self.dispatcher, current)?;
            }
            _ => {}
        }

        tracing::info!(
            widgets = report.materialised.len(),
            restored = report.restore.restored.len(),
            "shell started"
        );
        Ok(report)
    }

    pub fn create_workspace(&mut self, name: impl Into<String>) -> usize {
        self.core.workspaces.create_workspace(name)
    }

    /// Adds a widget built with a freshly allocated id and attaches it
    pub fn add_widget<F>(&mut self, workspace: usize, build: F) -> Result<WidgetId, ShellError>
    where
        F: FnOnce(WidgetId) -> Box<dyn Widget>,
    {
        if self.shut_down {
            return Err(ShellError::ShutDown);
        }
        let id = self.core.workspaces.allocate_widget_id();
        self.insert_widget(workspace, build(id))
    }

    /// Disposes and removes a widget, then detaches it
    ///
    /// Waiting focus transfers and focus history for the widget are dropped.
    /// If it owned focus, focus moves to its nearest neighbour; returns that
    /// neighbour.
    pub fn remove_widget(&mut self, id: WidgetId) -> Result<Option<WidgetId>, ShellError> {
        self.core.coordinator.discard_widget(id);
        let (index, removed) = self.core.workspaces.remove_widget(id)?;
        self.core.history.forget_widget(id);
        if let Some(handle) = removed.attach {
            self.core.tree.detach(handle);
        }

        let Some(successor) = removed.successor.filter(|_| removed.was_focused) else {
            return Ok(None);
        };
        if self.core.workspaces.current_index() == Some(index) {
            if let Err(err) =
                FocusCoordinator::request_focus(&mut self.core, &mut self.dispatcher, successor)
            {
                tracing::warn!(widget_id = %successor, error = %err, "could not move focus to neighbour");
                return Ok(None);
            }
        } else if let Some(ws) = self.core.workspaces.workspace_mut(index) {
            ws.set_focus_owner(Some(successor))?;
        }
        Ok(Some(successor))
    }

    pub fn focus_widget(&mut self, id: WidgetId) -> Result<(), ShellError> {
        FocusCoordinator::request_focus(&mut self.core, &mut self.dispatcher, id)?;
        Ok(())
    }

    pub fn focus_next(&mut self) -> Result<Option<WidgetId>, ShellError> {
        Ok(FocusCoordinator::focus_next(&mut self.core, &mut self.dispatcher)?)
    }

    pub fn focus_previous(&mut self) -> Result<Option<WidgetId>, ShellError> {
        Ok(FocusCoordinator::focus_previous(&mut self.core, &mut self.dispatcher)?)
    }

    /// Switches workspace and restores focus there
    ///
    /// With save-on-switch enabled a snapshot is written afterwards; a failed
    /// save is logged and does not undo the switch.
    pub fn switch_workspace(&mut self, index: usize) -> Result<Option<WidgetId>, ShellError> {
        let target = FocusCoordinator::switch_workspace(&mut self.core, &mut self.dispatcher, index)?;
        if self.config.save_on_switch {
            if let Err(err) = self.save() {
                tracing::warn!(error = %err, "save on workspace switch failed");
            }
        }
        Ok(target)
    }

    /// Manual recovery of a faulted widget
    pub fn recover_widget(&mut self, id: WidgetId) -> Result<LifecycleOutcome, ShellError> {
        Ok(self.core.workspaces.recover_widget(id)?)
    }

    /// Handles a focus-gain event reported by the visual tree
    ///
    /// The element is recorded in every enclosing container. When the user
    /// moved focus into a different widget of the current workspace, the
    /// owner pointer follows through a normal transfer.
    pub fn notify_element_focused(&mut self, element: ElementId) -> Result<(), ShellError> {
        let Some(widget) = element.widget else {
            if let Some(index) = self.core.workspaces.current_index() {
                self.core
                    .history
                    .record_along_path(&element, &[ContainerId::Workspace(index)]);
            }
            return Ok(());
        };
        let Some(index) = self.core.workspaces.find_widget(widget) else {
            tracing::debug!(element = %element, "focus event for unknown widget");
            return Ok(());
        };

        self.core.history.record_along_path(
            &element,
            &[ContainerId::Workspace(index), ContainerId::Widget(widget)],
        );

        let follow = self.core.workspaces.current_index() == Some(index)
            && self
                .core
                .workspaces
                .workspace(index)
                .map(|ws| ws.focused() != Some(widget) && ws.can_focus(widget))
                .unwrap_or(false);
        if follow {
            FocusCoordinator::request_focus(&mut self.core, &mut self.dispatcher, widget)?;
        }
        Ok(())
    }

    /// Feeds attachment completions and focus events into the services
    ///
    /// Returns how many signals were handled.
    pub fn pump(&mut self) -> usize {
        let scheduled = FocusCoordinator::drain_attached(&mut self.core, &mut self.dispatcher);
        let events = self.core.tree.drain_focus_events();
        let handled = events.len();
        for element in events {
            if let Err(err) = self.notify_element_focused(element) {
                tracing::debug!(error = %err, "focus event not applied");
            }
        }
        scheduled + handled
    }

    /// Pumps and runs scheduled work until nothing is left
    ///
    /// Returns the number of operations run.
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            self.pump();
            if self.dispatcher.is_idle() {
                break;
            }
            ran += self
                .dispatcher
                .run_until_idle(&mut self.core, MAX_TICKS_PER_ROUND);
        }
        ran
    }

    /// Captures the current state, including focus history
    pub fn capture(&mut self) -> StateSnapshot {
        let mut application_state = StateMap::new();
        match self.core.history.export_value() {
            Ok(history) => {
                application_state.insert(FOCUS_HISTORY_KEY.to_string(), history);
            }
            Err(err) => {
                tracing::warn!(error = %err, "focus history not exported; snapshot saved without it");
            }
        }
        self.engine.capture(
            &mut self.core.workspaces,
            application_state,
            self.user_data.clone(),
        )
    }

    /// Captures and writes a snapshot
    pub fn save(&mut self) -> Result<StateSnapshot, ShellError> {
        let snapshot = self.capture();
        self.engine.save(&snapshot)?;
        Ok(snapshot)
    }

    /// Saves to the configured snapshot file and disposes every widget
    pub fn shutdown(&mut self) -> Result<ShutdownReport, ShellError> {
        let sink = self.engine.store().clone();
        self.shutdown_with(sink)
    }

    /// Shutdown with a custom save destination
    ///
    /// Capture runs here; the write runs on its own thread and is waited for
    /// at most the configured timeout. Every widget is disposed exactly once
    /// whatever the save outcome.
    pub fn shutdown_with<S: SnapshotSink>(&mut self, sink: S) -> Result<ShutdownReport, ShellError> {
        if self.shut_down {
            return Err(ShellError::ShutDown);
        }
        self.shut_down = true;

        let snapshot = self.capture();
        let report = match SnapshotEngine::to_json(&snapshot) {
            Ok(raw) => self.write_bounded(sink, raw),
            Err(err) => ShutdownReport::Failed {
                error: err.to_string(),
            },
        };

        let handles: Vec<_> = self
            .core
            .workspaces
            .workspaces()
            .flat_map(|ws| ws.slots().filter_map(|slot| slot.attach))
            .collect();
        let disposed = self.core.workspaces.dispose_all();
        for boundary in &disposed {
            self.core.coordinator.discard_widget(boundary.id());
        }
        for handle in handles {
            self.core.tree.detach(handle);
        }
        tracing::info!(disposed = disposed.len(), "shell shut down");
        Ok(report)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn core(&self) -> &ShellCore<T> {
        &self.core
    }

    pub fn tree(&self) -> &T {
        &self.core.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.core.tree
    }

    pub fn workspaces(&self) -> &services_workspace_manager::WorkspaceManager {
        &self.core.workspaces
    }

    pub fn history(&self) -> &FocusHistoryRecorder {
        &self.core.history
    }

    pub fn dispatcher(&self) -> &Dispatcher<ShellCore<T>> {
        &self.dispatcher
    }

    pub fn engine(&self) -> &SnapshotEngine {
        &self.engine
    }

    pub fn user_data(&self) -> &StateMap {
        &self.user_data
    }

    pub fn user_data_mut(&mut self) -> &mut StateMap {
        &mut self.user_data
    }

    /// Focus owner of the current workspace
    pub fn focused(&self) -> Option<WidgetId> {
        self.core.workspaces.current().and_then(|ws| ws.focused())
    }

    fn insert_widget(&mut self, workspace: usize, widget: Box<dyn Widget>) -> Result<WidgetId, ShellError> {
        let id = self.core.workspaces.add_widget(workspace, widget)?;
        let handle = self.core.tree.attach(id, ContainerId::Workspace(workspace));
        self.core
            .workspaces
            .workspace_mut(workspace)
            .ok_or(services_workspace_manager::WorkspaceError::WorkspaceNotFound(workspace))?
            .set_attach_handle(id, handle)?;
        Ok(id)
    }

    /// Creates workspaces up to `index` and applies the persisted name
    fn ensure_workspace(&mut self, index: usize, name: &str) -> Result<(), ShellError> {
        while self.core.workspaces.workspace_count() <= index {
            let count = self.core.workspaces.workspace_count();
            if count == index {
                self.core.workspaces.create_workspace(name);
            } else {
                self.core.workspaces.create_workspace(format!("workspace-{}", count));
            }
        }
        let current_name = self.core.workspaces.workspace(index).map(|ws| ws.name().to_string());
        if current_name.as_deref() != Some(name) {
            self.core.workspaces.rename_workspace(index, name)?;
        }
        Ok(())
    }

    /// Puts back each workspace's focus pointer where the widget can still take it
    fn restore_focus_owners(&mut self, application_state: &StateMap) {
        let Some(Value::Object(owners)) = application_state.get(FOCUSED_WIDGETS_KEY) else {
            return;
        };
        for (key, value) in owners {
            let (Ok(index), Some(raw)) = (key.parse::<usize>(), value.as_u64()) else {
                continue;
            };
            let id = WidgetId::from_raw(raw);
            let Some(ws) = self.core.workspaces.workspace_mut(index) else {
                continue;
            };
            if ws.can_focus(id) {
                if let Err(err) = ws.set_focus_owner(Some(id)) {
                    tracing::debug!(widget_id = %id, error = %err, "focus owner not restored");
                }
            }
        }
    }
}

impl<T: VisualTree + 'static> std::fmt::Debug for Shell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("config", &self.config)
            .field("workspaces", &self.core.workspaces.workspace_count())
            .field("pending", &self.dispatcher.pending_count())
            .field("started", &self.started)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

impl ShutdownReport {
    pub fn is_saved(&self) -> bool {
        matches!(self, ShutdownReport::Saved)
    }
}

impl<T: VisualTree + 'static> Shell<T> {
    fn write_bounded<S: SnapshotSink>(&self, sink: S, raw: String) -> ShutdownReport {
        let timeout = self.config.shutdown_save_timeout;
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("snapshot-save".to_string())
            .spawn(move || {
                let _ = tx.send(sink.write_snapshot(&raw));
            });
        if let Err(err) = spawned {
            return ShutdownReport::Failed {
                error: err.to_string(),
            };
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(())) => {
                tracing::info!("shutdown snapshot saved");
                ShutdownReport::Saved
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "shutdown snapshot save failed");
                ShutdownReport::Failed {
                    error: err.to_string(),
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "shutdown save still running; latest state may not be on disk"
                );
                ShutdownReport::TimedOut { waited: timeout }
            }
            Err(RecvTimeoutError::Disconnected) => ShutdownReport::Failed {
                error: "save thread exited without reporting".to_string(),
            },
        }
    }
}
