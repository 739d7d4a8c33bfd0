//! # Workspace Manager Service
//!
//! This crate owns the workspaces of the shell and the widgets inside them.
//!
//! ## Philosophy
//!
//! - **Exactly one current workspace**: switching deactivates the outgoing
//!   workspace before the incoming one is activated
//! - **No dangling focus**: a workspace's focus pointer is `None` or names a
//!   widget currently in that workspace
//! - **Faults stay local**: every widget runs behind its own fault boundary
//! - **Lifecycle is observable and auditable**
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A layout engine (no grid, dock, or stack arrangement)
//! - A focus transfer protocol (see `services_focus_manager`)
//! - A global singleton

pub mod workspace;

pub use workspace::{RemovedWidget, WidgetSlot, Workspace};

use core_types::{WidgetId, WidgetIdAllocator};
use lifecycle::{LifecyclePhase, Widget};
use serde::{Deserialize, Serialize};
use services_fault_boundary::{FaultBoundary, LifecycleOutcome};
use thiserror::Error;

/// Workspace lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceEvent {
    /// Workspace was created
    WorkspaceCreated {
        workspace: usize,
        name: String,
        timestamp: u64,
    },
    /// Current workspace changed
    Switched {
        from: Option<usize>,
        to: usize,
        timestamp: u64,
    },
    /// Widget was added and initialized
    WidgetAdded {
        workspace: usize,
        widget_id: WidgetId,
        timestamp: u64,
    },
    /// Widget was disposed and removed
    WidgetRemoved {
        workspace: usize,
        widget_id: WidgetId,
        was_focused: bool,
        timestamp: u64,
    },
    /// A lifecycle call failed and the widget is now faulted
    WidgetFaulted {
        workspace: usize,
        widget_id: WidgetId,
        phase: Option<LifecyclePhase>,
        timestamp: u64,
    },
    /// Manual recovery was attempted
    WidgetRecovered {
        workspace: usize,
        widget_id: WidgetId,
        succeeded: bool,
        timestamp: u64,
    },
}

/// Workspace manager errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("Widget not found: {0}")]
    WidgetNotFound(WidgetId),

    #[error("Widget already present: {0}")]
    DuplicateWidget(WidgetId),

    #[error("Widget not focusable: {0}")]
    NotFocusable(WidgetId),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(usize),

    #[error("No current workspace")]
    NoCurrentWorkspace,
}

/// Result of a workspace switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub from: Option<usize>,
    pub to: usize,
    /// Widgets that faulted while the incoming workspace was activated
    pub faulted: Vec<WidgetId>,
}

/// Workspace Manager
///
/// Owns all workspaces, the widget id allocator, and the audit trail.
pub struct WorkspaceManager {
    workspaces: Vec<Workspace>,
    current: Option<usize>,
    ids: WidgetIdAllocator,
    audit_trail: Vec<WorkspaceEvent>,
    next_timestamp: u64,
}

impl WorkspaceManager {
    /// Creates a manager with no workspaces
    pub fn new() -> Self {
        Self {
            workspaces: Vec::new(),
            current: None,
            ids: WidgetIdAllocator::new(),
            audit_trail: Vec::new(),
            next_timestamp: 0,
        }
    }

    /// Creates a workspace and returns its index
    ///
    /// The first workspace becomes current and is activated.
    pub fn create_workspace(&mut self, name: impl Into<String>) -> usize {
        let index = self.workspaces.len();
        let name = name.into();
        let timestamp = self.next_timestamp();
        self.audit_trail.push(WorkspaceEvent::WorkspaceCreated {
            workspace: index,
            name: name.clone(),
            timestamp,
        });
        self.workspaces.push(Workspace::new(index, name));

        if self.current.is_none() {
            self.current = Some(index);
            self.workspaces[index].activate();
            let timestamp = self.next_timestamp();
            self.audit_trail.push(WorkspaceEvent::Switched {
                from: None,
                to: index,
                timestamp,
            });
        }
        index
    }

    /// Renames a workspace; names are labels, never identities
    pub fn rename_workspace(&mut self, index: usize, name: impl Into<String>) -> Result<(), WorkspaceError> {
        self.workspace_mut(index)
            .ok_or(WorkspaceError::WorkspaceNotFound(index))?
            .rename(name);
        Ok(())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Workspace> {
        self.current.and_then(|i| self.workspaces.get(i))
    }

    pub fn current_mut(&mut self) -> Option<&mut Workspace> {
        match self.current {
            Some(i) => self.workspaces.get_mut(i),
            None => None,
        }
    }

    pub fn workspace(&self, index: usize) -> Option<&Workspace> {
        self.workspaces.get(index)
    }

    pub fn workspace_mut(&mut self, index: usize) -> Option<&mut Workspace> {
        self.workspaces.get_mut(index)
    }

    pub fn workspaces(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.iter()
    }

    pub fn workspace_count(&self) -> usize {
        self.workspaces.len()
    }

    /// Makes another workspace current
    ///
    /// The outgoing workspace is fully deactivated before the incoming one
    /// is activated. Switching to the current workspace is a no-op.
    pub fn switch_to(&mut self, index: usize) -> Result<SwitchOutcome, WorkspaceError> {
        if index >= self.workspaces.len() {
            return Err(WorkspaceError::WorkspaceNotFound(index));
        }
        let from = self.current;
        if from == Some(index) {
            return Ok(SwitchOutcome {
                from,
                to: index,
                faulted: Vec::new(),
            });
        }

        let mut faulted = Vec::new();
        if let Some(old) = from {
            let outcomes = self.workspaces[old].deactivate();
            self.note_faults(old, &outcomes, LifecyclePhase::Deactivate);
        }
        let outcomes = self.workspaces[index].activate();
        faulted.extend(self.note_faults(index, &outcomes, LifecyclePhase::Activate));
        self.current = Some(index);

        let timestamp = self.next_timestamp();
        self.audit_trail.push(WorkspaceEvent::Switched {
            from,
            to: index,
            timestamp,
        });
        tracing::info!(from = ?from, to = index, "switched workspace");

        Ok(SwitchOutcome {
            from,
            to: index,
            faulted,
        })
    }

    /// Allocates a fresh widget identifier
    pub fn allocate_widget_id(&mut self) -> WidgetId {
        self.ids.allocate()
    }

    /// Marks a restored identifier as used so it is never allocated again
    pub fn reserve_widget_id(&mut self, id: WidgetId) {
        self.ids.reserve(id);
    }

    /// Adds a widget to a workspace
    ///
    /// Identifiers are unique across all workspaces. A widget that fails to
    /// initialize is still added, faulted.
    pub fn add_widget(&mut self, index: usize, widget: Box<dyn Widget>) -> Result<WidgetId, WorkspaceError> {
        let id = widget.id();
        if self.find_widget(id).is_some() {
            return Err(WorkspaceError::DuplicateWidget(id));
        }
        let workspace = self
            .workspaces
            .get_mut(index)
            .ok_or(WorkspaceError::WorkspaceNotFound(index))?;
        let (id, outcome) = workspace.add_widget(widget)?;
        self.ids.reserve(id);

        let timestamp = self.next_timestamp();
        self.audit_trail.push(WorkspaceEvent::WidgetAdded {
            workspace: index,
            widget_id: id,
            timestamp,
        });
        self.note_faults(index, &[(id, outcome)], LifecyclePhase::Initialize);
        Ok(id)
    }

    /// Disposes and removes a widget from whichever workspace holds it
    pub fn remove_widget(&mut self, id: WidgetId) -> Result<(usize, RemovedWidget), WorkspaceError> {
        let index = self.find_widget(id).ok_or(WorkspaceError::WidgetNotFound(id))?;
        let removed = self.workspaces[index].remove_widget(id)?;

        let timestamp = self.next_timestamp();
        self.audit_trail.push(WorkspaceEvent::WidgetRemoved {
            workspace: index,
            widget_id: id,
            was_focused: removed.was_focused,
            timestamp,
        });
        Ok((index, removed))
    }

    /// Re-runs initialization of a faulted widget
    pub fn recover_widget(&mut self, id: WidgetId) -> Result<LifecycleOutcome, WorkspaceError> {
        let index = self.find_widget(id).ok_or(WorkspaceError::WidgetNotFound(id))?;
        let outcome = self.workspaces[index].recover_widget(id)?;

        let timestamp = self.next_timestamp();
        self.audit_trail.push(WorkspaceEvent::WidgetRecovered {
            workspace: index,
            widget_id: id,
            succeeded: outcome.is_completed(),
            timestamp,
        });
        Ok(outcome)
    }

    /// Index of the workspace holding a widget
    pub fn find_widget(&self, id: WidgetId) -> Option<usize> {
        self.workspaces.iter().position(|ws| ws.contains(id))
    }

    pub fn boundary(&self, id: WidgetId) -> Option<&FaultBoundary> {
        self.workspaces
            .iter()
            .find_map(|ws| ws.slot(id))
            .map(|slot| &slot.boundary)
    }

    pub fn boundary_mut(&mut self, id: WidgetId) -> Option<&mut FaultBoundary> {
        self.workspaces
            .iter_mut()
            .find_map(|ws| ws.slot_mut(id))
            .map(|slot| &mut slot.boundary)
    }

    /// Checks if a widget may be acted on by a focus continuation
    ///
    /// Valid means: present, not disposed or faulted, and in the current
    /// workspace.
    pub fn is_target_valid(&self, id: WidgetId) -> bool {
        self.current()
            .map(|ws| ws.can_focus(id))
            .unwrap_or(false)
    }

    /// Records faults reported by an external caller (e.g. save or restore)
    pub fn note_fault(&mut self, id: WidgetId, phase: LifecyclePhase) {
        if let Some(index) = self.find_widget(id) {
            self.note_faults(index, &[(id, LifecycleOutcome::Faulted)], phase);
            self.workspaces[index].drop_unfocusable_owner();
        }
    }

    /// Disposes every widget exactly once
    pub fn dispose_all(&mut self) -> Vec<FaultBoundary> {
        let mut disposed = Vec::new();
        for index in 0..self.workspaces.len() {
            let boundaries = self.workspaces[index].dispose_all();
            for boundary in &boundaries {
                let timestamp = self.next_timestamp();
                self.audit_trail.push(WorkspaceEvent::WidgetRemoved {
                    workspace: index,
                    widget_id: boundary.id(),
                    was_focused: false,
                    timestamp,
                });
            }
            disposed.extend(boundaries);
        }
        disposed
    }

    /// Returns the audit trail
    pub fn audit_trail(&self) -> &[WorkspaceEvent] {
        &self.audit_trail
    }

    fn note_faults(
        &mut self,
        workspace: usize,
        outcomes: &[(WidgetId, LifecycleOutcome)],
        phase: LifecyclePhase,
    ) -> Vec<WidgetId> {
        let faulted: Vec<WidgetId> = outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == LifecycleOutcome::Faulted)
            .map(|(id, _)| *id)
            .collect();
        for id in &faulted {
            let recorded = self
                .workspaces
                .get(workspace)
                .and_then(|ws| ws.slot(*id))
                .and_then(|slot| slot.boundary.last_fault())
                .map(|fault| fault.phase)
                .or(Some(phase));
            let timestamp = self.next_timestamp();
            self.audit_trail.push(WorkspaceEvent::WidgetFaulted {
                workspace,
                widget_id: *id,
                phase: recorded,
                timestamp,
            });
        }
        faulted
    }

    fn next_timestamp(&mut self) -> u64 {
        let ts = self.next_timestamp;
        self.next_timestamp += 1;
        ts
    }
}

impl Default for WorkspaceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle::{LifecycleState, WidgetError};
    use std::cell::RefCell;
    use std::rc::Rc;

    type CallLog = Rc<RefCell<Vec<String>>>;

    struct Logged {
        id: WidgetId,
        log: CallLog,
    }

    impl Widget for Logged {
        fn id(&self) -> WidgetId {
            self.id
        }
        fn name(&self) -> &str {
            "logged"
        }
        fn initialize(&mut self) -> Result<(), WidgetError> {
            Ok(())
        }
        fn activate(&mut self) -> Result<(), WidgetError> {
            self.log.borrow_mut().push(format!("activate {}", self.id.as_u64()));
            Ok(())
        }
        fn deactivate(&mut self) -> Result<(), WidgetError> {
            self.log.borrow_mut().push(format!("deactivate {}", self.id.as_u64()));
            Ok(())
        }
    }

    fn logged(manager: &mut WorkspaceManager, log: &CallLog) -> Box<dyn Widget> {
        Box::new(Logged {
            id: manager.allocate_widget_id(),
            log: log.clone(),
        })
    }

    #[test]
    fn test_first_workspace_is_current() {
        let mut manager = WorkspaceManager::new();
        assert_eq!(manager.current_index(), None);

        let first = manager.create_workspace("main");
        let second = manager.create_workspace("side");
        assert_eq!(manager.current_index(), Some(first));
        assert!(manager.workspace(first).unwrap().is_active());
        assert!(!manager.workspace(second).unwrap().is_active());
    }

    #[test]
    fn test_switch_deactivates_before_activating() {
        let log: CallLog = Rc::default();
        let mut manager = WorkspaceManager::new();
        let main = manager.create_workspace("main");
        let side = manager.create_workspace("side");
        let a = logged(&mut manager, &log);
        let a = manager.add_widget(main, a).unwrap();
        let b = logged(&mut manager, &log);
        let b = manager.add_widget(side, b).unwrap();
        log.borrow_mut().clear();

        let outcome = manager.switch_to(side).unwrap();
        assert_eq!(outcome.from, Some(main));
        assert!(outcome.faulted.is_empty());
        assert_eq!(
            *log.borrow(),
            vec![
                format!("deactivate {}", a.as_u64()),
                format!("activate {}", b.as_u64())
            ]
        );
        assert_eq!(manager.current_index(), Some(side));
    }

    #[test]
    fn test_switch_to_unknown_workspace() {
        let mut manager = WorkspaceManager::new();
        manager.create_workspace("main");
        assert_eq!(manager.switch_to(4), Err(WorkspaceError::WorkspaceNotFound(4)));
    }

    #[test]
    fn test_ids_unique_across_workspaces() {
        let log: CallLog = Rc::default();
        let mut manager = WorkspaceManager::new();
        let main = manager.create_workspace("main");
        let side = manager.create_workspace("side");
        let widget = logged(&mut manager, &log);
        let id = manager.add_widget(main, widget).unwrap();

        let twin = Box::new(Logged { id, log: log.clone() });
        assert_eq!(manager.add_widget(side, twin), Err(WorkspaceError::DuplicateWidget(id)));
    }

    #[test]
    fn test_reserved_ids_not_reallocated() {
        let mut manager = WorkspaceManager::new();
        manager.reserve_widget_id(WidgetId::from_raw(40));
        assert_eq!(manager.allocate_widget_id(), WidgetId::from_raw(41));
    }

    #[test]
    fn test_target_validity_follows_current_workspace() {
        let log: CallLog = Rc::default();
        let mut manager = WorkspaceManager::new();
        let main = manager.create_workspace("main");
        let side = manager.create_workspace("side");
        let widget = logged(&mut manager, &log);
        let id = manager.add_widget(main, widget).unwrap();

        assert!(manager.is_target_valid(id));
        manager.switch_to(side).unwrap();
        assert!(!manager.is_target_valid(id));
        manager.switch_to(main).unwrap();
        manager.remove_widget(id).unwrap();
        assert!(!manager.is_target_valid(id));
    }

    #[test]
    fn test_audit_trail_records_lifecycle() {
        let log: CallLog = Rc::default();
        let mut manager = WorkspaceManager::new();
        let main = manager.create_workspace("main");
        let widget = logged(&mut manager, &log);
        let id = manager.add_widget(main, widget).unwrap();
        manager.remove_widget(id).unwrap();

        let trail = manager.audit_trail();
        assert!(matches!(trail[0], WorkspaceEvent::WorkspaceCreated { workspace: 0, .. }));
        assert!(matches!(trail[1], WorkspaceEvent::Switched { from: None, to: 0, .. }));
        assert!(matches!(trail[2], WorkspaceEvent::WidgetAdded { .. }));
        assert!(matches!(trail[3], WorkspaceEvent::WidgetRemoved { was_focused: false, .. }));
    }

    #[test]
    fn test_dispose_all_disposes_once() {
        let log: CallLog = Rc::default();
        let mut manager = WorkspaceManager::new();
        let main = manager.create_workspace("main");
        let side = manager.create_workspace("side");
        for index in [main, side] {
            let widget = logged(&mut manager, &log);
            manager.add_widget(index, widget).unwrap();
        }

        let disposed = manager.dispose_all();
        assert_eq!(disposed.len(), 2);
        assert!(disposed.iter().all(|b| b.state() == LifecycleState::Disposed));
        assert!(manager.dispose_all().is_empty());
    }
}
