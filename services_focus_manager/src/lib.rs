//! # Focus Manager Service
//!
//! This crate implements the focus transfer protocol between workspaces,
//! widgets, and the visual tree.
//!
//! ## Philosophy
//!
//! - **Deactivate first, synchronously**: the old owner's "active" flag is
//!   cleared before any deferred work is scheduled
//! - **Pointer before scheduling**: readers of "who is focused" never see a
//!   stale answer
//! - **One scheduled unit per transfer**: the visual flag and the input focus
//!   request change together in a single continuation
//! - **Re-validate, never cancel**: every continuation checks its target right
//!   before acting and abandons quietly if it is gone
//! - **Auditable**: All focus changes are logged for audit
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A window manager (no Z-order, no geometry)
//! - X11 focus model (no focus follows mouse)
//! - A global focus singleton

use core_types::{ContainerId, WidgetId};
use serde::{Deserialize, Serialize};
use services_dispatcher::{DispatchPriority, Dispatcher, OperationOutcome};
use services_focus_history::{FocusHistoryRecorder, RestoreOutcome};
use services_workspace_manager::{Workspace, WorkspaceError, WorkspaceManager};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use thiserror::Error;
use view_types::{AttachHandle, VisualTree};

/// Tier of the combined "set active flag + request input focus" step
pub const APPLY_PRIORITY: DispatchPriority = DispatchPriority::Input;

/// Tier of the verification step
pub const VERIFY_PRIORITY: DispatchPriority = DispatchPriority::Background;

/// Focus manager error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FocusError {
    #[error("No current workspace")]
    NoCurrentWorkspace,

    #[error("Widget not found: {0}")]
    TargetNotFound(WidgetId),

    #[error("Widget {0} is not in the current workspace")]
    NotInCurrentWorkspace(WidgetId),

    #[error("Widget {0} cannot receive focus")]
    NotFocusable(WidgetId),

    #[error("Widget {0} was never attached to the visual tree")]
    NotAttached(WidgetId),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// Focus event for audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusEvent {
    /// The old owner's "active" flag was cleared
    ActiveCleared {
        widget_id: WidgetId,
        workspace: usize,
        timestamp: u64,
    },
    /// The workspace's focus owner pointer changed
    OwnerChanged {
        workspace: usize,
        from: Option<WidgetId>,
        to: Option<WidgetId>,
        timestamp: u64,
    },
    /// The apply step waits for the widget to finish attaching
    DeferredUntilAttached {
        widget_id: WidgetId,
        timestamp: u64,
    },
    /// The new owner's "active" flag was set and input focus requested
    Activated {
        widget_id: WidgetId,
        input_focus: bool,
        timestamp: u64,
    },
    /// Input focus was confirmed inside the owner
    Verified {
        widget_id: WidgetId,
        timestamp: u64,
    },
    /// Input focus was missing; one direct retry was made
    Retried {
        widget_id: WidgetId,
        succeeded: bool,
        timestamp: u64,
    },
    /// A scheduled step found its target invalid or gave up
    Abandoned {
        widget_id: WidgetId,
        reason: String,
        timestamp: u64,
    },
    /// A focus request was rejected up front
    Denied {
        widget_id: WidgetId,
        reason: String,
        timestamp: u64,
    },
    /// Focus was put back from the history recorder
    Restored {
        workspace: usize,
        widget_id: Option<WidgetId>,
        outcome: String,
        timestamp: u64,
    },
}

/// How the apply step moves input focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusMode {
    /// Ask for focus on the widget itself
    Direct,
    /// Put focus back on the recorded element inside the widget
    Restore,
}

#[derive(Debug, Clone, Copy)]
struct PendingFocus {
    widget: WidgetId,
    workspace: usize,
    mode: FocusMode,
}

/// Mutable parts the coordinator works on, borrowed together from one host
pub struct FocusParts<'a> {
    pub workspaces: &'a mut WorkspaceManager,
    pub tree: &'a mut dyn VisualTree,
    pub history: &'a mut FocusHistoryRecorder,
    pub coordinator: &'a mut FocusCoordinator,
}

/// Owner of the state every focus continuation runs against
///
/// Scheduled steps receive the host mutably from the dispatcher and split it
/// with [`FocusHost::focus_parts`].
pub trait FocusHost: 'static {
    fn focus_parts(&mut self) -> FocusParts<'_>;
}

/// Focus coordinator
///
/// Holds the audit trail and transfers waiting for attachment. The protocol
/// itself lives in associated functions that take the host and dispatcher.
pub struct FocusCoordinator {
    audit_trail: Vec<FocusEvent>,
    deferred: HashMap<AttachHandle, PendingFocus>,
    attached_inbox: Rc<RefCell<VecDeque<AttachHandle>>>,
    next_timestamp: u64,
}

impl FocusCoordinator {
    /// Creates a new focus coordinator
    pub fn new() -> Self {
        Self {
            audit_trail: Vec::new(),
            deferred: HashMap::new(),
            attached_inbox: Rc::new(RefCell::new(VecDeque::new())),
            next_timestamp: 0,
        }
    }

    /// Moves focus to a widget in the current workspace
    ///
    /// Synchronously clears the old owner's flag and updates the pointer;
    /// the visual flag and input focus for the target follow in one
    /// scheduled step (after attachment, if the widget is still loading).
    pub fn request_focus<H: FocusHost>(
        host: &mut H,
        dispatcher: &mut Dispatcher<H>,
        target: WidgetId,
    ) -> Result<(), FocusError> {
        Self::begin_transfer(host, dispatcher, target, FocusMode::Direct)
    }

    /// Moves focus to the next focusable widget of the current workspace
    pub fn focus_next<H: FocusHost>(
        host: &mut H,
        dispatcher: &mut Dispatcher<H>,
    ) -> Result<Option<WidgetId>, FocusError> {
        let candidate = {
            let parts = host.focus_parts();
            let ws = parts.workspaces.current().ok_or(FocusError::NoCurrentWorkspace)?;
            ws.next_focus_candidate()
        };
        if let Some(target) = candidate {
            Self::request_focus(host, dispatcher, target)?;
        }
        Ok(candidate)
    }

    /// Moves focus to the previous focusable widget of the current workspace
    pub fn focus_previous<H: FocusHost>(
        host: &mut H,
        dispatcher: &mut Dispatcher<H>,
    ) -> Result<Option<WidgetId>, FocusError> {
        let candidate = {
            let parts = host.focus_parts();
            let ws = parts.workspaces.current().ok_or(FocusError::NoCurrentWorkspace)?;
            ws.previous_focus_candidate()
        };
        if let Some(target) = candidate {
            Self::request_focus(host, dispatcher, target)?;
        }
        Ok(candidate)
    }

    /// Switches workspace and restores focus in the incoming one
    ///
    /// The outgoing owner's flag is cleared and its history record frozen
    /// (not cleared) before the switch.
    pub fn switch_workspace<H: FocusHost>(
        host: &mut H,
        dispatcher: &mut Dispatcher<H>,
        index: usize,
    ) -> Result<Option<WidgetId>, FocusError> {
        {
            let FocusParts {
                workspaces,
                history,
                coordinator,
                ..
            } = host.focus_parts();
            if workspaces.workspace(index).is_none() {
                return Err(WorkspaceError::WorkspaceNotFound(index).into());
            }
            let from = workspaces.current_index();
            if from == Some(index) {
                return Ok(workspaces.workspace(index).and_then(|ws| ws.focused()));
            }

            if let Some(old) = from {
                if let Some(ws) = workspaces.workspace_mut(old) {
                    coordinator.clear_active(ws);
                }
                history.freeze(ContainerId::Workspace(old));
            }
            workspaces.switch_to(index)?;
            history.thaw(ContainerId::Workspace(index));
        }
        Self::restore_focus(host, dispatcher, index)
    }

    /// Restores focus in a workspace from its pointer and history
    ///
    /// Target choice: the pointer if it can take focus, else the widget of
    /// the recorded element, else the first focusable widget. With no
    /// widget at all the history fallback chain runs directly.
    pub fn restore_focus<H: FocusHost>(
        host: &mut H,
        dispatcher: &mut Dispatcher<H>,
        index: usize,
    ) -> Result<Option<WidgetId>, FocusError> {
        let target = {
            let FocusParts {
                workspaces,
                tree,
                history,
                coordinator,
            } = host.focus_parts();
            if workspaces.current_index() != Some(index) {
                return Err(FocusError::NoCurrentWorkspace);
            }
            let ws = workspaces
                .workspace(index)
                .ok_or(WorkspaceError::WorkspaceNotFound(index))?;

            let recorded = history
                .get(ContainerId::Workspace(index))
                .and_then(|record| record.element.widget);
            let target = ws
                .focused()
                .filter(|id| ws.can_focus(*id))
                .or_else(|| recorded.filter(|id| ws.can_focus(*id)))
                .or_else(|| ws.focusable_widgets().first().copied());

            if target.is_none() {
                let outcome = history.restore(ContainerId::Workspace(index), tree);
                let timestamp = coordinator.next_timestamp();
                coordinator.audit_trail.push(FocusEvent::Restored {
                    workspace: index,
                    widget_id: None,
                    outcome: describe(&outcome),
                    timestamp,
                });
            }
            target
        };

        if let Some(target) = target {
            Self::begin_transfer(host, dispatcher, target, FocusMode::Restore)?;
        }
        Ok(target)
    }

    /// Schedules apply steps for transfers whose widget finished attaching
    ///
    /// Attachment callbacks only queue the handle; the event loop calls this
    /// to turn them into scheduled work. Returns the number scheduled.
    pub fn drain_attached<H: FocusHost>(host: &mut H, dispatcher: &mut Dispatcher<H>) -> usize {
        let parts = host.focus_parts();
        let coordinator = parts.coordinator;
        let handles: Vec<AttachHandle> = coordinator.attached_inbox.borrow_mut().drain(..).collect();

        let mut scheduled = 0;
        for handle in handles {
            if let Some(pending) = coordinator.deferred.remove(&handle) {
                Self::schedule_apply(dispatcher, pending);
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Drops waiting transfers for a widget that is being removed
    pub fn discard_widget(&mut self, widget: WidgetId) {
        self.deferred.retain(|_, pending| pending.widget != widget);
    }

    /// Number of transfers waiting for attachment
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Returns the audit trail
    pub fn audit_trail(&self) -> &[FocusEvent] {
        &self.audit_trail
    }

    /// Clears the audit trail (for testing)
    #[cfg(test)]
    pub fn clear_audit_trail(&mut self) {
        self.audit_trail.clear();
    }

    fn begin_transfer<H: FocusHost>(
        host: &mut H,
        dispatcher: &mut Dispatcher<H>,
        target: WidgetId,
        mode: FocusMode,
    ) -> Result<(), FocusError> {
        let FocusParts {
            workspaces,
            tree,
            coordinator,
            ..
        } = host.focus_parts();

        let index = match Self::validate_request(workspaces, target) {
            Ok(index) => index,
            Err(err) => {
                coordinator.deny(target, &err);
                return Err(err);
            }
        };
        let ws = workspaces
            .workspace_mut(index)
            .ok_or(WorkspaceError::WorkspaceNotFound(index))?;
        let Some(handle) = ws.attach_handle(target) else {
            let err = FocusError::NotAttached(target);
            coordinator.deny(target, &err);
            return Err(err);
        };

        // Step 1: the old owner loses its flag now, before anything is queued
        let previous = ws.focused();
        if previous != Some(target) {
            coordinator.clear_active(ws);
        }

        // Step 2: pointer first, so readers are never stale
        ws.set_focus_owner(Some(target))?;
        if previous != Some(target) {
            let timestamp = coordinator.next_timestamp();
            coordinator.audit_trail.push(FocusEvent::OwnerChanged {
                workspace: index,
                from: previous,
                to: Some(target),
                timestamp,
            });
        }

        // Steps 3 and 5: apply now-ish, or once attached
        let pending = PendingFocus {
            widget: target,
            workspace: index,
            mode,
        };
        if tree.is_attached(handle) {
            Self::schedule_apply(dispatcher, pending);
        } else {
            coordinator.deferred.insert(handle, pending);
            let timestamp = coordinator.next_timestamp();
            coordinator.audit_trail.push(FocusEvent::DeferredUntilAttached {
                widget_id: target,
                timestamp,
            });
            tracing::debug!(widget_id = %target, "focus deferred until attached");
            let inbox = Rc::clone(&coordinator.attached_inbox);
            tree.on_attached(
                handle,
                Box::new(move |handle| inbox.borrow_mut().push_back(handle)),
            );
        }
        Ok(())
    }

    fn validate_request(workspaces: &WorkspaceManager, target: WidgetId) -> Result<usize, FocusError> {
        let current = workspaces.current_index().ok_or(FocusError::NoCurrentWorkspace)?;
        let index = workspaces
            .find_widget(target)
            .ok_or(FocusError::TargetNotFound(target))?;
        if index != current {
            return Err(FocusError::NotInCurrentWorkspace(target));
        }
        if !workspaces.is_target_valid(target) {
            return Err(FocusError::NotFocusable(target));
        }
        Ok(index)
    }

    fn schedule_apply<H: FocusHost>(dispatcher: &mut Dispatcher<H>, pending: PendingFocus) {
        dispatcher.schedule(
            format!("focus.apply {}", pending.widget),
            APPLY_PRIORITY,
            move |host: &mut H, d: &mut Dispatcher<H>| Self::apply(host, d, pending),
        );
    }

    /// Sets the "active" flag and moves input focus, as one unit
    fn apply<H: FocusHost>(host: &mut H, dispatcher: &mut Dispatcher<H>, pending: PendingFocus) -> OperationOutcome {
        let FocusParts {
            workspaces,
            tree,
            history,
            coordinator,
        } = host.focus_parts();

        let handle = match Self::revalidate(workspaces, &*tree, pending) {
            Ok(handle) => handle,
            Err(reason) => return coordinator.abandon(pending.widget, reason),
        };
        let Some(ws) = workspaces.workspace_mut(pending.workspace) else {
            return coordinator.abandon(pending.widget, "workspace gone");
        };

        let was_active = ws.set_visual_active(pending.widget, true);
        if !was_active {
            let gained = ws
                .slot_mut(pending.widget)
                .map(|slot| slot.boundary.safe_focus_gained())
                .map(|outcome| outcome.is_completed())
                .unwrap_or(false);
            if !gained {
                ws.set_visual_active(pending.widget, false);
                ws.drop_unfocusable_owner();
                return coordinator.abandon(pending.widget, "widget faulted while gaining focus");
            }
        }

        let input_focus = match pending.mode {
            FocusMode::Direct => tree.request_input_focus(handle),
            FocusMode::Restore => {
                let outcome = restore_within(history, &mut *tree, pending);
                let timestamp = coordinator.next_timestamp();
                coordinator.audit_trail.push(FocusEvent::Restored {
                    workspace: pending.workspace,
                    widget_id: Some(pending.widget),
                    outcome: describe(&outcome),
                    timestamp,
                });
                let inside = outcome
                    .focused()
                    .map(|element| element.widget == Some(pending.widget))
                    .unwrap_or(false);
                inside || tree.request_input_focus(handle)
            }
        };

        let timestamp = coordinator.next_timestamp();
        coordinator.audit_trail.push(FocusEvent::Activated {
            widget_id: pending.widget,
            input_focus,
            timestamp,
        });

        dispatcher.schedule(
            format!("focus.verify {}", pending.widget),
            VERIFY_PRIORITY,
            move |host: &mut H, _: &mut Dispatcher<H>| Self::verify(host, pending),
        );
        OperationOutcome::Completed
    }

    /// Confirms input focus landed; retries once, then gives up
    fn verify<H: FocusHost>(host: &mut H, pending: PendingFocus) -> OperationOutcome {
        let FocusParts {
            workspaces,
            tree,
            coordinator,
            ..
        } = host.focus_parts();

        let handle = match Self::revalidate(workspaces, &*tree, pending) {
            Ok(handle) => handle,
            Err(reason) => return coordinator.abandon(pending.widget, reason),
        };

        if tree.has_input_focus_within(handle) {
            let timestamp = coordinator.next_timestamp();
            coordinator.audit_trail.push(FocusEvent::Verified {
                widget_id: pending.widget,
                timestamp,
            });
            return OperationOutcome::Completed;
        }

        let succeeded = tree.request_input_focus(handle) && tree.has_input_focus_within(handle);
        let timestamp = coordinator.next_timestamp();
        coordinator.audit_trail.push(FocusEvent::Retried {
            widget_id: pending.widget,
            succeeded,
            timestamp,
        });
        if succeeded {
            return OperationOutcome::Completed;
        }

        tracing::warn!(widget_id = %pending.widget, "input focus not transferred after retry; giving up");
        let reason = "input focus not transferred after retry".to_string();
        let timestamp = coordinator.next_timestamp();
        coordinator.audit_trail.push(FocusEvent::Abandoned {
            widget_id: pending.widget,
            reason: reason.clone(),
            timestamp,
        });
        OperationOutcome::Failed { error: reason }
    }

    /// Checks a scheduled step's target right before it acts
    fn revalidate(
        workspaces: &WorkspaceManager,
        tree: &dyn VisualTree,
        pending: PendingFocus,
    ) -> Result<AttachHandle, &'static str> {
        if workspaces.current_index() != Some(pending.workspace) {
            return Err("workspace no longer current");
        }
        let ws = workspaces
            .workspace(pending.workspace)
            .ok_or("workspace gone")?;
        if !ws.contains(pending.widget) {
            return Err("widget removed");
        }
        if !workspaces.is_target_valid(pending.widget) {
            return Err("widget disposed or faulted");
        }
        if ws.focused() != Some(pending.widget) {
            return Err("focus moved elsewhere");
        }
        let handle = ws.attach_handle(pending.widget).ok_or("widget detached")?;
        if !tree.is_attached(handle) {
            return Err("widget detached");
        }
        Ok(handle)
    }

    /// Clears the "active" flag of a workspace's owner, if it is set
    fn clear_active(&mut self, ws: &mut Workspace) {
        let Some(old) = ws.focused() else {
            return;
        };
        if ws.set_visual_active(old, false) {
            if let Some(slot) = ws.slot_mut(old) {
                slot.boundary.safe_focus_lost();
            }
            let timestamp = self.next_timestamp();
            self.audit_trail.push(FocusEvent::ActiveCleared {
                widget_id: old,
                workspace: ws.index(),
                timestamp,
            });
        }
    }

    fn deny(&mut self, widget_id: WidgetId, err: &FocusError) {
        tracing::debug!(widget_id = %widget_id, error = %err, "focus request denied");
        let timestamp = self.next_timestamp();
        self.audit_trail.push(FocusEvent::Denied {
            widget_id,
            reason: err.to_string(),
            timestamp,
        });
    }

    fn abandon(&mut self, widget_id: WidgetId, reason: &str) -> OperationOutcome {
        let timestamp = self.next_timestamp();
        self.audit_trail.push(FocusEvent::Abandoned {
            widget_id,
            reason: reason.to_string(),
            timestamp,
        });
        OperationOutcome::abandoned(reason)
    }

    fn next_timestamp(&mut self) -> u64 {
        let ts = self.next_timestamp;
        self.next_timestamp += 1;
        ts
    }
}

impl Default for FocusCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores focus inside `pending.widget`, never into a neighbour
///
/// The workspace record wins while it names a live element of the target;
/// otherwise the fallback chain runs within the target widget only.
fn restore_within(history: &FocusHistoryRecorder, tree: &mut dyn VisualTree, pending: PendingFocus) -> RestoreOutcome {
    if let Some(record) = history.get(ContainerId::Workspace(pending.workspace)) {
        let element = &record.element;
        if element.widget == Some(pending.widget) && tree.is_element_alive(element) && tree.focus_element(element) {
            return RestoreOutcome::Recorded(element.clone());
        }
    }
    history.restore(ContainerId::Widget(pending.widget), tree)
}

fn describe(outcome: &RestoreOutcome) -> String {
    match outcome {
        RestoreOutcome::Recorded(e) => format!("recorded {}", e),
        RestoreOutcome::FirstFocusable(e) => format!("first focusable {}", e),
        RestoreOutcome::Container(e) => format!("container {}", e),
        RestoreOutcome::NoRecord => "no record".to_string(),
        RestoreOutcome::Unavailable => "unavailable".to_string(),
    }
}
