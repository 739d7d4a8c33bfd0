//! # Fault Boundary
//!
//! This crate isolates widget failures.
//!
//! ## Philosophy
//!
//! - **Contain, don't propagate**: every lifecycle call goes through a guard that
//!   catches both `Err` results and panics
//! - **Faulted means quiet**: while faulted, nothing but an explicit recovery
//!   (or disposal) reaches the widget
//! - **Visible diagnostics**: a faulted widget is presented as a placeholder with
//!   a manual recover action
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A restart supervisor (recovery is operator-driven, never automatic)
//! - A renderer (the placeholder is data for the layout layer to draw)

use core_types::{StateMap, WidgetId};
use lifecycle::{LifecyclePhase, LifecycleState, Widget, WidgetError};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Label of the manual recovery action shown on the placeholder
pub const RECOVER_ACTION_LABEL: &str = "Recover";

/// A contained widget failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Method that failed
    pub phase: LifecyclePhase,
    /// Error or panic message
    pub message: String,
    /// Whether the widget panicked rather than returning an error
    pub panicked: bool,
}

/// What the layout layer should draw for a widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presentation {
    /// The widget's own content
    Normal,
    /// Diagnostic placeholder replacing the widget
    Diagnostic(DiagnosticPlaceholder),
}

/// Contents of the diagnostic placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticPlaceholder {
    pub widget_id: WidgetId,
    pub widget_name: String,
    pub phase: LifecyclePhase,
    pub message: String,
    pub recover_action: String,
}

/// Result of a guarded call, reported instead of propagating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The call ran (or was an idempotent no-op) and succeeded
    Completed,
    /// The call was not forwarded (faulted, disposed, or wrong state)
    Skipped,
    /// The call failed and the widget is now faulted
    Faulted,
}

impl LifecycleOutcome {
    pub fn is_completed(self) -> bool {
        self == LifecycleOutcome::Completed
    }
}

/// Isolation wrapper owning exactly one widget
pub struct FaultBoundary {
    widget: Box<dyn Widget>,
    state: LifecycleState,
    faulted: bool,
    last_fault: Option<Fault>,
    presentation: Presentation,
}

impl FaultBoundary {
    /// Wraps a freshly constructed widget
    pub fn new(widget: Box<dyn Widget>) -> Self {
        Self {
            widget,
            state: LifecycleState::Created,
            faulted: false,
            last_fault: None,
            presentation: Presentation::Normal,
        }
    }

    pub fn id(&self) -> WidgetId {
        self.widget.id()
    }

    pub fn name(&self) -> &str {
        self.widget.name()
    }

    pub fn kind(&self) -> &str {
        self.widget.kind()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn is_disposed(&self) -> bool {
        self.state == LifecycleState::Disposed
    }

    pub fn last_fault(&self) -> Option<&Fault> {
        self.last_fault.as_ref()
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    /// Checks if the widget may receive focus
    pub fn can_receive_focus(&self) -> bool {
        !self.faulted && self.state.is_live()
    }

    /// Runs `initialize` once; failures fault the widget without retrying
    pub fn safe_initialize(&mut self) -> LifecycleOutcome {
        if self.state != LifecycleState::Created {
            tracing::warn!(
                widget_id = %self.id(),
                state = %self.state,
                "initialize requested twice; ignoring"
            );
            return LifecycleOutcome::Skipped;
        }
        self.run_initialize(LifecyclePhase::Initialize)
    }

    /// Activates the widget; idempotent
    pub fn safe_activate(&mut self) -> LifecycleOutcome {
        match self.state {
            LifecycleState::Active => LifecycleOutcome::Completed,
            LifecycleState::Inactive if !self.faulted => {
                match self.guard(LifecyclePhase::Activate, |w| w.activate()) {
                    Ok(()) => {
                        self.move_to(LifecycleState::Active);
                        LifecycleOutcome::Completed
                    }
                    Err(fault) => self.enter_faulted(fault),
                }
            }
            _ => LifecycleOutcome::Skipped,
        }
    }

    /// Deactivates the widget; idempotent and never a teardown
    pub fn safe_deactivate(&mut self) -> LifecycleOutcome {
        match self.state {
            LifecycleState::Inactive => LifecycleOutcome::Completed,
            LifecycleState::Active if !self.faulted => {
                match self.guard(LifecyclePhase::Deactivate, |w| w.deactivate()) {
                    Ok(()) => {
                        self.move_to(LifecycleState::Inactive);
                        LifecycleOutcome::Completed
                    }
                    Err(fault) => self.enter_faulted(fault),
                }
            }
            _ => LifecycleOutcome::Skipped,
        }
    }

    /// Disposes the widget exactly once, from any non-terminal state
    ///
    /// Dispose failures are logged and never change the presentation.
    pub fn safe_dispose(&mut self) -> LifecycleOutcome {
        if self.is_disposed() {
            return LifecycleOutcome::Skipped;
        }

        let outcome = match self.guard(LifecyclePhase::Dispose, |w| w.dispose()) {
            Ok(()) => LifecycleOutcome::Completed,
            Err(fault) => {
                tracing::warn!(
                    widget_id = %self.id(),
                    error = %fault.message,
                    "dispose failed; resources may leak"
                );
                self.last_fault = Some(fault);
                LifecycleOutcome::Faulted
            }
        };
        self.move_to(LifecycleState::Disposed);
        outcome
    }

    /// Captures widget state; `None` unless initialized and healthy
    pub fn safe_save_state(&mut self) -> Option<StateMap> {
        if self.faulted || !self.state.is_live() {
            return None;
        }
        match self.guard(LifecyclePhase::SaveState, |w| w.save_state()) {
            Ok(state) => Some(state),
            Err(fault) => {
                self.enter_faulted(fault);
                None
            }
        }
    }

    /// Re-applies persisted state
    pub fn safe_restore_state(&mut self, state: &StateMap) -> LifecycleOutcome {
        if self.faulted || !self.state.is_live() {
            return LifecycleOutcome::Skipped;
        }
        match self.guard(LifecyclePhase::RestoreState, |w| w.restore_state(state)) {
            Ok(()) => LifecycleOutcome::Completed,
            Err(fault) => self.enter_faulted(fault),
        }
    }

    pub fn safe_focus_gained(&mut self) -> LifecycleOutcome {
        if !self.can_receive_focus() {
            return LifecycleOutcome::Skipped;
        }
        match self.guard(LifecyclePhase::FocusGained, |w| {
            w.on_focus_gained();
            Ok(())
        }) {
            Ok(()) => LifecycleOutcome::Completed,
            Err(fault) => self.enter_faulted(fault),
        }
    }

    pub fn safe_focus_lost(&mut self) -> LifecycleOutcome {
        if self.faulted || !self.state.is_live() {
            return LifecycleOutcome::Skipped;
        }
        match self.guard(LifecyclePhase::FocusLost, |w| {
            w.on_focus_lost();
            Ok(())
        }) {
            Ok(()) => LifecycleOutcome::Completed,
            Err(fault) => self.enter_faulted(fault),
        }
    }

    /// Manual recovery: re-runs `initialize`
    ///
    /// On success the widget is `Active` with its normal presentation; on
    /// failure it stays faulted with the new fault shown.
    pub fn recover(&mut self) -> LifecycleOutcome {
        if self.state != LifecycleState::Faulted {
            return LifecycleOutcome::Skipped;
        }
        tracing::info!(widget_id = %self.id(), "recovering faulted widget");
        let outcome = self.run_initialize(LifecyclePhase::Recover);
        if outcome.is_completed() {
            self.faulted = false;
            self.presentation = Presentation::Normal;
        }
        outcome
    }

    fn run_initialize(&mut self, phase: LifecyclePhase) -> LifecycleOutcome {
        if !self.move_to(LifecycleState::Initializing) {
            return LifecycleOutcome::Skipped;
        }
        match self.guard(phase, |w| w.initialize()) {
            Ok(()) => {
                self.move_to(LifecycleState::Active);
                LifecycleOutcome::Completed
            }
            Err(fault) => self.enter_faulted(fault),
        }
    }

    fn enter_faulted(&mut self, fault: Fault) -> LifecycleOutcome {
        tracing::error!(
            widget_id = %self.id(),
            widget = self.widget.name(),
            phase = %fault.phase,
            panicked = fault.panicked,
            error = %fault.message,
            "widget fault contained"
        );
        self.move_to(LifecycleState::Faulted);
        self.faulted = true;
        self.presentation = Presentation::Diagnostic(DiagnosticPlaceholder {
            widget_id: self.widget.id(),
            widget_name: self.widget.name().to_string(),
            phase: fault.phase,
            message: fault.message.clone(),
            recover_action: RECOVER_ACTION_LABEL.to_string(),
        });
        self.last_fault = Some(fault);
        LifecycleOutcome::Faulted
    }

    /// Applies a checked state change; an illegal one is logged and skipped
    fn move_to(&mut self, next: LifecycleState) -> bool {
        match self.state.transition(next) {
            Ok(state) => {
                self.state = state;
                true
            }
            Err(err) => {
                tracing::warn!(widget_id = %self.id(), error = %err, "lifecycle transition refused");
                false
            }
        }
    }

    /// Runs a widget call, converting errors and panics into a `Fault`
    fn guard<T, F>(&mut self, phase: LifecyclePhase, call: F) -> Result<T, Fault>
    where
        F: FnOnce(&mut dyn Widget) -> Result<T, WidgetError>,
    {
        let widget = &mut *self.widget;
        match panic::catch_unwind(AssertUnwindSafe(|| call(widget))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(Fault {
                phase,
                message: err.to_string(),
                panicked: false,
            }),
            Err(payload) => Err(Fault {
                phase,
                message: panic_message(payload.as_ref()),
                panicked: true,
            }),
        }
    }
}

impl std::fmt::Debug for FaultBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultBoundary")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state)
            .field("faulted", &self.faulted)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "widget panicked".to_string()
    }
}
