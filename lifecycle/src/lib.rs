//! # Lifecycle
//!
//! Widget lifecycle state machine and the behaviour contract widgets implement.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: every state change is a checked transition
//! - **No UI toolkit here**: widgets are plain state + behaviour; rendering is
//!   owned by the layout layer
//! - **Failures are values**: lifecycle methods return `Result`, and the fault
//!   boundary decides what a failure means
//!
//! ## States
//!
//! ```text
//! Created -> Initializing -> Active <-> Inactive -> Disposed
//!                 |             |          |
//!                 +---------> Faulted <----+
//! ```
//!
//! `Faulted` is left only through an explicit recovery (back through
//! `Initializing`) or disposal. `Disposed` is terminal.

use core_types::{StateMap, WidgetId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Constructed, not yet initialized
    Created,
    /// `initialize` is running
    Initializing,
    /// Initialized and visible in the current workspace
    Active,
    /// Initialized, workspace switched away; all in-memory state kept
    Inactive,
    /// A lifecycle method failed; waiting for operator recovery
    Faulted,
    /// Released all resources; terminal
    Disposed,
}

impl LifecycleState {
    /// Checks if `next` is a legal successor of this state
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Initializing)
                | (Created, Disposed)
                | (Initializing, Active)
                | (Initializing, Faulted)
                | (Active, Inactive)
                | (Active, Faulted)
                | (Active, Disposed)
                | (Inactive, Active)
                | (Inactive, Faulted)
                | (Inactive, Disposed)
                | (Faulted, Initializing)
                | (Faulted, Disposed)
        )
    }

    /// Performs a checked transition
    pub fn transition(self, next: LifecycleState) -> Result<LifecycleState, LifecycleError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LifecycleError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Checks if the widget has been initialized and is not faulted or disposed
    pub fn is_live(self) -> bool {
        matches!(self, LifecycleState::Active | LifecycleState::Inactive)
    }

    /// Checks if this is the terminal state
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Disposed
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Created => write!(f, "Created"),
            LifecycleState::Initializing => write!(f, "Initializing"),
            LifecycleState::Active => write!(f, "Active"),
            LifecycleState::Inactive => write!(f, "Inactive"),
            LifecycleState::Faulted => write!(f, "Faulted"),
            LifecycleState::Disposed => write!(f, "Disposed"),
        }
    }
}

/// The widget method a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Initialize,
    Activate,
    Deactivate,
    Dispose,
    SaveState,
    RestoreState,
    FocusGained,
    FocusLost,
    Recover,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::Initialize => "initialize",
            LifecyclePhase::Activate => "activate",
            LifecyclePhase::Deactivate => "deactivate",
            LifecyclePhase::Dispose => "dispose",
            LifecyclePhase::SaveState => "save_state",
            LifecyclePhase::RestoreState => "restore_state",
            LifecyclePhase::FocusGained => "focus_gained",
            LifecyclePhase::FocusLost => "focus_lost",
            LifecyclePhase::Recover => "recover",
        };
        write!(f, "{}", name)
    }
}

/// Failure reported by a widget implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WidgetError {
    #[error("{0}")]
    Failed(String),

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl WidgetError {
    /// Shorthand for a generic failure
    pub fn failed(message: impl Into<String>) -> Self {
        WidgetError::Failed(message.into())
    }
}

/// Errors related to lifecycle bookkeeping
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("illegal lifecycle transition {from} -> {to}")]
    IllegalTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// Behaviour contract implemented by every widget
///
/// All methods run synchronously on the event loop and must not schedule
/// work that outlives `dispose`. `save_state` is expected to be fast; the
/// snapshot engine does not wait for anything.
pub trait Widget {
    /// Stable identifier, assigned by the shell at creation
    fn id(&self) -> WidgetId;

    /// Display name; not unique and never used as an identity
    fn name(&self) -> &str;

    /// Factory kind used to re-create this widget at startup
    fn kind(&self) -> &str {
        "widget"
    }

    /// Called exactly once after construction (again only on explicit recovery)
    fn initialize(&mut self) -> Result<(), WidgetError>;

    /// Called when the owning workspace becomes current
    fn activate(&mut self) -> Result<(), WidgetError> {
        Ok(())
    }

    /// Called when the owning workspace is switched away; must keep all state
    fn deactivate(&mut self) -> Result<(), WidgetError> {
        Ok(())
    }

    /// Releases timers, subscriptions, and other external resources
    fn dispose(&mut self) -> Result<(), WidgetError> {
        Ok(())
    }

    /// Captures private state for persistence
    fn save_state(&self) -> Result<StateMap, WidgetError> {
        Ok(StateMap::new())
    }

    /// Re-applies previously captured state
    fn restore_state(&mut self, _state: &StateMap) -> Result<(), WidgetError> {
        Ok(())
    }

    fn on_focus_gained(&mut self) {}

    fn on_focus_lost(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let state = LifecycleState::Created;
        let state = state.transition(LifecycleState::Initializing).unwrap();
        let state = state.transition(LifecycleState::Active).unwrap();
        let state = state.transition(LifecycleState::Inactive).unwrap();
        let state = state.transition(LifecycleState::Active).unwrap();
        let state = state.transition(LifecycleState::Disposed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_faulted_reachable_from_running_states() {
        for from in [
            LifecycleState::Initializing,
            LifecycleState::Active,
            LifecycleState::Inactive,
        ] {
            assert!(from.can_transition_to(LifecycleState::Faulted), "{}", from);
        }
        assert!(!LifecycleState::Created.can_transition_to(LifecycleState::Faulted));
    }

    #[test]
    fn test_faulted_recovers_only_through_initializing() {
        let faulted = LifecycleState::Faulted;
        assert!(faulted.can_transition_to(LifecycleState::Initializing));
        assert!(faulted.can_transition_to(LifecycleState::Disposed));
        assert!(!faulted.can_transition_to(LifecycleState::Active));
        assert!(!faulted.can_transition_to(LifecycleState::Inactive));
    }

    #[test]
    fn test_disposed_is_terminal() {
        let disposed = LifecycleState::Disposed;
        for next in [
            LifecycleState::Created,
            LifecycleState::Initializing,
            LifecycleState::Active,
            LifecycleState::Inactive,
            LifecycleState::Faulted,
            LifecycleState::Disposed,
        ] {
            assert!(!disposed.can_transition_to(next));
        }
    }

    #[test]
    fn test_illegal_transition_error() {
        let result = LifecycleState::Created.transition(LifecycleState::Active);
        assert_eq!(
            result,
            Err(LifecycleError::IllegalTransition {
                from: LifecycleState::Created,
                to: LifecycleState::Active,
            })
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "illegal lifecycle transition Created -> Active"
        );
    }

    #[test]
    fn test_is_live() {
        assert!(LifecycleState::Active.is_live());
        assert!(LifecycleState::Inactive.is_live());
        assert!(!LifecycleState::Faulted.is_live());
        assert!(!LifecycleState::Created.is_live());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(LifecyclePhase::Initialize.to_string(), "initialize");
        assert_eq!(LifecyclePhase::RestoreState.to_string(), "restore_state");
    }

    #[test]
    fn test_default_widget_methods() {
        struct Minimal;
        impl Widget for Minimal {
            fn id(&self) -> WidgetId {
                WidgetId::from_raw(1)
            }
            fn name(&self) -> &str {
                "minimal"
            }
            fn initialize(&mut self) -> Result<(), WidgetError> {
                Ok(())
            }
        }

        let mut widget = Minimal;
        assert_eq!(widget.kind(), "widget");
        assert!(widget.activate().is_ok());
        assert!(widget.deactivate().is_ok());
        assert!(widget.save_state().unwrap().is_empty());
        assert!(widget.dispose().is_ok());
    }
}
