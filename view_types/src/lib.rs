//! # View Types
//!
//! This crate defines the narrow interface between the widget lifecycle core
//! and the layout/rendering layer.
//!
//! ## Philosophy
//!
//! - **The core never touches a UI toolkit**: it only sees handles and
//!   yes/no answers through [`VisualTree`]
//! - **Fallible handles, not pointers**: elements are addressed by stable
//!   [`ElementId`]s whose liveness is asked for at the point of use
//! - **Signals come back through the event loop**: attachment completion is a
//!   callback, focus changes are drained as events
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A layout engine (no geometry, no grid/dock/stack arrangement)
//! - A renderer or theming system

pub mod fake;

pub use fake::FakeVisualTree;

use core_types::{ContainerId, ElementId, WidgetId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a widget's attachment in the visual tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachHandle(u64);

impl AttachHandle {
    /// Creates a handle from a raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttachHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attach:{}", self.0)
    }
}

/// Callback fired once when an attachment completes
pub type AttachedCallback = Box<dyn FnOnce(AttachHandle)>;

/// Layout/rendering collaborator as seen by the lifecycle core
///
/// Every query may answer "no" at any time: elements can disappear between
/// two calls. Callers re-check right before acting and treat a refusal as
/// "not available", never as an error.
pub trait VisualTree {
    /// Attaches a widget's presentation inside a host container
    ///
    /// The attachment may complete later (the widget is still loading); use
    /// [`VisualTree::is_attached`] and [`VisualTree::on_attached`].
    fn attach(&mut self, widget: WidgetId, host: ContainerId) -> AttachHandle;

    /// Removes a widget's presentation; its elements die
    fn detach(&mut self, handle: AttachHandle);

    /// Checks if the attachment has completed
    fn is_attached(&self, handle: AttachHandle) -> bool;

    /// Registers a callback for attachment completion
    ///
    /// Fires immediately if the handle is already attached.
    fn on_attached(&mut self, handle: AttachHandle, callback: AttachedCallback);

    /// Asks for keyboard focus to move into the widget
    fn request_input_focus(&mut self, handle: AttachHandle) -> bool;

    /// Checks if keyboard focus is currently inside the widget
    fn has_input_focus_within(&self, handle: AttachHandle) -> bool;

    /// Checks if an element still exists
    fn is_element_alive(&self, element: &ElementId) -> bool;

    /// Moves keyboard focus to a specific element; false if it is gone or refuses
    fn focus_element(&mut self, element: &ElementId) -> bool;

    /// First focusable element anywhere below a container
    fn first_focusable_descendant(&self, container: ContainerId) -> Option<ElementId>;

    /// The element representing the container itself, if it can hold focus
    fn container_element(&self, container: ContainerId) -> Option<ElementId>;

    /// Takes the focus-gain events observed since the last call, oldest first
    fn drain_focus_events(&mut self) -> Vec<ElementId>;
}
