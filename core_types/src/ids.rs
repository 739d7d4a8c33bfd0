//! Unique identifiers for shell entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a widget
///
/// Assigned once at creation and never reused, even after the widget is
/// disposed. The identifier is stable across save/restore, which makes it the
/// only valid key for re-targeting persisted state. Display names are not
/// identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(u64);

impl WidgetId {
    /// Creates a widget ID from a raw value (e.g. a persisted record)
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "widget:{}", self.0)
    }
}

/// Process-wide allocator for widget identifiers
///
/// Identifiers are monotonic. Restored identifiers must be reserved so the
/// allocator never hands them out again.
#[derive(Debug, Clone)]
pub struct WidgetIdAllocator {
    next: u64,
}

impl WidgetIdAllocator {
    /// Creates an allocator starting at 1
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocates a fresh identifier
    pub fn allocate(&mut self) -> WidgetId {
        let id = WidgetId(self.next);
        self.next += 1;
        id
    }

    /// Marks an externally supplied identifier as used
    pub fn reserve(&mut self, id: WidgetId) {
        if id.0 >= self.next {
            self.next = id.0 + 1;
        }
    }

    /// Returns the identifier the next call to `allocate` will produce
    pub fn peek_next(&self) -> WidgetId {
        WidgetId(self.next)
    }
}

impl Default for WidgetIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a focus container
///
/// Focus history is recorded per container: either a whole workspace (by
/// index) or a sub-pane owned by a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ContainerId {
    /// A workspace, keyed by its index
    Workspace(usize),
    /// A pane owned by a widget
    Widget(WidgetId),
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerId::Workspace(index) => write!(f, "workspace:{}", index),
            ContainerId::Widget(id) => write!(f, "pane:{}", id.as_u64()),
        }
    }
}

/// Stable address of a focusable UI element
///
/// Elements belong to a widget (`widget` is set) or to workspace chrome
/// (`widget` is `None`). The widget root uses an empty `part`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId {
    pub widget: Option<WidgetId>,
    pub part: String,
}

impl ElementId {
    /// The root element of a widget
    pub fn root(widget: WidgetId) -> Self {
        Self {
            widget: Some(widget),
            part: String::new(),
        }
    }

    /// A named element inside a widget
    pub fn part(widget: WidgetId, part: impl Into<String>) -> Self {
        Self {
            widget: Some(widget),
            part: part.into(),
        }
    }

    /// An element of the workspace chrome (not owned by any widget)
    pub fn chrome(part: impl Into<String>) -> Self {
        Self {
            widget: None,
            part: part.into(),
        }
    }

    /// Checks if this is the root element of its widget
    pub fn is_root(&self) -> bool {
        self.widget.is_some() && self.part.is_empty()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.widget, self.part.is_empty()) {
            (Some(id), true) => write!(f, "{}", id),
            (Some(id), false) => write!(f, "{}/{}", id, self.part),
            (None, _) => write!(f, "chrome/{}", self.part),
        }
    }
}
