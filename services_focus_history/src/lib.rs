//! # Focus History
//!
//! Per-container memory of the last focused element, used to put focus back
//! where the user left it after a workspace switch or a restart.
//!
//! ## Philosophy
//!
//! - **Records are fallible handles**: an [`ElementId`] is only an address;
//!   liveness is asked of the visual tree at the moment of use
//! - **Dead is the same as absent**: a record whose element is gone falls
//!   back exactly like a missing record would, never as an error
//! - **The map survives restarts**: restoring a session clears only the
//!   transient session stack, never the per-container map
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A focus owner (the workspace pointer decides who is focused)
//! - A navigation history (no back/forward)

use core_types::{ContainerId, ElementId, StateMap, WidgetId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use view_types::VisualTree;

/// Default bound of the session stack
pub const DEFAULT_SESSION_LIMIT: usize = 64;

/// Last focused element of one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusRecord {
    pub element: ElementId,
    /// Small control-state blob (scroll offset, selection, ...)
    #[serde(default)]
    pub control_state: StateMap,
    /// Logical time of the update; newer records win on import
    #[serde(default)]
    pub seq: u64,
}

/// Persisted form of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedFocusRecord {
    pub container: ContainerId,
    #[serde(flatten)]
    pub record: FocusRecord,
}

/// One entry of the session stack
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub container: ContainerId,
    pub element: ElementId,
}

/// Result of a restore attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The recorded element was alive and took focus
    Recorded(ElementId),
    /// The record was dead; the first focusable descendant took focus
    FirstFocusable(ElementId),
    /// The container element itself took focus
    Container(ElementId),
    /// Nothing recorded for this container
    NoRecord,
    /// Recorded, but nothing in the fallback chain could take focus
    Unavailable,
}

impl RestoreOutcome {
    /// Element that ended up focused, if any
    pub fn focused(&self) -> Option<&ElementId> {
        match self {
            RestoreOutcome::Recorded(e)
            | RestoreOutcome::FirstFocusable(e)
            | RestoreOutcome::Container(e) => Some(e),
            RestoreOutcome::NoRecord | RestoreOutcome::Unavailable => None,
        }
    }
}

/// Focus history recorder
pub struct FocusHistoryRecorder {
    records: HashMap<ContainerId, FocusRecord>,
    frozen: HashSet<ContainerId>,
    session: VecDeque<SessionEntry>,
    session_limit: usize,
    next_seq: u64,
}

impl FocusHistoryRecorder {
    /// Creates an empty recorder
    pub fn new() -> Self {
        Self::with_session_limit(DEFAULT_SESSION_LIMIT)
    }

    /// Creates a recorder with a bounded session stack
    pub fn with_session_limit(limit: usize) -> Self {
        Self {
            records: HashMap::new(),
            frozen: HashSet::new(),
            session: VecDeque::new(),
            session_limit: limit,
            next_seq: 1,
        }
    }

    /// Records a focus gain inside a container
    ///
    /// Returns false if the container is frozen.
    pub fn record(
        &mut self,
        container: ContainerId,
        element: ElementId,
        control_state: StateMap,
    ) -> bool {
        if self.frozen.contains(&container) {
            tracing::trace!(container = %container, element = %element, "ignoring focus in frozen container");
            return false;
        }
        let seq = self.bump_seq();
        self.push_session(container, element.clone());
        self.records.insert(
            container,
            FocusRecord {
                element,
                control_state,
                seq,
            },
        );
        true
    }

    /// Records a focus gain in every container enclosing the element
    ///
    /// `path` lists the enclosing containers, outermost first. Returns how
    /// many containers accepted the update.
    pub fn record_along_path(&mut self, element: &ElementId, path: &[ContainerId]) -> usize {
        let mut accepted = 0;
        for container in path {
            // Refocusing the same element keeps its control state
            let control_state = self
                .records
                .get(container)
                .filter(|r| &r.element == element)
                .map(|r| r.control_state.clone())
                .unwrap_or_default();
            if self.record(*container, element.clone(), control_state) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Replaces the control state of an existing record
    pub fn update_control_state(&mut self, container: ContainerId, control_state: StateMap) -> bool {
        if self.frozen.contains(&container) {
            return false;
        }
        match self.records.get_mut(&container) {
            Some(record) => {
                record.control_state = control_state;
                true
            }
            None => false,
        }
    }

    /// Gets the record of a container without checking liveness
    pub fn get(&self, container: ContainerId) -> Option<&FocusRecord> {
        self.records.get(&container)
    }

    /// Stops a container's record from changing
    pub fn freeze(&mut self, container: ContainerId) {
        self.frozen.insert(container);
    }

    /// Lets a container's record change again
    pub fn thaw(&mut self, container: ContainerId) {
        self.frozen.remove(&container);
    }

    /// Checks if a container is frozen
    pub fn is_frozen(&self, container: ContainerId) -> bool {
        self.frozen.contains(&container)
    }

    /// Puts focus back into a container
    ///
    /// Order: the recorded element, then the first focusable descendant, then
    /// the container element, then nothing. Liveness is checked right before
    /// each focus call and a refusal counts as dead. Stale records are kept.
    pub fn restore(&self, container: ContainerId, tree: &mut dyn VisualTree) -> RestoreOutcome {
        let Some(record) = self.records.get(&container) else {
            return RestoreOutcome::NoRecord;
        };

        let element = &record.element;
        if tree.is_element_alive(element) && tree.focus_element(element) {
            return RestoreOutcome::Recorded(element.clone());
        }
        tracing::debug!(container = %container, element = %element, "stale focus record, falling back");

        if let Some(descendant) = tree.first_focusable_descendant(container) {
            if tree.focus_element(&descendant) {
                return RestoreOutcome::FirstFocusable(descendant);
            }
        }
        if let Some(own) = tree.container_element(container) {
            if tree.focus_element(&own) {
                return RestoreOutcome::Container(own);
            }
        }
        RestoreOutcome::Unavailable
    }

    /// Drops every record that refers to a disposed widget
    pub fn forget_widget(&mut self, widget: WidgetId) -> usize {
        let before = self.records.len();
        self.records.retain(|container, record| {
            *container != ContainerId::Widget(widget) && record.element.widget != Some(widget)
        });
        self.frozen.remove(&ContainerId::Widget(widget));
        self.session.retain(|entry| entry.element.widget != Some(widget));
        before - self.records.len()
    }

    /// Session stack, newest last
    pub fn session(&self) -> impl Iterator<Item = &SessionEntry> {
        self.session.iter()
    }

    /// Clears the transient session stack; the per-container map stays
    pub fn clear_session(&mut self) {
        self.session.clear();
    }

    /// Exports the per-container map, ordered by container for stable output
    pub fn export(&self) -> Vec<PersistedFocusRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .map(|(container, record)| PersistedFocusRecord {
                container: *container,
                record: record.clone(),
            })
            .collect();
        records.sort_by_key(|r| container_sort_key(r.container));
        records
    }

    /// Merges persisted records into the map
    ///
    /// Existing records are never cleared; an imported record replaces one
    /// only when it is newer. Returns how many records were taken.
    pub fn import(&mut self, persisted: Vec<PersistedFocusRecord>) -> usize {
        let mut taken = 0;
        for PersistedFocusRecord { container, record } in persisted {
            let newer = self
                .records
                .get(&container)
                .map(|existing| record.seq > existing.seq)
                .unwrap_or(true);
            if newer {
                self.next_seq = self.next_seq.max(record.seq + 1);
                self.records.insert(container, record);
                taken += 1;
            }
        }
        taken
    }

    /// Exports as JSON for the snapshot's application state
    pub fn export_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self.export())
    }

    /// Imports from the snapshot's application state
    pub fn import_value(&mut self, value: &serde_json::Value) -> Result<usize, serde_json::Error> {
        let persisted: Vec<PersistedFocusRecord> = serde_json::from_value(value.clone())?;
        Ok(self.import(persisted))
    }

    /// Returns the number of recorded containers
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Checks if nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn push_session(&mut self, container: ContainerId, element: ElementId) {
        if self.session_limit == 0 {
            return;
        }
        while self.session.len() >= self.session_limit {
            self.session.pop_front();
        }
        self.session.push_back(SessionEntry { container, element });
    }
}

impl Default for FocusHistoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn container_sort_key(container: ContainerId) -> (u8, u64) {
    match container {
        ContainerId::Workspace(index) => (0, index as u64),
        ContainerId::Widget(id) => (1, id.as_u64()),
    }
}
