//! A single workspace: ordered widgets plus one focus owner

use crate::WorkspaceError;
use core_types::WidgetId;
use lifecycle::Widget;
use services_fault_boundary::{FaultBoundary, LifecycleOutcome};
use view_types::AttachHandle;

/// One widget inside a workspace
#[derive(Debug)]
pub struct WidgetSlot {
    pub boundary: FaultBoundary,
    /// Visual-tree attachment, set once the layout layer has attached it
    pub attach: Option<AttachHandle>,
    /// The "active" visual flag drawn around the focused widget
    pub visual_active: bool,
}

impl WidgetSlot {
    fn new(boundary: FaultBoundary) -> Self {
        Self {
            boundary,
            attach: None,
            visual_active: false,
        }
    }

    pub fn id(&self) -> WidgetId {
        self.boundary.id()
    }
}

/// A widget taken out of a workspace
///
/// The widget has already been disposed; the handle is returned so the
/// caller can detach it from the visual tree.
#[derive(Debug)]
pub struct RemovedWidget {
    pub boundary: FaultBoundary,
    pub attach: Option<AttachHandle>,
    pub was_focused: bool,
    /// Nearest focusable neighbour, for callers that want to retarget focus
    pub successor: Option<WidgetId>,
}

/// Workspace
///
/// Slot order is navigation order. `focused` is either `None` or names a
/// slot currently in `slots`.
#[derive(Debug)]
pub struct Workspace {
    index: usize,
    name: String,
    slots: Vec<WidgetSlot>,
    focused: Option<WidgetId>,
    active: bool,
}

impl Workspace {
    /// Creates an empty, inactive workspace
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            slots: Vec::new(),
            focused: None,
            active: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current focus owner
    pub fn focused(&self) -> Option<WidgetId> {
        self.focused
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: WidgetId) -> bool {
        self.position(id).is_some()
    }

    /// Widget IDs in navigation order
    pub fn widget_ids(&self) -> Vec<WidgetId> {
        self.slots.iter().map(WidgetSlot::id).collect()
    }

    pub fn slots(&self) -> impl Iterator<Item = &WidgetSlot> {
        self.slots.iter()
    }

    pub fn slot(&self, id: WidgetId) -> Option<&WidgetSlot> {
        self.slots.iter().find(|s| s.id() == id)
    }

    pub fn slot_mut(&mut self, id: WidgetId) -> Option<&mut WidgetSlot> {
        self.slots.iter_mut().find(|s| s.id() == id)
    }

    /// Adds a widget at the end of the navigation order
    ///
    /// The widget is initialized, then deactivated if the workspace is not
    /// showing. A failing widget is still added, in its faulted state.
    pub fn add_widget(&mut self, widget: Box<dyn Widget>) -> Result<(WidgetId, LifecycleOutcome), WorkspaceError> {
        let id = widget.id();
        if self.contains(id) {
            return Err(WorkspaceError::DuplicateWidget(id));
        }

        let mut boundary = FaultBoundary::new(widget);
        let mut outcome = boundary.safe_initialize();
        if outcome.is_completed() && !self.active {
            outcome = boundary.safe_deactivate();
        }
        self.slots.push(WidgetSlot::new(boundary));
        Ok((id, outcome))
    }

    /// Records the visual-tree attachment of a widget
    pub fn set_attach_handle(&mut self, id: WidgetId, handle: AttachHandle) -> Result<(), WorkspaceError> {
        let slot = self.slot_mut(id).ok_or(WorkspaceError::WidgetNotFound(id))?;
        slot.attach = Some(handle);
        Ok(())
    }

    pub fn attach_handle(&self, id: WidgetId) -> Option<AttachHandle> {
        self.slot(id).and_then(|s| s.attach)
    }

    /// Disposes and removes a widget
    ///
    /// Dispose runs while the widget is still listed; the focus pointer is
    /// cleared in the same call if it named the widget.
    pub fn remove_widget(&mut self, id: WidgetId) -> Result<RemovedWidget, WorkspaceError> {
        let pos = self.position(id).ok_or(WorkspaceError::WidgetNotFound(id))?;

        self.slots[pos].visual_active = false;
        self.slots[pos].boundary.safe_dispose();

        let successor = self.neighbour_of(pos);
        let slot = self.slots.remove(pos);
        let was_focused = self.focused == Some(id);
        if was_focused {
            self.focused = None;
        }

        Ok(RemovedWidget {
            boundary: slot.boundary,
            attach: slot.attach,
            was_focused,
            successor,
        })
    }

    /// Sets the focus owner pointer
    ///
    /// The target must be in this workspace and able to take focus. Returns
    /// the previous owner.
    pub fn set_focus_owner(&mut self, id: Option<WidgetId>) -> Result<Option<WidgetId>, WorkspaceError> {
        if let Some(id) = id {
            let slot = self.slot(id).ok_or(WorkspaceError::WidgetNotFound(id))?;
            if !slot.boundary.can_receive_focus() {
                return Err(WorkspaceError::NotFocusable(id));
            }
        }
        Ok(std::mem::replace(&mut self.focused, id))
    }

    /// Checks if a widget is present and able to take focus
    pub fn can_focus(&self, id: WidgetId) -> bool {
        self.slot(id)
            .map(|s| s.boundary.can_receive_focus())
            .unwrap_or(false)
    }

    /// Widgets that may receive focus, in navigation order
    pub fn focusable_widgets(&self) -> Vec<WidgetId> {
        self.slots
            .iter()
            .filter(|s| s.boundary.can_receive_focus())
            .map(WidgetSlot::id)
            .collect()
    }

    /// The focusable widget after the current owner, wrapping around
    pub fn next_focus_candidate(&self) -> Option<WidgetId> {
        self.step_focus(true)
    }

    /// The focusable widget before the current owner, wrapping around
    pub fn previous_focus_candidate(&self) -> Option<WidgetId> {
        self.step_focus(false)
    }

    /// Sets the visual "active" flag; returns the previous value
    pub fn set_visual_active(&mut self, id: WidgetId, active: bool) -> bool {
        match self.slot_mut(id) {
            Some(slot) => std::mem::replace(&mut slot.visual_active, active),
            None => false,
        }
    }

    pub fn is_visual_active(&self, id: WidgetId) -> bool {
        self.slot(id).map(|s| s.visual_active).unwrap_or(false)
    }

    /// Activates every widget; each one is isolated from the others
    ///
    /// If the focus owner faults here its pointer is cleared.
    pub fn activate(&mut self) -> Vec<(WidgetId, LifecycleOutcome)> {
        self.active = true;
        let outcomes: Vec<_> = self
            .slots
            .iter_mut()
            .map(|slot| (slot.id(), slot.boundary.safe_activate()))
            .collect();
        self.drop_unfocusable_owner();
        outcomes
    }

    /// Deactivates every widget; state is preserved and the pointer kept
    pub fn deactivate(&mut self) -> Vec<(WidgetId, LifecycleOutcome)> {
        self.active = false;
        let outcomes: Vec<_> = self
            .slots
            .iter_mut()
            .map(|slot| {
                slot.visual_active = false;
                (slot.id(), slot.boundary.safe_deactivate())
            })
            .collect();
        self.drop_unfocusable_owner();
        outcomes
    }

    /// Re-runs initialization of a faulted widget
    pub fn recover_widget(&mut self, id: WidgetId) -> Result<LifecycleOutcome, WorkspaceError> {
        let active = self.active;
        let slot = self.slot_mut(id).ok_or(WorkspaceError::WidgetNotFound(id))?;
        let mut outcome = slot.boundary.recover();
        if outcome.is_completed() && !active {
            outcome = slot.boundary.safe_deactivate();
        }
        Ok(outcome)
    }

    /// Disposes every widget once and empties the workspace
    pub fn dispose_all(&mut self) -> Vec<FaultBoundary> {
        self.focused = None;
        self.slots
            .drain(..)
            .map(|mut slot| {
                slot.boundary.safe_dispose();
                slot.boundary
            })
            .collect()
    }

    /// Clears the pointer if its widget can no longer hold focus
    pub fn drop_unfocusable_owner(&mut self) -> Option<WidgetId> {
        let owner = self.focused?;
        if self.can_focus(owner) {
            return None;
        }
        if let Some(slot) = self.slot_mut(owner) {
            slot.visual_active = false;
        }
        self.focused = None;
        Some(owner)
    }

    fn position(&self, id: WidgetId) -> Option<usize> {
        self.slots.iter().position(|s| s.id() == id)
    }

    fn neighbour_of(&self, pos: usize) -> Option<WidgetId> {
        let after = self.slots[pos + 1..]
            .iter()
            .find(|s| s.boundary.can_receive_focus());
        let before = self.slots[..pos]
            .iter()
            .rev()
            .find(|s| s.boundary.can_receive_focus());
        after.or(before).map(WidgetSlot::id)
    }

    fn step_focus(&self, forward: bool) -> Option<WidgetId> {
        let candidates = self.focusable_widgets();
        if candidates.is_empty() {
            return None;
        }
        let current = self
            .focused
            .and_then(|id| candidates.iter().position(|c| *c == id));
        let next = match (current, forward) {
            (Some(i), true) => (i + 1) % candidates.len(),
            (Some(i), false) => (i + candidates.len() - 1) % candidates.len(),
            (None, true) => 0,
            (None, false) => candidates.len() - 1,
        };
        Some(candidates[next])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle::WidgetError;
    use lifecycle::LifecycleState;

    struct Probe {
        id: WidgetId,
        fail_activate: bool,
    }

    impl Widget for Probe {
        fn id(&self) -> WidgetId {
            self.id
        }
        fn name(&self) -> &str {
            "probe"
        }
        fn initialize(&mut self) -> Result<(), WidgetError> {
            Ok(())
        }
        fn activate(&mut self) -> Result<(), WidgetError> {
            if self.fail_activate {
                Err(WidgetError::failed("activate refused"))
            } else {
                Ok(())
            }
        }
    }

    fn probe(raw: u64) -> Box<dyn Widget> {
        Box::new(Probe {
            id: WidgetId::from_raw(raw),
            fail_activate: false,
        })
    }

    fn id(raw: u64) -> WidgetId {
        WidgetId::from_raw(raw)
    }

    fn workspace_with(ids: &[u64]) -> Workspace {
        let mut ws = Workspace::new(0, "main");
        ws.activate();
        for raw in ids {
            ws.add_widget(probe(*raw)).unwrap();
        }
        ws
    }

    #[test]
    fn test_add_widget_initializes() {
        let ws = workspace_with(&[1]);
        assert_eq!(ws.slot(id(1)).unwrap().boundary.state(), LifecycleState::Active);
    }

    #[test]
    fn test_add_to_inactive_workspace_deactivates() {
        let mut ws = Workspace::new(1, "side");
        ws.add_widget(probe(1)).unwrap();
        assert_eq!(ws.slot(id(1)).unwrap().boundary.state(), LifecycleState::Inactive);
    }

    #[test]
    fn test_duplicate_widget_rejected() {
        let mut ws = workspace_with(&[1]);
        assert!(matches!(
            ws.add_widget(probe(1)),
            Err(WorkspaceError::DuplicateWidget(_))
        ));
    }

    #[test]
    fn test_remove_focused_clears_pointer() {
        let mut ws = workspace_with(&[1, 2]);
        ws.set_focus_owner(Some(id(2))).unwrap();

        let removed = ws.remove_widget(id(2)).unwrap();
        assert!(removed.was_focused);
        assert!(removed.boundary.is_disposed());
        assert_eq!(removed.successor, Some(id(1)));
        assert_eq!(ws.focused(), None);
        assert_eq!(ws.widget_ids(), vec![id(1)]);
    }

    #[test]
    fn test_remove_unfocused_keeps_pointer() {
        let mut ws = workspace_with(&[1, 2, 3]);
        ws.set_focus_owner(Some(id(1))).unwrap();
        let removed = ws.remove_widget(id(2)).unwrap();
        assert!(!removed.was_focused);
        assert_eq!(removed.successor, Some(id(3)));
        assert_eq!(ws.focused(), Some(id(1)));
    }

    #[test]
    fn test_focus_owner_must_be_present() {
        let mut ws = workspace_with(&[1]);
        assert_eq!(
            ws.set_focus_owner(Some(id(7))),
            Err(WorkspaceError::WidgetNotFound(id(7)))
        );
        assert_eq!(ws.set_focus_owner(Some(id(1))), Ok(None));
        assert_eq!(ws.set_focus_owner(None), Ok(Some(id(1))));
    }

    #[test]
    fn test_faulted_widget_not_focusable() {
        let mut ws = Workspace::new(0, "main");
        ws.add_widget(probe(1)).unwrap();
        ws.add_widget(Box::new(Probe {
            id: id(2),
            fail_activate: true,
        }))
        .unwrap();
        ws.add_widget(probe(3)).unwrap();

        let outcomes = ws.activate();
        assert_eq!(outcomes[1], (id(2), LifecycleOutcome::Faulted));
        assert_eq!(ws.focusable_widgets(), vec![id(1), id(3)]);
        assert_eq!(
            ws.set_focus_owner(Some(id(2))),
            Err(WorkspaceError::NotFocusable(id(2)))
        );
    }

    #[test]
    fn test_focused_widget_faulting_on_activate_clears_pointer() {
        let mut ws = Workspace::new(0, "main");
        ws.add_widget(Box::new(Probe {
            id: id(1),
            fail_activate: true,
        }))
        .unwrap();
        // Inactive widgets can hold the pointer
        ws.set_focus_owner(Some(id(1))).unwrap();

        ws.activate();
        assert_eq!(ws.focused(), None);
    }

    #[test]
    fn test_focus_candidates_wrap() {
        let mut ws = workspace_with(&[1, 2, 3]);
        assert_eq!(ws.next_focus_candidate(), Some(id(1)));
        assert_eq!(ws.previous_focus_candidate(), Some(id(3)));

        ws.set_focus_owner(Some(id(3))).unwrap();
        assert_eq!(ws.next_focus_candidate(), Some(id(1)));
        assert_eq!(ws.previous_focus_candidate(), Some(id(2)));
    }

    #[test]
    fn test_deactivate_keeps_pointer_and_clears_visual_flag() {
        let mut ws = workspace_with(&[1]);
        ws.set_focus_owner(Some(id(1))).unwrap();
        ws.set_visual_active(id(1), true);

        ws.deactivate();
        assert_eq!(ws.focused(), Some(id(1)));
        assert!(!ws.is_visual_active(id(1)));
        assert_eq!(ws.slot(id(1)).unwrap().boundary.state(), LifecycleState::Inactive);
    }

    #[test]
    fn test_dispose_all() {
        let mut ws = workspace_with(&[1, 2]);
        ws.set_focus_owner(Some(id(1))).unwrap();
        let disposed = ws.dispose_all();
        assert_eq!(disposed.len(), 2);
        assert!(disposed.iter().all(FaultBoundary::is_disposed));
        assert!(ws.is_empty());
        assert_eq!(ws.focused(), None);
    }
}
