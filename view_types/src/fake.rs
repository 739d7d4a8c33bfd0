//! Fake visual tree for testing
//!
//! A deterministic, in-memory [`VisualTree`] that can simulate slow
//! attachment, refused focus requests, and elements dying between calls.

use crate::{AttachHandle, AttachedCallback, VisualTree};
use core_types::{ContainerId, ElementId, WidgetId};
use std::collections::HashMap;

struct FakeNode {
    widget: WidgetId,
    attached: bool,
    refusals: u32,
    callbacks: Vec<AttachedCallback>,
}

struct FakeElement {
    containers: Vec<ContainerId>,
    focusable: bool,
}

/// Fake visual tree
///
/// Attachments complete immediately unless deferred attachment is enabled,
/// in which case tests call [`FakeVisualTree::complete_attach`].
pub struct FakeVisualTree {
    nodes: HashMap<AttachHandle, FakeNode>,
    elements: HashMap<ElementId, FakeElement>,
    /// Element registration order, for deterministic descendant search
    order: Vec<ElementId>,
    container_elements: HashMap<ContainerId, ElementId>,
    focused: Option<ElementId>,
    focus_events: Vec<ElementId>,
    focus_requests: Vec<WidgetId>,
    defer_attach: bool,
    next_handle: u64,
}

impl FakeVisualTree {
    /// Creates an empty tree with immediate attachment
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            elements: HashMap::new(),
            order: Vec::new(),
            container_elements: HashMap::new(),
            focused: None,
            focus_events: Vec::new(),
            focus_requests: Vec::new(),
            defer_attach: false,
            next_handle: 1,
        }
    }

    /// New attachments stay pending until `complete_attach`
    pub fn set_attach_deferred(&mut self, deferred: bool) {
        self.defer_attach = deferred;
    }

    /// Completes a pending attachment and fires its callbacks
    pub fn complete_attach(&mut self, handle: AttachHandle) {
        let callbacks = match self.nodes.get_mut(&handle) {
            Some(node) if !node.attached => {
                node.attached = true;
                std::mem::take(&mut node.callbacks)
            }
            _ => return,
        };
        for callback in callbacks {
            callback(handle);
        }
    }

    /// The next `times` focus requests for this handle are refused
    pub fn refuse_focus(&mut self, handle: AttachHandle, times: u32) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.refusals = times;
        }
    }

    /// Registers an element inside a widget
    pub fn add_element(&mut self, element: ElementId, focusable: bool) {
        let mut containers = Vec::new();
        if let Some(widget) = element.widget {
            if let Some(host) = self.host_of(widget) {
                containers.push(host);
            }
            containers.push(ContainerId::Widget(widget));
        }
        self.insert_element(element, containers, focusable);
    }

    /// Registers a chrome element that represents a container
    pub fn add_container_element(&mut self, container: ContainerId, element: ElementId) {
        self.insert_element(element.clone(), vec![container], true);
        self.container_elements.insert(container, element);
    }

    /// Removes an element; later lookups see it as dead
    pub fn remove_element(&mut self, element: &ElementId) {
        self.elements.remove(element);
        self.order.retain(|e| e != element);
        if self.focused.as_ref() == Some(element) {
            self.focused = None;
        }
    }

    /// Simulates the user clicking into an element
    pub fn user_focus(&mut self, element: &ElementId) -> bool {
        self.focus_element(element)
    }

    /// Simulates focus leaving to something outside the shell
    pub fn steal_focus(&mut self) {
        self.focused = None;
    }

    /// Currently focused element
    pub fn focused_element(&self) -> Option<&ElementId> {
        self.focused.as_ref()
    }

    /// Widgets that were asked for input focus, in order
    pub fn focus_requests(&self) -> &[WidgetId] {
        &self.focus_requests
    }

    /// Handle for a widget, if attached (or attaching)
    pub fn handle_of(&self, widget: WidgetId) -> Option<AttachHandle> {
        let mut handles: Vec<_> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.widget == widget)
            .map(|(handle, _)| *handle)
            .collect();
        handles.sort_by_key(|h| h.as_u64());
        handles.pop()
    }

    fn host_of(&self, widget: WidgetId) -> Option<ContainerId> {
        self.elements
            .get(&ElementId::root(widget))
            .and_then(|e| e.containers.first().copied())
    }

    fn insert_element(&mut self, element: ElementId, containers: Vec<ContainerId>, focusable: bool) {
        if !self.elements.contains_key(&element) {
            self.order.push(element.clone());
        }
        self.elements.insert(
            element,
            FakeElement {
                containers,
                focusable,
            },
        );
    }

    fn widget_attached(&self, widget: WidgetId) -> bool {
        self.nodes
            .values()
            .any(|node| node.widget == widget && node.attached)
    }

    fn set_focused(&mut self, element: ElementId) {
        if self.focused.as_ref() != Some(&element) {
            self.focus_events.push(element.clone());
        }
        self.focused = Some(element);
    }
}

impl Default for FakeVisualTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualTree for FakeVisualTree {
    fn attach(&mut self, widget: WidgetId, host: ContainerId) -> AttachHandle {
        let handle = AttachHandle::from_raw(self.next_handle);
        self.next_handle += 1;
        self.nodes.insert(
            handle,
            FakeNode {
                widget,
                attached: !self.defer_attach,
                refusals: 0,
                callbacks: Vec::new(),
            },
        );
        self.insert_element(
            ElementId::root(widget),
            vec![host, ContainerId::Widget(widget)],
            true,
        );
        handle
    }

    fn detach(&mut self, handle: AttachHandle) {
        let Some(node) = self.nodes.remove(&handle) else {
            return;
        };
        let dead: Vec<ElementId> = self
            .order
            .iter()
            .filter(|e| e.widget == Some(node.widget))
            .cloned()
            .collect();
        for element in dead {
            self.remove_element(&element);
        }
    }

    fn is_attached(&self, handle: AttachHandle) -> bool {
        self.nodes.get(&handle).map(|n| n.attached).unwrap_or(false)
    }

    fn on_attached(&mut self, handle: AttachHandle, callback: AttachedCallback) {
        match self.nodes.get_mut(&handle) {
            Some(node) if node.attached => callback(handle),
            Some(node) => node.callbacks.push(callback),
            None => {}
        }
    }

    fn request_input_focus(&mut self, handle: AttachHandle) -> bool {
        let widget = match self.nodes.get_mut(&handle) {
            Some(node) if node.attached => {
                if node.refusals > 0 {
                    node.refusals -= 1;
                    return false;
                }
                node.widget
            }
            _ => return false,
        };
        self.focus_requests.push(widget);

        // Keep focus on an inner element if it is already there
        let target = match &self.focused {
            Some(current) if current.widget == Some(widget) => current.clone(),
            _ => ElementId::root(widget),
        };
        self.set_focused(target);
        true
    }

    fn has_input_focus_within(&self, handle: AttachHandle) -> bool {
        match (self.nodes.get(&handle), &self.focused) {
            (Some(node), Some(focused)) => focused.widget == Some(node.widget),
            _ => false,
        }
    }

    fn is_element_alive(&self, element: &ElementId) -> bool {
        self.elements.contains_key(element)
    }

    fn focus_element(&mut self, element: &ElementId) -> bool {
        let focusable = self
            .elements
            .get(element)
            .map(|e| e.focusable)
            .unwrap_or(false);
        if !focusable {
            return false;
        }
        if let Some(widget) = element.widget {
            if !self.widget_attached(widget) {
                return false;
            }
        }
        self.set_focused(element.clone());
        true
    }

    fn first_focusable_descendant(&self, container: ContainerId) -> Option<ElementId> {
        self.order
            .iter()
            .filter(|id| self.container_elements.get(&container) != Some(*id))
            .find(|id| {
                self.elements
                    .get(*id)
                    .map(|e| e.focusable && e.containers.contains(&container))
                    .unwrap_or(false)
                    && id.widget.map(|w| self.widget_attached(w)).unwrap_or(true)
            })
            .cloned()
    }

    fn container_element(&self, container: ContainerId) -> Option<ElementId> {
        match container {
            ContainerId::Widget(widget) => {
                let root = ElementId::root(widget);
                self.elements.contains_key(&root).then_some(root)
            }
            ContainerId::Workspace(_) => self
                .container_elements
                .get(&container)
                .filter(|e| self.elements.contains_key(*e))
                .cloned(),
        }
    }

    fn drain_focus_events(&mut self) -> Vec<ElementId> {
        std::mem::take(&mut self.focus_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn widget(raw: u64) -> WidgetId {
        WidgetId::from_raw(raw)
    }

    #[test]
    fn test_attach_and_focus() {
        let mut tree = FakeVisualTree::new();
        let handle = tree.attach(widget(1), ContainerId::Workspace(0));

        assert!(tree.is_attached(handle));
        assert!(tree.request_input_focus(handle));
        assert!(tree.has_input_focus_within(handle));
        assert_eq!(tree.focused_element(), Some(&ElementId::root(widget(1))));
        assert_eq!(tree.drain_focus_events(), vec![ElementId::root(widget(1))]);
        assert!(tree.drain_focus_events().is_empty());
    }

    #[test]
    fn test_deferred_attach_fires_callback() {
        let mut tree = FakeVisualTree::new();
        tree.set_attach_deferred(true);
        let handle = tree.attach(widget(1), ContainerId::Workspace(0));
        assert!(!tree.is_attached(handle));
        assert!(!tree.request_input_focus(handle));

        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        tree.on_attached(handle, Box::new(move |_| flag.set(true)));
        assert!(!fired.get());

        tree.complete_attach(handle);
        assert!(fired.get());
        assert!(tree.is_attached(handle));
    }

    #[test]
    fn test_on_attached_fires_immediately_when_attached() {
        let mut tree = FakeVisualTree::new();
        let handle = tree.attach(widget(1), ContainerId::Workspace(0));
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        tree.on_attached(handle, Box::new(move |_| flag.set(true)));
        assert!(fired.get());
    }

    #[test]
    fn test_refused_focus() {
        let mut tree = FakeVisualTree::new();
        let handle = tree.attach(widget(1), ContainerId::Workspace(0));
        tree.refuse_focus(handle, 1);
        assert!(!tree.request_input_focus(handle));
        assert!(tree.request_input_focus(handle));
    }

    #[test]
    fn test_detach_kills_elements() {
        let mut tree = FakeVisualTree::new();
        let handle = tree.attach(widget(1), ContainerId::Workspace(0));
        let inner = ElementId::part(widget(1), "input");
        tree.add_element(inner.clone(), true);
        assert!(tree.focus_element(&inner));

        tree.detach(handle);
        assert!(!tree.is_element_alive(&inner));
        assert!(tree.focused_element().is_none());
        assert!(!tree.focus_element(&inner));
    }

    #[test]
    fn test_request_focus_keeps_inner_element() {
        let mut tree = FakeVisualTree::new();
        let handle = tree.attach(widget(1), ContainerId::Workspace(0));
        let inner = ElementId::part(widget(1), "input");
        tree.add_element(inner.clone(), true);
        tree.user_focus(&inner);

        assert!(tree.request_input_focus(handle));
        assert_eq!(tree.focused_element(), Some(&inner));
    }

    #[test]
    fn test_first_focusable_descendant_skips_unfocusable() {
        let mut tree = FakeVisualTree::new();
        let workspace = ContainerId::Workspace(0);
        tree.add_container_element(workspace, ElementId::chrome("ws-0"));
        tree.attach(widget(1), workspace);
        tree.add_element(ElementId::part(widget(1), "label"), false);

        assert_eq!(
            tree.first_focusable_descendant(workspace),
            Some(ElementId::root(widget(1)))
        );
        assert_eq!(
            tree.first_focusable_descendant(ContainerId::Widget(widget(1))),
            Some(ElementId::root(widget(1)))
        );
        assert_eq!(
            tree.container_element(workspace),
            Some(ElementId::chrome("ws-0"))
        );
    }
}
