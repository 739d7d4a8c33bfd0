//! State shared by the shell and its scheduled focus steps

use services_focus_history::FocusHistoryRecorder;
use services_focus_manager::{FocusCoordinator, FocusHost, FocusParts};
use services_workspace_manager::WorkspaceManager;
use view_types::VisualTree;

/// Everything a scheduled continuation may touch
///
/// The dispatcher hands this to each step; nothing else holds it.
pub struct ShellCore<T: VisualTree + 'static> {
    pub workspaces: WorkspaceManager,
    pub tree: T,
    pub history: FocusHistoryRecorder,
    pub coordinator: FocusCoordinator,
}

impl<T: VisualTree + 'static> ShellCore<T> {
    pub fn new(tree: T, history: FocusHistoryRecorder) -> Self {
        Self {
            workspaces: WorkspaceManager::new(),
            tree,
            history,
            coordinator: FocusCoordinator::new(),
        }
    }
}

impl<T: VisualTree + 'static> FocusHost for ShellCore<T> {
    fn focus_parts(&mut self) -> FocusParts<'_> {
        FocusParts {
            workspaces: &mut self.workspaces,
            tree: &mut self.tree,
            history: &mut self.history,
            coordinator: &mut self.coordinator,
        }
    }
}
