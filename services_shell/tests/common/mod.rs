//! Shared fixtures for shell integration tests

#![allow(dead_code)]

use core_types::{ManualClock, StateMap, WidgetId};
use lifecycle::{Widget, WidgetError};
use serde_json::json;
use services_shell::{Shell, ShellConfig};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tempfile::TempDir;
use view_types::FakeVisualTree;

pub const COUNTER_KIND: &str = "counter";

/// Ordered log of lifecycle calls across all widgets, e.g. `"2 activate"`
pub type Journal = Rc<RefCell<Vec<String>>>;

/// Knobs and state of one counter widget, shared with the test
#[derive(Debug, Default)]
pub struct CounterState {
    pub count: i64,
    pub fail_activate: bool,
    pub fail_save: bool,
}

pub type SharedState = Rc<RefCell<CounterState>>;

/// Test widget holding a single integer
pub struct Counter {
    id: WidgetId,
    name: String,
    journal: Journal,
    state: SharedState,
}

impl Counter {
    fn log(&self, event: &str) {
        self.journal
            .borrow_mut()
            .push(format!("{} {}", self.id.as_u64(), event));
    }
}

impl Widget for Counter {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        COUNTER_KIND
    }

    fn initialize(&mut self) -> Result<(), WidgetError> {
        self.log("initialize");
        Ok(())
    }

    fn activate(&mut self) -> Result<(), WidgetError> {
        self.log("activate");
        if self.state.borrow().fail_activate {
            return Err(WidgetError::failed("activation refused"));
        }
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), WidgetError> {
        self.log("deactivate");
        Ok(())
    }

    fn dispose(&mut self) -> Result<(), WidgetError> {
        self.log("dispose");
        Ok(())
    }

    fn save_state(&self) -> Result<StateMap, WidgetError> {
        let state = self.state.borrow();
        if state.fail_save {
            return Err(WidgetError::failed("cannot serialize"));
        }
        let mut map = StateMap::new();
        map.insert("Count".to_string(), json!(state.count));
        Ok(map)
    }

    fn restore_state(&mut self, map: &StateMap) -> Result<(), WidgetError> {
        self.log("restore");
        let count = map
            .get("Count")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| WidgetError::failed("missing Count"))?;
        self.state.borrow_mut().count = count;
        Ok(())
    }

    fn on_focus_gained(&mut self) {
        self.log("focus_gained");
    }

    fn on_focus_lost(&mut self) {
        self.log("focus_lost");
    }
}

/// A snapshot directory plus handles on every counter created in it
pub struct Fixture {
    pub dir: TempDir,
    pub journal: Journal,
    states: Rc<RefCell<BTreeMap<WidgetId, SharedState>>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
            journal: Journal::default(),
            states: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    pub fn config(&self) -> ShellConfig {
        ShellConfig::default().in_dir(self.dir.path())
    }

    /// A shell on a fresh fake tree that can re-create counters
    pub fn shell(&self) -> Shell<FakeVisualTree> {
        self.shell_with(self.config())
    }

    pub fn shell_with(&self, config: ShellConfig) -> Shell<FakeVisualTree> {
        let mut shell = Shell::new(
            config,
            FakeVisualTree::new(),
            Box::new(ManualClock::at(1_700_000_000_000)),
        );
        let journal = self.journal.clone();
        let states = self.states.clone();
        shell.register_factory(COUNTER_KIND, move |id| {
            let state = SharedState::default();
            states.borrow_mut().insert(id, state.clone());
            Box::new(Counter {
                id,
                name: "Counter".to_string(),
                journal: journal.clone(),
                state,
            })
        });
        shell
    }

    /// Builder for `Shell::add_widget`
    pub fn counter(&self, name: &str) -> impl FnOnce(WidgetId) -> Box<dyn Widget> {
        self.counter_with(name, CounterState::default())
    }

    pub fn counter_with(
        &self,
        name: &str,
        initial: CounterState,
    ) -> impl FnOnce(WidgetId) -> Box<dyn Widget> {
        let name = name.to_string();
        let journal = self.journal.clone();
        let states = self.states.clone();
        move |id| {
            let state = Rc::new(RefCell::new(initial));
            states.borrow_mut().insert(id, state.clone());
            Box::new(Counter {
                id,
                name,
                journal,
                state,
            })
        }
    }

    pub fn state(&self, id: WidgetId) -> SharedState {
        self.states
            .borrow()
            .get(&id)
            .cloned()
            .expect("counter was created")
    }

    /// Journal entries of one widget, without the id prefix
    pub fn events(&self, id: WidgetId) -> Vec<String> {
        let prefix = format!("{} ", id.as_u64());
        self.journal
            .borrow()
            .iter()
            .filter_map(|entry| entry.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Position of an exact journal entry
    pub fn position(&self, id: WidgetId, event: &str) -> Option<usize> {
        let wanted = format!("{} {}", id.as_u64(), event);
        self.journal.borrow().iter().position(|entry| *entry == wanted)
    }

    pub fn clear_journal(&self) {
        self.journal.borrow_mut().clear();
    }
}

/// Shell with one started, empty workspace
pub fn started(fixture: &Fixture) -> Shell<FakeVisualTree> {
    let mut shell = fixture.shell();
    shell.startup().expect("fresh startup");
    shell
}
