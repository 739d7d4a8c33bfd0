//! Widget factories keyed by kind
//!
//! Startup re-creates persisted widgets from their `widgetType`, handing the
//! factory the persisted id so state records still match.

use core_types::WidgetId;
use lifecycle::Widget;
use std::collections::BTreeMap;

/// Builds a widget with a given id
pub type WidgetFactory = Box<dyn Fn(WidgetId) -> Box<dyn Widget>>;

/// Registry of widget factories
#[derive(Default)]
pub struct WidgetFactoryRegistry {
    factories: BTreeMap<String, WidgetFactory>,
}

impl WidgetFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any earlier one for the same kind
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> bool
    where
        F: Fn(WidgetId) -> Box<dyn Widget> + 'static,
    {
        self.factories
            .insert(kind.into(), Box::new(factory))
            .is_some()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Creates a widget of the given kind
    pub fn create(&self, kind: &str, id: WidgetId) -> Option<Box<dyn Widget>> {
        self.factories.get(kind).map(|factory| factory(id))
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for WidgetFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetFactoryRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle::WidgetError;

    struct Note {
        id: WidgetId,
    }

    impl Widget for Note {
        fn id(&self) -> WidgetId {
            self.id
        }
        fn name(&self) -> &str {
            "Note"
        }
        fn kind(&self) -> &str {
            "note"
        }
        fn initialize(&mut self) -> Result<(), WidgetError> {
            Ok(())
        }
    }

    #[test]
    fn test_create_uses_given_id() {
        let mut registry = WidgetFactoryRegistry::new();
        assert!(!registry.register("note", |id| Box::new(Note { id })));

        let widget = registry.create("note", WidgetId::from_raw(9)).unwrap();
        assert_eq!(widget.id(), WidgetId::from_raw(9));
        assert_eq!(widget.kind(), "note");
        assert!(registry.create("clock", WidgetId::from_raw(1)).is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = WidgetFactoryRegistry::new();
        registry.register("note", |id| Box::new(Note { id }));
        assert!(registry.register("note", |id| Box::new(Note { id })));
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["note"]);
        assert!(registry.contains("note"));
    }
}
