//! Serializable widget state maps

use crate::WidgetId;
use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value state produced by `Widget::save_state`
///
/// BTreeMap keeps serialization order stable.
pub type StateMap = BTreeMap<String, Value>;

/// Reserved key carrying the stable widget identifier
pub const WIDGET_ID_KEY: &str = "widgetId";

/// Reserved key carrying the factory kind used to re-create a widget
pub const WIDGET_TYPE_KEY: &str = "widgetType";

/// Reads the reserved widget identifier from a state map
///
/// Returns `None` when the key is missing or not a non-negative integer; such
/// records are legacy and cannot be restored.
pub fn widget_id_of(state: &StateMap) -> Option<WidgetId> {
    state
        .get(WIDGET_ID_KEY)
        .and_then(Value::as_u64)
        .map(WidgetId::from_raw)
}

/// Reads the reserved widget kind from a state map
pub fn widget_type_of(state: &StateMap) -> Option<&str> {
    state.get(WIDGET_TYPE_KEY).and_then(Value::as_str)
}

/// Checks if a key is reserved for the snapshot engine
pub fn is_reserved_key(key: &str) -> bool {
    key == WIDGET_ID_KEY || key == WIDGET_TYPE_KEY
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_widget_id_of() {
        let mut state = StateMap::new();
        assert_eq!(widget_id_of(&state), None);

        state.insert(WIDGET_ID_KEY.to_string(), json!(2));
        assert_eq!(widget_id_of(&state), Some(WidgetId::from_raw(2)));
    }

    #[test]
    fn test_non_numeric_id_is_legacy() {
        let mut state = StateMap::new();
        state.insert(WIDGET_ID_KEY.to_string(), json!("Counter"));
        assert_eq!(widget_id_of(&state), None);

        state.insert(WIDGET_ID_KEY.to_string(), json!(-4));
        assert_eq!(widget_id_of(&state), None);
    }

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved_key("widgetId"));
        assert!(is_reserved_key("widgetType"));
        assert!(!is_reserved_key("Count"));
    }
}
