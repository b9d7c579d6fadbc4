//! Maps upstream event objects onto the fixed fixture column set.

use courtside_core::FixtureEvent;
use serde_json::Value as JsonValue;

/// Column that records the player filter instead of an upstream key.
pub const PROVENANCE_COLUMN: &str = "results_for_player_key";

/// Normalize one upstream event. Keys missing from `event` (or a non-object
/// `event`) become absent values.
pub fn normalize_event(event: &JsonValue, player_key: Option<&str>) -> FixtureEvent {
    FixtureEvent::from_fn(|column| {
        if column == PROVENANCE_COLUMN {
            player_key.map(str::to_string)
        } else {
            column_text(event.get(column))
        }
    })
}

pub fn normalize_events(events: &[JsonValue], player_key: Option<&str>) -> Vec<FixtureEvent> {
    events
        .iter()
        .map(|event| normalize_event(event, player_key))
        .collect()
}

/// Scalars keep their JSON text; nested values are stored as compact JSON.
fn column_text(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtside_core::FIXTURE_COLUMNS;
    use serde_json::json;

    #[test]
    fn maps_known_keys_and_nulls_missing_ones() {
        let event = json!({
            "event_key": 11970216,
            "event_date": "2026-01-18",
            "event_time": "10:00",
            "event_first_player": "J. Sinner",
            "first_player_key": 1905,
            "event_second_player": "C. Alcaraz",
            "event_live": "0",
            "event_type_type": "Atp Singles",
        });

        let row = normalize_event(&event, None);
        assert_eq!(row.event_key.as_deref(), Some("11970216"));
        assert_eq!(row.first_player_key.as_deref(), Some("1905"));
        assert_eq!(row.event_type_type.as_deref(), Some("Atp Singles"));
        assert_eq!(row.event_winner, None);
        assert_eq!(row.results_for_player_key, None);
        assert_eq!(row.values().len(), FIXTURE_COLUMNS.len());
    }

    #[test]
    fn present_but_empty_differs_from_absent() {
        let row = normalize_event(&json!({"event_final_result": "", "event_winner": null}), None);
        assert_eq!(row.event_final_result.as_deref(), Some(""));
        assert_eq!(row.event_winner, None);
    }

    #[test]
    fn player_filter_is_attached_to_every_row() {
        let events = vec![json!({"event_key": 1}), json!({"event_key": 2})];
        let rows = normalize_events(&events, Some("1905"));
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|r| r.results_for_player_key.as_deref() == Some("1905")));
    }

    #[test]
    fn upstream_provenance_key_is_ignored() {
        let row = normalize_event(&json!({"results_for_player_key": "spoofed"}), Some("7"));
        assert_eq!(row.results_for_player_key.as_deref(), Some("7"));
    }

    #[test]
    fn nested_values_and_non_objects() {
        let row = normalize_event(&json!({"event_serve": ["First Player"], "event_live": true}), None);
        assert_eq!(row.event_serve.as_deref(), Some("[\"First Player\"]"));
        assert_eq!(row.event_live.as_deref(), Some("true"));

        let row = normalize_event(&json!("not an object"), Some("9"));
        assert!(row.values().iter().skip(1).all(Option::is_none));
        assert_eq!(row.results_for_player_key.as_deref(), Some("9"));
    }
}
