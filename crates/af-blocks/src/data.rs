//! Helpers for reading block data and event fields

use af_automation::{EngineError, EngineResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BlockFailure;

/// Deserialize an entry's data payload
pub(crate) fn parse<T: DeserializeOwned>(block: &str, data: &Value) -> EngineResult<T> {
    serde_json::from_value(data.clone())
        .map_err(|err| EngineError::block(BlockFailure::invalid_data(block, err)))
}

/// One value or a list of them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Single(T),
    List(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Single(item) => vec![item],
            OneOrMany::List(items) => items,
        }
    }
}

/// Look up a dotted path (`sensor.reading.0`) in event data
///
/// Numeric segments index into arrays. Returns `None` when any segment is
/// missing; a stored `null` is returned as `Some(Value::Null)`.
pub fn lookup<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(fields) => fields.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Render a JSON value as plain text for matching
pub(crate) fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> Map<String, Value> {
        match json!({
            "sensor": {"readings": [10, 20], "name": "porch"},
            "empty": null
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_lookup_paths() {
        let data = data();
        assert_eq!(lookup(&data, "sensor.name"), Some(&json!("porch")));
        assert_eq!(lookup(&data, "sensor.readings.1"), Some(&json!(20)));
        assert_eq!(lookup(&data, "empty"), Some(&Value::Null));
        assert_eq!(lookup(&data, "sensor.readings.5"), None);
        assert_eq!(lookup(&data, "sensor.name.first"), None);
        assert_eq!(lookup(&data, "missing"), None);
    }

    #[test]
    fn test_one_or_many() {
        let single: OneOrMany<String> = serde_json::from_value(json!("motion")).unwrap();
        let many: OneOrMany<String> = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(single.into_vec(), vec!["motion"]);
        assert_eq!(many.into_vec(), vec!["a", "b"]);
    }

    #[test]
    fn test_as_text() {
        assert_eq!(as_text(&json!("on")), "on");
        assert_eq!(as_text(&json!(21.5)), "21.5");
        assert_eq!(as_text(&json!(true)), "true");
    }
}
