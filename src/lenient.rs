// Tolerant field deserializers for documents written by other systems.
//
// A leaf of the wrong JSON type reads as `None`, and a list element that
// doesn't fit its type is logged and dropped. One odd value never costs the
// surrounding document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// A string leaf. Any other JSON type reads as `None`.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// A string leaf that defaults to empty when absent, null or mistyped.
pub fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string(deserializer)?.unwrap_or_default())
}

/// A nested object. A value that doesn't fit `T` reads as `None`.
pub fn opt_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(parse_element))
}

/// An array parsed element by element. `null` and unfit elements become
/// `None` slots; a non-array value reads as no list at all.
pub fn opt_slots<'de, D, T>(deserializer: D) -> Result<Option<Vec<Option<T>>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Ok(Some(items.into_iter().map(parse_element).collect())),
        Some(Value::Null) | None => Ok(None),
        Some(other) => {
            warn!(found = json_type(&other), "Expected a list, ignoring field");
            Ok(None)
        }
    }
}

/// Like [`opt_slots`] with the empty slots removed.
pub fn opt_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(opt_slots(deserializer)?.map(|slots| slots.into_iter().flatten().collect()))
}

/// Like [`opt_list`], defaulting to an empty list.
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(opt_list(deserializer)?.unwrap_or_default())
}

fn parse_element<T: DeserializeOwned>(value: Value) -> Option<T> {
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!(kind = short_type_name::<T>(), error = %e, "Dropping malformed element");
            None
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Entry {
        id: String,
        #[serde(default, deserialize_with = "opt_string")]
        label: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "opt_slots")]
        slots: Option<Vec<Option<Entry>>>,
        #[serde(default, deserialize_with = "list")]
        items: Vec<Entry>,
        #[serde(default, deserialize_with = "string_or_empty")]
        name: String,
        #[serde(default, deserialize_with = "opt_object")]
        nested: Option<Entry>,
    }

    #[test]
    fn test_mistyped_leaves_read_as_none() {
        let entry: Entry = serde_json::from_str(r#"{"id": "x", "label": {"en": "y"}}"#).unwrap();
        assert_eq!(entry.id, "x");
        assert!(entry.label.is_none());

        let holder: Holder = serde_json::from_str(r#"{"name": null, "nested": 7}"#).unwrap();
        assert_eq!(holder.name, "");
        assert!(holder.nested.is_none());
        assert!(holder.slots.is_none());
        assert!(holder.items.is_empty());
    }

    #[test]
    fn test_bad_elements_are_dropped_individually() {
        let holder: Holder = serde_json::from_str(
            r#"{
                "slots": [{"id": "a"}, null, {"label": "no id"}, "junk"],
                "items": [{"id": "b", "label": 3}, {"id": null}, {"id": "c"}]
            }"#,
        )
        .unwrap();

        let slots = holder.slots.unwrap();
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[0].as_ref().unwrap().id, "a");
        assert!(slots[1..].iter().all(Option::is_none));

        let ids: Vec<&str> = holder.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(holder.items[0].label.is_none());
    }

    #[test]
    fn test_non_array_list_reads_as_absent() {
        let holder: Holder = serde_json::from_str(r#"{"slots": "not-a-list", "items": {"id": "z"}}"#).unwrap();
        assert!(holder.slots.is_none());
        assert!(holder.items.is_empty());
    }
}
