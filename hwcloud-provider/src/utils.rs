//! Helpers shared by the resource handlers

use std::collections::HashMap;
use std::time::Duration;

use hwcloud_core::resource::{Resource, Value};
use hwcloud_core::schema::ResourceSchema;
use hwcloud_core::wait::parse_duration;
use serde_json::{Value as JsonValue, json};

/// Fallback when neither configuration nor schema names a timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    fn key(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Timeout of an operation: the `timeouts` block first, then the schema default
pub fn operation_timeout(
    attributes: &HashMap<String, Value>,
    schema: &ResourceSchema,
    operation: Operation,
) -> Duration {
    let configured = attributes
        .get("timeouts")
        .and_then(Value::as_map)
        .and_then(|m| m.get(operation.key()))
        .and_then(Value::as_str)
        .and_then(parse_duration);
    let default = match operation {
        Operation::Create => schema.timeouts.create,
        Operation::Update => schema.timeouts.update,
        Operation::Delete => schema.timeouts.delete,
    };
    configured.or(default).unwrap_or(DEFAULT_TIMEOUT)
}

/// Region of a resource, falling back to the provider region
pub fn get_region(attributes: &HashMap<String, Value>, provider_region: &str) -> String {
    attributes
        .get("region")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .unwrap_or(provider_region)
        .to_string()
}

/// Enterprise project of a resource, falling back to the provider setting
pub fn get_enterprise_project_id(resource: &Resource, provider_default: Option<&str>) -> Option<String> {
    resource
        .get_str("enterprise_project_id")
        .or(provider_default)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `tags` map to `[{"key": .., "value": ..}]`
pub fn expand_tags(tags: Option<&Value>) -> Vec<JsonValue> {
    let Some(Value::Map(map)) = tags else {
        return Vec::new();
    };
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| {
            let value = match &map[k] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            json!({ "key": k, "value": value })
        })
        .collect()
}

/// `[{"key": .., "value": ..}]` back to a tags map
pub fn flatten_tags(tags: &[JsonValue]) -> HashMap<String, Value> {
    tags.iter()
        .filter_map(|tag| {
            let key = tag.get("key")?.as_str()?;
            let value = tag.get("value").and_then(JsonValue::as_str).unwrap_or_default();
            Some((key.to_string(), Value::String(value.to_string())))
        })
        .collect()
}

/// Tags to remove and tags to add when moving from `old` to `new`
pub fn diff_tags(old: Option<&Value>, new: Option<&Value>) -> (Vec<JsonValue>, Vec<JsonValue>) {
    let empty = HashMap::new();
    let old_map = old.and_then(Value::as_map).unwrap_or(&empty);
    let new_map = new.and_then(Value::as_map).unwrap_or(&empty);

    let removed: HashMap<String, Value> = old_map
        .iter()
        .filter(|(k, v)| new_map.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let added: HashMap<String, Value> = new_map
        .iter()
        .filter(|(k, v)| old_map.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    (
        expand_tags(Some(&Value::Map(removed))),
        expand_tags(Some(&Value::Map(added))),
    )
}

/// Copy a JSON field into the attribute map when present
pub fn set_attr(attributes: &mut HashMap<String, Value>, name: &str, value: Option<&JsonValue>) {
    if let Some(v) = value.and_then(Value::from_json) {
        attributes.insert(name.to_string(), v);
    }
}

/// String field of a JSON object, treating empty strings as absent
pub fn json_str<'a>(value: &'a JsonValue, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
}
