//! Normalization of provider response payloads.
//!
//! Providers disagree on envelope and field spelling, so decoding tries
//! a fixed, documented priority order and fails closed: a payload that
//! matches none of the known shapes is a `Client` error, never a silent
//! empty result. Individual content items are the one exception; an
//! unrecognized item is skipped rather than failing the whole response.

use serde_json::Value;
use toolgate_core::{ContentItem, ProviderError, ResourceDescriptor, ToolDescriptor};

/// Decode a `tools/list` result. Accepts `{"tools": [...]}` first, then
/// a bare array.
pub(crate) fn tool_list(response: &Value) -> Result<Vec<ToolDescriptor>, ProviderError> {
    let items = list_items(response, "tools").ok_or_else(|| unrecognized("tools", response))?;
    Ok(items.iter().map(tool_descriptor).collect())
}

/// Decode a `resources/list` result. Accepts `{"resources": [...]}`
/// first, then a bare array.
pub(crate) fn resource_list(response: &Value) -> Result<Vec<ResourceDescriptor>, ProviderError> {
    let items =
        list_items(response, "resources").ok_or_else(|| unrecognized("resources", response))?;
    Ok(items.iter().map(resource_descriptor).collect())
}

/// Normalize a content array (`content` on tool calls, `contents` on
/// resource reads). A missing or non-array value yields no items.
pub(crate) fn content_items(value: Option<&Value>) -> Vec<ContentItem> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(content_item).collect())
        .unwrap_or_default()
}

/// First text item in a content array, used as the provider's error
/// message when a call reports `isError`.
pub(crate) fn first_text(content: &[ContentItem]) -> Option<&str> {
    content.iter().find_map(|item| match item {
        ContentItem::Text { text } => Some(text.as_str()),
        ContentItem::Resource { .. } => None,
    })
}

fn list_items<'a>(response: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    if let Some(items) = response.get(key).and_then(Value::as_array) {
        return Some(items);
    }
    response.as_array()
}

fn tool_descriptor(item: &Value) -> ToolDescriptor {
    ToolDescriptor {
        name: str_field(item, "name"),
        description: str_field(item, "description"),
        // Camel-case is the wire spelling; snake_case providers exist.
        input_schema: item
            .get("inputSchema")
            .or_else(|| item.get("input_schema"))
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
    }
}

fn resource_descriptor(item: &Value) -> ResourceDescriptor {
    ResourceDescriptor {
        uri: str_field(item, "uri"),
        name: str_field(item, "name"),
        description: str_field(item, "description"),
        mime_type: item
            .get("mimeType")
            .or_else(|| item.get("mime_type"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn content_item(item: &Value) -> Option<ContentItem> {
    if let Some(text) = item.get("text").and_then(Value::as_str) {
        return Some(ContentItem::Text {
            text: text.to_string(),
        });
    }
    if let Some(data) = item.get("data").or_else(|| item.get("blob")) {
        return Some(ContentItem::Resource { data: data.clone() });
    }
    None
}

fn str_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn unrecognized(kind: &str, response: &Value) -> ProviderError {
    let shape = match response {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        other => format!("JSON {other:?}"),
    };
    ProviderError::Client(format!("Unrecognized {kind} response shape: {shape}"))
}
