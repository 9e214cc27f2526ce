//! Lenient extraction of JSON from free-form model output.

use serde_json::{Map, Value};

/// Find the JSON payload in a model response.
///
/// Prefers a fenced ```json block, then the first balanced `{...}`.
pub fn extract_json(content: &str) -> Option<&str> {
    if let Some(start) = content.find("```json") {
        let start = start + 7;
        if let Some(end) = content[start..].find("```") {
            return Some(content[start..start + end].trim());
        }
    }

    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in content[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse the first JSON object in `content`; anything else yields an empty map.
pub fn parse_object(content: &str) -> Map<String, Value> {
    extract_json(content)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

/// Non-blank string field under any of `keys`.
pub fn str_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match lookup(map, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// List of strings; a lone string becomes a one-element list.
pub fn string_list(map: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    match lookup(map, keys) {
        Some(Value::Array(items)) => items.iter().filter_map(value_as_string).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

pub fn bool_field(map: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    match lookup(map, keys)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Number in `[0, 1]`; strings like `"0.8"` are accepted.
pub fn unit_field(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    let value = match lookup(map, keys)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

pub fn object_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Map<String, Value>> {
    lookup(map, keys)?.as_object()
}

pub fn array_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    lookup(map, keys)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
