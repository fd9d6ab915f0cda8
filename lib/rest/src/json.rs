//! Reading and writing JSON bodies. Output paths are JSONPath queries; paths without the leading
//! `$` are taken relative to the root.

use crate::error::RestError;
use serde_json::{Map, Value};
use serde_json_path::JsonPath;
use std::borrow::Cow;

fn parse_path(path: &str) -> Result<JsonPath, RestError> {
    let path = path.trim();
    let path = if path.starts_with('$') {
        Cow::Borrowed(path)
    } else if path.starts_with('[') {
        Cow::Owned(format!("${path}"))
    } else {
        Cow::Owned(format!("$.{path}"))
    };
    JsonPath::parse(&path)
        .map_err(|error| RestError::Configuration(format!("Invalid JSON path '{path}': {error}")))
}

/// Returns the nodes that `path` selects in `value`, in document order.
pub fn select<'a>(value: &'a Value, path: &str) -> Result<Vec<&'a Value>, RestError> {
    Ok(parse_path(path)?.query(value).all())
}

/// Puts `value` at a dot separated `path`, creating nested objects on the way.
pub fn insert_at(body: &mut Map<String, Value>, path: &str, value: Value) -> Result<(), RestError> {
    let path = path.trim();
    let keys = path
        .strip_prefix("$.")
        .unwrap_or(path)
        .split('.')
        .filter(|key| !key.is_empty())
        .map(|key| {
            if key.contains(['[', ']', '*']) {
                RestError::configuration(format!(
                    "Input JSON path '{path}' may only contain object keys"
                ))
            } else {
                Ok(key.to_owned())
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    let Some((last, parents)) = keys.split_last() else {
        return RestError::configuration("Input JSON path must not be empty");
    };

    let mut current = body;
    for key in parents {
        let entry = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry.as_object_mut() {
            Some(map) => map,
            None => return RestError::configuration(format!("Cannot write below '{key}'")),
        };
    }
    current.insert(last.clone(), value);
    Ok(())
}

/// Returns the lexical form of a value. `null` has none.
pub fn lexical_form(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        Value::Bool(value) => Some(value.to_string()),
        Value::Number(value) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}
