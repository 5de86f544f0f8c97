use super::Entries;
use crate::document::{Collection, Value, ID_FIELD};
use crate::error::{Ml4msError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Parse a YAML collection file: a mapping of `_id -> fields`.
pub(super) fn parse(text: &str, path: &Path) -> Result<Entries> {
    if text.trim().is_empty() {
        return Ok(Entries::new());
    }
    match serde_yaml::from_str::<Value>(text)? {
        Value::Null => Ok(Entries::new()),
        Value::Map(entries) => Ok(entries),
        _ => Err(Ml4msError::Malformed {
            path: path.to_path_buf(),
            message: "expected a YAML mapping".into(),
        }),
    }
}

/// Render a collection as a YAML mapping. The `_id` is carried by the
/// top-level key and left out of each document body.
pub(super) fn render(collection: &Collection) -> Result<String> {
    let entries: BTreeMap<&String, BTreeMap<&String, &Value>> = collection
        .iter()
        .map(|(id, doc)| {
            let body = doc.iter().filter(|(k, _)| k.as_str() != ID_FIELD).collect();
            (id, body)
        })
        .collect();
    Ok(serde_yaml::to_string(&entries)?)
}
