use super::Entries;
use crate::document::{Collection, Document, Value, ID_FIELD};
use crate::error::{Ml4msError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Parse a JSON collection file.
///
/// The current layout is a single object of `_id -> fields`. Files in the
/// older layout, one document carrying its own `_id` per line, are accepted
/// as well.
pub(super) fn parse(text: &str, path: &Path) -> Result<Entries> {
    if text.trim().is_empty() {
        return Ok(Entries::new());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Map(entries)) if entries.values().all(is_entry) => Ok(entries),
        Ok(Value::Map(_)) | Err(_) => parse_lines(text, path),
        Ok(_) => Err(Ml4msError::Malformed {
            path: path.to_path_buf(),
            message: "expected a JSON object".into(),
        }),
    }
}

fn is_entry(value: &Value) -> bool {
    matches!(value, Value::Map(_) | Value::Null)
}

fn parse_lines(text: &str, path: &Path) -> Result<Entries> {
    let mut entries = Entries::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let value: Value = serde_json::from_str(line)?;
        let id = value
            .as_map()
            .and_then(|m| m.get(ID_FIELD))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Ml4msError::Malformed {
                path: path.to_path_buf(),
                message: format!("line without a string _id: {line}"),
            })?;
        entries.insert(id, value);
    }
    Ok(entries)
}

/// Render a collection as one pretty-printed JSON object. Documents keep
/// their `_id` field.
pub(super) fn render(collection: &Collection) -> Result<String> {
    let entries: BTreeMap<&String, &Document> = collection.iter().collect();
    let mut out = serde_json::to_string_pretty(&entries)?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object_layout() {
        let text = r#"{"first": {"date": "2021-05-01", "name": "me", "test_list": [5, 4]}, "second": {}}"#;
        let entries = parse(text, Path::new("t.json")).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries["second"].as_map().unwrap().is_empty());
    }

    #[test]
    fn test_parse_line_layout() {
        let text = "{\"_id\": \"first\", \"date\": \"2021-05-01\", \"name\": \"me\", \"test_list\": [5, 4]}\n{\"_id\": \"second\"}";
        let entries = parse(text, Path::new("t.json")).unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(
            entries["first"].as_map().unwrap()["name"],
            Value::String("me".into())
        );
    }

    #[test]
    fn test_parse_single_line_document() {
        let entries = parse(r#"{"_id": "only", "a": 1}"#, Path::new("t.json")).unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["only"]);
    }

    #[test]
    fn test_parse_rejects_line_without_id() {
        let result = parse("{\"a\": 1}\n{\"b\": 2}", Path::new("t.json"));
        assert!(matches!(result, Err(Ml4msError::Malformed { .. })));
    }

    #[test]
    fn test_parse_rejects_array() {
        let result = parse("[1, 2]", Path::new("t.json"));
        assert!(matches!(result, Err(Ml4msError::Malformed { .. })));
    }

    #[test]
    fn test_render_sorted_with_ids() {
        let mut coll = Collection::new();
        coll.insert("b", Document::from_json(json!({"_id": "b", "z": 1, "a": 2})).unwrap());
        coll.insert("a", Document::with_id("a"));
        let out = render(&coll).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({"a": {"_id": "a"}, "b": {"_id": "b", "a": 2, "z": 1}}));
        assert!(out.find("\"a\"").unwrap() < out.find("\"b\"").unwrap());
    }
}
