// Format codec - read/write a single collection file as JSON or YAML

mod json;
mod yaml;

use crate::document::{Collection, Document, Value};
use crate::error::{Ml4msError, Result};
use crate::interrupt::with_deferred_interrupts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

/// On-disk format of a collection file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Json,
    Yaml,
}

impl FileType {
    /// Determine the file type from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(FileType::Json),
            Some("yaml") | Some("yml") => Ok(FileType::Yaml),
            _ => Err(Ml4msError::UnknownFileType(path.display().to_string())),
        }
    }

    pub fn default_extension(self) -> &'static str {
        match self {
            FileType::Json => "json",
            FileType::Yaml => "yaml",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Json => f.write_str("json"),
            FileType::Yaml => f.write_str("yaml"),
        }
    }
}

/// How a collection was loaded, recorded so that it is written back to the
/// same file name in the same format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFormat {
    pub file_type: FileType,
    pub extension: String,
}

impl CollectionFormat {
    pub fn new(file_type: FileType) -> Self {
        CollectionFormat {
            file_type,
            extension: file_type.default_extension().to_string(),
        }
    }

    pub fn of_path(path: &Path) -> Result<Self> {
        let file_type = FileType::from_path(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(file_type.default_extension())
            .to_string();
        Ok(CollectionFormat {
            file_type,
            extension,
        })
    }

    /// File name of collection `name` in this format.
    pub fn file_name(&self, name: &str) -> String {
        format!("{name}.{}", self.extension)
    }
}

/// Load a collection file, choosing the format from its extension.
pub fn load_collection(path: &Path) -> Result<Collection> {
    load_collection_as(path, FileType::from_path(path)?)
}

/// Load a collection file in the given format.
///
/// Each entry's key becomes the document's `_id`, replacing any `_id` stored
/// in the entry itself. A `date` field is turned into a date value; one that
/// does not parse is dropped.
pub fn load_collection_as(path: &Path, file_type: FileType) -> Result<Collection> {
    let text = std::fs::read_to_string(path)?;
    let entries = match file_type {
        FileType::Json => json::parse(&text, path)?,
        FileType::Yaml => yaml::parse(&text, path)?,
    };

    let mut collection = Collection::new();
    for (key, value) in entries {
        let mut doc = match value {
            Value::Null => Document::new(),
            other => Document::from_value(other).ok_or_else(|| Ml4msError::Malformed {
                path: path.to_path_buf(),
                message: format!("entry '{key}' is not a mapping"),
            })?,
        };
        doc.set_id(key.clone());
        if !doc.normalize_date() {
            log::warn!("Dropping unparsable date of {key} in {}", path.display());
        }
        collection.insert(key, doc);
    }
    Ok(collection)
}

/// Dump a collection, choosing the format from the path's extension.
pub fn dump_collection(path: &Path, collection: &Collection) -> Result<()> {
    dump_collection_as(path, collection, FileType::from_path(path)?)
}

/// Dump a collection in the given format. Output is a pure function of the
/// collection's contents: documents sorted by `_id`, fields sorted by name.
pub fn dump_collection_as(path: &Path, collection: &Collection, file_type: FileType) -> Result<()> {
    let rendered = match file_type {
        FileType::Json => json::render(collection)?,
        FileType::Yaml => yaml::render(collection)?,
    };
    write_atomic(path, rendered.as_bytes())
}

/// Convert a collection file to the format implied by `output`'s extension.
/// Returns the number of documents written.
pub fn convert(input: &Path, output: &Path) -> Result<usize> {
    let collection = load_collection(input)?;
    dump_collection(output, &collection)?;
    Ok(collection.len())
}

/// Replace `path` with `contents` via a temporary file in the same directory.
/// Termination signals are held back until the rename has happened.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    with_deferred_interrupts(|| -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        if let Ok(meta) = std::fs::metadata(path) {
            std::fs::set_permissions(tmp.path(), meta.permissions())?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    })
}

/// Entries of a parsed collection file, before `_id` injection.
type Entries = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json(value).unwrap()
    }

    fn sample() -> Collection {
        let mut first = doc(json!({"_id": "first", "name": "me", "test_list": [5, 4]}));
        first.insert("date", NaiveDate::from_ymd_opt(2021, 5, 1).unwrap());
        let mut c = Collection::new();
        c.insert("first", first);
        c.insert("second", Document::with_id("second"));
        c
    }

    #[test]
    fn test_file_type_from_path() {
        assert_eq!(FileType::from_path(Path::new("a.json")).unwrap(), FileType::Json);
        assert_eq!(FileType::from_path(Path::new("a.yml")).unwrap(), FileType::Yaml);
        assert_eq!(FileType::from_path(Path::new("db/a.yaml")).unwrap(), FileType::Yaml);
        assert!(matches!(
            FileType::from_path(Path::new("a.csv")),
            Err(Ml4msError::UnknownFileType(_))
        ));
    }

    #[test]
    fn test_collection_format_keeps_extension() {
        let format = CollectionFormat::of_path(Path::new("db/materials.yml")).unwrap();
        assert_eq!(format.file_type, FileType::Yaml);
        assert_eq!(format.file_name("materials"), "materials.yml");
        assert_eq!(CollectionFormat::new(FileType::Json).file_name("x"), "x.json");
    }

    #[test]
    fn test_json_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.json");
        let coll = sample();
        dump_collection(&path, &coll).unwrap();
        assert_eq!(load_collection(&path).unwrap(), coll);
    }

    #[test]
    fn test_yaml_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.yaml");
        let coll = sample();
        dump_collection(&path, &coll).unwrap();
        assert_eq!(load_collection(&path).unwrap(), coll);
    }

    #[test]
    fn test_round_trip_keeps_timestamps() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stamps.json");
        let mut d = Document::with_id("a");
        d.insert(
            "date",
            NaiveDate::from_ymd_opt(2021, 5, 18)
                .unwrap()
                .and_hms_micro_opt(6, 28, 21, 504549)
                .unwrap(),
        );
        let coll: Collection = [("a".to_string(), d)].into_iter().collect();
        dump_collection(&path, &coll).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"2021-05-18T06:28:21.504549\""));
        assert_eq!(load_collection(&path).unwrap(), coll);
    }

    #[test]
    fn test_round_trip_date_in_other_field() {
        let tmp = TempDir::new().unwrap();
        let mut d = Document::with_id("a");
        d.insert("created", NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let mut coll = Collection::new();
        coll.insert("a", d);

        for name in ["c.yaml", "c.json"] {
            let path = tmp.path().join(name);
            dump_collection(&path, &coll).unwrap();
            assert_eq!(load_collection(&path).unwrap(), coll, "{name}");
        }
    }

    #[test]
    fn test_round_trip_key_differs_from_id() {
        let tmp = TempDir::new().unwrap();
        let mut coll = Collection::new();
        coll.insert("key", doc(json!({"_id": "something-else", "x": 1})));

        for name in ["c.yaml", "c.json"] {
            let path = tmp.path().join(name);
            dump_collection(&path, &coll).unwrap();
            let loaded = load_collection(&path).unwrap();
            assert_eq!(loaded, coll, "{name}");
            assert_eq!(loaded.get("key").unwrap().id(), Some("key"));
        }
    }

    #[test]
    fn test_dump_is_independent_of_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.yaml");
        let b = tmp.path().join("b.yaml");

        let mut forward = Collection::new();
        let mut backward = Collection::new();
        for id in ["x", "m", "a"] {
            forward.insert(id, doc(json!({"_id": id, "z": 1, "b": 2})));
        }
        for id in ["a", "m", "x"] {
            backward.insert(id, doc(json!({"b": 2, "z": 1, "_id": id})));
        }

        dump_collection(&a, &forward).unwrap();
        dump_collection(&b, &backward).unwrap();
        assert_eq!(
            std::fs::read_to_string(&a).unwrap(),
            std::fs::read_to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_convert_json_to_yaml() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("coll.json");
        let output = tmp.path().join("coll.yml");
        dump_collection(&input, &sample()).unwrap();

        let count = convert(&input, &output).unwrap();
        assert_eq!(count, 2);
        assert_eq!(load_collection(&output).unwrap(), sample());
    }

    #[test]
    fn test_unparsable_date_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dates.json");
        std::fs::write(&path, r#"{"a": {"date": "yesterday", "x": 1}}"#).unwrap();
        let coll = load_collection(&path).unwrap();
        assert_eq!(coll.get("a").unwrap(), &doc(json!({"_id": "a", "x": 1})));
    }

    #[test]
    fn test_non_mapping_entry_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.yaml");
        std::fs::write(&path, "a: 5\nb:\n  x: 1\n").unwrap();
        assert!(matches!(
            load_collection(&path),
            Err(Ml4msError::Malformed { .. })
        ));
    }

    #[test]
    fn test_dump_replaces_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("coll.json");
        std::fs::write(&path, "garbage").unwrap();
        dump_collection(&path, &sample()).unwrap();
        assert_eq!(load_collection(&path).unwrap(), sample());
        // No temporary files left behind
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
