use crate::document::{Collection, Document, SCHEMA_FIELD};
use crate::error::{Ml4msError, Result};
use crate::schema::SchemaSet;
use jsonschema::JSONSchema;
use serde::Serialize;
use std::collections::BTreeMap;

/// Validate `document` against the schema called `schema_name`.
///
/// An unknown schema name is a no-op. Dates are rendered to their ISO-8601
/// strings first, so the checked shape is the persisted one. On failure the
/// error lists every violated constraint.
pub fn validate(schema_name: &str, document: &Document, schemas: &SchemaSet) -> Result<()> {
    let Some(schema) = schemas.get(schema_name) else {
        return Ok(());
    };
    let compiled = compile(schema_name, schema)?;
    let violations = violations(&compiled, document);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Ml4msError::Validation {
            schema: schema_name.to_string(),
            id: display_id(document),
            violations,
        })
    }
}

/// Validate a document against the schema named by its own `schema` field.
/// Documents without the tag are not checked.
pub fn validate_document(document: &Document, schemas: &SchemaSet) -> Result<()> {
    match document.get(SCHEMA_FIELD).and_then(|v| v.as_str()) {
        Some(name) => validate(name, document, schemas),
        None => Ok(()),
    }
}

/// Check every document of collection `name`; see [`Validator::check_collection`].
pub fn validate_collection(name: &str, collection: &Collection, schemas: &SchemaSet) -> Result<CollectionReport> {
    Ok(Validator::new(schemas)?.check_collection(name, collection))
}

fn compile(name: &str, schema: &serde_json::Value) -> Result<JSONSchema> {
    JSONSchema::compile(schema).map_err(|e| Ml4msError::Schema(format!("{name}: {e}")))
}

fn violations(compiled: &JSONSchema, document: &Document) -> Vec<String> {
    let instance = document.to_json();
    let result = match compiled.validate(&instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect(),
    };
    result
}

fn display_id(document: &Document) -> String {
    document.id().unwrap_or("<no _id>").to_string()
}

/// Every schema of a set, compiled once for checking many documents.
pub struct Validator {
    compiled: BTreeMap<String, JSONSchema>,
}

impl Validator {
    pub fn new(schemas: &SchemaSet) -> Result<Self> {
        let mut compiled = BTreeMap::new();
        for name in schemas.names() {
            if let Some(schema) = schemas.get(name) {
                compiled.insert(name.clone(), compile(name, schema)?);
            }
        }
        Ok(Validator { compiled })
    }

    /// Violations of `document` against schema `name`; `None` when the
    /// schema is unknown.
    pub fn check(&self, name: &str, document: &Document) -> Option<Vec<String>> {
        self.compiled
            .get(name)
            .map(|compiled| violations(compiled, document))
    }

    /// Check every document of a collection. A document is checked against
    /// the schema named by its `schema` field, or else the schema named
    /// after the collection.
    pub fn check_collection(&self, name: &str, collection: &Collection) -> CollectionReport {
        let mut report = CollectionReport {
            total: collection.len(),
            issues: Vec::new(),
        };
        for (id, doc) in collection {
            let schema = doc
                .get(SCHEMA_FIELD)
                .and_then(|v| v.as_str())
                .unwrap_or(name);
            if let Some(violations) = self.check(schema, doc) {
                if !violations.is_empty() {
                    report.issues.push(DocumentIssues {
                        id: id.clone(),
                        schema: schema.to_string(),
                        violations,
                    });
                }
            }
        }
        report
    }
}

/// Failures of a single document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentIssues {
    pub id: String,
    pub schema: String,
    pub violations: Vec<String>,
}

/// Outcome of validating one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionReport {
    pub total: usize,
    pub issues: Vec<DocumentIssues>,
}

impl CollectionReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Outcome of validating several collections, keyed by collection name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    pub collections: BTreeMap<String, CollectionReport>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.collections.values().all(CollectionReport::is_ok)
    }

    /// Names of collections with at least one failing document.
    pub fn failing(&self) -> impl Iterator<Item = &String> {
        self.collections
            .iter()
            .filter(|(_, r)| !r.is_ok())
            .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::load_exemplars;
    use chrono::NaiveDate;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json(value).unwrap()
    }

    #[test]
    fn test_valid_document() {
        let schemas = SchemaSet::defaults().unwrap();
        let d = doc(json!({"_id": "first_doc", "name": "me", "date": "2021-05-01", "test_list": [5, 4]}));
        validate("test", &d, &schemas).unwrap();
    }

    #[test]
    fn test_dates_validated_as_strings() {
        let schemas = SchemaSet::defaults().unwrap();
        let mut d = doc(json!({"_id": "first_doc", "name": "me", "test_list": [5, 4]}));
        d.insert("date", NaiveDate::from_ymd_opt(2021, 5, 1).unwrap());
        validate("test", &d, &schemas).unwrap();
    }

    #[test]
    fn test_missing_required_field() {
        let schemas = SchemaSet::defaults().unwrap();
        let d = doc(json!({"_id": "first_doc", "date": "2021-05-01"}));
        match validate("test", &d, &schemas) {
            Err(Ml4msError::Validation { schema, id, violations }) => {
                assert_eq!(schema, "test");
                assert_eq!(id, "first_doc");
                assert!(violations.iter().any(|v| v.contains("name")), "{violations:?}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_every_violation_reported() {
        let schemas = SchemaSet::defaults().unwrap();
        let d = doc(json!({"_id": "x", "test_list": ["a"]}));
        let Err(Ml4msError::Validation { violations, .. }) = validate("test", &d, &schemas) else {
            panic!("expected validation error");
        };
        // name and date missing, plus the bad list item
        assert!(violations.len() >= 3, "{violations:?}");
        assert!(violations.iter().any(|v| v.starts_with("/test_list/0")));
    }

    #[test]
    fn test_unknown_schema_is_noop() {
        let schemas = SchemaSet::defaults().unwrap();
        validate("nope", &Document::new(), &schemas).unwrap();
    }

    #[test]
    fn test_validate_document_uses_schema_tag() {
        let schemas = SchemaSet::defaults().unwrap();
        let tagged = doc(json!({"_id": "a", "schema": "test"}));
        assert!(validate_document(&tagged, &schemas).is_err());
        let untagged = doc(json!({"_id": "a"}));
        validate_document(&untagged, &schemas).unwrap();
    }

    #[test]
    fn test_exemplars_validate() {
        let schemas = SchemaSet::defaults().unwrap();
        for (name, exemplar) in load_exemplars().unwrap() {
            validate(&name, &exemplar, &schemas)
                .unwrap_or_else(|e| panic!("exemplar {name} failed: {e}"));
        }
    }

    #[test]
    fn test_uncompilable_schema() {
        let mut schemas = SchemaSet::new();
        schemas.insert("broken", json!({"type": 12}));
        assert!(matches!(
            validate("broken", &Document::with_id("a"), &schemas),
            Err(Ml4msError::Schema(_))
        ));
    }

    #[test]
    fn test_check_collection() {
        let validator = Validator::new(&SchemaSet::defaults().unwrap()).unwrap();
        let mut coll = Collection::new();
        coll.insert("good", doc(json!({"_id": "good", "name": "me", "date": "2021-05-01"})));
        coll.insert("bad", doc(json!({"_id": "bad"})));
        coll.insert("other", doc(json!({"_id": "other", "schema": "unknown"})));

        let report = validator.check_collection("test", &coll);
        assert_eq!(report, validate_collection("test", &coll, &SchemaSet::defaults().unwrap()).unwrap());
        assert_eq!(report.total, 3);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].id, "bad");

        let mut full = ValidationReport::default();
        full.collections.insert("test".into(), report);
        full.collections.insert("empty".into(), CollectionReport::default());
        assert!(!full.is_ok());
        assert_eq!(full.failing().collect::<Vec<_>>(), vec!["test"]);
    }
}
