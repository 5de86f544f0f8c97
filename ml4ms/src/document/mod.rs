// Documents and collections held in memory by the store

mod collection;
mod value;

pub use collection::Collection;
pub use value::{encode_date, encode_datetime, parse_date, Value};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primary key field of every document.
pub const ID_FIELD: &str = "_id";
/// Field normalized to a calendar date on load.
pub const DATE_FIELD: &str = "date";
/// Field naming the schema a document opts into.
pub const SCHEMA_FIELD: &str = "schema";

/// A flat mapping from field name to value. The `_id` field is a regular
/// entry of the mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.set_id(id);
        doc
    }

    /// Build a document from a JSON object. Returns `None` for non-objects.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        Self::from_value(Value::from(value))
    }

    /// Build a document from a map value. Returns `None` for anything else.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Map(fields) => Some(Document { fields }),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.fields
            .insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Shallow merge: every field of `other` overwrites the field of the
    /// same name here. Fields absent from `other` are left untouched.
    pub fn merge(&mut self, other: &Document) {
        for (k, v) in &other.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    /// True when every key/value pair of `filter` is present here.
    pub fn matches(&self, filter: &Document) -> bool {
        filter
            .fields
            .iter()
            .all(|(k, v)| self.fields.get(k) == Some(v))
    }

    /// Turn a string `date` field into a date value. A `date` that cannot be
    /// parsed is dropped. Returns false when a field was dropped.
    pub fn normalize_date(&mut self) -> bool {
        let parsed = match self.fields.get(DATE_FIELD) {
            None | Some(Value::Date(_)) | Some(Value::DateTime(_)) => return true,
            Some(Value::String(s)) => parse_date(s),
            Some(_) => None,
        };
        match parsed {
            Some(value) => {
                self.fields.insert(DATE_FIELD.to_string(), value);
                true
            }
            None => {
                self.fields.remove(DATE_FIELD);
                false
            }
        }
    }

    /// Bring the document into the shape a load from disk produces: the
    /// `date` field becomes a date value and any date held by another field
    /// becomes its ISO-8601 string. Returns false when `date` was dropped.
    pub fn normalize(&mut self) -> bool {
        for (field, value) in self.fields.iter_mut() {
            if field != DATE_FIELD {
                value.render_dates();
            }
        }
        self.normalize_date()
    }

    /// The persisted shape of this document, with dates rendered as strings.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                .collect(),
        )
    }

    pub(crate) fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Document { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Document {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
