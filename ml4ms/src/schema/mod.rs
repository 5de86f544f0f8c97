// Schema sets - named JSON-Schema definitions documents can opt into

mod merge;

pub use merge::update_schemas;

use crate::document::Document;
use crate::error::{Ml4msError, Result};
use std::collections::BTreeMap;

/// Schemas shipped with the library, keyed by schema name.
pub const DEFAULT_SCHEMAS: &str = include_str!("../../schemas/schemas.json");

/// One sample document per bundled schema.
pub const EXEMPLARS: &str = include_str!("../../schemas/exemplars.json");

/// A mapping from schema name to JSON-Schema definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSet {
    schemas: BTreeMap<String, serde_json::Value>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled default schemas.
    pub fn defaults() -> Result<Self> {
        Self::from_value(serde_json::from_str(DEFAULT_SCHEMAS)?)
    }

    /// The bundled defaults with `user` deep-merged over them.
    pub fn with_overrides(user: &serde_json::Value) -> Result<Self> {
        let defaults: serde_json::Value = serde_json::from_str(DEFAULT_SCHEMAS)?;
        Self::from_value(update_schemas(&defaults, user))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(SchemaSet {
                schemas: map.into_iter().collect(),
            }),
            serde_json::Value::Null => Ok(Self::new()),
            other => Err(Ml4msError::Schema(format!(
                "schema set must be an object, got {other}"
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: serde_json::Value) {
        self.schemas.insert(name.into(), schema);
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.schemas.keys()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// The bundled exemplars, keyed by the schema they illustrate.
pub fn load_exemplars() -> Result<BTreeMap<String, Document>> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(EXEMPLARS)?;
    raw.into_iter()
        .map(|(name, value)| {
            Document::from_json(value)
                .map(|doc| (name.clone(), doc))
                .ok_or_else(|| Ml4msError::Schema(format!("exemplar '{name}' is not an object")))
        })
        .collect()
}
