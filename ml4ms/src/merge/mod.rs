// Ingestion - reconcile a batch of fetched records with a stored collection

use crate::document::{Document, Value, DATE_FIELD};
use crate::error::{Ml4msError, Result};
use crate::store::Store;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Identifying field of materials-project payload records.
pub const DEFAULT_ID_FIELD: &str = "material_id";

/// How many documents a merge inserted and how many it updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
}

/// Merge `batch` into collection `coll` of database `db` (the primary for
/// `None`).
///
/// A document without an `_id` takes its batch key as `_id`. A document
/// whose `_id` is already stored is shallow-merged into the stored one:
/// fields it carries overwrite, fields it lacks are kept. Any other document
/// is inserted. Applying the same batch twice leaves the same collection as
/// applying it once.
pub fn merge_new_data(
    store: &mut Store,
    coll: &str,
    batch: BTreeMap<String, Document>,
    db: Option<&str>,
) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    for (key, mut doc) in batch {
        if doc.id().is_none() {
            doc.set_id(key);
        }
        let Some(id) = doc.id().map(str::to_string) else {
            continue;
        };

        let exists = store
            .collection(coll, db)?
            .is_some_and(|c| c.contains(&id));
        if exists {
            store.update_one(coll, &Document::with_id(id), &doc, db)?;
            report.updated += 1;
        } else {
            store.insert_one(coll, doc, db)?;
            report.inserted += 1;
        }
    }

    log::info!(
        "Merged into '{coll}': {} inserted, {} updated",
        report.inserted,
        report.updated
    );
    Ok(report)
}

/// Read a materials-project style payload: a JSON array of records.
///
/// Each record's `id_field` (a string or a number) becomes its `_id` and its
/// batch key. Records without a `date` are stamped with today's date.
pub fn load_payload(path: &Path, id_field: &str) -> Result<BTreeMap<String, Document>> {
    let content = std::fs::read_to_string(path)?;
    let payload: serde_json::Value = serde_json::from_str(&content)?;
    let serde_json::Value::Array(records) = payload else {
        return Err(payload_error(path, "expected a JSON array of records"));
    };

    let today = chrono::Local::now().date_naive();
    let mut batch = BTreeMap::new();
    for (index, record) in records.into_iter().enumerate() {
        let id = match record.get(id_field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(payload_error(
                    path,
                    &format!("record {index} has no usable '{id_field}'"),
                ))
            }
        };
        let Some(mut doc) = Document::from_json(record) else {
            return Err(payload_error(path, &format!("record {index} is not an object")));
        };

        doc.set_id(id.clone());
        if doc.contains_key(DATE_FIELD) {
            if !doc.normalize_date() {
                log::warn!("Dropped unparsable date of payload record {id}");
            }
        } else {
            doc.insert(DATE_FIELD, Value::Date(today));
        }

        if batch.insert(id.clone(), doc).is_some() {
            log::warn!("Payload record {id} appears more than once; keeping the last");
        }
    }

    log::debug!("Loaded {} record(s) from {}", batch.len(), path.display());
    Ok(batch)
}

fn payload_error(path: &Path, message: &str) -> Ml4msError {
    Ml4msError::Payload {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
