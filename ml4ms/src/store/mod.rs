mod database;

pub use database::Database;

use crate::config::{ClientKind, DatabaseConfig, RunControl};
use crate::document::{Collection, Document};
use crate::error::{Ml4msError, Result};
use crate::overlay::{ChainedCollection, ChainedOverlay};
use crate::schema::SchemaSet;
use crate::validation::{ValidationReport, Validator};
use std::path::PathBuf;

/// The in-memory document store over a set of file-backed databases.
///
/// A store starts closed. [`Store::open`] makes it usable; every other
/// operation on a closed store fails with [`Ml4msError::StoreClosed`].
/// Databases are kept in load order and the first one loaded is the
/// primary, which receives writes that name no database.
#[derive(Debug, Default)]
pub struct Store {
    state: Option<OpenState>,
}

#[derive(Debug, Default)]
struct OpenState {
    databases: Vec<Database>,
    overlay: ChainedOverlay,
}

impl OpenState {
    fn rebuild_overlay(&mut self) {
        self.overlay = ChainedOverlay::build(&self.databases);
    }
}

impl Store {
    /// A closed store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the store. Opening an already open store keeps its databases.
    pub fn open(&mut self) {
        if self.state.is_none() {
            log::debug!("Opening store");
            self.state = Some(OpenState::default());
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_some()
    }

    /// Close the store, dropping everything held in memory.
    pub fn close(&mut self) {
        if self.state.take().is_some() {
            log::debug!("Closing store");
        }
    }

    /// Open a store and load every database of `rc`, in priority order.
    pub fn connect(rc: &RunControl) -> Result<Self> {
        if rc.client == ClientKind::Mongo {
            return Err(Ml4msError::Unsupported(
                "the mongo client is not available; use the fs client".into(),
            ));
        }
        let mut store = Store::new();
        store.open();
        for db in &rc.databases {
            store.load_database(db)?;
        }
        Ok(store)
    }

    /// Dump every database of `rc` to disk and close the store. Returns the
    /// paths written.
    pub fn disconnect(&mut self, rc: &RunControl) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for db in &rc.databases {
            written.extend(self.dump_database(Some(&db.name))?);
        }
        self.close();
        Ok(written)
    }

    /// Run `f` against a store connected to `rc`, then dump and close it.
    /// When `f` fails nothing is written back.
    pub fn with_connection<T>(rc: &RunControl, f: impl FnOnce(&mut Store) -> Result<T>) -> Result<T> {
        let mut store = Store::connect(rc)?;
        let out = f(&mut store)?;
        store.disconnect(rc)?;
        Ok(out)
    }

    fn state(&self) -> Result<&OpenState> {
        self.state.as_ref().ok_or(Ml4msError::StoreClosed)
    }

    fn state_mut(&mut self) -> Result<&mut OpenState> {
        self.state.as_mut().ok_or(Ml4msError::StoreClosed)
    }

    /// Load the database described by `config`. Loading a database whose
    /// name is already loaded replaces it in place.
    pub fn load_database(&mut self, config: &DatabaseConfig) -> Result<()> {
        let state = self.state_mut()?;
        let db = Database::load(config)?;
        match state.databases.iter().position(|d| d.name() == config.name) {
            Some(i) => state.databases[i] = db,
            None => state.databases.push(db),
        }
        state.rebuild_overlay();
        Ok(())
    }

    /// Write a database back to its directory. `None` names the primary.
    pub fn dump_database(&self, name: Option<&str>) -> Result<Vec<PathBuf>> {
        self.database(name)?.dump()
    }

    /// The named database, or the primary for `None`.
    pub fn database(&self, name: Option<&str>) -> Result<&Database> {
        let state = self.state()?;
        match name {
            Some(name) => state
                .databases
                .iter()
                .find(|d| d.name() == name)
                .ok_or_else(|| Ml4msError::DatabaseNotFound(name.to_string())),
            None => state
                .databases
                .first()
                .ok_or_else(|| Ml4msError::DatabaseNotFound("<primary>".to_string())),
        }
    }

    fn database_mut(&mut self, name: Option<&str>) -> Result<&mut Database> {
        let state = self.state_mut()?;
        match name {
            Some(name) => state
                .databases
                .iter_mut()
                .find(|d| d.name() == name)
                .ok_or_else(|| Ml4msError::DatabaseNotFound(name.to_string())),
            None => state
                .databases
                .first_mut()
                .ok_or_else(|| Ml4msError::DatabaseNotFound("<primary>".to_string())),
        }
    }

    /// Names of the loaded databases in priority order.
    pub fn database_names(&self) -> Result<Vec<String>> {
        Ok(self
            .state()?
            .databases
            .iter()
            .map(|d| d.name().to_string())
            .collect())
    }

    pub fn collection_names(&self, db: Option<&str>) -> Result<Vec<String>> {
        Ok(self.database(db)?.collection_names().cloned().collect())
    }

    pub fn collection(&self, name: &str, db: Option<&str>) -> Result<Option<&Collection>> {
        Ok(self.database(db)?.collection(name))
    }

    /// Every document of a collection in `_id` order; empty when the
    /// collection does not exist.
    pub fn all_documents(&self, collection: &str, db: Option<&str>) -> Result<Vec<Document>> {
        Ok(self
            .collection(collection, db)?
            .map(|c| c.documents().cloned().collect())
            .unwrap_or_default())
    }

    /// Store `doc` under its `_id`, overwriting any document with that id.
    /// The collection is created when missing.
    pub fn insert_one(&mut self, collection: &str, doc: Document, db: Option<&str>) -> Result<()> {
        let id = doc
            .id()
            .ok_or_else(|| Ml4msError::MissingId {
                collection: collection.to_string(),
            })?
            .to_string();

        let database = self.database_mut(db)?;
        let (coll, created) = database.collection_entry(collection);
        coll.insert(id.clone(), doc);
        log::debug!("Inserted {collection}/{id} into '{}'", database.name());

        if created {
            log::info!("Created collection '{collection}' in '{}'", database.name());
            self.state_mut()?.rebuild_overlay();
        }
        Ok(())
    }

    /// Insert each document in turn; returns how many were inserted.
    pub fn insert_many(
        &mut self,
        collection: &str,
        docs: impl IntoIterator<Item = Document>,
        db: Option<&str>,
    ) -> Result<usize> {
        let mut count = 0;
        for doc in docs {
            self.insert_one(collection, doc, db)?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove the document with the `_id` of `doc` and return it.
    pub fn delete_one(&mut self, collection: &str, doc: &Document, db: Option<&str>) -> Result<Document> {
        let id = doc.id().ok_or_else(|| Ml4msError::MissingId {
            collection: collection.to_string(),
        })?;
        let not_found = || Ml4msError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };

        let removed = self
            .database_mut(db)?
            .collection_mut(collection)
            .ok_or_else(not_found)?
            .remove(id)
            .ok_or_else(not_found)?;
        log::debug!("Deleted {collection}/{id}");
        Ok(removed)
    }

    /// First document (in `_id` order) matching every field of `filter`.
    pub fn find_one(&self, collection: &str, filter: &Document, db: Option<&str>) -> Result<Option<&Document>> {
        Ok(self
            .collection(collection, db)?
            .and_then(|c| c.find_one(filter)))
    }

    /// Update the first document matching `filter` with the fields of
    /// `update`, or insert `filter` merged with `update` when nothing
    /// matches. The stored `_id` of a matched document never changes.
    /// Returns the `_id` written.
    pub fn update_one(
        &mut self,
        collection: &str,
        filter: &Document,
        update: &Document,
        db: Option<&str>,
    ) -> Result<String> {
        let existing = self.find_one(collection, filter, db)?.cloned();
        let doc = apply_update(existing, filter, update);
        let id = doc
            .id()
            .ok_or_else(|| Ml4msError::MissingId {
                collection: collection.to_string(),
            })?
            .to_string();
        self.insert_one(collection, doc, db)?;
        Ok(id)
    }

    /// Chained view of `collection` across every loaded database.
    pub fn chained(&self, collection: &str) -> Result<Option<ChainedCollection<'_>>> {
        let state = self.state()?;
        Ok(state.overlay.view(collection, &state.databases))
    }

    /// Names of every collection in any loaded database.
    pub fn chained_names(&self) -> Result<Vec<String>> {
        Ok(self.state()?.overlay.names().cloned().collect())
    }

    /// Insert through the chained view. Writes land in the primary.
    pub fn chained_insert_one(&mut self, collection: &str, doc: Document) -> Result<()> {
        self.insert_one(collection, doc, None)
    }

    /// Update through the chained view. The match is looked up across every
    /// layer; the result is written to the primary, shadowing lower layers.
    pub fn chained_update_one(&mut self, collection: &str, filter: &Document, update: &Document) -> Result<String> {
        let existing = self
            .chained(collection)?
            .and_then(|view| view.find_one(filter).cloned());
        let doc = apply_update(existing, filter, update);
        let id = doc
            .id()
            .ok_or_else(|| Ml4msError::MissingId {
                collection: collection.to_string(),
            })?
            .to_string();
        self.insert_one(collection, doc, None)?;
        Ok(id)
    }

    /// Validate every chained collection (or only `only`) against `schemas`.
    pub fn validate_all(&self, schemas: &SchemaSet, only: Option<&str>) -> Result<ValidationReport> {
        let validator = Validator::new(schemas)?;
        let mut report = ValidationReport::default();

        for name in self.chained_names()? {
            if only.is_some_and(|o| o != name) {
                continue;
            }
            let Some(view) = self.chained(&name)? else {
                continue;
            };
            let collection_report = validator.check_collection(&name, &view.to_collection());
            if !collection_report.is_ok() {
                log::warn!(
                    "{} of {} document(s) in '{name}' failed validation",
                    collection_report.issues.len(),
                    collection_report.total
                );
            }
            report.collections.insert(name, collection_report);
        }
        Ok(report)
    }

    /// Loaded databases with their location and collection sizes.
    pub fn status(&self) -> Result<serde_json::Value> {
        let state = self.state()?;
        let databases: Vec<serde_json::Value> = state
            .databases
            .iter()
            .map(|db| {
                let collections: serde_json::Map<String, serde_json::Value> = db
                    .collections()
                    .map(|(name, coll)| {
                        (
                            name.clone(),
                            serde_json::json!({
                                "count": coll.len(),
                                "format": db.format_of(name).file_type.to_string(),
                            }),
                        )
                    })
                    .collect();
                serde_json::json!({
                    "name": db.name(),
                    "location": db.config().location().display().to_string(),
                    "collections": collections,
                })
            })
            .collect();

        Ok(serde_json::json!({
            "primary": state.databases.first().map(|d| d.name()),
            "databases": databases,
        }))
    }
}

fn apply_update(existing: Option<Document>, filter: &Document, update: &Document) -> Document {
    match existing {
        Some(mut doc) => {
            let id = doc.id().map(str::to_string);
            doc.merge(update);
            if let Some(id) = id {
                doc.set_id(id);
            }
            doc
        }
        None => {
            let mut doc = filter.clone();
            doc.merge(update);
            doc
        }
    }
}
