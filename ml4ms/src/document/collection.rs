use super::Document;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Documents keyed by `_id`. Iteration is in ascending `_id` order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection {
    docs: BTreeMap<String, Document>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Insert or overwrite the document stored under `id`.
    ///
    /// The stored document takes `id` as its `_id` and is normalized the way
    /// a load from disk would leave it (see [`Document::normalize`]), so a
    /// collection always survives a dump and reload unchanged.
    pub fn insert(&mut self, id: impl Into<String>, mut doc: Document) -> Option<Document> {
        let id = id.into();
        doc.set_id(id.clone());
        if !doc.normalize() {
            log::warn!("Dropping unparsable date of document {id}");
        }
        self.docs.insert(id, doc)
    }

    pub fn remove(&mut self, id: &str) -> Option<Document> {
        self.docs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.docs.keys()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Document> {
        self.docs.iter()
    }

    /// First document (in `_id` order) matching every field of `filter`.
    pub fn find_one(&self, filter: &Document) -> Option<&Document> {
        self.docs.values().find(|doc| doc.matches(filter))
    }
}

impl FromIterator<(String, Document)> for Collection {
    fn from_iter<I: IntoIterator<Item = (String, Document)>>(iter: I) -> Self {
        let mut collection = Collection::new();
        for (id, doc) in iter {
            collection.insert(id, doc);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = (&'a String, &'a Document);
    type IntoIter = btree_map::Iter<'a, String, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}

impl IntoIterator for Collection {
    type Item = (String, Document);
    type IntoIter = btree_map::IntoIter<String, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_iter()
    }
}
