// Chained overlay - one logical collection across every loaded database.
// Layers are ordered by database priority, primary first. The first layer
// holding an _id wins outright; documents are never merged across layers.

use crate::document::{Collection, Document};
use crate::store::Database;
use std::collections::{BTreeMap, BTreeSet};

/// Collection name to the indices of the databases defining it, highest
/// priority first. Rebuilt whenever the set of collections changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainedOverlay {
    chains: BTreeMap<String, Vec<usize>>,
}

impl ChainedOverlay {
    pub fn build(databases: &[Database]) -> Self {
        let mut chains: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, db) in databases.iter().enumerate() {
            for name in db.collection_names() {
                chains.entry(name.clone()).or_default().push(index);
            }
        }
        ChainedOverlay { chains }
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.chains.keys()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    /// Resolve the layers of `name` against the databases the index was
    /// built from.
    pub fn view<'a>(&self, name: &str, databases: &'a [Database]) -> Option<ChainedCollection<'a>> {
        let chain = self.chains.get(name)?;
        let layers = chain
            .iter()
            .filter_map(|&i| databases.get(i))
            .filter_map(|db| db.collection(name).map(|c| (db.name(), c)))
            .collect();
        Some(ChainedCollection::new(name, layers))
    }
}

/// One layer of a chained collection: the owning database and its data.
pub type Layer<'a> = (&'a str, &'a Collection);

/// Read-only view of one logical collection spanning several databases.
#[derive(Debug, Clone)]
pub struct ChainedCollection<'a> {
    name: String,
    layers: Vec<Layer<'a>>,
}

impl<'a> ChainedCollection<'a> {
    pub fn new(name: impl Into<String>, layers: Vec<Layer<'a>>) -> Self {
        ChainedCollection {
            name: name.into(),
            layers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the databases contributing to this view, highest priority
    /// first.
    pub fn layers(&self) -> Vec<&'a str> {
        self.layers.iter().map(|(db, _)| *db).collect()
    }

    pub fn get(&self, id: &str) -> Option<&'a Document> {
        self.layers.iter().find_map(|(_, coll)| coll.get(id))
    }

    /// Database that serves `id`.
    pub fn owner(&self, id: &str) -> Option<&'a str> {
        self.layers
            .iter()
            .find(|(_, coll)| coll.contains(id))
            .map(|(db, _)| *db)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// First visible document matching `filter`, scanning layers from the
    /// highest priority down. A document shadowed by a higher layer is never
    /// returned, even if it matches while the shadowing one does not.
    pub fn find_one(&self, filter: &Document) -> Option<&'a Document> {
        for (depth, (_, coll)) in self.layers.iter().enumerate() {
            for (id, doc) in coll.iter() {
                if doc.matches(filter) && !self.shadowed(id, depth) {
                    return Some(doc);
                }
            }
        }
        None
    }

    fn shadowed(&self, id: &str, depth: usize) -> bool {
        self.layers[..depth].iter().any(|(_, coll)| coll.contains(id))
    }

    /// Union of the ids of every layer, ascending.
    pub fn ids(&self) -> Vec<&'a String> {
        let ids: BTreeSet<&'a String> = self
            .layers
            .iter()
            .flat_map(|(_, coll)| coll.ids())
            .collect();
        ids.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|(_, coll)| coll.is_empty())
    }

    /// Every visible document in `_id` order.
    pub fn documents(&self) -> Vec<&'a Document> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// The visible documents copied into a standalone collection.
    pub fn to_collection(&self) -> Collection {
        self.ids()
            .into_iter()
            .filter_map(|id| self.get(id).map(|doc| (id.clone(), doc.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json(value).unwrap()
    }

    fn coll(docs: &[serde_json::Value]) -> Collection {
        docs.iter()
            .map(|v| {
                let d = doc(v.clone());
                (d.id().unwrap().to_string(), d)
            })
            .collect()
    }

    #[test]
    fn test_first_layer_wins_without_merging() {
        let primary = coll(&[json!({"_id": "a", "x": 1})]);
        let secondary = coll(&[
            json!({"_id": "a", "x": 2, "y": 2}),
            json!({"_id": "b", "x": 3}),
        ]);
        let view = ChainedCollection::new("c", vec![("one", &primary), ("two", &secondary)]);

        assert_eq!(view.get("a"), Some(&doc(json!({"_id": "a", "x": 1}))));
        assert_eq!(view.get("b").unwrap().get("x"), secondary.get("b").unwrap().get("x"));
        assert_eq!(view.owner("a"), Some("one"));
        assert_eq!(view.owner("b"), Some("two"));
        assert_eq!(view.get("zzz"), None);
        assert_eq!(view.len(), 2);
        assert_eq!(view.layers(), vec!["one", "two"]);
    }

    #[test]
    fn test_find_one_skips_shadowed_documents() {
        let primary = coll(&[json!({"_id": "a", "name": "new"})]);
        let secondary = coll(&[
            json!({"_id": "a", "name": "old"}),
            json!({"_id": "b", "name": "old"}),
        ]);
        let view = ChainedCollection::new("c", vec![("one", &primary), ("two", &secondary)]);

        let found = view.find_one(&doc(json!({"name": "old"}))).unwrap();
        assert_eq!(found.id(), Some("b"));
        let found = view.find_one(&doc(json!({"name": "new"}))).unwrap();
        assert_eq!(found.id(), Some("a"));
        assert!(view.find_one(&doc(json!({"name": "none"}))).is_none());
    }

    #[test]
    fn test_documents_in_id_order() {
        let primary = coll(&[json!({"_id": "c"}), json!({"_id": "a", "top": true})]);
        let secondary = coll(&[json!({"_id": "b"}), json!({"_id": "a"})]);
        let view = ChainedCollection::new("c", vec![("one", &primary), ("two", &secondary)]);

        let docs = view.documents();
        let ids: Vec<_> = docs.iter().filter_map(|d| d.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let merged = view.to_collection();
        assert_eq!(merged.len(), 3);
        assert!(merged.get("a").unwrap().contains_key("top"));
    }

    #[test]
    fn test_empty_view() {
        let empty = Collection::new();
        let view = ChainedCollection::new("c", vec![("one", &empty)]);
        assert!(view.is_empty());
        assert_eq!(view.len(), 0);
        assert!(view.find_one(&Document::new()).is_none());
    }
}
