//! The in-memory set of candidate records, grouped by collection.

use crate::config::CollectionType;
use crate::model::MetadataObject;
use std::collections::{BTreeMap, HashMap};

/// All candidate records of one metadata type, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    kind: CollectionType,
    objects: Vec<MetadataObject>,
    /// Position of each id in `objects`.
    index: HashMap<String, usize>,
}

impl Collection {
    pub fn new(kind: CollectionType) -> Self {
        Self {
            kind,
            objects: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn kind(&self) -> CollectionType {
        self.kind
    }

    pub fn objects(&self) -> &[MetadataObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MetadataObject> {
        self.index.get(id).and_then(|&position| self.objects.get(position))
    }

    /// Mutable access to a record. Its `id` must not be changed.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut MetadataObject> {
        let position = *self.index.get(id)?;
        self.objects.get_mut(position)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Append an object unless its id is already present. Returns whether it was added.
    pub fn insert(&mut self, object: MetadataObject) -> bool {
        if self.contains(&object.id) {
            return false;
        }
        self.index.insert(object.id.clone(), self.objects.len());
        self.objects.push(object);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<MetadataObject> {
        let removed = self.index.remove(id)?;
        for position in self.index.values_mut() {
            if *position > removed {
                *position -= 1;
            }
        }
        Some(self.objects.remove(removed))
    }

    pub fn ids(&self) -> Vec<String> {
        self.objects.iter().map(|object| object.id.clone()).collect()
    }
}

/// Deduplicated candidate records for every collection type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSet {
    collections: BTreeMap<CollectionType, Collection>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_collections(collections: impl IntoIterator<Item = Collection>) -> Self {
        Self {
            collections: collections
                .into_iter()
                .filter(|collection| !collection.is_empty())
                .map(|collection| (collection.kind(), collection))
                .collect(),
        }
    }

    pub fn collection(&self, kind: CollectionType) -> Option<&Collection> {
        self.collections.get(&kind)
    }

    pub fn collection_mut(&mut self, kind: CollectionType) -> Option<&mut Collection> {
        self.collections.get_mut(&kind)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn kinds(&self) -> Vec<CollectionType> {
        self.collections.keys().copied().collect()
    }

    pub fn get(&self, kind: CollectionType, id: &str) -> Option<&MetadataObject> {
        self.collection(kind)?.get(id)
    }

    /// Remove one object, dropping its collection once empty.
    pub fn remove(&mut self, kind: CollectionType, id: &str) -> Option<MetadataObject> {
        let collection = self.collections.get_mut(&kind)?;
        let removed = collection.remove(id);
        if collection.is_empty() {
            self.collections.remove(&kind);
        }
        removed
    }

    pub fn total_objects(&self) -> usize {
        self.collections.values().map(Collection::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
