//! Collision detection for pending whitespace repairs.
//!
//! A record's selected fields are projected onto their *cleaned* values, since
//! that is what would be written. Each projected value is then checked
//!
//! 1. against the store, with an equality lookup excluding the record itself, and
//! 2. against the other selected records of the same batch, because two
//!    records that converge on the same cleaned value cannot both be written.
//!
//! The in-batch comparison is limited to the fields named by the collection
//! type's [`UniquenessPolicy`](crate::config::UniquenessPolicy).
//!
//! A failed lookup is logged and counts as "no collision" for that field so
//! that one bad request never blocks the other fields or the batch.

use crate::config::CollectionType;
use crate::model::{ConflictRecord, Field, FieldSelection, MetadataObject, ObjectRef};
use crate::sanitize::clean;
use crate::state::RowState;
use crate::store::RemoteStore;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Cleaned values of the selected, non-empty fields of one record.
pub type FieldValues = BTreeMap<Field, String>;

/// Project a record onto the cleaned values of its selected fields.
///
/// Fields that are absent or clean to an empty string are left out.
pub fn project(object: &MetadataObject, selection: &FieldSelection) -> FieldValues {
    selection
        .iter()
        .filter_map(|field| {
            let cleaned = clean(object.get(field)?).into_owned();
            (!cleaned.is_empty()).then_some((field, cleaned))
        })
        .collect()
}

/// Projections of every record selected together for a multi-record check.
#[derive(Debug, Clone, Default)]
pub struct BatchPeers {
    entries: Vec<(String, FieldValues)>,
}

impl BatchPeers {
    /// No peers: a single-record check.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot the projections of `objects` under `selection`.
    pub fn from_objects<'a>(
        objects: impl IntoIterator<Item = &'a MetadataObject>,
        selection: &FieldSelection,
    ) -> Self {
        Self {
            entries: objects
                .into_iter()
                .map(|object| (object.id.clone(), project(object, selection)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of checking one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictOutcome {
    pub object_id: String,
    pub collisions: Vec<ConflictRecord>,
    pub new_state: RowState,
}

impl ConflictOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.collisions.is_empty()
    }
}

/// Checks records of one collection under one field selection.
pub struct ConflictDetector<'a> {
    store: &'a dyn RemoteStore,
    kind: CollectionType,
    selection: FieldSelection,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(store: &'a dyn RemoteStore, kind: CollectionType, selection: FieldSelection) -> Self {
        Self {
            store,
            kind,
            selection,
        }
    }

    /// Check one record against the store and against `peers`.
    pub async fn detect(&self, object: &MetadataObject, peers: &BatchPeers) -> ConflictOutcome {
        let values = project(object, &self.selection);
        let object_name = object.display_name();

        // (field, conflicting id) pairs, deduplicated and ordered by field.
        let mut hits: BTreeSet<(Field, String)> = BTreeSet::new();

        let lookups = values.iter().map(|(field, value)| async move {
            let found = self.lookup(&object.id, *field, value).await;
            (*field, found)
        });
        for (field, found) in join_all(lookups).await {
            hits.extend(found.into_iter().map(|other| (field, other.id)));
        }

        let batch_fields = self.kind.policy().batch_fields;
        for (peer_id, peer_values) in &peers.entries {
            if peer_id == &object.id {
                continue;
            }
            for (field, value) in &values {
                if batch_fields.contains(*field) && peer_values.get(field) == Some(value) {
                    hits.insert((*field, peer_id.clone()));
                }
            }
        }

        let collisions: Vec<ConflictRecord> = hits
            .into_iter()
            .map(|(field, conflicting_object_id)| ConflictRecord {
                object_id: object.id.clone(),
                object_name: object_name.clone(),
                field,
                conflicting_object_id,
            })
            .collect();

        let new_state = if collisions.is_empty() {
            RowState::Ready
        } else {
            RowState::Conflict
        };
        debug!(
            "Checked {} {}: {} collisions across {} fields",
            self.kind,
            object.id,
            collisions.len(),
            values.len()
        );

        ConflictOutcome {
            object_id: object.id.clone(),
            collisions,
            new_state,
        }
    }

    async fn lookup(&self, id: &str, field: Field, value: &str) -> Vec<ObjectRef> {
        match self.store.find_matching(self.kind, field, value, id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    "Lookup of {} on {} {} failed, assuming no collision: {}",
                    field, self.kind, id, e
                );
                Vec::new()
            }
        }
    }
}
