//! Merging of overlapping scan responses into a deduplicated working set.
//!
//! The scan over-fetches: one record with a trailing space in its name and a
//! double space in its description shows up in several responses. The merger
//! keeps the first copy of every `(type, id)` and silently drops the rest.
//!
//! Malformed input never aborts the merge. A response that is not an object,
//! a key that is not a known collection type, a value that is not an array,
//! or a record without an `id` each contribute nothing and are logged.

use crate::config::{CollectionType, ScanConfig};
use crate::model::MetadataObject;
use crate::working_set::{Collection, WorkingSet};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Counters describing what the merger saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Responses fed into the merger.
    pub responses: usize,
    /// Records kept in the working set.
    pub kept: usize,
    /// Records dropped because their id was already present.
    pub duplicates: usize,
    /// Records or keys skipped because they could not be interpreted.
    pub skipped: usize,
}

/// Accumulates raw scan responses and produces a [`WorkingSet`].
#[derive(Debug, Default)]
pub struct ResultMerger {
    collections: BTreeMap<CollectionType, Collection>,
    stats: MergeStats,
}

impl ResultMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one response of the form `{ "<type>": [records...], "system": {...} }`.
    pub fn add_response(&mut self, response: &Value) {
        self.stats.responses += 1;

        let Some(map) = response.as_object() else {
            warn!("Skipping scan response that is not a JSON object");
            self.stats.skipped += 1;
            return;
        };

        for (key, records) in map {
            if key == ScanConfig::SYSTEM_KEY {
                continue;
            }

            let Some(kind) = CollectionType::from_api_name(key) else {
                warn!("Skipping unsupported collection type '{}'", key);
                self.stats.skipped += 1;
                continue;
            };

            let Some(records) = records.as_array() else {
                warn!("Skipping '{}': expected an array of records", key);
                self.stats.skipped += 1;
                continue;
            };

            self.add_records(kind, records);
        }
    }

    fn add_records(&mut self, kind: CollectionType, records: &[Value]) {
        let collection = self
            .collections
            .entry(kind)
            .or_insert_with(|| Collection::new(kind));

        for record in records {
            let object: MetadataObject = match serde_json::from_value(record.clone()) {
                Ok(object) => object,
                Err(e) => {
                    warn!("Skipping malformed {} record: {}", kind, e);
                    self.stats.skipped += 1;
                    continue;
                }
            };

            if collection.insert(object) {
                self.stats.kept += 1;
            } else {
                self.stats.duplicates += 1;
            }
        }
    }

    /// Finish merging. Empty collections are not materialized.
    pub fn finish(self) -> (WorkingSet, MergeStats) {
        debug!(
            "Merged {} responses: {} kept, {} duplicates, {} skipped",
            self.stats.responses, self.stats.kept, self.stats.duplicates, self.stats.skipped
        );
        (
            WorkingSet::from_collections(self.collections.into_values()),
            self.stats,
        )
    }
}

/// Merge a list of responses in one call.
pub fn merge_responses<'a>(responses: impl IntoIterator<Item = &'a Value>) -> WorkingSet {
    let mut merger = ResultMerger::new();
    for response in responses {
        merger.add_response(response);
    }
    merger.finish().0
}
