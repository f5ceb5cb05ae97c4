//! Applying whitespace fixes to a record.
//!
//! A repair stages one `add` operation per selected dirty field and sends
//! them in a single patch. The caller's record is never touched; the repaired
//! copy comes back in the [`RepairOutcome`] and the session swaps it in.

use crate::config::CollectionType;
use crate::error::{MetafixError, Result};
use crate::model::{FieldSelection, MetadataObject, PatchOperation};
use crate::sanitize::clean;
use crate::state::{RowEvent, RowState};
use crate::store::RemoteStore;
use tracing::{debug, info};

/// Patch operations needed to clean the selected fields of `object`.
pub fn plan(object: &MetadataObject, selection: &FieldSelection) -> Vec<PatchOperation> {
    object
        .dirty_fields(selection)
        .into_iter()
        .filter_map(|field| {
            let value = object.get(field)?;
            Some(PatchOperation::set(field, clean(value).into_owned()))
        })
        .collect()
}

/// Result of a successful repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Whether a patch request was sent.
    pub patched: bool,
    /// Whether any of the four fields still needs cleaning afterwards.
    pub still_dirty: bool,
    /// The record with its selected fields cleaned.
    pub object: MetadataObject,
    pub operations: Vec<PatchOperation>,
}

impl RepairOutcome {
    /// Row event implied by this outcome.
    pub fn event(&self) -> RowEvent {
        RowEvent::Repaired {
            still_dirty: self.still_dirty,
        }
    }
}

/// Repairs records of one collection under one field selection.
pub struct Remediator<'a> {
    store: &'a dyn RemoteStore,
    kind: CollectionType,
    selection: FieldSelection,
}

impl<'a> Remediator<'a> {
    pub fn new(store: &'a dyn RemoteStore, kind: CollectionType, selection: FieldSelection) -> Self {
        Self {
            store,
            kind,
            selection,
        }
    }

    /// Repair `object`, whose row is currently in `state`.
    ///
    /// Rejects anything but a `Ready` row before touching the store. A store
    /// failure is returned as-is; `object` is left unmodified either way.
    pub async fn repair(&self, object: &MetadataObject, state: RowState) -> Result<RepairOutcome> {
        if !state.can_repair() {
            return Err(MetafixError::RepairNotPermitted {
                id: object.id.clone(),
                state,
            });
        }

        let operations = plan(object, &self.selection);
        let patched = !operations.is_empty();
        if patched {
            self.store.patch(self.kind, &object.id, &operations).await?;
            info!(
                "Patched {} {} ({} fields)",
                self.kind,
                object.id,
                operations.len()
            );
        } else {
            debug!("Nothing to patch for {} {}", self.kind, object.id);
        }

        let mut repaired = object.clone();
        for field in self.selection.iter() {
            if let Some(value) = object.get(field) {
                repaired.set(field, clean(value).into_owned());
            }
        }
        let still_dirty = repaired.needs_cleaning();

        Ok(RepairOutcome {
            patched,
            still_dirty,
            object: repaired,
            operations,
        })
    }
}
