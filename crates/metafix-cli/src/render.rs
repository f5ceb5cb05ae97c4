//! Plain-text rendering of records, conflicts, and failures.

use metafix_core::model::PatchOperation;
use metafix_core::sanitize::highlight;
use metafix_core::{Collection, ConflictRecord, Field, ItemFailure};

/// Marker printed in place of each offending whitespace character.
const WHITESPACE_MARK: char = '·';

/// Show a value with its offending whitespace made visible.
pub fn visible(value: &str) -> String {
    highlight(value)
        .into_iter()
        .map(|segment| {
            if segment.whitespace {
                segment.text.chars().map(|_| WHITESPACE_MARK).collect()
            } else {
                segment.text.to_string()
            }
        })
        .collect()
}

/// Dirty records of one collection, one line per dirty field.
pub fn collection(collection: &Collection) -> String {
    let mut out = format!(
        "{} ({} objects)\n",
        collection.kind().title(),
        collection.len()
    );
    for object in collection.objects() {
        for field in Field::ALL {
            let Some(value) = object.get(field) else {
                continue;
            };
            if metafix_core::sanitize::needs_cleaning(value) {
                out.push_str(&format!(
                    "  {:<11}  {:<11}  \"{}\"\n",
                    object.id,
                    field.label(),
                    visible(value)
                ));
            }
        }
    }
    out
}

pub fn conflicts(conflicts: &[ConflictRecord]) -> String {
    let mut out = format!(
        "  {:<11}  {:<30}  {:<11}  {}\n",
        "ID", "Object name", "Field", "Conflicting object"
    );
    for conflict in conflicts {
        out.push_str(&format!(
            "  {:<11}  {:<30}  {:<11}  {}\n",
            conflict.object_id,
            conflict.object_name,
            conflict.field.label(),
            conflict.conflicting_object_id
        ));
    }
    out
}

pub fn failures(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("  {} ({}): {}\n", failure.id, failure.name, failure.message))
        .collect()
}

/// Patch operations that a repair would send.
pub fn planned(id: &str, operations: &[PatchOperation]) -> String {
    let mut out = format!("  PATCH {}\n", id);
    for operation in operations {
        out.push_str(&format!("    {} = \"{}\"\n", operation.path, operation.value));
    }
    out
}
