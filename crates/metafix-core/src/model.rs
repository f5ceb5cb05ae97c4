//! Metadata records, field selection, and the patch wire types.

use crate::error::{MetafixError, Result};
use crate::sanitize::{clean, needs_cleaning_opt};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One of the four text fields subject to cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Name,
    ShortName,
    Code,
    Description,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Name, Field::ShortName, Field::Code, Field::Description];

    /// Property name in the store's API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::ShortName => "shortName",
            Field::Code => "code",
            Field::Description => "description",
        }
    }

    /// Display label used in summaries, e.g. `ShortName`.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::ShortName => "ShortName",
            Field::Code => "Code",
            Field::Description => "Description",
        }
    }

    /// JSON-Patch path for this field.
    pub fn path(&self) -> String {
        format!("/{}", self.as_str())
    }

    pub fn from_api_name(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.as_str() == s)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which fields take part in detection and repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelection {
    pub name: bool,
    pub short_name: bool,
    pub code: bool,
    pub description: bool,
}

impl Default for FieldSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl FieldSelection {
    pub const fn all() -> Self {
        Self {
            name: true,
            short_name: true,
            code: true,
            description: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            name: false,
            short_name: false,
            code: false,
            description: false,
        }
    }

    /// A selection containing exactly one field.
    pub fn only(field: Field) -> Self {
        Self::none().with(field, true)
    }

    /// Return a copy with `field` switched on or off.
    pub fn with(mut self, field: Field, enabled: bool) -> Self {
        match field {
            Field::Name => self.name = enabled,
            Field::ShortName => self.short_name = enabled,
            Field::Code => self.code = enabled,
            Field::Description => self.description = enabled,
        }
        self
    }

    pub fn contains(&self, field: Field) -> bool {
        match field {
            Field::Name => self.name,
            Field::ShortName => self.short_name,
            Field::Code => self.code,
            Field::Description => self.description,
        }
    }

    /// Selected fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        Field::ALL.into_iter().filter(|field| self.contains(*field))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl FromStr for FieldSelection {
    type Err = MetafixError;

    /// Parse a comma-separated list such as `name,shortName`.
    fn from_str(s: &str) -> Result<Self> {
        let mut selection = FieldSelection::none();
        for part in s.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let field = Field::from_api_name(part).ok_or_else(|| MetafixError::Validation {
                field: "fields".to_string(),
                message: format!("Unknown field '{}'", part),
            })?;
            selection = selection.with(field, true);
        }
        if selection.is_empty() {
            return Err(MetafixError::Validation {
                field: "fields".to_string(),
                message: "At least one field must be selected".to_string(),
            });
        }
        Ok(selection)
    }
}

/// A metadata record as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataObject {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetadataObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            short_name: None,
            code: None,
            description: None,
        }
    }

    /// Builder-style setter, mostly for fixtures.
    pub fn with_field(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value.into());
        self
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Name => self.name.as_deref(),
            Field::ShortName => self.short_name.as_deref(),
            Field::Code => self.code.as_deref(),
            Field::Description => self.description.as_deref(),
        }
    }

    pub fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Name => &mut self.name,
            Field::ShortName => &mut self.short_name,
            Field::Code => &mut self.code,
            Field::Description => &mut self.description,
        };
        *slot = Some(value);
    }

    /// True when any of the four fields still needs cleaning.
    pub fn needs_cleaning(&self) -> bool {
        Field::ALL
            .iter()
            .any(|field| needs_cleaning_opt(self.get(*field)))
    }

    /// Dirty fields among the selected ones.
    pub fn dirty_fields(&self, selection: &FieldSelection) -> Vec<Field> {
        selection
            .iter()
            .filter(|field| needs_cleaning_opt(self.get(*field)))
            .collect()
    }

    /// Name shown in summaries: cleaned name, else cleaned short name, else id.
    pub fn display_name(&self) -> String {
        [Field::Name, Field::ShortName]
            .iter()
            .filter_map(|field| self.get(*field))
            .map(|value| clean(value).into_owned())
            .find(|value| !value.is_empty())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// A reference to another record returned by an equality lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

/// A would-be duplicate value on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub object_id: String,
    pub object_name: String,
    pub field: Field,
    pub conflicting_object_id: String,
}

/// JSON-Patch operation kinds understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Sets the value, whether or not the path exists.
    Add,
}

/// One field-level patch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: String,
}

impl PatchOperation {
    /// Set `field` to `value`.
    pub fn set(field: Field, value: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Add,
            path: field.path(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_object_deserializes_camel_case() {
        let object: MetadataObject = serde_json::from_value(json!({
            "id": "fbfJHSPpUQD",
            "name": "ANC 1st visit ",
            "shortName": "ANC  1",
            "code": "DE_359596"
        }))
        .unwrap();

        assert_eq!(object.id, "fbfJHSPpUQD");
        assert_eq!(object.get(Field::ShortName), Some("ANC  1"));
        assert_eq!(object.get(Field::Description), None);
        assert!(object.needs_cleaning());
    }

    #[test]
    fn test_dirty_fields_respects_selection() {
        let object = MetadataObject::new("A1")
            .with_field(Field::Name, "  Acme  ")
            .with_field(Field::Code, "AC 1 ");
        let selection = FieldSelection::only(Field::Name);

        assert_eq!(object.dirty_fields(&selection), vec![Field::Name]);
        assert_eq!(
            object.dirty_fields(&FieldSelection::all()),
            vec![Field::Name, Field::Code]
        );
    }

    #[test]
    fn test_display_name_fallbacks() {
        let object = MetadataObject::new("A1").with_field(Field::Name, "  Acme  ");
        assert_eq!(object.display_name(), "Acme");

        let object = MetadataObject::new("A2").with_field(Field::ShortName, "Ac ");
        assert_eq!(object.display_name(), "Ac");

        assert_eq!(MetadataObject::new("A3").display_name(), "A3");
    }

    #[test]
    fn test_field_selection_parse() {
        let selection: FieldSelection = "name, shortName".parse().unwrap();
        assert!(selection.contains(Field::Name));
        assert!(selection.contains(Field::ShortName));
        assert!(!selection.contains(Field::Code));

        assert!("name,title".parse::<FieldSelection>().is_err());
        assert!("".parse::<FieldSelection>().is_err());
    }

    #[test]
    fn test_field_selection_iter_order() {
        let selection = FieldSelection::none()
            .with(Field::Description, true)
            .with(Field::Name, true);
        let fields: Vec<Field> = selection.iter().collect();
        assert_eq!(fields, vec![Field::Name, Field::Description]);
        assert!(FieldSelection::none().is_empty());
    }

    #[test]
    fn test_patch_operation_wire_format() {
        let op = PatchOperation::set(Field::ShortName, "Acme");
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "add", "path": "/shortName", "value": "Acme"})
        );
    }
}
