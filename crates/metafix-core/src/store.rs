//! The remote store capability consumed by detection, repair, and scanning.
//!
//! [`crate::network::Dhis2Client`] is the HTTP implementation. Tests plug in
//! an in-memory store instead.

use crate::config::{CollectionType, ScanConfig};
use crate::error::Result;
use crate::model::{Field, ObjectRef, PatchOperation};
use async_trait::async_trait;
use serde_json::Value;

/// Where the offending whitespace sits for a scan filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanAnchor {
    /// Two consecutive spaces anywhere in the value.
    DoubleSpace,
    /// Value starts with a space.
    Leading,
    /// Value ends with a space.
    Trailing,
}

impl ScanAnchor {
    pub const ALL: [ScanAnchor; 3] = [ScanAnchor::DoubleSpace, ScanAnchor::Leading, ScanAnchor::Trailing];

    /// Filter operator in the store's dialect.
    pub fn operator(&self) -> &'static str {
        match self {
            ScanAnchor::DoubleSpace => "ilike",
            ScanAnchor::Leading => "$ilike",
            ScanAnchor::Trailing => "ilike$",
        }
    }

    /// Percent-encoded operand.
    pub fn operand(&self) -> &'static str {
        match self {
            ScanAnchor::DoubleSpace => "%20%20",
            ScanAnchor::Leading | ScanAnchor::Trailing => "%20",
        }
    }
}

/// One over-fetching filter: a field combined with an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanQuery {
    pub field: Field,
    pub anchor: ScanAnchor,
}

impl ScanQuery {
    /// Filter expression, e.g. `name:$ilike:%20`.
    pub fn filter(&self) -> String {
        format!(
            "{}:{}:{}",
            self.field.as_str(),
            self.anchor.operator(),
            self.anchor.operand()
        )
    }

    /// Every query the scan issues.
    pub fn all() -> Vec<ScanQuery> {
        ScanConfig::SCAN_FIELDS
            .iter()
            .flat_map(|field| {
                ScanAnchor::ALL.iter().map(move |anchor| ScanQuery {
                    field: *field,
                    anchor: *anchor,
                })
            })
            .collect()
    }
}

impl std::fmt::Display for ScanQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.filter())
    }
}

/// Read and patch access to a metadata store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Run one scan filter across all metadata types.
    ///
    /// Returns the raw response, keyed by collection type.
    async fn scan(&self, query: &ScanQuery) -> Result<Value>;

    /// Find records of `kind` whose `field` equals `value`, excluding `exclude_id`.
    async fn find_matching(
        &self,
        kind: CollectionType,
        field: Field,
        value: &str,
        exclude_id: &str,
    ) -> Result<Vec<ObjectRef>>;

    /// Apply all operations to one record in a single request.
    async fn patch(
        &self,
        kind: CollectionType,
        id: &str,
        operations: &[PatchOperation],
    ) -> Result<()>;
}
