//! Metafix Core - Conflict-aware whitespace cleanup for DHIS2 metadata.
//!
//! Finds metadata records whose name, short name, code, or description carry
//! leading, trailing, or repeated whitespace, checks whether the cleaned
//! values would collide with other records, and patches only the records that
//! are safe to change.
//!
//! # Example
//!
//! ```rust,ignore
//! use metafix_core::{CollectionType, Credentials, Dhis2Client, EngineConfig, ServerConfig, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> metafix_core::Result<()> {
//!     let server = ServerConfig::new("https://play.dhis2.org/dev", Credentials::None)?;
//!     let mut session = Session::new(Arc::new(Dhis2Client::new(server)?), EngineConfig::default());
//!
//!     session.scan().await?;
//!     let ids = session.ids(CollectionType::DataElements);
//!     let checked = session.check_many(CollectionType::DataElements, &ids).await;
//!     println!("{}", checked.message());
//!
//!     let fixed = session.fix_many(CollectionType::DataElements, &ids).await;
//!     println!("{}", fixed.message());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod detect;
pub mod error;
pub mod merge;
pub mod model;
pub mod network;
pub mod remediate;
pub mod sanitize;
pub mod session;
pub mod state;
pub mod store;
pub mod working_set;

// Re-export commonly used types
pub use batch::{AggregateResult, BatchItem, BatchProgress, BatchScheduler, ItemFailure};
pub use config::{CollectionType, Credentials, EngineConfig, ServerConfig};
pub use detect::{BatchPeers, ConflictDetector, ConflictOutcome};
pub use error::{MetafixError, Result};
pub use merge::{merge_responses, ResultMerger};
pub use model::{ConflictRecord, Field, FieldSelection, MetadataObject, PatchOperation};
pub use network::Dhis2Client;
pub use remediate::{RepairOutcome, Remediator};
pub use session::{CheckSummary, FixSummary, RepairReport, RepairStatus, ScanReport, Session};
pub use state::{RowEvent, RowState, Transition};
pub use store::{RemoteStore, ScanQuery};
pub use working_set::{Collection, WorkingSet};
