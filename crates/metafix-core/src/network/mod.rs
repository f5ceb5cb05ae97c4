//! Network access to the metadata store.
//!
//! This module provides:
//! - The DHIS2 Web API client implementing [`crate::store::RemoteStore`]
//! - Retry with exponential backoff for the read-only scan

mod client;
mod retry;

pub use client::Dhis2Client;
pub use retry::{retry_async, RetryConfig};
