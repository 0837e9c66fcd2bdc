//! Google Drive access
//!
//! Listing and content retrieval are expressed as traits so the pipeline can
//! run against the real API client or an in-memory drive.

pub mod client;
pub mod content;
pub mod errors;
pub mod listing;
pub mod types;

pub use client::DriveClient;
pub use content::{
    retrieve_content, ContentBackend, RetrievalFailure, RetrievalStrategy, DEFAULT_STRATEGIES,
};
pub use errors::DriveError;
pub use listing::{list_children, ListingBackend};
pub use types::*;
