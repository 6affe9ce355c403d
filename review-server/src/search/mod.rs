//! Read side: paged lookups of review documents by store.
//!
//! Documents are returned as raw JSON so the caller decides how to treat
//! entries that do not match the expected shape.

mod elasticsearch;
mod memory;

pub use elasticsearch::ElasticsearchIndex;
pub use memory::InMemoryIndex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use review_core::StoreId;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(String),

    #[error("search index returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed search response: {0}")]
    Malformed(String),
}

/// One page of hits plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub total: u64,
    pub documents: Vec<Value>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Documents whose `store_id` equals `store_id`, skipping `offset` hits
    /// and returning at most `limit`.
    async fn search_by_store(
        &self,
        store_id: StoreId,
        offset: u64,
        limit: u64,
    ) -> Result<SearchPage, SearchError>;
}
