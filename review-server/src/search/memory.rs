//! In-process `SearchIndex` for tests and local runs without Elasticsearch.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use review_core::{Review, ReviewDocument, StoreId};

use super::{SearchError, SearchIndex, SearchPage};

#[derive(Default)]
pub struct InMemoryIndex {
    documents: RwLock<HashMap<StoreId, Vec<Value>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw document to the store's hit list.
    pub async fn insert(&self, store_id: StoreId, document: Value) {
        self.documents
            .write()
            .await
            .entry(store_id)
            .or_default()
            .push(document);
    }

    pub async fn index_review(&self, review: &Review) -> Result<(), SearchError> {
        let document = serde_json::to_value(ReviewDocument::from(review))
            .map_err(|e| SearchError::Malformed(e.to_string()))?;
        self.insert(review.store_id, document).await;
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn search_by_store(
        &self,
        store_id: StoreId,
        offset: u64,
        limit: u64,
    ) -> Result<SearchPage, SearchError> {
        let documents = self.documents.read().await;
        let Some(hits) = documents.get(&store_id) else {
            return Ok(SearchPage::default());
        };

        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(SearchPage {
            total: hits.len() as u64,
            documents: hits.iter().skip(skip).take(take).cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_store_is_empty() {
        let index = InMemoryIndex::new();
        let page = index.search_by_store(StoreId(1), 0, 10).await.unwrap();
        assert_eq!(page, SearchPage::default());
    }

    #[tokio::test]
    async fn test_window_applies_to_store_hits_only() {
        let index = InMemoryIndex::new();
        for i in 0..5 {
            index.insert(StoreId(1), json!({ "review_id": i })).await;
        }
        index.insert(StoreId(2), json!({ "review_id": 99 })).await;

        let page = index.search_by_store(StoreId(1), 3, 10).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.documents, vec![json!({ "review_id": 3 }), json!({ "review_id": 4 })]);

        let beyond = index.search_by_store(StoreId(1), 10, 10).await.unwrap();
        assert_eq!(beyond.total, 5);
        assert!(beyond.documents.is_empty());
    }
}
