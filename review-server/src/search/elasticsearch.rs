//! Elasticsearch-backed `SearchIndex`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use review_core::StoreId;

use super::{SearchError, SearchIndex, SearchPage};

pub struct ElasticsearchIndex {
    client: Client,
    search_url: String,
}

impl ElasticsearchIndex {
    pub fn new(address: &str, index: &str) -> Result<Self, SearchError> {
        let client = Client::builder()
            .user_agent(concat!("review-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            search_url: search_url(address, index),
        })
    }
}

fn search_url(address: &str, index: &str) -> String {
    format!("{}/{}/_search", address.trim_end_matches('/'), index)
}

/// Filter-context term query, so hits are not scored.
pub(crate) fn build_query(store_id: StoreId, offset: u64, limit: u64) -> Value {
    json!({
        "from": offset,
        "size": limit,
        "query": {
            "bool": {
                "filter": [
                    { "term": { "store_id": store_id.0 } }
                ]
            }
        }
    })
}

pub(crate) fn parse_response(body: &Value) -> Result<SearchPage, SearchError> {
    let hits = body
        .get("hits")
        .ok_or_else(|| SearchError::Malformed("missing hits".to_string()))?;

    // `hits.total` is an object since Elasticsearch 7 and a bare number before.
    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(total) => total.get("value").and_then(Value::as_u64),
        None => None,
    }
    .ok_or_else(|| SearchError::Malformed("missing hits.total".to_string()))?;

    let documents = hits
        .get("hits")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::Malformed("missing hits.hits".to_string()))?
        .iter()
        .filter_map(|hit| hit.get("_source").cloned())
        .collect();

    Ok(SearchPage { total, documents })
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn search_by_store(
        &self,
        store_id: StoreId,
        offset: u64,
        limit: u64,
    ) -> Result<SearchPage, SearchError> {
        let response = self
            .client
            .post(&self.search_url)
            .json(&build_query(store_id, offset, limit))
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::Malformed(e.to_string()))?;
        let page = parse_response(&body)?;
        debug!(
            store_id = %store_id,
            total = page.total,
            returned = page.documents.len(),
            "search by store"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_strips_trailing_slash() {
        assert_eq!(
            search_url("http://es:9200/", "review"),
            "http://es:9200/review/_search"
        );
        assert_eq!(
            search_url("http://es:9200", "review"),
            "http://es:9200/review/_search"
        );
    }

    #[test]
    fn test_query_filters_on_store_with_window() {
        let query = build_query(StoreId(5), 20, 10);
        assert_eq!(query["from"], 20);
        assert_eq!(query["size"], 10);
        assert_eq!(query["query"]["bool"]["filter"][0]["term"]["store_id"], 5);
    }

    #[test]
    fn test_parse_response_collects_sources() {
        let body = json!({
            "took": 3,
            "hits": {
                "total": { "value": 42, "relation": "eq" },
                "hits": [
                    { "_id": "1", "_source": { "review_id": "1", "store_id": "5" } },
                    { "_id": "2" },
                    { "_id": "3", "_source": { "review_id": 3, "store_id": 5 } }
                ]
            }
        });

        let page = parse_response(&body).unwrap();
        assert_eq!(page.total, 42);
        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.documents[0]["review_id"], "1");
    }

    #[test]
    fn test_parse_response_accepts_legacy_total() {
        let body = json!({ "hits": { "total": 7, "hits": [] } });
        let page = parse_response(&body).unwrap();
        assert_eq!(page.total, 7);
        assert!(page.documents.is_empty());
    }

    #[test]
    fn test_parse_response_rejects_missing_hits() {
        let err = parse_response(&json!({ "error": "boom" })).unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));
    }
}
