use crate::mapping::index_definition;
use crate::traits::{DocumentIndex, IndexError, IndexResult};
use async_trait::async_trait;
use docsift_core::Document;
use reqwest::{Client, StatusCode};
use std::time::Duration;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// OpenSearch (or Elasticsearch-compatible) index over the REST API
#[derive(Clone)]
pub struct OpenSearchIndex {
    client: Client,
    endpoint: String,
    index_name: String,
}

impl OpenSearchIndex {
    pub fn new(endpoint: &str, index_name: &str, timeout: Duration) -> IndexResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::ConfigError(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
        })
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.index_name)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/_doc/{}", self.index_url(), id)
    }
}

#[async_trait]
impl DocumentIndex for OpenSearchIndex {
    async fn upsert(&self, id: &str, document: &Document) -> IndexResult<()> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .put(self.document_url(id))
            .json(document)
            .send()
            .await
            .map_err(|e| IndexError::WriteFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                index = %self.index_name,
                document_id = %id,
                status = status.as_u16(),
                body = %body,
                "Index write rejected"
            );
            return Err(IndexError::WriteFailed(format!("HTTP {}: {}", status, body)));
        }

        tracing::debug!(
            index = %self.index_name,
            document_id = %id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Document upserted"
        );
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match self
            .client
            .get(format!("{}/", self.endpoint))
            .timeout(PING_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, endpoint = %self.endpoint, "Index ping failed");
                false
            }
        }
    }

    async fn create_index_if_missing(&self) -> IndexResult<bool> {
        let response = self
            .client
            .head(self.index_url())
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(index = %self.index_name, "Index already exists");
                return Ok(false);
            }
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(IndexError::RequestFailed(format!(
                    "unexpected status {} checking index {}",
                    status, self.index_name
                )))
            }
        }

        let response = self
            .client
            .put(self.index_url())
            .json(&index_definition())
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // a concurrent creator won the race
            if body.contains("resource_already_exists_exception") {
                return Ok(false);
            }
            return Err(IndexError::RequestFailed(format!(
                "HTTP {} creating index {}: {}",
                status, self.index_name, body
            )));
        }

        tracing::info!(index = %self.index_name, "Index created");
        Ok(true)
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift_core::{FileEvent, ProcessingResult};

    fn sample_document() -> Document {
        let event = FileEvent::new("docs", "a/b.txt");
        Document::new(&event, 3, "text/plain", &ProcessingResult::default(), None)
    }

    #[tokio::test]
    async fn upsert_puts_document_by_id() {
        let mut server = mockito::Server::new_async().await;
        let doc = sample_document();
        let mock = server
            .mock("PUT", format!("/file-index/_doc/{}", doc.id).as_str())
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "bucket": "docs",
                "key": "a/b.txt"
            })))
            .with_status(201)
            .with_body(r#"{"result":"created"}"#)
            .create_async()
            .await;

        let index = OpenSearchIndex::new(&server.url(), "file-index", Duration::from_secs(5)).unwrap();
        index.upsert(&doc.id, &doc).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_write_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let doc = sample_document();
        let _mock = server
            .mock("PUT", mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let index = OpenSearchIndex::new(&server.url(), "file-index", Duration::from_secs(5)).unwrap();
        let err = index.upsert(&doc.id, &doc).await.unwrap_err();
        assert!(matches!(err, IndexError::WriteFailed(_)));
    }

    #[tokio::test]
    async fn connectivity_follows_root_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"{"version":{"number":"2.11.0"}}"#)
            .create_async()
            .await;
        let index = OpenSearchIndex::new(&server.url(), "file-index", Duration::from_secs(5)).unwrap();
        assert!(index.is_connected().await);

        let unreachable =
            OpenSearchIndex::new("http://127.0.0.1:9", "file-index", Duration::from_secs(1)).unwrap();
        assert!(!unreachable.is_connected().await);
    }

    #[tokio::test]
    async fn creates_missing_index_once() {
        let mut server = mockito::Server::new_async().await;
        let head = server
            .mock("HEAD", "/file-index")
            .with_status(404)
            .create_async()
            .await;
        let create = server
            .mock("PUT", "/file-index")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "mappings": { "properties": { "id": { "type": "keyword" } } }
            })))
            .with_status(200)
            .with_body(r#"{"acknowledged":true}"#)
            .create_async()
            .await;

        let index = OpenSearchIndex::new(&server.url(), "file-index", Duration::from_secs(5)).unwrap();
        assert!(index.create_index_if_missing().await.unwrap());
        head.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn existing_index_is_left_alone() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/file-index")
            .with_status(200)
            .create_async()
            .await;
        let create = server
            .mock("PUT", "/file-index")
            .expect(0)
            .create_async()
            .await;

        let index = OpenSearchIndex::new(&server.url(), "file-index", Duration::from_secs(5)).unwrap();
        assert!(!index.create_index_if_missing().await.unwrap());
        create.assert_async().await;
    }
}
