//! Qdrant REST vector search.
//!
//! Points carry a payload of `{page_content, metadata}`. Queries are embedded
//! with the configured embeddings model before search.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use docvqa_core::Document;

use super::{SearchError, VectorSearch};
use crate::providers::{http, ApiCredential, OpenAiEmbeddings, ProviderError};

/// Environment variable name for the Qdrant API key.
pub const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";

/// A chunk ready for indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub content: String,
    pub metadata: BTreeMap<String, JsonValue>,
}

/// Vector search backed by a Qdrant collection.
pub struct QdrantSearch {
    url: String,
    collection: String,
    api_key: Option<ApiCredential>,
    embeddings: OpenAiEmbeddings,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for QdrantSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantSearch")
            .field("url", &self.url)
            .field("collection", &self.collection)
            .field("api_key", &self.api_key)
            .field("embeddings", &self.embeddings)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    page_content: String,
    #[serde(default)]
    metadata: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    points: Vec<Point>,
}

#[derive(Debug, Serialize)]
struct Point {
    id: String,
    vector: Vec<f32>,
    payload: Payload,
}

impl QdrantSearch {
    pub fn new(
        url: impl Into<String>,
        collection: impl Into<String>,
        api_key: Option<ApiCredential>,
        embeddings: OpenAiEmbeddings,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            url: url.into(),
            collection: collection.into(),
            api_key,
            embeddings,
            timeout,
            client: http::build_client(timeout)?,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = http::join_url(&self.url, path);
        let builder = self.client.request(method, url).timeout(self.timeout);
        match &self.api_key {
            Some(key) => builder.header("api-key", key.expose()),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = builder
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;
        http::check_status(response).await
    }

    /// Drop the collection if present and create it empty.
    pub async fn recreate_collection(&self, dimension: usize) -> Result<(), SearchError> {
        let path = format!("collections/{}", self.collection);

        match self.send(self.request(reqwest::Method::DELETE, &path)).await {
            Ok(_) | Err(ProviderError::ApiError { status: 404, .. }) => {}
            Err(e) => return Err(SearchError::Backend(e)),
        }

        let body = serde_json::json!({
            "vectors": {"size": dimension, "distance": "Cosine"}
        });
        self.send(self.request(reqwest::Method::PUT, &path).json(&body))
            .await
            .map_err(SearchError::Backend)?;

        tracing::info!(collection = %self.collection, dimension, "Collection recreated");
        Ok(())
    }

    /// Upsert chunks with precomputed vectors.
    pub async fn upsert(
        &self,
        chunks: &[IndexedChunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), SearchError> {
        if chunks.len() != vectors.len() {
            return Err(SearchError::Malformed(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let points = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| Point {
                id: uuid::Uuid::new_v4().to_string(),
                vector,
                payload: Payload {
                    page_content: chunk.content.clone(),
                    metadata: chunk.metadata.clone(),
                },
            })
            .collect();

        let path = format!("collections/{}/points?wait=true", self.collection);
        self.send(
            self.request(reqwest::Method::PUT, &path)
                .json(&UpsertRequest { points }),
        )
        .await
        .map_err(SearchError::Backend)?;

        Ok(())
    }

    /// Embed and index `chunks` into a freshly recreated collection.
    ///
    /// Returns the number of points written.
    pub async fn rebuild(
        &self,
        chunks: &[IndexedChunk],
        batch_size: usize,
    ) -> Result<usize, SearchError> {
        let mut written = 0;
        let mut created = false;

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self
                .embeddings
                .embed(&texts)
                .await
                .map_err(SearchError::Embedding)?;

            if !created {
                let dimension = vectors.first().map(Vec::len).unwrap_or_default();
                self.recreate_collection(dimension).await?;
                created = true;
            }

            self.upsert(batch, vectors).await?;
            written += batch.len();
            tracing::debug!(written, total = chunks.len(), "Upserted batch");
        }

        Ok(written)
    }
}

#[async_trait]
impl VectorSearch for QdrantSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, SearchError> {
        let vector = self
            .embeddings
            .embed_one(query)
            .await
            .map_err(SearchError::Embedding)?;

        let path = format!("collections/{}/points/search", self.collection);
        let response = self
            .send(self.request(reqwest::Method::POST, &path).json(&SearchRequest {
                vector: &vector,
                limit: k,
                with_payload: true,
            }))
            .await
            .map_err(SearchError::Backend)?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Malformed(e.to_string()))?;

        Ok(into_documents(body))
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

fn into_documents(body: SearchResponse) -> Vec<Document> {
    body.result
        .into_iter()
        .filter_map(|point| point.payload)
        .map(|payload| Document {
            content: payload.page_content,
            source_metadata: payload.metadata,
        })
        .collect()
}
