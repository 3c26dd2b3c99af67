//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{http, secrets::ApiCredential, ProviderError};

/// Embeds text with an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbeddings {
    credential: ApiCredential,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiEmbeddings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddings")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    pub fn new(
        credential: ApiCredential,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            credential,
            base_url: base_url.into(),
            model: model.into(),
            timeout,
            client: http::build_client(timeout)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a batch, preserving input order.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(http::join_url(&self.base_url, "embeddings"))
            .bearer_auth(self.credential.expose())
            .json(&EmbeddingRequest {
                model: &self.model,
                input: inputs,
            })
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;

        let body: EmbeddingResponse = http::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        order_embeddings(body, inputs.len())
    }

    /// Embed one text.
    pub async fn embed_one(&self, input: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed(&[input.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ProviderError::ParseError("No embedding returned".to_string()))
    }
}

fn order_embeddings(
    mut body: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if body.data.len() != expected {
        return Err(ProviderError::ParseError(format!(
            "expected {} embeddings, got {}",
            expected,
            body.data.len()
        )));
    }
    body.data.sort_by_key(|d| d.index);
    Ok(body.data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddings_are_reordered_by_index() {
        let body: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [{"index": 1, "embedding": [0.2]}, {"index": 0, "embedding": [0.1]}]}"#,
        )
        .unwrap();
        assert_eq!(order_embeddings(body, 2).unwrap(), vec![vec![0.1], vec![0.2]]);
    }

    #[test]
    fn test_embedding_count_mismatch() {
        let body: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [0.1]}]}"#).unwrap();
        assert!(order_embeddings(body, 2).is_err());
    }
}
