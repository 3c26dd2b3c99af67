//! Vector search and image extraction capability interfaces.
//!
//! Both are shared `Send + Sync` trait objects; one instance serves every
//! in-flight request.

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;

use docvqa_core::Document;

use crate::providers::ProviderError;

#[cfg(feature = "qdrant")]
mod qdrant;

#[cfg(feature = "vision")]
mod vision;

#[cfg(feature = "qdrant")]
pub use qdrant::{IndexedChunk, QdrantSearch, QDRANT_API_KEY_ENV};

#[cfg(feature = "vision")]
pub use vision::{VisionExtractor, DEEPSEEK_API_KEY_ENV, OCR_PROMPT};

/// Errors from the vector index.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("Vector index request failed: {0}")]
    Backend(#[source] ProviderError),

    #[error("Malformed search result: {0}")]
    Malformed(String),
}

/// Errors from image-to-text extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid image payload: {0}")]
    InvalidImage(String),

    #[error("Vision request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Vision service returned no text")]
    Empty,
}

/// Semantic search over indexed provisions.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `k` documents in the index's own ranking order.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, SearchError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// An image to extract text from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    Bytes(Vec<u8>),
    Base64(String),
}

impl ImageInput {
    /// Base64 payload, encoding raw bytes if needed.
    ///
    /// A `data:` URI prefix is stripped; the remainder must decode.
    pub fn to_base64(&self) -> Result<String, ExtractionError> {
        match self {
            ImageInput::Bytes(bytes) if bytes.is_empty() => {
                Err(ExtractionError::InvalidImage("empty image".to_string()))
            }
            ImageInput::Bytes(bytes) => Ok(base64::engine::general_purpose::STANDARD.encode(bytes)),
            ImageInput::Base64(encoded) => {
                let payload = match encoded.split_once(";base64,") {
                    Some((_, rest)) => rest,
                    None => encoded.as_str(),
                };
                let payload = payload.trim();
                base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .map_err(|e| ExtractionError::InvalidImage(e.to_string()))?;
                Ok(payload.to_string())
            }
        }
    }
}

/// Converts a scanned page to Markdown.
#[async_trait]
pub trait ImageExtractor: Send + Sync {
    async fn extract(&self, image: ImageInput) -> Result<String, ExtractionError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_are_encoded() {
        let input = ImageInput::Bytes(vec![0xff, 0xd8, 0xff]);
        assert_eq!(input.to_base64().unwrap(), "/9j/");
    }

    #[test]
    fn test_data_uri_prefix_is_stripped() {
        let input = ImageInput::Base64("data:image/jpeg;base64,/9j/".to_string());
        assert_eq!(input.to_base64().unwrap(), "/9j/");
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let input = ImageInput::Base64("not base64!!".to_string());
        assert!(matches!(input.to_base64(), Err(ExtractionError::InvalidImage(_))));
        assert!(ImageInput::Bytes(vec![]).to_base64().is_err());
    }
}
