//! Document extraction gate.

use docvqa_core::{NodeResult, RequestState};

use super::Collaborators;
use crate::collaborators::ImageInput;

/// Resolve document text.
///
/// Existing text passes through untouched and no collaborator is called.
/// Otherwise an attached image is sent to the extractor; any failure
/// yields empty text and the request continues.
pub async fn extract(collaborators: &Collaborators, state: &RequestState) -> NodeResult {
    if let Some(text) = state.document() {
        tracing::info!(chars = text.chars().count(), "Document text supplied, skipping extraction");
        return NodeResult::Extracted {
            text: text.to_string(),
        };
    }

    let Some(image) = state.image_base64.as_deref().filter(|image| !image.is_empty()) else {
        tracing::info!("No document or image supplied");
        return NodeResult::Extracted {
            text: String::new(),
        };
    };

    tracing::info!("Extracting document text from image");
    let text = match collaborators
        .extract_image(ImageInput::Base64(image.to_string()))
        .await
    {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "Image extraction failed, continuing without document text");
            String::new()
        }
    };

    NodeResult::Extracted { text }
}
