//! Vision-model OCR over an OpenAI-compatible chat endpoint.
//!
//! The page image is sent inline as a `data:` URI next to an OCR prompt that
//! asks for Markdown with the document's heading hierarchy and tables intact.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ExtractionError, ImageExtractor, ImageInput};
use crate::providers::{http, ApiCredential, ProviderError};

/// Environment variable name for the vision API key.
pub const DEEPSEEK_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Instruction sent with every page image.
pub const OCR_PROMPT: &str = r#"Bạn là một hệ thống OCR chuyên nghiệp. Nhiệm vụ của bạn là trích xuất văn bản từ ảnh tài liệu pháp lý tiếng Việt.

Yêu cầu:
1. Trích xuất CHÍNH XÁC tất cả văn bản trong ảnh
2. Bảo toàn cấu trúc phân cấp của tài liệu:
   - Sử dụng # cho tiêu đề chính
   - Sử dụng ## cho tiêu đề phụ
   - Sử dụng ### cho tiêu đề nhỏ hơn
3. Bảo toàn định dạng bảng biểu:
   - Sử dụng Markdown table syntax (| cột1 | cột2 |)
   - Giữ nguyên số hàng và cột
4. Giữ nguyên số thứ tự, điều khoản, khoản, điểm
5. Không thêm thông tin không có trong ảnh
6. Giữ nguyên định dạng ngày tháng, số tiền, địa chỉ

Xuất ra định dạng Markdown hoàn chỉnh."#;

const OCR_TEMPERATURE: f32 = 0.1;

/// OCR through a vision-capable chat model.
pub struct VisionExtractor {
    credential: ApiCredential,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for VisionExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionExtractor")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct VisionRequest<'a> {
    model: &'a str,
    messages: [VisionMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct VisionMessage<'a> {
    role: &'static str,
    content: [ContentPart<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    choices: Vec<VisionChoice>,
}

#[derive(Debug, Deserialize)]
struct VisionChoice {
    message: VisionContent,
}

#[derive(Debug, Deserialize)]
struct VisionContent {
    content: Option<String>,
}

impl VisionExtractor {
    pub fn new(
        credential: ApiCredential,
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            credential,
            base_url: base_url.into(),
            model: model.into(),
            max_tokens,
            timeout,
            client: http::build_client(timeout)?,
        })
    }

    fn request_body<'a>(&'a self, base64_image: &str) -> VisionRequest<'a> {
        VisionRequest {
            model: &self.model,
            messages: [VisionMessage {
                role: "user",
                content: [
                    ContentPart::Text { text: OCR_PROMPT },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{}", base64_image),
                        },
                    },
                ],
            }],
            temperature: OCR_TEMPERATURE,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl ImageExtractor for VisionExtractor {
    async fn extract(&self, image: ImageInput) -> Result<String, ExtractionError> {
        let encoded = image.to_base64()?;

        let response = self
            .client
            .post(http::join_url(&self.base_url, "v1/chat/completions"))
            .bearer_auth(self.credential.expose())
            .timeout(self.timeout)
            .json(&self.request_body(&encoded))
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;

        let body: VisionResponse = http::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ExtractionError::Empty)?;

        tracing::info!(chars = text.chars().count(), model = %self.model, "Vision extraction succeeded");
        Ok(text)
    }

    fn name(&self) -> &str {
        "vision"
    }
}
