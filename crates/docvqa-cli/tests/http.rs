//! Integration tests for the HTTP transport

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt; // for oneshot

use docvqa_cli::server::{create_router, AppState, ErrorResponse};
use docvqa_core::{AskResponse, Document, NO_ANSWER_MESSAGE};
use docvqa_runtime::testing::{ScriptedProvider, StaticExtractor, StaticSearch, Task};
use docvqa_runtime::{Orchestrator, RuntimeConfig};

const BOUNDARY: &str = "docvqa-test-boundary";

fn app(provider: ScriptedProvider, extractor: Option<StaticExtractor>) -> Router {
    let mut config = RuntimeConfig::default();
    config.retry.max_attempts = 1;

    let mut builder = Orchestrator::builder()
        .config(config)
        .provider(Arc::new(provider))
        .search(Arc::new(StaticSearch::new(vec![Document::new(
            "Điều 5. Quyền của người lao động",
        )
        .with_source("bo_luat_lao_dong_2019.txt")])));
    if let Some(extractor) = extractor {
        builder = builder.extractor(Arc::new(extractor));
    }

    create_router(AppState::new(builder.build().unwrap()))
}

fn json_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_request(question: Option<&str>, image: Option<&[u8]>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(question) = question {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"question\"\r\n\r\n{question}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"scan.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/chat/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_chat_answers_with_citations() {
    let response = app(ScriptedProvider::new(), None)
        .oneshot(json_request(r#"{"question": "Điều 5 quy định gì?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_bytes(response).await;
    let answer: AskResponse = serde_json::from_slice(&body).unwrap();
    assert!(!answer.answer.is_empty());
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(
        answer.citations[0].source.as_deref(),
        Some("bo_luat_lao_dong_2019.txt")
    );

    // Absent optional fields are omitted, not null
    let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(raw.get("document_context").is_none());
}

#[tokio::test]
async fn test_chat_echoes_document_context() {
    let response = app(ScriptedProvider::new(), None)
        .oneshot(json_request(
            r#"{"question": "Hợp đồng có hợp lệ không?", "document_context": "HỢP ĐỒNG LAO ĐỘNG"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let answer: AskResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(answer.document_context.as_deref(), Some("HỢP ĐỒNG LAO ĐỘNG"));
    assert_eq!(answer.contradictions, Some(vec![]));
}

#[tokio::test]
async fn test_empty_question_is_bad_request() {
    let response = app(ScriptedProvider::new(), None)
        .oneshot(json_request(r#"{"question": "   "}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(error.error.contains("empty"));
}

#[tokio::test]
async fn test_missing_question_field_is_rejected() {
    let response = app(ScriptedProvider::new(), None)
        .oneshot(json_request(r#"{"document_context": "HỢP ĐỒNG"}"#))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_generation_failure_is_bad_gateway() {
    let response = app(ScriptedProvider::new().fail(Task::Generation), None)
        .oneshot(json_request(r#"{"question": "Điều 5 quy định gì?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(error.error.contains("scripted failure"));
}

#[tokio::test]
async fn test_no_answer_is_a_normal_response() {
    let provider = ScriptedProvider::new()
        .respond(Task::Relevance, r#"{"score": "irrelevant"}"#)
        .respond_with(Task::Rewrite, |_, i| Ok(format!("Câu hỏi viết lại lần {}", i + 1)));

    let response = app(provider, None)
        .oneshot(json_request(r#"{"question": "Luật nói gì về nghỉ phép?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let answer: AskResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(answer.answer, NO_ANSWER_MESSAGE);
    assert!(answer.citations.is_empty());
    assert_eq!(answer.contradictions, None);
}

#[tokio::test]
async fn test_upload_extracts_image_text() {
    let extractor = StaticExtractor::text("# HỢP ĐỒNG THUÊ NHÀ\n\nBên A: Nguyễn Văn A");
    let response = app(ScriptedProvider::new(), Some(extractor))
        .oneshot(multipart_request(
            Some("Hợp đồng này có điều khoản nào bất lợi?"),
            Some(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10][..]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let answer: AskResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(
        answer.document_context.as_deref(),
        Some("# HỢP ĐỒNG THUÊ NHÀ\n\nBên A: Nguyễn Văn A")
    );
}

#[tokio::test]
async fn test_upload_without_image_answers_question() {
    let response = app(ScriptedProvider::new(), None)
        .oneshot(multipart_request(Some("Điều 5 quy định gì?"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let answer: AskResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(answer.document_context, None);
    assert_eq!(answer.citations.len(), 1);
}

#[tokio::test]
async fn test_upload_without_question_is_bad_request() {
    let response = app(ScriptedProvider::new(), None)
        .oneshot(multipart_request(None, Some(&b"image"[..])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(error.error.contains("question"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"question": "q"}"#))
        .unwrap();

    let response = app(ScriptedProvider::new(), None).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
