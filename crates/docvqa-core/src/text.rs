//! Text helpers for prompt assembly and response parsing.
//!
//! Legal text here is Vietnamese, so every bound is counted in characters,
//! never bytes.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::Document;

/// Characters of document text appended to the retrieval query.
pub const SEARCH_HINT_CHARS: usize = 500;

/// Characters of each input sent to the contradiction detector.
pub const CONTRADICTION_INPUT_CHARS: usize = 2000;

/// Returned when the relevance streak ends the request.
pub const NO_ANSWER_MESSAGE: &str =
    "Xin lỗi, tôi không tìm thấy thông tin liên quan để trả lời câu hỏi của bạn.";

/// Returned when a loop guard ends the request.
pub const EXHAUSTED_MESSAGE: &str =
    "Xin lỗi, tôi chưa thể đưa ra câu trả lời đủ tin cậy cho câu hỏi của bạn. Vui lòng diễn đạt lại câu hỏi.";

lazy_static! {
    // Markdown headings and horizontal rules
    static ref NON_ITEM_LINE: Regex = Regex::new(r"^(#.*|[-=*_]{3,})$").unwrap();
}

/// The first `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Retrieval query: the question, plus a bounded document prefix as a hint.
pub fn search_string(question: &str, document_text: Option<&str>) -> String {
    match document_text {
        Some(text) if !text.is_empty() => format!(
            "{}\n\nNgữ cảnh từ tài liệu:\n{}",
            question,
            truncate_chars(text, SEARCH_HINT_CHARS)
        ),
        _ => question.to_string(),
    }
}

/// Generator context: a document section, then enumerated provisions.
///
/// Either section is omitted when empty; both empty gives `""`.
pub fn generation_context(document_text: Option<&str>, provisions: &[Document]) -> String {
    let mut context = String::new();

    if let Some(text) = document_text.filter(|t| !t.is_empty()) {
        context.push_str("NỘI DUNG TÀI LIỆU:\n");
        context.push_str(text);
        context.push_str("\n\n");
    }

    if !provisions.is_empty() {
        let enumerated = provisions
            .iter()
            .enumerate()
            .map(|(i, doc)| format!("Điều luật {}:\n{}", i + 1, doc.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        context.push_str("CÁC ĐIỀU LUẬT LIÊN QUAN:\n");
        context.push_str(&enumerated);
        context.push_str("\n\n");
    }

    context
}

/// Provision contents joined by blank lines.
pub fn join_provisions(provisions: &[Document]) -> String {
    provisions
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split a contradiction report into items.
///
/// One item per line; blank lines, headings, and horizontal rules are
/// dropped.
pub fn parse_contradictions(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !NON_ITEM_LINE.is_match(line))
        .map(str::to_string)
        .collect()
}
