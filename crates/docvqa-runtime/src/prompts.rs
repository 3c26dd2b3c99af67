//! Prompts for every model call in a request.
//!
//! Each builder returns the full message list. The first message is always
//! one of the system prompt constants below, so a call can be recognised by
//! its opening message alone. Dynamic content goes into user messages only.

use docvqa_core::text::{self, CONTRADICTION_INPUT_CHARS};
use docvqa_core::Document;

use crate::providers::ChatMessage;

/// Router: does the question need a provision lookup?
pub const ROUTER_SYSTEM_PROMPT: &str = r#"You are a retrieval router. Determine if the user's query requires looking up external information.

- Use 'no' for general conversation, basic coding, or universal facts.
- Use 'yes' for specific entities, paper titles, acronyms (like AgentIAD), or domain-specific queries."#;

/// Worked router decisions, sent as user/assistant turns.
pub const ROUTER_EXAMPLES: &[(&str, &str)] = &[
    ("Hi there", "no"),
    ("Viết cho tôi một đoạn code Python tính tổng", "no"),
    ("Self-RAG là gì?", "yes"),
    ("Kiến trúc của AgentIAD hoạt động như thế nào?", "yes"),
    ("Giải thích cơ chế Attention trong Transformer", "no"),
    ("So sánh Llama-2 và Llama-3", "yes"),
];

/// Binary relevance of one provision.
pub const RELEVANCE_SYSTEM_PROMPT: &str = r#"Bạn là chuyên gia đánh giá độ liên quan của điều luật.
Đánh giá xem điều luật có liên quan đến câu hỏi pháp lý không.
- 'relevant': Điều luật có liên quan trực tiếp hoặc gián tiếp đến câu hỏi
- 'irrelevant': Điều luật không liên quan đến câu hỏi

Hãy đánh giá một cách cẩn thận, vì điều luật có thể liên quan ngay cả khi không đề cập trực tiếp đến chủ đề."#;

pub const GROUNDEDNESS_SYSTEM_PROMPT: &str =
    "Assess if generation is supported by facts (fully/partially/no support).";

pub const USEFULNESS_SYSTEM_PROMPT: &str = "Rate utility 1-5.";

/// Hypothetical-answer expansion.
pub const HYDE_SYSTEM_PROMPT: &str = r#"Bạn là một chuyên gia pháp lý. Nhiệm vụ của bạn là tạo ra một đoạn văn bản giả định (hypothetical document) chứa câu trả lời lý tưởng cho câu hỏi pháp lý được đưa ra.

Đoạn văn bản này sẽ được sử dụng để tìm kiếm các điều luật thực tế trong cơ sở dữ liệu pháp lý.
Hãy viết một đoạn văn bản ngắn gọn, chứa các thuật ngữ pháp lý và nội dung liên quan đến câu hỏi."#;

/// Answer generation with a fixed reasoning procedure.
pub const GENERATION_SYSTEM_PROMPT: &str = r#"Bạn là một chuyên gia tư vấn pháp lý chuyên nghiệp. Nhiệm vụ của bạn là phân tích tài liệu pháp lý và trả lời câu hỏi dựa trên các điều luật liên quan.

QUY TRÌNH SUY LUẬN (Chain-of-Thought):
1. Đọc và hiểu nội dung tài liệu (nếu có)
2. Xác định các điều khoản/quy định trong tài liệu liên quan đến câu hỏi
3. Đối chiếu với các điều luật được cung cấp
4. Phát hiện các điểm mâu thuẫn (nếu có) giữa tài liệu và quy định pháp luật
5. Đưa ra kết luận và giải thích rõ ràng

YÊU CẦU:
- Sử dụng lập luận logic, rõ ràng
- Trích dẫn cụ thể các điều luật được sử dụng
- Nếu phát hiện mâu thuẫn, chỉ ra rõ ràng điểm nào mâu thuẫn và với điều luật nào
- Trả lời chuyên nghiệp
- Nếu không có đủ thông tin, hãy nói rõ"#;

/// Question reformulation for a fresh retrieval pass.
pub const REWRITE_SYSTEM_PROMPT: &str = r#"Bạn là chuyên gia tìm kiếm pháp lý. Nhiệm vụ của bạn là viết lại câu hỏi để tối ưu cho việc tìm kiếm các điều luật liên quan trong cơ sở dữ liệu pháp lý.

Hãy:
- Mở rộng các thuật ngữ pháp lý
- Thêm các từ khóa liên quan
- Làm rõ ý định tìm kiếm
- Giữ nguyên ý nghĩa gốc"#;

/// Document-versus-provision comparison.
pub const CONTRADICTION_SYSTEM_PROMPT: &str = r#"Bạn là chuyên gia pháp lý. Nhiệm vụ của bạn là phát hiện các điểm mâu thuẫn giữa nội dung trong tài liệu và quy định của pháp luật.

Hãy phân tích và liệt kê các điểm mâu thuẫn (nếu có). Mỗi điểm mâu thuẫn cần:
- Mô tả rõ điểm nào trong tài liệu mâu thuẫn
- Chỉ ra điều luật nào quy định khác
- Giải thích ngắn gọn về mâu thuẫn

Nếu không có mâu thuẫn, trả về danh sách rỗng.
Trả về dưới dạng danh sách các chuỗi, mỗi chuỗi là một điểm mâu thuẫn, mỗi điểm trên một dòng."#;

fn language_instruction(language: &str) -> ChatMessage {
    ChatMessage::system(format!("Write your response in {}.", language))
}

pub fn router(question: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(ROUTER_SYSTEM_PROMPT)];
    for (input, output) in ROUTER_EXAMPLES {
        messages.push(ChatMessage::user(*input));
        messages.push(ChatMessage::assistant(format!(r#"{{"decision": "{}"}}"#, output)));
    }
    messages.push(ChatMessage::user(question));
    messages
}

pub fn relevance(question: &str, provision: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(RELEVANCE_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Câu hỏi: {} \n\nĐiều luật: {}\n\nĐánh giá độ liên quan:",
            question, provision
        )),
    ]
}

pub fn groundedness(question: &str, facts: &str, answer: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(GROUNDEDNESS_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Question: {} \n Facts: {} \n Generation: {}",
            question, facts, answer
        )),
    ]
}

pub fn usefulness(question: &str, answer: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(USEFULNESS_SYSTEM_PROMPT),
        ChatMessage::user(format!("Question: {} \n Answer: {}", question, answer)),
    ]
}

pub fn hyde(search_string: &str, language: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(HYDE_SYSTEM_PROMPT),
        language_instruction(language),
        ChatMessage::user(format!("Câu hỏi: {}", search_string)),
    ]
}

/// `context` is the output of [`docvqa_core::text::generation_context`].
pub fn generation(question: &str, context: &str, language: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(GENERATION_SYSTEM_PROMPT),
        language_instruction(language),
        ChatMessage::user(format!(
            "Câu hỏi: {}\n\n{}\n\nHãy phân tích và trả lời theo quy trình suy luận trên.",
            question, context
        )),
    ]
}

pub fn rewrite(question: &str, language: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(REWRITE_SYSTEM_PROMPT),
        language_instruction(language),
        ChatMessage::user(format!(
            "Câu hỏi gốc: {}\n\nViết lại câu hỏi để tối ưu tìm kiếm:",
            question
        )),
    ]
}

/// Both inputs are cut to their first [`CONTRADICTION_INPUT_CHARS`] characters.
pub fn contradiction(document_text: &str, provisions: &[Document]) -> Vec<ChatMessage> {
    let joined = text::join_provisions(provisions);
    vec![
        ChatMessage::system(CONTRADICTION_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "NỘI DUNG TÀI LIỆU:\n{}\n\nCÁC ĐIỀU LUẬT:\n{}\n\nHãy phát hiện các điểm mâu thuẫn:",
            text::truncate_chars(document_text, CONTRADICTION_INPUT_CHARS),
            text::truncate_chars(&joined, CONTRADICTION_INPUT_CHARS)
        )),
    ]
}
