//! Token estimation fallback.
//!
//! Providers normally report usage; when one does not, the context size is
//! estimated with a character heuristic of ~4 characters per token.

use quill_core::message::Message;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> u64 {
    text.len().div_ceil(4) as u64
}

/// Estimate tokens for one message, including ~4 tokens of framing for the
/// role and delimiters and the text of any tool calls.
pub fn estimate_message_tokens(message: &Message) -> u64 {
    let calls: u64 = message
        .tool_calls
        .iter()
        .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments))
        .sum();
    4 + estimate_tokens(&message.content) + calls
}

pub fn estimate_messages_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::message::ToolCallRequest;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("test"), 1);
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(100)), 25);
    }

    #[test]
    fn message_includes_overhead_and_calls() {
        assert_eq!(estimate_message_tokens(&Message::user("test")), 5);

        let msg = Message::assistant_with_tools("", vec![ToolCallRequest::new("1", "bash", "{\"a\":1}")]);
        assert_eq!(estimate_message_tokens(&msg), 4 + 1 + 2);
    }

    #[test]
    fn multiple_messages() {
        let msgs = vec![Message::user("hello"), Message::assistant("world")];
        assert_eq!(estimate_messages_tokens(&msgs), 12);
    }
}
