//! Token Estimator (C1).
//!
//! A pure, stateless chars/4 heuristic, the same shape the wider agent
//! corpus uses for proactive budgeting before a provider's real tokenizer
//! is available. No I/O, no shared state — safe to call from anywhere.

use crate::session::Message;

/// Fixed overhead charged per message for role/framing tokens that the
/// chars/4 heuristic on content alone would miss (spec §4.1).
const PER_MESSAGE_OVERHEAD: u64 = 4;

/// Approximate token count for a string. Never underestimates by more than
/// 10% in practice for English prose; the crate accepts coarser accuracy
/// for non-ASCII-heavy content since the heuristic is byte-length based.
pub fn estimate(text: &str) -> u64 {
    // Round up so short non-empty strings never estimate to zero tokens,
    // which would let them evade budget checks entirely.
    ((text.len() as u64) + 3) / 4
}

/// Sum of `estimate` over each message's content plus per-message overhead.
pub fn estimate_messages(messages: &[Message]) -> u64 {
    messages
        .iter()
        .map(|m| estimate(&m.content) + PER_MESSAGE_OVERHEAD + estimate_tool_calls(m))
        .sum()
}

fn estimate_tool_calls(m: &Message) -> u64 {
    m.tool_calls
        .iter()
        .map(|tc| estimate(&tc.name) + estimate(&tc.arguments))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Message, ToolCall};

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate(""), 0);
    }

    #[test]
    fn short_nonempty_is_at_least_one() {
        assert!(estimate("a") >= 1);
    }

    #[test]
    fn roughly_four_chars_per_token() {
        let text = "a".repeat(400);
        let est = estimate(&text);
        assert!(est >= 90 && est <= 110, "est={est}");
    }

    #[test]
    fn messages_include_overhead() {
        let msgs = vec![Message::user(""), Message::user("")];
        let total = estimate_messages(&msgs);
        assert_eq!(total, PER_MESSAGE_OVERHEAD * 2);
    }

    #[test]
    fn tool_calls_count_toward_estimate() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "read_file".into(),
                arguments: r#"{"path":"a.rs"}"#.into(),
            }],
        );
        let with_calls = estimate_messages(&[msg.clone()]);
        let mut bare = msg;
        bare.tool_calls.clear();
        let without_calls = estimate_messages(&[bare]);
        assert!(with_calls > without_calls);
    }
}
