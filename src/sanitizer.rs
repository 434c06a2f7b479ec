//! History Sanitizer (C7).
//!
//! Repairs transcript corruption — tool calls with no matching result,
//! tool results with no matching call, two messages in a row from the
//! same role — before a batch of messages goes to the provider. These
//! repairs run on a copy of the log; nothing here mutates the session's
//! canonical append-only store, so a sanitized view can be discarded
//! and rebuilt on the next iteration without losing history.

use crate::session::{Message, Role};
use std::collections::HashSet;

/// Summary of what [`repair_tool_pairing`] changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolRepairReport {
    /// tool_call ids with no matching result — a synthetic error result
    /// was inserted so the next assistant turn always sees a reply.
    pub missing_results: Vec<String>,
    /// tool_call_id values on tool messages with no matching call — the
    /// message was dropped.
    pub orphaned_results: Vec<String>,
    /// tool_call_id values that had more than one result — only the
    /// first is kept.
    pub deduplicated_results: Vec<String>,
}

/// Pass A + Pass B: repair tool_call <-> tool_result pairing.
///
/// 1. Orphaned tool results (no preceding matching tool_call) are
///    dropped and logged at DEBUG.
/// 2. Duplicate results for the same tool_call_id keep only the first.
/// 3. Tool calls with no result anywhere after them get a synthetic
///    error result appended, so invariant 1 (pair atomicity) always
///    holds by the time the sanitized view reaches a provider.
pub fn repair_tool_pairing(messages: &[Message]) -> (Vec<Message>, ToolRepairReport) {
    let mut report = ToolRepairReport::default();

    let mut call_ids: Vec<String> = Vec::new();
    let mut call_id_set: HashSet<String> = HashSet::new();
    for msg in messages {
        if msg.role == Role::Assistant {
            for call in &msg.tool_calls {
                if call_id_set.insert(call.id.clone()) {
                    call_ids.push(call.id.clone());
                }
            }
        }
    }

    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    let mut seen_results: HashSet<String> = HashSet::new();

    for msg in messages {
        if msg.role == Role::Tool {
            let Some(id) = msg.tool_call_id.clone() else {
                out.push(msg.clone());
                continue;
            };
            if !call_id_set.contains(&id) {
                tracing::debug!(tool_call_id = %id, "dropping orphaned tool result");
                report.orphaned_results.push(id);
                continue;
            }
            if !seen_results.insert(id.clone()) {
                tracing::debug!(tool_call_id = %id, "dropping duplicate tool result");
                report.deduplicated_results.push(id);
                continue;
            }
        }
        out.push(msg.clone());
    }

    let missing: Vec<String> = call_ids
        .into_iter()
        .filter(|id| !seen_results.contains(id))
        .collect();

    if !missing.is_empty() {
        for id in &missing {
            out.push(Message::tool_result(
                id.clone(),
                "Error: tool execution was interrupted — no result recorded.",
            ));
        }
        report.missing_results = missing;
    }

    (out, report)
}

/// Enforce strict role alternation (invariant 2).
///
/// Tool messages are treated as user-role for alternation purposes (the
/// spec §3 default; providers without a `role=tool` channel receive
/// them rewritten to `user` — see the Open Question recorded in
/// DESIGN.md for the one remaining ambiguity, consecutive tool-result
/// interleaving). System messages pass through untouched wherever they
/// occur. Two consecutive effective-same-role messages are merged by
/// concatenating content and tool_calls; a tool message is never merged
/// away entirely since every tool_call still needs its own tool_call_id
/// on the emitted message.
pub fn repair_role_ordering(messages: &[Message], provider_supports_tool_role: bool) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<Message> = Vec::new();

    for msg in messages {
        if msg.role == Role::System {
            out.push(msg.clone());
            continue;
        }

        let mut emitted = msg.clone();
        if emitted.role == Role::Tool && !provider_supports_tool_role {
            emitted.role = Role::User;
            emitted.content = format!("Tool Result (ID: {}):\n{}", emitted.tool_call_id.clone().unwrap_or_default(), emitted.content);
            // Neither side of the pair dangles once results stop being
            // role=tool: the preceding assistant's tool_calls no longer
            // have a role=tool counterpart, so drop them too (invariant 2).
            // The owning assistant message is the nearest Assistant-role
            // entry behind this one in `out` — everything between it and
            // here is already-converted tool results, now role=User.
            if let Some(prev) = out.iter_mut().rev().find(|m| m.role == Role::Assistant) {
                prev.tool_calls.clear();
            }
        }

        let effective = |m: &Message| -> Role {
            if m.role == Role::Tool && !provider_supports_tool_role {
                Role::User
            } else {
                m.role
            }
        };

        if let Some(last) = out.last_mut() {
            if last.role != Role::System
                && effective(last) == effective(&emitted)
                && last.tool_call_id.is_none()
                && emitted.tool_call_id.is_none()
            {
                if !emitted.content.is_empty() {
                    if !last.content.is_empty() {
                        last.content.push('\n');
                    }
                    last.content.push_str(&emitted.content);
                }
                last.tool_calls.extend(emitted.tool_calls.clone());
                continue;
            }
        }

        out.push(emitted);
    }

    out
}

/// Run both repair passes in the order the orchestrator applies them
/// before every provider call (spec §4.7, C7).
pub fn sanitize(messages: &[Message], provider_supports_tool_role: bool) -> (Vec<Message>, ToolRepairReport) {
    let (paired, report) = repair_tool_pairing(messages);
    let ordered = repair_role_ordering(&paired, provider_supports_tool_role);
    (ordered, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolCall;

    fn assistant_with_call(id: &str) -> Message {
        Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: id.to_string(),
                name: "read".into(),
                arguments: "{}".into(),
            }],
        )
    }

    #[test]
    fn clean_history_is_unchanged() {
        let msgs = vec![
            Message::user("hi"),
            assistant_with_call("c1"),
            Message::tool_result("c1", "ok"),
            Message::assistant("done"),
        ];
        let (out, report) = repair_tool_pairing(&msgs);
        assert!(report.missing_results.is_empty());
        assert!(report.orphaned_results.is_empty());
        assert_eq!(out.len(), msgs.len());
    }

    #[test]
    fn orphaned_result_is_dropped() {
        let msgs = vec![Message::user("hi"), Message::tool_result("ghost", "boo")];
        let (out, report) = repair_tool_pairing(&msgs);
        assert_eq!(report.orphaned_results, vec!["ghost".to_string()]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn duplicate_result_keeps_first_only() {
        let msgs = vec![
            assistant_with_call("c1"),
            Message::tool_result("c1", "first"),
            Message::tool_result("c1", "second"),
        ];
        let (out, report) = repair_tool_pairing(&msgs);
        assert_eq!(report.deduplicated_results, vec!["c1".to_string()]);
        let results: Vec<&Message> = out.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "first");
    }

    #[test]
    fn missing_result_gets_synthetic_error() {
        let msgs = vec![assistant_with_call("c1")];
        let (out, report) = repair_tool_pairing(&msgs);
        assert_eq!(report.missing_results, vec!["c1".to_string()]);
        let synthetic = out.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(synthetic.tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn consecutive_user_messages_merge() {
        let msgs = vec![Message::user("first"), Message::user("second")];
        let out = repair_role_ordering(&msgs, true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "first\nsecond");
    }

    #[test]
    fn tool_messages_rewritten_to_user_without_tool_role_support() {
        let msgs = vec![assistant_with_call("c1"), Message::tool_result("c1", "ok")];
        let out = repair_role_ordering(&msgs, false);
        assert_eq!(out[1].role, Role::User);
        assert!(out[1].content.contains("Tool Result (ID: c1)"));
        // Invariant 2: neither side of the pair dangles — the assistant's
        // tool_calls are stripped once its result is no longer role=tool.
        assert!(out[0].tool_calls.is_empty());
    }

    #[test]
    fn tool_messages_kept_as_tool_role_when_supported() {
        let msgs = vec![assistant_with_call("c1"), Message::tool_result("c1", "ok")];
        let out = repair_role_ordering(&msgs, true);
        assert_eq!(out[1].role, Role::Tool);
    }

    #[test]
    fn system_message_never_merges() {
        let msgs = vec![Message::system("sys"), Message::system("sys2")];
        let out = repair_role_ordering(&msgs, true);
        assert_eq!(out.len(), 2);
    }
}
