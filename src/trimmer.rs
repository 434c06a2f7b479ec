//! Context Trimmer (C8).
//!
//! Keeps the outgoing message list under the model's context window.
//! Two distinct paths call into this module: a proactive pass run every
//! iteration once the estimated token count crosses the safe threshold
//! (§4.8 step 1-2), and a reactive escalation ladder invoked when the
//! provider itself reports a token-limit error (§4.8 step 3).

use crate::estimator::estimate_messages;
use crate::session::{Message, Role};

/// Partition `messages` into the always-kept anchors, the unconditionally
/// preserved recent window, and the remaining older middle section that
/// importance-ranked admission operates on.
fn partition(messages: &[Message], recent_window: usize) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let n = messages.len();
    let recent_start = n.saturating_sub(recent_window);

    let mut anchors = Vec::new();
    let mut recent = Vec::new();
    let mut middle = Vec::new();

    for (i, msg) in messages.iter().enumerate() {
        if i >= recent_start {
            recent.push(i);
        } else if msg.is_anchor() {
            anchors.push(i);
        } else {
            middle.push(i);
        }
    }

    (anchors, recent, middle)
}

/// Proactive trim (spec §4.8 steps 1-2): if `estimate_messages(messages)`
/// is at or under `budget_tokens`, the input is returned unchanged.
/// Otherwise anchors and the most recent `recent_window` messages are
/// always kept; older, non-anchor messages are admitted back in,
/// highest-`importance`-first, for as long as they still fit the budget.
/// A tool message is never admitted without the assistant message that
/// produced its matching tool_call, and vice versa, so admission never
/// reintroduces an orphaned pair.
pub fn trim(messages: &[Message], budget_tokens: u64, recent_window: usize) -> Vec<Message> {
    if estimate_messages(messages) <= budget_tokens {
        return messages.to_vec();
    }

    let (anchor_idx, recent_idx, middle_idx) = partition(messages, recent_window);

    let mut kept: std::collections::BTreeSet<usize> = std::collections::BTreeSet::new();
    kept.extend(anchor_idx.iter().copied());
    kept.extend(recent_idx.iter().copied());

    let mut candidates: Vec<usize> = middle_idx;
    candidates.sort_by(|&a, &b| {
        messages[b]
            .importance
            .partial_cmp(&messages[a].importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for idx in candidates {
        let mut trial = kept.clone();
        trial.insert(idx);
        if let Some(pair) = tool_pair_index(messages, idx) {
            trial.insert(pair);
        }
        let trial_messages: Vec<Message> = trial.iter().map(|&i| messages[i].clone()).collect();
        if estimate_messages(&trial_messages) <= budget_tokens {
            kept = trial;
        }
    }

    kept.into_iter().map(|i| messages[i].clone()).collect()
}

/// An assistant message's tool_call is only meaningfully admissible with
/// its matching tool result (and vice versa); find that partner index if
/// `idx` is one half of such a pair.
fn tool_pair_index(messages: &[Message], idx: usize) -> Option<usize> {
    match messages[idx].role {
        Role::Tool => {
            let call_id = messages[idx].tool_call_id.as_ref()?;
            messages[..idx]
                .iter()
                .position(|m| m.role == Role::Assistant && m.tool_calls.iter().any(|tc| &tc.id == call_id))
        }
        Role::Assistant if !messages[idx].tool_calls.is_empty() => {
            let ids: Vec<&str> = messages[idx].tool_calls.iter().map(|tc| tc.id.as_str()).collect();
            messages[idx + 1..]
                .iter()
                .position(|m| m.role == Role::Tool && m.tool_call_id.as_deref().is_some_and(|id| ids.contains(&id)))
                .map(|offset| idx + 1 + offset)
        }
        _ => None,
    }
}

/// Reactive escalation ladder (spec §4.8 step 3), tried in order after a
/// provider reports a token-limit error on the current outgoing list.
/// Each rung is strictly smaller than the last; if even the final rung
/// (anchors + last 2 messages) doesn't fit, the caller treats this as a
/// fatal, non-retryable budget error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationRung {
    Half,
    Quarter,
    AnchorPlusLastTwo,
}

pub fn escalate(messages: &[Message], rung: EscalationRung) -> Vec<Message> {
    match rung {
        EscalationRung::Half => trim(messages, estimate_messages(messages) / 2, messages.len() / 2),
        EscalationRung::Quarter => trim(messages, estimate_messages(messages) / 4, messages.len() / 4),
        EscalationRung::AnchorPlusLastTwo => {
            let (anchor_idx, _, _) = partition(messages, 2);
            let n = messages.len();
            let mut kept: std::collections::BTreeSet<usize> = anchor_idx.into_iter().collect();
            for i in n.saturating_sub(2)..n {
                kept.insert(i);
            }
            kept.into_iter().map(|i| messages[i].clone()).collect()
        }
    }
}

/// The full ladder in escalation order, for a caller that wants to walk
/// rungs until one fits under `budget_tokens` or the ladder is exhausted.
pub fn escalation_ladder() -> [EscalationRung; 3] {
    [
        EscalationRung::Half,
        EscalationRung::Quarter,
        EscalationRung::AnchorPlusLastTwo,
    ]
}
