//! Session and message data model (spec §3).
//!
//! A [`Session`] owns the ordered conversation log plus the small bag of
//! mutable flags the orchestrator needs between iterations (error count,
//! interrupt flag, snapshot history). Tools never mutate this directly —
//! only the orchestrator appends messages, breaking the cyclic
//! orchestrator/tool reference the teacher's agent module had.

use crate::MAX_SNAPSHOTS;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A request to call a tool, emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique id, opaque, unique within an assistant message (and, per
    /// invariant 5, within the whole conversation).
    pub id: String,
    pub name: String,
    /// Canonical JSON text for the arguments (§3: `arguments` is text, not
    /// a parsed value — repair/validation happens at dispatch time).
    pub arguments: String,
}

/// A tool result, matched to a prior [`ToolCall`] by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    /// Set when `content` is a structured error payload rather than a
    /// successful result — lets the retry policy (C9) classify the
    /// outcome without reparsing `content`.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// A single message in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Nonnegative; >= ANCHOR_IMPORTANCE marks an unevictable anchor.
    #[serde(default)]
    pub importance: f64,
    #[serde(default = "Message::unix_epoch")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Message {
    fn unix_epoch() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::<chrono::Utc>::UNIX_EPOCH
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            importance: 0.0,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            importance: 0.0,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            importance: 0.0,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            importance: 0.0,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            importance: 0.0,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn is_anchor(&self) -> bool {
        self.role == Role::User && self.importance >= crate::ANCHOR_IMPORTANCE
    }
}

/// A snapshot identifier captured before a mutating tool may run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub taken_at: chrono::DateTime<chrono::Utc>,
    pub message_count: usize,
}

/// A report from [`Session::scan_integrity`] — diagnostics only, no repair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    /// Assistant tool_call ids with no matching tool message anywhere after them.
    pub orphaned_tool_calls: Vec<String>,
    /// Tool messages whose tool_call_id matches no preceding assistant tool_call.
    pub orphaned_tool_results: Vec<String>,
    /// tool_call ids that appear on more than one assistant message.
    pub duplicate_tool_call_ids: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_tool_calls.is_empty()
            && self.orphaned_tool_results.is_empty()
            && self.duplicate_tool_call_ids.is_empty()
    }
}

/// The aggregate conversation state the orchestrator owns for a turn.
///
/// This struct is both the in-memory log and the append-only message store
/// (C6): `append`/`append_atomic` are the only ways new messages enter it,
/// and `save` is the durability barrier the orchestrator calls once per
/// iteration. A real deployment swaps the no-op persistence for a file- or
/// database-backed one without changing any of this type's callers — the
/// session itself never does I/O beyond what `save`/`load` delegate.
pub struct Session {
    messages: Vec<Message>,
    pub error_count: usize,
    pub interrupted: bool,
    pub context_files: Vec<std::path::PathBuf>,
    snapshots: VecDeque<Snapshot>,
    persist: Box<dyn SessionPersistence>,
}

/// Narrow persistence contract (§6 "To the session store"). The core never
/// assumes a concrete backend; a JSON-lines file-backed implementation
/// ships as the default (see [`JsonFilePersistence`]) but is not required.
pub trait SessionPersistence: Send {
    fn load(&mut self) -> crate::Result<Vec<Message>>;
    fn append(&mut self, msg: &Message) -> crate::Result<()>;
    fn flush(&mut self) -> crate::Result<()>;
}

/// A persistence backend that keeps everything in memory; used by tests
/// and as a safe default when no path is configured.
#[derive(Default)]
pub struct NullPersistence;

impl SessionPersistence for NullPersistence {
    fn load(&mut self) -> crate::Result<Vec<Message>> {
        Ok(Vec::new())
    }
    fn append(&mut self, _msg: &Message) -> crate::Result<()> {
        Ok(())
    }
    fn flush(&mut self) -> crate::Result<()> {
        Ok(())
    }
}

/// JSON-lines file persistence: one `Message` per line, append-only.
pub struct JsonFilePersistence {
    path: std::path::PathBuf,
    file: Option<std::fs::File>,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn ensure_open(&mut self) -> crate::Result<&mut std::fs::File> {
        if self.file.is_none() {
            use std::fs::OpenOptions;
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.file = Some(f);
        }
        Ok(self.file.as_mut().unwrap())
    }
}

impl SessionPersistence for JsonFilePersistence {
    fn load(&mut self) -> crate::Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut out = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(m) => out.push(m),
                Err(e) => {
                    tracing::warn!("skipping corrupt session record: {e}");
                }
            }
        }
        Ok(out)
    }

    fn append(&mut self, msg: &Message) -> crate::Result<()> {
        use std::io::Write;
        let line = serde_json::to_string(msg)
            .map_err(|e| crate::CoreError::Config(format!("serialize message: {e}")))?;
        let file = self.ensure_open()?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn flush(&mut self) -> crate::Result<()> {
        use std::io::Write;
        if let Some(f) = self.file.as_mut() {
            f.flush()?;
        }
        Ok(())
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_persistence(Box::new(NullPersistence))
    }

    pub fn with_persistence(persist: Box<dyn SessionPersistence>) -> Self {
        Self {
            messages: Vec::new(),
            error_count: 0,
            interrupted: false,
            context_files: Vec::new(),
            snapshots: VecDeque::new(),
            persist,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Load persisted history into memory, replacing whatever is held now.
    pub fn load(&mut self) -> crate::Result<()> {
        self.messages = self.persist.load()?;
        Ok(())
    }

    /// Single-record append (§4.6 `append`).
    pub fn append(&mut self, msg: Message) -> crate::Result<()> {
        self.persist.append(&msg)?;
        self.messages.push(msg);
        Ok(())
    }

    /// Atomic multi-message commit (§4.6 `append_atomic`): used for
    /// (assistant-with-tool_calls, first tool result, ...) groups so a
    /// crash never leaves the assistant message orphaned. "Atomic" here
    /// means all-or-nothing against the in-memory log and the persistence
    /// backend together — if any single append fails, none of the group is
    /// retained in memory either.
    pub fn append_atomic(&mut self, msgs: Vec<Message>) -> crate::Result<()> {
        let mut committed = Vec::with_capacity(msgs.len());
        for msg in msgs {
            if let Err(e) = self.persist.append(&msg) {
                // Roll back anything already pushed to the in-memory log
                // from this group so memory and storage cannot diverge.
                self.messages.truncate(self.messages.len() - committed.len());
                return Err(e);
            }
            committed.push(msg.clone());
            self.messages.push(msg);
        }
        self.persist.flush()
    }

    /// Persistence barrier; must be called after each orchestration
    /// iteration (§5 "Persistence barrier").
    pub fn save(&mut self) -> crate::Result<()> {
        self.persist.flush()
    }

    /// Diagnostics-only integrity scan (§4.6 `scan_integrity`); does not
    /// repair anything — see [`crate::sanitizer`] for repair.
    pub fn scan_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();
        let mut seen_call_ids: std::collections::HashSet<String> = std::collections::HashSet::new();

        for (i, msg) in self.messages.iter().enumerate() {
            if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
                let mut result_ids: std::collections::HashSet<String> = std::collections::HashSet::new();
                let mut j = i + 1;
                while j < self.messages.len() && self.messages[j].role == Role::Tool {
                    if let Some(id) = &self.messages[j].tool_call_id {
                        result_ids.insert(id.clone());
                    }
                    j += 1;
                }
                for tc in &msg.tool_calls {
                    if !seen_call_ids.insert(tc.id.clone()) {
                        report.duplicate_tool_call_ids.push(tc.id.clone());
                    }
                    if !result_ids.contains(&tc.id) {
                        report.orphaned_tool_calls.push(tc.id.clone());
                    }
                }
            }
        }

        let all_call_ids: std::collections::HashSet<&String> = self
            .messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|tc| &tc.id))
            .collect();
        for msg in &self.messages {
            if msg.role == Role::Tool {
                if let Some(id) = &msg.tool_call_id {
                    if !all_call_ids.contains(id) {
                        report.orphaned_tool_results.push(id.clone());
                    }
                }
            }
        }

        report
    }

    /// Capture a mutation snapshot identifier, bounded to the last
    /// [`MAX_SNAPSHOTS`] (§3 Lifecycles).
    pub fn snapshot(&mut self) -> Snapshot {
        let snap = Snapshot {
            id: uuid::Uuid::new_v4().to_string(),
            taken_at: chrono::Utc::now(),
            message_count: self.messages.len(),
        };
        self.snapshots.push_back(snap.clone());
        while self.snapshots.len() > MAX_SNAPSHOTS {
            self.snapshots.pop_front();
        }
        snap
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    /// Replace the in-memory log wholesale (used by the trimmer and the
    /// message-structure-error recovery path, which reloads from canonical
    /// state and rebuilds the outgoing list).
    pub fn set_messages(&mut self, msgs: Vec<Message>) {
        self.messages = msgs;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
