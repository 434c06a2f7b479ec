//! UI contract (spec §6 "To the UI").
//!
//! The orchestrator never prints directly; it reports through a `Ui`
//! implementation so a headless caller (tests, a sub-agent broker) can
//! supply a no-op and a terminal front-end can supply one that writes to
//! stdout. This mirrors how the teacher kept rendering out of the agent
//! loop proper — the loop calls a handle, it doesn't own a screen.

use std::io::Write;

/// Counters passed alongside each streamed chunk so a renderer can show
/// live progress without re-deriving it from raw text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkMetrics {
    pub chunk_index: usize,
    pub total_chars: usize,
}

pub trait Ui: Send + Sync {
    fn on_chunk(&self, text: &str, metrics: ChunkMetrics);
    fn on_tool_call(&self, name: &str);
    fn on_thinking(&self, text: &str);
    fn on_system_message(&self, text: &str);
}

/// Discards everything. Used by sub-agent turns and by tests that only
/// care about the returned [`crate::orchestrator::TurnResult`].
#[derive(Default)]
pub struct NullUi;

impl Ui for NullUi {
    fn on_chunk(&self, _text: &str, _metrics: ChunkMetrics) {}
    fn on_tool_call(&self, _name: &str) {}
    fn on_thinking(&self, _text: &str) {}
    fn on_system_message(&self, _text: &str) {}
}

/// Plain stdout renderer for the line-oriented entry point in `main.rs`.
/// Not a TUI: no cursor control, no alternate screen, no scrollback
/// management — those are explicitly out of scope (spec §1).
#[derive(Default)]
pub struct TerminalUi;

impl Ui for TerminalUi {
    fn on_chunk(&self, text: &str, _metrics: ChunkMetrics) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn on_tool_call(&self, name: &str) {
        println!("\n[tool] {name}");
    }

    fn on_thinking(&self, text: &str) {
        eprintln!("[thinking] {text}");
    }

    fn on_system_message(&self, text: &str) {
        println!("\n[system] {text}");
    }
}
