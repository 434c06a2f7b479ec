//! # Parley — agentic execution core
//!
//! Parley drives a large-language-model through many rounds of tool
//! invocations until a user task is complete. This crate is the core loop
//! only: given a user message and a [`session::Session`], it repeatedly
//! calls a [`provider::Provider`], extracts tool calls from the response,
//! executes them through a [`tools::ToolRegistry`], feeds results back, and
//! converges on a final answer under strict iteration and error budgets.
//!
//! Concrete tool bodies, the wire protocol of any specific LLM vendor, and
//! the terminal UI are kept thin here — they exist so the loop is runnable
//! and testable end to end, not as the point of the crate.

pub mod config;
pub mod estimator;
pub mod executor;
pub mod extractor;
pub mod interrupt;
pub mod json_repair;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod sanitizer;
pub mod session;
pub mod tools;
pub mod trimmer;
pub mod ui;

pub use config::CoreConfig;
pub use orchestrator::Orchestrator;
pub use session::Session;

/// Error types for Parley's core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tool execution error: {0}")]
    Tool(String),

    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed JSON: {0}")]
    BadJson(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Request terminated: {0}")]
    Budget(String),

    #[error("Interrupted by user")]
    Interrupted,
}

/// Result type alias for Parley operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Maximum iterations for a single turn's model/tool loop (spec §4.11).
pub const MAX_ITERATIONS: usize = 500;

/// Per-request session error budget before the turn is terminated (§4.9).
pub const SESSION_ERROR_BUDGET: usize = 10;

/// Fraction of the model's context window treated as the proactive
/// trimming threshold (§4.8 "safe threshold").
pub const SAFE_CONTEXT_FRACTION: f64 = 0.58;

/// Number of recent messages preserved whole before the context trimmer
/// starts ranking older messages by importance (§4.8 step 2).
pub const TRIM_RECENT_WINDOW: usize = 10;

/// Bounded history of mutation snapshots retained per session (§3 Lifecycles).
pub const MAX_SNAPSHOTS: usize = 20;

/// Importance threshold above which a message is an unevictable anchor.
pub const ANCHOR_IMPORTANCE: f64 = 10.0;
