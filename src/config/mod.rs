//! Core Configuration.
//!
//! Parley is configured via, in order of precedence:
//! - command-line flags (see `src/main.rs`)
//! - `parley.toml` in the current directory
//! - built-in defaults
//!
//! The orchestrator treats every field here as read-only for the
//! duration of a turn; nothing in the core loop mutates `CoreConfig`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// LLM provider backend to use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    OpenAI,
}

/// Per-error-class retry budgets (spec §4.9, C9). Defaults mirror the
/// spec's worked example: token-limit and structural errors get a small
/// number of escalating retries, transient server/rate-limit errors get
/// a generous budget, and malformed tool JSON gets exactly one
/// self-correction attempt before the call is abandoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBudgets {
    pub malformed_tool_json: u32,
    pub token_limit: u32,
    pub server_error: u32,
    pub rate_limit: u32,
    pub message_structure_error: u32,
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            malformed_tool_json: 1,
            token_limit: 3,
            server_error: 20,
            rate_limit: 20,
            message_structure_error: 3,
        }
    }
}

/// Main configuration for the core agentic loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub provider: LlmProvider,

    /// Base URL of the provider endpoint (e.g. `http://localhost:11434`
    /// for a local Ollama instance).
    pub provider_url: String,

    /// Model name to request from the provider.
    pub model: String,

    /// Timeout for bash tool invocations (seconds).
    pub bash_timeout_secs: u64,

    /// Maximum file size the file tools will read (KB).
    pub max_file_size_kb: usize,

    /// Maximum model/tool iterations per user turn (spec §4.11, S0-S7).
    pub max_iterations: usize,

    /// Total tool/provider errors tolerated in one turn before it is
    /// abandoned (spec §4.9 session error budget).
    pub session_error_budget: usize,

    /// The model's context window, in tokens, used to compute the
    /// proactive trimming threshold (spec §4.8).
    pub model_context_tokens: u64,

    /// Maximum tokens requested in a single provider response.
    pub max_response_tokens: u32,

    /// Sampling temperature forwarded to the provider.
    pub temperature: f32,

    /// Top-p sampling parameter forwarded to the provider.
    pub top_p: f32,

    /// Per-error-class retry budgets (C9).
    pub retry_budgets: RetryBudgets,

    /// System prompt override.
    pub system_prompt: Option<String>,

    /// Whether this session is a sub-agent spawned by another turn.
    /// Sub-agent sessions are denied interactive and destructive tools
    /// (spec §5, C4) and never themselves spawn further sub-agents.
    pub is_subagent: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            provider_url: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:32b".to_string(),
            bash_timeout_secs: 120,
            max_file_size_kb: 1024,
            max_iterations: crate::MAX_ITERATIONS,
            session_error_budget: crate::SESSION_ERROR_BUDGET,
            model_context_tokens: 32_768,
            max_response_tokens: 4096,
            temperature: 0.7,
            top_p: 0.95,
            retry_budgets: RetryBudgets::default(),
            system_prompt: None,
            is_subagent: false,
        }
    }
}

impl CoreConfig {
    /// Load configuration, preferring an explicit `path`, then
    /// `./parley.toml`, then built-in defaults.
    pub fn load(path: Option<&PathBuf>) -> crate::Result<Self> {
        let config_path = path.cloned().or_else(|| {
            let default_path = PathBuf::from("parley.toml");
            default_path.exists().then_some(default_path)
        });

        match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    crate::CoreError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                toml::from_str(&content).map_err(|e| {
                    crate::CoreError::Config(format!("Failed to parse {}: {}", path.display(), e))
                })
            }
            None => Ok(Self::default()),
        }
    }

    /// The proactive context-trimming threshold, in tokens (spec §4.8
    /// "safe threshold" = `SAFE_CONTEXT_FRACTION` of the context window).
    pub fn safe_token_threshold(&self) -> u64 {
        (self.model_context_tokens as f64 * crate::SAFE_CONTEXT_FRACTION) as u64
    }

    pub fn system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }
}

/// Default system prompt for the bundled toolset.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert coding assistant with tools for reading and writing files, running shell commands, searching a codebase, and inspecting git state.

When making changes:
1. Read files before modifying them to understand context.
2. Make minimal, focused changes.
3. Explain your reasoning before acting.
4. Follow the existing code style.

Ask the user directly, via the ask_user tool, when a decision genuinely depends on information only they have."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_budgets() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.max_iterations, crate::MAX_ITERATIONS);
        assert_eq!(cfg.retry_budgets.malformed_tool_json, 1);
    }

    #[test]
    fn safe_threshold_is_fraction_of_context() {
        let mut cfg = CoreConfig::default();
        cfg.model_context_tokens = 10_000;
        assert_eq!(cfg.safe_token_threshold(), 5_800);
    }

    #[test]
    fn load_with_missing_path_falls_back_to_default() {
        let cfg = CoreConfig::load(Some(&PathBuf::from("/nonexistent/parley.toml")));
        // Missing explicit path is a read error, not a silent default —
        // only the absence of the conventional `./parley.toml` falls back.
        assert!(cfg.is_err());
    }

    #[test]
    fn load_with_no_path_and_no_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let cfg = CoreConfig::load(None).unwrap();
        std::env::set_current_dir(prev).unwrap();
        assert_eq!(cfg.model, CoreConfig::default().model);
    }
}
