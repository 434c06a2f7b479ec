//! Tool Registry and Concurrency Classifier (C4).
//!
//! Every tool the orchestrator can dispatch to is registered here along
//! with a [`Concurrency`] classification used to group a batch of tool
//! calls from one assistant turn into waves: `Parallel` calls in a batch
//! run concurrently, `Serial` calls run one at a time in call order, and
//! any `Blocking` call forces the whole batch down to one-at-a-time.
//! Interactive tools (those that read from the terminal) are always
//! moved to the end of a batch regardless of their declared concurrency,
//! so a model can't strand a user-facing prompt behind other work.

pub mod bash;
pub mod collaborate;
pub mod edit;
pub mod file;
pub mod git;
pub mod search;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// How a tool call may be scheduled relative to other calls in the same
/// assistant turn (spec §5 concurrency classification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Safe to run alongside other `Parallel` calls in the same batch.
    Parallel,
    /// Must not overlap with any other call, but doesn't force the whole
    /// batch serial on its own (e.g. tools sharing one mutable resource).
    Serial,
    /// Forces the entire batch to execute one call at a time, in order.
    Blocking,
}

/// Tool definition surfaced to the provider's tool-calling API.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub concurrency: Concurrency,
    /// Reads from or writes to the terminal directly; always scheduled
    /// last within a batch and never eligible for sub-agent use.
    pub interactive: bool,
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    /// Concurrency class for this tool. Defaults to `Serial`, the
    /// conservative choice for a tool that hasn't opted into either
    /// extreme.
    fn concurrency(&self) -> Concurrency {
        Concurrency::Serial
    }

    /// Whether this tool blocks on terminal I/O. Defaults to `false`.
    fn interactive(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> crate::Result<Value>;

    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            concurrency: self.concurrency(),
            interactive: self.interactive(),
        }
    }
}

/// Registry for managing tools, with an optional sub-agent blocklist.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Tool names hidden from sub-agent sessions (spec §5, Open Question:
    /// interactive and session-mutating tools are withheld from a
    /// sub-agent so it can't prompt the terminal or recurse into spawning
    /// further sub-agents).
    subagent_blocklist: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            subagent_blocklist: Vec::new(),
        }
    }

    /// Registry with the bundled default toolset: file read/write/list,
    /// line-range edit, glob/grep search, bash, git status/diff/add/commit,
    /// and the interactive user-collaboration tool.
    ///
    /// Uses the default bash timeout (see [`crate::config::CoreConfig`]);
    /// call [`Self::with_defaults_and_config`] to honor a configured one.
    pub fn with_defaults(workspace_root: std::path::PathBuf) -> Self {
        Self::with_defaults_and_config(workspace_root, &crate::config::CoreConfig::default())
    }

    /// Same bundled toolset as [`Self::with_defaults`], but wires
    /// `config.bash_timeout_secs` into the bash tool instead of the
    /// built-in default.
    pub fn with_defaults_and_config(workspace_root: std::path::PathBuf, config: &crate::config::CoreConfig) -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(file::ReadFileTool::new(workspace_root.clone())));
        registry.register(Arc::new(file::WriteFileTool::new(workspace_root.clone())));
        registry.register(Arc::new(file::ListDirectoryTool::new(workspace_root.clone())));

        registry.register(Arc::new(edit::EditFileTool::new(workspace_root.clone())));

        registry.register(Arc::new(search::GlobSearchTool::new(workspace_root.clone())));
        registry.register(Arc::new(search::GrepSearchTool::new(workspace_root.clone())));

        registry.register(Arc::new(bash::BashTool::with_timeout(workspace_root.clone(), config.bash_timeout_secs)));

        registry.register(Arc::new(git::GitStatusTool::new(workspace_root.clone())));
        registry.register(Arc::new(git::GitDiffTool::new(workspace_root.clone())));
        registry.register(Arc::new(git::GitAddTool::new(workspace_root.clone())));
        registry.register(Arc::new(git::GitCommitTool::new(workspace_root)));

        registry.register(Arc::new(collaborate::AskUserTool::new()));

        registry.set_subagent_blocklist(vec![
            "ask_user".to_string(),
            "bash".to_string(),
            "git_commit".to_string(),
        ]);

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn set_subagent_blocklist(&mut self, names: Vec<String>) {
        self.subagent_blocklist = names;
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> crate::Result<Value> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => Err(crate::CoreError::NotFound(format!("Tool not found: {name}"))),
        }
    }

    /// Tool descriptors to advertise to a provider. When `is_subagent` is
    /// set, blocklisted tools are withheld (spec §5, C4).
    pub fn descriptors_for_provider(&self, is_subagent: bool) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .filter(|t| !is_subagent || !self.subagent_blocklist.contains(&t.name().to_string()))
            .map(|t| t.to_descriptor())
            .collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Partition a batch of tool-call names (in call order) into scheduling
/// waves: interactive calls are pulled to the end; if any non-interactive
/// call in the batch is `Blocking`, every remaining call runs in its own
/// one-call wave (in order); otherwise all `Parallel` calls share a single
/// wave and each `Serial` call gets its own wave, preserving relative order.
pub fn schedule_batch(calls: &[(String, Concurrency, bool)]) -> Vec<Vec<usize>> {
    let mut interactive_idx = Vec::new();
    let mut rest: Vec<usize> = Vec::new();

    for (i, (_, _, interactive)) in calls.iter().enumerate() {
        if *interactive {
            interactive_idx.push(i);
        } else {
            rest.push(i);
        }
    }

    let any_blocking = rest.iter().any(|&i| calls[i].1 == Concurrency::Blocking);

    let mut waves = Vec::new();
    if any_blocking {
        for i in rest {
            waves.push(vec![i]);
        }
    } else {
        let mut parallel_wave = Vec::new();
        for i in rest {
            match calls[i].1 {
                Concurrency::Parallel => parallel_wave.push(i),
                Concurrency::Serial => {
                    if !parallel_wave.is_empty() {
                        waves.push(std::mem::take(&mut parallel_wave));
                    }
                    waves.push(vec![i]);
                }
                Concurrency::Blocking => unreachable!(),
            }
        }
        if !parallel_wave.is_empty() {
            waves.push(parallel_wave);
        }
    }

    for i in interactive_idx {
        waves.push(vec![i]);
    }

    waves
}
