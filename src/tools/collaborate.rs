//! Interactive user-collaboration tool.
//!
//! The one tool the model can call to stop and ask the person at the
//! keyboard a direct question — a confirmation before a destructive
//! change, a choice between two designs, anything the model shouldn't
//! guess at. It is the canonical `interactive` tool: always scheduled
//! last in a batch (see [`crate::tools::schedule_batch`]) and always
//! excluded from sub-agent sessions, since a sub-agent has no user at
//! the other end of the terminal to answer it.

use super::Tool;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::Write;

pub struct AskUserTool;

impl AskUserTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AskUserTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user a direct question and wait for their typed reply. \
         Use sparingly: only when a decision genuinely can't be made without \
         the user's input (destructive action confirmation, ambiguous intent)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to show the user"
                }
            },
            "required": ["question"]
        })
    }

    fn interactive(&self) -> bool {
        true
    }

    fn concurrency(&self) -> super::Concurrency {
        super::Concurrency::Blocking
    }

    async fn execute(&self, args: Value) -> crate::Result<Value> {
        let question = args["question"]
            .as_str()
            .ok_or_else(|| crate::CoreError::Tool("question is required".into()))?;

        print!("\n{question}\n> ");
        std::io::stdout()
            .flush()
            .map_err(crate::CoreError::Io)?;

        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(crate::CoreError::Io)?;

        Ok(json!({ "answer": line.trim() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_marks_interactive_and_blocking() {
        let tool = AskUserTool::new();
        assert!(tool.interactive());
        assert_eq!(tool.concurrency(), super::super::Concurrency::Blocking);
    }

    #[test]
    fn schema_requires_question() {
        let tool = AskUserTool::new();
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"][0], "question");
    }
}
