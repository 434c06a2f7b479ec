//! Tool Executor (C5).
//!
//! Takes one extracted [`ToolCall`], repairs and schema-validates its
//! arguments, dispatches to the [`ToolRegistry`], and normalizes the
//! outcome into a [`ToolResult`] that always carries a JSON payload —
//! even on failure, so the model sees a structured error rather than a
//! dropped turn.

use crate::session::{ToolCall, ToolResult};
use crate::tools::ToolRegistry;
use serde_json::{json, Value};

/// Validate `args` against a minimal subset of JSON Schema: `required`
/// presence and top-level `type` per declared property. This is not a
/// full schema validator — it covers the shapes the bundled tools and
/// the model's own generated arguments actually produce.
fn validate_schema(args: &Value, schema: &Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    for key in required {
        let Some(key) = key.as_str() else { continue };
        if args.get(key).is_none() {
            return Err(format!("missing required argument `{key}`"));
        }
    }
    Ok(())
}

/// Execute a single tool call. Never returns `Err` for tool-level
/// failures — those are encoded into the returned [`ToolResult`] so the
/// orchestrator can feed them back to the model as a normal turn.
pub async fn execute(registry: &ToolRegistry, call: &ToolCall) -> ToolResult {
    let Some(tool) = registry.get(&call.name) else {
        return ToolResult {
            tool_call_id: call.id.clone(),
            content: json!({
                "error": format!("unknown tool `{}`", call.name)
            })
            .to_string(),
            is_error: true,
        };
    };

    let args = match crate::json_repair::parse_or_repair(&call.arguments) {
        Ok(v) => v,
        Err(e) => {
            return ToolResult {
                tool_call_id: call.id.clone(),
                content: json!({ "error": format!("malformed arguments: {e}") }).to_string(),
                is_error: true,
            };
        }
    };

    let schema = tool.parameters_schema();
    if let Err(e) = validate_schema(&args, &schema) {
        // Carry the schema and what was actually sent so the model can
        // self-correct on the next turn instead of repeating the same
        // mistake blind (spec §4.5).
        return ToolResult {
            tool_call_id: call.id.clone(),
            content: json!({
                "error": format!("schema violation: {e}"),
                "expected_schema": schema,
                "attempted_arguments": args,
            })
            .to_string(),
            is_error: true,
        };
    }

    match tool.execute(args).await {
        Ok(value) => ToolResult {
            tool_call_id: call.id.clone(),
            content: value.to_string(),
            is_error: false,
        },
        Err(e) => ToolResult {
            tool_call_id: call.id.clone(),
            content: json!({ "error": e.to_string() }).to_string(),
            is_error: true,
        },
    }
}

/// Execute every call in one scheduling wave concurrently and return
/// results in call order (not completion order), so history construction
/// stays deterministic regardless of which call finishes first.
pub async fn execute_wave(registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
    let futures = calls.iter().map(|c| execute(registry, c));
    futures::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn unknown_tool_produces_error_result_not_err() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "c1".into(),
            name: "does_not_exist".into(),
            arguments: "{}".into(),
        };
        let result = execute(&registry, &call).await;
        assert!(result.is_error);
        assert_eq!(result.tool_call_id, "c1");
    }

    #[tokio::test]
    async fn malformed_arguments_are_repaired_before_validation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(std::sync::Arc::new(crate::tools::file::ReadFileTool::new(
            dir.path().to_path_buf(),
        )));

        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: r#"{"path": "a.txt",}"#.into(),
        };
        let result = execute(&registry, &call).await;
        assert!(!result.is_error, "content: {}", result.content);
    }

    #[tokio::test]
    async fn missing_required_argument_is_schema_violation() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(std::sync::Arc::new(crate::tools::file::ReadFileTool::new(
            dir.path().to_path_buf(),
        )));

        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: "{}".into(),
        };
        let result = execute(&registry, &call).await;
        assert!(result.is_error);
        assert!(result.content.contains("schema violation"));
    }

    #[tokio::test]
    async fn wave_results_preserve_call_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(std::sync::Arc::new(crate::tools::file::ReadFileTool::new(
            dir.path().to_path_buf(),
        )));

        let calls = vec![
            ToolCall {
                id: "1".into(),
                name: "read_file".into(),
                arguments: r#"{"path": "a.txt"}"#.into(),
            },
            ToolCall {
                id: "2".into(),
                name: "read_file".into(),
                arguments: r#"{"path": "b.txt"}"#.into(),
            },
        ];
        let results = execute_wave(&registry, &calls).await;
        assert_eq!(results[0].tool_call_id, "1");
        assert_eq!(results[1].tool_call_id, "2");
    }
}
