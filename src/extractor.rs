//! Tool-Call Extractor (C3).
//!
//! Parses tool calls out of free-form model content when the provider
//! transport didn't already hand back structured `tool_calls`. Four
//! formats are tried in order: XML-tagged, bracketed `[name op]`, a
//! `CALL name:` prefix, and fenced ```json blocks.

use crate::session::ToolCall;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractedFormat {
    None,
    Structured,
    Xml,
    Bracket,
    Call,
    JsonBlock,
}

pub struct ExtractionResult {
    pub calls: Vec<ToolCall>,
    pub cleaned_content: String,
    pub format: ExtractedFormat,
}

fn xml_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<tool_call>.*?</tool_call>").unwrap())
}

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // [name op]\n{ ... }  — the JSON body may span multiple lines, so match
    // up to the first top-level closing brace conservatively: greedy within
    // a single line set bounded by `}` at end.
    RE.get_or_init(|| Regex::new(r"(?s)\[(\w+)\s+(\w+)\]\s*(\{.*?\})(?:\n|$)").unwrap())
}

fn call_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)CALL\s+(\w+):\s*(\{.*?\})(?:\n|$)").unwrap())
}

fn fenced_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap())
}

fn fabricate_id() -> String {
    use rand::Rng;
    let chars: Vec<char> = "0123456789abcdefghijklmnopqrstuvwxyz".chars().collect();
    let mut rng = rand::rng();
    let suffix: String = (0..24).map(|_| chars[rng.random_range(0..chars.len())]).collect();
    format!("call_{suffix}")
}

/// Run the extractor over raw model `content`. If the provider already
/// supplied `structured` tool_calls, those are returned unchanged and
/// `cleaned_content` equals `content` (spec §8 round-trip property).
pub fn extract(content: &str, structured: Option<&[ToolCall]>) -> ExtractionResult {
    if let Some(calls) = structured {
        if !calls.is_empty() {
            return ExtractionResult {
                calls: calls.to_vec(),
                cleaned_content: content.to_string(),
                format: ExtractedFormat::Structured,
            };
        }
    }

    if let Some(result) = extract_xml(content) {
        return result;
    }
    if let Some(result) = extract_bracket(content) {
        return result;
    }
    if let Some(result) = extract_call_prefix(content) {
        return result;
    }
    if let Some(result) = extract_json_block(content) {
        return result;
    }

    ExtractionResult {
        calls: Vec::new(),
        cleaned_content: content.trim().to_string(),
        format: ExtractedFormat::None,
    }
}

fn extract_xml(content: &str) -> Option<ExtractionResult> {
    let mut calls = Vec::new();
    let mut cleaned = content.to_string();

    for m in xml_call_re().find_iter(content) {
        if let Some(obj) = crate::json_repair::xml_tool_call_to_json(m.as_str()) {
            calls.push(to_tool_call(&obj));
        }
        cleaned = cleaned.replacen(m.as_str(), "", 1);
    }

    if calls.is_empty() {
        return None;
    }

    Some(ExtractionResult {
        calls,
        cleaned_content: cleaned.trim().to_string(),
        format: ExtractedFormat::Xml,
    })
}

fn extract_bracket(content: &str) -> Option<ExtractionResult> {
    let caps: Vec<_> = bracket_re().captures_iter(content).collect();
    if caps.is_empty() {
        return None;
    }

    let mut calls = Vec::new();
    let mut cleaned = content.to_string();

    for cap in &caps {
        let name = cap.get(1).unwrap().as_str();
        let op = cap.get(2).unwrap().as_str();
        let json_text = cap.get(3).unwrap().as_str();

        if let Ok(mut value) = crate::json_repair::parse_or_repair(json_text) {
            if let Value::Object(ref mut map) = value {
                map.entry("operation").or_insert_with(|| Value::String(op.to_string()));
            }
            calls.push(ToolCall {
                id: fabricate_id(),
                name: name.to_string(),
                arguments: serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string()),
            });
        }
        cleaned = cleaned.replacen(cap.get(0).unwrap().as_str(), "", 1);
    }

    if calls.is_empty() {
        return None;
    }

    Some(ExtractionResult {
        calls,
        cleaned_content: cleaned.trim().to_string(),
        format: ExtractedFormat::Bracket,
    })
}

fn extract_call_prefix(content: &str) -> Option<ExtractionResult> {
    let caps: Vec<_> = call_prefix_re().captures_iter(content).collect();
    if caps.is_empty() {
        return None;
    }

    let mut calls = Vec::new();
    let mut cleaned = content.to_string();

    for cap in &caps {
        let name = cap.get(1).unwrap().as_str();
        let json_text = cap.get(2).unwrap().as_str();
        if let Ok(value) = crate::json_repair::parse_or_repair(json_text) {
            calls.push(ToolCall {
                id: fabricate_id(),
                name: name.to_string(),
                arguments: serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string()),
            });
        }
        cleaned = cleaned.replacen(cap.get(0).unwrap().as_str(), "", 1);
    }

    if calls.is_empty() {
        return None;
    }

    Some(ExtractionResult {
        calls,
        cleaned_content: cleaned.trim().to_string(),
        format: ExtractedFormat::Call,
    })
}

fn extract_json_block(content: &str) -> Option<ExtractionResult> {
    let caps: Vec<_> = fenced_json_re().captures_iter(content).collect();
    if caps.is_empty() {
        return None;
    }

    let mut calls = Vec::new();
    let mut cleaned = content.to_string();

    for cap in &caps {
        let body = cap.get(1).unwrap().as_str();
        let whole_match = cap.get(0).unwrap().as_str();

        if let Ok(value) = crate::json_repair::parse_or_repair(body) {
            match value {
                Value::Array(items) => {
                    for item in items {
                        if item.get("name").is_some() {
                            calls.push(to_tool_call(&item));
                        }
                    }
                }
                Value::Object(_) if value.get("name").is_some() => {
                    calls.push(to_tool_call(&value));
                }
                _ => {}
            }
        }
        if !calls.is_empty() {
            cleaned = cleaned.replacen(whole_match, "", 1);
        }
    }

    if calls.is_empty() {
        return None;
    }

    Some(ExtractionResult {
        calls,
        cleaned_content: cleaned.trim().to_string(),
        format: ExtractedFormat::JsonBlock,
    })
}

fn to_tool_call(obj: &Value) -> ToolCall {
    let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let arguments = obj
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    ToolCall {
        id: fabricate_id(),
        name,
        arguments: serde_json::to_string(&arguments).unwrap_or_else(|_| "{}".to_string()),
    }
}
