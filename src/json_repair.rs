//! JSON Repairer (C2).
//!
//! Salvages the handful of malformations models commonly emit in tool-call
//! arguments (a dangling key with no value, a leading-zero-less decimal, a
//! trailing comma) and reparses. Also accepts the alternate XML tool-call
//! transport some models use and translates it into the same canonical
//! JSON shape the rest of the core expects.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Attempt to parse `s` as JSON without any repair.
pub fn try_parse(s: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(s)
}

fn missing_value_before_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#":\s*,"#).unwrap())
}

fn missing_value_before_close_brace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#":\s*\}"#).unwrap())
}

fn missing_value_before_close_bracket() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#":\s*\]"#).unwrap())
}

fn leading_zero_positive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#":(\s*)\.(\d)"#).unwrap())
}

fn leading_zero_negative() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#":(\s*)-\.(\d)"#).unwrap())
}

fn trailing_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#",(\s*)([\}\]])"#).unwrap())
}

/// Apply the repair rewrites, in order, then reparse. Idempotent: running
/// this on already-valid JSON text is a no-op (the rewrites only match
/// patterns that are never valid JSON to begin with).
pub fn repair(s: &str) -> Result<Value, crate::CoreError> {
    let mut out = s.to_string();

    out = missing_value_before_comma().replace_all(&out, ": null,").into_owned();
    out = missing_value_before_close_brace()
        .replace_all(&out, ": null}")
        .into_owned();
    out = missing_value_before_close_bracket()
        .replace_all(&out, ": null]")
        .into_owned();

    out = leading_zero_negative().replace_all(&out, ":${1}-0.$2").into_owned();
    out = leading_zero_positive().replace_all(&out, ":${1}0.$2").into_owned();

    out = trailing_comma().replace_all(&out, "$1$2").into_owned();

    try_parse(&out).map_err(|e| crate::CoreError::BadJson(format!("{e}: {s}")))
}

/// Parse `s`, falling back to [`repair`] on failure. This is the entry
/// point the executor and extractor use.
pub fn parse_or_repair(s: &str) -> Result<Value, crate::CoreError> {
    match try_parse(s) {
        Ok(v) => Ok(v),
        Err(_) => repair(s),
    }
}

/// Translate a `<tool_call>` / provider XML tool-call transport into a
/// canonical `{"name": ..., "arguments": {...}}` JSON object.
///
/// Accepts both a `<name>`/`<parameter name="x">v</parameter>` shape and a
/// `<name>`/`<argument name="x">v</argument>` shape; unrecognized children
/// are ignored.
pub fn xml_tool_call_to_json(xml: &str) -> Option<Value> {
    let name = extract_tag(xml, "name")?;
    let mut arguments = serde_json::Map::new();

    for (attr_name, value) in extract_named_children(xml, "parameter")
        .into_iter()
        .chain(extract_named_children(xml, "argument"))
    {
        arguments.insert(attr_name, Value::String(value));
    }

    Some(serde_json::json!({
        "name": name,
        "arguments": Value::Object(arguments)
    }))
}

fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    static CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
    let mut cache = cache.lock().unwrap();
    let re = cache.entry(tag.to_string()).or_insert_with(|| {
        Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).unwrap()
    });
    re.captures(xml)
        .map(|c| c.get(1).unwrap().as_str().trim().to_string())
}

fn extract_named_children(xml: &str, tag: &str) -> Vec<(String, String)> {
    let re = Regex::new(&format!(
        r#"(?s)<{tag}\s+name="([^"]+)"\s*>(.*?)</{tag}>"#
    ))
    .unwrap();
    re.captures_iter(xml)
        .map(|c| {
            (
                c.get(1).unwrap().as_str().to_string(),
                c.get(2).unwrap().as_str().trim().to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn valid_json_is_unchanged_by_repair() {
        let valid = r#"{"offset": 5, "length": 8192}"#;
        let parsed_direct = try_parse(valid).unwrap();
        let parsed_repaired = repair(valid).unwrap();
        assert_eq!(parsed_direct, parsed_repaired);
    }

    #[rstest]
    #[case(r#"{"offset":,"length":8192}"#, r#"{"offset":null,"length":8192}"#)]
    #[case(r#"{"offset":}"#, r#"{"offset":null}"#)]
    #[case(r#"{"items":[1,2,]}"#, r#"{"items":[1,2]}"#)]
    #[case(r#"{"x":.5}"#, r#"{"x":0.5}"#)]
    #[case(r#"{"x":-.5}"#, r#"{"x":-0.5}"#)]
    fn repairs_common_malformations(#[case] broken: &str, #[case] expected: &str) {
        let repaired = repair(broken).unwrap();
        let expected_value: Value = serde_json::from_str(expected).unwrap();
        assert_eq!(repaired, expected_value);
    }

    #[test]
    fn unrepairable_json_is_bad_json_error() {
        let broken = r#"{"a": "unterminated string}"#;
        assert!(matches!(repair(broken), Err(crate::CoreError::BadJson(_))));
    }

    #[test]
    fn repair_is_idempotent_on_valid_json() {
        let valid = r#"{"a": 1, "b": [1, 2, 3]}"#;
        let once = repair(valid).unwrap();
        let twice = repair(&serde_json::to_string(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn xml_tool_call_translates_to_canonical_json() {
        let xml = r#"<tool_call>
            <name>read_file</name>
            <parameter name="path">src/main.rs</parameter>
            <parameter name="limit">200</parameter>
        </tool_call>"#;
        let v = xml_tool_call_to_json(xml).unwrap();
        assert_eq!(v["name"], "read_file");
        assert_eq!(v["arguments"]["path"], "src/main.rs");
        assert_eq!(v["arguments"]["limit"], "200");
    }

    #[test]
    fn xml_without_name_returns_none() {
        assert!(xml_tool_call_to_json("<tool_call><parameter name=\"x\">1</parameter></tool_call>").is_none());
    }
}
