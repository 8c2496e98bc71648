//! Tolerant extraction of structured data from free-form model text.
//!
//! Model output is untrusted input. Every structured reply (tool calls,
//! selections, SQL) goes through `extract_json_object`, which tries several
//! strategies and falls back to an empty object rather than failing.
//!
//! ## Module Structure
//! - `json_fixer`: JSON repair and balanced-bracket scanning
//! - `markdown_json_parser`: ```json fenced block extraction
//! - `python_detector`: Python code candidates for the code agents

pub mod json_fixer;
pub mod markdown_json_parser;
pub mod python_detector;

use regex::Regex;
use serde_json::{Map, Value};

use json_fixer::{find_balanced_spans, parse_json_lenient, unescape_string_literal};
use markdown_json_parser::fenced_json_blocks;

pub use python_detector::{extract_python_code, is_valid_python_syntax};

pub type JsonObject = Map<String, Value>;

lazy_static::lazy_static! {
    static ref ESCAPED_OBJECT: Regex = Regex::new(r#""(\{\\n.*?\})""#).expect("static regex");
}

/// Extract the first JSON object from model text.
///
/// Strategies, in order:
/// 1. The whole content
/// 2. ```json fenced blocks
/// 3. Balanced `{...}` / `[...]` spans found in prose
/// 4. An escaped, stringified object (`"{\n  \"tool\": ...}"`)
///
/// Returns an empty object when nothing usable is found; callers treat that
/// as "no selection".
pub fn extract_json_object(content: &str) -> JsonObject {
    if let Some(obj) = parse_block(content) {
        return obj;
    }

    if let Some(obj) = fenced_json_blocks(content).into_iter().find_map(parse_block) {
        return obj;
    }

    if let Some(obj) = find_balanced_spans(content).into_iter().find_map(parse_block) {
        return obj;
    }

    if let Some(obj) = ESCAPED_OBJECT
        .captures(content)
        .and_then(|cap| cap.get(1))
        .and_then(|m| serde_json::from_str::<String>(&format!("\"{}\"", m.as_str())).ok())
        .and_then(|unescaped| parse_block(&unescaped))
    {
        return obj;
    }

    tracing::debug!(
        "[ToolParsing] No JSON object found in {} chars of model output",
        content.len()
    );
    JsonObject::new()
}

fn parse_block(block: &str) -> Option<JsonObject> {
    let owned;
    let block = match unescape_string_literal(block) {
        Some(unescaped) => {
            owned = unescaped;
            owned.as_str()
        }
        None => block,
    };

    match parse_json_lenient(block)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Read `key` as a list of strings, skipping non-string entries.
/// Missing keys and non-array values yield an empty list.
pub fn string_list(obj: &JsonObject, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_whole_content_json() {
        let obj = extract_json_object(r#"{"tool": "final_answer", "args": {"answer": "X"}}"#);
        assert_eq!(obj["tool"], "final_answer");
        assert_eq!(obj["args"]["answer"], "X");
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let content = "Sure, these tasks apply.\n```json\n{\n  \"tasks\": [\"chart_generation\"]\n}\n```\nLet me know.";
        let obj = extract_json_object(content);
        assert_eq!(string_list(&obj, "tasks"), vec!["chart_generation"]);
    }

    #[test]
    fn test_balanced_scan_in_prose() {
        let content = r#"Thought: I need data first. {"tool": "sql_database_retriever", "args": {"task": "x", "db_name": "sales"}} I'll wait."#;
        let obj = extract_json_object(content);
        assert_eq!(obj["tool"], "sql_database_retriever");
        assert_eq!(obj["args"]["db_name"], "sales");
    }

    #[test]
    fn test_balanced_scan_skips_leading_array() {
        let content = r#"Options [1, 2] then {"sql": null, "explanation": "no table"}"#;
        let obj = extract_json_object(content);
        assert_eq!(obj["sql"], Value::Null);
        assert_eq!(obj["explanation"], "no table");
    }

    #[test]
    fn test_escaped_string_recovery() {
        let content = r#"answer: "{\n  \"tool\": \"final_answer\", \"args\": {\"answer\": \"done\"}}" end"#;
        let obj = extract_json_object(content);
        assert_eq!(obj["tool"], "final_answer");
    }

    #[test]
    fn test_quoted_fenced_block_is_unescaped() {
        let content = "```json\n\"{\\\"data_sources\\\": [\\\"sales\\\"]}\"\n```";
        let obj = extract_json_object(content);
        assert_eq!(string_list(&obj, "data_sources"), vec!["sales"]);
    }

    #[test]
    fn test_python_literals_are_repaired() {
        let obj = extract_json_object("```json\n{\"sql\": None, \"explanation\": \"nothing\",}\n```");
        assert_eq!(obj["sql"], Value::Null);
    }

    #[test]
    fn test_repair_leaves_final_answer_text_alone() {
        let content = "```json\n{\"tool\": \"final_answer\", \"args\": {\"answer\": \"None of the rows are True\",}}\n```";
        let obj = extract_json_object(content);
        assert_eq!(obj["args"]["answer"], "None of the rows are True");
    }

    #[test]
    fn test_nothing_parsable_yields_empty_object() {
        assert!(extract_json_object("I could not decide.").is_empty());
        assert!(extract_json_object("").is_empty());
        assert!(extract_json_object("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_string_list_skips_junk() {
        let obj = json!({"tasks": ["a", 3, " ", "b "], "other": "x"});
        let obj = obj.as_object().unwrap();
        assert_eq!(string_list(obj, "tasks"), vec!["a", "b"]);
        assert!(string_list(obj, "other").is_empty());
        assert!(string_list(obj, "missing").is_empty());
    }

    proptest! {
        #[test]
        fn prop_fenced_and_bare_tool_calls_parse_identically(
            tool in "[a-z_]{1,20}",
            answer in "[ -~]{0,40}",
            count in 0i64..1000,
        ) {
            let call = json!({"tool": tool, "args": {"answer": answer, "count": count}});
            let bare = serde_json::to_string(&call).unwrap();
            let fenced = format!("```json\n{}\n```", bare);
            let from_bare = extract_json_object(&bare);
            let from_fenced = extract_json_object(&fenced);
            prop_assert_eq!(&from_bare, &from_fenced);
            prop_assert_eq!(Value::Object(from_bare), call);
        }
    }
}
