//! Markdown JSON code block extraction.
//!
//! Models asked for JSON commonly wrap it in a fence:
//! ```json
//! {"tool": "final_answer", "args": {"answer": "..."}}
//! ```

use regex::Regex;

lazy_static::lazy_static! {
    static ref JSON_FENCE: Regex = Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("static regex");
}

/// Bodies of all ```json fenced blocks, in order of appearance.
pub fn fenced_json_blocks(content: &str) -> Vec<&str> {
    JSON_FENCE
        .captures_iter(content)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .filter(|body| !body.is_empty())
        .collect()
}
