//! JSON repair utilities for handling malformed LLM output.
//!
//! Models frequently emit JSON that is almost right:
//! - Python literals (True/False/None)
//! - Trailing commas
//! - Comments
//! - Single-quoted strings
//! - Unquoted keys
//!
//! The helpers here repair what can be repaired and locate balanced
//! `{...}` / `[...]` spans inside surrounding prose.

use regex::Regex;
use serde_json::Value;

lazy_static::lazy_static! {
    /// Ordered rewrite rules applied by `repair_malformed_json`.
    static ref REPAIRS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"(?m)^\s*//.*$").expect("static regex"), ""),
        (Regex::new(r"(?s)/\*.*?\*/").expect("static regex"), ""),
        (Regex::new(r"\bTrue\b").expect("static regex"), "true"),
        (Regex::new(r"\bFalse\b").expect("static regex"), "false"),
        (Regex::new(r"\bNone\b").expect("static regex"), "null"),
        (Regex::new(r",(\s*[}\]])").expect("static regex"), "$1"),
    ];
}

/// Repair common JSON issues from LLMs.
///
/// Rewrites only touch text outside string literals, so answer text such
/// as "None of the rows are True" survives unchanged.
pub fn repair_malformed_json(json_str: &str) -> String {
    let trimmed = json_str
        .trim_start_matches('\u{feff}')
        .trim_start_matches('\u{fffe}');

    let repaired = map_outside_strings(trimmed, |segment| {
        let mut segment = segment.to_string();
        for (pattern, replacement) in REPAIRS.iter() {
            segment = pattern.replace_all(&segment, *replacement).into_owned();
        }
        segment
    });

    escape_newlines_in_strings(&repaired)
}

/// Apply `rewrite` to every run of text outside a `"..."` or `'...'`
/// literal. Literals are copied verbatim; an unterminated one runs to the end.
fn map_outside_strings(s: &str, rewrite: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(s.len());
    let mut segment = String::new();
    let mut quote: Option<char> = None;
    let mut escape_next = false;

    for c in s.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if escape_next {
                    escape_next = false;
                } else if c == '\\' {
                    escape_next = true;
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => {
                out.push_str(&rewrite(&segment));
                segment.clear();
                out.push(c);
                quote = Some(c);
            }
            None => segment.push(c),
        }
    }

    out.push_str(&rewrite(&segment));
    out
}

/// Replace raw newlines that sit inside string literals with `\n`.
fn escape_newlines_in_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' if in_string => {
                escape_next = true;
                out.push(c);
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => {}
            _ => out.push(c),
        }
    }

    out
}

/// Parse JSON with lenient fallbacks.
/// Fallback chain:
/// 1. Direct serde_json parse
/// 2. repair_malformed_json + serde_json
/// 3. Single quotes swapped for double quotes
/// 4. json5 (unquoted keys, single quotes, comments)
pub fn parse_json_lenient(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(val) = serde_json::from_str::<Value>(raw) {
        return Some(val);
    }

    let fixed = repair_malformed_json(raw);
    if let Ok(val) = serde_json::from_str::<Value>(&fixed) {
        return Some(val);
    }

    if !fixed.contains('"') {
        if let Ok(val) = serde_json::from_str::<Value>(&fixed.replace('\'', "\"")) {
            return Some(val);
        }
    }

    json5::from_str::<Value>(&fixed).ok()
}

/// Extract the balanced `{...}` or `[...]` span that opens at byte `start`.
///
/// Tracks string literals so brackets inside strings do not count, and
/// requires closing brackets to match the most recent opener.
pub fn extract_balanced_span(s: &str, start: usize) -> Option<&str> {
    let tail = s.get(start..)?;
    let first = tail.chars().next()?;
    if first != '{' && first != '[' {
        return None;
    }

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in tail.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => stack.push(c),
            '}' | ']' if !in_string => {
                let opener = stack.pop()?;
                if (opener == '{') != (c == '}') {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&tail[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Find every top-level balanced `{...}` / `[...]` span in content, in order.
pub fn find_balanced_spans(content: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut i = 0;

    while i < content.len() {
        let Some(c) = content[i..].chars().next() else {
            break;
        };
        if c == '{' || c == '[' {
            if let Some(span) = extract_balanced_span(content, i) {
                spans.push(span);
                i += span.len();
                continue;
            }
        }
        i += c.len_utf8();
    }

    spans
}

/// Undo one level of string-literal escaping: `"{\"a\": 1}"` -> `{"a": 1}`.
pub fn unescape_string_literal(block: &str) -> Option<String> {
    let trimmed = block.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return serde_json::from_str::<String>(trimmed).ok();
    }
    None
}
