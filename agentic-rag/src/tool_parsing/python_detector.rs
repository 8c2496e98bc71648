//! Python code candidate extraction from model responses.
//!
//! Code agents expect the model to answer with one or more fenced
//! ```py / ```python blocks. A response without a fence is still usable when
//! the whole text is syntactically valid Python.

use regex::Regex;
use rustpython_parser::{ast, Parse};

lazy_static::lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```(?:py|python)?\n(.*?)\n```").expect("static regex");
}

/// Extract the code candidate from a model response.
///
/// All fenced blocks are joined with a blank line. Without a fence the raw
/// text is returned only if it parses as Python. The error string is written
/// for the model and is fed back verbatim.
pub fn extract_python_code(response: &str) -> Result<String, String> {
    let blocks: Vec<&str> = CODE_FENCE
        .captures_iter(response)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .collect();

    if !blocks.is_empty() {
        return Ok(blocks.join("\n\n"));
    }

    if !response.trim().is_empty() && is_valid_python_syntax(response) {
        return Ok(response.to_string());
    }

    Err(missing_code_message(response))
}

fn missing_code_message(response: &str) -> String {
    format!(
        "The code blob is invalid: no fenced ```py block was found in your response and the text \
         itself is not valid Python.\nYour response was:\n{}\n\nMake sure to include code with the \
         correct pattern, for instance:\nThoughts: Your thoughts\nCode:\n```py\n# Your python code \
         here\n```<end_code>",
        response.trim()
    )
}

/// Validate Python syntax without executing anything.
pub fn is_valid_python_syntax(code: &str) -> bool {
    match ast::Suite::parse(code, "<candidate>") {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!("[PythonSyntaxCheck] Rejected unfenced candidate: {}", err);
            false
        }
    }
}
