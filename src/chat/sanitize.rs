//! Cleanup of model answers before display

use regex::Regex;
use std::sync::OnceLock;

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"))
}

fn blank_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n\s*\n").expect("valid regex"))
}

/// Strip reasoning traces and normalize blank lines.
///
/// Every `<think>...</think>` block is removed (case-insensitive, spanning
/// newlines), runs of three or more newlines collapse to one blank line, and
/// the result is trimmed. `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.to_string();
    // Removing one block can splice a new one together from its neighbours
    while think_block().is_match(&text) {
        text = think_block().replace_all(&text, "").into_owned();
    }
    blank_run().replace_all(&text, "\n\n").trim().to_string()
}
