// src/core/extract.rs — Pull script code out of model free text

use std::sync::LazyLock;

use regex::Regex;

/// A fenced block with an optional language tag on the opening line.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[\w+-]*[ \t]*\r?\n)?(.*?)```").expect("valid fence regex")
});

static OPENING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\w+-]*[ \t]*\r?\n").expect("valid fence regex"));

static REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid reasoning regex"));

/// Remove hidden reasoning spans (`<think>...</think>`).
pub fn strip_reasoning(text: &str) -> String {
    REASONING_RE.replace_all(text, "").into_owned()
}

/// The first fenced code block, trimmed. `None` if there is no block or it is blank.
pub fn extract_code(text: &str) -> Option<String> {
    let text = strip_reasoning(text);
    FENCE_RE
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
}

/// Drop every fence marker, including opening-line language tags, and trim.
pub fn strip_fences(text: &str) -> String {
    OPENING_FENCE_RE
        .replace_all(text, "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Code from a repair response. Never fails: when no fenced block is found the
/// raw text, minus fence markers, is taken as the code.
pub fn repair_code(text: &str) -> String {
    extract_code(text).unwrap_or_else(|| strip_fences(&strip_reasoning(text)))
}
