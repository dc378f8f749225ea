// src/core/subtasks.rs — Decompose a request into ordered subtasks
//
// One oracle call, then an ordered chain of list parsers over the reply.
// The first parser to yield a non-empty list wins. A parser error or an
// all-empty chain drops to a line-based fallback that always yields at
// least one subtask.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::extract::strip_reasoning;
use super::oracle::CodeOracle;
use super::prompts::SUBTASK_GENERATOR;

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\d+\.[ \t]*(.*?)[ \t]*\r?$").expect("valid numbered regex")
});

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*•⦁◦▪▫■□●○]\s*").expect("valid bullet regex"));

/// Which parser produced the subtask list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    LiteralList,
    Numbered,
    Bulleted,
}

/// How a subtask list came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PlanStatus {
    Parsed(ParseStrategy),
    /// No parser matched; lines of the reply were taken as-is.
    Fallback,
    /// The request was empty; the oracle was not called.
    EmptyRequest,
    /// The oracle call failed; the request itself is the only subtask.
    OracleFailed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskPlan {
    pub subtasks: Vec<String>,
    pub status: PlanStatus,
}

type ParseFn = fn(&str) -> Result<Vec<String>, String>;

/// Tried in order. `Ok(vec![])` means "no match, try the next one".
const PARSERS: &[(ParseStrategy, ParseFn)] = &[
    (ParseStrategy::LiteralList, parse_literal_list),
    (ParseStrategy::Numbered, parse_numbered),
    (ParseStrategy::Bulleted, parse_bulleted),
];

pub struct SubtaskSynthesizer {
    oracle: Arc<dyn CodeOracle>,
}

impl SubtaskSynthesizer {
    pub fn new(oracle: Arc<dyn CodeOracle>) -> Self {
        Self { oracle }
    }

    /// Never fails. An empty request yields an empty plan without an oracle call.
    pub async fn synthesize(&self, request: &str) -> SubtaskPlan {
        if request.trim().is_empty() {
            return SubtaskPlan {
                subtasks: Vec::new(),
                status: PlanStatus::EmptyRequest,
            };
        }

        let vars = serde_json::json!({ "input": request });
        match self.oracle.invoke(SUBTASK_GENERATOR, vars).await {
            Ok(reply) => {
                let plan = parse_subtasks(&reply, request);
                tracing::debug!(
                    count = plan.subtasks.len(),
                    status = ?plan.status,
                    "Subtasks parsed"
                );
                plan
            }
            Err(e) => {
                tracing::warn!("Subtask generation failed: {}", e);
                SubtaskPlan {
                    subtasks: vec![request.trim().to_string()],
                    status: PlanStatus::OracleFailed(e.to_string()),
                }
            }
        }
    }
}

/// Parse an oracle reply into subtasks. Always returns at least one non-empty
/// subtask; `request` is the last resort when the reply is blank.
pub fn parse_subtasks(reply: &str, request: &str) -> SubtaskPlan {
    let cleaned = strip_reasoning(reply);

    for (strategy, parse) in PARSERS {
        match parse(&cleaned) {
            Ok(items) => {
                let items = non_empty(items);
                if !items.is_empty() {
                    return SubtaskPlan {
                        subtasks: items,
                        status: PlanStatus::Parsed(*strategy),
                    };
                }
            }
            Err(e) => {
                tracing::debug!(strategy = ?strategy, "List parse failed: {}", e);
                break;
            }
        }
    }

    SubtaskPlan {
        subtasks: fallback_lines(&cleaned, request),
        status: PlanStatus::Fallback,
    }
}

fn non_empty(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn fallback_lines(text: &str, request: &str) -> Vec<String> {
    let lines: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("```"))
        .map(String::from)
        .collect();
    if !lines.is_empty() {
        return lines;
    }
    let whole = text.trim();
    if whole.is_empty() {
        vec![request.trim().to_string()]
    } else {
        vec![whole.to_string()]
    }
}

/// The span from the first `[` to the last `]`, read as a list of string literals.
fn parse_literal_list(text: &str) -> Result<Vec<String>, String> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Ok(Vec::new());
    };
    if end < start {
        return Err("unbalanced brackets".into());
    }
    let span = &text[start..=end];

    if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(span) {
        return values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => Ok(s),
                other => Err(format!("non-string list element: {other}")),
            })
            .collect();
    }
    parse_quoted_items(&span[1..span.len() - 1])
}

/// Comma-separated single- or double-quoted string literals.
fn parse_quoted_items(inner: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '"' && quote != '\'' {
            return Err(format!("expected a string literal, found '{quote}'"));
        }

        let mut item = String::new();
        loop {
            match chars.next() {
                None => return Err("unterminated string literal".into()),
                Some('\\') => match chars.next() {
                    Some('n') => item.push('\n'),
                    Some('t') => item.push('\t'),
                    Some(c) => item.push(c),
                    None => return Err("dangling escape".into()),
                },
                Some(c) if c == quote => break,
                Some(c) => item.push(c),
            }
        }
        items.push(item);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(c) => return Err(format!("expected ',' between items, found '{c}'")),
        }
    }
    Ok(items)
}

fn parse_numbered(text: &str) -> Result<Vec<String>, String> {
    Ok(NUMBERED_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect())
}

fn parse_bulleted(text: &str) -> Result<Vec<String>, String> {
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("```"))
        .map(|l| BULLET_RE.replace(l, "").into_owned())
        .collect())
}
