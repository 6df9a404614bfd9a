//! Ordered JSON extraction strategies for freeform generation text.
//!
//! Each role lists the strategies it accepts, tightest first. The first
//! strategy that yields a candidate deserializing into the target type wins.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ExtractionError;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("fence regex"));

/// A single, independently testable way of locating a JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Content between `<tag>` and `</tag>`, with any fence inside unwrapped.
    Delimited(&'static str),
    /// Content of any markdown fenced block, in document order.
    Fenced,
    /// Any balanced `{...}` object mentioning `"key"`.
    ObjectWithKey(&'static str),
    /// The whole trimmed response.
    WholeText,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Delimited(tag) => write!(f, "delimited <{tag}>"),
            Strategy::Fenced => write!(f, "fenced block"),
            Strategy::ObjectWithKey(key) => write!(f, "object with key {key:?}"),
            Strategy::WholeText => write!(f, "whole text"),
        }
    }
}

impl Strategy {
    /// Candidate payload slices this strategy finds in `text`, in priority order.
    pub fn candidates<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self {
            Strategy::Delimited(tag) => delimited(text, tag)
                .map(|inner| vec![unwrap_single_fence(inner)])
                .unwrap_or_default(),
            Strategy::Fenced => FENCE_RE
                .captures_iter(text)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
                .filter(|inner| !inner.is_empty())
                .collect(),
            Strategy::ObjectWithKey(key) => balanced_objects(text)
                .into_iter()
                .filter(|object| object.contains(&format!("\"{key}\"")))
                .collect(),
            Strategy::WholeText => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Vec::new()
                } else {
                    vec![trimmed]
                }
            }
        }
    }
}

/// A payload recovered from text together with the strategy that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub strategy: Strategy,
}

/// Try `strategies` in order; return the first candidate that parses as `T`.
pub fn extract_json<T: DeserializeOwned>(
    text: &str,
    strategies: &[Strategy],
    what: &str,
) -> Result<Extracted<T>, ExtractionError> {
    for strategy in strategies {
        for candidate in strategy.candidates(text) {
            if let Ok(value) = serde_json::from_str::<T>(candidate) {
                return Ok(Extracted {
                    value,
                    strategy: *strategy,
                });
            }
        }
    }
    let tried = strategies
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(ExtractionError {
        what: what.to_string(),
        detail: format!("no candidate parsed (tried: {tried})"),
    })
}

/// Like [`extract_json`] but stops at the first syntactically valid JSON value,
/// leaving schema checks to the caller.
pub fn extract_value(
    text: &str,
    strategies: &[Strategy],
    what: &str,
) -> Result<Extracted<Value>, ExtractionError> {
    extract_json::<Value>(text, strategies, what)
}

fn delimited<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..]
        .find(&close)
        .map(|idx| start + idx)
        .unwrap_or(text.len());
    Some(text[start..end].trim())
}

fn unwrap_single_fence(inner: &str) -> &str {
    match FENCE_RE.captures(inner) {
        Some(caps) if inner.trim_start().starts_with("```") => caps
            .get(1)
            .map(|m| m.as_str().trim())
            .unwrap_or(inner),
        _ => inner,
    }
}

/// Every top-level balanced `{...}` span, honoring JSON string escapes.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0
                    && let Some(begin) = start.take()
                {
                    objects.push(&text[begin..=idx]);
                }
            }
            _ => {}
        }
    }

    objects
}
