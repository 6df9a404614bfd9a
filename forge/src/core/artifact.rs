//! Tolerant parser for the artifact protocol shared by every generating role.
//!
//! Generation text may contain any number of containers:
//!
//! ```text
//! <forgeArtifact id="app" title="App shell">
//! <forgeAction type="file" filePath="src/app.tsx">
//! ...file content...
//! </forgeAction>
//! <forgeAction type="shell">
//! npm install
//! </forgeAction>
//! </forgeArtifact>
//! ```
//!
//! The parser salvages as much structure as possible from unreliable, possibly
//! cut-off text, and never emits a corrupt action:
//! - a container or action still open at end of text is closed synthetically;
//! - an action whose body runs into another action opening is malformed and omitted;
//! - actions with an unknown type, or file actions without a path, are omitted;
//! - containers that yield no actions are dropped.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{Action, Artifact};
use crate::error::ArtifactEncodingError;

const ARTIFACT_OPEN: &str = "<forgeArtifact";
const ARTIFACT_CLOSE: &str = "</forgeArtifact>";
const ACTION_OPEN: &str = "<forgeAction";
const ACTION_CLOSE: &str = "</forgeAction>";

static ARTIFACT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<forgeArtifact(\s[^<>]*)?>").expect("artifact tag regex"));
static ACTION_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<forgeAction(\s[^<>]*)?>").expect("action tag regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute regex")
});

/// Parse every artifact container in `text`.
pub fn parse_artifacts(text: &str) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(ARTIFACT_OPEN) {
        let open_start = cursor + found;
        let Some(tag) = ARTIFACT_TAG_RE.find(&text[open_start..]) else {
            // Garbled or truncated opening tag; look for the next container.
            cursor = open_start + ARTIFACT_OPEN.len();
            continue;
        };
        let attrs = parse_attributes(tag.as_str());
        let body_start = open_start + tag.end();

        let close = text[body_start..]
            .find(ARTIFACT_CLOSE)
            .map(|idx| body_start + idx);
        let next_open = text[body_start..]
            .find(ARTIFACT_OPEN)
            .map(|idx| body_start + idx);
        let (body_end, resume) = match (close, next_open) {
            (Some(close), Some(open)) if open < close => (open, open),
            (Some(close), _) => (close, close + ARTIFACT_CLOSE.len()),
            (None, Some(open)) => (open, open),
            (None, None) => (text.len(), text.len()),
        };

        let actions = parse_actions_in(&text[body_start..body_end]);
        if !actions.is_empty() {
            artifacts.push(Artifact {
                id: attr(&attrs, "id"),
                title: attr(&attrs, "title"),
                actions,
            });
        }
        cursor = resume;
    }

    artifacts
}

/// Parse all artifacts and flatten their actions in document order.
pub fn parse_actions(text: &str) -> Vec<Action> {
    parse_artifacts(text)
        .into_iter()
        .flat_map(|artifact| artifact.actions)
        .collect()
}

/// Serialize an artifact in the exact form `parse_artifacts` reads back.
///
/// Bodies the parser would alter are rejected instead of written lossily:
/// protocol markup inside a body, a non-markdown file that is one fenced
/// block, a padded path.
pub fn serialize_artifact(artifact: &Artifact) -> Result<String, ArtifactEncodingError> {
    if artifact.actions.is_empty() {
        return Err(ArtifactEncodingError::NoActions);
    }
    let mut buf = String::from(ARTIFACT_OPEN);
    if let Some(id) = &artifact.id {
        buf.push_str(&format!(" id=\"{}\"", escape_attr(id)));
    }
    if let Some(title) = &artifact.title {
        buf.push_str(&format!(" title=\"{}\"", escape_attr(title)));
    }
    buf.push_str(">\n");
    for (index, action) in artifact.actions.iter().enumerate() {
        let body = match action {
            Action::File { content, .. } | Action::Shell { content } => content,
        };
        if [ARTIFACT_OPEN, ARTIFACT_CLOSE, ACTION_OPEN, ACTION_CLOSE]
            .iter()
            .any(|marker| body.contains(marker))
        {
            return Err(ArtifactEncodingError::MarkupInContent { index });
        }
        let block = action_block(action);
        if parse_actions_in(&block) != [action.clone()] {
            return Err(ArtifactEncodingError::NotReversible { index });
        }
        buf.push_str(&block);
    }
    buf.push_str(ARTIFACT_CLOSE);
    buf.push('\n');
    Ok(buf)
}

fn action_block(action: &Action) -> String {
    match action {
        Action::File { path, content } => format!(
            "{ACTION_OPEN} type=\"file\" filePath=\"{}\">\n{content}\n{ACTION_CLOSE}\n",
            escape_attr(path)
        ),
        Action::Shell { content } => {
            format!("{ACTION_OPEN} type=\"shell\">\n{content}\n{ACTION_CLOSE}\n")
        }
    }
}

fn parse_actions_in(body: &str) -> Vec<Action> {
    let mut actions = Vec::new();
    let mut cursor = 0;

    while let Some(found) = body[cursor..].find(ACTION_OPEN) {
        let open_start = cursor + found;
        let Some(tag) = ACTION_TAG_RE.find(&body[open_start..]) else {
            cursor = open_start + ACTION_OPEN.len();
            continue;
        };
        let attrs = parse_attributes(tag.as_str());
        let content_start = open_start + tag.end();

        let close = body[content_start..]
            .find(ACTION_CLOSE)
            .map(|idx| content_start + idx);
        let next_open = body[content_start..]
            .find(ACTION_OPEN)
            .map(|idx| content_start + idx);
        let raw_content = match (close, next_open) {
            (Some(close), Some(open)) if open < close => {
                cursor = open;
                continue;
            }
            (Some(close), _) => {
                cursor = close + ACTION_CLOSE.len();
                &body[content_start..close]
            }
            (None, Some(open)) => {
                cursor = open;
                continue;
            }
            (None, None) => {
                cursor = body.len();
                strip_partial_close(&body[content_start..])
            }
        };

        if let Some(action) = build_action(&attrs, raw_content) {
            actions.push(action);
        }
    }

    actions
}

fn build_action(attrs: &[(String, String)], raw_content: &str) -> Option<Action> {
    let kind = attr(attrs, "type")?;
    match kind.as_str() {
        "file" => {
            let path = attr(attrs, "filePath").or_else(|| attr(attrs, "path"))?;
            let path = path.trim().to_string();
            if path.is_empty() {
                return None;
            }
            let mut content = clean_content(raw_content);
            if !path.ends_with(".md") {
                content = unwrap_fence(&content);
            }
            Some(Action::File { path, content })
        }
        "shell" => Some(Action::Shell {
            content: clean_content(raw_content),
        }),
        _ => None,
    }
}

/// Strip the single leading newline after the opening tag and a final
/// whitespace-only line before the closing tag.
fn clean_content(raw: &str) -> String {
    let content = raw
        .strip_prefix("\r\n")
        .or_else(|| raw.strip_prefix('\n'))
        .unwrap_or(raw);
    match content.rfind('\n') {
        Some(idx) if content[idx + 1..].chars().all(|c| c == ' ' || c == '\t') => {
            let end = if idx > 0 && content.as_bytes()[idx - 1] == b'\r' {
                idx - 1
            } else {
                idx
            };
            content[..end].to_string()
        }
        _ => content.to_string(),
    }
}

/// Unwrap content that is entirely one markdown fence.
fn unwrap_fence(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return content.to_string();
    }
    let Some(first_newline) = trimmed.find('\n') else {
        return content.to_string();
    };
    let inner = &trimmed[first_newline + 1..trimmed.len() - 3];
    if inner.contains("```") {
        return content.to_string();
    }
    inner.trim_end_matches([' ', '\t']).trim_end_matches('\n').to_string()
}

/// Remove a dangling prefix of a closing marker left by truncation.
fn strip_partial_close(content: &str) -> &str {
    for marker in [ACTION_CLOSE, ARTIFACT_CLOSE] {
        for len in (2..marker.len()).rev() {
            if content.ends_with(&marker[..len]) {
                return &content[..content.len() - len];
            }
        }
    }
    content
}

fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(tag)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
            Some((name, unescape_attr(value)))
        })
        .collect()
}

fn attr(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
