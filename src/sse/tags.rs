//! Content tag decoding.
//!
//! Status lines carry an inline routing tag naming the tool they belong to:
//! `[MCP:<tool>]` opens or continues a progress line, `[REPLACE:<tool>]`
//! overwrites the line rendered for that tool. The decoder is pure and does
//! not care who produced the tag; the formatter in this crate emits them, but
//! a backend could embed its own and they route identically.

use once_cell::sync::Lazy;
use regex::Regex;

/// Opens or appends to a tool's progress line.
pub const MCP_TAG_PREFIX: &str = "[MCP:";

/// Replaces the tool's previously rendered progress line.
pub const REPLACE_TAG_PREFIX: &str = "[REPLACE:";

static MCP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[MCP:([^\]]+)\]").unwrap());
static REPLACE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[REPLACE:([^\]]+)\]").unwrap());

/// A text chunk with its routing tag resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedChunk {
    /// Tool the chunk belongs to, `None` for plain answer text
    pub tool_name: Option<String>,
    /// Chunk text with any tags stripped
    pub text: String,
    /// Whether the chunk replaces the tool's rendered line
    pub is_replace: bool,
}

/// Resolve the routing tag of a text chunk.
///
/// A replace tag takes priority when both kinds are present. Tagged chunks
/// have every tag stripped and surrounding whitespace trimmed; untagged
/// chunks pass through byte for byte.
pub fn extract_tag(content: &str) -> TaggedChunk {
    if let Some(caps) = REPLACE_TAG.captures(content) {
        return TaggedChunk {
            tool_name: Some(caps[1].to_string()),
            text: strip_tags(content).trim().to_string(),
            is_replace: true,
        };
    }
    if let Some(caps) = MCP_TAG.captures(content) {
        return TaggedChunk {
            tool_name: Some(caps[1].to_string()),
            text: strip_tags(content).trim().to_string(),
            is_replace: false,
        };
    }
    TaggedChunk {
        tool_name: None,
        text: content.to_string(),
        is_replace: false,
    }
}

/// Build the tag prefix for a tool's status line.
pub fn make_tag(tool: &str, is_replace: bool) -> String {
    if is_replace {
        format!("{REPLACE_TAG_PREFIX}{tool}]")
    } else {
        format!("{MCP_TAG_PREFIX}{tool}]")
    }
}

/// Remove every routing tag from the text.
pub fn strip_tags(content: &str) -> String {
    let without_replace = REPLACE_TAG.replace_all(content, "");
    MCP_TAG.replace_all(&without_replace, "").into_owned()
}
