//! Raw response cleanup, truncation detection, and continuation merging.
//!
//! A model asked for a large material sometimes stops mid-answer and
//! leaves a `[CONTINUE]` marker. The session then requests one follow-up
//! fragment (nodes and links only) and splices it onto the original here.

use log::info;

use crate::spec::GraphSpec;

const CONTINUE_MARKER: &str = "[CONTINUE]";

/// Minimum plausible length of a complete material response. Anything
/// shorter that also fails to parse is reported as truncated rather than
/// malformed.
const MIN_COMPLETE_LEN: usize = 1500;

/// Strips the continuation marker and any markdown code fences.
/// Returns the cleaned text and whether the marker was present.
pub fn clean_response_text(raw: &str) -> (String, bool) {
    let has_marker =
        raw.contains(CONTINUE_MARKER) || raw.to_lowercase().contains("[continue]");

    let text = raw.replace(CONTINUE_MARKER, "").replace("[continue]", "");
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
    }

    (text.trim().to_string(), has_marker)
}

/// Heuristic for a response that stopped mid-payload: too short to be a
/// complete material, or not ending on a closing brace.
pub fn is_likely_truncated(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.len() < MIN_COMPLETE_LEN || !trimmed.ends_with('}')
}

/// Appends a continuation fragment onto the original graph. Fragment link
/// indices refer to the fragment's own node list, so both ends are offset
/// by the original node count. Original nodes and links keep their order
/// and indices.
pub fn merge(original: GraphSpec, fragment: GraphSpec) -> GraphSpec {
    let offset = original.nodes.len();
    let mut merged = original;

    info!(
        "merging continuation: {} nodes, {} links (offset {offset})",
        fragment.nodes.len(),
        fragment.links.len()
    );

    merged.nodes.extend(fragment.nodes);
    for mut link in fragment.links {
        link.from_node += offset;
        link.to_node += offset;
        merged.links.push(link);
    }
    merged
}
