//! Canonical character stream of a subtree, and the mapping between stream
//! offsets and live tree locations.
//!
//! Offsets are UTF-16 code units, matching what the browser reports for
//! string lengths and selection offsets. A character outside the BMP counts 2.
//!
//! The stream is: text-node contents in document order, one `\n` per line
//! break element, nothing for subtrees marked as removed. Highlight wrappers
//! never change it, which is what keeps offsets stable across overlays.

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeData, NodeId};
use crate::error::{OverlayError, Result};
use crate::types::{BoundaryPoint, InternalMarker};
use crate::walker::TreeWalker;

/// Whitespace handling for the extracted stream.
///
/// Every character `Normalize` rewrites is a single UTF-16 unit, so offsets
/// are identical under both policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhitespacePolicy {
    #[default]
    Preserve,
    /// Map NBSP and other Unicode space separators to U+0020.
    Normalize,
}

/// Length of `s` in UTF-16 code units.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Byte index of a UTF-16 offset. Offsets inside a surrogate pair snap down.
pub fn utf16_to_byte(s: &str, utf16_offset: usize) -> usize {
    let mut units = 0;
    for (byte, ch) in s.char_indices() {
        let next = units + ch.len_utf16();
        if next > utf16_offset {
            return byte;
        }
        units = next;
    }
    s.len()
}

/// UTF-16 offset of a byte index (must be on a char boundary).
pub fn byte_to_utf16(s: &str, byte: usize) -> usize {
    utf16_len(&s[..byte.min(s.len())])
}

/// Substring addressed by a UTF-16 range, clamped to the string.
pub fn slice_utf16(s: &str, start: usize, end: usize) -> &str {
    let start = utf16_to_byte(s, start);
    let end = utf16_to_byte(s, end).max(start);
    &s[start..end]
}

fn is_space_variant(ch: char) -> bool {
    matches!(
        ch,
        '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
    )
}

/// Apply a whitespace policy to already-extracted text.
pub fn normalize_whitespace(text: &str, policy: WhitespacePolicy) -> String {
    match policy {
        WhitespacePolicy::Preserve => text.to_owned(),
        WhitespacePolicy::Normalize => text
            .chars()
            .map(|ch| if is_space_variant(ch) { ' ' } else { ch })
            .collect(),
    }
}

pub(crate) fn ensure_host(doc: &Document, host: NodeId) -> Result<()> {
    doc.ensure_element(host).map(|_| ())
}

/// Canonical stream of `host` with whitespace preserved.
pub fn extract_text(doc: &Document, host: NodeId) -> Result<String> {
    extract_text_with(doc, host, WhitespacePolicy::Preserve)
}

pub fn extract_text_with(doc: &Document, host: NodeId, policy: WhitespacePolicy) -> Result<String> {
    ensure_host(doc, host)?;
    let mut out = String::new();
    let mut walker = TreeWalker::new(doc, host);
    while let Some(node) = walker.next_node(doc) {
        match doc.data(node) {
            Some(NodeData::Text(text)) => out.push_str(text),
            Some(NodeData::Element(el)) if el.is_line_break() => out.push('\n'),
            _ => {}
        }
    }
    Ok(normalize_whitespace(&out, policy))
}

/// Stream length of a single node's contribution, counting its subtree.
pub fn node_len(doc: &Document, node: NodeId) -> usize {
    match doc.data(node) {
        Some(NodeData::Text(text)) => utf16_len(text),
        Some(NodeData::Element(el)) if el.internal_marker() == Some(InternalMarker::Remove) => 0,
        Some(NodeData::Element(el)) if el.is_line_break() => 1,
        Some(NodeData::Element(_)) => {
            let mut len = 0;
            let mut walker = TreeWalker::new(doc, node);
            while let Some(id) = walker.next_node(doc) {
                len += unit_len(doc, id);
            }
            len
        }
        None => 0,
    }
}

/// Length a walked node adds by itself, ignoring descendants.
fn unit_len(doc: &Document, node: NodeId) -> usize {
    match doc.data(node) {
        Some(NodeData::Text(text)) => utf16_len(text),
        Some(NodeData::Element(el)) if el.is_line_break() => 1,
        _ => 0,
    }
}

/// Total stream length of `host`.
pub fn text_len(doc: &Document, host: NodeId) -> Result<usize> {
    ensure_host(doc, host)?;
    Ok(node_len(doc, host))
}

/// Stream offset where `node` begins, relative to `host`.
fn offset_before(doc: &Document, host: NodeId, node: NodeId) -> usize {
    let mut offset = 0;
    let mut current = node;
    while current != host {
        let Some(parent) = doc.parent(current) else {
            break;
        };
        for &sibling in doc.children(parent) {
            if sibling == current {
                break;
            }
            offset += node_len(doc, sibling);
        }
        current = parent;
    }
    offset
}

/// Outermost removed-marked ancestor of `node` (inclusive) below `host`.
fn removed_ancestor(doc: &Document, host: NodeId, node: NodeId) -> Option<NodeId> {
    let mut found = None;
    let mut current = node;
    while current != host {
        if doc.internal_marker(current) == Some(InternalMarker::Remove) {
            found = Some(current);
        }
        current = doc.parent(current)?;
    }
    found
}

fn check_point(doc: &Document, host: NodeId, point: BoundaryPoint) -> Result<()> {
    if doc.data(point.node).is_none() {
        return Err(OverlayError::UnknownNode(point.node));
    }
    if !doc.contains(host, point.node) {
        return Err(OverlayError::OutsideHost {
            node: point.node,
            host,
        });
    }
    let len = doc.boundary_len(point.node);
    if point.offset > len {
        return Err(OverlayError::InvalidBoundary {
            node: point.node,
            offset: point.offset,
            len,
        });
    }
    Ok(())
}

/// Stream offset of a boundary point inside `host`.
///
/// Points inside a removed subtree resolve to the position of that subtree.
pub fn offset_of_point(doc: &Document, host: NodeId, point: BoundaryPoint) -> Result<usize> {
    ensure_host(doc, host)?;
    check_point(doc, host, point)?;

    if let Some(removed) = removed_ancestor(doc, host, point.node) {
        return Ok(offset_before(doc, host, removed));
    }

    let base = offset_before(doc, host, point.node);
    let within = match doc.data(point.node) {
        Some(NodeData::Text(text)) => byte_to_utf16(text, utf16_to_byte(text, point.offset)),
        _ => doc.children(point.node)[..point.offset]
            .iter()
            .map(|&child| node_len(doc, child))
            .sum(),
    };

    tracing::trace!(
        target: "weaver::text",
        node = %point.node,
        node_offset = point.offset,
        base,
        within,
        "offset_of_point"
    );
    Ok(base + within)
}

/// Tree location for a stream offset.
///
/// An offset on the seam between two text nodes resolves to the end of the
/// earlier one. Offsets at a line break resolve to the element position just
/// before it. Empty hosts resolve to `(host, 0)`.
pub fn point_at_offset(doc: &Document, host: NodeId, offset: usize) -> Result<BoundaryPoint> {
    ensure_host(doc, host)?;

    let mut accumulated = 0;
    let mut last: Option<BoundaryPoint> = None;
    let mut walker = TreeWalker::new(doc, host);

    while let Some(node) = walker.next_node(doc) {
        match doc.data(node) {
            Some(NodeData::Text(text)) => {
                let len = utf16_len(text);
                if accumulated + len >= offset {
                    return Ok(BoundaryPoint::new(node, offset - accumulated));
                }
                accumulated += len;
                last = Some(BoundaryPoint::new(node, len));
            }
            Some(NodeData::Element(el)) if el.is_line_break() => {
                let (Some(parent), Some(index)) = (doc.parent(node), doc.index_in_parent(node))
                else {
                    continue;
                };
                if accumulated == offset {
                    return Ok(BoundaryPoint::new(parent, index));
                }
                accumulated += 1;
                last = Some(BoundaryPoint::new(parent, index + 1));
            }
            _ => {}
        }
    }

    if offset == accumulated {
        return Ok(last.unwrap_or(BoundaryPoint::new(host, 0)));
    }
    Err(OverlayError::OffsetOutOfRange {
        offset,
        len: accumulated,
    })
}
