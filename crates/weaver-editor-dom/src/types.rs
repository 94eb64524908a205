//! Core editing-tree types: boundary points, boundary pairs, caret geometry
//! and the attribute conventions shared with the surrounding editor.
//!
//! The attribute names and marker values are an interop contract with the
//! clipboard, formatting and spellcheck layers. They are constants on purpose.

use crate::dom::NodeId;

/// Attribute marking a node as editor-internal.
///
/// The value is one of the [`InternalMarker`] strings.
pub const INTERNAL_ATTR: &str = "data-weaver-internal";

/// Attribute carrying the id of the highlight a wrapper belongs to.
pub const HIGHLIGHT_ID_ATTR: &str = "data-highlight-id";

/// Attribute carrying the highlight type ("kind") used to scope searches and clears.
pub const HIGHLIGHT_TYPE_ATTR: &str = "data-highlight-type";

/// Reserved character stored inside selection anchors. Never appears in real content.
pub const ANCHOR_SENTINEL: char = '\u{FEFF}';

/// How an internal node is treated by traversal and content extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InternalMarker {
    /// Dropped on extraction and skipped entirely by traversal (anchors).
    Remove,
    /// Kept while editing, unwrapped when extracting final content.
    Unwrap,
    /// UI-only decoration (highlights). Always unwrapped on extraction.
    Ui,
}

impl InternalMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            InternalMarker::Remove => "remove",
            InternalMarker::Unwrap => "unwrap",
            InternalMarker::Ui => "ui",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "remove" => Some(InternalMarker::Remove),
            "unwrap" => Some(InternalMarker::Unwrap),
            "ui" => Some(InternalMarker::Ui),
            _ => None,
        }
    }
}

/// A location in the tree.
///
/// For a text node `offset` is a UTF-16 index into its content (`0..=len`).
/// For an element it is a child index (`0..=child_count`): the position
/// between children `offset - 1` and `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundaryPoint {
    pub node: NodeId,
    pub offset: usize,
}

impl BoundaryPoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Two boundary points in document order.
///
/// Collapsed pairs are cursors, anything else is a selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryPair {
    pub start: BoundaryPoint,
    pub end: BoundaryPoint,
}

impl BoundaryPair {
    /// Create a new pair. Callers are responsible for document order.
    pub fn new(start: BoundaryPoint, end: BoundaryPoint) -> Self {
        Self { start, end }
    }

    /// Create a collapsed pair (cursor position).
    pub fn collapsed(point: BoundaryPoint) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    /// Check if the pair is collapsed (cursor only).
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Rendered box of a zero-width caret.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaretRect {
    pub x: f64,
    pub y: f64,
    pub height: f64,
}

impl CaretRect {
    pub fn new(x: f64, y: f64, height: f64) -> Self {
        Self { x, y, height }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn test_marker_round_trip() {
        for marker in [
            InternalMarker::Remove,
            InternalMarker::Unwrap,
            InternalMarker::Ui,
        ] {
            assert_eq!(InternalMarker::parse(marker.as_str()), Some(marker));
        }
        assert_eq!(InternalMarker::parse("REMOVE"), None);
        assert_eq!(InternalMarker::parse(""), None);
    }

    #[test]
    fn test_pair_collapsed() {
        let mut doc = Document::new();
        let text = doc.create_text("hello");

        let cursor = BoundaryPair::collapsed(BoundaryPoint::new(text, 2));
        assert!(cursor.is_collapsed());

        let selection = BoundaryPair::new(BoundaryPoint::new(text, 1), BoundaryPoint::new(text, 4));
        assert!(!selection.is_collapsed());
    }

    #[test]
    fn test_caret_rect_edges() {
        let rect = CaretRect::new(12.0, 40.0, 18.0);
        assert_eq!(rect.left(), 12.0);
        assert_eq!(rect.top(), 40.0);
        assert_eq!(rect.bottom(), 58.0);
    }
}
