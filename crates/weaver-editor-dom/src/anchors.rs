//! Keeping a selection alive across tree mutations.
//!
//! Node identity does not survive splits, wraps and unwraps, so a boundary
//! point is materialized as a real node: an anchor `span` carrying a unique
//! id, the remove marker and a single [`ANCHOR_SENTINEL`]. Tree edits carry
//! the anchor along like any other node. Traversal and extraction skip it.
//!
//! ```text
//! save:     he|llo wo|rld  ->  he<a/>llo wo<a/>rld
//! mutate:   h<mark>e</mark><a/><mark>llo</mark> wo<a/>rld
//! restore:  anchors removed, boundary points placed where they stood
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use smol_str::{SmolStr, format_smolstr};

use crate::config::OverlayConfig;
use crate::dom::{Document, ElementData, NodeId};
use crate::error::{OverlayError, Result};
use crate::text::{ensure_host, offset_of_point};
use crate::types::{ANCHOR_SENTINEL, BoundaryPair, BoundaryPoint, INTERNAL_ATTR, InternalMarker};

static NEXT_ANCHOR: AtomicU64 = AtomicU64::new(0);

/// Handle for one save/restore cycle.
///
/// Not `Clone`: restoring consumes it, so a token cannot be restored twice.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "anchors stay in the tree until the token is restored or discarded"]
pub struct SelectionToken {
    start: SmolStr,
    end: Option<SmolStr>,
}

impl SelectionToken {
    pub fn is_collapsed(&self) -> bool {
        self.end.is_none()
    }

    /// Anchor id of the start (or only) boundary.
    pub fn id(&self) -> &str {
        &self.start
    }
}

/// Saves and restores boundary pairs through anchor nodes.
#[derive(Debug, Clone, Default)]
pub struct SelectionKeeper {
    outstanding: HashSet<SmolStr>,
    config: OverlayConfig,
}

impl SelectionKeeper {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            outstanding: HashSet::new(),
            config: config.clone(),
        }
    }

    /// Number of saved selections not yet restored or discarded.
    pub fn pending(&self) -> usize {
        self.outstanding.len()
    }

    fn is_inline(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node)
            .is_some_and(|tag| self.config.is_inline_formatting(tag))
    }

    /// Insert anchors for `pair` and return the token that finds them again.
    pub fn save(
        &mut self,
        doc: &mut Document,
        host: NodeId,
        pair: BoundaryPair,
    ) -> Result<SelectionToken> {
        ensure_host(doc, host)?;
        let start_offset = offset_of_point(doc, host, pair.start)?;
        let end_offset = offset_of_point(doc, host, pair.end)?;
        if start_offset > end_offset {
            return Err(OverlayError::ReversedPair {
                start: start_offset,
                end: end_offset,
            });
        }

        let token = if pair.is_collapsed() {
            let start = self.insert_anchor(doc, host, pair.start)?;
            SelectionToken { start, end: None }
        } else {
            // End first: inserting there never moves the start point.
            let end = self.insert_anchor(doc, host, pair.end)?;
            let start = self.insert_anchor(doc, host, pair.start)?;
            SelectionToken {
                start,
                end: Some(end),
            }
        };

        self.outstanding.insert(token.start.clone());
        tracing::debug!(
            target: "weaver::anchors",
            %host,
            id = %token.start,
            start_offset,
            end_offset,
            "saved selection"
        );
        Ok(token)
    }

    /// Remove the token's anchors and return the boundary pair they marked.
    ///
    /// A missing anchor yields [`OverlayError::AnchorMissing`]; any anchor that
    /// is still present is removed anyway.
    pub fn restore(
        &mut self,
        doc: &mut Document,
        host: NodeId,
        token: SelectionToken,
    ) -> Result<BoundaryPair> {
        ensure_host(doc, host)?;
        self.consume(&token)?;

        let SelectionToken { start, end } = token;
        let pair = match end {
            None => restore_collapsed(doc, host, &start)?,
            Some(end) => restore_range(doc, host, &start, &end)?,
        };

        tracing::debug!(
            target: "weaver::anchors",
            %host,
            id = %start,
            start = %pair.start.node,
            start_offset = pair.start.offset,
            end = %pair.end.node,
            end_offset = pair.end.offset,
            "restored selection"
        );
        Ok(pair)
    }

    /// Drop the token's anchors without computing a selection.
    pub fn discard(&mut self, doc: &mut Document, host: NodeId, token: SelectionToken) -> Result<()> {
        ensure_host(doc, host)?;
        self.consume(&token)?;
        for id in std::iter::once(&token.start).chain(token.end.as_ref()) {
            if let Some(anchor) = find_anchor(doc, host, id) {
                let parent = doc.parent(anchor);
                doc.detach(anchor)?;
                if let Some(parent) = parent {
                    doc.normalize(parent);
                }
            }
        }
        Ok(())
    }

    fn consume(&mut self, token: &SelectionToken) -> Result<()> {
        if !self.outstanding.remove(&token.start) {
            return Err(OverlayError::UnknownToken(token.start.clone()));
        }
        Ok(())
    }

    /// Move a point sitting exactly on the edge of an inline formatting
    /// element to just outside it, so the anchor does not split the element.
    fn relocate(&self, doc: &Document, host: NodeId, mut point: BoundaryPoint) -> BoundaryPoint {
        loop {
            let (container, at_start, at_end) = if doc.is_text(point.node) {
                let Some(parent) = doc.parent(point.node) else {
                    return point;
                };
                (
                    parent,
                    point.offset == 0 && doc.previous_sibling(point.node).is_none(),
                    point.offset == doc.text_len(point.node)
                        && doc.next_sibling(point.node).is_none(),
                )
            } else {
                (
                    point.node,
                    point.offset == 0,
                    point.offset == doc.child_count(point.node),
                )
            };

            if container == host || !self.is_inline(doc, container) || !(at_start || at_end) {
                return point;
            }
            let (Some(outer), Some(index)) = (doc.parent(container), doc.index_in_parent(container))
            else {
                return point;
            };
            let moved = BoundaryPoint::new(outer, if at_start { index } else { index + 1 });
            tracing::trace!(
                target: "weaver::anchors",
                from = %point.node,
                to = %outer,
                offset = moved.offset,
                "moved anchor out of inline element"
            );
            point = moved;
        }
    }

    fn insert_anchor(
        &self,
        doc: &mut Document,
        host: NodeId,
        point: BoundaryPoint,
    ) -> Result<SmolStr> {
        let point = self.relocate(doc, host, point);
        let id = format_smolstr!("weaver-anchor-{}", NEXT_ANCHOR.fetch_add(1, Ordering::Relaxed));

        let anchor = doc.create_element(
            ElementData::new("span")
                .with_attr("id", id.clone())
                .with_attr(INTERNAL_ATTR, InternalMarker::Remove.as_str()),
        );
        let sentinel = doc.create_text(ANCHOR_SENTINEL.to_string());
        doc.append_child(anchor, sentinel)?;

        if doc.is_text(point.node) {
            let parent = doc
                .parent(point.node)
                .ok_or(OverlayError::OutsideHost {
                    node: point.node,
                    host,
                })?;
            let len = doc.text_len(point.node);
            let reference = if point.offset == 0 {
                Some(point.node)
            } else if point.offset >= len {
                doc.next_sibling(point.node)
            } else {
                Some(doc.split_text(point.node, point.offset)?)
            };
            doc.insert_before(parent, anchor, reference)?;
        } else {
            let reference = doc.children(point.node).get(point.offset).copied();
            doc.insert_before(point.node, anchor, reference)?;
        }
        Ok(id)
    }
}

fn find_anchor(doc: &Document, host: NodeId, id: &str) -> Option<NodeId> {
    doc.find_by_attr(host, "id", id)
        .into_iter()
        .find(|&node| doc.internal_marker(node) == Some(InternalMarker::Remove))
}

/// Detach `anchor` and return the position it occupied.
/// The point just before `anchor` in its parent.
fn anchor_point(doc: &Document, anchor: NodeId) -> Result<BoundaryPoint> {
    let parent = doc
        .parent(anchor)
        .ok_or(OverlayError::UnknownNode(anchor))?;
    let index = doc
        .index_in_parent(anchor)
        .ok_or(OverlayError::UnknownNode(anchor))?;
    Ok(BoundaryPoint::new(parent, index))
}

fn take_anchor(doc: &mut Document, anchor: NodeId) -> Result<BoundaryPoint> {
    let point = anchor_point(doc, anchor)?;
    doc.detach(anchor)?;
    Ok(point)
}

fn restore_collapsed(doc: &mut Document, host: NodeId, id: &SmolStr) -> Result<BoundaryPair> {
    let anchor = find_anchor(doc, host, id).ok_or_else(|| {
        tracing::warn!(target: "weaver::anchors", %host, %id, "selection anchor missing");
        OverlayError::AnchorMissing(id.clone())
    })?;

    let preceding_text = doc
        .previous_sibling(anchor)
        .filter(|&sibling| doc.is_text(sibling));
    let before = take_anchor(doc, anchor)?;
    let point = match preceding_text {
        Some(text) => BoundaryPoint::new(text, doc.text_len(text)),
        None => before,
    };

    let mut points = [point];
    doc.normalize_tracking(before.node, &mut points);
    Ok(BoundaryPair::collapsed(points[0]))
}

fn restore_range(
    doc: &mut Document,
    host: NodeId,
    start_id: &SmolStr,
    end_id: &SmolStr,
) -> Result<BoundaryPair> {
    let start_anchor = find_anchor(doc, host, start_id);
    let end_anchor = find_anchor(doc, host, end_id);

    let (Some(start_anchor), Some(end_anchor)) = (start_anchor, end_anchor) else {
        let missing = if start_anchor.is_none() {
            start_id
        } else {
            end_id
        };
        tracing::warn!(target: "weaver::anchors", %host, id = %missing, "selection anchor missing");
        for anchor in [start_anchor, end_anchor].into_iter().flatten() {
            let point = take_anchor(doc, anchor)?;
            doc.normalize(point.node);
        }
        return Err(OverlayError::AnchorMissing(missing.clone()));
    };

    let mut start = anchor_point(doc, start_anchor)?;
    let mut end = anchor_point(doc, end_anchor)?;
    doc.detach(start_anchor)?;
    doc.detach(end_anchor)?;
    // Whichever anchor came later in a shared parent counted the other one.
    if start.node == end.node {
        if start.offset < end.offset {
            end.offset -= 1;
        } else {
            start.offset -= 1;
        }
    }

    let mut points = [start, end];
    doc.normalize_tracking(start.node, &mut points);
    if end.node != start.node {
        doc.normalize_tracking(end.node, &mut points);
    }
    let [mut start, mut end] = points;

    // External edits may have moved the anchors past each other.
    let reversed = match (
        offset_of_point(doc, host, start),
        offset_of_point(doc, host, end),
    ) {
        (Ok(s), Ok(e)) => s > e,
        _ => false,
    };
    if reversed {
        std::mem::swap(&mut start, &mut end);
    }
    Ok(BoundaryPair::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementData;
    use crate::matches::Match;
    use crate::overlay::apply_matches;
    use crate::text::{extract_text, point_at_offset};

    fn host_with(doc: &mut Document, text: &str) -> (NodeId, NodeId) {
        let host = doc.element("div");
        let node = doc.create_text(text);
        doc.append_child(host, node).unwrap();
        (host, node)
    }

    fn keeper() -> SelectionKeeper {
        SelectionKeeper::new(&OverlayConfig::default())
    }

    fn offsets(doc: &Document, host: NodeId, pair: BoundaryPair) -> (usize, usize) {
        (
            offset_of_point(doc, host, pair.start).unwrap(),
            offset_of_point(doc, host, pair.end).unwrap(),
        )
    }

    fn anchors_left(doc: &Document, host: NodeId) -> usize {
        doc.find_by_attr(host, INTERNAL_ATTR, InternalMarker::Remove.as_str())
            .len()
    }

    #[test]
    fn test_range_round_trip() {
        let mut doc = Document::new();
        let (host, text) = host_with(&mut doc, "hello world");
        let mut keeper = keeper();

        let pair = BoundaryPair::new(BoundaryPoint::new(text, 2), BoundaryPoint::new(text, 8));
        let token = keeper.save(&mut doc, host, pair).unwrap();
        assert_eq!(extract_text(&doc, host).unwrap(), "hello world");
        assert_eq!(anchors_left(&doc, host), 2);

        let restored = keeper.restore(&mut doc, host, token).unwrap();
        assert_eq!(offsets(&doc, host, restored), (2, 8));
        assert_eq!(anchors_left(&doc, host), 0);
        assert_eq!(doc.child_count(host), 1);
        assert_eq!(keeper.pending(), 0);
    }

    #[test]
    fn test_round_trip_across_highlight_split() {
        let mut doc = Document::new();
        let (host, text) = host_with(&mut doc, "hello world");
        let mut keeper = keeper();

        let pair = BoundaryPair::new(BoundaryPoint::new(text, 2), BoundaryPoint::new(text, 8));
        let token = keeper.save(&mut doc, host, pair).unwrap();

        let m = Match::new(1..5, "h", "search", ElementData::new("mark"));
        apply_matches(&mut doc, host, &[m]).unwrap();

        let restored = keeper.restore(&mut doc, host, token).unwrap();
        assert_eq!(offsets(&doc, host, restored), (2, 8));
        assert_eq!(extract_text(&doc, host).unwrap(), "hello world");
    }

    #[test]
    fn test_collapsed_prefers_preceding_text_end() {
        let mut doc = Document::new();
        let (host, text) = host_with(&mut doc, "abc");
        let mut keeper = keeper();

        let token = keeper
            .save(&mut doc, host, BoundaryPair::collapsed(BoundaryPoint::new(text, 2)))
            .unwrap();
        assert!(token.is_collapsed());

        let restored = keeper.restore(&mut doc, host, token).unwrap();
        assert!(restored.is_collapsed());
        assert_eq!(restored.start, BoundaryPoint::new(text, 2));
        assert_eq!(doc.text(text), Some("abc"));
    }

    #[test]
    fn test_collapsed_survives_external_delete() {
        let mut doc = Document::new();
        let (host, text) = host_with(&mut doc, "abc");
        let mut keeper = keeper();

        let token = keeper
            .save(&mut doc, host, BoundaryPair::collapsed(BoundaryPoint::new(text, 2)))
            .unwrap();
        // "ab" lives in `text` now; delete its first character.
        doc.set_text(text, "b").unwrap();

        let restored = keeper.restore(&mut doc, host, token).unwrap();
        let point = restored.start;
        assert!(point.offset <= doc.boundary_len(point.node));
        assert_eq!(extract_text(&doc, host).unwrap(), "bc");
        assert_eq!(offset_of_point(&doc, host, point).unwrap(), 1);
    }

    #[test]
    fn test_inline_edge_relocation() {
        let mut doc = Document::new();
        let host = doc.element("p");
        let bold = doc.element("b");
        let inner = doc.create_text("bold");
        let rest = doc.create_text(" text");
        doc.append_child(host, bold).unwrap();
        doc.append_child(bold, inner).unwrap();
        doc.append_child(host, rest).unwrap();
        let mut keeper = keeper();

        let token = keeper
            .save(&mut doc, host, BoundaryPair::collapsed(BoundaryPoint::new(inner, 4)))
            .unwrap();
        assert_eq!(doc.child_count(bold), 1);
        assert_eq!(doc.child_count(host), 3);

        let restored = keeper.restore(&mut doc, host, token).unwrap();
        assert_eq!(restored.start, BoundaryPoint::new(host, 1));
        assert_eq!(offset_of_point(&doc, host, restored.start).unwrap(), 4);
    }

    #[test]
    fn test_range_inside_inline_element_is_not_moved() {
        let mut doc = Document::new();
        let host = doc.element("p");
        let bold = doc.element("b");
        let inner = doc.create_text("bold");
        doc.append_child(host, bold).unwrap();
        doc.append_child(bold, inner).unwrap();
        let mut keeper = keeper();

        let pair = BoundaryPair::new(BoundaryPoint::new(inner, 1), BoundaryPoint::new(inner, 3));
        let token = keeper.save(&mut doc, host, pair).unwrap();
        assert_eq!(doc.child_count(host), 1);

        let restored = keeper.restore(&mut doc, host, token).unwrap();
        assert_eq!(offsets(&doc, host, restored), (1, 3));
        assert_eq!(doc.children(bold), &[inner]);
    }

    #[test]
    fn test_inline_tags_come_from_config() {
        let mut doc = Document::new();
        let host = doc.element("p");
        let bold = doc.element("b");
        let inner = doc.create_text("bold");
        doc.append_child(host, bold).unwrap();
        doc.append_child(bold, inner).unwrap();
        let config = OverlayConfig {
            inline_formatting_tags: vec![SmolStr::new("mark")],
            ..OverlayConfig::default()
        };
        let mut keeper = SelectionKeeper::new(&config);

        let token = keeper
            .save(&mut doc, host, BoundaryPair::collapsed(BoundaryPoint::new(inner, 4)))
            .unwrap();
        assert_eq!(doc.child_count(bold), 2);
        assert_eq!(doc.child_count(host), 1);

        let restored = keeper.restore(&mut doc, host, token).unwrap();
        assert_eq!(restored.start, BoundaryPoint::new(inner, 4));
    }

    #[test]
    fn test_anchors_swapped_by_external_edit() {
        let mut doc = Document::new();
        let (host, text) = host_with(&mut doc, "abcdef");
        let mut keeper = keeper();

        let pair = BoundaryPair::new(BoundaryPoint::new(text, 1), BoundaryPoint::new(text, 4));
        let token = keeper.save(&mut doc, host, pair).unwrap();
        let start_anchor = find_anchor(&doc, host, token.id()).unwrap();
        let end_anchor = doc
            .find_by_attr(host, INTERNAL_ATTR, InternalMarker::Remove.as_str())
            .into_iter()
            .find(|&anchor| anchor != start_anchor)
            .unwrap();

        // Move the end anchor in front of the start anchor: "a" end start "bcd" "ef".
        doc.insert_before(host, end_anchor, Some(start_anchor)).unwrap();

        let restored = keeper.restore(&mut doc, host, token).unwrap();
        assert_eq!(offsets(&doc, host, restored), (1, 1));
        assert_eq!(anchors_left(&doc, host), 0);
        assert_eq!(extract_text(&doc, host).unwrap(), "abcdef");
    }

    #[test]
    fn test_missing_anchor_is_recoverable() {
        let mut doc = Document::new();
        let (host, text) = host_with(&mut doc, "hello world");
        let mut keeper = keeper();

        let pair = BoundaryPair::new(BoundaryPoint::new(text, 0), BoundaryPoint::new(text, 5));
        let token = keeper.save(&mut doc, host, pair).unwrap();
        let start_anchor = find_anchor(&doc, host, token.id()).unwrap();
        doc.detach(start_anchor).unwrap();

        let err = keeper.restore(&mut doc, host, token).unwrap_err();
        assert!(matches!(err, OverlayError::AnchorMissing(_)));
        assert!(err.is_recoverable());
        assert_eq!(anchors_left(&doc, host), 0);
        assert_eq!(extract_text(&doc, host).unwrap(), "hello world");
    }

    #[test]
    fn test_foreign_token_rejected() {
        let mut doc = Document::new();
        let (host, text) = host_with(&mut doc, "abc");
        let mut saver = keeper();
        let mut other = keeper();

        let token = saver
            .save(&mut doc, host, BoundaryPair::collapsed(BoundaryPoint::new(text, 1)))
            .unwrap();
        let err = other.restore(&mut doc, host, token).unwrap_err();
        assert!(matches!(err, OverlayError::UnknownToken(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_reversed_pair_rejected() {
        let mut doc = Document::new();
        let (host, text) = host_with(&mut doc, "abc");
        let mut keeper = keeper();
        let pair = BoundaryPair::new(BoundaryPoint::new(text, 3), BoundaryPoint::new(text, 1));
        assert!(matches!(
            keeper.save(&mut doc, host, pair),
            Err(OverlayError::ReversedPair { start: 3, end: 1 })
        ));
        assert_eq!(anchors_left(&doc, host), 0);
    }

    #[test]
    fn test_discard_cleans_up() {
        let mut doc = Document::new();
        let (host, _) = host_with(&mut doc, "abcdef");
        let mut keeper = keeper();
        let start = point_at_offset(&doc, host, 1).unwrap();
        let end = point_at_offset(&doc, host, 4).unwrap();

        let token = keeper.save(&mut doc, host, BoundaryPair::new(start, end)).unwrap();
        keeper.discard(&mut doc, host, token).unwrap();
        assert_eq!(anchors_left(&doc, host), 0);
        assert_eq!(doc.child_count(host), 1);
        assert_eq!(keeper.pending(), 0);
    }
}
