//! Wrapping canonical-stream spans in decoration elements, and undoing it.
//!
//! The overlay is a single forward walk. Each text node that overlaps the
//! current match is split at the match's cut points and the middle piece is
//! moved into a clone of the match's decoration. The walker then re-enters
//! after the clone, so the tail piece is visited next with the right offset.
//!
//! A match spanning several text runs gets one wrapper per run. Applying a
//! match inside an existing wrapper nests the new wrapper inside it, which is
//! how independently addressable highlights stack.

use crate::dom::{Document, ElementData, NodeData, NodeId};
use crate::error::{OverlayError, Result};
use crate::matches::Match;
use crate::text::{ensure_host, text_len, utf16_len};
use crate::types::{HIGHLIGHT_ID_ATTR, HIGHLIGHT_TYPE_ATTR, INTERNAL_ATTR, InternalMarker};
use crate::walker::TreeWalker;

/// Decoration element for one text run of `m`.
fn wrapper_for(m: &Match) -> ElementData {
    let mut data = m.decoration.clone();
    data.set_attr(HIGHLIGHT_ID_ATTR, m.id.clone());
    data.set_attr(HIGHLIGHT_TYPE_ATTR, m.kind.clone());
    data.set_attr(INTERNAL_ATTR, InternalMarker::Ui.as_str());
    if let Some(title) = &m.title {
        data.set_attr("title", title.clone());
    }
    data
}

fn validate(matches: &[Match], len: usize) -> Result<()> {
    let mut last_end = 0;
    for m in matches {
        if m.is_empty() || m.start < last_end {
            return Err(OverlayError::UnorderedMatch {
                id: m.id.clone(),
                start: m.start,
                end: m.end,
            });
        }
        if m.end > len {
            return Err(OverlayError::OffsetOutOfRange { offset: m.end, len });
        }
        last_end = m.end;
    }
    Ok(())
}

/// Wrap every span in `matches` inside `host`. Returns the number of wrappers created.
///
/// `matches` must be sorted, non-empty and mutually non-overlapping, with
/// every end inside the host's text. All of that is checked before the tree
/// is touched. Adjacent text nodes are merged first.
pub fn apply_matches(doc: &mut Document, host: NodeId, matches: &[Match]) -> Result<usize> {
    ensure_host(doc, host)?;
    let len = text_len(doc, host)?;
    validate(matches, len)?;
    if matches.is_empty() {
        return Ok(0);
    }

    doc.normalize(host);

    let mut walker = TreeWalker::new(doc, host);
    let mut offset = 0;
    let mut current = 0;
    let mut wrappers = 0;

    while let Some(node) = walker.next_node(doc) {
        while matches.get(current).is_some_and(|m| m.end <= offset) {
            current += 1;
        }
        let Some(m) = matches.get(current) else {
            break;
        };

        let node_len = match doc.data(node) {
            Some(NodeData::Text(text)) => utf16_len(text),
            Some(NodeData::Element(el)) if el.is_line_break() => {
                offset += 1;
                continue;
            }
            _ => continue,
        };

        let node_start = offset;
        let node_end = offset + node_len;
        if node_len == 0 || m.start >= node_end {
            offset = node_end;
            continue;
        }

        let from = m.start.saturating_sub(node_start);
        let to = m.end.min(node_end) - node_start;

        if to < node_len {
            doc.split_text(node, to)?;
        }
        let target = if from > 0 {
            doc.split_text(node, from)?
        } else {
            node
        };

        let wrapper = doc.create_element(wrapper_for(m));
        doc.wrap(target, wrapper)?;
        walker.reenter(doc, wrapper);
        wrappers += 1;

        tracing::trace!(
            target: "weaver::overlay",
            id = %m.id,
            node = %target,
            from = node_start + from,
            to = node_start + to,
            "wrapped run"
        );
        offset = node_start + to;
    }

    tracing::debug!(
        target: "weaver::overlay",
        %host,
        matches = matches.len(),
        wrappers,
        "applied matches"
    );
    Ok(wrappers)
}

/// Whether `start..end` overlaps any text run, i.e. whether applying it would
/// create at least one wrapper. Line breaks alone do not count.
pub fn covers_text(doc: &Document, host: NodeId, start: usize, end: usize) -> Result<bool> {
    ensure_host(doc, host)?;
    let mut walker = TreeWalker::new(doc, host);
    let mut offset = 0;
    while let Some(node) = walker.next_node(doc) {
        if offset >= end {
            break;
        }
        match doc.data(node) {
            Some(NodeData::Text(text)) => {
                let node_end = offset + utf16_len(text);
                if node_end > offset && start < node_end && offset < end {
                    return Ok(true);
                }
                offset = node_end;
            }
            Some(NodeData::Element(el)) if el.is_line_break() => offset += 1,
            _ => {}
        }
    }
    Ok(false)
}

/// Wrapper elements of highlight `id` under `host`, optionally limited to one kind.
pub fn highlight_wrappers(
    doc: &Document,
    host: NodeId,
    id: &str,
    kind: Option<&str>,
) -> Vec<NodeId> {
    doc.find_by_attr(host, HIGHLIGHT_ID_ATTR, id)
        .into_iter()
        .filter(|&node| doc.internal_marker(node) == Some(InternalMarker::Ui))
        .filter(|&node| kind.is_none_or(|k| doc.attr(node, HIGHLIGHT_TYPE_ATTR) == Some(k)))
        .collect()
}

/// Unwrap every wrapper of highlight `id` and merge the freed text back together.
///
/// Returns the number of wrappers removed.
pub fn remove_highlight(
    doc: &mut Document,
    host: NodeId,
    id: &str,
    kind: Option<&str>,
) -> Result<usize> {
    ensure_host(doc, host)?;
    let wrappers = highlight_wrappers(doc, host, id, kind);
    for &wrapper in &wrappers {
        doc.replace_with_children(wrapper)?;
    }
    if !wrappers.is_empty() {
        doc.normalize(host);
    }
    tracing::debug!(target: "weaver::overlay", %host, id, removed = wrappers.len(), "removed highlight");
    Ok(wrappers.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::inner_html;
    use crate::text::extract_text;
    use insta::assert_snapshot;

    fn host_with(doc: &mut Document, text: &str) -> NodeId {
        let host = doc.element("div");
        let node = doc.create_text(text);
        doc.append_child(host, node).unwrap();
        host
    }

    fn mark(start: usize, end: usize, id: &str) -> Match {
        Match::new(start..end, id, "search", ElementData::new("mark"))
    }

    #[test]
    fn test_adjacent_single_characters() {
        let mut doc = Document::new();
        let host = host_with(&mut doc, "People Make The World");

        for (i, id) in ["h0", "h1", "h2", "h3"].into_iter().enumerate() {
            let created = apply_matches(&mut doc, host, &[mark(i, i + 1, id)]).unwrap();
            assert_eq!(created, 1);
        }

        assert_eq!(doc.child_count(host), 5);
        assert_snapshot!(
            inner_html(&doc, host).unwrap(),
            @r#"<mark data-highlight-id="h0" data-highlight-type="search" data-weaver-internal="ui">P</mark><mark data-highlight-id="h1" data-highlight-type="search" data-weaver-internal="ui">e</mark><mark data-highlight-id="h2" data-highlight-type="search" data-weaver-internal="ui">o</mark><mark data-highlight-id="h3" data-highlight-type="search" data-weaver-internal="ui">p</mark>le Make The World"#
        );
    }

    #[test]
    fn test_nested_inside_existing_wrapper() {
        let mut doc = Document::new();
        let host = host_with(&mut doc, "People");
        apply_matches(&mut doc, host, &[mark(0, 6, "A")]).unwrap();
        apply_matches(&mut doc, host, &[mark(2, 6, "B")]).unwrap();

        let outer = highlight_wrappers(&doc, host, "A", None);
        let inner = highlight_wrappers(&doc, host, "B", None);
        assert_eq!(outer.len(), 1);
        assert_eq!(inner.len(), 1);
        assert_eq!(doc.parent(inner[0]), Some(outer[0]));
        assert_eq!(extract_text(&doc, host).unwrap(), "People");
    }

    #[test]
    fn test_match_crossing_wrapper_edge() {
        let mut doc = Document::new();
        let host = host_with(&mut doc, "abcdef");
        apply_matches(&mut doc, host, &[mark(0, 3, "A")]).unwrap();
        let created = apply_matches(&mut doc, host, &[mark(2, 5, "B")]).unwrap();

        assert_eq!(created, 2);
        assert_snapshot!(
            inner_html(&doc, host).unwrap(),
            @r#"<mark data-highlight-id="A" data-highlight-type="search" data-weaver-internal="ui">ab<mark data-highlight-id="B" data-highlight-type="search" data-weaver-internal="ui">c</mark></mark><mark data-highlight-id="B" data-highlight-type="search" data-weaver-internal="ui">de</mark>f"#
        );
    }

    #[test]
    fn test_line_breaks_advance_but_never_wrap() {
        let mut doc = Document::new();
        let host = doc.element("div");
        let ab = doc.create_text("ab");
        let br = doc.element("br");
        let cd = doc.create_text("cd");
        doc.append_child(host, ab).unwrap();
        doc.append_child(host, br).unwrap();
        doc.append_child(host, cd).unwrap();

        let created = apply_matches(&mut doc, host, &[mark(1, 4, "x")]).unwrap();
        assert_eq!(created, 2);
        assert_eq!(doc.parent(br), Some(host));
        assert_snapshot!(
            inner_html(&doc, host).unwrap(),
            @r#"a<mark data-highlight-id="x" data-highlight-type="search" data-weaver-internal="ui">b</mark><br><mark data-highlight-id="x" data-highlight-type="search" data-weaver-internal="ui">c</mark>d"#
        );
    }

    #[test]
    fn test_covers_text_ignores_bare_line_breaks() {
        let mut doc = Document::new();
        let host = doc.element("div");
        let a = doc.create_text("a");
        let br = doc.element("br");
        let b = doc.create_text("b");
        for node in [a, br, b] {
            doc.append_child(host, node).unwrap();
        }

        assert!(!covers_text(&doc, host, 1, 2).unwrap());
        assert!(covers_text(&doc, host, 1, 3).unwrap());
        assert!(covers_text(&doc, host, 0, 2).unwrap());
        assert_eq!(apply_matches(&mut doc, host, &[mark(1, 2, "x")]).unwrap(), 0);
    }

    #[test]
    fn test_several_matches_in_one_pass() {
        let mut doc = Document::new();
        let host = host_with(&mut doc, "one two three");
        let created =
            apply_matches(&mut doc, host, &[mark(0, 3, "a"), mark(4, 7, "b"), mark(8, 13, "c")])
                .unwrap();
        assert_eq!(created, 3);
        for (id, text) in [("a", "one"), ("b", "two"), ("c", "three")] {
            let wrappers = highlight_wrappers(&doc, host, id, Some("search"));
            assert_eq!(wrappers.len(), 1);
            let run = doc.children(wrappers[0])[0];
            assert_eq!(doc.text(run), Some(text));
        }
    }

    #[test]
    fn test_title_attribute() {
        let mut doc = Document::new();
        let host = host_with(&mut doc, "teh cat");
        let m = mark(0, 3, "typo").with_title("the");
        apply_matches(&mut doc, host, &[m]).unwrap();
        let wrapper = highlight_wrappers(&doc, host, "typo", None)[0];
        assert_eq!(doc.attr(wrapper, "title"), Some("the"));
    }

    #[test]
    fn test_invalid_matches_leave_tree_untouched() {
        let mut doc = Document::new();
        let host = host_with(&mut doc, "abcdef");
        let before = inner_html(&doc, host).unwrap();

        let unsorted = apply_matches(&mut doc, host, &[mark(3, 4, "a"), mark(0, 1, "b")]);
        assert!(matches!(unsorted, Err(OverlayError::UnorderedMatch { .. })));

        let overlapping = apply_matches(&mut doc, host, &[mark(0, 3, "a"), mark(2, 4, "b")]);
        assert!(matches!(overlapping, Err(OverlayError::UnorderedMatch { .. })));

        let past_end = apply_matches(&mut doc, host, &[mark(0, 1, "a"), mark(4, 9, "b")]);
        assert!(matches!(
            past_end,
            Err(OverlayError::OffsetOutOfRange { offset: 9, len: 6 })
        ));

        assert_eq!(inner_html(&doc, host).unwrap(), before);
    }

    #[test]
    fn test_remove_restores_text_nodes() {
        let mut doc = Document::new();
        let host = host_with(&mut doc, "People Make The World");
        let before = extract_text(&doc, host).unwrap();

        apply_matches(&mut doc, host, &[mark(0, 6, "p"), mark(12, 15, "t")]).unwrap();
        apply_matches(&mut doc, host, &[mark(2, 4, "nested")]).unwrap();

        assert_eq!(remove_highlight(&mut doc, host, "nested", None).unwrap(), 1);
        assert_eq!(remove_highlight(&mut doc, host, "p", Some("search")).unwrap(), 1);
        assert_eq!(remove_highlight(&mut doc, host, "t", Some("other")).unwrap(), 0);
        assert_eq!(remove_highlight(&mut doc, host, "t", None).unwrap(), 1);

        assert_eq!(extract_text(&doc, host).unwrap(), before);
        assert_eq!(doc.child_count(host), 1);
    }
}
