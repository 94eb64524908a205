//! HTML serialization of the editing tree.
//!
//! [`extract_html`] produces saved content: internal nodes are dropped or
//! unwrapped according to their marker. [`outer_html`] and [`inner_html`]
//! write the tree verbatim and are mostly useful for debugging and snapshots.

use markdown_weaver_escape::{FmtWriter, StrWrite, escape_html, escape_html_body_text};
use smol_str::SmolStr;

use crate::dom::{Document, NodeData, NodeId};
use crate::error::Result;
use crate::text::ensure_host;
use crate::types::InternalMarker;

/// How internal nodes are treated during extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExtractMode {
    /// Content handed back to the editor: unwrap-marked nodes survive.
    #[default]
    Editing,
    /// Content for storage: every internal node is unwrapped or dropped.
    Final,
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "br" | "hr" | "img" | "input" | "wbr" | "col" | "meta" | "link"
    )
}

enum Step {
    Open(NodeId),
    Close(SmolStr),
}

/// What to do with an element before writing it.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Write,
    Unwrap,
    Drop,
}

struct HtmlSerializer<'a, W> {
    doc: &'a Document,
    writer: W,
    mode: Option<ExtractMode>,
}

impl<'a, W: StrWrite> HtmlSerializer<'a, W> {
    fn new(doc: &'a Document, writer: W, mode: Option<ExtractMode>) -> Self {
        Self { doc, writer, mode }
    }

    fn disposition(&self, node: NodeId) -> Disposition {
        let Some(mode) = self.mode else {
            return Disposition::Write;
        };
        match (self.doc.internal_marker(node), mode) {
            (Some(InternalMarker::Remove), _) => Disposition::Drop,
            (Some(InternalMarker::Ui), _) => Disposition::Unwrap,
            (Some(InternalMarker::Unwrap), ExtractMode::Final) => Disposition::Unwrap,
            _ => Disposition::Write,
        }
    }

    fn run(&mut self, roots: &[NodeId]) -> std::result::Result<(), W::Error> {
        let mut stack: Vec<Step> = roots.iter().rev().map(|&n| Step::Open(n)).collect();

        while let Some(step) = stack.pop() {
            let node = match step {
                Step::Close(tag) => {
                    self.writer.write_str("</")?;
                    self.writer.write_str(&tag)?;
                    self.writer.write_str(">")?;
                    continue;
                }
                Step::Open(node) => node,
            };

            match self.doc.data(node) {
                Some(NodeData::Text(text)) => escape_html_body_text(&mut self.writer, text)?,
                Some(NodeData::Element(el)) => {
                    let disposition = self.disposition(node);
                    if disposition == Disposition::Drop {
                        continue;
                    }
                    if disposition == Disposition::Write {
                        self.writer.write_str("<")?;
                        self.writer.write_str(&el.tag)?;
                        for (name, value) in &el.attrs {
                            self.writer.write_str(" ")?;
                            self.writer.write_str(name)?;
                            self.writer.write_str("=\"")?;
                            escape_html(&mut self.writer, value)?;
                            self.writer.write_str("\"")?;
                        }
                        self.writer.write_str(">")?;
                        if is_void(&el.tag) {
                            continue;
                        }
                        stack.push(Step::Close(el.tag.clone()));
                    }
                    stack.extend(
                        self.doc
                            .children(node)
                            .iter()
                            .rev()
                            .map(|&child| Step::Open(child)),
                    );
                }
                None => {}
            }
        }
        Ok(())
    }
}

fn serialize(doc: &Document, roots: &[NodeId], mode: Option<ExtractMode>) -> Result<String> {
    let mut out = String::new();
    HtmlSerializer::new(doc, FmtWriter(&mut out), mode).run(roots)?;
    Ok(out)
}

/// Serialize `node` and its subtree exactly as stored.
pub fn outer_html(doc: &Document, node: NodeId) -> Result<String> {
    serialize(doc, &[node], None)
}

/// Serialize the children of `node` exactly as stored.
pub fn inner_html(doc: &Document, node: NodeId) -> Result<String> {
    serialize(doc, doc.children(node), None)
}

/// Serialize the content of `host`, applying internal markers for `mode`.
pub fn extract_html(doc: &Document, host: NodeId, mode: ExtractMode) -> Result<String> {
    ensure_host(doc, host)?;
    let html = serialize(doc, doc.children(host), Some(mode))?;
    tracing::debug!(target: "weaver::extract", %host, ?mode, len = html.len(), "extracted html");
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementData;
    use crate::types::{ANCHOR_SENTINEL, HIGHLIGHT_ID_ATTR, INTERNAL_ATTR};
    use insta::assert_snapshot;

    fn marked(doc: &mut Document, tag: &str, marker: InternalMarker) -> NodeId {
        doc.create_element(ElementData::new(tag).with_attr(INTERNAL_ATTR, marker.as_str()))
    }

    /// `<p>a<mark ui>b</mark><span unwrap>c</span><span remove>#</span><br>d &lt; e</p>`
    fn sample(doc: &mut Document) -> NodeId {
        let host = doc.element("p");
        let a = doc.create_text("a");
        let mark = marked(doc, "mark", InternalMarker::Ui);
        doc.set_attr(mark, HIGHLIGHT_ID_ATTR, "h1").unwrap();
        let b = doc.create_text("b");
        let keep = marked(doc, "span", InternalMarker::Unwrap);
        let c = doc.create_text("c");
        let anchor = marked(doc, "span", InternalMarker::Remove);
        let sentinel = doc.create_text(ANCHOR_SENTINEL.to_string());
        let br = doc.element("br");
        let d = doc.create_text("d < e");

        doc.append_child(host, a).unwrap();
        doc.append_child(host, mark).unwrap();
        doc.append_child(mark, b).unwrap();
        doc.append_child(host, keep).unwrap();
        doc.append_child(keep, c).unwrap();
        doc.append_child(host, anchor).unwrap();
        doc.append_child(anchor, sentinel).unwrap();
        doc.append_child(host, br).unwrap();
        doc.append_child(host, d).unwrap();
        host
    }

    #[test]
    fn test_editing_mode() {
        let mut doc = Document::new();
        let host = sample(&mut doc);
        assert_snapshot!(
            extract_html(&doc, host, ExtractMode::Editing).unwrap(),
            @r#"ab<span data-weaver-internal="unwrap">c</span><br>d &lt; e"#
        );
    }

    #[test]
    fn test_final_mode() {
        let mut doc = Document::new();
        let host = sample(&mut doc);
        assert_snapshot!(
            extract_html(&doc, host, ExtractMode::Final).unwrap(),
            @"abc<br>d &lt; e"
        );
    }

    #[test]
    fn test_outer_html_is_verbatim() {
        let mut doc = Document::new();
        let host = doc.element("p");
        let link = doc.create_element(ElementData::new("a").with_attr("title", "say \"hi\""));
        let text = doc.create_text("x");
        doc.append_child(host, link).unwrap();
        doc.append_child(link, text).unwrap();

        assert_snapshot!(
            outer_html(&doc, host).unwrap(),
            @r#"<p><a title="say &quot;hi&quot;">x</a></p>"#
        );
        assert_snapshot!(inner_html(&doc, link).unwrap(), @"x");
    }
}
