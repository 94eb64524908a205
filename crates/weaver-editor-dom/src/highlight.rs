//! Highlight registry: one [`MatchCollection`] per highlight kind, kept in
//! step with the wrappers in the tree.
//!
//! Kinds never interact. A spellcheck marker and a search hit over the same
//! text both apply, nesting in application order. Within one kind the
//! collection's drop rule decides which highlight survives.

use std::collections::{BTreeMap, HashMap};

use smol_str::{SmolStr, format_smolstr};

use crate::config::OverlayConfig;
use crate::dom::{Document, ElementData, NodeId};
use crate::error::Result;
use crate::matches::{Match, MatchCollection, MergeOutcome};
use crate::overlay::{apply_matches, covers_text, remove_highlight};
use crate::text::{
    byte_to_utf16, ensure_host, extract_text_with, node_len, offset_of_point, slice_utf16,
    text_len, utf16_len,
};
use crate::types::{
    BoundaryPoint, HIGHLIGHT_ID_ATTR, HIGHLIGHT_TYPE_ATTR, INTERNAL_ATTR, InternalMarker,
};

/// Why a highlight request did not touch the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Zero-length or inverted span.
    Empty,
    /// Span ends past the host's text.
    OutOfRange { end: usize, len: usize },
    /// An existing highlight of the same kind already covers part of the span.
    Overlapping,
    /// The span holds nothing but line breaks, so there is no text to wrap.
    NoText,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HighlightOutcome {
    Applied {
        /// Wrapper elements created, one per text run.
        wrappers: usize,
        /// Same-kind highlights removed because the new one starts first.
        evicted: Vec<SmolStr>,
    },
    Skipped(SkipReason),
}

impl HighlightOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, HighlightOutcome::Applied { .. })
    }
}

/// Extent of a live highlight, read back from its wrappers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HighlightInfo {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Snapshot of the stream taken when an asynchronous check started.
#[derive(Clone, Debug)]
pub struct CheckTicket {
    host: NodeId,
    text: String,
}

impl CheckTicket {
    pub fn host(&self) -> NodeId {
        self.host
    }

    /// The stream the check runs against.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Result of folding a finished check back into the tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckOutcome {
    /// Ids of the highlights now in the tree.
    pub applied: Vec<SmolStr>,
    /// Results whose text changed while the check was running.
    pub stale: Vec<Match>,
    /// Results dropped for overlapping each other or covering no text.
    pub rejected: Vec<Match>,
}

/// A live wrapper's span plus what is needed to recreate its match.
struct LiveSpan {
    kind: SmolStr,
    start: usize,
    end: usize,
    decoration: ElementData,
    title: Option<SmolStr>,
}

impl LiveSpan {
    fn into_match(self, id: SmolStr) -> Match {
        let mut m = Match::new(self.start..self.end, id, self.kind, self.decoration);
        m.title = self.title;
        m
    }
}

#[derive(Debug, Default)]
pub struct Highlighter {
    config: OverlayConfig,
    collections: HashMap<SmolStr, MatchCollection>,
    counters: HashMap<SmolStr, u64>,
}

impl Highlighter {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            config,
            collections: HashMap::new(),
            counters: HashMap::new(),
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn collection(&self, kind: &str) -> Option<&MatchCollection> {
        self.collections.get(kind)
    }

    fn next_id(&mut self, kind: &SmolStr) -> SmolStr {
        let counter = self.counters.entry(kind.clone()).or_insert(0);
        let id = format_smolstr!("{kind}-{counter}");
        *counter += 1;
        id
    }

    /// Replace the kind's collection with one built from `batch`.
    fn rebuild(&mut self, host: NodeId, kind: SmolStr, batch: Vec<Match>) {
        let mut collection = MatchCollection::new();
        let outcome = collection.add_matches(batch);
        if !outcome.rejected.is_empty() {
            tracing::warn!(
                target: "weaver::highlight",
                %host,
                %kind,
                rejected = outcome.rejected.len(),
                "live highlights overlap within kind"
            );
        }
        self.collections.insert(kind, collection);
    }

    /// Re-read the kind's spans from the tree, so merges see current offsets.
    fn sync_kind(&mut self, doc: &Document, host: NodeId, kind: &SmolStr) -> Result<()> {
        let batch = live_spans(doc, host)?
            .into_iter()
            .filter(|(_, span)| span.kind == *kind)
            .map(|(id, span)| span.into_match(id))
            .collect();
        self.rebuild(host, kind.clone(), batch);
        Ok(())
    }

    /// Merge a batch into the kind's collection and bring the tree in line.
    ///
    /// Matches that cover no text are reported as rejected and never stored.
    fn merge_and_apply(
        &mut self,
        doc: &mut Document,
        host: NodeId,
        kind: &SmolStr,
        batch: Vec<Match>,
    ) -> Result<(MergeOutcome, usize)> {
        self.sync_kind(doc, host, kind)?;

        let mut textual = Vec::with_capacity(batch.len());
        let mut blank = Vec::new();
        for m in batch {
            if covers_text(doc, host, m.start, m.end)? {
                textual.push(m);
            } else {
                blank.push(m);
            }
        }

        let mut outcome = self
            .collections
            .entry(kind.clone())
            .or_default()
            .add_matches(textual);
        outcome.rejected.extend(blank);
        for evicted in &outcome.evicted {
            remove_highlight(doc, host, &evicted.id, Some(kind.as_str()))?;
        }
        let wrappers = apply_matches(doc, host, &outcome.accepted)?;
        Ok((outcome, wrappers))
    }

    /// Highlight one explicit span.
    ///
    /// Re-highlighting an id that already exists in the kind replaces it.
    pub fn highlight_range(
        &mut self,
        doc: &mut Document,
        host: NodeId,
        request: Match,
    ) -> Result<HighlightOutcome> {
        let len = text_len(doc, host)?;
        if request.is_empty() {
            return Ok(HighlightOutcome::Skipped(SkipReason::Empty));
        }
        if request.end > len {
            return Ok(HighlightOutcome::Skipped(SkipReason::OutOfRange {
                end: request.end,
                len,
            }));
        }

        if !covers_text(doc, host, request.start, request.end)? {
            return Ok(HighlightOutcome::Skipped(SkipReason::NoText));
        }

        let kind = request.kind.clone();
        let id = request.id.clone();
        self.sync_kind(doc, host, &kind)?;
        if self
            .collections
            .get(&kind)
            .is_some_and(|c| c.contains_id(&id))
        {
            self.remove(doc, host, &kind, &id)?;
        }

        let (outcome, wrappers) = self.merge_and_apply(doc, host, &kind, vec![request])?;
        if outcome.accepted.is_empty() {
            tracing::debug!(target: "weaver::highlight", %host, %id, %kind, "overlaps existing highlight");
            return Ok(HighlightOutcome::Skipped(SkipReason::Overlapping));
        }

        Ok(HighlightOutcome::Applied {
            wrappers,
            evicted: outcome.evicted.into_iter().map(|m| m.id).collect(),
        })
    }

    /// Highlight every occurrence of `needle` in the host's text.
    ///
    /// Returns the ids assigned to the highlights that were applied.
    pub fn highlight_text(
        &mut self,
        doc: &mut Document,
        host: NodeId,
        needle: &str,
        kind: &str,
        decoration: ElementData,
    ) -> Result<Vec<SmolStr>> {
        let text = extract_text_with(doc, host, self.config.whitespace)?;
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let kind = SmolStr::new(kind);
        let needle_len = utf16_len(needle);
        let positions: Vec<usize> = text
            .match_indices(needle)
            .map(|(byte, _)| byte_to_utf16(&text, byte))
            .collect();
        let batch: Vec<Match> = positions
            .into_iter()
            .map(|start| {
                let id = self.next_id(&kind);
                Match::new(start..start + needle_len, id, kind.clone(), decoration.clone())
            })
            .collect();

        let (outcome, wrappers) = self.merge_and_apply(doc, host, &kind, batch)?;
        tracing::debug!(
            target: "weaver::highlight",
            %host,
            %kind,
            found = outcome.accepted.len() + outcome.rejected.len(),
            applied = outcome.accepted.len(),
            wrappers,
            "highlighted text"
        );
        Ok(outcome.accepted.into_iter().map(|m| m.id).collect())
    }

    /// Remove one highlight. Returns whether anything was removed.
    pub fn remove(&mut self, doc: &mut Document, host: NodeId, kind: &str, id: &str) -> Result<bool> {
        ensure_host(doc, host)?;
        let dropped = self
            .collections
            .get_mut(kind)
            .map(|c| c.remove(id).len())
            .unwrap_or(0);
        let unwrapped = remove_highlight(doc, host, id, Some(kind))?;
        Ok(dropped > 0 || unwrapped > 0)
    }

    /// Remove every highlight of `kind`. Returns how many highlight ids went away.
    pub fn clear(&mut self, doc: &mut Document, host: NodeId, kind: &str) -> Result<usize> {
        ensure_host(doc, host)?;
        let mut ids: Vec<SmolStr> = self
            .collections
            .get_mut(kind)
            .map(|c| c.clear().into_iter().map(|m| m.id).collect())
            .unwrap_or_default();
        for wrapper in doc.find_by_attr(host, HIGHLIGHT_TYPE_ATTR, kind) {
            if let Some(id) = doc.attr(wrapper, HIGHLIGHT_ID_ATTR) {
                ids.push(SmolStr::new(id));
            }
        }
        ids.sort();
        ids.dedup();

        for id in &ids {
            remove_highlight(doc, host, id, Some(kind))?;
        }
        tracing::debug!(target: "weaver::highlight", %host, kind, cleared = ids.len(), "cleared highlights");
        Ok(ids.len())
    }

    /// Live highlights of `kind`, keyed by id, as they currently sit in the tree.
    pub fn highlights(
        &self,
        doc: &Document,
        host: NodeId,
        kind: &str,
    ) -> Result<BTreeMap<SmolStr, HighlightInfo>> {
        let text = extract_text_with(doc, host, self.config.whitespace)?;
        let spans = live_spans(doc, host)?;
        Ok(spans
            .into_iter()
            .filter(|(_, span)| span.kind == kind)
            .map(|(id, span)| {
                let info = HighlightInfo {
                    start: span.start,
                    end: span.end,
                    text: slice_utf16(&text, span.start, span.end).to_owned(),
                };
                (id, info)
            })
            .collect())
    }

    /// Rebuild every collection from the wrappers in the tree.
    ///
    /// Highlighting operations already re-read their own kind before merging.
    pub fn resync(&mut self, doc: &Document, host: NodeId) -> Result<()> {
        let mut batches: HashMap<SmolStr, Vec<Match>> = HashMap::new();
        for (id, span) in live_spans(doc, host)? {
            batches.entry(span.kind.clone()).or_default().push(span.into_match(id));
        }

        self.collections.clear();
        for (kind, batch) in batches {
            self.rebuild(host, kind, batch);
        }
        Ok(())
    }

    /// Snapshot the stream before handing it to an asynchronous checker.
    pub fn begin_check(&self, doc: &Document, host: NodeId) -> Result<CheckTicket> {
        Ok(CheckTicket {
            host,
            text: extract_text_with(doc, host, self.config.whitespace)?,
        })
    }

    /// Replace the highlights of `kind` with the results of a finished check.
    ///
    /// A result is kept only if the current stream still holds the same text
    /// at the same offsets as the snapshot the check ran against.
    pub fn complete_check(
        &mut self,
        doc: &mut Document,
        ticket: CheckTicket,
        kind: &str,
        results: Vec<Match>,
    ) -> Result<CheckOutcome> {
        let host = ticket.host;
        let fresh = extract_text_with(doc, host, self.config.whitespace)?;
        let fresh_len = utf16_len(&fresh);

        let (current, stale): (Vec<Match>, Vec<Match>) = results.into_iter().partition(|m| {
            m.end <= fresh_len
                && slice_utf16(&ticket.text, m.start, m.end) == slice_utf16(&fresh, m.start, m.end)
        });
        if !stale.is_empty() {
            tracing::debug!(
                target: "weaver::highlight",
                %host,
                kind,
                stale = stale.len(),
                "dropping stale check results"
            );
        }

        self.clear(doc, host, kind)?;
        let kind = SmolStr::new(kind);
        let batch = current
            .into_iter()
            .map(|mut m| {
                m.kind = kind.clone();
                m
            })
            .collect();
        let (outcome, _) = self.merge_and_apply(doc, host, &kind, batch)?;

        Ok(CheckOutcome {
            applied: outcome.accepted.into_iter().map(|m| m.id).collect(),
            stale,
            rejected: outcome.rejected,
        })
    }
}

/// Every highlight wrapper under `host`, merged per id.
fn live_spans(doc: &Document, host: NodeId) -> Result<BTreeMap<SmolStr, LiveSpan>> {
    ensure_host(doc, host)?;
    let mut spans: BTreeMap<SmolStr, LiveSpan> = BTreeMap::new();

    for wrapper in doc.descendants(host) {
        if doc.internal_marker(wrapper) != Some(InternalMarker::Ui) {
            continue;
        }
        let (Some(data), Some(parent), Some(index)) = (
            doc.element_data(wrapper),
            doc.parent(wrapper),
            doc.index_in_parent(wrapper),
        ) else {
            continue;
        };
        let (Some(id), Some(kind)) = (data.attr(HIGHLIGHT_ID_ATTR), data.attr(HIGHLIGHT_TYPE_ATTR))
        else {
            continue;
        };

        let start = offset_of_point(doc, host, BoundaryPoint::new(parent, index))?;
        let end = start + node_len(doc, wrapper);
        if let Some(span) = spans.get_mut(id) {
            span.start = span.start.min(start);
            span.end = span.end.max(end);
            continue;
        }

        let mut decoration = data.clone();
        for name in [HIGHLIGHT_ID_ATTR, HIGHLIGHT_TYPE_ATTR, INTERNAL_ATTR] {
            decoration.remove_attr(name);
        }
        let title = decoration.remove_attr("title");
        spans.insert(
            SmolStr::new(id),
            LiveSpan {
                kind: SmolStr::new(kind),
                start,
                end,
                decoration,
                title,
            },
        );
    }
    Ok(spans)
}
