//! Ordered, non-overlapping highlight spans over the canonical stream.
//!
//! Overlaps are resolved by dropping the later span in merge order, never by
//! splitting it. Highlights are addressed per id as a whole, so a partially
//! applied match would leave dependents with half a highlight.

use std::ops::Range;

use smol_str::SmolStr;

use crate::dom::ElementData;

/// A half-open span `[start, end)` of the canonical stream plus its decoration.
#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    /// Highlight id, unique within a kind.
    pub id: SmolStr,
    /// Highlight type used to scope searches and clears.
    pub kind: SmolStr,
    /// Element cloned around every matched text run.
    pub decoration: ElementData,
    /// Optional tooltip written to the wrapper's `title`.
    pub title: Option<SmolStr>,
}

impl Match {
    pub fn new(
        range: Range<usize>,
        id: impl Into<SmolStr>,
        kind: impl Into<SmolStr>,
        decoration: ElementData,
    ) -> Self {
        Self {
            start: range.start,
            end: range.end,
            id: id.into(),
            kind: kind.into(),
            decoration,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<SmolStr>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Zero-length or inverted spans never highlight anything.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &Match) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// What happened to a batch passed to [`MatchCollection::add_matches`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    /// Batch matches that made it into the collection.
    pub accepted: Vec<Match>,
    /// Batch matches dropped for being empty or overlapping.
    pub rejected: Vec<Match>,
    /// Previously stored matches dropped because a batch match came first.
    pub evicted: Vec<Match>,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.accepted.is_empty() && self.evicted.is_empty()
    }
}

/// Sorted, mutually non-overlapping matches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchCollection {
    matches: Vec<Match>,
}

impl MatchCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter()
    }

    pub fn as_slice(&self) -> &[Match] {
        &self.matches
    }

    pub fn get(&self, id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Remove every match with this id. Returns the removed matches.
    pub fn remove(&mut self, id: &str) -> Vec<Match> {
        let (removed, kept) = std::mem::take(&mut self.matches)
            .into_iter()
            .partition(|m| m.id == id);
        self.matches = kept;
        removed
    }

    pub fn clear(&mut self) -> Vec<Match> {
        std::mem::take(&mut self.matches)
    }

    /// Merge a batch into the collection.
    ///
    /// The stored list and the sorted batch are walked in lock-step by start;
    /// on a tie the stored match goes first. A candidate is kept only if it
    /// starts at or after the end of the last kept match. Dropped candidates
    /// still push that end forward, so one dropped span can shadow the next.
    pub fn add_matches(&mut self, batch: impl IntoIterator<Item = Match>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        let (mut incoming, empty): (Vec<Match>, Vec<Match>) =
            batch.into_iter().partition(|m| !m.is_empty());
        outcome.rejected.extend(empty);
        incoming.sort_by_key(|m| m.start);

        let existing = std::mem::take(&mut self.matches);
        let mut merged = Vec::with_capacity(existing.len() + incoming.len());
        let mut stored = existing.into_iter().peekable();
        let mut fresh = incoming.into_iter().peekable();
        let mut last_end = 0;

        loop {
            let from_batch = match (stored.peek(), fresh.peek()) {
                (Some(old), Some(new)) => new.start < old.start,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (None, None) => break,
            };
            let candidate = if from_batch {
                fresh.next()
            } else {
                stored.next()
            };
            let Some(candidate) = candidate else {
                break;
            };

            if candidate.start >= last_end {
                last_end = candidate.end;
                if from_batch {
                    outcome.accepted.push(candidate.clone());
                }
                merged.push(candidate);
            } else {
                last_end = last_end.max(candidate.end);
                tracing::trace!(
                    target: "weaver::matches",
                    id = %candidate.id,
                    start = candidate.start,
                    end = candidate.end,
                    from_batch,
                    "dropping overlapping match"
                );
                if from_batch {
                    outcome.rejected.push(candidate);
                } else {
                    outcome.evicted.push(candidate);
                }
            }
        }

        self.matches = merged;
        outcome
    }
}
