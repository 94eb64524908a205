//! Error types for editing-tree operations.

use smol_str::SmolStr;
use thiserror::Error;

use crate::dom::NodeId;

/// Errors that can occur while mapping offsets, highlighting or persisting selections.
///
/// Everything except [`OverlayError::AnchorMissing`] indicates a caller bug.
/// Degenerate inputs (empty spans, empty hosts) are not errors and are
/// reported through the operation's own result type instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OverlayError {
    /// Node id does not belong to this document.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Operation needs an element (host, parent, wrapper).
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    /// Operation needs a text node.
    #[error("node {0} is not a text node")]
    NotText(NodeId),

    /// Boundary point or anchor lives outside the host.
    #[error("node {node} is outside host {host}")]
    OutsideHost { node: NodeId, host: NodeId },

    /// Boundary offset exceeds the node's length or child count.
    #[error("offset {offset} out of bounds for node {node} (len {len})")]
    InvalidBoundary {
        node: NodeId,
        offset: usize,
        len: usize,
    },

    /// Canonical offset beyond the end of the host's text.
    #[error("offset {offset} beyond end of text (len {len})")]
    OffsetOutOfRange { offset: usize, len: usize },

    /// Boundary pair is not in document order.
    #[error("selection start {start} is after end {end}")]
    ReversedPair { start: usize, end: usize },

    /// Insertion would create a cycle or reference a foreign sibling.
    #[error("cannot insert {child} into {parent}")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    /// Matches handed to the overlay are unsorted, overlapping or empty.
    #[error("match {id} at {start}..{end} violates ordering")]
    UnorderedMatch {
        id: SmolStr,
        start: usize,
        end: usize,
    },

    /// A selection anchor was removed before restore ran.
    #[error("selection anchor {0} not found")]
    AnchorMissing(SmolStr),

    /// Token does not belong to this keeper or was already restored.
    #[error("unknown selection token {0}")]
    UnknownToken(SmolStr),

    /// Configuration failed to parse.
    #[error("invalid overlay config: {0}")]
    Config(#[from] serde_json::Error),

    /// Writing serialized HTML failed.
    #[error("failed to serialize html")]
    Serialize(#[from] std::fmt::Error),
}

impl OverlayError {
    /// Whether the caller may reasonably retry or abandon instead of treating this as a bug.
    ///
    /// Editing commands can legitimately race with a pending restore and
    /// delete its anchors.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, OverlayError::AnchorMissing(_))
    }
}

pub type Result<T, E = OverlayError> = std::result::Result<T, E>;
