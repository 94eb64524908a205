//! Editing-tree core for the weaver editor.
//!
//! This crate maps between a linear character stream and a live, mutable
//! document tree, and uses that mapping to overlay highlights and keep
//! selections alive while the tree is edited underneath them. It is pure
//! Rust with no browser dependency: the browser layer supplies caret
//! geometry through [`LayoutProbe`].
//!
//! # Architecture
//!
//! - `dom`: arena document tree with parent back-links
//! - `walker`: pre-order traversal that survives mutation of the current node
//! - `text`: canonical stream extraction and offset ↔ boundary point mapping
//! - `locate`: closest offset to a pixel x coordinate
//! - `matches`: sorted, non-overlapping highlight spans
//! - `overlay`: wrapping spans in decoration elements and unwrapping them
//! - `anchors`: selection save/restore through anchor nodes
//! - `highlight`: per-kind highlight registry on top of the above
//! - `refresh`: debounced refresh scheduling
//! - `extract`: HTML serialization honouring internal markers
//!
//! All offsets are UTF-16 code units.

pub mod anchors;
pub mod config;
pub mod dom;
pub mod error;
pub mod extract;
pub mod highlight;
pub mod locate;
pub mod matches;
pub mod overlay;
pub mod platform;
pub mod refresh;
pub mod text;
pub mod types;
pub mod walker;

pub use anchors::{SelectionKeeper, SelectionToken};
pub use config::OverlayConfig;
pub use dom::{Document, ElementData, NodeData, NodeId};
pub use error::{OverlayError, Result};
pub use extract::{ExtractMode, extract_html, inner_html, outer_html};
pub use highlight::{
    CheckOutcome, CheckTicket, HighlightInfo, HighlightOutcome, Highlighter, SkipReason,
};
pub use locate::{LineConstraint, Located, locate};
pub use matches::{Match, MatchCollection, MergeOutcome};
pub use overlay::{apply_matches, remove_highlight};
pub use platform::{LayoutProbe, MonospaceProbe};
pub use refresh::RefreshScheduler;
pub use text::{WhitespacePolicy, extract_text, offset_of_point, point_at_offset, text_len};
pub use types::{
    ANCHOR_SENTINEL, BoundaryPair, BoundaryPoint, CaretRect, HIGHLIGHT_ID_ATTR,
    HIGHLIGHT_TYPE_ATTR, INTERNAL_ATTR, InternalMarker,
};
pub use walker::TreeWalker;
