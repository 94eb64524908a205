//! Pre-order traversal that survives mutation of the node it just returned.
//!
//! The walker keeps an explicit `next` pointer instead of borrowing the
//! document, so callers can split, wrap or replace the current node between
//! steps. After such a replacement they call [`TreeWalker::reenter`] and the
//! walk continues right after the replacement.
//!
//! Elements marked [`InternalMarker::Remove`] are never returned and never
//! descended into. The root itself is not part of the walk.

use crate::dom::{Document, NodeId};
use crate::types::InternalMarker;

#[derive(Clone, Debug)]
pub struct TreeWalker {
    root: NodeId,
    current: Option<NodeId>,
    next: Option<NodeId>,
}

impl TreeWalker {
    /// Create a walker positioned before the first node under `root`.
    pub fn new(doc: &Document, root: NodeId) -> Self {
        let mut walker = Self {
            root,
            current: None,
            next: None,
        };
        walker.next = walker.following(doc, root, true);
        walker
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node most recently returned by a step.
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// Step forward in document order.
    pub fn next_node(&mut self, doc: &Document) -> Option<NodeId> {
        let node = self.next?;
        self.current = Some(node);
        self.next = self.following(doc, node, true);
        Some(node)
    }

    /// Step backward in document order.
    ///
    /// Before the first forward step this starts from the last node of the subtree.
    pub fn previous_node(&mut self, doc: &Document) -> Option<NodeId> {
        let node = match self.current {
            Some(current) => self.preceding(doc, current)?,
            None => {
                let last = self.last_descendant(doc, self.root);
                if last == self.root {
                    return None;
                }
                last
            }
        };
        self.current = Some(node);
        self.next = self.following(doc, node, true);
        Some(node)
    }

    /// Continue after `replacement`, which took the place of the current node.
    ///
    /// The replacement's own subtree is not visited.
    pub fn reenter(&mut self, doc: &Document, replacement: NodeId) {
        self.current = Some(replacement);
        self.next = self.following(doc, replacement, false);
    }

    fn is_skipped(&self, doc: &Document, node: NodeId) -> bool {
        doc.internal_marker(node) == Some(InternalMarker::Remove)
    }

    fn first_visible_from(&self, doc: &Document, mut candidate: Option<NodeId>) -> Option<NodeId> {
        while let Some(node) = candidate {
            if !self.is_skipped(doc, node) {
                return Some(node);
            }
            candidate = doc.next_sibling(node);
        }
        None
    }

    fn following(&self, doc: &Document, node: NodeId, descend: bool) -> Option<NodeId> {
        if descend {
            if let Some(child) = self.first_visible_from(doc, doc.first_child(node)) {
                return Some(child);
            }
        }

        let mut node = node;
        while node != self.root {
            if let Some(sibling) = self.first_visible_from(doc, doc.next_sibling(node)) {
                return Some(sibling);
            }
            node = doc.parent(node)?;
        }
        None
    }

    fn preceding(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        let mut node = node;
        loop {
            if node == self.root {
                return None;
            }
            match doc.previous_sibling(node) {
                Some(sibling) if self.is_skipped(doc, sibling) => node = sibling,
                Some(sibling) => return Some(self.last_descendant(doc, sibling)),
                None => {
                    let parent = doc.parent(node)?;
                    return (parent != self.root).then_some(parent);
                }
            }
        }
    }

    fn last_descendant(&self, doc: &Document, node: NodeId) -> NodeId {
        let mut node = node;
        'descend: loop {
            let mut child = doc.last_child(node);
            while let Some(candidate) = child {
                if !self.is_skipped(doc, candidate) {
                    node = candidate;
                    continue 'descend;
                }
                child = doc.previous_sibling(candidate);
            }
            return node;
        }
    }
}
