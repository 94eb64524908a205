//! Arena-backed document tree.
//!
//! Models the two node kinds the editing core cares about: text nodes and
//! elements (tag, attributes, children). Every node keeps a parent back-link
//! so traversal can climb without recursion.
//!
//! Detached nodes stay alive in the arena, the same way a DOM node survives
//! removal from its parent, and can be re-inserted later.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{OverlayError, Result};
use crate::text::{utf16_len, utf16_to_byte};
use crate::types::{BoundaryPoint, INTERNAL_ATTR, InternalMarker};

/// Handle to a node in a [`Document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Tag name plus ordered attributes.
///
/// Also used as the cloneable decoration template for highlights.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementData {
    pub tag: SmolStr,
    pub attrs: Vec<(SmolStr, SmolStr)>,
}

impl ElementData {
    pub fn new(tag: impl Into<SmolStr>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<SmolStr> {
        let index = self.attrs.iter().position(|(n, _)| n == name)?;
        Some(self.attrs.remove(index).1)
    }

    pub fn internal_marker(&self) -> Option<InternalMarker> {
        self.attr(INTERNAL_ATTR).and_then(InternalMarker::parse)
    }

    pub fn is_line_break(&self) -> bool {
        self.tag.eq_ignore_ascii_case("br")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeData {
    Text(String),
    Element(ElementData),
}

#[derive(Clone, Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// The document tree.
#[derive(Clone, Debug, Default)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    pub fn create_element(&mut self, data: ElementData) -> NodeId {
        self.alloc(NodeData::Element(data))
    }

    /// Shorthand for an attribute-less element.
    pub fn element(&mut self, tag: &str) -> NodeId {
        self.create_element(ElementData::new(tag))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text(text.into()))
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn try_node(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(OverlayError::UnknownNode(id))
    }

    fn try_node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(OverlayError::UnknownNode(id))
    }

    /// Fails unless `id` is an element of this document.
    pub fn ensure_element(&self, id: NodeId) -> Result<&ElementData> {
        match &self.try_node(id)?.data {
            NodeData::Element(data) => Ok(data),
            NodeData::Text(_) => Err(OverlayError::NotAnElement(id)),
        }
    }

    // === Accessors ===

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).map(|n| &n.data)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    /// Inclusive ancestor check: a node contains itself.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Text(text) => Some(text),
            NodeData::Element(_) => None,
        }
    }

    pub fn element_data(&self, id: NodeId) -> Option<&ElementData> {
        match self.data(id)? {
            NodeData::Element(data) => Some(data),
            NodeData::Text(_) => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element_data(id).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element_data(id).and_then(|e| e.attr(name))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Text(_)))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Element(_)))
    }

    pub fn is_line_break(&self, id: NodeId) -> bool {
        self.element_data(id).is_some_and(ElementData::is_line_break)
    }

    pub fn internal_marker(&self, id: NodeId) -> Option<InternalMarker> {
        self.element_data(id).and_then(ElementData::internal_marker)
    }

    /// UTF-16 length of a text node, 0 for anything else.
    pub fn text_len(&self, id: NodeId) -> usize {
        self.text(id).map(utf16_len).unwrap_or(0)
    }

    /// Length a boundary offset may take: UTF-16 length for text, child count for elements.
    pub fn boundary_len(&self, id: NodeId) -> usize {
        match self.data(id) {
            Some(NodeData::Text(text)) => utf16_len(text),
            Some(NodeData::Element(_)) => self.child_count(id),
            None => 0,
        }
    }

    /// All descendants of `root` in pre-order, excluding `root` itself.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Descendant elements of `root` whose attribute `name` equals `value`.
    pub fn find_by_attr(&self, root: NodeId, name: &str, value: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.attr(id, name) == Some(value))
            .collect()
    }

    // === Mutation ===

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<()> {
        match &mut self.try_node_mut(id)?.data {
            NodeData::Text(content) => {
                *content = text.into();
                Ok(())
            }
            NodeData::Element(_) => Err(OverlayError::NotText(id)),
        }
    }

    pub fn set_attr(
        &mut self,
        id: NodeId,
        name: impl Into<SmolStr>,
        value: impl Into<SmolStr>,
    ) -> Result<()> {
        match &mut self.try_node_mut(id)?.data {
            NodeData::Element(data) => {
                data.set_attr(name, value);
                Ok(())
            }
            NodeData::Text(_) => Err(OverlayError::NotAnElement(id)),
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<Option<SmolStr>> {
        match &mut self.try_node_mut(id)?.data {
            NodeData::Element(data) => Ok(data.remove_attr(name)),
            NodeData::Text(_) => Err(OverlayError::NotAnElement(id)),
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference`, or at the end when `None`.
    ///
    /// The child is detached from its previous parent first.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        self.ensure_element(parent)?;
        self.try_node(child)?;
        if self.contains(child, parent) {
            return Err(OverlayError::HierarchyRequest { parent, child });
        }
        if let Some(reference) = reference {
            if reference == child {
                return Ok(());
            }
            if self.parent(reference) != Some(parent) {
                return Err(OverlayError::HierarchyRequest { parent, child });
            }
        }

        self.detach(child)?;

        let index = match reference.and_then(|r| self.index_in_parent(r)) {
            Some(index) => index,
            None => self.child_count(parent),
        };
        self.try_node_mut(parent)?.children.insert(index, child);
        self.try_node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Remove a node from its parent. No-op for already detached nodes.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let Some(parent) = self.try_node(id)?.parent else {
            return Ok(());
        };
        let parent_node = self.try_node_mut(parent)?;
        parent_node.children.retain(|&c| c != id);
        self.try_node_mut(id)?.parent = None;
        Ok(())
    }

    fn remove_child_at(&mut self, parent: NodeId, index: usize) -> Option<NodeId> {
        let parent_node = self.nodes.get_mut(parent.0)?;
        if index >= parent_node.children.len() {
            return None;
        }
        let child = parent_node.children.remove(index);
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = None;
        }
        Some(child)
    }

    /// Replace `id` with its children in place ("unwrap"). Returns the moved children.
    pub fn replace_with_children(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        let parent = self
            .parent(id)
            .ok_or(OverlayError::HierarchyRequest { parent: id, child: id })?;
        let index = self
            .index_in_parent(id)
            .ok_or(OverlayError::UnknownNode(id))?;

        let children = std::mem::take(&mut self.try_node_mut(id)?.children);
        for &child in &children {
            self.try_node_mut(child)?.parent = Some(parent);
        }
        let siblings = &mut self.try_node_mut(parent)?.children;
        let tail = siblings.split_off(index + 1);
        siblings.truncate(index);
        siblings.extend(children.iter().copied());
        siblings.extend(tail);
        self.try_node_mut(id)?.parent = None;
        Ok(children)
    }

    /// Put `wrapper` where `node` is and move `node` inside it.
    pub fn wrap(&mut self, node: NodeId, wrapper: NodeId) -> Result<()> {
        let parent = self.parent(node).ok_or(OverlayError::HierarchyRequest {
            parent: wrapper,
            child: node,
        })?;
        self.ensure_element(wrapper)?;
        self.insert_before(parent, wrapper, Some(node))?;
        self.append_child(wrapper, node)
    }

    /// Split a text node at a UTF-16 offset, keeping the head in `id`.
    ///
    /// Returns the new tail node, inserted right after `id` when attached.
    /// An offset inside a surrogate pair snaps down to the preceding scalar.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId> {
        let text = self.text(id).ok_or(OverlayError::NotText(id))?;
        let len = utf16_len(text);
        if offset > len {
            return Err(OverlayError::InvalidBoundary {
                node: id,
                offset,
                len,
            });
        }

        let byte = utf16_to_byte(text, offset);
        let tail_text = text[byte..].to_owned();
        if let NodeData::Text(content) = &mut self.try_node_mut(id)?.data {
            content.truncate(byte);
        }

        let tail = self.create_text(tail_text);
        if let Some(parent) = self.parent(id) {
            let index = self
                .index_in_parent(id)
                .ok_or(OverlayError::UnknownNode(id))?;
            self.try_node_mut(parent)?.children.insert(index + 1, tail);
            self.try_node_mut(tail)?.parent = Some(parent);
        }
        Ok(tail)
    }

    /// Merge adjacent text nodes and drop empty ones under `root`.
    pub fn normalize(&mut self, root: NodeId) {
        self.normalize_tracking(root, &mut []);
    }

    /// [`Document::normalize`], rewriting `points` so they keep addressing the
    /// same position after merges and removals.
    pub fn normalize_tracking(&mut self, root: NodeId, points: &mut [BoundaryPoint]) {
        let mut parents = vec![root];
        parents.extend(
            self.descendants(root)
                .into_iter()
                .filter(|&id| self.is_element(id)),
        );

        for parent in parents {
            let mut index = 0;
            while let Some(&child) = self.children(parent).get(index) {
                let Some(len) = self.text(child).map(utf16_len) else {
                    index += 1;
                    continue;
                };

                if len == 0 {
                    self.remove_child_at(parent, index);
                    for point in points.iter_mut() {
                        if point.node == child {
                            *point = BoundaryPoint::new(parent, index);
                        } else if point.node == parent && point.offset > index {
                            point.offset -= 1;
                        }
                    }
                    continue;
                }

                let next = self.children(parent).get(index + 1).copied();
                let Some(next) = next.filter(|&n| self.is_text(n)) else {
                    index += 1;
                    continue;
                };

                let tail = self.text(next).unwrap_or_default().to_owned();
                if let Some(Node {
                    data: NodeData::Text(content),
                    ..
                }) = self.nodes.get_mut(child.0)
                {
                    content.push_str(&tail);
                }
                self.remove_child_at(parent, index + 1);
                for point in points.iter_mut() {
                    if point.node == next {
                        *point = BoundaryPoint::new(child, len + point.offset);
                    } else if point.node == parent && point.offset == index + 1 {
                        *point = BoundaryPoint::new(child, len);
                    } else if point.node == parent && point.offset > index + 1 {
                        point.offset -= 1;
                    }
                }
            }
        }
    }
}
