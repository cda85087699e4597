//! Core DOM node types.
//!
//! 1. u32 indices instead of 8-byte pointers
//! 2. SmallVec for child lists (most nodes have a handful of children)
//! 3. No accessibility or paint metadata here — the watcher's `/dom/tree`
//!    route only ever needs node identity, structure, and attributes.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Node identifier (index into the arena).
pub type NodeId = u32;

/// Frame identifier from CDP.
pub type FrameId = String;

/// Target identifier from CDP.
pub type TargetId = String;

/// Node type per the DOM specification, matching CDP's `nodeType` integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    CdataSection = 4,
    EntityReference = 5,
    Entity = 6,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
    Notation = 12,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeType::Element),
            2 => Some(NodeType::Attribute),
            3 => Some(NodeType::Text),
            4 => Some(NodeType::CdataSection),
            5 => Some(NodeType::EntityReference),
            6 => Some(NodeType::Entity),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            10 => Some(NodeType::DocumentType),
            11 => Some(NodeType::DocumentFragment),
            12 => Some(NodeType::Notation),
            _ => None,
        }
    }
}

/// Shadow root type from CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowRootType {
    UserAgent,
    Open,
    Closed,
}

/// A bounding box, used by `/dom/info` (from `DOM.getBoxModel`), not stored
/// per-node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DomRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A node in the DOM tree, as captured from `DOM.getDocument`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    pub node_id: NodeId,
    pub backend_node_id: u32,
    pub node_type: NodeType,

    pub parent_id: Option<NodeId>,
    pub children_ids: SmallVec<[NodeId; 4]>,

    pub node_name: String,
    pub node_value: String,
    pub attributes: HashMap<String, String>,

    pub frame_id: Option<FrameId>,
    pub target_id: TargetId,

    pub content_document_id: Option<NodeId>,
    pub shadow_root_type: Option<ShadowRootType>,
}

impl DomNode {
    pub fn new(
        node_id: NodeId,
        backend_node_id: u32,
        node_type: NodeType,
        node_name: String,
        target_id: TargetId,
    ) -> Self {
        Self {
            node_id,
            backend_node_id,
            node_type,
            node_name,
            node_value: String::new(),
            attributes: HashMap::new(),
            parent_id: None,
            children_ids: SmallVec::new(),
            frame_id: None,
            target_id,
            content_document_id: None,
            shadow_root_type: None,
        }
    }

    pub fn tag_name(&self) -> Option<&str> {
        if self.node_type == NodeType::Element {
            Some(&self.node_name)
        } else {
            None
        }
    }

    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }

    pub fn is_text(&self) -> bool {
        self.node_type == NodeType::Text
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }
}

/// Attributes worth surfacing in a `/dom/tree` serialization — enough to
/// identify and interact with an element without dumping every attribute.
pub const DEFAULT_INCLUDE_ATTRIBUTES: &[&str] = &[
    "id",
    "class",
    "name",
    "type",
    "role",
    "value",
    "placeholder",
    "href",
    "alt",
    "title",
    "aria-label",
    "aria-expanded",
    "aria-checked",
    "aria-disabled",
    "aria-hidden",
    "checked",
    "selected",
    "disabled",
    "required",
    "data-testid",
];
