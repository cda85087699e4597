//! Builds a `DomArena` from a CDP `DOM.getDocument` response.

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::*;
use serde_json::Value;
use std::collections::HashMap;

pub struct DomService {
    arena: DomArena,
}

impl DomService {
    pub fn new() -> Self {
        Self {
            arena: DomArena::new(),
        }
    }

    pub fn arena(&self) -> &DomArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut DomArena {
        &mut self.arena
    }

    /// Parses a CDP `DOM.getDocument` response (`{"root": {...}}`) into the
    /// arena, replacing whatever was there before.
    pub fn parse_cdp_dom_tree(&mut self, cdp_response: &Value) -> Result<NodeId> {
        let root = cdp_response
            .get("root")
            .ok_or_else(|| DomError::CdpError("missing 'root' in CDP response".to_string()))?;

        self.arena.clear();
        let root_id = self.parse_node(root, None, &TargetId::from("default"))?;
        self.arena.set_root(root_id)?;
        Ok(root_id)
    }

    fn parse_node(
        &mut self,
        cdp_node: &Value,
        parent_id: Option<NodeId>,
        target_id: &TargetId,
    ) -> Result<NodeId> {
        let node_id = cdp_node["nodeId"]
            .as_u64()
            .ok_or_else(|| DomError::CdpError("missing nodeId".to_string()))? as u32;

        let backend_node_id = cdp_node["backendNodeId"]
            .as_u64()
            .ok_or_else(|| DomError::CdpError("missing backendNodeId".to_string()))?
            as u32;

        let node_type_val = cdp_node["nodeType"]
            .as_u64()
            .ok_or_else(|| DomError::CdpError("missing nodeType".to_string()))? as u8;

        let node_type =
            NodeType::from_u8(node_type_val).ok_or_else(|| DomError::InvalidNodeType {
                expected: "valid NodeType".to_string(),
                actual: format!("{node_type_val}"),
            })?;

        let node_name = cdp_node["nodeName"].as_str().unwrap_or("").to_string();
        let node_value = cdp_node["nodeValue"].as_str().unwrap_or("").to_string();

        let mut attributes = HashMap::new();
        if let Some(attrs) = cdp_node["attributes"].as_array() {
            let mut i = 0;
            while i + 1 < attrs.len() {
                if let (Some(key), Some(value)) = (attrs[i].as_str(), attrs[i + 1].as_str()) {
                    attributes.insert(key.to_string(), value.to_string());
                }
                i += 2;
            }
        }

        let mut node = DomNode::new(
            node_id,
            backend_node_id,
            node_type,
            node_name,
            target_id.clone(),
        );
        node.node_value = node_value;
        node.attributes = attributes;
        node.parent_id = parent_id;
        node.frame_id = cdp_node["frameId"].as_str().map(String::from);

        if let Some(shadow_type) = cdp_node.get("shadowRootType").and_then(|v| v.as_str()) {
            node.shadow_root_type = match shadow_type {
                "user-agent" => Some(ShadowRootType::UserAgent),
                "open" => Some(ShadowRootType::Open),
                "closed" => Some(ShadowRootType::Closed),
                _ => None,
            };
        }

        let current_node_id = self.arena.add_node(node);

        if let Some(children) = cdp_node["children"].as_array() {
            let mut child_ids = smallvec::SmallVec::new();
            for child in children {
                let child_id = self.parse_node(child, Some(current_node_id), target_id)?;
                child_ids.push(child_id);
            }
            if let Ok(node) = self.arena.get_mut(current_node_id) {
                node.children_ids = child_ids;
            }
        }

        // `pierce: true` inlines same-process iframe documents here.
        if let Some(content_doc) = cdp_node.get("contentDocument") {
            let doc_id = self.parse_node(content_doc, Some(current_node_id), target_id)?;
            if let Ok(node) = self.arena.get_mut(current_node_id) {
                node.content_document_id = Some(doc_id);
            }
        }

        Ok(current_node_id)
    }
}

impl Default for DomService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_dom() {
        let cdp_json = serde_json::json!({
            "root": {
                "nodeId": 1,
                "backendNodeId": 1,
                "nodeType": 9,
                "nodeName": "#document",
                "nodeValue": "",
                "children": [{
                    "nodeId": 2,
                    "backendNodeId": 2,
                    "nodeType": 1,
                    "nodeName": "HTML",
                    "nodeValue": "",
                    "attributes": []
                }]
            }
        });

        let mut service = DomService::new();
        let root_id = service.parse_cdp_dom_tree(&cdp_json).unwrap();

        assert_eq!(root_id, 0);
        assert_eq!(service.arena().len(), 2);
    }

    #[test]
    fn test_parse_pierces_iframe_document() {
        let cdp_json = serde_json::json!({
            "root": {
                "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document", "nodeValue": "",
                "children": [{
                    "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "IFRAME", "nodeValue": "", "attributes": [],
                    "contentDocument": {
                        "nodeId": 3, "backendNodeId": 3, "nodeType": 9, "nodeName": "#document", "nodeValue": ""
                    }
                }]
            }
        });
        let mut service = DomService::new();
        service.parse_cdp_dom_tree(&cdp_json).unwrap();
        assert_eq!(service.arena().len(), 3);
        let iframe = service.arena().get(1).unwrap();
        assert_eq!(iframe.content_document_id, Some(2));
    }
}
