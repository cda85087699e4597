//! Render a `DomArena` as a compact indented-tag text tree for `/dom/tree`.

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct SerializerConfig {
    pub include_attributes: Vec<String>,
    pub max_text_length: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            include_attributes: DEFAULT_INCLUDE_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_text_length: 200,
        }
    }
}

pub struct DomSerializer {
    config: SerializerConfig,
}

impl DomSerializer {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    pub fn serialize(&self, arena: &DomArena) -> Result<String> {
        let mut output = String::with_capacity(4096);
        if let Some(root_id) = arena.root_id() {
            self.serialize_node(arena, root_id, 0, &mut output)?;
        }
        Ok(output)
    }

    fn serialize_node(
        &self,
        arena: &DomArena,
        node_id: NodeId,
        depth: usize,
        output: &mut String,
    ) -> Result<()> {
        let node = arena.get(node_id)?;
        let indent = "  ".repeat(depth);

        match node.node_type {
            NodeType::Element => {
                output.push_str(&indent);
                output.push('<');
                output.push_str(&node.node_name);

                for attr_name in &self.config.include_attributes {
                    if let Some(attr_value) = node.attr(attr_name) {
                        output.push_str(&format!(" {}=\"{}\"", attr_name, attr_value));
                    }
                }

                output.push_str(">\n");
                for &child_id in &node.children_ids {
                    self.serialize_node(arena, child_id, depth + 1, output)?;
                }
                output.push_str(&indent);
                output.push_str("</");
                output.push_str(&node.node_name);
                output.push_str(">\n");
            }
            NodeType::Text => {
                let text = crate::utils::cap_text_length(node.node_value.trim(), self.config.max_text_length);
                if !text.is_empty() {
                    output.push_str(&indent);
                    output.push_str(&text);
                    output.push('\n');
                }
            }
            NodeType::Document => {
                for &child_id in &node.children_ids {
                    self.serialize_node(arena, child_id, depth, output)?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Generate an XPath for a node, used to let callers re-locate a node
    /// they observed in a previous `/dom/tree` snapshot.
    pub fn generate_xpath(&self, arena: &DomArena, node_id: NodeId) -> Result<String> {
        let mut path_parts = Vec::new();
        let mut current_id = Some(node_id);

        while let Some(id) = current_id {
            let node = arena.get(id)?;

            if node.node_type == NodeType::Element {
                let position = if let Some(parent_id) = node.parent_id {
                    let parent = arena.get(parent_id)?;
                    parent
                        .children_ids
                        .iter()
                        .filter_map(|&child_id| arena.get(child_id).ok())
                        .filter(|child| {
                            child.node_type == NodeType::Element
                                && child.node_name == node.node_name
                        })
                        .position(|child| child.node_id == node.node_id)
                        .map(|p| p + 1)
                        .unwrap_or(1)
                } else {
                    1
                };

                path_parts.push(format!("{}[{}]", node.node_name.to_lowercase(), position));
            }

            current_id = node.parent_id;
        }

        path_parts.reverse();
        Ok(format!("/{}", path_parts.join("/")))
    }
}

impl Default for DomSerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DomService;

    #[test]
    fn test_serialize_simple_dom() {
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
                    "attributes": [],
                    "children": [{
                        "nodeId": 3,
                        "backendNodeId": 3,
                        "nodeType": 3,
                        "nodeName": "#text",
                        "nodeValue": "Hello",
                        "attributes": []
                    }]
                }]
            }
        });

        let mut service = DomService::new();
        service.parse_cdp_dom_tree(&cdp_json).unwrap();

        let serializer = DomSerializer::new();
        let output = serializer.serialize(service.arena()).unwrap();

        assert!(
            output.contains("HTML"),
            "output should contain HTML tag, got: {output}"
        );
        assert!(output.contains("Hello"));
    }

    #[test]
    fn test_generate_xpath() {
        let cdp_json = serde_json::json!({
            "root": {
                "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
                "nodeValue": "", "children": [{
                    "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "BODY",
                    "nodeValue": "", "attributes": [], "children": [
                        {"nodeId": 3, "backendNodeId": 3, "nodeType": 1, "nodeName": "DIV", "nodeValue": "", "attributes": []},
                        {"nodeId": 4, "backendNodeId": 4, "nodeType": 1, "nodeName": "DIV", "nodeValue": "", "attributes": []}
                    ]
                }]
            }
        });
        let mut service = DomService::new();
        service.parse_cdp_dom_tree(&cdp_json).unwrap();
        let serializer = DomSerializer::new();
        let xpath = serializer.generate_xpath(service.arena(), 3).unwrap();
        assert_eq!(xpath, "/body[1]/div[2]");
    }
}
