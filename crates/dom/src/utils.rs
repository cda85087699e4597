//! Small helpers shared by the serializer and service.

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::NodeType;

/// Cap text length to avoid dumping enormous text nodes into a response.
pub fn cap_text_length(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        text.to_string()
    } else {
        format!("{}...", &text[..max_len])
    }
}

/// Concatenate all text node content under `node_id`, depth-first.
pub fn get_text_content(arena: &DomArena, node_id: u32) -> Result<String> {
    let mut text = String::new();
    arena.traverse_df(node_id, |node| {
        if node.node_type == NodeType::Text {
            text.push_str(&node.node_value);
        }
        Ok(())
    })?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_text_length() {
        assert_eq!(cap_text_length("hello", 10), "hello");
        assert_eq!(cap_text_length("hello world", 5), "hello...");
    }
}
