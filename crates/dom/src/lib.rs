//! Arena-based DOM tree storage and serialization for the watcher's
//! `/dom/*` routes.
//!
//! ```text
//! CDP JSON -> DomService::parse_cdp_dom_tree -> DomArena -> DomSerializer
//!                                                  ^ NodeId (u32 index, no pointers)
//! ```

pub mod arena;
pub mod error;
pub mod serializer;
pub mod service;
pub mod types;
pub mod utils;

pub use arena::DomArena;
pub use error::{DomError, Result};
pub use serializer::DomSerializer;
pub use service::DomService;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_node_creation() {
        let arena = DomArena::new();
        assert!(arena.is_empty());
    }
}
