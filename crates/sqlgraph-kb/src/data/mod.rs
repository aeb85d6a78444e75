//! Core data structures for the SQL graph catalog

pub mod identifiers;
pub mod entities;
pub mod syntax;
pub mod errors;

// Re-export all common types
pub use identifiers::NodeId;
pub use entities::{SourceDocument, GraphNode, GraphEdge, DeleteCounts, DocumentView};
pub use syntax::{SyntaxNode, Diagnostic, ParseOutcome};
pub use errors::{CoreError, GraphStoreError};
