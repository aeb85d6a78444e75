//! Persisted entity types for the SQL graph catalog

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use crate::data::NodeId;

/// A named SQL source. The anchor node of its materialized subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: NodeId,
    pub name: String,
    /// Raw SQL text exactly as loaded
    #[serde(rename = "sql")]
    pub text: String,
}

/// A persisted syntax-tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    /// Rule name of the syntax node this graph node represents
    pub label: String,
    /// Set only on leaves: compacted terminal text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// An ordered "is-child-of" relation from `child` to `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub child: NodeId,
    pub parent: NodeId,
    pub order: usize,
}

/// Counters reported by a cascade delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCounts {
    pub nodes_deleted: usize,
    pub edges_deleted: usize,
}

impl DeleteCounts {
    pub fn new(nodes_deleted: usize, edges_deleted: usize) -> Self {
        Self { nodes_deleted, edges_deleted }
    }
}

impl AddAssign for DeleteCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes_deleted += rhs.nodes_deleted;
        self.edges_deleted += rhs.edges_deleted;
    }
}

/// A source document together with its freshly rendered syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentView {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "sql")]
    pub text: String,
    #[serde(rename = "ast")]
    pub tree: String,
}
