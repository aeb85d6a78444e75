//! GraphStore trait definition for graph database interaction

use async_trait::async_trait;

use crate::data::{
    errors::GraphStoreError,
    entities::{DeleteCounts, GraphEdge, GraphNode, SourceDocument},
    identifiers::NodeId,
};

/// Represents the interface for persisting source documents and their
/// materialized syntax trees.
/// This abstracts the underlying database technology (e.g., Neo4j) and makes
/// no assumption about its query language.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Creates a node labeled `label` and links it to `parent` with an
    /// is-child-of edge carrying `order`.
    ///
    /// Contract: `order` is stored exactly as given. Fails with `NotFound`
    /// when `parent` does not exist.
    async fn create_node(
        &self,
        parent: NodeId,
        order: usize,
        label: &str,
    ) -> Result<NodeId, GraphStoreError>;

    /// Sets the text attribute of a node.
    async fn set_text(&self, id: NodeId, text: &str) -> Result<(), GraphStoreError>;

    /// Creates or overwrites the source document keyed by `name`.
    ///
    /// Contract: an existing document keeps its id and has its text replaced;
    /// otherwise a new id is allocated.
    async fn upsert_source(&self, name: &str, text: &str) -> Result<NodeId, GraphStoreError>;

    /// Fetches a source document, failing with `NotFound` when absent.
    async fn fetch_source(&self, id: NodeId) -> Result<SourceDocument, GraphStoreError>;

    /// Lists all source documents ordered by id.
    async fn list_sources(&self) -> Result<Vec<SourceDocument>, GraphStoreError>;

    /// Deletes `root` and every node reachable from it through child-of edges,
    /// together with every edge touching those nodes.
    ///
    /// Contract: all-or-nothing from the caller's perspective. Fails with
    /// `NotFound` when `root` does not exist.
    async fn cascade_delete(&self, root: NodeId) -> Result<DeleteCounts, GraphStoreError>;

    /// Deletes everything reachable from `anchor` but keeps `anchor` itself.
    async fn clear_subgraph(&self, anchor: NodeId) -> Result<DeleteCounts, GraphStoreError>;

    /// Point lookup of a tree node.
    async fn fetch_node(&self, id: NodeId) -> Result<GraphNode, GraphStoreError>;

    /// Child edges pointing at `parent`, sorted by `order`.
    async fn child_edges(&self, parent: NodeId) -> Result<Vec<GraphEdge>, GraphStoreError>;
}
