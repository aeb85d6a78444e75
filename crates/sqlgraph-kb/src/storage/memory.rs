use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;
use tracing::debug;

use crate::data::{DeleteCounts, GraphEdge, GraphNode, GraphStoreError, NodeId, SourceDocument};
use crate::traits::GraphStore;

#[derive(Debug, Default)]
struct Graph {
    last_id: i64,
    sources: BTreeMap<NodeId, SourceDocument>,
    source_names: HashMap<String, NodeId>,
    nodes: HashMap<NodeId, GraphNode>,
    /// child -> edge to its parent
    parent_edges: HashMap<NodeId, GraphEdge>,
    /// parent -> children, in insertion order
    children: HashMap<NodeId, Vec<NodeId>>,
    /// parent -> orders taken by its children
    orders: HashMap<NodeId, HashSet<usize>>,
}

impl Graph {
    fn allocate(&mut self) -> NodeId {
        self.last_id += 1;
        NodeId(self.last_id)
    }

    fn contains(&self, id: NodeId) -> bool {
        self.sources.contains_key(&id) || self.nodes.contains_key(&id)
    }

    fn reachable_from(&self, root: NodeId) -> Vec<NodeId> {
        let mut reached = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            reached.push(id);
            if let Some(children) = self.children.get(&id) {
                stack.extend(children.iter().copied());
            }
        }
        reached
    }

    fn remove_all(&mut self, ids: &[NodeId]) -> DeleteCounts {
        let doomed: HashSet<NodeId> = ids.iter().copied().collect();
        let mut counts = DeleteCounts::default();
        for id in ids {
            if let Some(edge) = self.parent_edges.remove(id) {
                counts.edges_deleted += 1;
                // parents removed in the same pass drop their bookkeeping wholesale
                if !doomed.contains(&edge.parent) {
                    if let Some(siblings) = self.children.get_mut(&edge.parent) {
                        siblings.retain(|sibling| sibling != id);
                    }
                    if let Some(used) = self.orders.get_mut(&edge.parent) {
                        used.remove(&edge.order);
                    }
                }
            }
            self.children.remove(id);
            self.orders.remove(id);
            if let Some(source) = self.sources.remove(id) {
                self.source_names.remove(&source.name);
                counts.nodes_deleted += 1;
            } else if self.nodes.remove(id).is_some() {
                counts.nodes_deleted += 1;
            }
        }
        counts
    }
}

/// In-memory graph store.
///
/// Anchors and tree nodes share one id sequence starting at 1. Every operation
/// holds the lock for its whole duration, so cascade deletes are atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphStore {
    graph: Arc<RwLock<Graph>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes currently stored, anchors included
    pub async fn node_count(&self) -> usize {
        let graph = self.graph.read().await;
        graph.sources.len() + graph.nodes.len()
    }

    /// Number of child-of edges currently stored
    pub async fn edge_count(&self) -> usize {
        self.graph.read().await.parent_edges.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn create_node(
        &self,
        parent: NodeId,
        order: usize,
        label: &str,
    ) -> Result<NodeId, GraphStoreError> {
        let mut graph = self.graph.write().await;
        if !graph.contains(parent) {
            return Err(GraphStoreError::NotFound(parent));
        }
        if !graph.orders.entry(parent).or_default().insert(order) {
            return Err(GraphStoreError::InvalidInput(format!(
                "order {} already used under parent {}",
                order, parent
            )));
        }

        let id = graph.allocate();
        graph.nodes.insert(id, GraphNode { id, label: label.to_string(), text: None });
        graph.parent_edges.insert(id, GraphEdge { child: id, parent, order });
        graph.children.entry(parent).or_default().push(id);
        Ok(id)
    }

    async fn set_text(&self, id: NodeId, text: &str) -> Result<(), GraphStoreError> {
        let mut graph = self.graph.write().await;
        let node = graph.nodes.get_mut(&id).ok_or(GraphStoreError::NotFound(id))?;
        node.text = Some(text.to_string());
        Ok(())
    }

    async fn upsert_source(&self, name: &str, text: &str) -> Result<NodeId, GraphStoreError> {
        let mut graph = self.graph.write().await;
        if let Some(id) = graph.source_names.get(name).copied() {
            debug!(id = %id, name, "Replacing source text");
            if let Some(source) = graph.sources.get_mut(&id) {
                source.text = text.to_string();
            }
            return Ok(id);
        }

        let id = graph.allocate();
        graph.sources.insert(id, SourceDocument {
            id,
            name: name.to_string(),
            text: text.to_string(),
        });
        graph.source_names.insert(name.to_string(), id);
        Ok(id)
    }

    async fn fetch_source(&self, id: NodeId) -> Result<SourceDocument, GraphStoreError> {
        self.graph
            .read()
            .await
            .sources
            .get(&id)
            .cloned()
            .ok_or(GraphStoreError::NotFound(id))
    }

    async fn list_sources(&self) -> Result<Vec<SourceDocument>, GraphStoreError> {
        Ok(self.graph.read().await.sources.values().cloned().collect())
    }

    async fn cascade_delete(&self, root: NodeId) -> Result<DeleteCounts, GraphStoreError> {
        let mut graph = self.graph.write().await;
        if !graph.contains(root) {
            return Err(GraphStoreError::NotFound(root));
        }
        let doomed = graph.reachable_from(root);
        Ok(graph.remove_all(&doomed))
    }

    async fn clear_subgraph(&self, anchor: NodeId) -> Result<DeleteCounts, GraphStoreError> {
        let mut graph = self.graph.write().await;
        if !graph.contains(anchor) {
            return Err(GraphStoreError::NotFound(anchor));
        }
        let mut doomed = graph.reachable_from(anchor);
        doomed.retain(|id| *id != anchor);
        Ok(graph.remove_all(&doomed))
    }

    async fn fetch_node(&self, id: NodeId) -> Result<GraphNode, GraphStoreError> {
        self.graph
            .read()
            .await
            .nodes
            .get(&id)
            .cloned()
            .ok_or(GraphStoreError::NotFound(id))
    }

    async fn child_edges(&self, parent: NodeId) -> Result<Vec<GraphEdge>, GraphStoreError> {
        let graph = self.graph.read().await;
        if !graph.contains(parent) {
            return Err(GraphStoreError::NotFound(parent));
        }
        let mut edges: Vec<GraphEdge> = graph
            .children
            .get(&parent)
            .map(|children| children.iter().map(|c| graph.parent_edges[c]).collect())
            .unwrap_or_default();
        edges.sort_by_key(|edge| edge.order);
        Ok(edges)
    }
}
