//! Converts syntax trees into graph store writes.
//!
//! The walk is depth-first and left-to-right, driven by an explicit stack so
//! that arbitrarily deep trees cannot exhaust the thread stack. A rule whose
//! children are all terminals is compacted into a single leaf carrying the
//! concatenated terminal text; no graph nodes are created for those terminals.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{
    data::{GraphStoreError, NodeId, SyntaxNode},
    traits::GraphStore,
};

/// Label given to a terminal that has to be persisted on its own
pub const TOKEN_LABEL: &str = "VALUE";

/// Summary of one materialization run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Root of the written subgraph, linked to the anchor with order 0
    pub root: NodeId,
    pub nodes_created: usize,
    pub texts_set: usize,
}

/// Writes syntax trees into a [`GraphStore`].
#[derive(Clone)]
pub struct TreeMaterializer {
    store: Arc<dyn GraphStore>,
}

impl TreeMaterializer {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Materializes `tree` below `anchor`.
    ///
    /// Each persisted node costs one `create_node`; each leaf one more
    /// `set_text`. Writes are not transactional: when one fails, the partial
    /// subgraph is cascade-deleted before the original error is returned.
    #[instrument(skip(self, tree), fields(anchor = %anchor))]
    pub async fn materialize(
        &self,
        anchor: NodeId,
        tree: &SyntaxNode,
    ) -> Result<MaterializeReport, GraphStoreError> {
        let mut report = MaterializeReport { root: anchor, nodes_created: 0, texts_set: 0 };
        let mut root = None;

        match self.write_tree(anchor, tree, &mut root, &mut report).await {
            Ok(()) => {
                debug!(
                    nodes_created = report.nodes_created,
                    texts_set = report.texts_set,
                    "Materialized syntax tree"
                );
                Ok(report)
            },
            Err(e) => {
                if let Some(partial) = root {
                    warn!(root = %partial, error = %e, "Materialization failed, removing partial subgraph");
                    if let Err(cleanup) = self.store.cascade_delete(partial).await {
                        warn!(
                            root = %partial,
                            error = %cleanup,
                            "Could not remove partial subgraph; delete the document and retry"
                        );
                    }
                }
                Err(e)
            },
        }
    }

    async fn write_tree(
        &self,
        anchor: NodeId,
        tree: &SyntaxNode,
        root: &mut Option<NodeId>,
        report: &mut MaterializeReport,
    ) -> Result<(), GraphStoreError> {
        let mut stack: Vec<(NodeId, usize, &SyntaxNode)> = vec![(anchor, 0, tree)];

        while let Some((parent, order, node)) = stack.pop() {
            let (label, text) = match node {
                SyntaxNode::Token { text } => (TOKEN_LABEL, Some(text.clone())),
                SyntaxNode::Rule { name, children } => {
                    let text = node.is_terminal_run().then(|| {
                        children.iter().map(SyntaxNode::node_text).collect::<String>()
                    });
                    (name.as_str(), text)
                },
            };

            let id = self.store.create_node(parent, order, label).await?;
            report.nodes_created += 1;
            if root.is_none() {
                *root = Some(id);
                report.root = id;
            }

            match text {
                Some(text) => {
                    self.store.set_text(id, &text).await?;
                    report.texts_set += 1;
                },
                None => {
                    // reversed so the leftmost child is written first
                    for (index, child) in node.children().iter().enumerate().rev() {
                        stack.push((id, index, child));
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryGraphStore;
    use crate::test_utils::FailingGraphStore;
    use pretty_assertions::assert_eq;

    fn rule(name: &str, children: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::rule(name, children)
    }

    fn tok(text: &str) -> SyntaxNode {
        SyntaxNode::token(text)
    }

    async fn setup() -> (Arc<MemoryGraphStore>, TreeMaterializer, NodeId) {
        let store = Arc::new(MemoryGraphStore::new());
        let anchor = store.upsert_source("t.sql", "ignored").await.unwrap();
        let materializer = TreeMaterializer::new(store.clone());
        (store, materializer, anchor)
    }

    #[tokio::test]
    async fn test_terminal_run_is_compacted() {
        let (store, materializer, anchor) = setup().await;
        let tree = rule("select_statement", vec![tok("SELECT"), tok("1")]);

        let report = materializer.materialize(anchor, &tree).await.unwrap();
        assert_eq!(report.nodes_created, 1);
        assert_eq!(report.texts_set, 1);

        let node = store.fetch_node(report.root).await.unwrap();
        assert_eq!(node.label, "select_statement");
        assert_eq!(node.text.as_deref(), Some("SELECT1"));
        assert!(store.child_edges(report.root).await.unwrap().is_empty());

        let root_edge = store.child_edges(anchor).await.unwrap();
        assert_eq!(root_edge.len(), 1);
        assert_eq!(root_edge[0].order, 0);
    }

    #[tokio::test]
    async fn test_rule_children_recurse_in_order() {
        let (store, materializer, anchor) = setup().await;
        let tree = rule("batch", vec![
            rule("select_statement", vec![tok("SELECT"), tok("1")]),
            rule("select_statement", vec![tok("SELECT"), tok("2")]),
            rule("select_statement", vec![tok("SELECT"), tok("3")]),
        ]);

        let report = materializer.materialize(anchor, &tree).await.unwrap();
        let root = store.fetch_node(report.root).await.unwrap();
        assert_eq!(root.text, None);

        let edges = store.child_edges(report.root).await.unwrap();
        assert_eq!(edges.iter().map(|e| e.order).collect::<Vec<_>>(), vec![0, 1, 2]);

        let mut texts = Vec::new();
        for edge in edges {
            texts.push(store.fetch_node(edge.child).await.unwrap().text.unwrap());
        }
        assert_eq!(texts, vec!["SELECT1", "SELECT2", "SELECT3"]);
    }

    #[tokio::test]
    async fn test_mixed_children_persist_tokens_as_value_leaves() {
        let (store, materializer, anchor) = setup().await;
        let tree = rule("select_statement", vec![
            rule("select_clause", vec![tok("SELECT"), tok("1")]),
            tok(";"),
        ]);

        let report = materializer.materialize(anchor, &tree).await.unwrap();
        assert_eq!(report.nodes_created, 3);

        let edges = store.child_edges(report.root).await.unwrap();
        assert_eq!(edges.len(), 2);
        let semicolon = store.fetch_node(edges[1].child).await.unwrap();
        assert_eq!(semicolon.label, TOKEN_LABEL);
        assert_eq!(semicolon.text.as_deref(), Some(";"));
    }

    #[tokio::test]
    async fn test_bare_token_root_becomes_single_leaf() {
        let (store, materializer, anchor) = setup().await;
        let report = materializer.materialize(anchor, &tok("GO")).await.unwrap();

        let node = store.fetch_node(report.root).await.unwrap();
        assert_eq!(node.label, TOKEN_LABEL);
        assert_eq!(node.text.as_deref(), Some("GO"));
    }

    #[tokio::test]
    async fn test_childless_rule_has_neither_text_nor_children() {
        let (store, materializer, anchor) = setup().await;
        let report = materializer.materialize(anchor, &rule("tsql_file", vec![])).await.unwrap();

        let node = store.fetch_node(report.root).await.unwrap();
        assert_eq!(node.label, "tsql_file");
        assert_eq!(node.text, None);
        assert_eq!(report.texts_set, 0);
    }

    #[tokio::test]
    async fn test_deep_tree_uses_explicit_stack() {
        let (store, materializer, anchor) = setup().await;
        let mut tree = rule("leaf", vec![tok("x")]);
        for _ in 0..20_000 {
            tree = rule("nested", vec![tree]);
        }

        let report = materializer.materialize(anchor, &tree).await.unwrap();
        assert_eq!(report.nodes_created, 20_001);
        assert_eq!(store.node_count().await, 20_002);
        drop(tree);
    }

    #[tokio::test]
    async fn test_failure_removes_partial_subgraph() {
        let inner = Arc::new(MemoryGraphStore::new());
        let anchor = inner.upsert_source("t.sql", "ignored").await.unwrap();
        // allow three writes, then fail
        let store = Arc::new(FailingGraphStore::new(inner.clone(), 3));
        let materializer = TreeMaterializer::new(store);

        let tree = rule("tsql_file", vec![rule("batch", vec![
            rule("a", vec![tok("1")]),
            rule("b", vec![tok("2")]),
        ])]);

        let err = materializer.materialize(anchor, &tree).await.unwrap_err();
        assert!(matches!(err, GraphStoreError::ConnectionError(_)));

        // only the anchor is left
        assert_eq!(inner.node_count().await, 1);
        assert!(inner.child_edges(anchor).await.unwrap().is_empty());
    }
}
