use std::collections::HashMap;
use std::sync::Arc;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn, Instrument, Span};

use crate::{
    data::{CoreError, DeleteCounts, DocumentView, NodeId, SourceDocument, SyntaxNode},
    services::materializer::TreeMaterializer,
    traits::{GraphStore, SyntaxTreeProvider},
};

/// Per-document exclusive execution tokens.
///
/// An entry lives only while some caller holds or waits for its token.
#[derive(Debug, Default)]
struct DocumentLocks {
    tokens: Mutex<HashMap<NodeId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    async fn acquire(self: &Arc<Self>, id: NodeId) -> DocumentLease {
        let token = self.tokens.lock().entry(id).or_default().clone();
        DocumentLease {
            id,
            guard: Some(token.lock_owned().await),
            locks: self.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.tokens.lock().len()
    }
}

/// Exclusive hold on one document. Dropping it releases every registry entry
/// nobody holds or waits for.
struct DocumentLease {
    id: NodeId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DocumentLocks>,
}

impl Drop for DocumentLease {
    fn drop(&mut self) {
        // holders and waiters keep a clone; new ones are cloned under this mutex
        let mut tokens = self.locks.tokens.lock();
        drop(self.guard.take());
        tokens.retain(|_, token| Arc::strong_count(token) > 1);
        debug!(id = %self.id, in_use = tokens.len(), "Released document lock");
    }
}

/// Catalog of SQL source documents and their materialized syntax trees.
///
/// `regenerate` and `delete_one` on the same document are serialized; work on
/// different documents runs concurrently. Clones share the store and locks.
#[derive(Clone)]
pub struct QueryCatalog {
    store: Arc<dyn GraphStore>,
    parser: Arc<dyn SyntaxTreeProvider>,
    materializer: TreeMaterializer,
    locks: Arc<DocumentLocks>,
    regenerate_concurrency: usize,
}

impl QueryCatalog {
    pub fn new(store: Arc<dyn GraphStore>, parser: Arc<dyn SyntaxTreeProvider>) -> Self {
        Self {
            materializer: TreeMaterializer::new(store.clone()),
            store,
            parser,
            locks: Arc::default(),
            regenerate_concurrency: 4,
        }
    }

    /// Sets how many documents `regenerate_all` works on at once (at least one)
    pub fn with_regenerate_concurrency(mut self, concurrency: usize) -> Self {
        self.regenerate_concurrency = concurrency.max(1);
        self
    }

    /// Stores `text` under `name`, replacing the text of an existing document
    /// with that name in place.
    #[instrument(skip(self, text), fields(bytes = text.len()))]
    pub async fn load(&self, name: &str, text: &str) -> Result<NodeId, CoreError> {
        let id = self.store.upsert_source(name, text).await?;
        info!(id = %id, "Loaded SQL source");
        Ok(id)
    }

    /// Loads several documents in order, returning their ids in the same order.
    pub async fn load_many(&self, documents: &[(String, String)]) -> Result<Vec<NodeId>, CoreError> {
        let mut ids = Vec::with_capacity(documents.len());
        for (name, text) in documents {
            ids.push(self.load(name, text).await?);
        }
        Ok(ids)
    }

    pub async fn list(&self) -> Result<Vec<SourceDocument>, CoreError> {
        Ok(self.store.list_sources().await?)
    }

    /// Fetches a document and renders a fresh parse of its text.
    ///
    /// Never looks at the persisted subgraph.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get(&self, id: NodeId) -> Result<DocumentView, CoreError> {
        let document = self.store.fetch_source(id).await?;
        let outcome = self.parser.parse(&document.text);
        if !outcome.is_clean() {
            debug!(diagnostics = outcome.diagnostics.len(), "Rendered tree has syntax errors");
        }

        Ok(DocumentView {
            id: document.id,
            name: document.name,
            text: document.text,
            tree: outcome.root.to_string_tree(),
        })
    }

    /// Parses the document and, when the parse is clean, replaces its
    /// persisted subgraph with the new tree. The rendered tree is returned
    /// either way.
    ///
    /// Store writes run on their own task and finish even if the caller stops
    /// polling, so a partial subgraph is always either completed or removed.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn regenerate(&self, id: NodeId) -> Result<String, CoreError> {
        let lease = self.locks.acquire(id).await;

        let document = self.store.fetch_source(id).await?;
        let outcome = self.parser.parse(&document.text);
        let rendered = outcome.root.to_string_tree();

        if !outcome.is_clean() {
            warn!(
                name = %document.name,
                diagnostics = outcome.diagnostics.len(),
                "Syntax errors found, skipping persistence"
            );
            for diagnostic in &outcome.diagnostics {
                debug!(%diagnostic, "Syntax error");
            }
            return Ok(rendered);
        }

        let catalog = self.clone();
        tokio::spawn(
            async move {
                let _lease = lease;
                catalog.replace_tree(id, &document.name, &outcome.root).await
            }
            .instrument(Span::current()),
        )
        .await
        .map_err(|e| CoreError::Internal(format!("regenerate task for {} failed: {}", id, e)))??;

        Ok(rendered)
    }

    async fn replace_tree(&self, id: NodeId, name: &str, root: &SyntaxNode) -> Result<(), CoreError> {
        let cleared = self.store.clear_subgraph(id).await?;
        if cleared != DeleteCounts::default() {
            debug!(
                nodes_deleted = cleared.nodes_deleted,
                edges_deleted = cleared.edges_deleted,
                "Removed previous subgraph"
            );
        }

        let report = self.materializer.materialize(id, root).await?;
        info!(
            name = %name,
            root = %report.root,
            nodes_created = report.nodes_created,
            "Persisted syntax tree"
        );
        Ok(())
    }

    /// Regenerates every document. Results follow listing order.
    ///
    /// Every document is processed even when one fails; the first error in
    /// listing order is returned.
    #[instrument(skip(self))]
    pub async fn regenerate_all(&self) -> Result<Vec<String>, CoreError> {
        let ids: Vec<NodeId> = self.list().await?.into_iter().map(|doc| doc.id).collect();
        info!(documents = ids.len(), concurrency = self.regenerate_concurrency, "Regenerating all documents");

        let results: Vec<Result<String, CoreError>> = stream::iter(ids)
            .map(|id| self.regenerate(id))
            .buffered(self.regenerate_concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed > 0 {
            warn!(failed, "Some documents could not be regenerated");
        }
        results.into_iter().collect()
    }

    /// Deletes a document, its subgraph and every edge touching them.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_one(&self, id: NodeId) -> Result<DeleteCounts, CoreError> {
        let counts = {
            let _lease = self.locks.acquire(id).await;
            // only anchors may be deleted through the catalog
            self.store.fetch_source(id).await?;
            self.store.cascade_delete(id).await?
        };

        info!(
            nodes_deleted = counts.nodes_deleted,
            edges_deleted = counts.edges_deleted,
            "Deleted document"
        );
        Ok(counts)
    }

    /// Deletes every document. Documents removed concurrently are skipped.
    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<DeleteCounts, CoreError> {
        let mut total = DeleteCounts::default();
        for document in self.list().await? {
            match self.delete_one(document.id).await {
                Ok(counts) => total += counts,
                Err(e) if e.is_not_found() => debug!(id = %document.id, "Already deleted"),
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Renders the subgraph persisted under a document as `(label children…)`,
    /// with leaves as `(label text)`. `None` when nothing is persisted.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn materialized_tree(&self, id: NodeId) -> Result<Option<String>, CoreError> {
        enum Frame {
            Node(NodeId, bool),
            Close,
        }

        self.store.fetch_source(id).await?;
        let roots = self.store.child_edges(id).await?;
        if roots.is_empty() {
            return Ok(None);
        }

        let mut out = String::new();
        let mut stack: Vec<Frame> = roots
            .iter()
            .enumerate()
            .rev()
            .map(|(index, edge)| Frame::Node(edge.child, index > 0))
            .collect();

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Close => out.push(')'),
                Frame::Node(node_id, spaced) => {
                    if spaced {
                        out.push(' ');
                    }
                    let node = self.store.fetch_node(node_id).await?;
                    let children = self.store.child_edges(node_id).await?;
                    match (&node.text, children.is_empty()) {
                        (Some(text), _) => out.push_str(&format!("({} {})", node.label, text)),
                        (None, true) => out.push_str(&node.label),
                        (None, false) => {
                            out.push('(');
                            out.push_str(&node.label);
                            stack.push(Frame::Close);
                            for edge in children.iter().rev() {
                                stack.push(Frame::Node(edge.child, true));
                            }
                        },
                    }
                },
            }
        }

        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ParseOutcome, SyntaxNode, Diagnostic};
    use crate::parser::TsqlTreeParser;
    use crate::storage::MemoryGraphStore;
    use crate::data::GraphStoreError;
    use crate::test_utils::{FailingGraphStore, ScriptedSyntaxProvider};
    use pretty_assertions::assert_eq;

    const MULTI_STATEMENT_SQL: &str = "SELECT a, (SELECT b FROM t WHERE c = 1) FROM u; UPDATE t SET a = 1";

    fn catalog_with(store: Arc<MemoryGraphStore>) -> QueryCatalog {
        QueryCatalog::new(store, Arc::new(TsqlTreeParser::new()))
    }

    #[test_log::test(tokio::test)]
    async fn test_end_to_end_select_one() {
        let store = Arc::new(MemoryGraphStore::new());
        let catalog = catalog_with(store.clone());

        let id = catalog.load("t1.sql", "SELECT 1").await.unwrap();
        assert_eq!(id, NodeId(1));

        let rendered = catalog.regenerate(id).await.unwrap();
        assert_eq!(rendered, "(tsql_file (batch (select_statement (select_clause SELECT 1))))");

        // tsql_file, batch, select_statement and the compacted select_clause
        assert_eq!(
            catalog.materialized_tree(id).await.unwrap().as_deref(),
            Some("(tsql_file (batch (select_statement (select_clause SELECT1))))")
        );

        let counts = catalog.delete_one(id).await.unwrap();
        assert_eq!(counts, DeleteCounts::new(5, 4));
        assert_eq!(store.node_count().await, 0);
        assert_eq!(store.edge_count().await, 0);
    }

    #[tokio::test]
    async fn test_load_get_round_trip() {
        let catalog = catalog_with(Arc::new(MemoryGraphStore::new()));
        let text = "select *\r\n\tfrom [dbo].[t] -- trailing comment\n";
        let id = catalog.load("round.sql", text).await.unwrap();

        let view = catalog.get(id).await.unwrap();
        assert_eq!(view.name, "round.sql");
        assert_eq!(view.text, text);
        assert!(view.tree.starts_with("(tsql_file (batch (select_statement"));
    }

    #[tokio::test]
    async fn test_get_does_not_read_persisted_subgraph() {
        let catalog = catalog_with(Arc::new(MemoryGraphStore::new()));
        let id = catalog.load("a.sql", "SELECT 1").await.unwrap();
        assert_eq!(catalog.materialized_tree(id).await.unwrap(), None);

        let view = catalog.get(id).await.unwrap();
        assert_eq!(view.tree, "(tsql_file (batch (select_statement (select_clause SELECT 1))))");
        assert_eq!(catalog.materialized_tree(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reload_keeps_id_and_replaces_text() {
        let catalog = catalog_with(Arc::new(MemoryGraphStore::new()));
        let first = catalog.load("a.sql", "SELECT 1").await.unwrap();
        let second = catalog.load("a.sql", "SELECT 2").await.unwrap();
        assert_eq!(first, second);

        let listed = catalog.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "SELECT 2");
    }

    #[tokio::test]
    async fn test_second_regenerate_replaces_subgraph() {
        let store = Arc::new(MemoryGraphStore::new());
        let catalog = catalog_with(store.clone());
        let id = catalog.load("a.sql", "SELECT 1").await.unwrap();

        catalog.regenerate(id).await.unwrap();
        let after_first = (store.node_count().await, store.edge_count().await);
        catalog.regenerate(id).await.unwrap();
        let after_second = (store.node_count().await, store.edge_count().await);

        assert_eq!(after_first, after_second);
        // exactly one subgraph hangs off the anchor
        let roots = store.child_edges(id).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].order, 0);
    }

    #[tokio::test]
    async fn test_regenerate_after_reload_drops_stale_tree() {
        let catalog = catalog_with(Arc::new(MemoryGraphStore::new()));
        let id = catalog.load("a.sql", "SELECT 1").await.unwrap();
        catalog.regenerate(id).await.unwrap();

        catalog.load("a.sql", "DELETE FROM t").await.unwrap();
        catalog.regenerate(id).await.unwrap();
        assert_eq!(
            catalog.materialized_tree(id).await.unwrap().as_deref(),
            Some("(tsql_file (batch (delete_statement (delete_clause DELETE) (from_clause FROMt))))")
        );
    }

    #[tokio::test]
    async fn test_diagnostics_skip_persistence() {
        let store = Arc::new(MemoryGraphStore::new());
        let catalog = catalog_with(store.clone());
        let id = catalog.load("bad.sql", "SELECT (1").await.unwrap();

        let rendered = catalog.regenerate(id).await.unwrap();
        assert!(rendered.starts_with("(tsql_file"));
        assert_eq!(store.node_count().await, 1);
        assert_eq!(catalog.materialized_tree(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_diagnostics_keep_previous_subgraph() {
        let store = Arc::new(MemoryGraphStore::new());
        let clean = ScriptedSyntaxProvider::clean(SyntaxNode::rule("tsql_file", vec![
            SyntaxNode::rule("batch", vec![SyntaxNode::token("GO")]),
        ]));
        let catalog = QueryCatalog::new(store.clone(), Arc::new(clean));
        let id = catalog.load("a.sql", "GO").await.unwrap();
        catalog.regenerate(id).await.unwrap();
        assert_eq!(store.node_count().await, 3);

        let broken = ScriptedSyntaxProvider::new(ParseOutcome {
            root: SyntaxNode::rule("tsql_file", vec![]),
            diagnostics: vec![Diagnostic::at(1, 1, "boom")],
        });
        let catalog = QueryCatalog::new(store.clone(), Arc::new(broken.clone()));
        catalog.regenerate(id).await.unwrap();

        assert_eq!(broken.calls(), 1);
        assert_eq!(
            catalog.materialized_tree(id).await.unwrap().as_deref(),
            Some("(tsql_file (batch GO))")
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let catalog = catalog_with(Arc::new(MemoryGraphStore::new()));
        let missing = NodeId(42);

        assert!(catalog.get(missing).await.unwrap_err().is_not_found());
        assert!(catalog.regenerate(missing).await.unwrap_err().is_not_found());
        assert!(catalog.delete_one(missing).await.unwrap_err().is_not_found());
        assert!(catalog.materialized_tree(missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_one_rejects_tree_nodes() {
        let store = Arc::new(MemoryGraphStore::new());
        let catalog = catalog_with(store.clone());
        let id = catalog.load("a.sql", "SELECT 1").await.unwrap();
        catalog.regenerate(id).await.unwrap();

        let root = store.child_edges(id).await.unwrap()[0].child;
        assert!(catalog.delete_one(root).await.unwrap_err().is_not_found());
        assert_eq!(store.node_count().await, 5);
    }

    #[tokio::test]
    async fn test_delete_all_sums_counts() {
        let store = Arc::new(MemoryGraphStore::new());
        let catalog = catalog_with(store.clone());
        let ids = catalog
            .load_many(&[
                ("a.sql".to_string(), "SELECT 1".to_string()),
                ("b.sql".to_string(), "SELECT 2".to_string()),
                ("c.sql".to_string(), "SELECT (3".to_string()),
            ])
            .await
            .unwrap();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3)]);

        let rendered = catalog.regenerate_all().await.unwrap();
        assert_eq!(rendered.len(), 3);
        assert_eq!(rendered[1], "(tsql_file (batch (select_statement (select_clause SELECT 2))))");

        // two persisted trees of four nodes, one bare anchor
        assert_eq!(catalog.delete_all().await.unwrap(), DeleteCounts::new(11, 8));
        assert!(catalog.list().await.unwrap().is_empty());
        assert_eq!(store.node_count().await, 0);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_concurrent_regenerate_same_id_leaves_one_subgraph() {
        let store = Arc::new(MemoryGraphStore::new());
        let catalog = Arc::new(catalog_with(store.clone()));
        let id = catalog.load("big.sql", MULTI_STATEMENT_SQL).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let catalog = catalog.clone();
            handles.push(tokio::spawn(async move { catalog.regenerate(id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let roots = store.child_edges(id).await.unwrap();
        assert_eq!(roots.len(), 1);

        let single = {
            let fresh = Arc::new(MemoryGraphStore::new());
            let other = catalog_with(fresh.clone());
            let other_id = other.load("big.sql", MULTI_STATEMENT_SQL).await.unwrap();
            other.regenerate(other_id).await.unwrap();
            fresh.node_count().await
        };
        assert_eq!(store.node_count().await, single);
    }

    #[test_log::test(tokio::test)]
    async fn test_regenerate_all_completes_documents_after_a_failure() {
        let inner = Arc::new(MemoryGraphStore::new());
        let store = Arc::new(FailingGraphStore::failing_on_label(inner.clone(), "delete_statement"));
        let catalog = QueryCatalog::new(store, Arc::new(TsqlTreeParser::new()));
        let broken = catalog.load("a.sql", "DELETE FROM t").await.unwrap();
        let big = catalog.load("b.sql", MULTI_STATEMENT_SQL).await.unwrap();

        let err = catalog.regenerate_all().await.unwrap_err();
        assert!(matches!(err, CoreError::Store(GraphStoreError::ConnectionError(_))));

        // the failed document is rolled back to its bare anchor
        assert_eq!(catalog.materialized_tree(broken).await.unwrap(), None);

        let expected = {
            let fresh = catalog_with(Arc::new(MemoryGraphStore::new()));
            let id = fresh.load("b.sql", MULTI_STATEMENT_SQL).await.unwrap();
            fresh.regenerate(id).await.unwrap();
            fresh.materialized_tree(id).await.unwrap()
        };
        assert!(expected.is_some());
        assert_eq!(catalog.materialized_tree(big).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_lock_registry_is_empty_when_idle() {
        let catalog = catalog_with(Arc::new(MemoryGraphStore::new()));
        for raw in 100..200 {
            assert!(catalog.regenerate(NodeId(raw)).await.unwrap_err().is_not_found());
        }
        assert_eq!(catalog.locks.len(), 0);

        let id = catalog.load("a.sql", "SELECT 1").await.unwrap();
        catalog.regenerate(id).await.unwrap();
        catalog.delete_one(id).await.unwrap();
        assert!(catalog.delete_one(NodeId(999)).await.unwrap_err().is_not_found());
        assert_eq!(catalog.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_token_after_holder_releases() {
        let locks = Arc::new(DocumentLocks::default());
        let held = locks.acquire(NodeId(1)).await;

        let waiter = tokio::spawn({
            let locks = locks.clone();
            async move {
                let _lease = locks.acquire(NodeId(1)).await;
            }
        });
        // let the waiter queue on the token
        tokio::task::yield_now().await;
        assert_eq!(locks.len(), 1);

        drop(held);
        // the woken waiter still owns the entry, so later callers share its token
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
