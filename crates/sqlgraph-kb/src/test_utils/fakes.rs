use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use tracing::debug;

use crate::data::{
    DeleteCounts, GraphEdge, GraphNode, GraphStoreError, NodeId, ParseOutcome, SourceDocument,
    SyntaxNode,
};
use crate::traits::{GraphStore, SyntaxTreeProvider};

/// Graph store that delegates to `inner` until a write budget runs out.
///
/// Only tree writes (`create_node`, `set_text`) consume the budget; once it is
/// spent they fail with a connection error. Each write yields to the runtime
/// first, so concurrent materializations interleave. Reads and deletes always
/// reach the inner store so cleanup paths can be observed.
pub struct FailingGraphStore {
    inner: Arc<dyn GraphStore>,
    allowed_writes: usize,
    failing_label: Option<String>,
    writes: AtomicUsize,
}

impl FailingGraphStore {
    pub fn new(inner: Arc<dyn GraphStore>, allowed_writes: usize) -> Self {
        Self { inner, allowed_writes, failing_label: None, writes: AtomicUsize::new(0) }
    }

    /// Unlimited writes, except `create_node` calls for `label`
    pub fn failing_on_label(inner: Arc<dyn GraphStore>, label: impl Into<String>) -> Self {
        Self {
            failing_label: Some(label.into()),
            ..Self::new(inner, usize::MAX)
        }
    }

    /// Writes attempted so far, failed ones included
    pub fn attempted_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn spend(&self) -> Result<(), GraphStoreError> {
        let attempt = self.writes.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.allowed_writes {
            debug!(attempt, "Injected write failure");
            return Err(GraphStoreError::ConnectionError("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for FailingGraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailingGraphStore")
            .field("allowed_writes", &self.allowed_writes)
            .field("failing_label", &self.failing_label)
            .field("writes", &self.attempted_writes())
            .finish()
    }
}

#[async_trait]
impl GraphStore for FailingGraphStore {
    async fn create_node(
        &self,
        parent: NodeId,
        order: usize,
        label: &str,
    ) -> Result<NodeId, GraphStoreError> {
        tokio::task::yield_now().await;
        self.spend()?;
        if self.failing_label.as_deref() == Some(label) {
            debug!(label, "Injected write failure");
            return Err(GraphStoreError::ConnectionError(format!("injected failure on {}", label)));
        }
        self.inner.create_node(parent, order, label).await
    }

    async fn set_text(&self, id: NodeId, text: &str) -> Result<(), GraphStoreError> {
        tokio::task::yield_now().await;
        self.spend()?;
        self.inner.set_text(id, text).await
    }

    async fn upsert_source(&self, name: &str, text: &str) -> Result<NodeId, GraphStoreError> {
        self.inner.upsert_source(name, text).await
    }

    async fn fetch_source(&self, id: NodeId) -> Result<SourceDocument, GraphStoreError> {
        self.inner.fetch_source(id).await
    }

    async fn list_sources(&self) -> Result<Vec<SourceDocument>, GraphStoreError> {
        self.inner.list_sources().await
    }

    async fn cascade_delete(&self, root: NodeId) -> Result<DeleteCounts, GraphStoreError> {
        self.inner.cascade_delete(root).await
    }

    async fn clear_subgraph(&self, anchor: NodeId) -> Result<DeleteCounts, GraphStoreError> {
        self.inner.clear_subgraph(anchor).await
    }

    async fn fetch_node(&self, id: NodeId) -> Result<GraphNode, GraphStoreError> {
        self.inner.fetch_node(id).await
    }

    async fn child_edges(&self, parent: NodeId) -> Result<Vec<GraphEdge>, GraphStoreError> {
        self.inner.child_edges(parent).await
    }
}

/// Syntax provider that answers every input with the same outcome.
#[derive(Debug, Clone)]
pub struct ScriptedSyntaxProvider {
    outcome: ParseOutcome,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSyntaxProvider {
    pub fn new(outcome: ParseOutcome) -> Self {
        Self { outcome, calls: Arc::new(AtomicUsize::new(0)) }
    }

    /// Always returns a clean parse of `root`
    pub fn clean(root: SyntaxNode) -> Self {
        Self::new(ParseOutcome::clean(root))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SyntaxTreeProvider for ScriptedSyntaxProvider {
    fn parse(&self, _text: &str) -> ParseOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
