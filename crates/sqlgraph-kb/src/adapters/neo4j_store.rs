use async_trait::async_trait;
use std::sync::Arc;
use neo4rs::{ConfigBuilder, Graph, Query, Row};
use tracing::{debug, error, info, instrument};

use crate::{
    config::Neo4jConfig,
    data::{DeleteCounts, GraphEdge, GraphNode, GraphStoreError, NodeId, SourceDocument},
    traits::GraphStore,
};

/// Label shared by every materialized tree node
const TREE_LABEL: &str = "SqlTree";

/// Prefix of the per-rule label, e.g. `tsql_select_statement`
const RULE_LABEL_PREFIX: &str = "tsql_";

// Everything reachable from $id through IS_CHILD_OF, $id included. The row is
// grouped by the root so a missing root yields no row at all.
const CASCADE_DELETE: &str = "
    MATCH (root) WHERE id(root) = $id
    OPTIONAL MATCH (root)<-[:IS_CHILD_OF*0..]-(n)
    WITH root, collect(DISTINCT n) AS doomed
    WITH doomed, reduce(acc = [], x IN doomed | acc + [(x)-[r:IS_CHILD_OF]->() | r]) AS links
    FOREACH (r IN links | DELETE r)
    FOREACH (x IN doomed | DETACH DELETE x)
    RETURN size(doomed) AS node_count, size(links) AS edge_count";

const CLEAR_SUBGRAPH: &str = "
    MATCH (anchor) WHERE id(anchor) = $id
    OPTIONAL MATCH (anchor)<-[:IS_CHILD_OF*1..]-(n)
    WITH anchor, collect(DISTINCT n) AS doomed
    WITH doomed, reduce(acc = [], x IN doomed | acc + [(x)-[r:IS_CHILD_OF]->() | r]) AS links
    FOREACH (r IN links | DELETE r)
    FOREACH (x IN doomed | DETACH DELETE x)
    RETURN size(doomed) AS node_count, size(links) AS edge_count";

/// Neo4j implementation of the [`GraphStore`] trait.
///
/// Layout: anchors are `(:SqlSource {name, sql})`; tree nodes carry the
/// `SqlTree` label plus `tsql_<rule>`, a `rule` property and an optional
/// `text`; `(child)-[:IS_CHILD_OF {order}]->(parent)` links them. Node ids are
/// the database's internal ids. The driver pools connections per call.
pub struct Neo4jGraphStore {
    graph: Arc<Graph>,
    config: Neo4jConfig,
}

impl Neo4jGraphStore {
    /// Connects with retries and verifies the connection with a trivial query.
    pub async fn new(config: Neo4jConfig) -> Result<Self, GraphStoreError> {
        let mut config_builder = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.username)
            .password(&config.password)
            .max_connections(config.pool_size);

        if let Some(db) = &config.database {
            config_builder = config_builder.db(db.as_str());
        }

        let neo4j_config = config_builder
            .build()
            .map_err(|e| GraphStoreError::ConnectionError(format!("Failed to build Neo4j config: {}", e)))?;

        let attempts = config.connection_retry_count.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match Graph::connect(neo4j_config.clone()).await {
                Ok(graph) => match graph.run(Query::new("RETURN 1".to_string())).await {
                    Ok(()) => {
                        info!("Connected to Neo4j at {} (attempt {})", config.uri, attempt);
                        return Ok(Self { graph: Arc::new(graph), config });
                    },
                    Err(e) => {
                        error!("Connection test failed: {}", e);
                        last_error = Some(e.to_string());
                    },
                },
                Err(e) => {
                    error!("Failed to connect to Neo4j (attempt {}): {}", attempt, e);
                    last_error = Some(e.to_string());
                },
            }
            if attempt < attempts {
                tokio::time::sleep(config.connection_retry_delay).await;
            }
        }

        Err(GraphStoreError::ConnectionError(format!(
            "Failed to connect to Neo4j at {} after {} attempts. Last error: {}",
            config.uri,
            attempts,
            last_error.unwrap_or_default()
        )))
    }

    /// Returns the configuration used for this store
    pub fn config(&self) -> &Neo4jConfig {
        &self.config
    }

    async fn rows(&self, query: Query) -> Result<Vec<Row>, GraphStoreError> {
        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphStoreError::QueryError(e.to_string()))?;

        let mut rows = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphStoreError::QueryError(e.to_string()))?
        {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn single_row(&self, query: Query, id: NodeId) -> Result<Row, GraphStoreError> {
        self.rows(query)
            .await?
            .into_iter()
            .next()
            .ok_or(GraphStoreError::NotFound(id))
    }

    async fn delete_counts(&self, cypher: &str, id: NodeId) -> Result<DeleteCounts, GraphStoreError> {
        let query = Query::new(cypher.to_string()).param("id", id.as_i64());
        let row = self.single_row(query, id).await?;
        let nodes = row.get::<i64>("node_count").map_err(mapping)?;
        let edges = row.get::<i64>("edge_count").map_err(mapping)?;
        Ok(DeleteCounts::new(nodes as usize, edges as usize))
    }
}

fn mapping(e: impl std::fmt::Display) -> GraphStoreError {
    GraphStoreError::MappingError(e.to_string())
}

/// Rule names become label suffixes; anything outside `[A-Za-z0-9_]` is replaced.
fn rule_label(rule: &str) -> String {
    let suffix: String = rule
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{}{}", RULE_LABEL_PREFIX, suffix)
}

fn source_from_row(row: &Row) -> Result<SourceDocument, GraphStoreError> {
    Ok(SourceDocument {
        id: NodeId(row.get::<i64>("id").map_err(mapping)?),
        name: row.get::<String>("name").map_err(mapping)?,
        text: row.get::<String>("sql").map_err(mapping)?,
    })
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    #[instrument(skip(self), fields(parent = %parent))]
    async fn create_node(
        &self,
        parent: NodeId,
        order: usize,
        label: &str,
    ) -> Result<NodeId, GraphStoreError> {
        let cypher = format!(
            "MATCH (p) WHERE id(p) = $parent \
             CREATE (n:{}:`{}` {{rule: $rule}})-[:IS_CHILD_OF {{order: $order}}]->(p) \
             RETURN id(n) AS id",
            TREE_LABEL,
            rule_label(label)
        );
        let query = Query::new(cypher)
            .param("parent", parent.as_i64())
            .param("rule", label)
            .param("order", order as i64);

        let row = self.single_row(query, parent).await?;
        Ok(NodeId(row.get::<i64>("id").map_err(mapping)?))
    }

    #[instrument(skip(self, text), fields(id = %id))]
    async fn set_text(&self, id: NodeId, text: &str) -> Result<(), GraphStoreError> {
        let query = Query::new(format!(
            "MATCH (n:{}) WHERE id(n) = $id SET n.text = $text RETURN id(n) AS id",
            TREE_LABEL
        ))
        .param("id", id.as_i64())
        .param("text", text);

        self.single_row(query, id).await?;
        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn upsert_source(&self, name: &str, text: &str) -> Result<NodeId, GraphStoreError> {
        let query = Query::new(
            "MERGE (s:SqlSource {name: $name}) SET s.sql = $sql RETURN id(s) AS id".to_string(),
        )
        .param("name", name)
        .param("sql", text);

        let row = self
            .rows(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GraphStoreError::QueryError("MERGE returned no row".to_string()))?;
        let id = NodeId(row.get::<i64>("id").map_err(mapping)?);
        debug!(id = %id, "Upserted source");
        Ok(id)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn fetch_source(&self, id: NodeId) -> Result<SourceDocument, GraphStoreError> {
        let query = Query::new(
            "MATCH (s:SqlSource) WHERE id(s) = $id RETURN id(s) AS id, s.name AS name, s.sql AS sql"
                .to_string(),
        )
        .param("id", id.as_i64());

        let row = self.single_row(query, id).await?;
        source_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn list_sources(&self) -> Result<Vec<SourceDocument>, GraphStoreError> {
        let query = Query::new(
            "MATCH (s:SqlSource) RETURN id(s) AS id, s.name AS name, s.sql AS sql ORDER BY id".to_string(),
        );
        self.rows(query).await?.iter().map(source_from_row).collect()
    }

    #[instrument(skip(self), fields(root = %root))]
    async fn cascade_delete(&self, root: NodeId) -> Result<DeleteCounts, GraphStoreError> {
        self.delete_counts(CASCADE_DELETE, root).await
    }

    #[instrument(skip(self), fields(anchor = %anchor))]
    async fn clear_subgraph(&self, anchor: NodeId) -> Result<DeleteCounts, GraphStoreError> {
        self.delete_counts(CLEAR_SUBGRAPH, anchor).await
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn fetch_node(&self, id: NodeId) -> Result<GraphNode, GraphStoreError> {
        let query = Query::new(format!(
            "MATCH (n:{}) WHERE id(n) = $id RETURN id(n) AS id, n.rule AS rule, n.text AS text",
            TREE_LABEL
        ))
        .param("id", id.as_i64());

        let row = self.single_row(query, id).await?;
        Ok(GraphNode {
            id,
            label: row.get::<String>("rule").map_err(mapping)?,
            text: row.get::<Option<String>>("text").map_err(mapping)?,
        })
    }

    #[instrument(skip(self), fields(parent = %parent))]
    async fn child_edges(&self, parent: NodeId) -> Result<Vec<GraphEdge>, GraphStoreError> {
        let query = Query::new(format!(
            "MATCH (p) WHERE id(p) = $id \
             RETURN [(c:{})-[r:IS_CHILD_OF]->(p) | [id(c), r.order]] AS edges",
            TREE_LABEL
        ))
        .param("id", parent.as_i64());

        let row = self.single_row(query, parent).await?;
        let pairs = row.get::<Vec<Vec<i64>>>("edges").map_err(mapping)?;

        let mut edges = pairs
            .into_iter()
            .map(|pair| match pair.as_slice() {
                [child, order] => Ok(GraphEdge { child: NodeId(*child), parent, order: *order as usize }),
                _ => Err(GraphStoreError::MappingError(format!("Malformed edge row: {:?}", pair))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        edges.sort_by_key(|edge| edge.order);
        Ok(edges)
    }
}
