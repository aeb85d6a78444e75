//! SQL syntax-tree graph catalog.
//!
//! Parses T-SQL sources, materializes their syntax trees as ordered labeled
//! graphs in a [`GraphStore`] and renders or deletes them again.

// Core modules
pub mod cli;
pub mod config;
pub mod data;
pub mod parser;
pub mod services;
pub mod storage;
pub mod traits;

// HTTP routes
#[cfg(feature = "api-server")]
pub mod api;

// Graph database adapters
#[cfg(feature = "neo4rs")]
pub mod adapters;

// Fakes for unit and integration tests
pub mod test_utils;

use std::sync::Arc;
use tracing::info;

// Re-export key types for convenient usage
pub use config::{KbConfig, Neo4jConfig, StoreBackend};
pub use data::{
    CoreError, DeleteCounts, Diagnostic, DocumentView, GraphEdge, GraphNode, GraphStoreError,
    NodeId, ParseOutcome, SourceDocument, SyntaxNode,
};
pub use parser::TsqlTreeParser;
pub use services::{
    CatalogClient, CatalogRequest, CatalogResponse, CatalogService, QueryCatalog,
    TreeMaterializer,
};
pub use storage::MemoryGraphStore;
pub use traits::{GraphStore, SyntaxTreeProvider};

#[cfg(feature = "neo4rs")]
pub use adapters::Neo4jGraphStore;

/// Initialize tracing for the catalog binaries
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Creates the graph store selected by `config.store`.
pub async fn create_graph_store(config: &KbConfig) -> Result<Arc<dyn GraphStore>, CoreError> {
    match config.store {
        StoreBackend::Memory => {
            info!("Using in-memory graph store");
            Ok(Arc::new(MemoryGraphStore::new()))
        },
        #[cfg(feature = "neo4rs")]
        StoreBackend::Neo4j => {
            info!(uri = %config.neo4j.uri, "Using Neo4j graph store");
            let store = Neo4jGraphStore::new(config.neo4j.clone()).await?;
            Ok(Arc::new(store))
        },
        #[cfg(not(feature = "neo4rs"))]
        StoreBackend::Neo4j => Err(CoreError::Internal(
            "Neo4j store requested but the 'state-neo4j' feature is not enabled".to_string(),
        )),
    }
}

/// Builds a catalog over the configured store and the bundled T-SQL parser.
pub async fn create_catalog(config: &KbConfig) -> Result<Arc<QueryCatalog>, CoreError> {
    let store = create_graph_store(config).await?;
    let catalog = QueryCatalog::new(store, Arc::new(TsqlTreeParser::new()))
        .with_regenerate_concurrency(config.regenerate_concurrency);
    Ok(Arc::new(catalog))
}
