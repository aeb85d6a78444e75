//! Adapters for external graph stores

#[cfg(feature = "neo4rs")]
pub mod neo4j_store;

#[cfg(feature = "neo4rs")]
pub use neo4j_store::Neo4jGraphStore;
