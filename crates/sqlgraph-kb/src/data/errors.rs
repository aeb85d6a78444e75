//! Error types for the SQL graph catalog

use thiserror::Error;
use crate::data::NodeId;

/// Base error type for catalog operations.
///
/// Every public catalog operation fails with exactly one of these kinds.
/// Syntax errors are not represented here: they travel as diagnostics
/// alongside the best-effort tree and only suppress persistence.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to read SQL input: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Entity not found: type={entity_type} id={id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    #[error("Graph store error: {0}")]
    Store(GraphStoreError),

    #[error("Internal system error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Helper to create an input error, optionally keeping the underlying I/O failure
    pub fn io(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        CoreError::Io {
            message: message.into(),
            source,
        }
    }

    /// Helper to create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

impl From<GraphStoreError> for CoreError {
    fn from(error: GraphStoreError) -> Self {
        match error {
            GraphStoreError::NotFound(id) => CoreError::not_found("SourceDocument", id),
            other => CoreError::Store(other),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(error: std::io::Error) -> Self {
        CoreError::Io {
            message: error.to_string(),
            source: Some(error),
        }
    }
}

/// Specific error type for the graph store.
#[derive(Error, Debug)]
pub enum GraphStoreError {
    #[error("Graph database connection error: {0}")]
    ConnectionError(String),
    #[error("Graph query execution error: {0}")]
    QueryError(String),
    #[error("Data mapping error from graph result: {0}")]
    MappingError(String),
    #[error("Node not found: {0}")]
    NotFound(NodeId),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
