//! Message types for catalog service communication

use tokio::sync::oneshot;

use crate::data::{CoreError, DeleteCounts, DocumentView, NodeId, SourceDocument};

/// Requests understood by the [`CatalogService`](super::CatalogService)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRequest {
    Load { name: String, text: String },
    LoadMany { documents: Vec<(String, String)> },
    List,
    Get { id: NodeId },
    Regenerate { id: NodeId },
    RegenerateAll,
    DeleteOne { id: NodeId },
    DeleteAll,
    MaterializedTree { id: NodeId },
}

impl CatalogRequest {
    /// Short operation name used in logs
    pub fn operation(&self) -> &'static str {
        match self {
            CatalogRequest::Load { .. } => "load",
            CatalogRequest::LoadMany { .. } => "load_many",
            CatalogRequest::List => "list",
            CatalogRequest::Get { .. } => "get",
            CatalogRequest::Regenerate { .. } => "regenerate",
            CatalogRequest::RegenerateAll => "regenerate_all",
            CatalogRequest::DeleteOne { .. } => "delete_one",
            CatalogRequest::DeleteAll => "delete_all",
            CatalogRequest::MaterializedTree { .. } => "materialized_tree",
        }
    }
}

/// Response type for catalog requests
#[derive(Debug)]
pub enum CatalogResponse {
    Loaded(NodeId),
    LoadedMany(Vec<NodeId>),
    Documents(Vec<SourceDocument>),
    Document(DocumentView),
    Rendered(String),
    RenderedMany(Vec<String>),
    Deleted(DeleteCounts),
    Materialized(Option<String>),
    Error(CoreError),
}

/// Wrapper for the oneshot sender to return catalog results
#[derive(Debug)]
pub struct CatalogResultSender {
    pub sender: oneshot::Sender<CatalogResponse>,
}
