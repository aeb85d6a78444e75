use tokio::sync::{mpsc, oneshot};

use crate::data::{CoreError, DeleteCounts, DocumentView, NodeId, SourceDocument};
use crate::services::messages::{CatalogRequest, CatalogResponse, CatalogResultSender};

/// Client interface for interacting with the catalog service.
/// Cheap to clone; every clone talks to the same service.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    request_tx: mpsc::Sender<(CatalogRequest, CatalogResultSender)>,
}

impl CatalogClient {
    pub fn new(request_tx: mpsc::Sender<(CatalogRequest, CatalogResultSender)>) -> Self {
        CatalogClient { request_tx }
    }

    /// Sends a request and awaits the response.
    pub async fn request(&self, request: CatalogRequest) -> Result<CatalogResponse, CoreError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((request, CatalogResultSender { sender: response_tx }))
            .await
            .map_err(|_| CoreError::Internal("Catalog channel closed".to_string()))?;

        let response = response_rx
            .await
            .map_err(|_| CoreError::Internal("Catalog response channel closed by service".to_string()))?;

        match response {
            CatalogResponse::Error(err) => Err(err),
            other => Ok(other),
        }
    }

    pub async fn load(&self, name: impl Into<String>, text: impl Into<String>) -> Result<NodeId, CoreError> {
        match self.request(CatalogRequest::Load { name: name.into(), text: text.into() }).await? {
            CatalogResponse::Loaded(id) => Ok(id),
            other => Err(unexpected("load", other)),
        }
    }

    pub async fn load_many(&self, documents: Vec<(String, String)>) -> Result<Vec<NodeId>, CoreError> {
        match self.request(CatalogRequest::LoadMany { documents }).await? {
            CatalogResponse::LoadedMany(ids) => Ok(ids),
            other => Err(unexpected("load_many", other)),
        }
    }

    pub async fn list(&self) -> Result<Vec<SourceDocument>, CoreError> {
        match self.request(CatalogRequest::List).await? {
            CatalogResponse::Documents(documents) => Ok(documents),
            other => Err(unexpected("list", other)),
        }
    }

    pub async fn get(&self, id: NodeId) -> Result<DocumentView, CoreError> {
        match self.request(CatalogRequest::Get { id }).await? {
            CatalogResponse::Document(view) => Ok(view),
            other => Err(unexpected("get", other)),
        }
    }

    pub async fn regenerate(&self, id: NodeId) -> Result<String, CoreError> {
        match self.request(CatalogRequest::Regenerate { id }).await? {
            CatalogResponse::Rendered(tree) => Ok(tree),
            other => Err(unexpected("regenerate", other)),
        }
    }

    pub async fn regenerate_all(&self) -> Result<Vec<String>, CoreError> {
        match self.request(CatalogRequest::RegenerateAll).await? {
            CatalogResponse::RenderedMany(trees) => Ok(trees),
            other => Err(unexpected("regenerate_all", other)),
        }
    }

    pub async fn delete_one(&self, id: NodeId) -> Result<DeleteCounts, CoreError> {
        match self.request(CatalogRequest::DeleteOne { id }).await? {
            CatalogResponse::Deleted(counts) => Ok(counts),
            other => Err(unexpected("delete_one", other)),
        }
    }

    pub async fn delete_all(&self) -> Result<DeleteCounts, CoreError> {
        match self.request(CatalogRequest::DeleteAll).await? {
            CatalogResponse::Deleted(counts) => Ok(counts),
            other => Err(unexpected("delete_all", other)),
        }
    }

    pub async fn materialized_tree(&self, id: NodeId) -> Result<Option<String>, CoreError> {
        match self.request(CatalogRequest::MaterializedTree { id }).await? {
            CatalogResponse::Materialized(tree) => Ok(tree),
            other => Err(unexpected("materialized_tree", other)),
        }
    }
}

fn unexpected(operation: &str, response: CatalogResponse) -> CoreError {
    CoreError::Internal(format!("Unexpected response to {}: {:?}", operation, response))
}
