use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    data::CoreError,
    services::{
        catalog::QueryCatalog,
        client::CatalogClient,
        messages::{CatalogRequest, CatalogResponse, CatalogResultSender},
    },
};

/// Channel-driven front-end over a [`QueryCatalog`].
///
/// Each request runs in its own task, so slow regenerations never block the
/// channel. Ordering between requests for the same document is left to the
/// catalog's per-document locks.
pub struct CatalogService {
    catalog: Arc<QueryCatalog>,
    request_rx: mpsc::Receiver<(CatalogRequest, CatalogResultSender)>,
}

impl CatalogService {
    pub fn new(
        catalog: Arc<QueryCatalog>,
        request_rx: mpsc::Receiver<(CatalogRequest, CatalogResultSender)>,
    ) -> Self {
        Self { catalog, request_rx }
    }

    /// Wires a service and its client over a channel of `buffer` slots and
    /// spawns the service loop.
    pub fn start(
        catalog: Arc<QueryCatalog>,
        buffer: usize,
    ) -> (CatalogClient, JoinHandle<Result<(), CoreError>>) {
        let (request_tx, request_rx) = mpsc::channel(buffer);
        let mut service = Self::new(catalog, request_rx);
        let handle = tokio::spawn(async move { service.run().await });
        (CatalogClient::new(request_tx), handle)
    }

    /// Runs until every client has been dropped.
    pub async fn run(&mut self) -> Result<(), CoreError> {
        info!("CatalogService started");
        while let Some((request, sender)) = self.request_rx.recv().await {
            let catalog = Arc::clone(&self.catalog);

            tokio::spawn(async move {
                let operation = request.operation();
                debug!(operation, "Processing catalog request");

                let response = match handle(&catalog, request).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(operation, error = %e, "Catalog request failed");
                        CatalogResponse::Error(e)
                    },
                };

                // the caller may have gone away
                let _ = sender.sender.send(response);
            });
        }

        info!("CatalogService channel closed, shutting down");
        Ok(())
    }
}

async fn handle(catalog: &QueryCatalog, request: CatalogRequest) -> Result<CatalogResponse, CoreError> {
    let response = match request {
        CatalogRequest::Load { name, text } => CatalogResponse::Loaded(catalog.load(&name, &text).await?),
        CatalogRequest::LoadMany { documents } => {
            CatalogResponse::LoadedMany(catalog.load_many(&documents).await?)
        },
        CatalogRequest::List => CatalogResponse::Documents(catalog.list().await?),
        CatalogRequest::Get { id } => CatalogResponse::Document(catalog.get(id).await?),
        CatalogRequest::Regenerate { id } => CatalogResponse::Rendered(catalog.regenerate(id).await?),
        CatalogRequest::RegenerateAll => CatalogResponse::RenderedMany(catalog.regenerate_all().await?),
        CatalogRequest::DeleteOne { id } => CatalogResponse::Deleted(catalog.delete_one(id).await?),
        CatalogRequest::DeleteAll => CatalogResponse::Deleted(catalog.delete_all().await?),
        CatalogRequest::MaterializedTree { id } => {
            CatalogResponse::Materialized(catalog.materialized_tree(id).await?)
        },
    };
    Ok(response)
}
