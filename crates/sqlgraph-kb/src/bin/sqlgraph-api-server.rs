//! HTTP API server for the SQL graph catalog
//!
//! Configuration comes from the environment (and `.env`): `SQLGRAPH_STORE`,
//! `SQLGRAPH_BIND_ADDR`, `SQLGRAPH_CORS_ORIGIN` and the `NEO4J_*` variables.

use std::net::SocketAddr;
use anyhow::Context;
use tracing::{error, info};

use sqlgraph_kb::{
    api::{router, AppState},
    create_catalog, init_tracing, CatalogService, KbConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = KbConfig::load()?;
    init_tracing();

    let catalog = create_catalog(&config).await?;
    let (client, service) = CatalogService::start(catalog, 100);
    tokio::spawn(async move {
        match service.await {
            Ok(Err(e)) => error!("CatalogService error: {}", e),
            Err(e) => error!("CatalogService task failed: {}", e),
            Ok(Ok(())) => {},
        }
    });

    let app = router(AppState { client }, &config.cors_origin)?;

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr))?;
    info!("Starting server on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("server error")?;
    Ok(())
}
