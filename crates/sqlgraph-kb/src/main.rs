use std::io;
use clap::Parser;
use tracing::debug;

use sqlgraph_kb::{
    cli::{self, Cli},
    create_catalog, init_tracing, CatalogService, KbConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Reads .env before the subscriber picks up RUST_LOG
    let mut config = KbConfig::load()?;
    init_tracing();

    if let Some(store) = &cli.store {
        config.store = store.parse()?;
    }
    debug!(store = ?config.store, "Starting sqlgraph");

    let catalog = create_catalog(&config).await?;
    let (client, service) = CatalogService::start(catalog, 32);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    cli::run(cli.command, &client, &mut out).await?;

    // Closing the last client stops the service loop
    drop(client);
    service.await??;
    Ok(())
}
