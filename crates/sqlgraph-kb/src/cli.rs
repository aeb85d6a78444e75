//! Command line front-end shared by the `sqlgraph` binary and its tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::data::{CoreError, NodeId};
use crate::services::CatalogClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Parse T-SQL sources into a graph store", long_about = None)]
pub struct Cli {
    /// Graph store backend (memory or neo4j)
    #[arg(long, global = true, env = "SQLGRAPH_STORE")]
    pub store: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load every *.sql file in a directory
    Import {
        dir: PathBuf,

        /// Also parse and persist the imported files
        #[arg(long)]
        parse: bool,
    },

    /// Parse and persist one document, or all of them
    Parse { id: Option<NodeId> },

    /// List loaded documents
    List,

    /// Show a document with a fresh rendering of its tree
    Show {
        id: NodeId,

        /// Render the persisted subgraph instead
        #[arg(long)]
        persisted: bool,
    },

    /// Delete one document, or all of them
    Delete { id: Option<NodeId> },
}

/// Reads every `*.sql` file directly inside `dir`, sorted by file name.
pub async fn read_sql_dir(dir: &Path) -> Result<Vec<(String, String)>, CoreError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CoreError::io(format!("cannot read directory {}", dir.display()), Some(e)))?;

    let mut documents = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CoreError::io(format!("cannot list directory {}", dir.display()), Some(e)))?
    {
        let path = entry.path();
        let is_sql = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("sql"))
            .unwrap_or(false);
        if !is_sql || !path.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::io(format!("cannot read {}", path.display()), Some(e)))?;
        debug!(name = %name, bytes = text.len(), "Read SQL file");
        documents.push((name, text));
    }

    documents.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(documents)
}

/// Executes one command against the catalog, writing results to `out`.
pub async fn run(command: Commands, client: &CatalogClient, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Commands::Import { dir, parse } => {
            let documents = read_sql_dir(&dir).await?;
            let names: Vec<String> = documents.iter().map(|(name, _)| name.clone()).collect();
            let ids = client.load_many(documents).await?;
            info!(files = ids.len(), dir = %dir.display(), "Imported SQL files");

            for (id, name) in ids.iter().zip(&names) {
                writeln!(out, "{}\t{}", id, name)?;
            }
            if parse {
                for id in ids {
                    let tree = client.regenerate(id).await?;
                    writeln!(out, "{}\t{}", id, tree)?;
                }
            }
        },
        Commands::Parse { id: Some(id) } => {
            writeln!(out, "{}", client.regenerate(id).await?)?;
        },
        Commands::Parse { id: None } => {
            for tree in client.regenerate_all().await? {
                writeln!(out, "{}", tree)?;
            }
        },
        Commands::List => {
            for document in client.list().await? {
                writeln!(out, "{}\t{}", document.id, document.name)?;
            }
        },
        Commands::Show { id, persisted: false } => {
            let view = client.get(id).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&view)?)?;
        },
        Commands::Show { id, persisted: true } => {
            let tree = client
                .materialized_tree(id)
                .await?
                .with_context(|| format!("document {} has no persisted tree", id))?;
            writeln!(out, "{}", tree)?;
        },
        Commands::Delete { id } => {
            let counts = match id {
                Some(id) => client.delete_one(id).await?,
                None => client.delete_all().await?,
            };
            writeln!(out, "{}", serde_json::to_string(&counts)?)?;
        },
    }
    Ok(())
}
