//! Directory import and the other CLI commands against an in-memory store

use std::fs;
use std::sync::Arc;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use sqlgraph_kb::{
    cli::{self, read_sql_dir, Commands},
    CatalogClient, CatalogService, MemoryGraphStore, NodeId, QueryCatalog, TsqlTreeParser,
};

fn client() -> CatalogClient {
    let catalog = QueryCatalog::new(Arc::new(MemoryGraphStore::new()), Arc::new(TsqlTreeParser::new()));
    CatalogService::start(Arc::new(catalog), 8).0
}

async fn run(client: &CatalogClient, command: Commands) -> String {
    let mut out = Vec::new();
    cli::run(command, client, &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_read_sql_dir_filters_and_sorts() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("b.sql"), "SELECT 2").unwrap();
    fs::write(dir.path().join("a.SQL"), "SELECT 1").unwrap();
    fs::write(dir.path().join("notes.txt"), "not sql").unwrap();
    fs::create_dir(dir.path().join("nested.sql")).unwrap();

    let documents = read_sql_dir(dir.path()).await.unwrap();
    assert_eq!(documents, vec![
        ("a.SQL".to_string(), "SELECT 1".to_string()),
        ("b.sql".to_string(), "SELECT 2".to_string()),
    ]);
}

#[tokio::test]
async fn test_read_missing_dir_is_io_error() {
    let dir = tempdir().unwrap();
    let err = read_sql_dir(&dir.path().join("missing")).await.unwrap_err();
    assert!(matches!(err, sqlgraph_kb::CoreError::Io { .. }));
}

#[test_log::test(tokio::test)]
async fn test_import_parse_list_show_delete() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("one.sql"), "SELECT 1").unwrap();
    fs::write(dir.path().join("two.sql"), "SELECT 2\nGO\n").unwrap();
    let client = client();

    let imported = run(&client, Commands::Import { dir: dir.path().to_path_buf(), parse: true }).await;
    assert_eq!(
        imported,
        "1\tone.sql\n2\ttwo.sql\n\
         1\t(tsql_file (batch (select_statement (select_clause SELECT 1))))\n\
         2\t(tsql_file (batch (select_statement (select_clause SELECT 2)) (go_statement GO)))\n"
    );

    assert_eq!(run(&client, Commands::List).await, "1\tone.sql\n2\ttwo.sql\n");

    let persisted = run(&client, Commands::Show { id: NodeId(1), persisted: true }).await;
    assert_eq!(persisted, "(tsql_file (batch (select_statement (select_clause SELECT1))))\n");

    let shown = run(&client, Commands::Show { id: NodeId(2), persisted: false }).await;
    let view: serde_json::Value = serde_json::from_str(&shown).unwrap();
    assert_eq!(view["name"], "two.sql");
    assert_eq!(view["sql"], "SELECT 2\nGO\n");

    let deleted = run(&client, Commands::Delete { id: None }).await;
    // (anchor + 4) and (anchor + 5) nodes
    assert_eq!(deleted, "{\"nodesDeleted\":11,\"edgesDeleted\":9}\n");
    assert_eq!(run(&client, Commands::List).await, "");
}

#[tokio::test]
async fn test_show_persisted_without_tree_fails() {
    let client = client();
    client.load("a.sql", "SELECT 1").await.unwrap();

    let mut out = Vec::new();
    let err = cli::run(Commands::Show { id: NodeId(1), persisted: true }, &client, &mut out)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no persisted tree"));
}
