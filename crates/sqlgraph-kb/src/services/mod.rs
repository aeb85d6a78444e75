//! Core services for the SQL graph catalog

pub mod catalog;
pub mod client;
pub mod materializer;
pub mod messages;
pub mod service;

// Re-exports
pub use catalog::QueryCatalog;
pub use client::CatalogClient;
pub use materializer::{MaterializeReport, TreeMaterializer, TOKEN_LABEL};
pub use messages::{CatalogRequest, CatalogResponse, CatalogResultSender};
pub use service::CatalogService;
