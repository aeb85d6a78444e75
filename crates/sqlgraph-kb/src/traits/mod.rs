//! Core traits (interfaces) for the SQL graph catalog

pub mod graph_store;
mod syntax_provider;

pub use graph_store::GraphStore;
pub use syntax_provider::SyntaxTreeProvider;
