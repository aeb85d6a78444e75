//! SyntaxTreeProvider trait definition for SQL parsing

use crate::data::syntax::ParseOutcome;

/// Turns raw SQL text into a syntax tree plus diagnostics.
///
/// Implementations never fail outright: syntax errors are reported as
/// diagnostics next to a best-effort tree.
pub trait SyntaxTreeProvider: Send + Sync {
    fn parse(&self, text: &str) -> ParseOutcome;
}
