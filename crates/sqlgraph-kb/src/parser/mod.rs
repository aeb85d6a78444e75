//! Clause-level T-SQL syntax trees built on the `sqlparser` tokenizer.
//!
//! This is a deliberately coarse grammar: a file is split into batches (on
//! `GO`), batches into statements and DML statements into clauses named
//! after their opening keywords. Parenthesized groups nest, and a group that
//! opens with `SELECT`/`WITH` holds a full nested statement. Anything the
//! grammar cannot place is kept in the tree and reported as a diagnostic.

mod grammar;

use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Token, TokenWithLocation, Tokenizer};
use tracing::debug;

use crate::data::{Diagnostic, ParseOutcome, SyntaxNode};
use crate::traits::SyntaxTreeProvider;
use grammar::{clause_starter, statement_starter, StatementKind};

/// Parenthesis nesting beyond this depth is kept as flat tokens
const MAX_NESTING: usize = 128;

/// Root rule of every tree
pub const ROOT_RULE: &str = "tsql_file";

/// [`SyntaxTreeProvider`] for T-SQL text.
#[derive(Debug)]
pub struct TsqlTreeParser {
    dialect: MsSqlDialect,
}

impl TsqlTreeParser {
    pub fn new() -> Self {
        Self { dialect: MsSqlDialect {} }
    }
}

impl Default for TsqlTreeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxTreeProvider for TsqlTreeParser {
    fn parse(&self, text: &str) -> ParseOutcome {
        let tokens = match Tokenizer::new(&self.dialect, text).tokenize_with_location() {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!(error = %e, "Tokenizer rejected input");
                return ParseOutcome {
                    root: SyntaxNode::rule(ROOT_RULE, Vec::new()),
                    diagnostics: vec![Diagnostic::new(format!("token recognition error: {}", e))],
                };
            }
        };

        let lexemes: Vec<Lexeme> = tokens.into_iter().filter_map(Lexeme::from_token).collect();
        let mut builder = TreeBuilder { lexemes: &lexemes, diagnostics: Vec::new() };
        let root = builder.tsql_file();
        ParseOutcome { root, diagnostics: builder.diagnostics }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexKind {
    Word,
    LParen,
    RParen,
    SemiColon,
    Other,
}

#[derive(Debug)]
struct Lexeme {
    text: String,
    /// Upper-cased value of an unquoted word
    word: Option<String>,
    kind: LexKind,
    line: u64,
    column: u64,
}

impl Lexeme {
    fn from_token(t: TokenWithLocation) -> Option<Self> {
        let kind = match &t.token {
            Token::Whitespace(_) | Token::EOF => return None,
            Token::Word(_) => LexKind::Word,
            Token::LParen => LexKind::LParen,
            Token::RParen => LexKind::RParen,
            Token::SemiColon => LexKind::SemiColon,
            _ => LexKind::Other,
        };
        let word = match &t.token {
            Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_ascii_uppercase()),
            _ => None,
        };
        Some(Lexeme {
            text: t.token.to_string(),
            word,
            kind,
            line: t.location.line,
            column: t.location.column,
        })
    }

    /// Line the lexeme ends on; string literals and quoted names may span lines.
    fn end_line(&self) -> u64 {
        self.line + self.text.matches('\n').count() as u64
    }
}

/// A lexeme or a parenthesized group of items
#[derive(Debug)]
enum Item {
    Lex(usize),
    Group {
        open: usize,
        items: Vec<Item>,
        close: Option<usize>,
    },
}

/// A statement found in a run of items
struct StatementSpan {
    start: usize,
    end: usize,
    kind: StatementKind,
}

struct TreeBuilder<'a> {
    lexemes: &'a [Lexeme],
    diagnostics: Vec<Diagnostic>,
}

impl<'a> TreeBuilder<'a> {
    fn tsql_file(&mut self) -> SyntaxNode {
        let items = self.group();
        let mut batches = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < items.len() {
            let Some(end) = self.batch_separator(&items, i) else {
                i += 1;
                continue;
            };
            let mut children = self.statements(&items[start..i]);
            let go = items[i..end].iter().map(|item| self.convert(item)).collect();
            children.push(SyntaxNode::rule("go_statement", go));
            batches.push(SyntaxNode::rule("batch", children));
            start = end;
            i = end;
        }

        if start < items.len() {
            let children = self.statements(&items[start..]);
            batches.push(SyntaxNode::rule("batch", children));
        }

        SyntaxNode::rule(ROOT_RULE, batches)
    }

    /// End of a `GO [count]` separator starting at `items[i]`.
    ///
    /// `GO` only separates batches alone on its line, optionally followed by
    /// a repeat count; anywhere else it is an ordinary identifier.
    fn batch_separator(&self, items: &[Item], i: usize) -> Option<usize> {
        let &Item::Lex(idx) = &items[i] else {
            return None;
        };
        let go = &self.lexemes[idx];
        if go.word.as_deref() != Some("GO") {
            return None;
        }
        if idx > 0 && self.lexemes[idx - 1].end_line() >= go.line {
            return None;
        }

        let mut end = i + 1;
        let mut last = idx;
        if let Some(Item::Lex(next)) = items.get(end) {
            let count = &self.lexemes[*next];
            if count.line == go.line
                && count.kind == LexKind::Other
                && count.text.chars().all(|c| c.is_ascii_digit())
            {
                end += 1;
                last = *next;
            }
        }
        match self.lexemes.get(last + 1) {
            Some(after) if after.line == go.line => None,
            _ => Some(end),
        }
    }

    /// Folds lexemes into nested parenthesized groups without recursion.
    fn group(&mut self) -> Vec<Item> {
        fn push(root: &mut Vec<Item>, open: &mut [(usize, Vec<Item>)], item: Item) {
            match open.last_mut() {
                Some((_, items)) => items.push(item),
                None => root.push(item),
            }
        }

        let lexemes = self.lexemes;
        let mut root = Vec::new();
        let mut open: Vec<(usize, Vec<Item>)> = Vec::new();
        let mut flattened = 0usize;

        for (idx, lexeme) in lexemes.iter().enumerate() {
            match lexeme.kind {
                LexKind::LParen if open.len() < MAX_NESTING => open.push((idx, Vec::new())),
                LexKind::LParen => {
                    if flattened == 0 {
                        self.diagnostics.push(Diagnostic::at(
                            lexeme.line,
                            lexeme.column,
                            format!("parentheses nested deeper than {} levels", MAX_NESTING),
                        ));
                    }
                    flattened += 1;
                    push(&mut root, &mut open, Item::Lex(idx));
                },
                LexKind::RParen if flattened > 0 => {
                    flattened -= 1;
                    push(&mut root, &mut open, Item::Lex(idx));
                },
                LexKind::RParen => match open.pop() {
                    Some((start, items)) => {
                        push(&mut root, &mut open, Item::Group { open: start, items, close: Some(idx) });
                    },
                    None => {
                        self.diagnostics.push(Diagnostic::at(
                            lexeme.line,
                            lexeme.column,
                            "extraneous input ')'",
                        ));
                        root.push(Item::Lex(idx));
                    },
                },
                _ => push(&mut root, &mut open, Item::Lex(idx)),
            }
        }

        while let Some((start, items)) = open.pop() {
            let lexeme = &lexemes[start];
            self.diagnostics.push(Diagnostic::at(lexeme.line, lexeme.column, "missing ')'"));
            push(&mut root, &mut open, Item::Group { open: start, items, close: None });
        }

        root
    }

    fn word(&self, item: &Item) -> Option<&'a str> {
        match item {
            Item::Lex(idx) => self.lexemes[*idx].word.as_deref(),
            Item::Group { .. } => None,
        }
    }

    fn lexeme_of(&self, item: &Item) -> &'a Lexeme {
        match item {
            Item::Lex(idx) => &self.lexemes[*idx],
            Item::Group { open, .. } => &self.lexemes[*open],
        }
    }

    fn is_semicolon(&self, item: &Item) -> bool {
        matches!(item, Item::Lex(idx) if self.lexemes[*idx].kind == LexKind::SemiColon)
    }

    fn statements(&mut self, items: &[Item]) -> Vec<SyntaxNode> {
        self.split_statements(items)
            .into_iter()
            .map(|span| self.statement(&items[span.start..span.end], span.kind))
            .collect()
    }

    fn split_statements(&mut self, items: &[Item]) -> Vec<StatementSpan> {
        let mut spans = Vec::new();
        // start, resolved kind (None while inside a WITH prelude)
        let mut current: Option<(usize, Option<StatementKind>)> = None;
        let mut case_depth = 0usize;
        let mut prev_word: Option<&str> = None;

        for (i, item) in items.iter().enumerate() {
            if self.is_semicolon(item) {
                let (start, kind) = current.take().unwrap_or((i, Some(StatementKind::Empty)));
                spans.push(StatementSpan { start, end: i + 1, kind: kind.unwrap_or(StatementKind::Select) });
                case_depth = 0;
                prev_word = None;
                continue;
            }

            let word = self.word(item);
            let next_word = items.get(i + 1).and_then(|next| self.word(next));
            let next_is_word = matches!(items.get(i + 1), Some(Item::Lex(idx)) if self.lexemes[*idx].kind == LexKind::Word);
            let starter = word.and_then(|w| statement_starter(w, next_word, next_is_word, case_depth));

            match current {
                None => {
                    let kind = match starter {
                        Some(StatementKind::Cte) => None,
                        Some(kind) => Some(kind),
                        None => {
                            let lexeme = self.lexeme_of(item);
                            self.diagnostics.push(Diagnostic::at(
                                lexeme.line,
                                lexeme.column,
                                format!("mismatched input '{}' expecting statement", lexeme.text),
                            ));
                            Some(StatementKind::Unknown)
                        },
                    };
                    current = Some((i, kind));
                },
                Some((start, None)) => {
                    if let Some(kind) = starter.filter(|k| k.follows_cte()) {
                        current = Some((start, Some(kind)));
                    }
                },
                Some((start, Some(kind))) => {
                    if let Some(next_kind) = starter {
                        let w = word.unwrap_or_default();
                        if !kind.continues_with(w, prev_word) {
                            spans.push(StatementSpan { start, end: i, kind });
                            case_depth = 0;
                            let resolved = (next_kind != StatementKind::Cte).then_some(next_kind);
                            current = Some((i, resolved));
                        }
                    }
                },
            }

            match word {
                Some("CASE") => case_depth += 1,
                Some("END") if case_depth > 0 => case_depth -= 1,
                _ => {},
            }
            prev_word = word;
        }

        if let Some((start, kind)) = current {
            spans.push(StatementSpan { start, end: items.len(), kind: kind.unwrap_or(StatementKind::Select) });
        }
        spans
    }

    fn statement(&mut self, items: &[Item], kind: StatementKind) -> SyntaxNode {
        let (body, terminator) = match items.split_last() {
            Some((last, body)) if self.is_semicolon(last) => (body, Some(last)),
            _ => (items, None),
        };

        let mut children = if kind.has_clauses() {
            self.clauses(body, kind)
        } else {
            body.iter().map(|item| self.convert(item)).collect()
        };
        if let Some(semicolon) = terminator {
            children.push(self.convert(semicolon));
        }
        SyntaxNode::rule(kind.rule_name(), children)
    }

    fn clauses(&mut self, items: &[Item], kind: StatementKind) -> Vec<SyntaxNode> {
        let mut out = Vec::new();
        let mut current: Option<(String, Vec<SyntaxNode>)> = None;
        let mut case_depth = 0usize;
        let mut i = 0;

        while i < items.len() {
            let word = self.word(&items[i]);
            let next_word = items.get(i + 1).and_then(|next| self.word(next));
            let starter = match word {
                Some(w) if case_depth == 0 => clause_starter(kind, w, next_word, i == 0),
                _ => None,
            };

            if let Some((name, width)) = starter {
                if let Some((done, children)) = current.take() {
                    out.push(SyntaxNode::rule(done, children));
                }
                let opening = items[i..i + width].iter().map(|item| self.convert(item)).collect();
                current = Some((name, opening));
                i += width;
                continue;
            }

            match word {
                Some("CASE") => case_depth += 1,
                Some("END") if case_depth > 0 => case_depth -= 1,
                _ => {},
            }
            let node = self.convert(&items[i]);
            match current.as_mut() {
                Some((_, children)) => children.push(node),
                None => out.push(node),
            }
            i += 1;
        }

        if let Some((done, children)) = current {
            out.push(SyntaxNode::rule(done, children));
        }
        out
    }

    fn convert(&mut self, item: &Item) -> SyntaxNode {
        match item {
            Item::Lex(idx) => SyntaxNode::token(self.lexemes[*idx].text.clone()),
            Item::Group { open, items, close } => {
                let is_query = items
                    .first()
                    .and_then(|first| self.word(first))
                    .map(|w| w == "SELECT" || w == "WITH")
                    .unwrap_or(false);

                let mut children = vec![SyntaxNode::token(self.lexemes[*open].text.clone())];
                if is_query {
                    children.extend(self.statements(items));
                } else {
                    children.extend(items.iter().map(|inner| self.convert(inner)));
                }
                if let Some(close) = close {
                    children.push(SyntaxNode::token(self.lexemes[*close].text.clone()));
                }

                let name = if is_query { "subquery" } else { "parenthesized_expression" };
                SyntaxNode::rule(name, children)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(sql: &str) -> String {
        let outcome = TsqlTreeParser::new().parse(sql);
        assert!(outcome.is_clean(), "unexpected diagnostics: {:?}", outcome.diagnostics);
        outcome.root.to_string_tree()
    }

    #[test]
    fn test_select_one() {
        assert_eq!(tree("SELECT 1"), "(tsql_file (batch (select_statement (select_clause SELECT 1))))");
    }

    #[test]
    fn test_empty_input_has_childless_root() {
        assert_eq!(tree("  -- nothing here\n"), "tsql_file");
    }

    #[test]
    fn test_select_clauses_and_case_insensitivity() {
        assert_eq!(
            tree("select a, b from t where a = 1 group by a order by b;"),
            "(tsql_file (batch (select_statement (select_clause select a , b) (from_clause from t) \
             (where_clause where a = 1) (group_by_clause group by a) (order_by_clause order by b) ;)))"
        );
    }

    #[test]
    fn test_subquery_nests_statement() {
        assert_eq!(
            tree("SELECT x FROM (SELECT 1 AS x) s"),
            "(tsql_file (batch (select_statement (select_clause SELECT x) (from_clause FROM \
             (subquery ( (select_statement (select_clause SELECT 1 AS x)) )) s))))"
        );
    }

    #[test]
    fn test_parenthesized_expression() {
        assert_eq!(
            tree("SELECT (1 + 2) * 3"),
            "(tsql_file (batch (select_statement (select_clause SELECT (parenthesized_expression ( 1 + 2 )) * 3))))"
        );
    }

    #[test]
    fn test_statements_split_without_semicolons() {
        assert_eq!(
            tree("DECLARE @x INT SET @x = 1 SELECT @x"),
            "(tsql_file (batch (declare_statement DECLARE @x INT) (set_statement SET @x = 1) \
             (select_statement (select_clause SELECT @x))))"
        );
    }

    #[test]
    fn test_insert_select_stays_one_statement() {
        assert_eq!(
            tree("INSERT INTO t (a) SELECT a FROM s"),
            "(tsql_file (batch (insert_statement (insert_clause INSERT INTO t (parenthesized_expression ( a ))) \
             (select_clause SELECT a) (from_clause FROM s))))"
        );
    }

    #[test]
    fn test_union_continues_select() {
        assert_eq!(
            tree("SELECT 1 UNION ALL SELECT 2"),
            "(tsql_file (batch (select_statement (select_clause SELECT 1) (union_clause UNION ALL) (select_clause SELECT 2))))"
        );
    }

    #[test]
    fn test_case_expression_does_not_split() {
        assert_eq!(
            tree("SELECT CASE WHEN a = 1 THEN 'x' ELSE 'y' END FROM t"),
            "(tsql_file (batch (select_statement (select_clause SELECT CASE WHEN a = 1 THEN 'x' ELSE 'y' END) (from_clause FROM t))))"
        );
    }

    #[test]
    fn test_cte_resolves_to_main_statement() {
        assert_eq!(
            tree("WITH c AS (SELECT 1 AS n) SELECT n FROM c"),
            "(tsql_file (batch (select_statement (with_clause WITH c AS (subquery ( (select_statement (select_clause SELECT 1 AS n)) ))) \
             (select_clause SELECT n) (from_clause FROM c))))"
        );
    }

    #[test]
    fn test_table_hint_is_not_a_cte() {
        assert_eq!(
            tree("SELECT a FROM t WITH (NOLOCK)"),
            "(tsql_file (batch (select_statement (select_clause SELECT a) (from_clause FROM t WITH (parenthesized_expression ( NOLOCK ))))))"
        );
    }

    #[test]
    fn test_go_separates_batches() {
        assert_eq!(
            tree("USE db\nGO\nSELECT 1\nGO 2"),
            "(tsql_file (batch (use_statement USE db) (go_statement GO)) \
             (batch (select_statement (select_clause SELECT 1)) (go_statement GO 2)))"
        );
    }

    #[test]
    fn test_go_is_an_identifier_off_its_own_line() {
        let outcome = TsqlTreeParser::new().parse("SELECT a AS go FROM t");
        assert!(outcome.is_clean());
        assert_eq!(
            outcome.root.to_string_tree(),
            "(tsql_file (batch (select_statement (select_clause SELECT a AS go) (from_clause FROM t))))"
        );

        // a trailing token on the same line keeps GO in the statement
        let outcome = TsqlTreeParser::new().parse("SELECT 1\nGO x");
        assert_eq!(outcome.root.children().len(), 1);
    }

    #[test]
    fn test_go_separator_after_multiline_literal() {
        assert_eq!(
            tree("SELECT 'a\nb'\nGO"),
            "(tsql_file (batch (select_statement (select_clause SELECT 'a\\nb')) (go_statement GO)))"
        );
        assert_eq!(
            tree("SELECT 'a\nb' GO"),
            "(tsql_file (batch (select_statement (select_clause SELECT 'a\\nb' GO))))"
        );
    }

    #[test]
    fn test_create_procedure_body_stays_in_statement() {
        let rendered = tree("CREATE PROCEDURE p AS SELECT 1");
        assert_eq!(rendered, "(tsql_file (batch (create_statement CREATE PROCEDURE p AS SELECT 1)))");
    }

    #[test]
    fn test_update_set_where() {
        assert_eq!(
            tree("UPDATE t SET a = 1 WHERE b = 2"),
            "(tsql_file (batch (update_statement (update_clause UPDATE t) (set_clause SET a = 1) (where_clause WHERE b = 2))))"
        );
    }

    #[test]
    fn test_unknown_statement_reports_diagnostic() {
        let outcome = TsqlTreeParser::new().parse("FOO BAR; SELECT 1");
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].line, Some(1));
        assert_eq!(outcome.diagnostics[0].column, Some(1));
        assert!(outcome.diagnostics[0].message.contains("'FOO'"));
        assert_eq!(
            outcome.root.to_string_tree(),
            "(tsql_file (batch (unknown_statement FOO BAR ;) (select_statement (select_clause SELECT 1))))"
        );
    }

    #[test]
    fn test_unbalanced_parentheses_still_render() {
        let outcome = TsqlTreeParser::new().parse("SELECT (1");
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("missing ')'"));
        assert_eq!(
            outcome.root.to_string_tree(),
            "(tsql_file (batch (select_statement (select_clause SELECT (parenthesized_expression ( 1)))))"
        );

        let outcome = TsqlTreeParser::new().parse("SELECT 1)");
        assert!(outcome.diagnostics[0].message.contains("extraneous input ')'"));
    }

    #[test]
    fn test_tokenizer_error_yields_empty_root() {
        let outcome = TsqlTreeParser::new().parse("SELECT 'unterminated");
        assert!(!outcome.is_clean());
        assert_eq!(outcome.root, SyntaxNode::rule(ROOT_RULE, vec![]));
    }

    #[test]
    fn test_deep_nesting_is_flattened() {
        let sql = format!("SELECT {}1{}", "(".repeat(300), ")".repeat(300));
        let outcome = TsqlTreeParser::new().parse(&sql);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("nested deeper"));
    }
}
